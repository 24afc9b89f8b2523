//! OTA partition session, backed by the `esp-ota` crate.
//!
//! Flow: begin → N × write_chunk → finalize → reboot
//!
//! Chunks must arrive in order.  The running SHA-256 of everything written
//! is compared with the digest announced at `begin` before the new
//! partition is marked bootable.

use hmac_sha256::Hash;
use log::{info, warn};

use crate::error::OtaError;

const MAX_FIRMWARE_SIZE: u32 = 4 * 1024 * 1024; // 4 MB

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtaState {
    Idle,
    Receiving {
        expected_size: u32,
        bytes_written: u32,
    },
    Verifying,
    ReadyToReboot,
    Failed,
}

/// OTA firmware update manager.
///
/// On ESP-IDF targets, uses the `esp-ota` crate for safe partition
/// management. On simulation targets only the bookkeeping runs.
pub struct OtaManager {
    state: OtaState,
    expected_sha256: [u8; 32],
    hasher: Option<Hash>,
    #[cfg(target_os = "espidf")]
    ota_update: Option<esp_ota::OtaUpdate>,
}

impl OtaManager {
    pub fn new() -> Self {
        Self {
            state: OtaState::Idle,
            expected_sha256: [0u8; 32],
            hasher: None,
            #[cfg(target_os = "espidf")]
            ota_update: None,
        }
    }

    pub fn state(&self) -> OtaState {
        self.state
    }

    /// Begin a session. Validates size and opens the inactive partition.
    pub fn begin(&mut self, firmware_size: u32, sha256: [u8; 32]) -> Result<(), OtaError> {
        if matches!(self.state, OtaState::Receiving { .. } | OtaState::Verifying) {
            return Err(OtaError::AlreadyInProgress);
        }
        if firmware_size == 0 || firmware_size > MAX_FIRMWARE_SIZE {
            return Err(OtaError::InvalidSize);
        }

        #[cfg(target_os = "espidf")]
        {
            let update = esp_ota::OtaUpdate::begin().map_err(|e| {
                warn!("esp-ota begin failed: {:?}", e);
                OtaError::BeginFailed
            })?;
            self.ota_update = Some(update);
        }

        self.expected_sha256 = sha256;
        self.hasher = Some(Hash::new());
        self.state = OtaState::Receiving {
            expected_size: firmware_size,
            bytes_written: 0,
        };
        info!("OTA: begin ({} bytes)", firmware_size);
        Ok(())
    }

    /// Write a chunk at the given byte offset. Returns total bytes written.
    pub fn write_chunk(&mut self, offset: u32, data: &[u8]) -> Result<u32, OtaError> {
        let OtaState::Receiving {
            expected_size,
            bytes_written,
        } = self.state
        else {
            return Err(OtaError::NotReceiving);
        };

        if offset != bytes_written {
            return Err(OtaError::NonSequential);
        }
        let new_written = bytes_written
            .checked_add(data.len() as u32)
            .filter(|n| *n <= expected_size)
            .ok_or(OtaError::Overflow)?;

        #[cfg(target_os = "espidf")]
        {
            let Some(update) = self.ota_update.as_mut() else {
                return Err(OtaError::NotReceiving);
            };
            if let Err(e) = update.write(data) {
                warn!("esp-ota write failed: {:?}", e);
                self.abort();
                return Err(OtaError::WriteFailed);
            }
        }

        if let Some(h) = self.hasher.as_mut() {
            h.update(data);
        }
        self.state = OtaState::Receiving {
            expected_size,
            bytes_written: new_written,
        };
        Ok(new_written)
    }

    /// Verify the digest, mark the partition bootable, set ReadyToReboot.
    pub fn finalize(&mut self) -> Result<(), OtaError> {
        match self.state {
            OtaState::Receiving {
                expected_size,
                bytes_written,
            } if bytes_written == expected_size => {}
            OtaState::Receiving { .. } => return Err(OtaError::IncompleteTransfer),
            _ => return Err(OtaError::NotReceiving),
        }

        self.state = OtaState::Verifying;

        let digest = self.hasher.take().map(Hash::finalize);
        if digest != Some(self.expected_sha256) {
            warn!("OTA: image digest mismatch");
            self.abort();
            self.state = OtaState::Failed;
            return Err(OtaError::DigestMismatch);
        }

        #[cfg(target_os = "espidf")]
        {
            let Some(update) = self.ota_update.take() else {
                self.state = OtaState::Failed;
                return Err(OtaError::NotReceiving);
            };
            let mut completed = match update.finalize() {
                Ok(c) => c,
                Err(e) => {
                    warn!("esp-ota finalize failed: {:?}", e);
                    self.state = OtaState::Failed;
                    return Err(OtaError::WriteFailed);
                }
            };
            if let Err(e) = completed.set_as_boot_partition() {
                warn!("esp-ota set_as_boot_partition failed: {:?}", e);
                self.state = OtaState::Failed;
                return Err(OtaError::BootSetFailed);
            }
        }

        self.state = OtaState::ReadyToReboot;
        info!("OTA: finalized, ready to reboot");
        Ok(())
    }

    /// Abort the current session; resets to Idle.
    pub fn abort(&mut self) {
        #[cfg(target_os = "espidf")]
        {
            // esp-ota aborts automatically when OtaUpdate is dropped
            self.ota_update.take();
        }
        self.hasher = None;
        self.state = OtaState::Idle;
        warn!("OTA: aborted");
    }
}

impl Default for OtaManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Soft-reset into the newly flashed firmware.
#[cfg(target_os = "espidf")]
pub fn reboot() -> ! {
    info!("OTA: rebooting into new firmware");
    esp_ota::restart();
}

// ── Boot validation ───────────────────────────────────────────

/// Check OTA image state on startup and mark this firmware as valid.
///
/// Without this, the rollback watchdog reverts to the previous firmware
/// after three consecutive failed boots.
#[cfg(target_os = "espidf")]
pub fn check_rollback() {
    match esp_ota::mark_app_valid() {
        Ok(()) => info!("OTA: firmware marked valid (rollback cancelled)"),
        Err(e) => warn!("OTA: mark_app_valid failed: {:?}", e),
    }
}

#[cfg(not(target_os = "espidf"))]
pub fn check_rollback() {
    log::info!("OTA rollback check (simulation): skipped");
}

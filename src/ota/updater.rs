//! Bounded pull-style firmware updater.
//!
//! ```text
//!   poll_offer ──None──▶ NoUpdate
//!       │
//!     Some(size, sha256)
//!       ▼
//!   begin ─▶ read_chunk ─▶ write_chunk ─┐   (until size reached
//!               ▲                       │    or deadline passes)
//!               └───────────────────────┘
//!       ▼
//!   finalize (digest check, boot partition) ──▶ Applied
//! ```
//!
//! Any error aborts the session and is reported as `CheckFailed`.  The
//! whole exchange, offer included, must fit in the timeout handed in by the
//! orchestrator (the OTA window length).

use core::time::Duration;

use log::{info, warn};

use super::manager::{OtaManager, OtaState};
use crate::app::ports::{Clock, FirmwareUpdatePort, UpdateCheck};
use crate::error::{OtaCheckError, OtaError, TransportError};

const CHUNK_SIZE: usize = 4096;

/// An image the source is willing to serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageOffer {
    pub size: u32,
    pub sha256: [u8; 32],
}

/// Where firmware images come from.
pub trait ImageSource {
    /// Ask whether a newer image is available.
    fn poll_offer(&mut self, timeout: Duration) -> Result<Option<ImageOffer>, TransportError>;

    /// Read the next bytes of the offered image.  `Ok(0)` means the source
    /// has nothing more to give.
    fn read_chunk(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, TransportError>;
}

pub struct FirmwareUpdater<S, C> {
    source: S,
    clock: C,
    manager: OtaManager,
}

impl<S: ImageSource, C: Clock> FirmwareUpdater<S, C> {
    pub fn new(source: S, clock: C) -> Self {
        Self {
            source,
            clock,
            manager: OtaManager::new(),
        }
    }

    pub fn state(&self) -> OtaState {
        self.manager.state()
    }

    fn try_update(&mut self, timeout: Duration) -> Result<bool, OtaCheckError> {
        let deadline = self.clock.monotonic_ms() + timeout.as_millis() as u64;

        let Some(offer) = self.source.poll_offer(timeout)? else {
            return Ok(false);
        };
        info!("OTA: offer of {} bytes", offer.size);
        self.manager.begin(offer.size, offer.sha256)?;

        let mut buf = [0u8; CHUNK_SIZE];
        let mut written = 0u32;
        while written < offer.size {
            let now = self.clock.monotonic_ms();
            if now >= deadline {
                return Err(OtaCheckError::TimedOut);
            }
            let n = self
                .source
                .read_chunk(&mut buf, Duration::from_millis(deadline - now))?;
            if n == 0 {
                return Err(OtaError::IncompleteTransfer.into());
            }
            written = self.manager.write_chunk(written, &buf[..n])?;
        }

        if self.clock.monotonic_ms() > deadline {
            return Err(OtaCheckError::TimedOut);
        }
        self.manager.finalize()?;
        Ok(true)
    }
}

impl<S: ImageSource, C: Clock> FirmwareUpdatePort for FirmwareUpdater<S, C> {
    fn check_and_maybe_apply(&mut self, timeout: Duration) -> UpdateCheck {
        match self.try_update(timeout) {
            Ok(true) => UpdateCheck::Applied,
            Ok(false) => UpdateCheck::NoUpdate,
            Err(e) => {
                warn!("OTA: check failed: {}", e);
                if matches!(self.manager.state(), OtaState::Receiving { .. }) {
                    self.manager.abort();
                }
                UpdateCheck::CheckFailed(e)
            }
        }
    }
}

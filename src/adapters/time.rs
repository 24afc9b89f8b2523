//! ESP32 time adapter.
//!
//! Implements the [`Clock`] port.
//!
//! - **`target_os = "espidf"`**: wall clock from `gettimeofday()` (kept
//!   across deep sleep by the RTC), monotonic time from
//!   `esp_timer_get_time()`.
//! - **`not(target_os = "espidf")`**: `std::time::SystemTime` and
//!   `std::time::Instant` for host-side simulation.
//!
//! The RTC keeps its time through deep sleep, so SNTP only runs when the
//! wall clock has never been set (first boot or after a brown-out).

use core::time::Duration;

use log::{info, warn};

use crate::app::ports::Clock;
use crate::error::TransportError;
use crate::ota::window::UtcTime;

/// Anything before 2020-01-01 means the RTC was never set.
const EPOCH_2020: u64 = 1_577_836_800;

#[cfg_attr(not(target_os = "espidf"), allow(dead_code))]
const SYNC_POLL: Duration = Duration::from_millis(200);

/// Poll `done` every `interval` until it reports true or `timeout` runs
/// out.
pub fn wait_until(
    timeout: Duration,
    interval: Duration,
    mut done: impl FnMut() -> bool,
) -> Result<(), TransportError> {
    let started = std::time::Instant::now();
    loop {
        if done() {
            return Ok(());
        }
        if started.elapsed() >= timeout {
            return Err(TransportError::TimedOut);
        }
        std::thread::sleep(interval);
    }
}

pub struct Esp32Clock {
    #[cfg(not(target_os = "espidf"))]
    start: std::time::Instant,
}

impl Default for Esp32Clock {
    fn default() -> Self {
        Self::new()
    }
}

impl Esp32Clock {
    pub fn new() -> Self {
        Self {
            #[cfg(not(target_os = "espidf"))]
            start: std::time::Instant::now(),
        }
    }

    /// `false` until the wall clock has been set at least once.
    pub fn is_synced(&self) -> bool {
        self.utc_now().unix_secs() >= EPOCH_2020
    }

    /// Set the wall clock from `server`, waiting at most `timeout`.  The
    /// network link must already be up.
    #[cfg(target_os = "espidf")]
    pub fn sync_from_sntp(&self, server: &str, timeout: Duration) -> Result<(), TransportError> {
        use esp_idf_svc::sntp::{EspSntp, SntpConf, SyncStatus};

        let mut conf = SntpConf::default();
        conf.servers[0] = server;
        let sntp = EspSntp::new(&conf).map_err(|e| {
            warn!("SNTP: start failed: {}", e);
            TransportError::ConnectFailed
        })?;
        info!("SNTP: syncing from {}", server);
        wait_until(timeout, SYNC_POLL, || {
            sntp.get_sync_status() == SyncStatus::Completed && self.is_synced()
        })
        .inspect_err(|_| warn!("SNTP: no answer from {} within {}s", server, timeout.as_secs()))?;
        info!("SNTP: clock set to {}", self.utc_now());
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn sync_from_sntp(&self, server: &str, timeout: Duration) -> Result<(), TransportError> {
        info!("SNTP(sim): would sync from {}", server);
        wait_until(timeout, Duration::from_millis(1), || self.is_synced())
            .inspect_err(|_| warn!("SNTP(sim): host clock before 2020"))
    }

    #[cfg(target_os = "espidf")]
    fn unix_secs(&self) -> u64 {
        use core::ptr;
        let mut tv = esp_idf_svc::sys::timeval {
            tv_sec: 0,
            tv_usec: 0,
        };
        if unsafe { esp_idf_svc::sys::gettimeofday(&mut tv, ptr::null_mut()) } != 0 {
            return 0;
        }
        tv.tv_sec.max(0) as u64
    }

    #[cfg(not(target_os = "espidf"))]
    fn unix_secs(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

impl Clock for Esp32Clock {
    fn utc_now(&self) -> UtcTime {
        UtcTime::from_unix(self.unix_secs())
    }

    #[cfg(target_os = "espidf")]
    fn monotonic_ms(&self) -> u64 {
        (unsafe { esp_idf_svc::sys::esp_timer_get_time() }) as u64 / 1_000
    }

    #[cfg(not(target_os = "espidf"))]
    fn monotonic_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

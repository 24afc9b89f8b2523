//! Wake cadence alignment.
//!
//! The RTC timer is armed so that wakes land on wall-clock multiples of the
//! configured cadence counted from UTC midnight.  A 5-minute cadence wakes at
//! hh:00, hh:05, hh:10 and so on, which keeps top-of-hour OTA windows
//! reachable no matter how long each cycle took.

use core::time::Duration;

use log::debug;

use crate::app::ports::ConfigError;
use crate::ota::window::UtcTime;

pub const MIN_CADENCE_MINUTES: u8 = 3;
pub const MAX_CADENCE_MINUTES: u8 = 60;

const SECONDS_PER_DAY: u32 = 86_400;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WakeSchedule {
    cadence_minutes: u8,
}

impl WakeSchedule {
    pub fn new(cadence_minutes: u8) -> Result<Self, ConfigError> {
        if !(MIN_CADENCE_MINUTES..=MAX_CADENCE_MINUTES).contains(&cadence_minutes) {
            return Err(ConfigError::ValidationFailed(
                "minutes between readings must be 3-60",
            ));
        }
        Ok(Self { cadence_minutes })
    }

    pub fn cadence_minutes(&self) -> u8 {
        self.cadence_minutes
    }

    pub fn cadence(&self) -> Duration {
        Duration::from_secs(u64::from(self.cadence_minutes) * 60)
    }

    /// Time from `now` until the next cadence boundary.
    ///
    /// A wake that lands exactly on a boundary schedules the following one,
    /// and the last boundary of the day is midnight even when the cadence
    /// does not divide 24 h.
    pub fn delay_until_next(&self, now: UtcTime) -> Duration {
        let step = u32::from(self.cadence_minutes) * 60;
        let elapsed = now.seconds_since_midnight();
        let next = ((elapsed / step + 1) * step).min(SECONDS_PER_DAY);
        let delay = next - elapsed;
        debug!("wake: now={} next boundary in {}s", now, delay);
        Duration::from_secs(u64::from(delay))
    }
}

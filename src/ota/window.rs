//! OTA window policy: decides whether a firmware-update check may run now.
//!
//! ```text
//!   hour_mask  Y Y Y N N N N N N N N N Y Y Y Y Y Y Y Y Y Y Y Y
//!   UTC hour   0 1 2 3 4 5 6 7 8 9 ...                     23
//!
//!   top_of_hour_only = true, window_seconds = 15
//!     12:00:00 .. 12:00:14  → permitted
//!     12:00:15 .. 12:59:59  → not permitted
//! ```
//!
//! Everything here is pure.  The policy never touches the network or the
//! clock; callers pass the current [`UtcTime`] in.

use core::fmt;
use core::time::Duration;

use serde::{Deserialize, Serialize};

use crate::app::ports::ConfigError;

/// Smallest accepted OTA window.
pub const MIN_WINDOW_SECONDS: u8 = 15;
/// Largest accepted OTA window.
pub const MAX_WINDOW_SECONDS: u8 = 45;

const SECONDS_PER_DAY: u64 = 86_400;

// ───────────────────────────────────────────────────────────────
// UtcTime
// ───────────────────────────────────────────────────────────────

/// Wall-clock instant in UTC with one-second resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UtcTime {
    unix_secs: u64,
}

impl UtcTime {
    pub const fn from_unix(unix_secs: u64) -> Self {
        Self { unix_secs }
    }

    /// Build a time on 1970-01-01 from hour/minute/second.  Returns `None`
    /// for out-of-range fields.  Mostly useful where only time-of-day
    /// matters.
    pub fn from_hms(hour: u8, minute: u8, second: u8) -> Option<Self> {
        if hour > 23 || minute > 59 || second > 59 {
            return None;
        }
        Some(Self::from_unix(
            u64::from(hour) * 3600 + u64::from(minute) * 60 + u64::from(second),
        ))
    }

    pub const fn unix_secs(&self) -> u64 {
        self.unix_secs
    }

    pub const fn seconds_since_midnight(&self) -> u32 {
        (self.unix_secs % SECONDS_PER_DAY) as u32
    }

    pub const fn hour(&self) -> u8 {
        (self.seconds_since_midnight() / 3600) as u8
    }

    pub const fn minute(&self) -> u8 {
        ((self.seconds_since_midnight() % 3600) / 60) as u8
    }

    pub const fn second(&self) -> u8 {
        (self.seconds_since_midnight() % 60) as u8
    }
}

impl fmt::Display for UtcTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}:{:02}:{:02}Z",
            self.hour(),
            self.minute(),
            self.second()
        )
    }
}

// ───────────────────────────────────────────────────────────────
// HourMask
// ───────────────────────────────────────────────────────────────

/// 24 flags indexed by UTC hour.  `true` means OTA may run in that hour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HourMask([bool; 24]);

impl HourMask {
    pub const fn all_open() -> Self {
        Self([true; 24])
    }

    pub const fn all_closed() -> Self {
        Self([false; 24])
    }

    pub const fn from_flags(flags: [bool; 24]) -> Self {
        Self(flags)
    }

    /// Parse the operator form: exactly 24 characters of `Y`/`N`
    /// (case-insensitive), index 0 being midnight UTC.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        if text.len() != 24 {
            return Err(ConfigError::ValidationFailed(
                "ota hour mask must be exactly 24 characters",
            ));
        }
        let mut flags = [false; 24];
        for (flag, byte) in flags.iter_mut().zip(text.bytes()) {
            *flag = match byte {
                b'Y' | b'y' => true,
                b'N' | b'n' => false,
                _ => {
                    return Err(ConfigError::ValidationFailed(
                        "ota hour mask may only contain Y or N",
                    ));
                }
            };
        }
        Ok(Self(flags))
    }

    pub fn allows(&self, hour: u8) -> bool {
        self.0.get(usize::from(hour)).copied().unwrap_or(false)
    }

    pub fn open_hours(&self) -> usize {
        self.0.iter().filter(|h| **h).count()
    }
}

// ───────────────────────────────────────────────────────────────
// OtaWindow + policy
// ───────────────────────────────────────────────────────────────

/// Immutable window definition, loaded once from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OtaWindow {
    hour_mask: HourMask,
    top_of_hour_only: bool,
    window_seconds: u8,
}

impl OtaWindow {
    /// Rejects a window length outside
    /// [`MIN_WINDOW_SECONDS`]..=[`MAX_WINDOW_SECONDS`].
    pub fn new(
        hour_mask: HourMask,
        top_of_hour_only: bool,
        window_seconds: u8,
    ) -> Result<Self, ConfigError> {
        if !(MIN_WINDOW_SECONDS..=MAX_WINDOW_SECONDS).contains(&window_seconds) {
            return Err(ConfigError::ValidationFailed(
                "ota window seconds must be 15-45",
            ));
        }
        Ok(Self {
            hour_mask,
            top_of_hour_only,
            window_seconds,
        })
    }

    pub fn hour_mask(&self) -> &HourMask {
        &self.hour_mask
    }

    pub fn top_of_hour_only(&self) -> bool {
        self.top_of_hour_only
    }

    pub fn window_seconds(&self) -> u8 {
        self.window_seconds
    }

    /// Upper bound on a single update check.
    pub fn window(&self) -> Duration {
        Duration::from_secs(u64::from(self.window_seconds))
    }
}

/// Why an update check was not permitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtaDenial {
    /// OTA is globally disabled in configuration.
    Disabled,
    /// The hour mask is `N` for the current UTC hour.
    HourClosed,
    /// Top-of-hour only, and the current second lies outside the window.
    OutsideTopOfHour,
}

impl fmt::Display for OtaDenial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disabled => write!(f, "ota disabled"),
            Self::HourClosed => write!(f, "hour closed"),
            Self::OutsideTopOfHour => write!(f, "outside top-of-hour window"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OtaWindowPolicy {
    enabled: bool,
    window: OtaWindow,
}

impl OtaWindowPolicy {
    pub fn new(enabled: bool, window: OtaWindow) -> Self {
        Self { enabled, window }
    }

    pub fn window(&self) -> &OtaWindow {
        &self.window
    }

    /// `true` iff an update check may start at `now`.
    pub fn may_check_now(&self, now: UtcTime) -> bool {
        self.evaluate(now).is_ok()
    }

    /// Same decision as [`may_check_now`](Self::may_check_now), with the
    /// reason attached when the answer is no.
    pub fn evaluate(&self, now: UtcTime) -> Result<(), OtaDenial> {
        if !self.enabled {
            return Err(OtaDenial::Disabled);
        }
        if !self.window.hour_mask.allows(now.hour()) {
            return Err(OtaDenial::HourClosed);
        }
        if self.window.top_of_hour_only
            && !(now.minute() == 0 && now.second() < self.window.window_seconds)
        {
            return Err(OtaDenial::OutsideTopOfHour);
        }
        Ok(())
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn closed_hours_always_deny(
            flags in proptest::array::uniform24(any::<bool>()),
            top in any::<bool>(),
            secs in MIN_WINDOW_SECONDS..=MAX_WINDOW_SECONDS,
            h in 0u8..24, m in 0u8..60, s in 0u8..60,
        ) {
            let window = OtaWindow::new(HourMask::from_flags(flags), top, secs).unwrap();
            let p = OtaWindowPolicy::new(true, window);
            let now = UtcTime::from_hms(h, m, s).unwrap();
            if !flags[usize::from(h)] {
                prop_assert!(!p.may_check_now(now));
            }
        }
    }
}

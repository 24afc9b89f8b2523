//! Fuzz target: `HourMask::parse` and `OtaWindowPolicy::evaluate`
//!
//! Feeds arbitrary text to the hour-mask parser and checks that:
//! - parsing never panics
//! - only 24-byte inputs are ever accepted
//! - an accepted mask agrees with the policy for every hour of the day
//!
//! cargo fuzz run fuzz_hour_mask

#![no_main]

use libfuzzer_sys::fuzz_target;
use weatherstation::ota::window::HourMask;
use weatherstation::ota::{OtaDenial, OtaWindow, OtaWindowPolicy, UtcTime};

fuzz_target!(|data: &[u8]| {
    let Ok(text) = core::str::from_utf8(data) else {
        return;
    };
    let Ok(mask) = HourMask::parse(text) else {
        return;
    };
    assert_eq!(text.len(), 24, "accepted a mask that is not 24 bytes");

    let Ok(window) = OtaWindow::new(mask, false, 15) else {
        return;
    };
    let policy = OtaWindowPolicy::new(true, window);
    for hour in 0..24u8 {
        let Some(now) = UtcTime::from_hms(hour, 30, 0) else {
            continue;
        };
        let open = matches!(text.as_bytes()[usize::from(hour)], b'Y' | b'y');
        let expected = if open { Ok(()) } else { Err(OtaDenial::HourClosed) };
        assert_eq!(policy.evaluate(now), expected);
    }
});

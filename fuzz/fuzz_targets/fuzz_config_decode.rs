//! Fuzz target: stored `StationConfig` blob
//!
//! Decodes arbitrary bytes as the NVS config record and runs validation
//! on whatever comes out.  Neither step may panic, and a config that
//! validates must survive a re-encode unchanged.
//!
//! cargo fuzz run fuzz_config_decode

#![no_main]

use libfuzzer_sys::fuzz_target;
use weatherstation::config::StationConfig;

fuzz_target!(|data: &[u8]| {
    let Ok(config) = postcard::from_bytes::<StationConfig>(data) else {
        return;
    };
    if config.validate().is_err() {
        return;
    }
    let bytes = postcard::to_allocvec(&config).expect("encode a decoded config");
    let again: StationConfig = postcard::from_bytes(&bytes).expect("decode own encoding");
    assert_eq!(again, config);
});

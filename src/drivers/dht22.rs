//! AOSONG DHT22 / AM2302 single-wire driver.
//!
//! The data line is open-drain with a pull-up.  One transaction:
//!
//! ```text
//!  host   ──┐ ≥1 ms  ┌──────────────────────────────────────────
//!           └────────┘
//!  sensor                ┐ 80 µs ┌ 80 µs ┐ 50 µs ┌ 26/70 µs ┐ ...
//!                        └───────┘       └───────┘          └
//!                         response         bit 0 .. bit 39
//! ```
//!
//! A bit is 1 when its high phase outlasts ~40 µs.  The frame is
//! `[hum_hi, hum_lo, temp_hi, temp_lo, checksum]`, values in tenths,
//! temperature sign in bit 15.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};

use crate::error::DeviceError;

const START_LOW_US: u32 = 1_100;
/// Upper bound on any single phase of the handshake, in 1 µs polls.
const PHASE_TIMEOUT_POLLS: u32 = 120;
/// Sample point after a bit's rising edge.
const BIT_SAMPLE_DELAY_US: u32 = 40;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dht22Measurement {
    pub temperature_c: f32,
    pub humidity_pct: f32,
}

/// Validate the checksum and scale a raw frame.
pub fn decode_frame(frame: &[u8; 5]) -> Result<Dht22Measurement, DeviceError> {
    let sum = frame[..4].iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
    if sum != frame[4] {
        return Err(DeviceError::Checksum);
    }
    let humidity = u16::from_be_bytes([frame[0], frame[1]]);
    let magnitude = u16::from_be_bytes([frame[2] & 0x7F, frame[3]]);
    let tenths = if frame[2] & 0x80 != 0 {
        -i32::from(magnitude)
    } else {
        i32::from(magnitude)
    };
    Ok(Dht22Measurement {
        temperature_c: tenths as f32 / 10.0,
        humidity_pct: f32::from(humidity) / 10.0,
    })
}

/// Bit-bang one transaction on `pin`.
///
/// The pin must be configured open-drain with a pull-up.  The sensor needs
/// about a second after power-up and two seconds between reads.
pub fn read<P, D>(pin: &mut P, delay: &mut D) -> Result<Dht22Measurement, DeviceError>
where
    P: InputPin + OutputPin,
    D: DelayNs,
{
    pin.set_low().map_err(|_| DeviceError::Bus)?;
    delay.delay_us(START_LOW_US);
    pin.set_high().map_err(|_| DeviceError::Bus)?;

    // Response: sensor pulls low, then high, then low again for bit 0.
    wait_for_level(pin, delay, false)?;
    wait_for_level(pin, delay, true)?;
    wait_for_level(pin, delay, false)?;

    let mut frame = [0u8; 5];
    for byte in frame.iter_mut() {
        for _ in 0..8 {
            wait_for_level(pin, delay, true)?;
            delay.delay_us(BIT_SAMPLE_DELAY_US);
            let one = pin.is_high().map_err(|_| DeviceError::Bus)?;
            *byte = (*byte << 1) | u8::from(one);
            if one {
                wait_for_level(pin, delay, false)?;
            }
        }
    }
    decode_frame(&frame)
}

fn wait_for_level<P, D>(pin: &mut P, delay: &mut D, high: bool) -> Result<(), DeviceError>
where
    P: InputPin,
    D: DelayNs,
{
    for _ in 0..PHASE_TIMEOUT_POLLS {
        if pin.is_high().map_err(|_| DeviceError::Bus)? == high {
            return Ok(());
        }
        delay.delay_us(1);
    }
    Err(DeviceError::TimedOut)
}

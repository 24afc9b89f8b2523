//! Bosch BME280 driver (temperature, pressure, humidity) over
//! `embedded_hal::i2c::I2c`.
//!
//! Forced mode, ×1 oversampling on every channel, filter off.  One
//! measurement is about 8 ms.  Compensation uses the datasheet integer
//! formulas (32-bit temperature and humidity, 64-bit pressure).
//!
//! Register map (subset):
//!
//! | Reg       | Purpose                              |
//! |-----------|--------------------------------------|
//! | 0x88–0xA1 | T/P calibration, H1                  |
//! | 0xD0      | chip id (0x60)                       |
//! | 0xE1–0xE7 | H2–H6 calibration                    |
//! | 0xF2      | ctrl_hum                             |
//! | 0xF3      | status (bit 3 = measuring)           |
//! | 0xF4      | ctrl_meas                            |
//! | 0xF7–0xFE | press[3] temp[3] hum[2]              |

use core::time::Duration;

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::{Error as _, ErrorKind, I2c, NoAcknowledgeSource};

use crate::error::DeviceError;

/// Address of a device whose SDO pin is HIGH.
pub const ADDRESS_SDO_HIGH: u8 = 0x77;
/// Address of a device whose SDO pin is LOW.
pub const ADDRESS_SDO_LOW: u8 = 0x76;

const REG_CALIB_TP: u8 = 0x88;
const REG_CHIP_ID: u8 = 0xD0;
const REG_CALIB_H: u8 = 0xE1;
const REG_CTRL_HUM: u8 = 0xF2;
const REG_STATUS: u8 = 0xF3;
const REG_CTRL_MEAS: u8 = 0xF4;
const REG_DATA: u8 = 0xF7;

const CHIP_ID: u8 = 0x60;
const STATUS_MEASURING: u8 = 1 << 3;
/// osrs_h = ×1
const CTRL_HUM_X1: u8 = 0b001;
/// osrs_t = ×1, osrs_p = ×1, mode = forced
const CTRL_MEAS_FORCED_X1: u8 = (0b001 << 5) | (0b001 << 2) | 0b01;

const FIRST_POLL_DELAY_MS: u32 = 10;
const POLL_INTERVAL_MS: u32 = 2;

// ── Calibration ───────────────────────────────────────────────

/// Factory trim values, read once per measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Calibration {
    pub t1: u16,
    pub t2: i16,
    pub t3: i16,
    pub p1: u16,
    pub p2: i16,
    pub p3: i16,
    pub p4: i16,
    pub p5: i16,
    pub p6: i16,
    pub p7: i16,
    pub p8: i16,
    pub p9: i16,
    pub h1: u8,
    pub h2: i16,
    pub h3: u8,
    pub h4: i16,
    pub h5: i16,
    pub h6: i8,
}

impl Calibration {
    /// `tp` is 0x88..=0xA1, `h` is 0xE1..=0xE7.
    pub fn parse(tp: &[u8; 26], h: &[u8; 7]) -> Self {
        let u16_at = |i: usize| u16::from_le_bytes([tp[i], tp[i + 1]]);
        let i16_at = |i: usize| i16::from_le_bytes([tp[i], tp[i + 1]]);
        Self {
            t1: u16_at(0),
            t2: i16_at(2),
            t3: i16_at(4),
            p1: u16_at(6),
            p2: i16_at(8),
            p3: i16_at(10),
            p4: i16_at(12),
            p5: i16_at(14),
            p6: i16_at(16),
            p7: i16_at(18),
            p8: i16_at(20),
            p9: i16_at(22),
            h1: tp[25],
            h2: i16::from_le_bytes([h[0], h[1]]),
            h3: h[2],
            // H4 and H5 are 12-bit values sharing the nibbles of 0xE5.
            h4: (i16::from(h[3] as i8) << 4) | i16::from(h[4] & 0x0F),
            h5: (i16::from(h[5] as i8) << 4) | i16::from(h[4] >> 4),
            h6: h[6] as i8,
        }
    }
}

// ── Measurement ───────────────────────────────────────────────

/// Uncompensated ADC values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawMeasurement {
    pub adc_t: i32,
    pub adc_p: i32,
    pub adc_h: i32,
}

impl RawMeasurement {
    /// `data` is 0xF7..=0xFE.
    pub fn parse(data: &[u8; 8]) -> Self {
        let twenty_bit =
            |i: usize| (i32::from(data[i]) << 12) | (i32::from(data[i + 1]) << 4) | (i32::from(data[i + 2]) >> 4);
        Self {
            adc_p: twenty_bit(0),
            adc_t: twenty_bit(3),
            adc_h: (i32::from(data[6]) << 8) | i32::from(data[7]),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    pub temperature_c: f32,
    pub pressure_hpa: f32,
    pub humidity_pct: f32,
}

/// Datasheet §4.2.3 compensation.
pub fn compensate(cal: &Calibration, raw: &RawMeasurement) -> Measurement {
    // Temperature (0.01 °C) and t_fine.
    let adc_t = i64::from(raw.adc_t);
    let t1 = i64::from(cal.t1);
    let var1 = (((adc_t >> 3) - (t1 << 1)) * i64::from(cal.t2)) >> 11;
    let var2 = (((((adc_t >> 4) - t1) * ((adc_t >> 4) - t1)) >> 12) * i64::from(cal.t3)) >> 14;
    let t_fine = var1 + var2;
    let centi_c = (t_fine * 5 + 128) >> 8;

    // Pressure (Q24.8 Pa).
    let mut var1 = t_fine - 128_000;
    let mut var2 = var1 * var1 * i64::from(cal.p6);
    var2 += (var1 * i64::from(cal.p5)) << 17;
    var2 += i64::from(cal.p4) << 35;
    var1 = ((var1 * var1 * i64::from(cal.p3)) >> 8) + ((var1 * i64::from(cal.p2)) << 12);
    var1 = (((1_i64 << 47) + var1) * i64::from(cal.p1)) >> 33;
    let pressure_q24_8 = if var1 == 0 {
        0
    } else {
        let mut p = 1_048_576 - i64::from(raw.adc_p);
        p = (((p << 31) - var2) * 3125) / var1;
        let var1 = (i64::from(cal.p9) * (p >> 13) * (p >> 13)) >> 25;
        let var2 = (i64::from(cal.p8) * p) >> 19;
        ((p + var1 + var2) >> 8) + (i64::from(cal.p7) << 4)
    };

    // Humidity (Q22.10 %RH).
    let mut h = t_fine - 76_800;
    h = ((((i64::from(raw.adc_h) << 14) - (i64::from(cal.h4) << 20) - (i64::from(cal.h5) * h))
        + 16_384)
        >> 15)
        * (((((((h * i64::from(cal.h6)) >> 10) * (((h * i64::from(cal.h3)) >> 11) + 32_768)) >> 10)
            + 2_097_152)
            * i64::from(cal.h2)
            + 8_192)
            >> 14);
    h -= ((((h >> 15) * (h >> 15)) >> 7) * i64::from(cal.h1)) >> 4;
    let humidity_q22_10 = h.clamp(0, 419_430_400) >> 12;

    Measurement {
        temperature_c: centi_c as f32 / 100.0,
        pressure_hpa: pressure_q24_8 as f32 / 256.0 / 100.0,
        humidity_pct: humidity_q22_10 as f32 / 1024.0,
    }
}

// ── Driver ────────────────────────────────────────────────────

/// Map a bus error: an unanswered address means the device is absent.
fn bus_error<E: embedded_hal::i2c::Error>(e: E) -> DeviceError {
    match e.kind() {
        ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address) => DeviceError::NotPresent,
        _ => DeviceError::Bus,
    }
}

pub struct Bme280<I2C> {
    i2c: I2C,
}

impl<I2C: I2c> Bme280<I2C> {
    pub fn new(i2c: I2C) -> Self {
        Self { i2c }
    }

    /// Run one forced-mode measurement on the device at `address`.
    pub fn measure(
        &mut self,
        address: u8,
        delay: &mut impl DelayNs,
        timeout: Duration,
    ) -> Result<Measurement, DeviceError> {
        let mut id = [0u8; 1];
        self.read_regs(address, REG_CHIP_ID, &mut id)?;
        if id[0] != CHIP_ID {
            return Err(DeviceError::NotPresent);
        }

        let mut tp = [0u8; 26];
        let mut h = [0u8; 7];
        self.read_regs(address, REG_CALIB_TP, &mut tp)?;
        self.read_regs(address, REG_CALIB_H, &mut h)?;
        let cal = Calibration::parse(&tp, &h);

        // ctrl_hum only latches on the following ctrl_meas write.
        self.write_reg(address, REG_CTRL_HUM, CTRL_HUM_X1)?;
        self.write_reg(address, REG_CTRL_MEAS, CTRL_MEAS_FORCED_X1)?;

        delay.delay_ms(FIRST_POLL_DELAY_MS);
        let budget_ms = (timeout.as_millis() as u32).saturating_sub(FIRST_POLL_DELAY_MS);
        let mut waited_ms = 0;
        loop {
            let mut status = [0u8; 1];
            self.read_regs(address, REG_STATUS, &mut status)?;
            if status[0] & STATUS_MEASURING == 0 {
                break;
            }
            if waited_ms >= budget_ms {
                return Err(DeviceError::TimedOut);
            }
            delay.delay_ms(POLL_INTERVAL_MS);
            waited_ms += POLL_INTERVAL_MS;
        }

        let mut data = [0u8; 8];
        self.read_regs(address, REG_DATA, &mut data)?;
        Ok(compensate(&cal, &RawMeasurement::parse(&data)))
    }

    fn read_regs(&mut self, address: u8, reg: u8, buf: &mut [u8]) -> Result<(), DeviceError> {
        self.i2c.write_read(address, &[reg], buf).map_err(bus_error)
    }

    fn write_reg(&mut self, address: u8, reg: u8, value: u8) -> Result<(), DeviceError> {
        self.i2c.write(address, &[reg, value]).map_err(bus_error)
    }
}

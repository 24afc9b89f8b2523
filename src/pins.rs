//! GPIO assignments for the reference weather-station board (ESP32 DevKit).
//!
//! Single source of truth for the default [`StationConfig`](crate::config::StationConfig).
//! A deployment with different wiring overrides these through the stored
//! configuration rather than by editing this file.

// ---------------------------------------------------------------------------
// Sensor power rail
// ---------------------------------------------------------------------------

/// Digital output: HIGH powers every sensor on the shared rail.
pub const SENSOR_POWER_GPIO: u8 = 26;

// ---------------------------------------------------------------------------
// BME280 devices (shared I²C bus)
// ---------------------------------------------------------------------------

pub const I2C_SDA_GPIO: u8 = 32;
pub const I2C_SCL_GPIO: u8 = 33;

/// One SDO line per BME280.  The selected device has its SDO driven HIGH
/// (address 0x77); every other device is held LOW (address 0x76).
pub const BME280_SDO_GPIOS: [u8; 2] = [18, 25];

// ---------------------------------------------------------------------------
// DHT22 devices (one data line each)
// ---------------------------------------------------------------------------

pub const DHT22_DATA_GPIOS: [u8; 2] = [14, 16];

// ---------------------------------------------------------------------------
// Wake source
// ---------------------------------------------------------------------------

/// RTC SQW output.  Pulled LOW by the RTC alarm to wake the ESP32 (ext0).
pub const RTC_INTERRUPT_GPIO: u8 = 4;

// ---------------------------------------------------------------------------
// I²C configuration
// ---------------------------------------------------------------------------

/// Bus clock.  The BME280 supports fast mode but long sensor leads do not.
pub const I2C_FREQ_HZ: u32 = 100_000;

//! Sensor drivers and peripheral helpers.

pub mod bme280;
pub mod dht22;
pub mod watchdog;

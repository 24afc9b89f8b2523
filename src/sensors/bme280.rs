//! I²C bus adapter for the BME280 slots.
//!
//! Every BME280 shares SDA/SCL.  Each has its own SDO line driven by a
//! GPIO, so a slot is selected by raising its SDO pin (address 0x77) and
//! lowering every other one (0x76).  Only the selected device answers at
//! 0x77.

use core::time::Duration;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use embedded_hal::i2c::I2c;

use super::{Quantity, RawSample};
use crate::app::ports::SensorBus;
use crate::drivers::bme280::{ADDRESS_SDO_HIGH, Bme280};
use crate::error::DeviceError;

pub struct Bme280Bus<I2C, SDO, D> {
    driver: Bme280<I2C>,
    /// (GPIO number, SDO pin driver)
    selects: Vec<(u8, SDO)>,
    delay: D,
}

impl<I2C, SDO, D> Bme280Bus<I2C, SDO, D>
where
    I2C: I2c,
    SDO: OutputPin,
    D: DelayNs,
{
    pub fn new(i2c: I2C, selects: Vec<(u8, SDO)>, delay: D) -> Self {
        Self {
            driver: Bme280::new(i2c),
            selects,
            delay,
        }
    }

    fn select(&mut self, gpio: u8) -> Result<(), DeviceError> {
        if !self.selects.iter().any(|(n, _)| *n == gpio) {
            return Err(DeviceError::NotPresent);
        }
        for (n, pin) in &mut self.selects {
            let res = if *n == gpio { pin.set_high() } else { pin.set_low() };
            res.map_err(|_| DeviceError::Bus)?;
        }
        Ok(())
    }
}

impl<I2C, SDO, D> SensorBus for Bme280Bus<I2C, SDO, D>
where
    I2C: I2c,
    SDO: OutputPin,
    D: DelayNs,
{
    fn read(&mut self, address: u8, timeout: Duration) -> Result<RawSample, DeviceError> {
        self.select(address)?;
        let m = self.driver.measure(ADDRESS_SDO_HIGH, &mut self.delay, timeout)?;

        let mut sample = RawSample::new();
        for pair in [
            (Quantity::Temperature, m.temperature_c),
            (Quantity::Humidity, m.humidity_pct),
            (Quantity::Pressure, m.pressure_hpa),
        ] {
            sample.push(pair).map_err(|_| DeviceError::Incomplete)?;
        }
        Ok(sample)
    }
}

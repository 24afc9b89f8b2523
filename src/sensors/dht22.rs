//! Single-wire bus adapter for the DHT22 slots.  Each device has its own
//! data pin; the slot address is the GPIO number.

use core::time::Duration;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};

use super::{Quantity, RawSample};
use crate::app::ports::SensorBus;
use crate::drivers::dht22;
use crate::error::DeviceError;

pub struct Dht22Bus<P, D> {
    /// (GPIO number, open-drain data pin)
    pins: Vec<(u8, P)>,
    delay: D,
}

impl<P, D> Dht22Bus<P, D>
where
    P: InputPin + OutputPin,
    D: DelayNs,
{
    pub fn new(pins: Vec<(u8, P)>, delay: D) -> Self {
        Self { pins, delay }
    }
}

impl<P, D> SensorBus for Dht22Bus<P, D>
where
    P: InputPin + OutputPin,
    D: DelayNs,
{
    /// A transaction is ~5 ms and bounded by the driver's phase timeouts,
    /// so `timeout` is only enforced by the caller's elapsed-time check.
    fn read(&mut self, address: u8, _timeout: Duration) -> Result<RawSample, DeviceError> {
        let (_, pin) = self
            .pins
            .iter_mut()
            .find(|(gpio, _)| *gpio == address)
            .ok_or(DeviceError::NotPresent)?;
        let m = dht22::read(pin, &mut self.delay)?;

        let mut sample = RawSample::new();
        sample
            .push((Quantity::Temperature, m.temperature_c))
            .map_err(|_| DeviceError::Incomplete)?;
        sample
            .push((Quantity::Humidity, m.humidity_pct))
            .map_err(|_| DeviceError::Incomplete)?;
        Ok(sample)
    }
}

//! Redundant sensor array.
//!
//! ```text
//!   SensorArray
//!   ├── DeviceSlot bme280-1 (SDO 18) ─┐
//!   ├── DeviceSlot bme280-2 (SDO 25) ─┴─▶ Box<dyn SensorBus>  (I²C)
//!   ├── DeviceSlot dht22-1  (pin 14) ─┐
//!   └── DeviceSlot dht22-2  (pin 16) ─┴─▶ Box<dyn SensorBus>  (one-wire)
//! ```
//!
//! Each slot is read independently.  A failed slot is recorded and skipped;
//! it never stops acquisition from the others.  A multi-quantity device
//! contributes all of its quantities or none of them.

pub mod bme280;
pub mod dht22;

use core::fmt;
use core::ops::RangeInclusive;
use core::time::Duration;

use heapless::String;
use log::{debug, warn};

use crate::app::ports::{Clock, SensorBus};
use crate::config::StationConfig;
use crate::error::DeviceError;
use crate::ota::window::UtcTime;

// ───────────────────────────────────────────────────────────────
// Quantities
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Quantity {
    Temperature = 0,
    Humidity = 1,
    Pressure = 2,
}

impl Quantity {
    pub const COUNT: usize = 3;
    pub const ALL: [Quantity; Self::COUNT] = [Self::Temperature, Self::Humidity, Self::Pressure];

    /// Stable lowercase name, used in MQTT topics.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Temperature => "temperature",
            Self::Humidity => "humidity",
            Self::Pressure => "pressure",
        }
    }

    /// Canonical unit every reading of this quantity is expressed in.
    pub const fn unit(self) -> &'static str {
        match self {
            Self::Temperature => "°C",
            Self::Humidity => "%RH",
            Self::Pressure => "hPa",
        }
    }

    /// Physically plausible range for a ground-level station.
    pub fn plausible_range(self) -> RangeInclusive<f32> {
        match self {
            Self::Temperature => -40.0..=85.0,
            Self::Humidity => 0.0..=100.0,
            Self::Pressure => 300.0..=1100.0,
        }
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl serde::Serialize for Quantity {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

/// What a bus driver hands back for one device: quantity/value pairs in
/// canonical units, in any order.
pub type RawSample = heapless::Vec<(Quantity, f32), 4>;

// ───────────────────────────────────────────────────────────────
// Device families and slots
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceFamily {
    /// BME280: temperature + humidity + pressure.
    PressureHumidityTemp,
    /// DHT22: temperature + humidity.
    HumidityTemp,
}

impl DeviceFamily {
    pub const fn quantities(self) -> &'static [Quantity] {
        match self {
            Self::PressureHumidityTemp => &[Quantity::Temperature, Quantity::Humidity, Quantity::Pressure],
            Self::HumidityTemp => &[Quantity::Temperature, Quantity::Humidity],
        }
    }

    pub const fn label_prefix(self) -> &'static str {
        match self {
            Self::PressureHumidityTemp => "bme280",
            Self::HumidityTemp => "dht22",
        }
    }
}

/// Index of a slot in the array.  Stable for the life of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(pub u8);

/// Human-readable slot name, e.g. `bme280-2`.
pub type DeviceLabel = String<12>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceStatus {
    /// Not read yet since boot.
    Unknown,
    Ok,
    TimedOut,
    BusError,
    NotPresent,
}

impl From<DeviceError> for DeviceStatus {
    fn from(e: DeviceError) -> Self {
        match e {
            DeviceError::TimedOut => Self::TimedOut,
            DeviceError::NotPresent => Self::NotPresent,
            DeviceError::Bus
            | DeviceError::Checksum
            | DeviceError::Incomplete
            | DeviceError::OutOfRange => Self::BusError,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSlot {
    pub id: DeviceId,
    pub family: DeviceFamily,
    /// SDO select pin (BME280) or data pin (DHT22).
    pub address: u8,
    pub label: DeviceLabel,
    pub last_status: DeviceStatus,
}

impl DeviceSlot {
    /// `ordinal` is 1-based within the family.
    pub fn new(id: DeviceId, family: DeviceFamily, address: u8, ordinal: u8) -> Self {
        let mut label = DeviceLabel::new();
        // Longest label is "bme280-4", well within capacity.
        let _ = fmt::Write::write_fmt(&mut label, format_args!("{}-{}", family.label_prefix(), ordinal));
        Self {
            id,
            family,
            address,
            label,
            last_status: DeviceStatus::Unknown,
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Readings
// ───────────────────────────────────────────────────────────────

/// One measured value from one device in one cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub quantity: Quantity,
    pub value: f32,
    pub unit: &'static str,
    pub source: DeviceId,
    pub source_label: DeviceLabel,
    pub acquired_at: UtcTime,
}

/// All readings from one device in one cycle.
pub type ReadingSet = heapless::Vec<Reading, { Quantity::COUNT }>;

/// Turn a driver sample into readings for `slot`, enforcing the family's
/// quantity set and plausibility ranges.  Undeclared quantities are dropped.
pub fn accept_sample(
    slot: &DeviceSlot,
    raw: &RawSample,
    acquired_at: UtcTime,
) -> Result<ReadingSet, DeviceError> {
    let mut set = ReadingSet::new();
    for &quantity in slot.family.quantities() {
        let value = raw
            .iter()
            .find(|(q, _)| *q == quantity)
            .map(|(_, v)| *v)
            .ok_or(DeviceError::Incomplete)?;
        if !value.is_finite() || !quantity.plausible_range().contains(&value) {
            return Err(DeviceError::OutOfRange);
        }
        let reading = Reading {
            quantity,
            value,
            unit: quantity.unit(),
            source: slot.id,
            source_label: slot.label.clone(),
            acquired_at,
        };
        if set.push(reading).is_err() {
            return Err(DeviceError::Incomplete);
        }
    }
    Ok(set)
}

// ───────────────────────────────────────────────────────────────
// SensorArray
// ───────────────────────────────────────────────────────────────

/// Outcome of reading one slot in one cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceResult {
    pub device: DeviceId,
    pub label: DeviceLabel,
    pub result: Result<ReadingSet, DeviceError>,
}

pub struct SensorArray {
    slots: Vec<DeviceSlot>,
    pressure_bus: Box<dyn SensorBus>,
    humidity_bus: Box<dyn SensorBus>,
}

impl SensorArray {
    /// Build slots from the configured pin lists.  BME280 slots come first.
    pub fn from_config(
        config: &StationConfig,
        pressure_bus: Box<dyn SensorBus>,
        humidity_bus: Box<dyn SensorBus>,
    ) -> Self {
        let mut slots = Vec::new();
        let families = [
            (DeviceFamily::PressureHumidityTemp, config.bme280_sdo_pins.as_slice()),
            (DeviceFamily::HumidityTemp, config.dht22_data_pins.as_slice()),
        ];
        for (family, pins) in families {
            for (n, &pin) in pins.iter().enumerate() {
                let id = DeviceId(slots.len() as u8);
                slots.push(DeviceSlot::new(id, family, pin, n as u8 + 1));
            }
        }
        Self {
            slots,
            pressure_bus,
            humidity_bus,
        }
    }

    pub fn slots(&self) -> &[DeviceSlot] {
        &self.slots
    }

    /// Read every slot once.  Each slot's status is updated exactly once.
    ///
    /// A driver that answers after `timeout` has elapsed is treated as
    /// timed out and its sample is discarded.
    pub fn acquire_all(&mut self, clock: &impl Clock, timeout: Duration) -> Vec<DeviceResult> {
        let limit_ms = timeout.as_millis() as u64;
        let mut results = Vec::with_capacity(self.slots.len());

        for slot in &mut self.slots {
            let bus = match slot.family {
                DeviceFamily::PressureHumidityTemp => &mut self.pressure_bus,
                DeviceFamily::HumidityTemp => &mut self.humidity_bus,
            };

            let started = clock.monotonic_ms();
            let raw = bus.read(slot.address, timeout);
            let elapsed = clock.monotonic_ms().saturating_sub(started);

            let result = match raw {
                Ok(_) if elapsed > limit_ms => Err(DeviceError::TimedOut),
                Ok(sample) => accept_sample(slot, &sample, clock.utc_now()),
                Err(e) => Err(e),
            };

            slot.last_status = match &result {
                Ok(_) => DeviceStatus::Ok,
                Err(e) => DeviceStatus::from(*e),
            };
            match &result {
                Ok(set) => debug!("{}: {} readings in {}ms", slot.label, set.len(), elapsed),
                Err(e) => warn!("{}: read failed ({}) after {}ms", slot.label, e, elapsed),
            }

            results.push(DeviceResult {
                device: slot.id,
                label: slot.label.clone(),
                result,
            });
        }
        results
    }

    /// Record `error` against every slot without touching the buses.  Used
    /// when the rail never came up, so nothing could have answered.
    pub fn fail_all(&mut self, error: DeviceError) -> Vec<DeviceResult> {
        self.slots
            .iter_mut()
            .map(|slot| {
                slot.last_status = DeviceStatus::from(error);
                DeviceResult {
                    device: slot.id,
                    label: slot.label.clone(),
                    result: Err(error),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::Cell;

    struct FixedBus(Result<RawSample, DeviceError>);

    impl SensorBus for FixedBus {
        fn read(&mut self, _address: u8, _timeout: Duration) -> Result<RawSample, DeviceError> {
            self.0.clone()
        }
    }

    struct StepClock(Cell<u64>, u64);

    impl Clock for StepClock {
        fn utc_now(&self) -> UtcTime {
            UtcTime::from_unix(0)
        }
        fn monotonic_ms(&self) -> u64 {
            let now = self.0.get();
            self.0.set(now + self.1);
            now
        }
    }

    fn sample(pairs: &[(Quantity, f32)]) -> RawSample {
        RawSample::from_slice(pairs).unwrap()
    }

    fn bme_slot() -> DeviceSlot {
        DeviceSlot::new(DeviceId(0), DeviceFamily::PressureHumidityTemp, 18, 1)
    }

    #[test]
    fn labels_are_family_ordinal() {
        assert_eq!(bme_slot().label.as_str(), "bme280-1");
        let dht = DeviceSlot::new(DeviceId(3), DeviceFamily::HumidityTemp, 16, 2);
        assert_eq!(dht.label.as_str(), "dht22-2");
    }

    #[test]
    fn accept_requires_every_declared_quantity() {
        let raw = sample(&[(Quantity::Temperature, 20.0), (Quantity::Humidity, 40.0)]);
        assert_eq!(
            accept_sample(&bme_slot(), &raw, UtcTime::from_unix(0)),
            Err(DeviceError::Incomplete)
        );
    }

    #[test]
    fn accept_rejects_implausible_value() {
        let raw = sample(&[
            (Quantity::Temperature, 20.0),
            (Quantity::Humidity, 40.0),
            (Quantity::Pressure, 50.0),
        ]);
        assert_eq!(
            accept_sample(&bme_slot(), &raw, UtcTime::from_unix(0)),
            Err(DeviceError::OutOfRange)
        );
    }

    #[test]
    fn accept_rejects_nan() {
        let slot = DeviceSlot::new(DeviceId(2), DeviceFamily::HumidityTemp, 14, 1);
        let raw = sample(&[(Quantity::Temperature, f32::NAN), (Quantity::Humidity, 40.0)]);
        assert_eq!(
            accept_sample(&slot, &raw, UtcTime::from_unix(0)),
            Err(DeviceError::OutOfRange)
        );
    }

    #[test]
    fn accept_drops_undeclared_quantities() {
        let slot = DeviceSlot::new(DeviceId(2), DeviceFamily::HumidityTemp, 14, 1);
        let raw = sample(&[
            (Quantity::Pressure, 1000.0),
            (Quantity::Humidity, 40.0),
            (Quantity::Temperature, 20.0),
        ]);
        let set = accept_sample(&slot, &raw, UtcTime::from_unix(0)).unwrap();
        assert_eq!(set.len(), 2);
        assert!(set.iter().all(|r| r.quantity != Quantity::Pressure));
        assert_eq!(set[0].unit, "°C");
    }

    #[test]
    fn slots_built_from_config() {
        let array = SensorArray::from_config(
            &StationConfig::default(),
            Box::new(FixedBus(Err(DeviceError::NotPresent))),
            Box::new(FixedBus(Err(DeviceError::NotPresent))),
        );
        let labels: Vec<&str> = array.slots().iter().map(|s| s.label.as_str()).collect();
        assert_eq!(labels, ["bme280-1", "bme280-2", "dht22-1", "dht22-2"]);
        assert_eq!(array.slots()[1].address, 25);
    }

    #[test]
    fn one_failing_family_does_not_stop_the_other() {
        let good = sample(&[(Quantity::Temperature, 20.0), (Quantity::Humidity, 40.0)]);
        let mut array = SensorArray::from_config(
            &StationConfig::default(),
            Box::new(FixedBus(Err(DeviceError::Bus))),
            Box::new(FixedBus(Ok(good))),
        );
        let clock = StepClock(Cell::new(0), 1);
        let results = array.acquire_all(&clock, Duration::from_millis(100));
        assert_eq!(results.len(), 4);
        assert!(results[0].result.is_err());
        assert!(results[1].result.is_err());
        assert!(results[2].result.is_ok());
        assert!(results[3].result.is_ok());
        assert_eq!(array.slots()[0].last_status, DeviceStatus::BusError);
        assert_eq!(array.slots()[3].last_status, DeviceStatus::Ok);
    }

    #[test]
    fn late_answer_is_a_timeout() {
        let good = sample(&[(Quantity::Temperature, 20.0), (Quantity::Humidity, 40.0)]);
        let mut config = StationConfig::default();
        config.bme280_sdo_pins.clear();
        let mut array = SensorArray::from_config(
            &config,
            Box::new(FixedBus(Err(DeviceError::NotPresent))),
            Box::new(FixedBus(Ok(good))),
        );
        // Every clock read advances 500 ms, so each read "takes" 500 ms.
        let clock = StepClock(Cell::new(0), 500);
        let results = array.acquire_all(&clock, Duration::from_millis(100));
        assert!(results.iter().all(|r| r.result == Err(DeviceError::TimedOut)));
        assert!(array.slots().iter().all(|s| s.last_status == DeviceStatus::TimedOut));
    }

    #[test]
    fn fail_all_marks_every_slot_once() {
        let mut array = SensorArray::from_config(
            &StationConfig::default(),
            Box::new(FixedBus(Err(DeviceError::Bus))),
            Box::new(FixedBus(Err(DeviceError::Bus))),
        );
        let results = array.fail_all(DeviceError::NotPresent);
        assert_eq!(results.len(), 4);
        assert!(results.iter().all(|r| r.result == Err(DeviceError::NotPresent)));
        assert!(array.slots().iter().all(|s| s.last_status == DeviceStatus::NotPresent));
    }
}

//! Multi-device reconciliation.
//!
//! ```text
//!   bme280-1 ─┐
//!   bme280-2 ─┼─▶ group by Quantity ─▶ mean, spread ─▶ FinalizedSet
//!   dht22-1  ─┤                          (count = 0 ⇒ Unavailable)
//!   dht22-2  ─┘
//! ```
//!
//! The policy is a plain arithmetic mean with no outlier rejection.  The
//! spread (max − min, i.e. the largest pairwise disagreement) is published
//! alongside so operators can see when devices drift apart.
//!
//! Sums are accumulated in `f64` in input order, so the same readings
//! always give bit-identical results.

use serde::Serialize;

use crate::sensors::{Quantity, Reading};

/// One reconciled value for one quantity in one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FinalizedReading {
    pub quantity: Quantity,
    pub value: f32,
    pub unit: &'static str,
    pub contributing_device_count: u8,
    pub spread: f32,
}

/// One slot per [`Quantity`]; `None` means Unavailable this cycle.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FinalizedSet {
    entries: [Option<FinalizedReading>; Quantity::COUNT],
}

impl FinalizedSet {
    pub fn get(&self, quantity: Quantity) -> Option<&FinalizedReading> {
        self.entries[quantity as usize].as_ref()
    }

    pub fn is_available(&self, quantity: Quantity) -> bool {
        self.get(quantity).is_some()
    }

    /// Available readings in [`Quantity::ALL`] order.
    pub fn iter(&self) -> impl Iterator<Item = &FinalizedReading> {
        self.entries.iter().flatten()
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Serialize for FinalizedSet {
    /// A map of quantity name to reading; unavailable quantities are absent.
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for r in self.iter() {
            map.serialize_entry(r.quantity.name(), r)?;
        }
        map.end()
    }
}

pub struct Reconciler;

impl Reconciler {
    pub fn finalize(readings: &[Reading]) -> FinalizedSet {
        let mut set = FinalizedSet::default();
        for quantity in Quantity::ALL {
            let mut count: u32 = 0;
            let mut sum = 0.0f64;
            let mut min = f64::INFINITY;
            let mut max = f64::NEG_INFINITY;
            for r in readings.iter().filter(|r| r.quantity == quantity) {
                let v = f64::from(r.value);
                count += 1;
                sum += v;
                min = min.min(v);
                max = max.max(v);
            }
            if count == 0 {
                continue;
            }
            set.entries[quantity as usize] = Some(FinalizedReading {
                quantity,
                value: (sum / f64::from(count)) as f32,
                unit: quantity.unit(),
                contributing_device_count: count.min(u32::from(u8::MAX)) as u8,
                spread: (max - min) as f32,
            });
        }
        set
    }
}


#[cfg(test)]
mod proptests {
    use super::tests::reading;
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn mean_and_spread_match_contributors(values in prop::collection::vec(-40.0f32..85.0, 1..8)) {
            let input: Vec<Reading> = values
                .iter()
                .enumerate()
                .map(|(i, v)| reading(Quantity::Temperature, *v, i as u8))
                .collect();
            let t = *Reconciler::finalize(&input).get(Quantity::Temperature).unwrap();

            let mean = values.iter().map(|v| f64::from(*v)).sum::<f64>() / values.len() as f64;
            let max_pair = values
                .iter()
                .flat_map(|a| values.iter().map(move |b| (a - b).abs()))
                .fold(0.0f32, f32::max);
            prop_assert!((f64::from(t.value) - mean).abs() < 1e-3);
            prop_assert!((t.spread - max_pair).abs() < 1e-3);
            prop_assert_eq!(usize::from(t.contributing_device_count), values.len());
        }

        #[test]
        fn finalize_is_deterministic(values in prop::collection::vec(0.0f32..100.0, 0..8)) {
            let input: Vec<Reading> = values
                .iter()
                .enumerate()
                .map(|(i, v)| reading(Quantity::Humidity, *v, i as u8))
                .collect();
            let a = Reconciler::finalize(&input);
            let b = Reconciler::finalize(&input);
            let bits = |s: &FinalizedSet| s.iter().map(|r| (r.value.to_bits(), r.spread.to_bits())).collect::<Vec<_>>();
            prop_assert_eq!(bits(&a), bits(&b));
        }
    }
}

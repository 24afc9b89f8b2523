//! Telemetry sinks.
//!
//! ```text
//!                         ┌──▶ MqttSink ──────────▶ MqttTransport
//!   PublishBatch ──fan-out┼──▶ PwsSink ───────────▶ HttpTransport
//!                         └──▶ UndergroundSink ───▶ HttpTransport
//! ```
//!
//! Each sink is its own failure domain.  The orchestrator calls them one
//! after another with a per-sink timeout and records every outcome; a
//! failing sink never short-circuits the ones after it.  Nothing is retried
//! within a cycle: the next wake is the retry.

pub mod mqtt;
pub mod pws;
pub mod underground;

use core::fmt;
use core::fmt::Write as _;
use core::time::Duration;

use crate::app::ports::{HttpTransport, MqttTransport};
use crate::config::{StationConfig, StationSettings};
use crate::error::SinkError;
use crate::reconcile::FinalizedSet;
use crate::sensors::{Quantity, Reading};

pub use mqtt::MqttSink;
pub use pws::PwsSink;
pub use underground::UndergroundSink;

// ───────────────────────────────────────────────────────────────
// Contract
// ───────────────────────────────────────────────────────────────

/// Reporting granularity.  Only the MQTT sink publishes per-device values;
/// the HTTP services take finalized values only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportingMode {
    FinalizedOnly,
    Verbose,
}

/// Everything a sink may publish for one cycle.
#[derive(Debug, Clone, Copy)]
pub struct PublishBatch<'a> {
    pub finalized: &'a FinalizedSet,
    pub raw: &'a [Reading],
    pub mode: ReportingMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Published {
    /// Messages (MQTT) or requests (HTTP) delivered.
    pub messages: u16,
}

pub trait PublishSink {
    /// Stable name used as the key in the cycle outcome.
    fn name(&self) -> &'static str;

    fn enabled(&self) -> bool;

    /// Publish the batch, finishing within `timeout`.
    fn publish(&mut self, batch: &PublishBatch<'_>, timeout: Duration) -> Result<Published, SinkError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Disabled in configuration; never attempted.
    Disabled,
    /// Every quantity was Unavailable this cycle.
    NoReadings,
    /// The awake budget ran out before this sink's turn.
    DeadlineReached,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disabled => write!(f, "disabled"),
            Self::NoReadings => write!(f, "no readings"),
            Self::DeadlineReached => write!(f, "deadline reached"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkOutcome {
    Published(Published),
    Skipped(SkipReason),
    Failed(SinkError),
}

impl SinkOutcome {
    pub fn is_published(&self) -> bool {
        matches!(self, Self::Published(_))
    }

    pub fn was_attempted(&self) -> bool {
        !matches!(self, Self::Skipped(_))
    }
}

impl fmt::Display for SinkOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Published(p) => write!(f, "published ({} msgs)", p.messages),
            Self::Skipped(r) => write!(f, "skipped ({r})"),
            Self::Failed(e) => write!(f, "failed ({e})"),
        }
    }
}

/// Sinks in publish order: MQTT, PWS, Underground.
pub fn build_sinks<M, H1, H2>(
    config: &StationConfig,
    mqtt: M,
    pws_http: H1,
    underground_http: H2,
) -> Vec<Box<dyn PublishSink>>
where
    M: MqttTransport + 'static,
    H1: HttpTransport + 'static,
    H2: HttpTransport + 'static,
{
    vec![
        Box::new(MqttSink::new(mqtt, config.mqtt.enabled, config.mqtt.topic.as_str())),
        Box::new(PwsSink::new(pws_http, config.pws.clone())),
        Box::new(UndergroundSink::new(underground_http, config.underground.clone())),
    ]
}

// ───────────────────────────────────────────────────────────────
// Weather-service helpers (shared by the HTTP sinks)
// ───────────────────────────────────────────────────────────────

const SOFTWARE_TYPE: &str = concat!("weatherstation-", env!("CARGO_PKG_VERSION"));

pub fn celsius_to_fahrenheit(c: f32) -> f32 {
    c * 9.0 / 5.0 + 32.0
}

pub fn hpa_to_inhg(hpa: f32) -> f32 {
    hpa * 0.029_529_983
}

/// RFC 3986 percent-encoding of a query value.
pub fn percent_encode(value: &str, out: &mut String) {
    for b in value.bytes() {
        if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b'~') {
            out.push(b as char);
        } else {
            let _ = write!(out, "%{:02X}", b);
        }
    }
}

/// Build the `updateraw` request shared by the PWS and Underground
/// protocols.  Unavailable quantities are omitted.
pub fn station_url(endpoint: &str, station: &StationSettings, finalized: &FinalizedSet) -> String {
    let mut url = String::with_capacity(256);
    url.push_str(endpoint);
    url.push_str("?ID=");
    percent_encode(&station.station_id, &mut url);
    url.push_str("&PASSWORD=");
    percent_encode(&station.api_key, &mut url);
    url.push_str("&dateutc=now");

    for r in finalized.iter() {
        let (field, value) = match r.quantity {
            Quantity::Temperature => ("tempf", celsius_to_fahrenheit(r.value)),
            Quantity::Humidity => ("humidity", r.value),
            Quantity::Pressure => ("baromin", hpa_to_inhg(r.value)),
        };
        let _ = write!(url, "&{}={:.2}", field, value);
    }

    url.push_str("&softwaretype=");
    percent_encode(SOFTWARE_TYPE, &mut url);
    url.push_str("&action=updateraw");
    url
}

//! Port traits: the hexagonal boundary between the wake-cycle core and the
//! outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ WakeCycleOrchestrator (domain)
//! ```
//!
//! Driven adapters (sensor buses, network link, telemetry transports,
//! firmware source, clock, storage) implement these traits.  The
//! [`WakeCycleOrchestrator`](super::service::WakeCycleOrchestrator) consumes
//! them via generics or trait objects, so the domain core never touches
//! hardware directly and every test can run against fakes.
//!
//! Every operation that can block takes an explicit timeout.  Nothing
//! behind a port may wait indefinitely.

use core::fmt;
use core::time::Duration;

use crate::config::StationConfig;
use crate::error::{DeviceError, OtaCheckError, TransportError};
use crate::ota::window::UtcTime;
use crate::sensors::RawSample;

// ───────────────────────────────────────────────────────────────
// Sensor bus (driven adapter: hardware → domain)
// ───────────────────────────────────────────────────────────────

/// One bus driver per device family.
pub trait SensorBus {
    /// Read every quantity the device at `address` measures.
    ///
    /// `address` is the slot's hardware address: the SDO select pin for a
    /// BME280, the data pin for a DHT22.
    fn read(&mut self, address: u8, timeout: Duration) -> Result<RawSample, DeviceError>;
}

// ───────────────────────────────────────────────────────────────
// Clock
// ───────────────────────────────────────────────────────────────

pub trait Clock {
    /// Current wall-clock time (UTC).
    fn utc_now(&self) -> UtcTime;

    /// Milliseconds from an arbitrary fixed origin; never goes backwards.
    fn monotonic_ms(&self) -> u64;
}

// ───────────────────────────────────────────────────────────────
// Firmware update
// ───────────────────────────────────────────────────────────────

/// Result of one bounded update check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateCheck {
    NoUpdate,
    /// A new image was written and marked bootable; a restart is required.
    Applied,
    CheckFailed(OtaCheckError),
}

pub trait FirmwareUpdatePort {
    /// Look for an update and apply it, finishing within `timeout`.
    fn check_and_maybe_apply(&mut self, timeout: Duration) -> UpdateCheck;
}

// ───────────────────────────────────────────────────────────────
// Network link
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityError {
    NoCredentials,
    InvalidSsid,
    InvalidPassword,
    ConnectionFailed,
    AlreadyConnected,
}

impl fmt::Display for ConnectivityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoCredentials => write!(f, "no WiFi credentials configured"),
            Self::InvalidSsid => write!(f, "SSID invalid (must be 1-32 printable ASCII bytes)"),
            Self::InvalidPassword => write!(
                f,
                "password invalid (must be 8-64 bytes for WPA2, or empty for open)"
            ),
            Self::ConnectionFailed => write!(f, "WiFi connection failed"),
            Self::AlreadyConnected => write!(f, "already connected to AP"),
        }
    }
}

pub trait ConnectivityPort {
    fn connect(&mut self) -> Result<(), ConnectivityError>;
    fn disconnect(&mut self);
    fn is_connected(&self) -> bool;
}

// ───────────────────────────────────────────────────────────────
// Telemetry transports
// ───────────────────────────────────────────────────────────────

/// One message for the broker.  `topic` is the full topic path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MqttMessage {
    pub topic: std::string::String,
    pub payload: std::string::String,
}

/// Message-bus primitive used by the MQTT sink.
pub trait MqttTransport {
    /// Deliver every message, or fail as a whole, within `timeout`.
    fn publish_batch(&mut self, messages: &[MqttMessage], timeout: Duration)
    -> Result<(), TransportError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: std::string::String,
}

/// HTTP GET primitive used by the weather-service sinks.
pub trait HttpTransport {
    fn get(&mut self, url: &str, timeout: Duration) -> Result<HttpResponse, TransportError>;
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging / telemetry)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`AppEvent`](super::events::AppEvent)s
/// through this port.  Adapters decide where they go.
pub trait EventSink {
    fn emit(&mut self, event: &super::events::AppEvent);
}

// ───────────────────────────────────────────────────────────────
// Configuration port (driven adapter: domain ↔ persistent config)
// ───────────────────────────────────────────────────────────────

/// Loads and persists station configuration.
///
/// # Security
///
/// Implementations MUST validate config values before persisting.
/// Invalid ranges are rejected with [`ConfigError::ValidationFailed`],
/// not silently clamped.
pub trait ConfigPort {
    /// Load configuration from persistent storage.
    /// Returns [`StationConfig::default()`] if no stored config exists.
    fn load(&self) -> Result<StationConfig, ConfigError>;

    /// Validate and persist configuration.
    fn save(&self, config: &StationConfig) -> Result<(), ConfigError>;
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`ConfigPort`] operations and configuration validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// No config found in storage (first boot).
    NotFound,
    /// Stored config failed integrity / deserialization check.
    Corrupted,
    /// A config field failed range validation.
    /// The `&'static str` describes which field and why.
    ValidationFailed(&'static str),
    /// Underlying storage is full.
    StorageFull,
    /// Generic I/O error from the storage backend.
    IoError,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "config not found"),
            Self::Corrupted => write!(f, "config corrupted"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
            Self::StorageFull => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

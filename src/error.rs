//! Unified error types for the weather-station firmware.
//!
//! Every failure below the wake-cycle level is absorbed and recorded in the
//! [`CycleOutcome`](crate::fsm::context::CycleOutcome); only configuration
//! errors are fatal, and only at boot.  All variants are `Copy` so they can
//! be stored in the per-cycle outcome without allocation.

use core::fmt;

use crate::app::ports::ConfigError;

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

/// Every fallible boot-time operation funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Configuration is invalid or could not be loaded.
    Config(ConfigError),
    /// A sensor device could not be read.
    Device(DeviceError),
    /// A telemetry sink rejected or failed a publish.
    Sink(SinkError),
    /// The firmware update check failed.
    Ota(OtaCheckError),
    /// The sensor rail could not be driven.
    Power(PowerError),
    /// Peripheral initialisation failed.
    Init(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "config: {e}"),
            Self::Device(e) => write!(f, "device: {e}"),
            Self::Sink(e) => write!(f, "sink: {e}"),
            Self::Ota(e) => write!(f, "ota: {e}"),
            Self::Power(e) => write!(f, "power: {e}"),
            Self::Init(msg) => write!(f, "init: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

// ---------------------------------------------------------------------------
// Device errors
// ---------------------------------------------------------------------------

/// Per-device acquisition failure.  Recovered locally by excluding the
/// device from reconciliation for the current cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceError {
    /// The device did not answer within its per-device timeout.
    TimedOut,
    /// Bus transaction failed (NACK, arbitration loss, bad pulse train).
    Bus,
    /// Frame checksum mismatch.
    Checksum,
    /// The device did not identify itself (absent or wrong chip id).
    NotPresent,
    /// The sample lacked a quantity the device family must report.
    Incomplete,
    /// A reported value was outside the physically plausible range.
    OutOfRange,
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TimedOut => write!(f, "timed out"),
            Self::Bus => write!(f, "bus error"),
            Self::Checksum => write!(f, "checksum mismatch"),
            Self::NotPresent => write!(f, "device not present"),
            Self::Incomplete => write!(f, "incomplete sample"),
            Self::OutOfRange => write!(f, "value out of range"),
        }
    }
}

impl From<DeviceError> for Error {
    fn from(e: DeviceError) -> Self {
        Self::Device(e)
    }
}

// ---------------------------------------------------------------------------
// Transport errors (MQTT / HTTP primitives)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    /// Could not open a connection to the remote host.
    ConnectFailed,
    /// The remote did not answer within the allotted time.
    TimedOut,
    /// The request could not be written or the response read.
    Io,
    /// The TLS handshake failed.
    Tls,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectFailed => write!(f, "connect failed"),
            Self::TimedOut => write!(f, "timed out"),
            Self::Io => write!(f, "I/O error"),
            Self::Tls => write!(f, "TLS handshake failed"),
        }
    }
}

// ---------------------------------------------------------------------------
// Sink errors
// ---------------------------------------------------------------------------

/// Per-sink publish failure.  Recorded in the cycle outcome; never blocks
/// other sinks and never retried within the same cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkError {
    /// The publish did not complete within the sink's timeout.
    TimedOut,
    /// The network link was down; the sink was not attempted.
    NetworkUnavailable,
    /// The underlying transport failed.
    Transport(TransportError),
    /// The service rejected the station credentials.
    Unauthorized,
    /// The service answered with an unexpected status code.
    Rejected(u16),
    /// The request could not be built (e.g. URL exceeds buffer).
    Encoding,
}

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TimedOut => write!(f, "publish timed out"),
            Self::NetworkUnavailable => write!(f, "network unavailable"),
            Self::Transport(e) => write!(f, "transport: {e}"),
            Self::Unauthorized => write!(f, "credentials rejected"),
            Self::Rejected(status) => write!(f, "rejected with HTTP {status}"),
            Self::Encoding => write!(f, "request encoding failed"),
        }
    }
}

impl From<TransportError> for SinkError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::TimedOut => Self::TimedOut,
            other => Self::Transport(other),
        }
    }
}

impl From<SinkError> for Error {
    fn from(e: SinkError) -> Self {
        Self::Sink(e)
    }
}

// ---------------------------------------------------------------------------
// OTA check errors
// ---------------------------------------------------------------------------

/// Failure during the firmware-update check.  Logged; the cycle proceeds to
/// the sensor phase as if no update were available.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtaCheckError {
    /// The network link could not be brought up.
    Network,
    /// The image source could not be queried.
    Transport(TransportError),
    /// The check did not finish within the OTA window.
    TimedOut,
    /// The offered image was rejected (size, digest, partition).
    Image(OtaError),
}

impl fmt::Display for OtaCheckError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network => write!(f, "network unavailable"),
            Self::Transport(e) => write!(f, "transport: {e}"),
            Self::TimedOut => write!(f, "window elapsed"),
            Self::Image(e) => write!(f, "image: {e}"),
        }
    }
}

impl From<OtaError> for OtaCheckError {
    fn from(e: OtaError) -> Self {
        Self::Image(e)
    }
}

impl From<TransportError> for OtaCheckError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::TimedOut => Self::TimedOut,
            other => Self::Transport(other),
        }
    }
}

impl From<OtaCheckError> for Error {
    fn from(e: OtaCheckError) -> Self {
        Self::Ota(e)
    }
}

/// Errors from the OTA partition session itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtaError {
    AlreadyInProgress,
    InvalidSize,
    BeginFailed,
    WriteFailed,
    DigestMismatch,
    BootSetFailed,
    IncompleteTransfer,
    NotReceiving,
    NonSequential,
    Overflow,
}

impl fmt::Display for OtaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyInProgress => write!(f, "OTA session already in progress"),
            Self::InvalidSize => write!(f, "firmware size out of range (max 4 MB)"),
            Self::BeginFailed => write!(f, "OTA begin failed"),
            Self::WriteFailed => write!(f, "OTA write failed"),
            Self::DigestMismatch => write!(f, "SHA-256 digest mismatch"),
            Self::BootSetFailed => write!(f, "set boot partition failed"),
            Self::IncompleteTransfer => write!(f, "finalize called before all bytes written"),
            Self::NotReceiving => write!(f, "operation requires active Receiving state"),
            Self::NonSequential => write!(f, "chunk offset does not match expected offset"),
            Self::Overflow => write!(f, "chunk would exceed declared firmware size"),
        }
    }
}

// ---------------------------------------------------------------------------
// Power errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerError {
    /// The rail control line could not be raised.
    RailEnableFailed,
    /// The rail control line could not be lowered.
    RailDisableFailed,
}

impl fmt::Display for PowerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RailEnableFailed => write!(f, "sensor rail enable failed"),
            Self::RailDisableFailed => write!(f, "sensor rail disable failed"),
        }
    }
}

impl From<PowerError> for Error {
    fn from(e: PowerError) -> Self {
        Self::Power(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_timeout_maps_to_sink_timeout() {
        assert_eq!(SinkError::from(TransportError::TimedOut), SinkError::TimedOut);
        assert_eq!(
            SinkError::from(TransportError::Io),
            SinkError::Transport(TransportError::Io)
        );
    }

    #[test]
    fn transport_timeout_maps_to_ota_timeout() {
        assert_eq!(
            OtaCheckError::from(TransportError::TimedOut),
            OtaCheckError::TimedOut
        );
    }

    #[test]
    fn display_is_operator_readable() {
        assert_eq!(SinkError::Rejected(503).to_string(), "rejected with HTTP 503");
        assert_eq!(
            Error::from(DeviceError::TimedOut).to_string(),
            "device: timed out"
        );
        assert!(OtaError::DigestMismatch.to_string().contains("SHA-256"));
    }
}

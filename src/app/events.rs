//! Outbound application events.
//!
//! The [`WakeCycleOrchestrator`](super::service::WakeCycleOrchestrator)
//! emits these through the [`EventSink`](super::ports::EventSink) port.
//! Adapters on the other side decide what to do with them: log to serial,
//! count them in a test, and so on.

use crate::error::{DeviceError, SinkError};
use crate::fsm::StateId;
use crate::fsm::context::CycleOutcome;
use crate::sensors::DeviceLabel;

/// Structured events emitted by the application core.
#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    /// A wake signal was consumed and a new cycle began.
    CycleStarted { cycle: u32 },

    /// The FSM transitioned between states.
    StateChanged { from: StateId, to: StateId },

    /// One device could not be read this cycle.
    DeviceFailed {
        label: DeviceLabel,
        error: DeviceError,
    },

    /// One sink was attempted and failed.
    SinkFailed {
        sink: &'static str,
        error: SinkError,
    },

    /// The cycle is back in Idle.
    CycleCompleted(CycleSummary),
}

/// Condensed view of a [`CycleOutcome`], small enough for a single log
/// line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleSummary {
    pub cycle: u32,
    /// Quantities with a finalized value.
    pub finalized: u8,
    pub failed_devices: u8,
    pub published_sinks: u8,
    pub failed_sinks: u8,
    pub cancelled: bool,
    pub ota_applied: bool,
}

impl From<&CycleOutcome> for CycleSummary {
    fn from(outcome: &CycleOutcome) -> Self {
        let count = |pred: fn(&crate::sinks::SinkOutcome) -> bool| {
            outcome.sink_results.iter().filter(|(_, o)| pred(o)).count() as u8
        };
        Self {
            cycle: outcome.cycle,
            finalized: outcome.readings_finalized.len() as u8,
            failed_devices: outcome.failed_devices() as u8,
            published_sinks: count(|o| o.is_published()),
            failed_sinks: count(|o| matches!(o, crate::sinks::SinkOutcome::Failed(_))),
            cancelled: outcome.cancelled,
            ota_applied: outcome.ota_applied,
        }
    }
}

//! Per-cycle blackboard threaded through every FSM handler.
//!
//! The orchestrator performs each phase's I/O, writes the result into
//! [`CycleContext`], and ticks the FSM.  Handlers only read the phase flags
//! and decide the next state, so the transition rules can be tested
//! without any hardware or fakes.

use heapless::Vec as HVec;

use super::StateId;
use crate::error::{OtaCheckError, PowerError};
use crate::ota::window::OtaDenial;
use crate::reconcile::FinalizedSet;
use crate::sensors::{DeviceLabel, DeviceStatus, Reading};
use crate::sinks::SinkOutcome;

/// Longest possible trace is the eight-step happy path; leave headroom.
pub const TRACE_CAPACITY: usize = 16;

// ---------------------------------------------------------------------------
// Cycle outcome
// ---------------------------------------------------------------------------

/// What happened in the OtaCheck state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtaStatus {
    /// The cycle never reached OtaCheck.
    NotReached,
    /// The window policy said no; the updater was not called.
    NotPermitted(OtaDenial),
    NoUpdate,
    Applied,
    CheckFailed(OtaCheckError),
}

/// The single record of one wake cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleOutcome {
    pub cycle: u32,
    pub ota_checked: bool,
    pub ota_applied: bool,
    pub ota_status: OtaStatus,
    pub readings_finalized: FinalizedSet,
    pub raw_readings: Vec<Reading>,
    pub device_statuses: Vec<(DeviceLabel, DeviceStatus)>,
    /// One entry per configured sink, in publish order.
    pub sink_results: Vec<(&'static str, SinkOutcome)>,
    /// Publishing stopped early because the awake budget ran out.
    pub cancelled: bool,
    /// Set if the sensor rail could not be switched.
    pub power_error: Option<PowerError>,
    /// Every state entered, in order, starting with `Idle`.
    pub trace: HVec<StateId, TRACE_CAPACITY>,
}

impl CycleOutcome {
    pub fn new(cycle: u32) -> Self {
        Self {
            cycle,
            ota_checked: false,
            ota_applied: false,
            ota_status: OtaStatus::NotReached,
            readings_finalized: FinalizedSet::default(),
            raw_readings: Vec::new(),
            device_statuses: Vec::new(),
            sink_results: Vec::new(),
            cancelled: false,
            power_error: None,
            trace: HVec::new(),
        }
    }

    pub fn sink_result(&self, name: &str) -> Option<SinkOutcome> {
        self.sink_results
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, o)| *o)
    }

    pub fn visited(&self, state: StateId) -> bool {
        self.trace.contains(&state)
    }

    pub fn failed_devices(&self) -> usize {
        self.device_statuses
            .iter()
            .filter(|(_, s)| *s != DeviceStatus::Ok)
            .count()
    }
}

// ---------------------------------------------------------------------------
// CycleContext
// ---------------------------------------------------------------------------

pub struct CycleContext {
    // -- Timing --
    /// Ticks elapsed since the current state was entered.
    pub ticks_in_state: u64,
    /// Total ticks this cycle.
    pub total_ticks: u64,

    // -- Phase flags (written by the orchestrator) --
    /// The wake signal arrived and has not been consumed yet.
    pub wake_pending: bool,
    /// The rail is up and its settle time has elapsed (or switching it failed).
    pub warmup_complete: bool,
    /// Every sink has an outcome.
    pub publishing_complete: bool,
    /// The rail handle has been released and the link dropped.
    pub rail_released: bool,

    // -- Result --
    pub outcome: CycleOutcome,
}

impl CycleContext {
    pub fn new(cycle: u32) -> Self {
        Self {
            ticks_in_state: 0,
            total_ticks: 0,
            wake_pending: false,
            warmup_complete: false,
            publishing_complete: false,
            rail_released: false,
            outcome: CycleOutcome::new(cycle),
        }
    }

    /// Append to the state trace.  Overflow is dropped silently; it cannot
    /// happen in a well-formed cycle.
    pub fn record_state(&mut self, state: StateId) {
        let _ = self.outcome.trace.push(state);
    }
}

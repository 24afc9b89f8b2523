//! Wake-cycle orchestrator: the hexagonal core.
//!
//! [`WakeCycleOrchestrator`] owns the process-wide pieces (rail controller,
//! sensor array, sinks, OTA policy, firmware and network ports) and drives
//! one cycle per wake signal.  Each state's I/O is performed here, its
//! result written into the [`CycleContext`], and the FSM then decides the
//! next state.
//!
//! ```text
//!  SensorBus ──▶ ┌──────────────────────────────┐ ──▶ PublishSink × 3
//!  Firmware  ──▶ │    WakeCycleOrchestrator     │ ──▶ EventSink
//!  Clock     ──▶ │ FSM · Power · Reconciler     │ ──▶ rail pin
//!                └──────────────────────────────┘
//! ```
//!
//! Every step is bounded: the OTA check by the window length, each device
//! read by the device timeout, each sink by the sink timeout clipped to the
//! remaining awake budget.  No failure below the cycle level escapes
//! `run_cycle`; all of them end up in the returned [`CycleOutcome`].

use core::time::Duration;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use log::{error, info, warn};

use crate::config::{CycleTiming, ValidatedConfig};
use crate::error::{DeviceError, SinkError};
use crate::fsm::context::{CycleContext, CycleOutcome, OtaStatus};
use crate::fsm::states::build_state_table;
use crate::fsm::{Fsm, StateId};
use crate::ota::window::OtaWindowPolicy;
use crate::power::{PowerController, ScopedPowerHandle};
use crate::reconcile::Reconciler;
use crate::sensors::{DeviceResult, DeviceStatus, SensorArray};
use crate::sinks::{PublishBatch, PublishSink, ReportingMode, SinkOutcome, SkipReason};

use super::events::{AppEvent, CycleSummary};
use super::ports::{Clock, ConnectivityPort, EventSink, FirmwareUpdatePort, UpdateCheck};

/// A well-formed cycle needs eight ticks; anything beyond this is a bug
/// in the transition table and the cycle is forced back to Idle.
const MAX_TICKS_PER_CYCLE: usize = 32;

// ───────────────────────────────────────────────────────────────
// Network link, brought up at most once per cycle
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Link {
    Untried,
    Up,
    Down,
}

impl Link {
    fn ensure(&mut self, network: &mut impl ConnectivityPort) -> bool {
        if *self == Link::Untried {
            *self = if network.is_connected() {
                Link::Up
            } else {
                match network.connect() {
                    Ok(()) => Link::Up,
                    Err(e) => {
                        warn!("Network: {}", e);
                        Link::Down
                    }
                }
            };
        }
        *self == Link::Up
    }
}

// ───────────────────────────────────────────────────────────────
// WakeCycleOrchestrator
// ───────────────────────────────────────────────────────────────

pub struct WakeCycleOrchestrator<R, D, F, N>
where
    R: OutputPin,
    D: DelayNs,
{
    ota_policy: OtaWindowPolicy,
    firmware: F,
    network: N,
    power: PowerController<R, D>,
    sensors: SensorArray,
    sinks: Vec<Box<dyn PublishSink>>,
    mode: ReportingMode,
    timing: CycleTiming,
    cycle_count: u32,
}

impl<R, D, F, N> WakeCycleOrchestrator<R, D, F, N>
where
    R: OutputPin,
    D: DelayNs,
    F: FirmwareUpdatePort,
    N: ConnectivityPort,
{
    /// Assemble the orchestrator.  `sinks` are published to in the given
    /// order.
    pub fn new(
        config: &ValidatedConfig,
        power: PowerController<R, D>,
        sensors: SensorArray,
        sinks: Vec<Box<dyn PublishSink>>,
        firmware: F,
        network: N,
    ) -> Self {
        Self {
            ota_policy: config.ota_policy(),
            firmware,
            network,
            power,
            sensors,
            sinks,
            mode: config.reporting_mode(),
            timing: config.timing(),
            cycle_count: 0,
        }
    }

    pub fn cycle_count(&self) -> u32 {
        self.cycle_count
    }

    pub fn rail_powered(&self) -> bool {
        self.power.is_powered()
    }

    pub fn sensors(&self) -> &SensorArray {
        &self.sensors
    }

    pub fn network(&self) -> &N {
        &self.network
    }

    /// Consume one wake signal and run the cycle through to Idle.
    pub fn run_cycle(&mut self, clock: &impl Clock, events: &mut impl EventSink) -> CycleOutcome {
        self.cycle_count = self.cycle_count.wrapping_add(1);
        let cycle = self.cycle_count;

        // Disjoint borrows: the rail handle holds `power` for the rest of
        // the cycle while the other fields stay usable.
        let Self {
            ota_policy,
            firmware,
            network,
            power,
            sensors,
            sinks,
            mode,
            timing,
            ..
        } = self;

        let deadline_ms = clock
            .monotonic_ms()
            .saturating_add(timing.awake_budget.as_millis() as u64);
        let mut link = Link::Untried;
        // Taken on first use so the rail can be raised at most once.
        let mut power = Some(power);
        let mut rail: Option<ScopedPowerHandle<'_, R, D>> = None;
        let started_at = clock.utc_now();

        let mut fsm = Fsm::new(build_state_table(), StateId::Idle);
        let mut ctx = CycleContext::new(cycle);
        fsm.start(&mut ctx);
        ctx.wake_pending = true;
        events.emit(&AppEvent::CycleStarted { cycle });
        info!("Cycle {} started at {}", cycle, started_at);

        for _ in 0..MAX_TICKS_PER_CYCLE {
            let state = fsm.current_state();
            match state {
                StateId::Idle => {}
                StateId::OtaCheck => {
                    if ctx.outcome.ota_status == OtaStatus::NotReached {
                        check_for_update(*ota_policy, firmware, network, &mut link, clock, &mut ctx.outcome);
                    }
                }
                StateId::SensorWarmup => {
                    if let Some(controller) = power.take() {
                        match controller.scoped_power_on() {
                            Ok(handle) => rail = Some(handle),
                            Err(e) => {
                                error!("Power: {}", e);
                                ctx.outcome.power_error = Some(e);
                            }
                        }
                    }
                    ctx.warmup_complete = true;
                }
                StateId::Acquiring => {
                    let results = if rail.is_some() {
                        sensors.acquire_all(clock, timing.device_timeout)
                    } else {
                        warn!("Acquiring: rail not powered, no device read this cycle");
                        sensors.fail_all(DeviceError::NotPresent)
                    };
                    record_devices(results, &mut ctx.outcome, events);
                }
                StateId::Reconciling => {
                    ctx.outcome.readings_finalized = Reconciler::finalize(&ctx.outcome.raw_readings);
                }
                StateId::Publishing => {
                    if !ctx.publishing_complete {
                        let plan = PublishPlan {
                            mode: *mode,
                            deadline_ms,
                            sink_timeout: timing.sink_timeout,
                        };
                        publish_all(sinks, network, &mut link, clock, &plan, &mut ctx.outcome, events);
                        ctx.publishing_complete = true;
                    }
                }
                StateId::PoweringDown => {
                    if !ctx.rail_released {
                        power_down(rail.take(), network, &mut ctx.outcome);
                        ctx.rail_released = true;
                    }
                }
            }

            fsm.tick(&mut ctx);
            let next = fsm.current_state();
            if next != state {
                events.emit(&AppEvent::StateChanged {
                    from: state,
                    to: next,
                });
            }
            if next == StateId::Idle && state != StateId::Idle {
                break;
            }
        }

        if fsm.current_state() != StateId::Idle {
            error!(
                "Cycle {} stuck in {}, forcing Idle",
                cycle,
                fsm.state_name(fsm.current_state())
            );
            power_down(rail.take(), network, &mut ctx.outcome);
            ctx.rail_released = true;
            let from = fsm.current_state();
            fsm.force_transition(StateId::Idle, &mut ctx);
            events.emit(&AppEvent::StateChanged {
                from,
                to: StateId::Idle,
            });
        }

        let outcome = ctx.outcome;
        events.emit(&AppEvent::CycleCompleted(CycleSummary::from(&outcome)));
        outcome
    }
}

// ───────────────────────────────────────────────────────────────
// Phase work
// ───────────────────────────────────────────────────────────────

fn check_for_update(
    policy: OtaWindowPolicy,
    firmware: &mut impl FirmwareUpdatePort,
    network: &mut impl ConnectivityPort,
    link: &mut Link,
    clock: &impl Clock,
    outcome: &mut CycleOutcome,
) {
    let now = clock.utc_now();
    if let Err(denial) = policy.evaluate(now) {
        info!("OTA: not permitted at {} ({})", now, denial);
        outcome.ota_status = OtaStatus::NotPermitted(denial);
        return;
    }

    outcome.ota_checked = true;
    if !link.ensure(network) {
        outcome.ota_status = OtaStatus::CheckFailed(crate::error::OtaCheckError::Network);
        return;
    }

    outcome.ota_status = match firmware.check_and_maybe_apply(policy.window().window()) {
        UpdateCheck::NoUpdate => OtaStatus::NoUpdate,
        UpdateCheck::Applied => {
            outcome.ota_applied = true;
            OtaStatus::Applied
        }
        UpdateCheck::CheckFailed(e) => OtaStatus::CheckFailed(e),
    };
}

fn record_devices(results: Vec<DeviceResult>, outcome: &mut CycleOutcome, events: &mut impl EventSink) {
    for result in results {
        match result.result {
            Ok(set) => {
                outcome.device_statuses.push((result.label, DeviceStatus::Ok));
                outcome.raw_readings.extend(set);
            }
            Err(error) => {
                events.emit(&AppEvent::DeviceFailed {
                    label: result.label.clone(),
                    error,
                });
                outcome
                    .device_statuses
                    .push((result.label, DeviceStatus::from(error)));
            }
        }
    }
}

struct PublishPlan {
    mode: ReportingMode,
    deadline_ms: u64,
    sink_timeout: Duration,
}

/// Give every sink an outcome, in order.  One sink's failure never keeps
/// the next from being attempted.
fn publish_all(
    sinks: &mut [Box<dyn PublishSink>],
    network: &mut impl ConnectivityPort,
    link: &mut Link,
    clock: &impl Clock,
    plan: &PublishPlan,
    outcome: &mut CycleOutcome,
    events: &mut impl EventSink,
) {
    let finalized = outcome.readings_finalized;
    let batch = PublishBatch {
        finalized: &finalized,
        raw: &outcome.raw_readings,
        mode: plan.mode,
    };
    let mut results = Vec::with_capacity(sinks.len());
    let mut cancelled = false;

    for sink in sinks.iter_mut() {
        let name = sink.name();
        let now = clock.monotonic_ms();

        let result = if !sink.enabled() {
            SinkOutcome::Skipped(SkipReason::Disabled)
        } else if now >= plan.deadline_ms {
            cancelled = true;
            SinkOutcome::Skipped(SkipReason::DeadlineReached)
        } else if finalized.is_empty() {
            SinkOutcome::Skipped(SkipReason::NoReadings)
        } else if !link.ensure(network) {
            SinkOutcome::Failed(SinkError::NetworkUnavailable)
        } else {
            let remaining = Duration::from_millis(plan.deadline_ms - now);
            match sink.publish(&batch, plan.sink_timeout.min(remaining)) {
                Ok(published) => SinkOutcome::Published(published),
                Err(e) => SinkOutcome::Failed(e),
            }
        };

        match result {
            SinkOutcome::Failed(error) => {
                warn!("Sink {}: {}", name, error);
                events.emit(&AppEvent::SinkFailed { sink: name, error });
            }
            other => info!("Sink {}: {}", name, other),
        }
        results.push((name, result));
    }

    outcome.sink_results = results;
    outcome.cancelled = cancelled;
}

fn power_down<R: OutputPin, D: DelayNs>(
    rail: Option<ScopedPowerHandle<'_, R, D>>,
    network: &mut impl ConnectivityPort,
    outcome: &mut CycleOutcome,
) {
    if let Some(handle) = rail {
        if let Err(e) = handle.release() {
            error!("Power: {}", e);
            outcome.power_error = Some(e);
        }
    }
    if network.is_connected() {
        network.disconnect();
    }
}

//! Concrete state handler functions and table builder.
//!
//! Each state is defined by plain `fn` pointers: no closures, no dynamic
//! dispatch, no heap.  Handlers only inspect the phase flags the
//! orchestrator wrote into [`CycleContext`].
//!
//! ```text
//!  IDLE ──[wake]──▶ OTA_CHECK ──[applied]──────────────────┐
//!    ▲                  │                                  │
//!    │                  ▼                                  ▼
//!    │            SENSOR_WARMUP ─▶ ACQUIRING ─▶ RECONCILING │
//!    │                                              │      │
//!    │                                              ▼      │
//!    └──[rail released]── POWERING_DOWN ◀── PUBLISHING     │
//!                              ▲                           │
//!                              └───────────────────────────┘
//! ```

use super::context::CycleContext;
use super::{StateDescriptor, StateId};
use log::{debug, info, warn};

// ═══════════════════════════════════════════════════════════════════════════
//  Table builder
// ═══════════════════════════════════════════════════════════════════════════

/// Build the static state table.  Called once per cycle.
pub fn build_state_table() -> [StateDescriptor; StateId::COUNT] {
    [
        // Index 0: Idle
        StateDescriptor {
            id: StateId::Idle,
            name: "Idle",
            on_enter: Some(idle_enter),
            on_exit: None,
            on_update: idle_update,
        },
        // Index 1: OtaCheck
        StateDescriptor {
            id: StateId::OtaCheck,
            name: "OtaCheck",
            on_enter: None,
            on_exit: Some(ota_check_exit),
            on_update: ota_check_update,
        },
        // Index 2: SensorWarmup
        StateDescriptor {
            id: StateId::SensorWarmup,
            name: "SensorWarmup",
            on_enter: None,
            on_exit: None,
            on_update: sensor_warmup_update,
        },
        // Index 3: Acquiring
        StateDescriptor {
            id: StateId::Acquiring,
            name: "Acquiring",
            on_enter: None,
            on_exit: Some(acquiring_exit),
            on_update: acquiring_update,
        },
        // Index 4: Reconciling
        StateDescriptor {
            id: StateId::Reconciling,
            name: "Reconciling",
            on_enter: None,
            on_exit: None,
            on_update: reconciling_update,
        },
        // Index 5: Publishing
        StateDescriptor {
            id: StateId::Publishing,
            name: "Publishing",
            on_enter: None,
            on_exit: Some(publishing_exit),
            on_update: publishing_update,
        },
        // Index 6: PoweringDown
        StateDescriptor {
            id: StateId::PoweringDown,
            name: "PoweringDown",
            on_enter: None,
            on_exit: None,
            on_update: powering_down_update,
        },
    ]
}

// ═══════════════════════════════════════════════════════════════════════════
//  IDLE: asleep between wakes
// ═══════════════════════════════════════════════════════════════════════════

fn idle_enter(ctx: &mut CycleContext) {
    if ctx.total_ticks == 0 {
        debug!("IDLE: cycle {} armed", ctx.outcome.cycle);
    } else {
        info!("IDLE: cycle {} done after {} ticks", ctx.outcome.cycle, ctx.total_ticks);
    }
}

fn idle_update(ctx: &mut CycleContext) -> Option<StateId> {
    if ctx.wake_pending {
        ctx.wake_pending = false;
        return Some(StateId::OtaCheck);
    }
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  OTA_CHECK: window evaluated and (maybe) update pulled by the orchestrator
// ═══════════════════════════════════════════════════════════════════════════

fn ota_check_update(ctx: &mut CycleContext) -> Option<StateId> {
    if ctx.outcome.ota_applied {
        // New image is bootable: skip the sensor phase, restart after sleep prep.
        return Some(StateId::PoweringDown);
    }
    Some(StateId::SensorWarmup)
}

fn ota_check_exit(ctx: &mut CycleContext) {
    info!("OTA_CHECK: {:?}", ctx.outcome.ota_status);
}

// ═══════════════════════════════════════════════════════════════════════════
//  SENSOR_WARMUP: rail raised, waiting out settle time
// ═══════════════════════════════════════════════════════════════════════════

fn sensor_warmup_update(ctx: &mut CycleContext) -> Option<StateId> {
    if ctx.warmup_complete {
        return Some(StateId::Acquiring);
    }
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  ACQUIRING / RECONCILING: unconditional, even with zero devices alive
// ═══════════════════════════════════════════════════════════════════════════

fn acquiring_update(_ctx: &mut CycleContext) -> Option<StateId> {
    Some(StateId::Reconciling)
}

fn acquiring_exit(ctx: &mut CycleContext) {
    let failed = ctx.outcome.failed_devices();
    if failed > 0 {
        warn!(
            "ACQUIRING: {}/{} devices failed",
            failed,
            ctx.outcome.device_statuses.len()
        );
    }
}

fn reconciling_update(_ctx: &mut CycleContext) -> Option<StateId> {
    Some(StateId::Publishing)
}

// ═══════════════════════════════════════════════════════════════════════════
//  PUBLISHING: every sink gets an outcome
// ═══════════════════════════════════════════════════════════════════════════

fn publishing_update(ctx: &mut CycleContext) -> Option<StateId> {
    if ctx.publishing_complete {
        return Some(StateId::PoweringDown);
    }
    None
}

fn publishing_exit(ctx: &mut CycleContext) {
    if ctx.outcome.cancelled {
        warn!("PUBLISHING: awake budget exhausted, remaining sinks skipped");
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  POWERING_DOWN: rail released, link dropped
// ═══════════════════════════════════════════════════════════════════════════

fn powering_down_update(ctx: &mut CycleContext) -> Option<StateId> {
    if ctx.rail_released {
        return Some(StateId::Idle);
    }
    None
}

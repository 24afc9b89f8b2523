//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing one structured line per application
//! event to the ESP-IDF logger (UART in production).  Operators grep the
//! serial capture by the leading tag.

use log::{info, warn};

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`AppEvent`] to the serial console.
#[derive(Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        match event {
            AppEvent::CycleStarted { cycle } => {
                info!("CYCLE | #{} started", cycle);
            }
            AppEvent::StateChanged { from, to } => {
                info!("STATE | {:?} -> {:?}", from, to);
            }
            AppEvent::DeviceFailed { label, error } => {
                warn!("DEVICE | {} | {}", label, error);
            }
            AppEvent::SinkFailed { sink, error } => {
                warn!("SINK | {} | {}", sink, error);
            }
            AppEvent::CycleCompleted(s) => {
                info!(
                    "CYCLE | #{} done | finalized={} | failed_devices={} | \
                     published={} failed_sinks={} | cancelled={} | ota_applied={}",
                    s.cycle,
                    s.finalized,
                    s.failed_devices,
                    s.published_sinks,
                    s.failed_sinks,
                    s.cancelled,
                    s.ota_applied,
                );
            }
        }
    }
}

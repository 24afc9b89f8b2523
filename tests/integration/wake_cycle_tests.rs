//! End-to-end wake cycles against mock hardware.

use std::time::Duration;

use weatherstation::app::events::AppEvent;
use weatherstation::app::ports::{ConnectivityPort, UpdateCheck};
use weatherstation::app::service::WakeCycleOrchestrator;
use weatherstation::error::{DeviceError, OtaCheckError, PowerError, SinkError};
use weatherstation::fsm::StateId;
use weatherstation::fsm::context::OtaStatus;
use weatherstation::ota::OtaDenial;
use weatherstation::power::PowerController;
use weatherstation::sensors::{DeviceStatus, Quantity, SensorArray};
use weatherstation::sinks::{SinkOutcome, SkipReason, build_sinks};

use crate::mock_hw::*;

const FULL_TRACE: [StateId; 8] = [
    StateId::Idle,
    StateId::OtaCheck,
    StateId::SensorWarmup,
    StateId::Acquiring,
    StateId::Reconciling,
    StateId::Publishing,
    StateId::PoweringDown,
    StateId::Idle,
];

fn approx(a: f32, b: f32) -> bool {
    (a - b).abs() < 1e-4
}

// ── Scenario A: closed hour mask ──────────────────────────────

#[test]
fn closed_hour_mask_never_checks_for_updates() {
    let mut station = StationBuilder::default();
    station.config.ota_hour_mask = heapless::String::try_from("NNNNNNNNNNNNNNNNNNNNNNNN").unwrap();
    let firmware_calls = station.firmware.calls.clone();
    let mut orch = station.build();

    // Top of an hour that the reference mask would allow.
    let outcome = orch.run_cycle(&MockClock::at(12, 0, 0), &mut RecordingEvents::default());

    assert!(!outcome.ota_checked);
    assert_eq!(outcome.ota_status, OtaStatus::NotPermitted(OtaDenial::HourClosed));
    assert!(firmware_calls.borrow().is_empty());
    assert_eq!(outcome.trace.as_slice(), &FULL_TRACE);
}

#[test]
fn open_window_checks_with_window_length_as_timeout() {
    let station = StationBuilder::default();
    let firmware_calls = station.firmware.calls.clone();
    let mut orch = station.build();

    let outcome = orch.run_cycle(&MockClock::at(12, 0, 5), &mut RecordingEvents::default());

    assert!(outcome.ota_checked);
    assert_eq!(outcome.ota_status, OtaStatus::NoUpdate);
    assert_eq!(firmware_calls.borrow().as_slice(), &[Duration::from_secs(15)]);
    assert_eq!(outcome.trace.as_slice(), &FULL_TRACE);
}

#[test]
fn past_top_of_hour_window_is_denied() {
    let mut orch = StationBuilder::default().build();
    let outcome = orch.run_cycle(&MockClock::at(12, 0, 15), &mut RecordingEvents::default());
    assert_eq!(
        outcome.ota_status,
        OtaStatus::NotPermitted(OtaDenial::OutsideTopOfHour)
    );
}

#[test]
fn failed_update_check_still_reads_and_publishes() {
    let mut station = StationBuilder::default();
    station.firmware = MockFirmware::answering(UpdateCheck::CheckFailed(OtaCheckError::TimedOut));
    let mut orch = station.build();

    let outcome = orch.run_cycle(&MockClock::at(0, 0, 1), &mut RecordingEvents::default());

    assert_eq!(outcome.ota_status, OtaStatus::CheckFailed(OtaCheckError::TimedOut));
    assert!(!outcome.ota_applied);
    assert_eq!(outcome.readings_finalized.len(), 3);
    assert!(outcome.sink_results.iter().all(|(_, r)| r.is_published()));
}

// ── Scenario B: two BME280s ───────────────────────────────────

#[test]
fn two_bme280_temperatures_are_averaged() {
    let mut station = StationBuilder::default();
    station.config.dht22_data_pins.clear();
    let mut orch = station.build();

    let outcome = orch.run_cycle(&MockClock::at(5, 30, 0), &mut RecordingEvents::default());

    let t = outcome
        .readings_finalized
        .get(Quantity::Temperature)
        .copied()
        .unwrap();
    assert!(approx(t.value, 21.2), "mean was {}", t.value);
    assert!(approx(t.spread, 0.4), "spread was {}", t.spread);
    assert_eq!(t.contributing_device_count, 2);
    assert_eq!(t.unit, "°C");
    assert_eq!(outcome.raw_readings.len(), 6);
}

#[test]
fn mixed_families_reconcile_per_quantity() {
    let mut orch = StationBuilder::default().build();
    let outcome = orch.run_cycle(&MockClock::at(5, 30, 0), &mut RecordingEvents::default());

    let f = &outcome.readings_finalized;
    assert_eq!(f.get(Quantity::Temperature).unwrap().contributing_device_count, 4);
    assert_eq!(f.get(Quantity::Humidity).unwrap().contributing_device_count, 4);
    assert_eq!(f.get(Quantity::Pressure).unwrap().contributing_device_count, 2);
    assert!(approx(f.get(Quantity::Humidity).unwrap().value, 43.0));
    assert!(approx(f.get(Quantity::Pressure).unwrap().value, 1013.5));
}

#[test]
fn one_failed_device_is_excluded_not_fatal() {
    let mut station = StationBuilder::default();
    station.pressure_bus = ScriptedBus::default()
        .answer(18, Ok(bme_sample(21.0, 40.0, 1013.0)))
        .answer(25, Err(DeviceError::Bus));
    let mut orch = station.build();
    let mut events = RecordingEvents::default();

    let outcome = orch.run_cycle(&MockClock::at(5, 30, 0), &mut events);

    assert_eq!(outcome.failed_devices(), 1);
    assert!(
        outcome
            .device_statuses
            .iter()
            .any(|(label, s)| label.as_str() == "bme280-2" && *s == DeviceStatus::BusError)
    );
    let p = outcome.readings_finalized.get(Quantity::Pressure).unwrap();
    assert_eq!(p.contributing_device_count, 1);
    assert!(approx(p.spread, 0.0));
    assert!(events.events.iter().any(|e| matches!(
        e,
        AppEvent::DeviceFailed { label, error: DeviceError::Bus } if label.as_str() == "bme280-2"
    )));
}

#[test]
fn implausible_sample_drops_the_whole_device() {
    let mut station = StationBuilder::default();
    station.humidity_bus = ScriptedBus::default()
        .answer(14, Ok(dht_sample(20.0, 140.0)))
        .answer(16, Ok(dht_sample(21.0, 45.0)));
    let mut orch = station.build();

    let outcome = orch.run_cycle(&MockClock::at(5, 30, 0), &mut RecordingEvents::default());

    // dht22-1 contributes neither temperature nor humidity.
    assert!(outcome.raw_readings.iter().all(|r| r.source_label.as_str() != "dht22-1"));
    assert_eq!(
        outcome
            .readings_finalized
            .get(Quantity::Temperature)
            .unwrap()
            .contributing_device_count,
        3
    );
}

// ── Scenario C: every device fails ────────────────────────────

#[test]
fn all_devices_failing_publishes_nothing_stale() {
    let mut station = StationBuilder::default();
    station.pressure_bus = ScriptedBus::default();
    station.humidity_bus = ScriptedBus::default();
    let mqtt = station.mqtt.clone();
    let pws = station.pws.clone();
    let underground = station.underground.clone();
    let rail = station.rail.clone();
    let mut orch = station.build();

    let outcome = orch.run_cycle(&MockClock::at(5, 30, 0), &mut RecordingEvents::default());

    assert!(outcome.readings_finalized.is_empty());
    assert_eq!(outcome.failed_devices(), 4);
    for (_, result) in &outcome.sink_results {
        assert_eq!(*result, SinkOutcome::Skipped(SkipReason::NoReadings));
    }
    assert_eq!(mqtt.batches.get(), 0);
    assert_eq!((pws.calls(), underground.calls()), (0, 0));
    assert_eq!(rail.times_raised(), 1);
    assert!(!rail.is_high());
}

// ── Scenario D: MQTT disabled ─────────────────────────────────

#[test]
fn disabled_mqtt_is_skipped_and_never_attempted() {
    let mut station = StationBuilder::default();
    station.config.mqtt.enabled = false;
    let mqtt = station.mqtt.clone();
    let mut orch = station.build();

    let outcome = orch.run_cycle(&MockClock::at(5, 30, 0), &mut RecordingEvents::default());

    let names: Vec<_> = outcome.sink_results.iter().map(|(n, _)| *n).collect();
    assert_eq!(names, ["mqtt", "pws", "underground"]);
    let skipped = outcome
        .sink_results
        .iter()
        .filter(|(_, r)| *r == SinkOutcome::Skipped(SkipReason::Disabled))
        .count();
    let attempted = outcome.sink_results.iter().filter(|(_, r)| r.was_attempted()).count();
    assert_eq!((skipped, attempted), (1, 2));
    assert_eq!(mqtt.batches.get(), 0);
}

// ── OTA applied ───────────────────────────────────────────────

#[test]
fn applied_update_abandons_the_cycle_before_warmup() {
    let mut station = StationBuilder::default();
    station.firmware = MockFirmware::answering(UpdateCheck::Applied);
    let rail = station.rail.clone();
    let reads = station.pressure_bus.reads.clone();
    let pws = station.pws.clone();
    let mut orch = station.build();

    let outcome = orch.run_cycle(&MockClock::at(13, 0, 2), &mut RecordingEvents::default());

    assert!(outcome.ota_applied);
    assert_eq!(outcome.ota_status, OtaStatus::Applied);
    assert_eq!(
        outcome.trace.as_slice(),
        &[StateId::Idle, StateId::OtaCheck, StateId::PoweringDown, StateId::Idle]
    );
    assert_eq!(rail.times_raised(), 0);
    assert!(reads.borrow().is_empty());
    assert!(outcome.sink_results.is_empty());
    assert_eq!(pws.calls(), 0);
    assert!(!orch.network().is_connected());
}

// ── Network ───────────────────────────────────────────────────

#[test]
fn unreachable_network_fails_ota_and_every_enabled_sink() {
    let mut station = StationBuilder::default();
    station.network.unreachable = true;
    station.config.underground.enabled = false;
    let firmware_calls = station.firmware.calls.clone();
    let mut orch = station.build();

    let outcome = orch.run_cycle(&MockClock::at(12, 0, 3), &mut RecordingEvents::default());

    assert_eq!(outcome.ota_status, OtaStatus::CheckFailed(OtaCheckError::Network));
    assert!(firmware_calls.borrow().is_empty());
    assert_eq!(outcome.readings_finalized.len(), 3);
    assert_eq!(
        outcome.sink_result("mqtt"),
        Some(SinkOutcome::Failed(SinkError::NetworkUnavailable))
    );
    assert_eq!(
        outcome.sink_result("pws"),
        Some(SinkOutcome::Failed(SinkError::NetworkUnavailable))
    );
    assert_eq!(
        outcome.sink_result("underground"),
        Some(SinkOutcome::Skipped(SkipReason::Disabled))
    );
    assert_eq!(orch.network().connects, 1);
}

#[test]
fn link_is_brought_down_after_publishing() {
    let mut orch = StationBuilder::default().build();
    orch.run_cycle(&MockClock::at(5, 30, 0), &mut RecordingEvents::default());
    let net = orch.network();
    assert_eq!((net.connects, net.disconnects), (1, 1));
    assert!(!net.is_connected());
}

// ── Cancellation ──────────────────────────────────────────────

#[test]
fn awake_budget_exhaustion_skips_remaining_sinks() {
    let clock = MockClock::at(5, 30, 0);
    let mut station = StationBuilder::default();
    // The broker eats more than the whole 90 s budget.
    station.mqtt.cost = Some((clock.mono_ms.clone(), 95_000));
    let pws = station.pws.clone();
    let rail = station.rail.clone();
    let mut orch = station.build();

    let outcome = orch.run_cycle(&clock, &mut RecordingEvents::default());

    assert!(outcome.cancelled);
    assert!(outcome.sink_result("mqtt").unwrap().is_published());
    assert_eq!(
        outcome.sink_result("pws"),
        Some(SinkOutcome::Skipped(SkipReason::DeadlineReached))
    );
    assert_eq!(
        outcome.sink_result("underground"),
        Some(SinkOutcome::Skipped(SkipReason::DeadlineReached))
    );
    assert_eq!(pws.calls(), 0);
    assert!(outcome.visited(StateId::PoweringDown));
    assert!(!rail.is_high());
}

#[test]
fn sink_timeout_is_clipped_to_remaining_budget() {
    let clock = MockClock::at(5, 30, 0);
    let mut station = StationBuilder::default();
    station.mqtt.cost = Some((clock.mono_ms.clone(), 85_000));
    let pws = station.pws.clone();
    let mut orch = station.build();

    orch.run_cycle(&clock, &mut RecordingEvents::default());

    assert_eq!(pws.timeouts.borrow().as_slice(), &[Duration::from_secs(5)]);
}

// ── Sensor rail ───────────────────────────────────────────────

#[test]
fn rail_is_raised_once_and_released_every_cycle() {
    let station = StationBuilder::default();
    let rail = station.rail.clone();
    let mut orch = station.build();

    for n in 1..=3u32 {
        let outcome = orch.run_cycle(&MockClock::at(5, 30, 0), &mut RecordingEvents::default());
        assert_eq!(outcome.cycle, n);
        assert_eq!(rail.times_raised(), n as usize);
        assert!(!rail.is_high());
        assert!(!orch.rail_powered());
    }
}

#[test]
fn rail_that_will_not_power_skips_acquisition() {
    let station = StationBuilder::default();
    let validated = station.validated();
    let reads = station.pressure_bus.reads.clone();
    let sensors = SensorArray::from_config(
        validated.station(),
        Box::new(station.pressure_bus),
        Box::new(station.humidity_bus),
    );
    let power = PowerController::new(StuckLowRailPin { log: station.rail.clone() }, NoDelay, Duration::from_millis(1))
        .unwrap();
    let sinks = build_sinks(validated.station(), station.mqtt, station.pws, station.underground);
    let mut orch = WakeCycleOrchestrator::new(
        &validated,
        power,
        sensors,
        sinks,
        station.firmware,
        station.network,
    );

    let mut events = RecordingEvents::default();
    let outcome = orch.run_cycle(&MockClock::at(5, 30, 0), &mut events);

    assert_eq!(outcome.power_error, Some(PowerError::RailEnableFailed));
    assert!(reads.borrow().is_empty());
    // Every device still gets exactly one status for the cycle.
    assert_eq!(outcome.device_statuses.len(), 4);
    assert_eq!(outcome.failed_devices(), 4);
    assert!(orch.sensors().slots().iter().all(|s| s.last_status == DeviceStatus::NotPresent));
    let device_failures = events
        .events
        .iter()
        .filter(|e| matches!(e, AppEvent::DeviceFailed { error: DeviceError::NotPresent, .. }))
        .count();
    assert_eq!(device_failures, 4);
    assert!(outcome.sink_results.iter().all(|(_, o)| *o == SinkOutcome::Skipped(SkipReason::NoReadings)));
    assert!(outcome.readings_finalized.is_empty());
    assert_eq!(outcome.trace.as_slice(), &FULL_TRACE);
    assert!(!station.rail.is_high());
}

// ── Events ────────────────────────────────────────────────────

#[test]
fn state_changes_are_reported_in_order() {
    let mut orch = StationBuilder::default().build();
    let mut events = RecordingEvents::default();
    orch.run_cycle(&MockClock::at(5, 30, 0), &mut events);

    let changes: Vec<(StateId, StateId)> = events
        .events
        .iter()
        .filter_map(|e| match e {
            AppEvent::StateChanged { from, to } => Some((*from, *to)),
            _ => None,
        })
        .collect();
    let expected: Vec<_> = FULL_TRACE.windows(2).map(|w| (w[0], w[1])).collect();
    assert_eq!(changes, expected);
    assert!(matches!(
        events.events.last(),
        Some(AppEvent::CycleCompleted(s)) if s.finalized == 3 && s.published_sinks == 3
    ));
}

//! One sink's failure never changes what happens to the others.

use weatherstation::app::events::AppEvent;
use weatherstation::app::ports::HttpResponse;
use weatherstation::error::{SinkError, TransportError};
use weatherstation::sinks::{SinkOutcome, pws, underground};

use crate::mock_hw::*;

fn run(station: StationBuilder) -> (weatherstation::fsm::context::CycleOutcome, RecordingEvents) {
    let mut orch = station.build();
    let mut events = RecordingEvents::default();
    let outcome = orch.run_cycle(&MockClock::at(5, 30, 0), &mut events);
    (outcome, events)
}

#[test]
fn failing_broker_does_not_stop_http_sinks() {
    let mut station = StationBuilder::default();
    station.mqtt.fail = Some(TransportError::ConnectFailed);
    let pws = station.pws.clone();
    let underground = station.underground.clone();

    let (outcome, events) = run(station);

    assert_eq!(
        outcome.sink_result("mqtt"),
        Some(SinkOutcome::Failed(SinkError::Transport(TransportError::ConnectFailed)))
    );
    assert!(outcome.sink_result("pws").unwrap().is_published());
    assert!(outcome.sink_result("underground").unwrap().is_published());
    assert_eq!((pws.calls(), underground.calls()), (1, 1));
    assert!(events.events.iter().any(|e| matches!(
        e,
        AppEvent::SinkFailed { sink: "mqtt", .. }
    )));
}

#[test]
fn sink_outcomes_are_independent_of_neighbour_failures() {
    let healthy = run(StationBuilder::default()).0;

    let mut station = StationBuilder::default();
    station.pws = MockHttp::responding(Err(TransportError::TimedOut));
    let degraded = run(station).0;

    assert_eq!(degraded.sink_result("pws"), Some(SinkOutcome::Failed(SinkError::TimedOut)));
    assert_eq!(degraded.sink_result("mqtt"), healthy.sink_result("mqtt"));
    assert_eq!(degraded.sink_result("underground"), healthy.sink_result("underground"));
}

#[test]
fn underground_rejecting_credentials_is_unauthorized() {
    let mut station = StationBuilder::default();
    station.underground = MockHttp::responding(Ok(HttpResponse {
        status: 401,
        body: "unauthorized".into(),
    }));

    let (outcome, _) = run(station);

    assert_eq!(
        outcome.sink_result("underground"),
        Some(SinkOutcome::Failed(SinkError::Unauthorized))
    );
    assert!(outcome.sink_result("mqtt").unwrap().is_published());
    assert!(outcome.sink_result("pws").unwrap().is_published());
}

#[test]
fn underground_needs_success_in_body() {
    let mut station = StationBuilder::default();
    station.underground = MockHttp::responding(Ok(HttpResponse {
        status: 200,
        body: "INVALIDPASSWORDID".into(),
    }));
    let (outcome, _) = run(station);
    assert_eq!(
        outcome.sink_result("underground"),
        Some(SinkOutcome::Failed(SinkError::Rejected(200)))
    );
}

#[test]
fn each_sink_is_attempted_at_most_once() {
    let mut station = StationBuilder::default();
    station.mqtt.fail = Some(TransportError::Io);
    station.pws = MockHttp::responding(Err(TransportError::Io));
    let mqtt = station.mqtt.clone();
    let pws = station.pws.clone();

    let (outcome, _) = run(station);

    assert_eq!(mqtt.batches.get(), 1);
    assert_eq!(pws.calls(), 1);
    assert_eq!(outcome.sink_results.len(), 3);
}

// ── Wire contents ─────────────────────────────────────────────

#[test]
fn verbose_mqtt_batch_carries_devices_spread_and_summary() {
    let station = StationBuilder::default();
    let mqtt = station.mqtt.clone();
    run(station);

    let sent = mqtt.sent.borrow();
    let topic = |t: &str| sent.iter().find(|m| m.topic == t).map(|m| m.payload.clone());

    assert_eq!(topic("weather/temperature").as_deref(), Some("21.1"));
    assert_eq!(topic("weather/pressure").as_deref(), Some("1013.5"));
    assert_eq!(topic("weather/temperature/bme280-2").as_deref(), Some("21.4"));
    assert_eq!(topic("weather/humidity/dht22-1").as_deref(), Some("44.0"));
    assert!(topic("weather/pressure/spread").is_some());

    let summary: serde_json::Value = serde_json::from_str(&topic("weather/summary").unwrap()).unwrap();
    assert_eq!(summary["humidity"]["contributing_device_count"], 4);
    assert_eq!(summary["pressure"]["unit"], "hPa");
}

#[test]
fn finalized_only_mqtt_sends_one_message_per_quantity() {
    let mut station = StationBuilder::default();
    station.config.verbose_reporting = false;
    let mqtt = station.mqtt.clone();
    let (outcome, _) = run(station);

    let topics: Vec<String> = mqtt.sent.borrow().iter().map(|m| m.topic.clone()).collect();
    assert_eq!(topics, ["weather/temperature", "weather/humidity", "weather/pressure"]);
    assert!(matches!(
        outcome.sink_result("mqtt"),
        Some(SinkOutcome::Published(p)) if p.messages == 3
    ));
}

#[test]
fn http_sinks_send_imperial_units_to_their_endpoints() {
    let mut station = StationBuilder::default();
    station.dht22_only();
    let pws_http = station.pws.clone();
    let wu_http = station.underground.clone();
    run(station);

    let pws_url = pws_http.urls.borrow()[0].clone();
    assert!(pws_url.starts_with(pws::ENDPOINT));
    assert!(pws_url.contains("ID=PWS_STATION_ID"));
    // 20.8 / 21.2 → 21.0 °C → 69.80 °F
    assert!(pws_url.contains("&tempf=69.80"), "{pws_url}");
    assert!(pws_url.contains("&humidity=45.00"), "{pws_url}");
    // No pressure device configured, so no baromin.
    assert!(!pws_url.contains("baromin"), "{pws_url}");
    assert!(pws_url.ends_with("&action=updateraw"));

    let wu_url = wu_http.urls.borrow()[0].clone();
    assert!(wu_url.starts_with(underground::ENDPOINT));
    assert!(wu_url.contains("ID=WU_STATION_ID"));
}

impl StationBuilder {
    fn dht22_only(&mut self) {
        self.config.bme280_sdo_pins.clear();
    }
}

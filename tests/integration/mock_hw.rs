//! Mock hardware and transports for integration tests.
//!
//! Every mock records what it was asked to do behind an `Rc`, so a test
//! can hand the mock to the orchestrator and still inspect the history
//! afterwards.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::convert::Infallible;
use std::rc::Rc;
use std::time::Duration;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{ErrorType, OutputPin};

use weatherstation::app::events::AppEvent;
use weatherstation::app::ports::{
    Clock, ConnectivityError, ConnectivityPort, EventSink, FirmwareUpdatePort, HttpResponse,
    HttpTransport, MqttMessage, MqttTransport, SensorBus, UpdateCheck,
};
use weatherstation::app::service::WakeCycleOrchestrator;
use weatherstation::config::{StationConfig, ValidatedConfig};
use weatherstation::error::{DeviceError, TransportError};
use weatherstation::ota::UtcTime;
use weatherstation::power::PowerController;
use weatherstation::sensors::{Quantity, RawSample, SensorArray};
use weatherstation::sinks::build_sinks;

// ── Sensor rail ───────────────────────────────────────────────

/// Every level the rail pin was driven to, in order.
#[derive(Clone, Default)]
pub struct RailLog(pub Rc<RefCell<Vec<bool>>>);

#[allow(dead_code)]
impl RailLog {
    pub fn is_high(&self) -> bool {
        self.0.borrow().last().copied().unwrap_or(false)
    }

    pub fn times_raised(&self) -> usize {
        self.0.borrow().iter().filter(|&&high| high).count()
    }
}

pub struct MockRailPin {
    pub log: RailLog,
}

impl ErrorType for MockRailPin {
    type Error = Infallible;
}

impl OutputPin for MockRailPin {
    fn set_low(&mut self) -> Result<(), Infallible> {
        self.log.0.borrow_mut().push(false);
        Ok(())
    }
    fn set_high(&mut self) -> Result<(), Infallible> {
        self.log.0.borrow_mut().push(true);
        Ok(())
    }
}

/// A rail whose driver refuses to go high.
pub struct StuckLowRailPin {
    pub log: RailLog,
}

#[derive(Debug)]
pub struct PinFault;

impl embedded_hal::digital::Error for PinFault {
    fn kind(&self) -> embedded_hal::digital::ErrorKind {
        embedded_hal::digital::ErrorKind::Other
    }
}

impl ErrorType for StuckLowRailPin {
    type Error = PinFault;
}

impl OutputPin for StuckLowRailPin {
    fn set_low(&mut self) -> Result<(), PinFault> {
        self.log.0.borrow_mut().push(false);
        Ok(())
    }
    fn set_high(&mut self) -> Result<(), PinFault> {
        Err(PinFault)
    }
}

pub struct NoDelay;

impl DelayNs for NoDelay {
    fn delay_ns(&mut self, _ns: u32) {}
}

// ── Clock ─────────────────────────────────────────────────────

/// Wall clock frozen at `utc`; monotonic time is a shared counter that
/// mocks may advance to simulate slow I/O.
#[derive(Clone)]
pub struct MockClock {
    pub utc: UtcTime,
    pub mono_ms: Rc<Cell<u64>>,
}

#[allow(dead_code)]
impl MockClock {
    pub fn at(hour: u8, minute: u8, second: u8) -> Self {
        Self {
            utc: UtcTime::from_hms(hour, minute, second).unwrap_or(UtcTime::from_unix(0)),
            mono_ms: Rc::new(Cell::new(1_000)),
        }
    }

    pub fn advance(&self, ms: u64) {
        self.mono_ms.set(self.mono_ms.get() + ms);
    }
}

impl Clock for MockClock {
    fn utc_now(&self) -> UtcTime {
        self.utc
    }

    fn monotonic_ms(&self) -> u64 {
        self.mono_ms.get()
    }
}

// ── Sensor buses ──────────────────────────────────────────────

/// Answers per address from a script; unknown addresses are NotPresent.
#[derive(Default)]
pub struct ScriptedBus {
    pub answers: HashMap<u8, Result<RawSample, DeviceError>>,
    pub reads: Rc<RefCell<Vec<u8>>>,
}

#[allow(dead_code)]
impl ScriptedBus {
    pub fn answer(mut self, address: u8, answer: Result<RawSample, DeviceError>) -> Self {
        self.answers.insert(address, answer);
        self
    }
}

impl SensorBus for ScriptedBus {
    fn read(&mut self, address: u8, _timeout: Duration) -> Result<RawSample, DeviceError> {
        self.reads.borrow_mut().push(address);
        self.answers
            .get(&address)
            .cloned()
            .unwrap_or(Err(DeviceError::NotPresent))
    }
}

#[allow(dead_code)]
pub fn bme_sample(t: f32, h: f32, p: f32) -> RawSample {
    RawSample::from_slice(&[
        (Quantity::Temperature, t),
        (Quantity::Humidity, h),
        (Quantity::Pressure, p),
    ])
    .unwrap()
}

#[allow(dead_code)]
pub fn dht_sample(t: f32, h: f32) -> RawSample {
    RawSample::from_slice(&[(Quantity::Temperature, t), (Quantity::Humidity, h)]).unwrap()
}

// ── Firmware ──────────────────────────────────────────────────

#[derive(Clone)]
pub struct MockFirmware {
    pub answer: UpdateCheck,
    pub calls: Rc<RefCell<Vec<Duration>>>,
}

impl MockFirmware {
    pub fn answering(answer: UpdateCheck) -> Self {
        Self {
            answer,
            calls: Rc::default(),
        }
    }
}

impl FirmwareUpdatePort for MockFirmware {
    fn check_and_maybe_apply(&mut self, timeout: Duration) -> UpdateCheck {
        self.calls.borrow_mut().push(timeout);
        self.answer
    }
}

// ── Network ───────────────────────────────────────────────────

#[derive(Default)]
pub struct MockNetwork {
    pub unreachable: bool,
    pub up: bool,
    pub connects: u32,
    pub disconnects: u32,
}

impl ConnectivityPort for MockNetwork {
    fn connect(&mut self) -> Result<(), ConnectivityError> {
        self.connects += 1;
        if self.unreachable {
            return Err(ConnectivityError::ConnectionFailed);
        }
        self.up = true;
        Ok(())
    }

    fn disconnect(&mut self) {
        self.disconnects += 1;
        self.up = false;
    }

    fn is_connected(&self) -> bool {
        self.up
    }
}

// ── Transports ────────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct MockMqtt {
    pub sent: Rc<RefCell<Vec<MqttMessage>>>,
    pub batches: Rc<Cell<u32>>,
    pub fail: Option<TransportError>,
    /// Monotonic time consumed per batch.
    pub cost: Option<(Rc<Cell<u64>>, u64)>,
}

impl MqttTransport for MockMqtt {
    fn publish_batch(&mut self, messages: &[MqttMessage], _timeout: Duration) -> Result<(), TransportError> {
        self.batches.set(self.batches.get() + 1);
        if let Some((mono, ms)) = &self.cost {
            mono.set(mono.get() + ms);
        }
        if let Some(e) = self.fail {
            return Err(e);
        }
        self.sent.borrow_mut().extend_from_slice(messages);
        Ok(())
    }
}

#[derive(Clone)]
pub struct MockHttp {
    pub urls: Rc<RefCell<Vec<String>>>,
    pub timeouts: Rc<RefCell<Vec<Duration>>>,
    pub response: Result<HttpResponse, TransportError>,
}

#[allow(dead_code)]
impl MockHttp {
    pub fn ok() -> Self {
        Self::responding(Ok(HttpResponse {
            status: 200,
            body: "success".into(),
        }))
    }

    pub fn responding(response: Result<HttpResponse, TransportError>) -> Self {
        Self {
            urls: Rc::default(),
            timeouts: Rc::default(),
            response,
        }
    }

    pub fn calls(&self) -> usize {
        self.urls.borrow().len()
    }
}

impl HttpTransport for MockHttp {
    fn get(&mut self, url: &str, timeout: Duration) -> Result<HttpResponse, TransportError> {
        self.urls.borrow_mut().push(url.to_owned());
        self.timeouts.borrow_mut().push(timeout);
        self.response.clone()
    }
}

// ── Events ────────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingEvents {
    pub events: Vec<AppEvent>,
}

impl EventSink for RecordingEvents {
    fn emit(&mut self, event: &AppEvent) {
        self.events.push(event.clone());
    }
}

// ── Station assembly ──────────────────────────────────────────

pub type TestOrchestrator = WakeCycleOrchestrator<MockRailPin, NoDelay, MockFirmware, MockNetwork>;

/// Everything a test may want to swap before assembling a station.
pub struct StationBuilder {
    pub config: StationConfig,
    pub pressure_bus: ScriptedBus,
    pub humidity_bus: ScriptedBus,
    pub firmware: MockFirmware,
    pub network: MockNetwork,
    pub mqtt: MockMqtt,
    pub pws: MockHttp,
    pub underground: MockHttp,
    pub rail: RailLog,
}

impl Default for StationBuilder {
    /// Default config with every device answering plausibly.
    fn default() -> Self {
        Self {
            config: StationConfig::default(),
            pressure_bus: ScriptedBus::default()
                .answer(18, Ok(bme_sample(21.0, 40.0, 1013.0)))
                .answer(25, Ok(bme_sample(21.4, 42.0, 1014.0))),
            humidity_bus: ScriptedBus::default()
                .answer(14, Ok(dht_sample(20.8, 44.0)))
                .answer(16, Ok(dht_sample(21.2, 46.0))),
            firmware: MockFirmware::answering(UpdateCheck::NoUpdate),
            network: MockNetwork::default(),
            mqtt: MockMqtt::default(),
            pws: MockHttp::ok(),
            underground: MockHttp::ok(),
            rail: RailLog::default(),
        }
    }
}

impl StationBuilder {
    pub fn validated(&self) -> ValidatedConfig {
        self.config.validate().unwrap()
    }

    pub fn build(self) -> TestOrchestrator {
        let validated = self.validated();
        let timing = validated.timing();
        let sensors = SensorArray::from_config(
            validated.station(),
            Box::new(self.pressure_bus),
            Box::new(self.humidity_bus),
        );
        let pin = MockRailPin { log: self.rail };
        let power = PowerController::new(pin, NoDelay, timing.rail_settle).unwrap();
        let sinks = build_sinks(validated.station(), self.mqtt, self.pws, self.underground);
        WakeCycleOrchestrator::new(&validated, power, sensors, sinks, self.firmware, self.network)
    }
}

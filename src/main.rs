//! Weather station firmware: main entry point.
//!
//! One wake signal, one cycle, then deep sleep until the next cadence
//! boundary.  Nothing survives between wakes except what NVS and the RTC
//! hold.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  Bme280Bus  Dht22Bus   EspMqttTransport  EspHttpTransport      │
//! │  (SensorBus)           (MqttTransport)   (HttpTransport)       │
//! │  WifiAdapter  NvsAdapter  Esp32Clock  LogEventSink             │
//! │  HttpImageSource → FirmwareUpdater (FirmwareUpdatePort)        │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │          WakeCycleOrchestrator (pure logic)            │    │
//! │  │  FSM · OTA window · Reconciler · Sinks                 │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! │                                                                │
//! │  PowerController (sensor rail) · Watchdog · deep sleep         │
//! └────────────────────────────────────────────────────────────────┘
//! ```

#![deny(unused_must_use)]

use core::time::Duration;

use anyhow::Result;
use log::{error, info, warn};

use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::hal::delay::{Ets, FreeRtos};
use esp_idf_svc::hal::gpio::{AnyIOPin, AnyOutputPin, PinDriver};
use esp_idf_svc::hal::i2c::{I2cConfig, I2cDriver};
use esp_idf_svc::hal::peripherals::Peripherals;
use esp_idf_svc::hal::units::Hertz;
use esp_idf_svc::wifi::{BlockingWifi, EspWifi};

use weatherstation::adapters::http::{EspHttpTransport, HttpImageSource};
use weatherstation::adapters::log_sink::LogEventSink;
use weatherstation::adapters::mqtt::EspMqttTransport;
use weatherstation::adapters::nvs::NvsAdapter;
use weatherstation::adapters::time::Esp32Clock;
use weatherstation::adapters::wifi::WifiAdapter;
use weatherstation::app::ports::{Clock, ConfigPort, ConnectivityPort};
use weatherstation::app::service::WakeCycleOrchestrator;
use weatherstation::config::StationConfig;
use weatherstation::drivers::watchdog::Watchdog;
use weatherstation::error::Error;
use weatherstation::ota::{self, FirmwareUpdater};
use weatherstation::pins;
use weatherstation::power::{self, PowerController};
use weatherstation::sensors::SensorArray;
use weatherstation::sensors::bme280::Bme280Bus;
use weatherstation::sensors::dht22::Dht22Bus;
use weatherstation::sinks::build_sinks;

/// Slack on top of the awake budget before the task watchdog fires.
const WATCHDOG_MARGIN: Duration = Duration::from_secs(30);

/// Longest the boot waits for an SNTP answer when the RTC is unset.
const SNTP_TIMEOUT: Duration = Duration::from_secs(15);

// SAFETY (all `AnyIOPin::new` / `AnyOutputPin::new` below): the GPIO
// numbers come from a validated config, which rejects duplicates, and no
// other driver in this binary claims them.
fn output_pin(gpio: u8) -> AnyOutputPin {
    unsafe { AnyOutputPin::new(i32::from(gpio)) }
}

fn io_pin(gpio: u8) -> AnyIOPin {
    unsafe { AnyIOPin::new(i32::from(gpio)) }
}

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  WeatherStation v{}                ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    ota::check_rollback();

    // ── 2. Configuration ──────────────────────────────────────
    let nvs = NvsAdapter::new().map_err(Error::from)?;
    let config = match nvs.load() {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!("NVS config load failed ({}), using defaults", e);
            StationConfig::default()
        }
    };
    let validated = match config.validate() {
        Ok(v) => v,
        Err(e) => {
            // Nothing to run: sleep until someone resets the board.
            error!("Config rejected: {}. Cycle not started.", e);
            power::enter_deep_sleep(None, None);
        }
    };
    let station = validated.station();
    let timing = validated.timing();

    let watchdog = Watchdog::new(timing.awake_budget + WATCHDOG_MARGIN);

    // ── 3. Hardware ───────────────────────────────────────────
    let peripherals = Peripherals::take()?;
    let sysloop = EspSystemEventLoop::take()?;

    let rail = PinDriver::output(output_pin(station.sensor_power_pin))?;
    let power = PowerController::new(rail, FreeRtos, timing.rail_settle).map_err(Error::from)?;

    let i2c = I2cDriver::new(
        peripherals.i2c0,
        io_pin(station.i2c_sda_pin),
        io_pin(station.i2c_scl_pin),
        &I2cConfig::new().baudrate(Hertz(pins::I2C_FREQ_HZ)),
    )?;
    let mut selects = Vec::new();
    for &gpio in &station.bme280_sdo_pins {
        selects.push((gpio, PinDriver::output(output_pin(gpio))?));
    }
    let mut data_pins = Vec::new();
    for &gpio in &station.dht22_data_pins {
        data_pins.push((gpio, PinDriver::input_output_od(io_pin(gpio))?));
    }
    let sensors = SensorArray::from_config(
        station,
        Box::new(Bme280Bus::new(i2c, selects, Ets)),
        Box::new(Dht22Bus::new(data_pins, Ets)),
    );

    // ── 4. Network, sinks, firmware ───────────────────────────
    let wifi = BlockingWifi::wrap(
        EspWifi::new(peripherals.modem, sysloop.clone(), None)?,
        sysloop,
    )?;
    let mut network = WifiAdapter::new(wifi);
    if let Err(e) = network.set_credentials(&station.wifi.ssid, &station.wifi.password) {
        warn!("WiFi credentials rejected ({}), sinks will report network down", e);
    }

    // The OTA window and cadence alignment need real UTC.  The link is
    // left up for the cycle, which takes it down in PoweringDown.
    let clock = Esp32Clock::new();
    if !clock.is_synced() {
        match network.connect() {
            Ok(()) => {
                if let Err(e) = clock.sync_from_sntp(&station.ntp_server, SNTP_TIMEOUT) {
                    warn!("SNTP sync failed: {}", e);
                }
            }
            Err(e) => warn!("Network down, RTC left unset: {}", e),
        }
        watchdog.feed();
    }

    let sinks = build_sinks(
        station,
        EspMqttTransport::new(&station.mqtt),
        EspHttpTransport::new(),
        EspHttpTransport::new(),
    );
    let firmware = FirmwareUpdater::new(
        HttpImageSource::new(&station.ota_manifest_url),
        Esp32Clock::new(),
    );

    // ── 5. One wake cycle ─────────────────────────────────────
    if !clock.is_synced() {
        warn!("RTC not set ({}), OTA windows will not line up", clock.utc_now());
    }

    let mut orchestrator =
        WakeCycleOrchestrator::new(&validated, power, sensors, sinks, firmware, network);
    let mut log_sink = LogEventSink::new();
    let outcome = orchestrator.run_cycle(&clock, &mut log_sink);
    watchdog.feed();

    if outcome.ota_applied {
        ota::reboot();
    }

    // ── 6. Sleep until the next cadence boundary ──────────────
    let delay = validated.wake_schedule().delay_until_next(clock.utc_now());
    info!("Next wake in {}s", delay.as_secs());
    power::enter_deep_sleep(Some(delay), Some(station.rtc_interrupt_pin));
}

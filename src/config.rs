//! Station configuration.
//!
//! [`StationConfig`] is the persisted, operator-editable form (NVS blob,
//! defaults from the reference deployment).  [`StationConfig::validate`] is
//! the only way to obtain a [`ValidatedConfig`], which is what the rest of
//! the firmware consumes.  Out-of-range values are rejected, never clamped.

use core::time::Duration;

use heapless::{String, Vec};
use serde::{Deserialize, Serialize};

use crate::app::ports::ConfigError;
use crate::ota::window::{HourMask, OtaWindow, OtaWindowPolicy};
use crate::pins;
use crate::sinks::ReportingMode;
use crate::wake::WakeSchedule;

/// Upper bound on devices per sensor family.
pub const MAX_DEVICES_PER_FAMILY: usize = 4;

// ───────────────────────────────────────────────────────────────
// Persisted form
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MqttSettings {
    pub enabled: bool,
    pub client_name: String<32>,
    pub server_address: String<64>,
    pub server_port: u16,
    pub topic: String<32>,
}

/// Station credentials for a third-party HTTP weather service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationSettings {
    pub enabled: bool,
    pub station_id: String<32>,
    pub api_key: String<64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WifiSettings {
    pub ssid: String<32>,
    pub password: String<64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingSettings {
    /// Sensor rail settle time after power-on (ms).
    pub rail_settle_ms: u32,
    /// Bound on one device read (ms).
    pub device_timeout_ms: u32,
    /// Bound on one sink publish (ms).
    pub sink_timeout_ms: u32,
    /// Total time the station may stay awake per cycle (s).
    pub awake_budget_secs: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationConfig {
    // --- Sensors ---
    pub sensor_power_pin: u8,
    pub i2c_sda_pin: u8,
    pub i2c_scl_pin: u8,
    /// One SDO pin per BME280; the list length is the device count.
    pub bme280_sdo_pins: Vec<u8, MAX_DEVICES_PER_FAMILY>,
    /// One data pin per DHT22; the list length is the device count.
    pub dht22_data_pins: Vec<u8, MAX_DEVICES_PER_FAMILY>,
    pub rtc_interrupt_pin: u8,

    // --- OTA ---
    pub ota_enabled: bool,
    /// 24 × `Y`/`N`, index 0 = midnight UTC.
    pub ota_hour_mask: String<32>,
    pub ota_top_of_hour_only: bool,
    pub ota_window_seconds: u8,
    pub ota_host_name: String<32>,
    /// Update manifest URL.  Empty means "never offers an update".
    pub ota_manifest_url: String<128>,

    // --- Cadence / reporting ---
    pub minutes_between_readings: u8,
    /// Publish per-device readings alongside finalized ones (MQTT only).
    pub verbose_reporting: bool,

    // --- Sinks ---
    pub mqtt: MqttSettings,
    pub pws: StationSettings,
    pub underground: StationSettings,

    // --- Network / timing ---
    pub wifi: WifiSettings,
    /// SNTP server used to set the RTC when it has no valid time.
    pub ntp_server: String<64>,
    pub timing: TimingSettings,
}

/// Copy `text` into a fixed-capacity string, truncating at capacity.
pub(crate) fn bounded<const N: usize>(text: &str) -> String<N> {
    let mut out = String::new();
    for c in text.chars() {
        if out.push(c).is_err() {
            break;
        }
    }
    out
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            sensor_power_pin: pins::SENSOR_POWER_GPIO,
            i2c_sda_pin: pins::I2C_SDA_GPIO,
            i2c_scl_pin: pins::I2C_SCL_GPIO,
            bme280_sdo_pins: Vec::from_slice(&pins::BME280_SDO_GPIOS).unwrap_or_default(),
            dht22_data_pins: Vec::from_slice(&pins::DHT22_DATA_GPIOS).unwrap_or_default(),
            rtc_interrupt_pin: pins::RTC_INTERRUPT_GPIO,

            ota_enabled: true,
            ota_hour_mask: bounded("YYYNNNNNNNNNYYYYYYYYYYYY"),
            ota_top_of_hour_only: true,
            ota_window_seconds: 15,
            ota_host_name: bounded("ESP32WeatherStation"),
            ota_manifest_url: String::new(),

            minutes_between_readings: 5,
            verbose_reporting: true,

            mqtt: MqttSettings {
                enabled: true,
                client_name: bounded("WeatherStation"),
                server_address: bounded("192.168.1.21"),
                server_port: 1883,
                topic: bounded("weather"),
            },
            pws: StationSettings {
                enabled: true,
                station_id: bounded("PWS_STATION_ID"),
                api_key: String::new(),
            },
            underground: StationSettings {
                enabled: true,
                station_id: bounded("WU_STATION_ID"),
                api_key: String::new(),
            },

            wifi: WifiSettings {
                ssid: String::new(),
                password: String::new(),
            },
            ntp_server: bounded("pool.ntp.org"),
            timing: TimingSettings {
                rail_settle_ms: 2_000,
                device_timeout_ms: 1_500,
                sink_timeout_ms: 10_000,
                awake_budget_secs: 90,
            },
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Validation
// ───────────────────────────────────────────────────────────────

impl StationConfig {
    /// Range-check every field and derive the runtime views.
    pub fn validate(&self) -> Result<ValidatedConfig, ConfigError> {
        let schedule = WakeSchedule::new(self.minutes_between_readings)?;
        let hour_mask = HourMask::parse(&self.ota_hour_mask)?;
        let window = OtaWindow::new(hour_mask, self.ota_top_of_hour_only, self.ota_window_seconds)?;

        if self.bme280_sdo_pins.is_empty() && self.dht22_data_pins.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "at least one sensor device must be configured",
            ));
        }
        self.check_pins_unique()?;

        if self.ntp_server.is_empty() {
            return Err(ConfigError::ValidationFailed("ntp server must be set"));
        }

        if self.mqtt.enabled {
            if self.mqtt.server_address.is_empty() {
                return Err(ConfigError::ValidationFailed(
                    "mqtt server address must be set when mqtt is enabled",
                ));
            }
            if self.mqtt.server_port == 0 {
                return Err(ConfigError::ValidationFailed("mqtt server port must be 1-65535"));
            }
            if self.mqtt.client_name.is_empty() || self.mqtt.topic.is_empty() {
                return Err(ConfigError::ValidationFailed(
                    "mqtt client name and topic must be set when mqtt is enabled",
                ));
            }
        }
        if self.pws.enabled && self.pws.station_id.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "pws station id must be set when pws is enabled",
            ));
        }
        if self.underground.enabled && self.underground.station_id.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "underground station id must be set when underground is enabled",
            ));
        }

        let t = &self.timing;
        if t.rail_settle_ms == 0 || t.device_timeout_ms == 0 || t.sink_timeout_ms == 0 {
            return Err(ConfigError::ValidationFailed("timeouts must be non-zero"));
        }
        if u64::from(t.awake_budget_secs) * 1000 < self.worst_case_cycle_ms() {
            return Err(ConfigError::ValidationFailed(
                "awake budget must cover the ota window, settle, every device and every enabled sink",
            ));
        }

        Ok(ValidatedConfig {
            config: self.clone(),
            ota_policy: OtaWindowPolicy::new(self.ota_enabled, window),
            schedule,
        })
    }

    /// Longest a cycle can take if every step runs to its timeout.
    pub fn worst_case_cycle_ms(&self) -> u64 {
        let t = &self.timing;
        let ota_ms = if self.ota_enabled {
            u64::from(self.ota_window_seconds) * 1000
        } else {
            0
        };
        let devices = (self.bme280_sdo_pins.len() + self.dht22_data_pins.len()) as u64;
        let sinks = [self.mqtt.enabled, self.pws.enabled, self.underground.enabled]
            .iter()
            .filter(|&&on| on)
            .count() as u64;
        ota_ms
            + u64::from(t.rail_settle_ms)
            + devices * u64::from(t.device_timeout_ms)
            + sinks * u64::from(t.sink_timeout_ms)
    }

    fn check_pins_unique(&self) -> Result<(), ConfigError> {
        let mut seen = [false; 64];
        let fixed = [
            self.sensor_power_pin,
            self.i2c_sda_pin,
            self.i2c_scl_pin,
            self.rtc_interrupt_pin,
        ];
        let all = fixed
            .iter()
            .chain(self.bme280_sdo_pins.iter())
            .chain(self.dht22_data_pins.iter());
        for &pin in all {
            let Some(slot) = seen.get_mut(usize::from(pin)) else {
                return Err(ConfigError::ValidationFailed("gpio number out of range"));
            };
            if *slot {
                return Err(ConfigError::ValidationFailed("gpio assigned more than once"));
            }
            *slot = true;
        }
        Ok(())
    }
}

// ───────────────────────────────────────────────────────────────
// Validated view
// ───────────────────────────────────────────────────────────────

/// Per-cycle time bounds derived from [`TimingSettings`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleTiming {
    pub rail_settle: Duration,
    pub device_timeout: Duration,
    pub sink_timeout: Duration,
    pub awake_budget: Duration,
}

/// A configuration that passed [`StationConfig::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedConfig {
    config: StationConfig,
    ota_policy: OtaWindowPolicy,
    schedule: WakeSchedule,
}

impl ValidatedConfig {
    pub fn station(&self) -> &StationConfig {
        &self.config
    }

    pub fn ota_policy(&self) -> OtaWindowPolicy {
        self.ota_policy
    }

    pub fn wake_schedule(&self) -> WakeSchedule {
        self.schedule
    }

    pub fn reporting_mode(&self) -> ReportingMode {
        if self.config.verbose_reporting {
            ReportingMode::Verbose
        } else {
            ReportingMode::FinalizedOnly
        }
    }

    pub fn timing(&self) -> CycleTiming {
        let t = &self.config.timing;
        CycleTiming {
            rail_settle: Duration::from_millis(u64::from(t.rail_settle_ms)),
            device_timeout: Duration::from_millis(u64::from(t.device_timeout_ms)),
            sink_timeout: Duration::from_millis(u64::from(t.sink_timeout_ms)),
            awake_budget: Duration::from_secs(u64::from(t.awake_budget_secs)),
        }
    }
}

//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter    | Implements                    | Connects to               |
//! |------------|-------------------------------|---------------------------|
//! | `http`     | HttpTransport, ImageSource    | ESP-IDF HTTP client (TLS) |
//! | `log_sink` | EventSink                     | Serial log output         |
//! | `mqtt`     | MqttTransport                 | ESP-IDF MQTT client       |
//! | `nvs`      | ConfigPort                    | NVS / in-memory store     |
//! | `time`     | Clock                         | RTC wall clock, esp_timer |
//! | `wifi`     | ConnectivityPort              | ESP-IDF WiFi STA          |
//!
//! The sensor buses live in [`crate::sensors`] since they are generic over
//! `embedded-hal` rather than tied to ESP-IDF.

pub mod http;
pub mod log_sink;
pub mod mqtt;
pub mod nvs;
pub mod time;
pub mod wifi;

//! MQTT transport adapter.
//!
//! Implements [`MqttTransport`].  One broker session per cycle: connect,
//! publish the whole batch at QoS 1, wait for every PUBACK, drop the
//! client.  Everything happens inside the timeout handed in by the sink.
//!
//! - **`target_os = "espidf"`**: `esp_idf_svc::mqtt::client::EspMqttClient`
//!   with an event callback counting connection and PUBACK events.
//! - **all other targets**: logs each message and keeps the last batch.

use core::time::Duration;

use log::info;

use crate::app::ports::{MqttMessage, MqttTransport};
use crate::config::MqttSettings;
use crate::error::TransportError;

#[cfg(target_os = "espidf")]
use std::sync::Arc;
#[cfg(target_os = "espidf")]
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

#[cfg(target_os = "espidf")]
use esp_idf_svc::mqtt::client::{EspMqttClient, EventPayload, MqttClientConfiguration, QoS};
#[cfg(target_os = "espidf")]
use log::warn;

#[cfg_attr(not(target_os = "espidf"), allow(dead_code))]
const POLL_INTERVAL: Duration = Duration::from_millis(20);

pub struct EspMqttTransport {
    url: String,
    client_id: heapless::String<32>,
    #[cfg(not(target_os = "espidf"))]
    sent: Vec<MqttMessage>,
}

impl EspMqttTransport {
    pub fn new(settings: &MqttSettings) -> Self {
        Self {
            url: format!("mqtt://{}:{}", settings.server_address, settings.server_port),
            client_id: settings.client_name.clone(),
            #[cfg(not(target_os = "espidf"))]
            sent: Vec::new(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Simulation: every message published so far.
    #[cfg(not(target_os = "espidf"))]
    pub fn sent(&self) -> &[MqttMessage] {
        &self.sent
    }
}

#[cfg(target_os = "espidf")]
impl MqttTransport for EspMqttTransport {
    fn publish_batch(
        &mut self,
        messages: &[MqttMessage],
        timeout: Duration,
    ) -> Result<(), TransportError> {
        let started = std::time::Instant::now();
        let connected = Arc::new(AtomicBool::new(false));
        let acked = Arc::new(AtomicU32::new(0));
        let failed = Arc::new(AtomicBool::new(false));

        let conf = MqttClientConfiguration {
            client_id: Some(self.client_id.as_str()),
            network_timeout: timeout,
            ..Default::default()
        };
        let (c, a, f) = (connected.clone(), acked.clone(), failed.clone());
        let mut client = EspMqttClient::new_cb(&self.url, &conf, move |event| {
            match event.payload() {
                EventPayload::Connected(_) => c.store(true, Ordering::Release),
                EventPayload::Published(_) => {
                    a.fetch_add(1, Ordering::AcqRel);
                }
                EventPayload::Error(_) => f.store(true, Ordering::Release),
                _ => {}
            }
        })
        .map_err(|e| {
            warn!("MQTT: client init failed: {e}");
            TransportError::ConnectFailed
        })?;

        let wait_for = |done: &dyn Fn() -> bool| -> Result<(), TransportError> {
            while !done() {
                if failed.load(Ordering::Acquire) {
                    return Err(TransportError::Io);
                }
                if started.elapsed() >= timeout {
                    return Err(TransportError::TimedOut);
                }
                std::thread::sleep(POLL_INTERVAL);
            }
            Ok(())
        };

        wait_for(&|| connected.load(Ordering::Acquire)).map_err(|e| match e {
            TransportError::Io => TransportError::ConnectFailed,
            other => other,
        })?;

        for m in messages {
            client
                .publish(&m.topic, QoS::AtLeastOnce, false, m.payload.as_bytes())
                .map_err(|e| {
                    warn!("MQTT: publish to {} failed: {e}", m.topic);
                    TransportError::Io
                })?;
        }
        let expected = messages.len() as u32;
        wait_for(&|| acked.load(Ordering::Acquire) >= expected)?;

        info!("MQTT: {} messages acknowledged by {}", expected, self.url);
        Ok(())
    }
}

#[cfg(not(target_os = "espidf"))]
impl MqttTransport for EspMqttTransport {
    fn publish_batch(
        &mut self,
        messages: &[MqttMessage],
        _timeout: Duration,
    ) -> Result<(), TransportError> {
        for m in messages {
            info!("MQTT(sim): {} = {}", m.topic, m.payload);
        }
        self.sent.extend_from_slice(messages);
        Ok(())
    }
}

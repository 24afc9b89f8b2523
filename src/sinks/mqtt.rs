//! MQTT sink.
//!
//! Topic layout under the configured base topic:
//!
//! | Topic                          | Payload            | Mode     |
//! |--------------------------------|--------------------|----------|
//! | `<topic>/<quantity>`           | finalized, 1 dp    | always   |
//! | `<topic>/<quantity>/spread`    | spread, 2 dp       | verbose  |
//! | `<topic>/<quantity>/<label>`   | per device, 1 dp   | verbose  |
//! | `<topic>/summary`              | JSON finalized set | verbose  |

use core::time::Duration;

use log::debug;

use super::{PublishBatch, PublishSink, Published, ReportingMode};
use crate::app::ports::{MqttMessage, MqttTransport};
use crate::error::SinkError;

pub struct MqttSink<T> {
    transport: T,
    enabled: bool,
    topic: String,
}

impl<T: MqttTransport> MqttSink<T> {
    pub fn new(transport: T, enabled: bool, topic: &str) -> Self {
        Self {
            transport,
            enabled,
            topic: topic.trim_end_matches('/').to_owned(),
        }
    }

    pub fn messages(&self, batch: &PublishBatch<'_>) -> Result<Vec<MqttMessage>, SinkError> {
        let mut out = Vec::new();
        let msg = |suffix: String, payload: String| MqttMessage {
            topic: format!("{}/{}", self.topic, suffix),
            payload,
        };

        for r in batch.finalized.iter() {
            out.push(msg(r.quantity.name().to_owned(), format!("{:.1}", r.value)));
        }

        if batch.mode == ReportingMode::Verbose {
            for r in batch.finalized.iter() {
                out.push(msg(format!("{}/spread", r.quantity), format!("{:.2}", r.spread)));
            }
            for r in batch.raw {
                out.push(msg(
                    format!("{}/{}", r.quantity, r.source_label),
                    format!("{:.1}", r.value),
                ));
            }
            let summary = serde_json::to_string(batch.finalized).map_err(|_| SinkError::Encoding)?;
            out.push(msg("summary".to_owned(), summary));
        }
        Ok(out)
    }
}

impl<T: MqttTransport> PublishSink for MqttSink<T> {
    fn name(&self) -> &'static str {
        "mqtt"
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    fn publish(&mut self, batch: &PublishBatch<'_>, timeout: Duration) -> Result<Published, SinkError> {
        let messages = self.messages(batch)?;
        debug!("mqtt: publishing {} messages under {}", messages.len(), self.topic);
        self.transport.publish_batch(&messages, timeout)?;
        Ok(Published {
            messages: messages.len().min(usize::from(u16::MAX)) as u16,
        })
    }
}

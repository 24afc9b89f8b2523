//! Weather Underground sink.
//!
//! The service answers 200 even for some rejected uploads, so success also
//! requires `success` in the body.

use core::time::Duration;

use log::{debug, warn};

use super::{PublishBatch, PublishSink, Published, station_url};
use crate::app::ports::HttpTransport;
use crate::config::StationSettings;
use crate::error::SinkError;

pub const ENDPOINT: &str =
    "https://weatherstation.wunderground.com/weatherstation/updateweatherstation.php";

pub struct UndergroundSink<H> {
    http: H,
    station: StationSettings,
}

impl<H: HttpTransport> UndergroundSink<H> {
    pub fn new(http: H, station: StationSettings) -> Self {
        Self { http, station }
    }
}

impl<H: HttpTransport> PublishSink for UndergroundSink<H> {
    fn name(&self) -> &'static str {
        "underground"
    }

    fn enabled(&self) -> bool {
        self.station.enabled
    }

    fn publish(&mut self, batch: &PublishBatch<'_>, timeout: Duration) -> Result<Published, SinkError> {
        let url = station_url(ENDPOINT, &self.station, batch.finalized);
        let resp = self.http.get(&url, timeout)?;
        debug!("underground: HTTP {} ({} body bytes)", resp.status, resp.body.len());
        match resp.status {
            200 if resp.body.contains("success") => Ok(Published { messages: 1 }),
            200 => {
                warn!("underground: upload not accepted: {}", resp.body.trim());
                Err(SinkError::Rejected(200))
            }
            401 => Err(SinkError::Unauthorized),
            status => Err(SinkError::Rejected(status)),
        }
    }
}

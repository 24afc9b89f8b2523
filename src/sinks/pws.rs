//! pwsweather.com sink.  Finalized values only; success is HTTP 200.

use core::time::Duration;

use log::debug;

use super::{PublishBatch, PublishSink, Published, station_url};
use crate::app::ports::HttpTransport;
use crate::config::StationSettings;
use crate::error::SinkError;

pub const ENDPOINT: &str = "https://pwsupdate.pwsweather.com/api/v1/submitwx";

pub struct PwsSink<H> {
    http: H,
    station: StationSettings,
}

impl<H: HttpTransport> PwsSink<H> {
    pub fn new(http: H, station: StationSettings) -> Self {
        Self { http, station }
    }
}

impl<H: HttpTransport> PublishSink for PwsSink<H> {
    fn name(&self) -> &'static str {
        "pws"
    }

    fn enabled(&self) -> bool {
        self.station.enabled
    }

    fn publish(&mut self, batch: &PublishBatch<'_>, timeout: Duration) -> Result<Published, SinkError> {
        let url = station_url(ENDPOINT, &self.station, batch.finalized);
        let resp = self.http.get(&url, timeout)?;
        debug!("pws: HTTP {}", resp.status);
        match resp.status {
            200 => Ok(Published { messages: 1 }),
            401 | 403 => Err(SinkError::Unauthorized),
            status => Err(SinkError::Rejected(status)),
        }
    }
}

//! HTTP adapters.
//!
//! - [`EspHttpTransport`] implements [`HttpTransport`] for the weather
//!   service sinks: one `GET` per publish, body read up to
//!   [`MAX_BODY`] bytes.
//! - [`HttpImageSource`] implements [`ImageSource`] for the firmware
//!   updater: a JSON manifest names the latest version, its size, its
//!   SHA-256 and where to fetch it; the image is then streamed from that
//!   URL.
//!
//! On device both use `EspHttpConnection` with the ESP-IDF certificate
//! bundle for TLS.  On the host they are inert simulations.

use core::time::Duration;
use std::time::Instant;

use log::{info, warn};
use serde::Deserialize;

use crate::app::ports::{HttpResponse, HttpTransport};
use crate::error::TransportError;
use crate::ota::{ImageOffer, ImageSource};

#[cfg(target_os = "espidf")]
use embedded_svc::http::client::Client as HttpClient;
#[cfg(target_os = "espidf")]
use embedded_svc::http::{Method, Status};
#[cfg(target_os = "espidf")]
use embedded_svc::io::Read;
#[cfg(target_os = "espidf")]
use esp_idf_svc::http::client::{Configuration as HttpClientConfiguration, EspHttpConnection};

/// Response bodies beyond this are truncated; the services answer with a
/// short status line.
pub const MAX_BODY: usize = 512;

/// Upper bound on the manifest document.
#[cfg_attr(not(target_os = "espidf"), allow(dead_code))]
const MAX_MANIFEST: usize = 1024;

#[cfg(target_os = "espidf")]
fn connection(timeout: Duration) -> Result<EspHttpConnection, TransportError> {
    let conf = HttpClientConfiguration {
        timeout: Some(timeout),
        crt_bundle_attach: Some(esp_idf_svc::sys::esp_crt_bundle_attach),
        ..Default::default()
    };
    EspHttpConnection::new(&conf).map_err(|e| {
        warn!("HTTP: connection setup failed: {e}");
        TransportError::ConnectFailed
    })
}

// ───────────────────────────────────────────────────────────────
// Weather-service transport
// ───────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct EspHttpTransport {
    #[cfg(not(target_os = "espidf"))]
    requests: Vec<String>,
}

impl EspHttpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulation: every URL requested so far.
    #[cfg(not(target_os = "espidf"))]
    pub fn requests(&self) -> &[String] {
        &self.requests
    }
}

#[cfg(target_os = "espidf")]
impl HttpTransport for EspHttpTransport {
    fn get(&mut self, url: &str, timeout: Duration) -> Result<HttpResponse, TransportError> {
        let mut client = HttpClient::wrap(connection(timeout)?);
        let request = client
            .request(Method::Get, url, &[])
            .map_err(|_| TransportError::ConnectFailed)?;
        let mut response = request.submit().map_err(|e| {
            warn!("HTTP: request failed: {e:?}");
            TransportError::Io
        })?;

        let status = response.status();
        let mut body = Vec::new();
        let mut chunk = [0u8; 128];
        while body.len() < MAX_BODY {
            let n = response.read(&mut chunk).map_err(|_| TransportError::Io)?;
            if n == 0 {
                break;
            }
            body.extend_from_slice(&chunk[..n]);
        }
        body.truncate(MAX_BODY);
        Ok(HttpResponse {
            status,
            body: String::from_utf8_lossy(&body).into_owned(),
        })
    }
}

#[cfg(not(target_os = "espidf"))]
impl HttpTransport for EspHttpTransport {
    fn get(&mut self, url: &str, _timeout: Duration) -> Result<HttpResponse, TransportError> {
        info!("HTTP(sim): GET {}", url);
        self.requests.push(url.to_owned());
        Ok(HttpResponse {
            status: 200,
            body: "success".to_owned(),
        })
    }
}

// ───────────────────────────────────────────────────────────────
// Firmware image source
// ───────────────────────────────────────────────────────────────

/// Update manifest served next to the image.
///
/// ```json
/// { "version": "0.2.0", "size": 912384,
///   "sha256": "9f86d08...", "url": "https://example.net/fw-0.2.0.bin" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Manifest {
    pub version: String,
    pub size: u32,
    pub sha256: String,
    pub url: String,
}

impl Manifest {
    pub fn parse(bytes: &[u8]) -> Result<Self, TransportError> {
        serde_json::from_slice(bytes).map_err(|_| {
            warn!("OTA: manifest is not valid JSON");
            TransportError::Io
        })
    }

    /// An offer when the manifest names a different version than the one
    /// running.
    pub fn offer(&self, running_version: &str) -> Result<Option<ImageOffer>, TransportError> {
        if self.version == running_version {
            return Ok(None);
        }
        let sha256 = decode_sha256(&self.sha256).ok_or_else(|| {
            warn!("OTA: manifest digest is not 64 hex digits");
            TransportError::Io
        })?;
        Ok(Some(ImageOffer {
            size: self.size,
            sha256,
        }))
    }
}

/// Parse 64 hex digits into a digest.
pub fn decode_sha256(hex: &str) -> Option<[u8; 32]> {
    let bytes = hex.as_bytes();
    if bytes.len() != 64 {
        return None;
    }
    let nibble = |c: u8| (c as char).to_digit(16).map(|d| d as u8);
    let mut out = [0u8; 32];
    for (byte, pair) in out.iter_mut().zip(bytes.chunks_exact(2)) {
        *byte = (nibble(pair[0])? << 4) | nibble(pair[1])?;
    }
    Some(out)
}

pub struct HttpImageSource {
    manifest_url: String,
    image_url: Option<String>,
    /// End of the window handed to the last `poll_offer`.
    deadline: Option<Instant>,
    #[cfg(target_os = "espidf")]
    stream: Option<EspHttpConnection>,
}

impl HttpImageSource {
    /// An empty `manifest_url` never offers an update.
    pub fn new(manifest_url: &str) -> Self {
        Self {
            manifest_url: manifest_url.to_owned(),
            image_url: None,
            deadline: None,
            #[cfg(target_os = "espidf")]
            stream: None,
        }
    }

    pub fn image_url(&self) -> Option<&str> {
        self.image_url.as_deref()
    }

    /// A read may only start while both the caller's remaining time and
    /// the window opened by `poll_offer` are still running.
    fn check_read_budget(&self, timeout: Duration) -> Result<(), TransportError> {
        let window_closed = self.deadline.is_some_and(|d| Instant::now() >= d);
        if timeout.is_zero() || window_closed {
            warn!("OTA: image read refused, update window exhausted");
            return Err(TransportError::TimedOut);
        }
        Ok(())
    }
}

#[cfg(target_os = "espidf")]
impl ImageSource for HttpImageSource {
    fn poll_offer(&mut self, timeout: Duration) -> Result<Option<ImageOffer>, TransportError> {
        self.stream = None;
        self.deadline = Some(Instant::now() + timeout);
        if self.manifest_url.is_empty() {
            return Ok(None);
        }

        let mut conn = connection(timeout)?;
        conn.initiate_request(Method::Get, &self.manifest_url, &[])
            .map_err(|_| TransportError::ConnectFailed)?;
        conn.initiate_response().map_err(|_| TransportError::Io)?;
        if conn.status() != 200 {
            warn!("OTA: manifest fetch returned HTTP {}", conn.status());
            return Err(TransportError::Io);
        }
        let mut doc = Vec::new();
        let mut chunk = [0u8; 256];
        loop {
            let n = conn.read(&mut chunk).map_err(|_| TransportError::Io)?;
            if n == 0 {
                break;
            }
            if doc.len() + n > MAX_MANIFEST {
                return Err(TransportError::Io);
            }
            doc.extend_from_slice(&chunk[..n]);
        }

        let manifest = Manifest::parse(&doc)?;
        let Some(offer) = manifest.offer(env!("CARGO_PKG_VERSION"))? else {
            info!("OTA: running {} is current", env!("CARGO_PKG_VERSION"));
            return Ok(None);
        };
        info!("OTA: manifest offers {} ({} bytes)", manifest.version, manifest.size);

        let mut image = connection(timeout)?;
        image
            .initiate_request(Method::Get, &manifest.url, &[])
            .map_err(|_| TransportError::ConnectFailed)?;
        image.initiate_response().map_err(|_| TransportError::Io)?;
        if image.status() != 200 {
            warn!("OTA: image fetch returned HTTP {}", image.status());
            return Err(TransportError::Io);
        }
        self.image_url = Some(manifest.url);
        self.stream = Some(image);
        Ok(Some(offer))
    }

    fn read_chunk(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, TransportError> {
        self.check_read_budget(timeout)?;
        let Some(stream) = self.stream.as_mut() else {
            return Ok(0);
        };
        stream.read(buf).map_err(|_| TransportError::Io)
    }
}

#[cfg(not(target_os = "espidf"))]
impl ImageSource for HttpImageSource {
    fn poll_offer(&mut self, timeout: Duration) -> Result<Option<ImageOffer>, TransportError> {
        self.deadline = Some(Instant::now() + timeout);
        if !self.manifest_url.is_empty() {
            info!("OTA(sim): would fetch {}", self.manifest_url);
        }
        Ok(None)
    }

    fn read_chunk(&mut self, _buf: &mut [u8], timeout: Duration) -> Result<usize, TransportError> {
        self.check_read_budget(timeout)?;
        Ok(0)
    }
}

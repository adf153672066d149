//! Object detector client
//!
//! The detector is an external HTTP service: one encoded frame in, a JSON
//! array of labelled boxes out, in the detector's input resolution.

use crate::domain::types::{BoundingBox, Detection, ObjectClass};
use crate::io::frame::Frame;
use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DetectError {
    /// The detector could not decode the frame
    #[error("frame rejected by detector (status {0})")]
    Rejected(u16),
    #[error("detector request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("detector returned status {0}")]
    Status(u16),
    #[error("malformed detector response: {0}")]
    Malformed(#[from] serde_json::Error),
}

impl DetectError {
    /// Frame-level problem rather than a detector fault
    pub fn is_rejected(&self) -> bool {
        matches!(self, DetectError::Rejected(_))
    }
}

/// Runs object detection on one frame
#[async_trait]
pub trait Detector: Send + Sync {
    async fn detect(&self, frame: &Frame) -> Result<Vec<Detection>, DetectError>;
}

/// One box as returned by the detector service
#[derive(Debug, Deserialize)]
struct WireDetection {
    name: String,
    xmin: f64,
    ymin: f64,
    xmax: f64,
    ymax: f64,
    confidence: f64,
}

impl From<WireDetection> for Detection {
    fn from(w: WireDetection) -> Self {
        let class = w.name.parse::<ObjectClass>().unwrap_or(ObjectClass::Other);
        Detection::new(class, BoundingBox::new(w.xmin, w.ymin, w.xmax, w.ymax), w.confidence)
    }
}

/// Decode a detector response body
pub fn parse_detections(body: &[u8]) -> Result<Vec<Detection>, DetectError> {
    let wire: Vec<WireDetection> = serde_json::from_slice(body)?;
    Ok(wire.into_iter().map(Detection::from).collect())
}

/// Detector reached over HTTP
///
/// No request timeout: a slow detector stalls the cycle, and the mailbox
/// keeps only the newest frame in the meantime.
pub struct HttpDetector {
    client: reqwest::Client,
    url: String,
    input_size: u32,
}

impl HttpDetector {
    pub fn new(url: impl Into<String>, input_size: u32) -> Result<Self, DetectError> {
        let client = reqwest::Client::builder().http1_only().build()?;
        Ok(Self { client, url: url.into(), input_size })
    }
}

#[async_trait]
impl Detector for HttpDetector {
    async fn detect(&self, frame: &Frame) -> Result<Vec<Detection>, DetectError> {
        let response = self
            .client
            .post(&self.url)
            .query(&[("size", self.input_size)])
            .header("Content-Type", "application/octet-stream")
            .body(frame.data.clone())
            .send()
            .await?;

        let status = response.status();
        if status.is_client_error() {
            return Err(DetectError::Rejected(status.as_u16()));
        }
        if !status.is_success() {
            return Err(DetectError::Status(status.as_u16()));
        }
        let body = response.bytes().await?;
        parse_detections(&body)
    }
}

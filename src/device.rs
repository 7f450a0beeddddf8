//! ==============================================================================
//! device.rs - http client for the pulse-oximeter node
//! ==============================================================================
//!
//! purpose:
//!     performs ONE bounded GET against the sensor node and turns the answer
//!     into a VitalsSample, or into a FetchError saying why it could not.
//!
//! wire format:
//!     GET http://<host>:<port>/  ->  200 {"heart_rate": 72, "SpO2": 98}
//!
//!     both keys must be present and numeric. anything else in the object is
//!     ignored.
//!
//! relationships:
//!     - used by: scheduler.rs (through the VitalsSource trait)
//!     - does NOT touch the store
//!     - no retries here; every scheduler tick is one independent attempt
//!
//! ==============================================================================

use crate::config::DeviceConfig;
use crate::domain::VitalsSample;
use crate::error::FetchError;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;

/// payload key holding heart rate
pub const HEART_RATE_FIELD: &str = "heart_rate";
/// payload key holding oxygen saturation
pub const SPO2_FIELD: &str = "SpO2";

/// anything that can produce a vitals sample on demand
#[async_trait]
pub trait VitalsSource: Send + Sync {
    async fn fetch(&self) -> Result<VitalsSample, FetchError>;
}

/// reqwest-backed client for a single sensor node
#[derive(Clone)]
pub struct DeviceClient {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl DeviceClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Unknown(format!("failed to build http client: {}", e)))?;

        Ok(Self { client, url: url.into(), timeout })
    }

    pub fn from_config(config: &DeviceConfig) -> Result<Self, FetchError> {
        Self::new(config.url(), config.timeout())
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl VitalsSource for DeviceClient {
    async fn fetch(&self) -> Result<VitalsSample, FetchError> {
        let response = self.client.get(&self.url).send().await?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }

        // the client timeout also bounds the body read
        let body = response.bytes().await?;
        decode_payload(&body)
    }
}

/// decode a sensor response body
pub fn decode_payload(body: &[u8]) -> Result<VitalsSample, FetchError> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| FetchError::Decode(format!("body is not json: {}", e)))?;

    if !value.is_object() {
        return Err(FetchError::Decode("body is not a json object".into()));
    }

    Ok(VitalsSample {
        bpm: numeric_field(&value, HEART_RATE_FIELD)?,
        spo2: numeric_field(&value, SPO2_FIELD)?,
    })
}

fn numeric_field(value: &Value, key: &str) -> Result<f64, FetchError> {
    match value.get(key) {
        Some(Value::Number(n)) => n
            .as_f64()
            .ok_or_else(|| FetchError::Decode(format!("{} is out of range", key))),
        Some(other) => Err(FetchError::Decode(format!("{} is not numeric: {}", key, other))),
        None => Err(FetchError::Decode(format!("missing {}", key))),
    }
}

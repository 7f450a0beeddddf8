//! Failure taxonomy for the acquisition path and the store.
//!
//! None of these are fatal once the host is running: fetch and storage
//! failures end one cycle, read failures end one HTTP request.

use thiserror::Error;

/// Why a single device fetch produced no sample.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("request to sensor node timed out")]
    Timeout,

    #[error("connection to sensor node failed: {0}")]
    Connection(String),

    #[error("sensor node answered with HTTP {0}")]
    HttpStatus(u16),

    #[error("malformed sensor payload: {0}")]
    Decode(String),

    #[error("sensor request failed: {0}")]
    Unknown(String),
}

impl FetchError {
    /// Stable label for structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Connection(_) => "connection",
            Self::HttpStatus(_) => "http_status",
            Self::Decode(_) => "decode",
            Self::Unknown(_) => "unknown",
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        // a connect timeout reports both; treat it as a timeout
        if err.is_timeout() {
            FetchError::Timeout
        } else if err.is_connect() {
            FetchError::Connection(err.to_string())
        } else if err.is_decode() {
            FetchError::Decode(err.to_string())
        } else {
            FetchError::Unknown(err.to_string())
        }
    }
}

/// The store could not commit or read.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("store connection lock poisoned")]
    Poisoned,

    #[error("store task failed: {0}")]
    Task(String),

    #[error("failed to prepare store location: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration could not be loaded or is unusable.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_error_kinds_are_distinct() {
        let kinds = [
            FetchError::Timeout.kind(),
            FetchError::Connection("refused".into()).kind(),
            FetchError::HttpStatus(503).kind(),
            FetchError::Decode("x".into()).kind(),
            FetchError::Unknown("x".into()).kind(),
        ];
        for (i, a) in kinds.iter().enumerate() {
            for b in &kinds[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn http_status_message_carries_code() {
        assert_eq!(
            FetchError::HttpStatus(503).to_string(),
            "sensor node answered with HTTP 503"
        );
    }
}

//! Runtime configuration loaded from an optional JSON file.
//!
//! Every field has a default, so a file only needs the values it overrides:
//!
//! ```json
//! {
//!   "baud_rate": 921600,
//!   "timeouts": { "login_ms": 60000 },
//!   "download": { "max_offset_retries": 8 }
//! }
//! ```
//!
//! Durations are written in milliseconds.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::buffer::DEFAULT_CAPACITY;
use crate::download::DownloadConfig;
use crate::error::Result;
use crate::ftp::Timeouts;
use crate::reader::ReaderConfig;

/// Default serial baud rate.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Serial baud rate.
    pub baud_rate: u32,
    /// Capacity of the receive ring buffer in bytes.
    pub buffer_capacity: usize,
    /// Reader task settings.
    pub reader: ReaderConfig,
    /// Per-command timeouts.
    pub timeouts: Timeouts,
    /// Download state machine settings.
    pub download: DownloadConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            buffer_capacity: DEFAULT_CAPACITY,
            reader: ReaderConfig::default(),
            timeouts: Timeouts::default(),
            download: DownloadConfig::default(),
        }
    }
}

impl Config {
    /// Parse a configuration from a JSON string.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }
}

/// Serde adapter storing a `Duration` as whole milliseconds.
pub mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// Serde adapter storing an optional `Duration` as milliseconds or `null`.
pub mod option_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_some(&(d.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_empty_object_gives_defaults() {
        let config = Config::from_json("{}").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.baud_rate, DEFAULT_BAUD_RATE);
        assert_eq!(config.download.chunk_size, 4096);
        assert_eq!(config.download.max_offset_retries, 5);
    }

    #[test]
    fn test_partial_override() {
        let config = Config::from_json(
            r#"{
                "baud_rate": 921600,
                "timeouts": { "login_ms": 60000 },
                "reader": { "chunk_size": 512 },
                "download": { "status_timeout_ms": 15000 }
            }"#,
        )
        .unwrap();

        assert_eq!(config.baud_rate, 921_600);
        assert_eq!(config.timeouts.login, Duration::from_secs(60));
        assert_eq!(config.timeouts.ack, Duration::from_secs(1));
        assert_eq!(config.reader.chunk_size, 512);
        assert_eq!(config.download.status_timeout, Some(Duration::from_secs(15)));
    }

    #[test]
    fn test_round_trip_through_json() {
        let config = Config::default();
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"read_timeout_ms\":500"));
        assert_eq!(Config::from_json(&json).unwrap(), config);
    }

    #[test]
    fn test_invalid_json() {
        let result = Config::from_json("{ not json");
        assert!(matches!(result, Err(crate::SimftpError::Json(_))));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("simftp.json");
        std::fs::write(&path, r#"{ "buffer_capacity": 16384 }"#).unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.buffer_capacity, 16384);
    }
}

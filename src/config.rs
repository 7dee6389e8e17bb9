use serde::Deserialize;
use std::path::Path;

use crate::error::ConfigError;

const MINUTES_PER_DAY: u32 = 24 * 60;

/// Timestamp layouts tried in order when no config overrides them.
/// RFC 3339 is always tried first and does not need listing.
pub const DEFAULT_TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
];

/// Settings that control how raw rows become readings.
///
/// Stored as a JSON object on disk, every key optional:
/// ```json
/// {
///   "slot_minutes": 30,
///   "timestamp_formats": ["%Y-%m-%d %H:%M:%S"]
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NormalizeConfig {
    /// Width of a time-of-day bucket. Must divide a day evenly.
    pub slot_minutes: u32,
    /// `chrono` format strings for naive timestamps.
    pub timestamp_formats: Vec<String>,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            slot_minutes: 30,
            timestamp_formats: DEFAULT_TIMESTAMP_FORMATS
                .iter()
                .map(|f| f.to_string())
                .collect(),
        }
    }
}

impl NormalizeConfig {
    /// Loads the config from a JSON file at `path` and validates it.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&content).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()
    }

    pub fn with_slot_minutes(mut self, slot_minutes: u32) -> Self {
        self.slot_minutes = slot_minutes;
        self
    }

    pub fn validate(self) -> Result<Self, ConfigError> {
        if self.slot_minutes == 0
            || self.slot_minutes > MINUTES_PER_DAY
            || MINUTES_PER_DAY % self.slot_minutes != 0
        {
            return Err(ConfigError::SlotWidth(self.slot_minutes));
        }
        if self.timestamp_formats.is_empty() {
            return Err(ConfigError::NoTimestampFormats);
        }
        Ok(self)
    }
}

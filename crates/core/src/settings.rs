use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::logger;

/// Upper bound for any configured span of time (one week).
pub const MAX_SECONDS: u64 = 7 * 24 * 3600;

/// Convert operator-supplied seconds, rejecting NaN, infinities, negatives
/// and anything over [`MAX_SECONDS`].
pub fn seconds(what: &str, value: f64) -> Result<Duration, ConfigError> {
    if !(0.0..=MAX_SECONDS as f64).contains(&value) {
        return Err(ConfigError::InvalidSeconds {
            what: what.to_string(),
            value: value.to_string(),
            max: MAX_SECONDS,
        });
    }
    Ok(Duration::from_secs_f64(value))
}

/// Persisted operator preferences. Command-line flags take precedence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub decoder_path: PathBuf,
    pub output_dir: Option<PathBuf>,
    pub decode_interval_secs: f64,
    pub frame_rate: f64,
    pub last_window_title: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            decoder_path: PathBuf::from("./cimbar"),
            output_dir: None,
            decode_interval_secs: 0.5,
            frame_rate: 30.0,
            last_window_title: None,
        }
    }
}

impl Settings {
    pub fn load(path: &Path) -> Self {
        std::fs::read_to_string(path)
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default()
    }

    pub fn decode_interval(&self) -> Result<Duration, ConfigError> {
        seconds("decode interval", self.decode_interval_secs)
    }

    pub fn save(&self, path: &Path) {
        let result = serde_json::to_string_pretty(self)
            .map_err(std::io::Error::from)
            .and_then(|json| std::fs::write(path, json));
        if let Err(e) = result {
            logger::warn(&format!("failed to save settings to {}: {}", path.display(), e));
        }
    }
}

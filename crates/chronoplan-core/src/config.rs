//! TOML-based engine configuration.
//!
//! Holds the defaults every constructor falls back to:
//! - Entry defaults (priority, duration, order)
//! - Factors deriving ideal/min/max durations from the normal one
//! - Day boundaries and sleep flexibility
//! - Compression weights used when stretching movable entries
//! - Planning bounds (cluster size, rollover and re-plan limits)
//!
//! Configuration is stored at `~/.config/chronoplan/config.toml`. A `Config`
//! value is passed explicitly to whatever needs it; nothing reads it globally.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{ConfigError, Result};
use crate::time::Time;

/// Fallback attributes for entries and tasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    #[serde(default = "default_priority")]
    pub priority: f64,
    /// Duration in minutes when nothing else determines one.
    #[serde(default = "default_duration")]
    pub duration: u32,
    #[serde(default)]
    pub order: f64,
}

/// Factors relating ideal/min/max durations to the normal duration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeFactors {
    #[serde(default = "default_ideal_factor")]
    pub ideal_factor: f64,
    #[serde(default = "default_min_factor")]
    pub min_factor: f64,
    #[serde(default = "default_max_factor")]
    pub max_factor: f64,
}

/// Day boundaries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DayConfig {
    /// Wake-up time; the morning sleep entry ends here.
    #[serde(default = "default_day_start")]
    pub start: Time,
    /// Bed time; the evening sleep entry starts here.
    #[serde(default = "default_day_end")]
    pub end: Time,
    /// How many minutes the morning sleep may shrink or grow.
    #[serde(default = "default_sleep_delta_morning")]
    pub sleep_delta_morning: u32,
    #[serde(default = "default_sleep_delta_evening")]
    pub sleep_delta_evening: u32,
}

/// Weights for distributing free minutes among movable entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressionConfig {
    #[serde(default = "default_weight_min")]
    pub weight_min: f64,
    #[serde(default = "default_weight_max")]
    pub weight_max: f64,
    #[serde(default = "default_exponent")]
    pub exponent: f64,
}

/// Bounds for the planning procedures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanningConfig {
    /// Cluster size for projects that do not declare one.
    #[serde(default = "default_cluster_size")]
    pub cluster_size: usize,
    /// Spread of the stable default start offset; 0 starts on the plan date.
    #[serde(default)]
    pub default_start_spread_days: u32,
    /// Consecutive days a rollover may persist before giving up.
    #[serde(default = "default_max_rollover_days")]
    pub max_rollover_days: u32,
    /// Upper bound on subplan re-planning steps per project.
    #[serde(default = "default_max_replans")]
    pub max_replans: u32,
}

/// Engine configuration.
///
/// Serialized to/from TOML at `~/.config/chronoplan/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub defaults: DefaultsConfig,
    #[serde(default)]
    pub times: TimeFactors,
    #[serde(default)]
    pub day: DayConfig,
    #[serde(default)]
    pub compression: CompressionConfig,
    #[serde(default)]
    pub planning: PlanningConfig,
}

// Default functions
fn default_priority() -> f64 {
    10.0
}
fn default_duration() -> u32 {
    60
}
fn default_ideal_factor() -> f64 {
    1.0
}
fn default_min_factor() -> f64 {
    0.5
}
fn default_max_factor() -> f64 {
    2.0
}
fn default_day_start() -> Time {
    Time::from_minutes(7 * 60)
}
fn default_day_end() -> Time {
    Time::from_minutes(23 * 60)
}
fn default_sleep_delta_morning() -> u32 {
    30
}
fn default_sleep_delta_evening() -> u32 {
    60
}
fn default_weight_min() -> f64 {
    1.0
}
fn default_weight_max() -> f64 {
    100.0
}
fn default_exponent() -> f64 {
    1.0
}
fn default_cluster_size() -> usize {
    1
}
fn default_max_rollover_days() -> u32 {
    365
}
fn default_max_replans() -> u32 {
    1000
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            priority: default_priority(),
            duration: default_duration(),
            order: 0.0,
        }
    }
}

impl Default for TimeFactors {
    fn default() -> Self {
        Self {
            ideal_factor: default_ideal_factor(),
            min_factor: default_min_factor(),
            max_factor: default_max_factor(),
        }
    }
}

impl Default for DayConfig {
    fn default() -> Self {
        Self {
            start: default_day_start(),
            end: default_day_end(),
            sleep_delta_morning: default_sleep_delta_morning(),
            sleep_delta_evening: default_sleep_delta_evening(),
        }
    }
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            weight_min: default_weight_min(),
            weight_max: default_weight_max(),
            exponent: default_exponent(),
        }
    }
}

impl Default for PlanningConfig {
    fn default() -> Self {
        Self {
            cluster_size: default_cluster_size(),
            default_start_spread_days: 0,
            max_rollover_days: default_max_rollover_days(),
            max_replans: default_max_replans(),
        }
    }
}

impl CompressionConfig {
    /// Weight of an entry with the given priority when sharing free minutes.
    pub fn weight(&self, priority: f64) -> f64 {
        let lo = self.weight_min.min(self.weight_max);
        let hi = self.weight_max.max(self.weight_min);
        priority.clamp(lo, hi).powf(self.exponent)
    }
}

/// Returns `~/.config/chronoplan[-dev]/` based on CHRONOPLAN_ENV.
///
/// # Errors
/// Returns an error if creating the config directory fails.
pub fn data_dir() -> Result<PathBuf> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("CHRONOPLAN_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("chronoplan-dev")
    } else {
        base_dir.join("chronoplan")
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> std::result::Result<(), ConfigError> {
        let unknown = || ConfigError::UnknownKey(key.to_string());
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        let mut current = root;
        while let Some(part) = parts.next() {
            if part.is_empty() {
                return Err(unknown());
            }
            if parts.peek().is_some() {
                current = current.get_mut(part).ok_or_else(unknown)?;
                continue;
            }

            let obj = current.as_object_mut().ok_or_else(unknown)?;
            let existing = obj.get(part).ok_or_else(unknown)?;
            let new_value = match existing {
                serde_json::Value::Bool(_) => serde_json::Value::Bool(
                    value.parse::<bool>().map_err(|e| invalid(e.to_string()))?,
                ),
                serde_json::Value::Number(_) => {
                    if let Ok(n) = value.parse::<u64>() {
                        serde_json::Value::Number(n.into())
                    } else {
                        value
                            .parse::<f64>()
                            .ok()
                            .and_then(serde_json::Number::from_f64)
                            .map(serde_json::Value::Number)
                            .ok_or_else(|| invalid(format!("cannot parse '{value}' as number")))?
                    }
                }
                serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                    serde_json::from_str(value).map_err(|e| invalid(e.to_string()))?
                }
                _ => serde_json::Value::String(value.into()),
            };
            obj.insert(part.to_string(), new_value);
            return Ok(());
        }

        Err(unknown())
    }

    /// Default location of the config file.
    pub fn default_path() -> Result<PathBuf> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Parse a TOML document; missing keys take their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load from `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::LoadFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let cfg = toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Ok(cfg)
    }

    /// Load from the default location, returning defaults when it is missing
    /// or unreadable.
    pub fn load_or_default() -> Self {
        Self::default_path()
            .and_then(|path| Self::load(&path))
            .unwrap_or_default()
    }

    /// Persist to `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written.
    pub fn save(&self, path: &Path) -> Result<()> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))?;
        Ok(())
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a config value by dot-separated key.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown or the value does not fit the
    /// field's type.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let mut json = serde_json::to_value(&*self)?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        *self = serde_json::from_value(json).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        Ok(())
    }
}

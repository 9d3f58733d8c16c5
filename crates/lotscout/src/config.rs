//! Runtime configuration, loaded from JSON and validated up front.
//!
//! Worker pool sizes, retry knobs and override thresholds all live here so a
//! deployment can tighten them without a rebuild. `validate_config` rejects
//! values that would wedge the pipeline (zero workers, thresholds outside
//! their ranges) before any job is accepted.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// How the scorer treats a parcel with no visible power lines.
///
/// Absence of utility infrastructure cuts both ways: no lines overhead is a
/// hazard bonus, but it also means no utility access. Deployments pick the
/// framing; the default treats absence as a bonus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerLinePolicy {
    AbsenceIsBonus,
    AbsenceIsRisk,
}

impl Default for PowerLinePolicy {
    fn default() -> Self {
        PowerLinePolicy::AbsenceIsBonus
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// GIS stage pool size.
    #[serde(default = "default_gis_workers")]
    pub gis: usize,
    /// AI imagery stage pool size. Kept small: vision APIs rate-limit hard.
    #[serde(default = "default_ai_workers")]
    pub ai: usize,
    /// Skip-trace stage pool size.
    #[serde(default = "default_skip_trace_workers")]
    pub skip_trace: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            gis: default_gis_workers(),
            ai: default_ai_workers(),
            skip_trace: default_skip_trace_workers(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GisEndpoints {
    #[serde(default)]
    pub flood_url: String,
    #[serde(default)]
    pub wetlands_url: String,
    #[serde(default)]
    pub elevation_url: String,
    #[serde(default)]
    pub roads_url: String,
    #[serde(default)]
    pub protected_url: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImageryEndpoints {
    /// URL template with `{lat}`/`{lon}` placeholders.
    #[serde(default)]
    pub satellite_url: String,
    #[serde(default)]
    pub satellite_fallback_url: Option<String>,
    #[serde(default)]
    pub street_url: String,
    #[serde(default)]
    pub street_fallback_url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VisionEndpoint {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_vision_model")]
    pub model: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OwnerEndpoint {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Structured geocoder endpoint, tried first.
    #[serde(default)]
    pub geocode_primary_url: String,
    /// Free-text geocoder endpoint, tried when the primary finds nothing.
    #[serde(default)]
    pub geocode_fallback_url: String,
    #[serde(default)]
    pub gis: GisEndpoints,
    #[serde(default)]
    pub imagery: ImageryEndpoints,
    #[serde(default)]
    pub vision: VisionEndpoint,
    #[serde(default)]
    pub owner: OwnerEndpoint,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: String,

    #[serde(default)]
    pub workers: WorkerConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    /// A parcel further than this from any road is considered landlocked.
    #[serde(default = "default_road_distance_threshold_m")]
    pub road_distance_threshold_m: f64,

    /// Minimum AI detection confidence required to override a GIS road signal.
    #[serde(default = "default_ai_override_confidence")]
    pub ai_override_confidence: f64,

    #[serde(default = "default_image_cache_ttl_secs")]
    pub image_cache_ttl_secs: u64,

    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,

    /// Properties stuck in `processing` longer than this are requeued.
    #[serde(default = "default_liveness_timeout_secs")]
    pub liveness_timeout_secs: i64,

    #[serde(default)]
    pub power_line_policy: PowerLinePolicy,

    #[serde(default)]
    pub providers: ProviderConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_version(),
            workers: WorkerConfig::default(),
            retry: RetryConfig::default(),
            road_distance_threshold_m: default_road_distance_threshold_m(),
            ai_override_confidence: default_ai_override_confidence(),
            image_cache_ttl_secs: default_image_cache_ttl_secs(),
            max_batch_size: default_max_batch_size(),
            liveness_timeout_secs: default_liveness_timeout_secs(),
            power_line_policy: PowerLinePolicy::default(),
            providers: ProviderConfig::default(),
        }
    }
}

fn default_version() -> String {
    "1.0".to_string()
}
fn default_gis_workers() -> usize {
    10
}
fn default_ai_workers() -> usize {
    3
}
fn default_skip_trace_workers() -> usize {
    5
}
fn default_max_attempts() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    500
}
fn default_max_delay_ms() -> u64 {
    8_000
}
fn default_road_distance_threshold_m() -> f64 {
    200.0
}
fn default_ai_override_confidence() -> f64 {
    0.6
}
fn default_image_cache_ttl_secs() -> u64 {
    30 * 24 * 60 * 60
}
fn default_max_batch_size() -> usize {
    20_000
}
fn default_liveness_timeout_secs() -> i64 {
    600
}
fn default_vision_model() -> String {
    "gpt-4o".to_string()
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let config: Config = serde_json::from_str(content)?;

    validate_config(&config)?;

    Ok(config)
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    if config.workers.gis == 0 || config.workers.ai == 0 || config.workers.skip_trace == 0 {
        return Err(ConfigError::Validation {
            message: "Worker pool sizes must all be > 0".to_string(),
        });
    }

    if config.retry.max_attempts == 0 {
        return Err(ConfigError::Validation {
            message: "retry.max_attempts must be > 0".to_string(),
        });
    }

    if config.retry.base_delay_ms > config.retry.max_delay_ms {
        return Err(ConfigError::Validation {
            message: format!(
                "retry.base_delay_ms ({}) exceeds retry.max_delay_ms ({})",
                config.retry.base_delay_ms, config.retry.max_delay_ms
            ),
        });
    }

    if config.road_distance_threshold_m <= 0.0 {
        return Err(ConfigError::Validation {
            message: "road_distance_threshold_m must be > 0".to_string(),
        });
    }

    if !(0.0..=1.0).contains(&config.ai_override_confidence) {
        return Err(ConfigError::Validation {
            message: format!(
                "ai_override_confidence must be within 0..=1, got {}",
                config.ai_override_confidence
            ),
        });
    }

    if config.max_batch_size == 0 {
        return Err(ConfigError::Validation {
            message: "max_batch_size must be > 0".to_string(),
        });
    }

    if config.liveness_timeout_secs <= 0 {
        return Err(ConfigError::Validation {
            message: "liveness_timeout_secs must be > 0".to_string(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_minimal_config() {
        let config = load_config_from_str(r#"{ "version": "1.0" }"#).unwrap();
        assert_eq!(config.workers.gis, 10);
        assert_eq!(config.workers.ai, 3);
        assert_eq!(config.workers.skip_trace, 5);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.road_distance_threshold_m, 200.0);
        assert_eq!(config.ai_override_confidence, 0.6);
        assert_eq!(config.power_line_policy, PowerLinePolicy::AbsenceIsBonus);
    }

    #[test]
    fn test_load_config_with_overrides() {
        let config_json = r#"
        {
            "version": "1.0",
            "workers": { "gis": 4, "ai": 2, "skip_trace": 2 },
            "retry": { "max_attempts": 5, "base_delay_ms": 100, "max_delay_ms": 2000 },
            "ai_override_confidence": 0.75,
            "power_line_policy": "absence_is_risk",
            "providers": {
                "geocode_primary_url": "https://geocoder.example/locations",
                "vision": { "url": "https://vision.example/v1/chat/completions", "model": "gpt-4o-mini" }
            }
        }
        "#;

        let config = load_config_from_str(config_json).unwrap();
        assert_eq!(config.workers.gis, 4);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.ai_override_confidence, 0.75);
        assert_eq!(config.power_line_policy, PowerLinePolicy::AbsenceIsRisk);
        assert_eq!(config.providers.vision.model, "gpt-4o-mini");
    }

    #[test]
    fn test_invalid_version() {
        let result = load_config_from_str(r#"{ "version": "2.0" }"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_workers_rejected() {
        let result =
            load_config_from_str(r#"{ "version": "1.0", "workers": { "gis": 0 } }"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_override_confidence_out_of_range() {
        let result =
            load_config_from_str(r#"{ "version": "1.0", "ai_override_confidence": 1.5 }"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_base_delay_above_max_rejected() {
        let result = load_config_from_str(
            r#"{ "version": "1.0", "retry": { "base_delay_ms": 9000, "max_delay_ms": 1000 } }"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "version": "1.0" }"#).unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.version, "1.0");
    }

    #[test]
    fn test_missing_file() {
        let result = load_config("/nonexistent/config.json");
        assert!(matches!(result, Err(ConfigError::ReadFile { .. })));
    }
}

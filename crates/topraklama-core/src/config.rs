//! Monitor configuration stored as JSON
//!
//! Every field has a default, so a file only needs the values it changes.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::ConfigError;
use crate::model::{Position, TransformerId};

/// Top-level monitor configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Telemetry API settings
    pub api: ApiConfig,

    /// Poll cadences
    pub polling: PollingConfig,

    /// Alert feed settings
    pub alerts: AlertConfig,

    /// Map defaults
    pub map: MapConfig,
}

impl MonitorConfig {
    /// Load and validate a configuration file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Parse and validate configuration JSON
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let config: MonitorConfig = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Write the configuration as pretty-printed JSON
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let intervals = [
            ("polling.fleet_interval_ms", self.polling.fleet_interval_ms),
            ("polling.statistics_interval_ms", self.polling.statistics_interval_ms),
            ("polling.alerts_interval_ms", self.polling.alerts_interval_ms),
            ("polling.detail_interval_ms", self.polling.detail_interval_ms),
            ("polling.history_interval_ms", self.polling.history_interval_ms),
            ("api.request_timeout_ms", self.api.request_timeout_ms),
        ];
        for (field, value) in intervals {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    field,
                    message: "must be greater than zero".to_string(),
                });
            }
        }
        if self.polling.history_window_days == 0 {
            return Err(ConfigError::InvalidValue {
                field: "polling.history_window_days",
                message: "must be greater than zero".to_string(),
            });
        }
        if self.alerts.capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "alerts.capacity",
                message: "must be greater than zero".to_string(),
            });
        }
        if self.api.base_url.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "api.base_url",
                message: "must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

/// Telemetry API connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL every endpoint path is appended to
    pub base_url: String,

    pub user_agent: String,

    /// Per-request timeout in milliseconds
    pub request_timeout_ms: u64,

    /// Treat a response without a `success` field as a failure
    pub require_success_flag: bool,

    pub endpoints: EndpointPaths,
}

impl ApiConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Settings for the second dashboard's API, which has no success flags
    pub fn legacy(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            require_success_flag: false,
            endpoints: EndpointPaths::legacy(),
            ..Self::default()
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000/api".to_string(),
            user_agent: format!("Topraklama/{}", env!("CARGO_PKG_VERSION")),
            request_timeout_ms: 4000,
            require_success_flag: true,
            endpoints: EndpointPaths::default(),
        }
    }
}

/// Endpoint path templates; `{id}` is replaced by the transformer id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointPaths {
    pub fleet: String,
    pub detail: String,
    pub history: String,
    pub statistics: String,
    pub alerts: String,
    pub isolate: String,
    pub health: String,
}

impl EndpointPaths {
    /// Paths used by the map dashboard variant
    pub fn legacy() -> Self {
        Self {
            fleet: "/realtime-data".to_string(),
            detail: "/transformer/{id}".to_string(),
            history: "/historical-data/{id}".to_string(),
            statistics: "/statistics".to_string(),
            alerts: "/alerts".to_string(),
            isolate: "/transformers/{id}/isolate".to_string(),
            health: "/health".to_string(),
        }
    }

    /// Expand a template for one transformer
    pub fn expand(template: &str, id: TransformerId) -> String {
        template.replace("{id}", &id.to_string())
    }
}

impl Default for EndpointPaths {
    fn default() -> Self {
        Self {
            fleet: "/transformers".to_string(),
            detail: "/transformers/{id}".to_string(),
            history: "/transformers/{id}/history".to_string(),
            statistics: "/dashboard/stats".to_string(),
            alerts: "/alerts".to_string(),
            isolate: "/transformers/{id}/isolate".to_string(),
            health: "/health".to_string(),
        }
    }
}

/// Poll cadences in milliseconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    pub fleet_interval_ms: u64,
    pub statistics_interval_ms: u64,
    pub alerts_interval_ms: u64,
    pub detail_interval_ms: u64,
    pub history_interval_ms: u64,

    /// Trailing window requested for the history series
    pub history_window_days: u32,
}

impl PollingConfig {
    pub fn fleet_interval(&self) -> Duration {
        Duration::from_millis(self.fleet_interval_ms)
    }

    pub fn statistics_interval(&self) -> Duration {
        Duration::from_millis(self.statistics_interval_ms)
    }

    pub fn alerts_interval(&self) -> Duration {
        Duration::from_millis(self.alerts_interval_ms)
    }

    pub fn detail_interval(&self) -> Duration {
        Duration::from_millis(self.detail_interval_ms)
    }

    pub fn history_interval(&self) -> Duration {
        Duration::from_millis(self.history_interval_ms)
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            fleet_interval_ms: 5000,
            statistics_interval_ms: 10_000,
            alerts_interval_ms: 5000,
            detail_interval_ms: 5000,
            history_interval_ms: 5000,
            history_window_days: 7,
        }
    }
}

/// Alert feed settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Most recent alerts kept from each page
    pub capacity: usize,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self { capacity: 50 }
    }
}

/// Map viewport defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapConfig {
    pub center: Position,
    pub default_zoom: u8,
    /// Zoom used when recentring on a selected transformer
    pub focus_zoom: u8,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            // İzmir
            center: Position::new(38.4237, 27.1428),
            default_zoom: 11,
            focus_zoom: 13,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_partial_file_uses_defaults() {
        let config =
            MonitorConfig::from_json(r#"{ "polling": { "fleet_interval_ms": 2000 } }"#).unwrap();
        assert_eq!(config.polling.fleet_interval(), Duration::from_secs(2));
        assert_eq!(config.polling.statistics_interval(), Duration::from_secs(10));
        assert_eq!(config.alerts.capacity, 50);
        assert_eq!(config.api.endpoints.fleet, "/transformers");
        assert_eq!(config.api.endpoints.health, "/health");
    }

    #[test]
    fn test_zero_interval_rejected() {
        let err = MonitorConfig::from_json(r#"{ "polling": { "alerts_interval_ms": 0 } }"#)
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                field: "polling.alerts_interval_ms",
                ..
            }
        ));
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let err = MonitorConfig::from_json(r#"{ "alerts": { "capacity": 0 } }"#).unwrap_err();
        assert!(err.to_string().contains("alerts.capacity"));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("monitor.json");

        let mut config = MonitorConfig::default();
        config.api = ApiConfig::legacy("http://10.0.0.5:5000/api");
        config.alerts.capacity = 20;
        config.save(&path).unwrap();

        let loaded = MonitorConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
        assert!(!loaded.api.require_success_flag);
        assert_eq!(loaded.api.endpoints.fleet, "/realtime-data");
    }

    #[test]
    fn test_expand_template() {
        assert_eq!(
            EndpointPaths::expand("/transformers/{id}/history", TransformerId(42)),
            "/transformers/42/history"
        );
    }
}

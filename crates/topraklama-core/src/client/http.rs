//! HTTP telemetry client
//!
//! ## Usage
//!
//! ```ignore
//! let client = HttpTelemetryClient::new(ApiConfig::default())?;
//! let fleet = client.fetch_fleet().await?;
//! for record in fleet.iter() {
//!     println!("{}: {:?}", record.name, record.risk_score);
//! }
//! ```

use async_trait::async_trait;
use serde_json::{json, Value};

use super::TelemetrySource;
use crate::config::{ApiConfig, EndpointPaths};
use crate::error::{ActionError, FetchError};
use crate::model::{
    self, AlertRecord, FleetSnapshot, HealthStatus, HistoryPoint, IsolationAck, IsolationAction,
    Statistics, TransformerId, TransformerRecord,
};

/// Telemetry source backed by the monitoring REST API
pub struct HttpTelemetryClient {
    /// HTTP client for API requests
    client: reqwest::Client,
    config: ApiConfig,
}

impl HttpTelemetryClient {
    /// Create a client for the given API settings
    pub fn new(config: ApiConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.request_timeout())
            .build()?;

        Ok(HttpTelemetryClient { client, config })
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn get_json(&self, path: &str, query: &[(&str, String)]) -> Result<Value, FetchError> {
        let url = self.url(path);
        let response = self.client.get(&url).query(query).send().await?;

        if !response.status().is_success() {
            return Err(FetchError::Status(response.status().as_u16()));
        }

        Ok(response.json::<Value>().await?)
    }
}

#[async_trait]
impl TelemetrySource for HttpTelemetryClient {
    async fn fetch_fleet(&self) -> Result<FleetSnapshot, FetchError> {
        let body = self.get_json(&self.config.endpoints.fleet, &[]).await?;
        model::decode_fleet(&body, self.config.require_success_flag)
    }

    async fn fetch_statistics(&self) -> Result<Statistics, FetchError> {
        let body = self.get_json(&self.config.endpoints.statistics, &[]).await?;
        model::decode_statistics(&body, self.config.require_success_flag)
    }

    async fn fetch_alerts(&self) -> Result<Vec<AlertRecord>, FetchError> {
        let body = self.get_json(&self.config.endpoints.alerts, &[]).await?;
        model::decode_alerts(&body, self.config.require_success_flag)
    }

    async fn fetch_detail(&self, id: TransformerId) -> Result<TransformerRecord, FetchError> {
        let path = EndpointPaths::expand(&self.config.endpoints.detail, id);
        let body = self.get_json(&path, &[]).await?;
        model::decode_detail(&body, self.config.require_success_flag)
    }

    async fn fetch_history(
        &self,
        id: TransformerId,
        window_days: u32,
    ) -> Result<Vec<HistoryPoint>, FetchError> {
        let path = EndpointPaths::expand(&self.config.endpoints.history, id);
        let body = self
            .get_json(&path, &[("days", window_days.to_string())])
            .await?;
        model::decode_history(&body, self.config.require_success_flag)
    }

    async fn set_isolation(
        &self,
        id: TransformerId,
        action: IsolationAction,
    ) -> Result<IsolationAck, ActionError> {
        let url = self.url(&EndpointPaths::expand(&self.config.endpoints.isolate, id));
        let response = self
            .client
            .post(&url)
            .json(&json!({ "action": action.as_str() }))
            .send()
            .await
            .map_err(FetchError::from)?;

        let status = response.status();
        let body = response.json::<Value>().await;

        if !status.is_success() {
            // The API explains rejections (unknown id, ...) in the body
            let reason = body
                .ok()
                .and_then(|b| b.get("error").and_then(Value::as_str).map(String::from));
            return match reason {
                Some(message) => Err(ActionError::Rejected(message)),
                None => Err(ActionError::Request(FetchError::Status(status.as_u16()))),
            };
        }

        let body = body.map_err(FetchError::from)?;
        model::decode_isolation_ack(&body, self.config.require_success_flag)
    }

    async fn check_health(&self) -> Result<HealthStatus, FetchError> {
        let body = self.get_json(&self.config.endpoints.health, &[]).await?;
        model::decode_health(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joins_without_double_slash() {
        let mut config = ApiConfig::default();
        config.base_url = "http://example.test/api/".to_string();
        let client = HttpTelemetryClient::new(config).unwrap();
        assert_eq!(
            client.url("/transformers"),
            "http://example.test/api/transformers"
        );
    }

    #[tokio::test]
    async fn test_unreachable_server_is_a_fetch_error() {
        let mut config = ApiConfig::default();
        // Port 9 (discard) on localhost is not expected to serve HTTP
        config.base_url = "http://127.0.0.1:9/api".to_string();
        config.request_timeout_ms = 500;
        let client = HttpTelemetryClient::new(config).unwrap();
        let err = client.fetch_fleet().await.unwrap_err();
        assert!(matches!(
            err,
            FetchError::Transport(_) | FetchError::Timeout
        ));

        let err = client.check_health().await.unwrap_err();
        assert!(matches!(
            err,
            FetchError::Transport(_) | FetchError::Timeout
        ));
    }
}

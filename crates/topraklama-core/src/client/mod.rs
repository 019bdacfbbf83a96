//! Telemetry Sources
//!
//! The engine talks to the monitoring backend only through [`TelemetrySource`].
//! [`HttpTelemetryClient`] is the production implementation; the demo
//! simulator and test fakes implement the same trait.

mod http;

pub use http::HttpTelemetryClient;

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::{ActionError, FetchError};
use crate::model::{
    AlertRecord, FleetSnapshot, HealthStatus, HistoryPoint, IsolationAck, IsolationAction,
    Statistics, TransformerId, TransformerRecord,
};

/// Source of fleet telemetry and target of isolation commands
#[async_trait]
pub trait TelemetrySource: Send + Sync + 'static {
    /// Latest state of the whole fleet
    async fn fetch_fleet(&self) -> Result<FleetSnapshot, FetchError>;

    /// Aggregate counts
    async fn fetch_statistics(&self) -> Result<Statistics, FetchError>;

    /// Current alert page
    async fn fetch_alerts(&self) -> Result<Vec<AlertRecord>, FetchError>;

    /// Latest state of one transformer
    async fn fetch_detail(&self, id: TransformerId) -> Result<TransformerRecord, FetchError>;

    /// Series over the trailing `window_days`
    async fn fetch_history(
        &self,
        id: TransformerId,
        window_days: u32,
    ) -> Result<Vec<HistoryPoint>, FetchError>;

    /// Isolate or restore a transformer
    async fn set_isolation(
        &self,
        id: TransformerId,
        action: IsolationAction,
    ) -> Result<IsolationAck, ActionError>;

    /// Reachability check. Sources without a health endpoint are always up.
    async fn check_health(&self) -> Result<HealthStatus, FetchError> {
        Ok(HealthStatus::ok("in-process source"))
    }
}

#[async_trait]
impl<T: TelemetrySource + ?Sized> TelemetrySource for Arc<T> {
    async fn fetch_fleet(&self) -> Result<FleetSnapshot, FetchError> {
        (**self).fetch_fleet().await
    }

    async fn fetch_statistics(&self) -> Result<Statistics, FetchError> {
        (**self).fetch_statistics().await
    }

    async fn fetch_alerts(&self) -> Result<Vec<AlertRecord>, FetchError> {
        (**self).fetch_alerts().await
    }

    async fn fetch_detail(&self, id: TransformerId) -> Result<TransformerRecord, FetchError> {
        (**self).fetch_detail(id).await
    }

    async fn fetch_history(
        &self,
        id: TransformerId,
        window_days: u32,
    ) -> Result<Vec<HistoryPoint>, FetchError> {
        (**self).fetch_history(id, window_days).await
    }

    async fn set_isolation(
        &self,
        id: TransformerId,
        action: IsolationAction,
    ) -> Result<IsolationAck, ActionError> {
        (**self).set_isolation(id, action).await
    }

    async fn check_health(&self) -> Result<HealthStatus, FetchError> {
        (**self).check_health().await
    }
}

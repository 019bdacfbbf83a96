//! # Topraklama Core Library
//!
//! Real-time state engine for the Topraklama grounding monitor.

#![cfg_attr(docsrs, feature(doc_cfg))]

//!
//! This library provides:
//! - Independent, failure-isolated pollers for each telemetry source
//! - A single-writer aggregator holding the latest fleet, statistics and alerts
//! - Risk tier classification with display colors
//! - Selection tracking with per-selection detail sessions
//! - Isolation commands with user-facing failure notifications
//! - A simulated fleet for running without a backend
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use topraklama_core::prelude::*;
//!
//! let config = MonitorConfig::load("monitor.json".as_ref())?;
//! let client = Arc::new(HttpTelemetryClient::new(config.api.clone())?);
//! let map = Arc::new(MapSync::new(config.map.clone()));
//!
//! let dashboard = Dashboard::new(client, config, map);
//! dashboard.start();
//!
//! let view = dashboard.view();
//! println!("{} transformers, {} at risk", view.fleet.len(), view.tiers.at_risk());
//! ```

pub mod aggregator;
pub mod alerts;
pub mod client;
pub mod config;
pub mod dashboard;
pub mod demo;
pub mod error;
pub mod model;
pub mod notifications;
pub mod poller;
pub mod risk;
pub mod selection;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::aggregator::{FleetRow, RealtimeAggregator};
    pub use crate::alerts::{AlertFeed, AlertStream};
    pub use crate::client::{HttpTelemetryClient, TelemetrySource};
    pub use crate::config::{ApiConfig, EndpointPaths, MonitorConfig, PollingConfig};
    pub use crate::dashboard::{Dashboard, DashboardView};
    pub use crate::demo::DemoSource;
    pub use crate::error::{ActionError, ConfigError, FetchError, SelectionError};
    pub use crate::model::{
        AlertRecord, AlertSeverity, FleetSnapshot, HealthStatus, HistoryPoint, IsolationAction,
        Position, Statistics, TransformerId, TransformerRecord,
    };
    pub use crate::notifications::{Notification, NotificationCenter};
    pub use crate::poller::{DataPoller, PollerStats};
    pub use crate::risk::{classify, Classification, ColorToken, RiskTier, TierCounts};
    pub use crate::selection::{MapSync, NoopView, SelectionState, ViewSink};
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

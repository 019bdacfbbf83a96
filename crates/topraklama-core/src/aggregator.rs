//! Realtime Aggregator
//!
//! Single writer for the three pieces of shared dashboard state: the fleet
//! snapshot, the statistics and the alert feed. Each update replaces its
//! piece as a whole, in the order updates complete. Readers get an `Arc` to
//! the latest fully applied value and can never see half of an update.
//!
//! Each piece lives in a `tokio::sync::watch` channel so consumers can wait
//! for changes. An update equal to the current value is not published.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;

use crate::alerts::AlertFeed;
use crate::model::{AlertRecord, FleetSnapshot, Position, Statistics, TransformerId};
use crate::risk::{self, Classification};

/// Shared view state with one update entry point per source
pub struct RealtimeAggregator {
    fleet: watch::Sender<Arc<FleetSnapshot>>,
    statistics: watch::Sender<Option<Arc<Statistics>>>,
    alerts: watch::Sender<Arc<AlertFeed>>,
    alert_capacity: usize,
}

impl RealtimeAggregator {
    /// Create an empty aggregator keeping at most `alert_capacity` alerts
    pub fn new(alert_capacity: usize) -> Self {
        let (fleet, _) = watch::channel(Arc::new(FleetSnapshot::default()));
        let (statistics, _) = watch::channel(None);
        let (alerts, _) = watch::channel(Arc::new(AlertFeed::default()));
        Self {
            fleet,
            statistics,
            alerts,
            alert_capacity,
        }
    }

    /// Replace the fleet snapshot. Returns whether the visible state changed.
    pub fn update_fleet(&self, snapshot: FleetSnapshot) -> bool {
        let changed = self.fleet.send_if_modified(|current| {
            if **current == snapshot {
                return false;
            }
            *current = Arc::new(snapshot);
            true
        });
        if changed {
            tracing::debug!(transformers = self.fleet.borrow().len(), "fleet snapshot applied");
        }
        changed
    }

    /// Replace the statistics. Returns whether the visible state changed.
    pub fn update_statistics(&self, statistics: Statistics) -> bool {
        self.statistics.send_if_modified(|current| {
            if current.as_deref() == Some(&statistics) {
                return false;
            }
            *current = Some(Arc::new(statistics));
            true
        })
    }

    /// Replace the alert feed with a new page. Returns whether the visible state changed.
    pub fn update_alerts(&self, page: Vec<AlertRecord>) -> bool {
        let feed = AlertFeed::from_page(page, self.alert_capacity);
        self.alerts.send_if_modified(|current| {
            if **current == feed {
                return false;
            }
            *current = Arc::new(feed);
            true
        })
    }

    /// Latest fleet snapshot
    pub fn fleet(&self) -> Arc<FleetSnapshot> {
        Arc::clone(&self.fleet.borrow())
    }

    /// Latest statistics, if any poll has succeeded yet
    pub fn statistics(&self) -> Option<Arc<Statistics>> {
        self.statistics.borrow().clone()
    }

    /// Latest alert feed
    pub fn alerts(&self) -> Arc<AlertFeed> {
        Arc::clone(&self.alerts.borrow())
    }

    pub fn subscribe_fleet(&self) -> watch::Receiver<Arc<FleetSnapshot>> {
        self.fleet.subscribe()
    }

    pub fn subscribe_statistics(&self) -> watch::Receiver<Option<Arc<Statistics>>> {
        self.statistics.subscribe()
    }

    pub fn subscribe_alerts(&self) -> watch::Receiver<Arc<AlertFeed>> {
        self.alerts.subscribe()
    }

    /// Fleet records with their classification, in arrival order
    pub fn fleet_rows(&self) -> Vec<FleetRow> {
        self.fleet()
            .iter()
            .map(|record| FleetRow {
                id: record.id,
                name: record.name.clone(),
                region: record.region.clone(),
                position: record.position,
                risk_score: record.risk_score,
                classification: risk::classify_record(record),
                is_anomaly_flagged: record.is_anomaly_flagged,
                isolation_status: record.isolation_status,
            })
            .collect()
    }
}

/// One fleet entry as list and map renderers consume it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FleetRow {
    pub id: TransformerId,
    pub name: String,
    pub region: String,
    /// `None` rows are listed but not drawn on the map
    pub position: Option<Position>,
    pub risk_score: Option<f64>,
    pub classification: Classification,
    pub is_anomaly_flagged: bool,
    pub isolation_status: bool,
}

//! Alert feed
//!
//! Each successful alert poll replaces the visible feed with the server's
//! current page, ordered newest first and cut to the configured capacity.
//! Nothing accumulates locally across polls.

use std::cmp::Reverse;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::aggregator::RealtimeAggregator;
use crate::client::TelemetrySource;
use crate::model::{AlertRecord, AlertSeverity};
use crate::poller::{DataPoller, PollerStats};

/// Bounded snapshot of the alert page
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertFeed {
    alerts: Vec<AlertRecord>,
    /// Entries the server sent beyond capacity
    dropped: usize,
}

impl AlertFeed {
    /// Keep the `capacity` most recent alerts of a page.
    ///
    /// The page is ordered newest first whatever order the server sent it in.
    /// Alerts without a timestamp sort last and keep their relative order.
    pub fn from_page(mut page: Vec<AlertRecord>, capacity: usize) -> Self {
        page.sort_by_key(|alert| Reverse(alert.timestamp));
        let dropped = page.len().saturating_sub(capacity);
        page.truncate(capacity);
        Self {
            alerts: page,
            dropped,
        }
    }

    pub fn len(&self) -> usize {
        self.alerts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty()
    }

    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn iter(&self) -> impl Iterator<Item = &AlertRecord> {
        self.alerts.iter()
    }

    pub fn as_slice(&self) -> &[AlertRecord] {
        &self.alerts
    }

    /// Most severe level present in the feed
    pub fn highest_severity(&self) -> Option<AlertSeverity> {
        self.alerts.iter().map(|a| a.severity).max()
    }

    pub fn count_severity(&self, severity: AlertSeverity) -> usize {
        self.alerts.iter().filter(|a| a.severity == severity).count()
    }
}

/// Poller feeding the aggregator's alert feed
pub struct AlertStream {
    poller: DataPoller,
}

impl AlertStream {
    /// Start polling alerts from `source` into `aggregator`
    pub fn start<S: TelemetrySource>(
        source: Arc<S>,
        aggregator: Arc<RealtimeAggregator>,
        interval: Duration,
    ) -> Self {
        let poller = DataPoller::spawn(
            "alerts",
            interval,
            move || {
                let source = Arc::clone(&source);
                async move { source.fetch_alerts().await }
            },
            move |page| {
                aggregator.update_alerts(page);
            },
        );
        Self { poller }
    }

    pub fn trigger(&self) {
        self.poller.trigger();
    }

    pub fn stats(&self) -> PollerStats {
        self.poller.stats()
    }

    pub fn is_running(&self) -> bool {
        self.poller.is_running()
    }

    pub fn stop(&mut self) {
        self.poller.stop();
    }
}

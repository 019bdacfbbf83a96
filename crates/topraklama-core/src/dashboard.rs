//! Dashboard State Container
//!
//! [`Dashboard`] wires the engine together: the fleet and statistics
//! pollers, the alert stream, the selection controller and the notification
//! center, all sharing one [`RealtimeAggregator`]. Renderers only read from it
//! through [`Dashboard::view`] and the aggregator's subscriptions.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;

use crate::aggregator::{FleetRow, RealtimeAggregator};
use crate::alerts::AlertStream;
use crate::client::TelemetrySource;
use crate::config::MonitorConfig;
use crate::error::{ActionError, SelectionError};
use crate::model::{AlertRecord, IsolationAck, IsolationAction, Statistics, TransformerId};
use crate::notifications::{Notification, NotificationCenter};
use crate::poller::{DataPoller, PollerStats};
use crate::risk::TierCounts;
use crate::selection::{DetailData, SelectionController, SelectionState, ViewSink};

/// Read model handed to renderers
#[derive(Debug, Clone, Serialize)]
pub struct DashboardView {
    pub fleet: Vec<FleetRow>,
    /// Tier counts of `fleet`
    pub tiers: TierCounts,
    pub statistics: Option<Statistics>,
    pub alerts: Vec<AlertRecord>,
    pub selection: SelectionState,
    pub detail: Option<DetailData>,
    pub notifications: Vec<Notification>,
}

struct Pollers {
    fleet: DataPoller,
    statistics: DataPoller,
    alerts: AlertStream,
}

impl Pollers {
    fn stop(&mut self) {
        self.fleet.stop();
        self.statistics.stop();
        self.alerts.stop();
    }
}

pub struct Dashboard<S: TelemetrySource> {
    source: Arc<S>,
    config: MonitorConfig,
    aggregator: Arc<RealtimeAggregator>,
    selection: Arc<SelectionController<S>>,
    notifications: NotificationCenter,
    pollers: Mutex<Option<Pollers>>,
}

impl<S: TelemetrySource> Dashboard<S> {
    /// Build a stopped dashboard. Call [`Dashboard::start`] to begin polling.
    pub fn new(source: Arc<S>, config: MonitorConfig, view: Arc<dyn ViewSink>) -> Self {
        let aggregator = Arc::new(RealtimeAggregator::new(config.alerts.capacity));
        let selection = Arc::new(SelectionController::new(
            Arc::clone(&source),
            Arc::clone(&aggregator),
            view,
            config.polling.clone(),
        ));

        Self {
            source,
            config,
            aggregator,
            selection,
            notifications: NotificationCenter::default(),
            pollers: Mutex::new(None),
        }
    }

    fn pollers(&self) -> MutexGuard<'_, Option<Pollers>> {
        self.pollers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start the fleet, statistics and alert pollers. Idempotent.
    ///
    /// Must be called within a Tokio runtime.
    pub fn start(&self) {
        let mut pollers = self.pollers();
        if pollers.is_some() {
            return;
        }
        let polling = &self.config.polling;

        let fleet = {
            let source = Arc::clone(&self.source);
            let aggregator = Arc::clone(&self.aggregator);
            let selection = Arc::clone(&self.selection);
            DataPoller::spawn(
                "fleet",
                polling.fleet_interval(),
                move || {
                    let source = Arc::clone(&source);
                    async move { source.fetch_fleet().await }
                },
                move |snapshot| {
                    aggregator.update_fleet(snapshot);
                    selection.reconcile(&aggregator.fleet());
                },
            )
        };

        let statistics = {
            let source = Arc::clone(&self.source);
            let aggregator = Arc::clone(&self.aggregator);
            DataPoller::spawn(
                "statistics",
                polling.statistics_interval(),
                move || {
                    let source = Arc::clone(&source);
                    async move { source.fetch_statistics().await }
                },
                move |stats| {
                    aggregator.update_statistics(stats);
                },
            )
        };

        let alerts = AlertStream::start(
            Arc::clone(&self.source),
            Arc::clone(&self.aggregator),
            polling.alerts_interval(),
        );

        *pollers = Some(Pollers {
            fleet,
            statistics,
            alerts,
        });
        tracing::info!("dashboard started");
    }

    /// Stop every poller, including the detail session. Idempotent.
    pub fn shutdown(&self) {
        let running = self.pollers().take();
        if let Some(mut pollers) = running {
            pollers.stop();
            tracing::info!("dashboard stopped");
        }
        self.selection.shutdown();
    }

    pub fn is_running(&self) -> bool {
        self.pollers().is_some()
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn aggregator(&self) -> &Arc<RealtimeAggregator> {
        &self.aggregator
    }

    pub fn notifications(&self) -> &NotificationCenter {
        &self.notifications
    }

    pub fn select(&self, id: TransformerId) -> Result<(), SelectionError> {
        self.selection.select(id)
    }

    pub fn close_selection(&self) {
        self.selection.close();
    }

    pub fn selection_state(&self) -> SelectionState {
        self.selection.state()
    }

    pub fn detail(&self) -> Option<DetailData> {
        self.selection.detail().map(|(_, data)| data)
    }

    /// Whether a detail session currently has live pollers
    pub fn has_detail_session(&self) -> bool {
        self.selection.has_live_session()
    }

    /// Isolate or restore a transformer.
    ///
    /// On success the fleet, statistics and alerts are re-polled immediately,
    /// as is the detail of `id` if it is selected. On failure a notification
    /// is raised and the error returned.
    pub async fn set_isolation(
        &self,
        id: TransformerId,
        action: IsolationAction,
    ) -> Result<IsolationAck, ActionError> {
        match self.source.set_isolation(id, action).await {
            Ok(ack) => {
                tracing::info!(
                    transformer = %id,
                    action = action.as_str(),
                    connected = ?ack.isolation_status,
                    "isolation command accepted"
                );
                self.refresh_after_action(id);
                Ok(ack)
            }
            Err(e) => {
                tracing::warn!(
                    transformer = %id,
                    action = action.as_str(),
                    error = %e,
                    "isolation command failed"
                );
                self.notifications.push(
                    format!("Could not {} transformer {id}: {e}", action.as_str()),
                    Some(id),
                );
                Err(e)
            }
        }
    }

    fn refresh_after_action(&self, id: TransformerId) {
        if let Some(pollers) = self.pollers().as_ref() {
            pollers.fleet.trigger();
            pollers.statistics.trigger();
            pollers.alerts.trigger();
        }
        self.selection.refresh_detail(id);
    }

    /// Counters of the dashboard-wide pollers
    pub fn poller_stats(&self) -> Vec<(&'static str, PollerStats)> {
        match self.pollers().as_ref() {
            Some(p) => vec![
                ("fleet", p.fleet.stats()),
                ("statistics", p.statistics.stats()),
                ("alerts", p.alerts.stats()),
            ],
            None => Vec::new(),
        }
    }

    /// Consistent read of everything a renderer needs
    pub fn view(&self) -> DashboardView {
        let fleet = self.aggregator.fleet_rows();
        let tiers = TierCounts::tally(fleet.iter().map(|row| row.classification));
        DashboardView {
            tiers,
            fleet,
            statistics: self.aggregator.statistics().map(|s| (*s).clone()),
            alerts: self.aggregator.alerts().as_slice().to_vec(),
            selection: self.selection.state(),
            detail: self.detail(),
            notifications: self.notifications.active(),
        }
    }
}

impl<S: TelemetrySource> Drop for Dashboard<S> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

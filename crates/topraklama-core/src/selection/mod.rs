//! Selection Controller
//!
//! Owns the focused transformer and the [`DetailSession`] that follows it.
//!
//! ```text
//!            select(id)                first detail
//!   None ───────────────▶ Selecting(id) ────────────▶ Selected(id)
//!    ▲                         │                           │
//!    └──── close / id gone ────┴───────────────────────────┘
//! ```
//!
//! Picking another id tears the current session down before the next one
//! starts. Every session carries the generation it was opened under; a
//! promotion from a session whose generation is no longer current is
//! ignored.

mod session;
mod view;

pub use session::{DetailData, DetailSession};
pub use view::{MapSync, NoopView, SidePanel, ViewSink, Viewport};

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde::Serialize;

use crate::aggregator::RealtimeAggregator;
use crate::client::TelemetrySource;
use crate::config::PollingConfig;
use crate::error::SelectionError;
use crate::model::{FleetSnapshot, TransformerId};

/// Focus state of the dashboard
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "id", rename_all = "snake_case")]
pub enum SelectionState {
    #[default]
    None,
    /// Picked, waiting for the first detail
    Selecting(TransformerId),
    Selected(TransformerId),
}

impl SelectionState {
    pub fn selected_id(&self) -> Option<TransformerId> {
        match self {
            SelectionState::None => None,
            SelectionState::Selecting(id) | SelectionState::Selected(id) => Some(*id),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, SelectionState::None)
    }
}

#[derive(Default)]
struct Inner {
    state: SelectionState,
    generation: u64,
    session: Option<DetailSession>,
}

fn lock(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

// Sessions are always stopped after the inner lock is released: a detail
// sink holds its poller gate while it promotes, and promotion takes the lock.
fn stop_session(session: Option<DetailSession>) {
    if let Some(mut session) = session {
        session.stop();
    }
}

pub struct SelectionController<S> {
    inner: Arc<Mutex<Inner>>,
    source: Arc<S>,
    aggregator: Arc<RealtimeAggregator>,
    view: Arc<dyn ViewSink>,
    polling: PollingConfig,
}

impl<S: TelemetrySource> SelectionController<S> {
    pub fn new(
        source: Arc<S>,
        aggregator: Arc<RealtimeAggregator>,
        view: Arc<dyn ViewSink>,
        polling: PollingConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            source,
            aggregator,
            view,
            polling,
        }
    }

    pub fn state(&self) -> SelectionState {
        lock(&self.inner).state
    }

    /// Focus `id`, replacing any current selection.
    ///
    /// The id must be part of the latest fleet snapshot. Picking the id that
    /// is already selected changes nothing.
    pub fn select(&self, id: TransformerId) -> Result<(), SelectionError> {
        // Membership is checked under the same lock reconcile clears under
        let (generation, position, previous) = {
            let mut inner = lock(&self.inner);
            let fleet = self.aggregator.fleet();
            let record = fleet
                .get(id)
                .ok_or(SelectionError::UnknownTransformer(id))?;
            if inner.state.selected_id() == Some(id) {
                return Ok(());
            }
            inner.generation += 1;
            inner.state = SelectionState::Selecting(id);
            (inner.generation, record.position, inner.session.take())
        };

        stop_session(previous);

        let session = DetailSession::open(
            Arc::clone(&self.source),
            id,
            generation,
            &self.polling,
            promoter(Arc::downgrade(&self.inner), id),
        );

        let stale = {
            let mut inner = lock(&self.inner);
            if inner.generation == generation {
                inner.session = Some(session);
                None
            } else {
                // Superseded while opening
                Some(session)
            }
        };
        if stale.is_some() {
            stop_session(stale);
            return Ok(());
        }

        tracing::info!(transformer = %id, generation, "transformer selected");
        self.view.focus(id, position);
        Ok(())
    }

    /// Clear the selection. No-op when nothing is selected.
    pub fn close(&self) {
        if let Some(id) = self.clear() {
            tracing::info!(transformer = %id, "selection closed");
            self.view.show_alert_feed();
        }
    }

    /// Check the selection against a newly applied fleet snapshot.
    ///
    /// Returns true if the selected transformer was missing and the selection
    /// was cleared.
    pub fn reconcile(&self, fleet: &FleetSnapshot) -> bool {
        let cleared = self.clear_if(|id| !fleet.contains(id));
        match cleared {
            Some(id) => {
                tracing::info!(
                    transformer = %id,
                    "selected transformer left the fleet, selection cleared"
                );
                self.view.show_alert_feed();
                true
            }
            None => false,
        }
    }

    /// Latest detail data of the current selection
    pub fn detail(&self) -> Option<(TransformerId, DetailData)> {
        let inner = lock(&self.inner);
        inner
            .session
            .as_ref()
            .map(|session| (session.id(), session.snapshot()))
    }

    /// Re-poll the detail session if `id` is the selected transformer
    pub fn refresh_detail(&self, id: TransformerId) -> bool {
        let inner = lock(&self.inner);
        match inner.session.as_ref() {
            Some(session) if session.id() == id => {
                session.refresh();
                true
            }
            _ => false,
        }
    }

    /// Whether a detail session currently has live pollers
    pub fn has_live_session(&self) -> bool {
        lock(&self.inner)
            .session
            .as_ref()
            .is_some_and(DetailSession::is_running)
    }

    /// Stop the detail session without view side effects
    pub fn shutdown(&self) {
        self.clear();
    }

    fn clear(&self) -> Option<TransformerId> {
        self.clear_if(|_| true)
    }

    /// Clear the selection if the selected id matches `pred`, deciding and
    /// acting under one lock
    fn clear_if(&self, pred: impl FnOnce(TransformerId) -> bool) -> Option<TransformerId> {
        let (id, session) = {
            let mut inner = lock(&self.inner);
            let id = inner.state.selected_id().filter(|&id| pred(id))?;
            inner.generation += 1;
            inner.state = SelectionState::None;
            (id, inner.session.take())
        };
        stop_session(session);
        Some(id)
    }
}

fn promoter(inner: Weak<Mutex<Inner>>, id: TransformerId) -> impl FnOnce(u64) + Send + 'static {
    move |generation| {
        let Some(inner) = inner.upgrade() else {
            return;
        };
        let mut inner = lock(&inner);
        if inner.generation == generation && inner.state == SelectionState::Selecting(id) {
            inner.state = SelectionState::Selected(id);
            tracing::debug!(transformer = %id, generation, "detail loaded");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ActionError, FetchError};
    use crate::model::{
        AlertRecord, HistoryPoint, IsolationAck, IsolationAction, Position, Statistics,
        TransformerRecord,
    };
    use async_trait::async_trait;
    use std::time::Duration;

    struct FixedSource;

    #[async_trait]
    impl TelemetrySource for FixedSource {
        async fn fetch_fleet(&self) -> Result<FleetSnapshot, FetchError> {
            Ok(FleetSnapshot::default())
        }

        async fn fetch_statistics(&self) -> Result<Statistics, FetchError> {
            Ok(Statistics::default())
        }

        async fn fetch_alerts(&self) -> Result<Vec<AlertRecord>, FetchError> {
            Ok(Vec::new())
        }

        async fn fetch_detail(&self, id: TransformerId) -> Result<TransformerRecord, FetchError> {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(TransformerRecord::new(id, format!("T{id}"), "Bornova"))
        }

        async fn fetch_history(
            &self,
            _id: TransformerId,
            _window_days: u32,
        ) -> Result<Vec<HistoryPoint>, FetchError> {
            Ok(Vec::new())
        }

        async fn set_isolation(
            &self,
            _id: TransformerId,
            _action: IsolationAction,
        ) -> Result<IsolationAck, ActionError> {
            Ok(IsolationAck::default())
        }
    }

    fn fleet(ids: &[u32]) -> FleetSnapshot {
        FleetSnapshot::from_records(ids.iter().map(|&i| {
            let mut record = TransformerRecord::new(TransformerId(i), format!("T{i}"), "Konak");
            record.position = Some(Position::new(38.4, 27.1 + f64::from(i) * 0.01));
            record
        }))
    }

    fn controller() -> (
        SelectionController<FixedSource>,
        Arc<RealtimeAggregator>,
        Arc<MapSync>,
    ) {
        let aggregator = Arc::new(RealtimeAggregator::new(50));
        aggregator.update_fleet(fleet(&[1, 2, 3]));
        let map = Arc::new(MapSync::default());
        let controller = SelectionController::new(
            Arc::new(FixedSource),
            Arc::clone(&aggregator),
            Arc::clone(&map) as Arc<dyn ViewSink>,
            PollingConfig::default(),
        );
        (controller, aggregator, map)
    }

    #[tokio::test(start_paused = true)]
    async fn test_selecting_then_selected_after_first_detail() {
        let (controller, _, map) = controller();
        controller.select(TransformerId(2)).unwrap();
        assert_eq!(controller.state(), SelectionState::Selecting(TransformerId(2)));
        assert_eq!(map.panel(), SidePanel::Detail(TransformerId(2)));
        assert_eq!(map.viewport().zoom, 13);

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(controller.state(), SelectionState::Selected(TransformerId(2)));
        let (id, data) = controller.detail().unwrap();
        assert_eq!(id, TransformerId(2));
        assert_eq!(data.detail.unwrap().name, "T2");
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_id_is_rejected() {
        let (controller, _, _) = controller();
        assert_eq!(
            controller.select(TransformerId(99)),
            Err(SelectionError::UnknownTransformer(TransformerId(99)))
        );
        assert!(controller.state().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_switch_discards_stale_promotion() {
        let (controller, _, _) = controller();
        controller.select(TransformerId(1)).unwrap();
        // T1's first detail is still in flight
        tokio::time::sleep(Duration::from_millis(50)).await;
        controller.select(TransformerId(3)).unwrap();
        assert_eq!(controller.state(), SelectionState::Selecting(TransformerId(3)));

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(controller.state(), SelectionState::Selected(TransformerId(3)));
        assert_eq!(controller.detail().unwrap().0, TransformerId(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconcile_clears_missing_selection() {
        let (controller, aggregator, map) = controller();
        controller.select(TransformerId(1)).unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert!(!controller.reconcile(&aggregator.fleet()));
        aggregator.update_fleet(fleet(&[2, 3]));
        assert!(controller.reconcile(&aggregator.fleet()));

        assert!(controller.state().is_none());
        assert!(controller.detail().is_none());
        assert_eq!(map.panel(), SidePanel::AlertFeed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_is_idempotent() {
        let (controller, _, map) = controller();
        controller.close();
        controller.select(TransformerId(1)).unwrap();
        controller.close();
        controller.close();
        assert!(controller.state().is_none());
        assert!(!controller.has_live_session());
        assert_eq!(map.panel(), SidePanel::AlertFeed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reselecting_same_id_keeps_session() {
        let (controller, _, _) = controller();
        controller.select(TransformerId(1)).unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;
        controller.select(TransformerId(1)).unwrap();
        assert_eq!(controller.state(), SelectionState::Selected(TransformerId(1)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_select_and_reconcile_keep_selection_in_fleet() {
        for round in 0..100u32 {
            let (controller, aggregator, _) = controller();
            let controller = Arc::new(controller);

            let fleet_writer = {
                let controller = Arc::clone(&controller);
                let aggregator = Arc::clone(&aggregator);
                tokio::spawn(async move {
                    for i in 0..50u32 {
                        let ids: &[u32] = if (i + round) % 2 == 0 {
                            &[1, 2, 3]
                        } else {
                            &[2, 3]
                        };
                        aggregator.update_fleet(fleet(ids));
                        controller.reconcile(&aggregator.fleet());
                        tokio::task::yield_now().await;
                    }
                })
            };
            let selector = {
                let controller = Arc::clone(&controller);
                tokio::spawn(async move {
                    for i in 0..50u32 {
                        let _ = controller.select(TransformerId(1 + i % 2));
                        tokio::task::yield_now().await;
                    }
                })
            };
            fleet_writer.await.unwrap();
            selector.await.unwrap();

            if let Some(id) = controller.state().selected_id() {
                assert!(
                    aggregator.fleet().contains(id),
                    "round {round}: {id} selected but missing from the latest fleet"
                );
            }
            controller.shutdown();
        }
    }
}

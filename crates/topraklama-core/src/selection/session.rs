//! Detail Session
//!
//! Two pollers scoped to one selected transformer: the current detail and
//! the trailing history window. The session is the only owner of both
//! poller handles, so stopping or dropping it stops both.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;

use crate::client::TelemetrySource;
use crate::config::PollingConfig;
use crate::model::{HistoryPoint, TransformerId, TransformerRecord};
use crate::poller::{DataPoller, PollerStats};

/// Latest data fetched for the selected transformer
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DetailData {
    pub detail: Option<TransformerRecord>,
    pub history: Vec<HistoryPoint>,
}

pub struct DetailSession {
    id: TransformerId,
    generation: u64,
    data: Arc<Mutex<DetailData>>,
    detail_poller: DataPoller,
    history_poller: DataPoller,
}

fn lock(data: &Mutex<DetailData>) -> MutexGuard<'_, DetailData> {
    data.lock().unwrap_or_else(PoisonError::into_inner)
}

impl DetailSession {
    /// Open a session for `id` and start both pollers.
    ///
    /// `on_first_detail` runs once, with this session's generation, after the
    /// first detail fetch succeeds.
    pub fn open<S, F>(
        source: Arc<S>,
        id: TransformerId,
        generation: u64,
        polling: &PollingConfig,
        on_first_detail: F,
    ) -> Self
    where
        S: TelemetrySource,
        F: FnOnce(u64) + Send + 'static,
    {
        let data = Arc::new(Mutex::new(DetailData::default()));

        let detail_poller = {
            let source = Arc::clone(&source);
            let data = Arc::clone(&data);
            let mut first = Some(on_first_detail);
            DataPoller::spawn(
                format!("detail-{id}"),
                polling.detail_interval(),
                move || {
                    let source = Arc::clone(&source);
                    async move { source.fetch_detail(id).await }
                },
                move |record| {
                    lock(&data).detail = Some(record);
                    if let Some(notify) = first.take() {
                        notify(generation);
                    }
                },
            )
        };

        let history_poller = {
            let data = Arc::clone(&data);
            let window_days = polling.history_window_days;
            DataPoller::spawn(
                format!("history-{id}"),
                polling.history_interval(),
                move || {
                    let source = Arc::clone(&source);
                    async move { source.fetch_history(id, window_days).await }
                },
                move |points| {
                    lock(&data).history = points;
                },
            )
        };

        tracing::debug!(transformer = %id, generation, "detail session opened");

        Self {
            id,
            generation,
            data,
            detail_poller,
            history_poller,
        }
    }

    pub fn id(&self) -> TransformerId {
        self.id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Copy of the latest detail and history
    pub fn snapshot(&self) -> DetailData {
        lock(&self.data).clone()
    }

    /// Re-poll detail and history now
    pub fn refresh(&self) {
        self.detail_poller.trigger();
        self.history_poller.trigger();
    }

    pub fn is_running(&self) -> bool {
        self.detail_poller.is_running() || self.history_poller.is_running()
    }

    /// Counters of the detail and history pollers
    pub fn stats(&self) -> (PollerStats, PollerStats) {
        (self.detail_poller.stats(), self.history_poller.stats())
    }

    /// Stop both pollers. Nothing reaches this session's data afterwards.
    pub fn stop(&mut self) {
        self.detail_poller.stop();
        self.history_poller.stop();
        tracing::debug!(
            transformer = %self.id,
            generation = self.generation,
            "detail session closed"
        );
    }
}

//! User-facing notifications for failed actions
//!
//! Background polling failures stay silent. Failed isolate/restore commands
//! end up here until the user dismisses them.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::model::TransformerId;

/// Notifications kept before the oldest is discarded
pub const DEFAULT_NOTIFICATION_CAPACITY: usize = 20;

/// A dismissible message
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub id: Uuid,
    pub message: String,
    pub raised_at: DateTime<Utc>,
    /// Transformer the failed action targeted
    pub transformer: Option<TransformerId>,
}

pub struct NotificationCenter {
    capacity: usize,
    active: Mutex<VecDeque<Notification>>,
}

impl NotificationCenter {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            active: Mutex::new(VecDeque::new()),
        }
    }

    /// Raise a notification and return its id
    pub fn push(&self, message: impl Into<String>, transformer: Option<TransformerId>) -> Uuid {
        let notification = Notification {
            id: Uuid::new_v4(),
            message: message.into(),
            raised_at: Utc::now(),
            transformer,
        };
        let id = notification.id;

        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if active.len() == self.capacity {
            active.pop_front();
        }
        active.push_back(notification);
        id
    }

    /// Dismiss one notification. Returns false if it was not active.
    pub fn dismiss(&self, id: Uuid) -> bool {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        match active.iter().position(|n| n.id == id) {
            Some(index) => {
                active.remove(index);
                true
            }
            None => false,
        }
    }

    /// Active notifications, oldest first
    pub fn active(&self) -> Vec<Notification> {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.active.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

impl Default for NotificationCenter {
    fn default() -> Self {
        Self::new(DEFAULT_NOTIFICATION_CAPACITY)
    }
}

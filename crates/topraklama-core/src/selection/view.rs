//! Map and side panel collaborators driven by selection changes

use std::sync::{Mutex, PoisonError};

use serde::Serialize;

use crate::config::MapConfig;
use crate::model::{Position, TransformerId};

/// Receives the side effects of selection transitions
pub trait ViewSink: Send + Sync {
    /// A transformer was picked; pan the map to it and show its detail
    fn focus(&self, id: TransformerId, position: Option<Position>);

    /// The selection was cleared; return the side panel to the alert feed
    fn show_alert_feed(&self);
}

/// View sink that ignores every side effect
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopView;

impl ViewSink for NoopView {
    fn focus(&self, _id: TransformerId, _position: Option<Position>) {}

    fn show_alert_feed(&self) {}
}

/// Visible map region
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Viewport {
    pub center: Position,
    pub zoom: u8,
}

/// What the side panel is showing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum SidePanel {
    AlertFeed,
    Detail(TransformerId),
}

/// Tracks viewport and side panel the way the dashboard map follows selection.
///
/// Focusing a transformer with a known position recentres on it at the focus
/// zoom. A transformer without a position opens its detail but leaves the
/// map where it is. Clearing the selection keeps the viewport.
pub struct MapSync {
    config: MapConfig,
    state: Mutex<(Viewport, SidePanel)>,
}

impl MapSync {
    pub fn new(config: MapConfig) -> Self {
        let viewport = Viewport {
            center: config.center,
            zoom: config.default_zoom,
        };
        Self {
            config,
            state: Mutex::new((viewport, SidePanel::AlertFeed)),
        }
    }

    pub fn viewport(&self) -> Viewport {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).0
    }

    pub fn panel(&self) -> SidePanel {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).1
    }

    /// Return to the configured overview
    pub fn reset(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.0 = Viewport {
            center: self.config.center,
            zoom: self.config.default_zoom,
        };
    }
}

impl Default for MapSync {
    fn default() -> Self {
        Self::new(MapConfig::default())
    }
}

impl ViewSink for MapSync {
    fn focus(&self, id: TransformerId, position: Option<Position>) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(center) = position {
            state.0 = Viewport {
                center,
                zoom: self.config.focus_zoom,
            };
        }
        state.1 = SidePanel::Detail(id);
    }

    fn show_alert_feed(&self) {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).1 = SidePanel::AlertFeed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_focus_recentres_at_focus_zoom() {
        let map = MapSync::default();
        assert_eq!(map.viewport().zoom, 11);

        let target = Position::new(38.40, 27.10);
        map.focus(TransformerId(7), Some(target));
        assert_eq!(
            map.viewport(),
            Viewport {
                center: target,
                zoom: 13
            }
        );
        assert_eq!(map.panel(), SidePanel::Detail(TransformerId(7)));
    }

    #[test]
    fn test_focus_without_position_keeps_viewport() {
        let map = MapSync::default();
        let before = map.viewport();
        map.focus(TransformerId(3), None);
        assert_eq!(map.viewport(), before);
        assert_eq!(map.panel(), SidePanel::Detail(TransformerId(3)));
    }

    #[test]
    fn test_show_alert_feed_and_reset() {
        let map = MapSync::default();
        map.focus(TransformerId(1), Some(Position::new(38.5, 27.0)));
        map.show_alert_feed();
        assert_eq!(map.panel(), SidePanel::AlertFeed);
        assert_eq!(map.viewport().zoom, 13);

        map.reset();
        assert_eq!(map.viewport().zoom, 11);
        assert_eq!(map.viewport().center, MapConfig::default().center);
    }
}

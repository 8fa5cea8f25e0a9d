//! AppState — shared read-only data passed to all components during render/event.
//!
//! Components read this, but never mutate it.  The App event-loop is the only
//! thing that writes to AppState.

use swipe_proto::config::UiConfig;
use swipe_proto::gesture::ViewportClass;
use swipe_proto::navigation::Navigator;
use swipe_proto::protocol::{PlaybackStatus, Station};

#[derive(Debug, Clone, PartialEq)]
pub enum CatalogState {
    Loading,
    Failed(String),
    Ready,
}

pub struct AppState {
    pub catalog: CatalogState,
    pub nav: Navigator,

    // ── Player ──────────────────────────────────────────────────────────────
    /// Set by the start gesture; audio is locked until then.
    pub started: bool,
    pub status: PlaybackStatus,
    pub muted: bool,
    pub volume: f32,
    pub last_error: Option<String>,
    pub listeners: usize,

    // ── Layout ──────────────────────────────────────────────────────────────
    /// Live drag/settle offset of the carousel (px).
    pub drag_offset: f32,
    pub viewport: ViewportClass,
    /// Grid toggled on with `g` while the viewport is wide.
    pub grid_forced: bool,
    pub ui: UiConfig,
}

impl AppState {
    pub fn new(ui: UiConfig, volume: f32) -> Self {
        Self {
            catalog: CatalogState::Loading,
            nav: Navigator::default(),
            started: false,
            status: PlaybackStatus::Idle,
            muted: false,
            volume,
            last_error: None,
            listeners: 0,
            drag_offset: 0.0,
            viewport: ViewportClass::Desktop,
            grid_forced: false,
            ui,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.catalog == CatalogState::Ready && !self.nav.is_empty()
    }

    pub fn current_station(&self) -> Option<&Station> {
        self.nav.current()
    }

    pub fn current_index(&self) -> Option<usize> {
        self.nav.index()
    }

    pub fn show_grid(&self) -> bool {
        self.viewport == ViewportClass::Narrow || self.grid_forced
    }

    /// Convert a terminal row count into carousel pixels.
    pub fn rows_to_px(&self, rows: f32) -> f32 {
        rows * self.ui.px_per_row
    }

    pub fn px_to_rows(&self, px: f32) -> f32 {
        if self.ui.px_per_row <= 0.0 {
            return 0.0;
        }
        px / self.ui.px_per_row
    }
}

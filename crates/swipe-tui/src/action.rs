//! Action enum — user intents produced by components and dispatched by the App.

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    // ── Navigation ───────────────────────────────────────────────────────────
    Next,
    Prev,
    GoTo(usize),

    // ── Playback ─────────────────────────────────────────────────────────────
    /// The user gesture that unlocks audio.
    Start,
    ToggleMute,
    TogglePause,
    /// Relative volume change.
    Volume(f32),

    // ── App ──────────────────────────────────────────────────────────────────
    ToggleGrid,
    RetryCatalog,
    Quit,
}

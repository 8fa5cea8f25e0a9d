//! App — component-based event loop.
//!
//! Architecture:
//! - `App` owns the components, the gesture tracker, the wheel accumulator
//!   and `AppState` (shared read-only data for components).
//! - A `tokio::mpsc` channel carries `AppMessage` events in from background
//!   tasks: terminal input, player updates, catalog results, remote commands
//!   and presence counts.
//! - The event loop draws when something changed, then awaits the next
//!   message or timer.  A 16 ms frame timer drives the settle spring and the
//!   wheel debounce.
//! - Components return `Vec<Action>`; App dispatches each Action.  Playback
//!   requests flow out to the player core as `PlayerEvent`s.

use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ratatui::crossterm::{
    event::{
        self, DisableFocusChange, DisableMouseCapture, EnableFocusChange, EnableMouseCapture,
        Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, MouseButton, MouseEvent,
        MouseEventKind,
    },
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    Terminal,
};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use swipe_proto::catalog;
use swipe_proto::config::Config;
use swipe_proto::gesture::{DragStart, GestureTracker, PointerTarget, Snap, ViewportClass};
use swipe_proto::navigation::Navigator;
use swipe_proto::presence::{PresenceRoom, SessionId};
use swipe_proto::protocol::{RemoteCommand, Station};
use swipe_proto::wheel::WheelAccumulator;

use crate::action::Action;
use crate::app_state::{AppState, CatalogState};
use crate::component::{hit, Component};
use crate::components::{
    carousel_view::CarouselView,
    header::Header,
    overlay::{Overlay, OverlayKind},
    station_grid::StationGrid,
};
use crate::core::{PlayerEvent, PlayerUpdate, SharedSnapshot};
use crate::video::VideoCommand;
use crate::widgets::toast::ToastManager;

const FRAME_INTERVAL: Duration = Duration::from_millis(16);
/// Longest step fed to the spring after a stalled frame.
const MAX_FRAME_DT: f32 = 0.05;
const VOLUME_STEP: f32 = 0.05;

#[derive(Debug)]
enum AppMessage {
    Event(Event),
    Player(PlayerUpdate),
    Catalog(Result<Vec<Station>, String>),
    Remote(RemoteCommand),
    Listeners(usize),
}

#[derive(Debug, Clone, Copy, Default)]
struct Areas {
    header: Rect,
    body: Rect,
}

pub struct App {
    config: Config,
    state: AppState,

    header: Header,
    carousel: CarouselView,
    grid: StationGrid,
    overlay: Overlay,
    toast: ToastManager,

    tracker: GestureTracker,
    wheel: WheelAccumulator,
    /// Discrete navigation held back until the drag or settle finishes.
    deferred_nav: Option<Action>,
    last_frame: Instant,
    areas: Areas,

    player_tx: mpsc::Sender<PlayerEvent>,
    video_tx: Option<mpsc::Sender<VideoCommand>>,
    snapshot: SharedSnapshot,
    presence: Arc<PresenceRoom>,
    session: Option<SessionId>,
    catalog_retry: bool,
    /// Our own sender, for work spawned from `dispatch` (catalog retries).
    tx: Option<mpsc::Sender<AppMessage>>,
    should_quit: bool,
}

impl App {
    pub fn new(
        config: Config,
        player_tx: mpsc::Sender<PlayerEvent>,
        snapshot: SharedSnapshot,
        presence: Arc<PresenceRoom>,
        video_tx: Option<mpsc::Sender<VideoCommand>>,
    ) -> Self {
        let state = AppState::new(config.ui.clone(), config.audio.default_volume);
        let tracker = GestureTracker::new(config.gesture, config.spring);
        Self {
            config,
            state,
            header: Header::new(),
            carousel: CarouselView::new(),
            grid: StationGrid::new(),
            overlay: Overlay::new(),
            toast: ToastManager::new(),
            tracker,
            wheel: WheelAccumulator::default(),
            deferred_nav: None,
            last_frame: Instant::now(),
            areas: Areas::default(),
            player_tx,
            video_tx,
            snapshot,
            presence,
            session: None,
            catalog_retry: false,
            tx: None,
            should_quit: false,
        }
    }

    pub async fn run(
        mut self,
        mut update_rx: broadcast::Receiver<PlayerUpdate>,
        mut remote_rx: mpsc::Receiver<RemoteCommand>,
    ) -> anyhow::Result<()> {
        debug!("run(): enabling raw mode");
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(
            stdout,
            EnterAlternateScreen,
            EnableMouseCapture,
            EnableFocusChange
        )?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;
        let size = terminal.size()?;
        debug!("run(): terminal created, size={:?}", size);
        self.set_viewport(size.width);

        let (tx, mut rx) = mpsc::channel::<AppMessage>(1024);
        self.tx = Some(tx.clone());

        // ── Background task: keyboard/mouse/focus events ──────────────────────
        let event_tx = tx.clone();
        tokio::task::spawn_blocking(move || loop {
            match event::read() {
                Ok(ev) => {
                    if event_tx.blocking_send(AppMessage::Event(ev)).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        });

        // ── Background task: player updates (PlayerCore → AppMessage) ─────────
        let bc_tx = tx.clone();
        tokio::spawn(async move {
            loop {
                match update_rx.recv().await {
                    Ok(update) => {
                        if bc_tx.send(AppMessage::Player(update)).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("player update receiver lagged by {} messages", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        // ── Background task: HTTP remote commands ─────────────────────────────
        let remote_tx = tx.clone();
        tokio::spawn(async move {
            while let Some(cmd) = remote_rx.recv().await {
                if remote_tx.send(AppMessage::Remote(cmd)).await.is_err() {
                    break;
                }
            }
        });

        // ── Background task: listener count ───────────────────────────────────
        let mut count_rx = self.presence.subscribe();
        let count_tx = tx.clone();
        tokio::spawn(async move {
            while count_rx.changed().await.is_ok() {
                let n = *count_rx.borrow_and_update();
                if count_tx.send(AppMessage::Listeners(n)).await.is_err() {
                    break;
                }
            }
        });

        self.spawn_catalog_load();

        // ── Periodic timers ───────────────────────────────────────────────────
        let mut frame_tick = tokio::time::interval(FRAME_INTERVAL);
        frame_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        // Toast expiry + banner spinner.
        let mut ui_tick = tokio::time::interval(Duration::from_millis(100));
        ui_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        // ── Main loop ─────────────────────────────────────────────────────────
        let mut needs_redraw = true;
        loop {
            if needs_redraw {
                terminal.draw(|f| self.draw(f))?;
            }
            needs_redraw = false;

            if self.should_quit {
                break;
            }

            tokio::select! {
                Some(msg) = rx.recv() => {
                    const MAX_DRAIN: usize = 256;
                    self.handle_message(msg).await;
                    let mut drained = 0usize;
                    while drained < MAX_DRAIN {
                        let Ok(next) = rx.try_recv() else {
                            break;
                        };
                        drained += 1;
                        self.handle_message(next).await;
                    }
                    needs_redraw = true;
                }

                _ = frame_tick.tick() => {
                    needs_redraw = self.on_frame(Instant::now()).await;
                }

                _ = ui_tick.tick() => {
                    if !self.toast.is_empty() {
                        self.toast.tick();
                        needs_redraw = true;
                    }
                }
            }
        }

        // ── Teardown ──────────────────────────────────────────────────────────
        self.shutdown().await;
        disable_raw_mode()?;
        execute!(
            terminal.backend_mut(),
            LeaveAlternateScreen,
            DisableMouseCapture,
            DisableFocusChange
        )?;
        terminal.show_cursor()?;

        Ok(())
    }

    async fn shutdown(&mut self) {
        info!("App: shutting down");
        if let Some(id) = self.session.take() {
            self.presence.leave(&id);
        }
        let _ = self.player_tx.send(PlayerEvent::Shutdown).await;
        if let Some(ref video) = self.video_tx {
            let _ = video.send(VideoCommand::Shutdown).await;
        }
    }

    fn spawn_catalog_load(&mut self) {
        let Some(tx) = self.tx.clone() else {
            return;
        };
        self.state.catalog = CatalogState::Loading;
        let catalog_config = self.config.catalog.clone();
        tokio::spawn(async move {
            let result = catalog::load_catalog(&catalog_config)
                .await
                .map_err(|e| e.to_string());
            let _ = tx.send(AppMessage::Catalog(result)).await;
        });
    }

    fn set_viewport(&mut self, width: u16) {
        let class = if width < self.state.ui.narrow_breakpoint_cols {
            ViewportClass::Narrow
        } else {
            ViewportClass::Desktop
        };
        if class != self.state.viewport {
            info!("App: viewport {:?} → {:?} ({} cols)", self.state.viewport, class, width);
        }
        self.state.viewport = class;
        self.tracker.set_viewport_class(class);
        self.state.drag_offset = self.tracker.offset();
    }

    // ── Frame timer ───────────────────────────────────────────────────────────

    /// Advance the settle spring and resolve wheel bursts.  Returns whether
    /// anything visible changed.
    async fn on_frame(&mut self, now: Instant) -> bool {
        let dt = now
            .saturating_duration_since(self.last_frame)
            .as_secs_f32()
            .min(MAX_FRAME_DT);
        self.last_frame = now;

        let mut changed = false;
        if self.tracker.is_animating() {
            if let Some(snap) = self.tracker.tick(dt) {
                // The gesture navigated; a held-back request is stale now.
                self.deferred_nav = None;
                self.apply_snap(snap).await;
            }
            self.state.drag_offset = self.tracker.offset();
            changed = true;
        }
        if !self.gesture_busy() {
            if let Some(action) = self.deferred_nav.take() {
                debug!("App: replaying deferred {:?}", action);
                self.dispatch(action).await;
                changed = true;
            }
        }
        if let Some(snap) = self.wheel.poll(now) {
            debug!("App: wheel decided {:?}", snap);
            self.apply_snap(snap).await;
            changed = true;
        }
        changed
    }

    fn gesture_busy(&self) -> bool {
        self.tracker.is_dragging() || self.tracker.is_animating()
    }

    async fn apply_snap(&mut self, snap: Snap) {
        match snap {
            Snap::Next => self.dispatch(Action::Next).await,
            Snap::Previous => self.dispatch(Action::Prev).await,
            Snap::Current => {}
        }
    }

    // ── Message handler ───────────────────────────────────────────────────────

    async fn handle_message(&mut self, msg: AppMessage) {
        match msg {
            AppMessage::Event(ev) => match ev {
                Event::Key(key) => {
                    if key.kind == KeyEventKind::Release {
                        return;
                    }
                    for a in self.handle_key(key) {
                        self.dispatch(a).await;
                    }
                }
                Event::Mouse(mouse) => {
                    for a in self.handle_mouse(mouse, Instant::now()) {
                        self.dispatch(a).await;
                    }
                }
                Event::Resize(w, _) => self.set_viewport(w),
                Event::FocusLost => self.on_visibility(false).await,
                Event::FocusGained => self.on_visibility(true).await,
                _ => {}
            },
            AppMessage::Player(update) => self.on_player_update(update).await,
            AppMessage::Catalog(Ok(stations)) => {
                info!("App: catalog loaded with {} stations", stations.len());
                if std::mem::take(&mut self.catalog_retry) {
                    self.toast.success(format!("Loaded {} stations", stations.len()));
                }
                self.state.nav = Navigator::with_random_start(stations, &mut rand::thread_rng());
                self.state.catalog = CatalogState::Ready;
                self.publish_station().await;
            }
            AppMessage::Catalog(Err(msg)) => {
                warn!("App: catalog failed: {}", msg);
                self.state.catalog = CatalogState::Failed(msg);
            }
            AppMessage::Remote(cmd) => {
                info!("App: remote {:?}", cmd);
                let action = match cmd {
                    RemoteCommand::Next => Action::Next,
                    RemoteCommand::Prev => Action::Prev,
                    RemoteCommand::GoTo { index } => Action::GoTo(index),
                    RemoteCommand::ToggleMute => Action::ToggleMute,
                    RemoteCommand::TogglePause => Action::TogglePause,
                };
                self.dispatch(action).await;
            }
            AppMessage::Listeners(n) => self.state.listeners = n,
        }
    }

    async fn on_player_update(&mut self, update: PlayerUpdate) {
        match update {
            PlayerUpdate::Status(status) => {
                self.state.status = status;
                self.toast.set_banner(status.banner());
            }
            PlayerUpdate::Muted(muted) => {
                self.state.muted = muted;
                self.toast.info(if muted { "Muted" } else { "Unmuted" });
            }
            PlayerUpdate::Volume(volume) => self.state.volume = volume,
            PlayerUpdate::Tuned(id) => {
                self.state.last_error = None;
                let is_current =
                    self.state.current_station().map(|s| s.id.as_str()) == Some(id.as_str());
                if is_current {
                    if let Some(next) = self.state.nav.peek_next().cloned() {
                        let _ = self.player_tx.send(PlayerEvent::Preload(next)).await;
                    }
                }
            }
            PlayerUpdate::Failed(msg) => {
                self.toast.error(format!("{}. Skipping to next station...", msg));
                self.state.last_error = Some(msg);
            }
            PlayerUpdate::SkipRequested => self.dispatch(Action::Next).await,
        }
    }

    async fn on_visibility(&mut self, visible: bool) {
        debug!("App: terminal focus {}", visible);
        if !visible && self.tracker.is_dragging() {
            // Treat losing focus mid-drag as a release.
            self.release_drag().await;
        }
        if self.state.started {
            if let Some(ref video) = self.video_tx {
                let _ = video.send(VideoCommand::Visible(visible)).await;
            }
        }
    }

    // ── Input ─────────────────────────────────────────────────────────────────

    fn handle_key(&mut self, key: KeyEvent) -> Vec<Action> {
        let gated = Overlay::kind(&self.state).is_some();
        key_action(key, &self.state, gated).into_iter().collect()
    }

    fn handle_mouse(&mut self, event: MouseEvent, now: Instant) -> Vec<Action> {
        let Areas { header, body } = self.areas;
        let (col, row) = (event.column, event.row);

        // Blocking popups take every click.
        if let Some(kind) = Overlay::kind(&self.state) {
            let on_popup = hit(Overlay::popup_rect(body), col, row);
            if on_popup || kind != OverlayKind::StartGate {
                return self.overlay.handle_mouse(event, body, &self.state);
            }
        }

        match event.kind {
            MouseEventKind::Down(MouseButton::Left) => {
                let target = if hit(header, col, row) {
                    if Header::is_control(header, col, row) {
                        PointerTarget::Control
                    } else {
                        PointerTarget::OptOut
                    }
                } else if self.state.show_grid() {
                    PointerTarget::OptOut
                } else {
                    PointerTarget::Surface
                };
                let y = self.row_px(row);
                match self.tracker.pointer_down(y, now, target) {
                    DragStart::Started => {
                        self.state.drag_offset = 0.0;
                        vec![]
                    }
                    DragStart::Ignored(reason) => {
                        debug!("App: drag not started: {:?}", reason);
                        if hit(header, col, row) {
                            self.header.handle_mouse(event, header, &self.state)
                        } else if self.state.show_grid() {
                            self.grid.handle_mouse(event, body, &self.state)
                        } else {
                            vec![]
                        }
                    }
                }
            }
            MouseEventKind::Drag(MouseButton::Left) => {
                if self.tracker.is_dragging() {
                    let y = self.row_px(row);
                    self.tracker.pointer_move(y, now, self.state.nav.bounds());
                    self.state.drag_offset = self.tracker.offset();
                }
                vec![]
            }
            MouseEventKind::Up(MouseButton::Left) => {
                if self.tracker.is_dragging() {
                    let viewport = self.state.rows_to_px(body.height as f32);
                    let snap = self.tracker.pointer_up(viewport, self.state.nav.bounds());
                    debug!("App: drag released → {:?}", snap);
                    self.state.drag_offset = self.tracker.offset();
                }
                vec![]
            }
            MouseEventKind::ScrollDown | MouseEventKind::ScrollUp => {
                if self.state.show_grid() {
                    return self.grid.handle_mouse(event, body, &self.state);
                }
                if !hit(body, col, row) || !self.state.is_ready() {
                    return vec![];
                }
                let notch = self.state.ui.wheel_notch_px;
                let delta = if event.kind == MouseEventKind::ScrollDown {
                    notch
                } else {
                    -notch
                };
                self.wheel.push(delta, now);
                vec![]
            }
            _ => vec![],
        }
    }

    async fn release_drag(&mut self) {
        let viewport = self.state.rows_to_px(self.areas.body.height as f32);
        self.tracker.pointer_up(viewport, self.state.nav.bounds());
        self.state.drag_offset = self.tracker.offset();
    }

    /// Pointer row in carousel pixels, relative to the body's top edge.
    fn row_px(&self, row: u16) -> f32 {
        self.state
            .rows_to_px(row.saturating_sub(self.areas.body.y) as f32)
    }

    // ── Dispatch ──────────────────────────────────────────────────────────────

    async fn dispatch(&mut self, action: Action) {
        debug!("App: dispatch {:?}", action);
        if matches!(action, Action::Next | Action::Prev | Action::GoTo(_)) && self.gesture_busy() {
            // Navigating now would move the index under the live offset.
            debug!("App: {:?} deferred until the gesture settles", action);
            self.deferred_nav = Some(action);
            return;
        }
        match action {
            Action::Next => {
                if self.state.is_ready() && self.state.nav.next().is_some() {
                    self.on_station_changed().await;
                }
            }
            Action::Prev => {
                if self.state.is_ready() && self.state.nav.previous().is_some() {
                    self.on_station_changed().await;
                }
            }
            Action::GoTo(idx) => {
                if !self.state.is_ready() {
                    return;
                }
                match self.state.nav.go_to(idx) {
                    Ok(_) => self.on_station_changed().await,
                    Err(e) => {
                        warn!("App: {}", e);
                        self.toast.warning(e.to_string());
                    }
                }
            }
            Action::Start => {
                if !self.state.is_ready() || self.state.started {
                    return;
                }
                let Some(station) = self.state.current_station().cloned() else {
                    return;
                };
                info!("App: start gesture on {}", station.name);
                self.state.started = true;
                self.session = Some(self.presence.join());
                self.show_video(&station).await;
                let _ = self.player_tx.send(PlayerEvent::Start(station)).await;
            }
            Action::ToggleMute => {
                let _ = self.player_tx.send(PlayerEvent::ToggleMute).await;
            }
            Action::TogglePause => {
                if self.state.started {
                    let _ = self.player_tx.send(PlayerEvent::TogglePause).await;
                }
            }
            Action::Volume(delta) => {
                let v = (self.state.volume + delta).clamp(0.0, 1.0);
                let _ = self.player_tx.send(PlayerEvent::SetVolume(v)).await;
            }
            Action::ToggleGrid => {
                self.state.grid_forced = !self.state.grid_forced;
            }
            Action::RetryCatalog => {
                if matches!(self.state.catalog, CatalogState::Failed(_)) {
                    info!("App: retrying catalog load");
                    self.catalog_retry = true;
                    self.spawn_catalog_load();
                }
            }
            Action::Quit => self.should_quit = true,
        }
    }

    async fn on_station_changed(&mut self) {
        self.publish_station().await;
        let Some(station) = self.state.current_station().cloned() else {
            return;
        };
        if !self.state.started {
            return;
        }
        self.show_video(&station).await;
        let _ = self.player_tx.send(PlayerEvent::Tune(station)).await;
    }

    async fn show_video(&self, station: &Station) {
        if let Some(ref video) = self.video_tx {
            let _ = video.send(VideoCommand::Show(station.video.clone())).await;
        }
    }

    async fn publish_station(&self) {
        let mut snap = self.snapshot.write().await;
        snap.station_count = self.state.nav.len();
        snap.current_index = self.state.current_index();
        snap.current_station = self.state.current_station().map(|s| s.name.clone());
    }

    // ── Draw ──────────────────────────────────────────────────────────────────

    fn draw(&mut self, frame: &mut ratatui::Frame) {
        let area = frame.area();
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(1), Constraint::Min(0)])
            .split(area);
        self.areas = Areas {
            header: chunks[0],
            body: chunks[1],
        };

        self.header.draw(frame, chunks[0], &self.state);
        if self.state.is_ready() {
            if self.state.show_grid() {
                self.grid.draw(frame, chunks[1], &self.state);
            } else {
                self.carousel.draw(frame, chunks[1], &self.state);
            }
        }
        self.overlay.draw(frame, chunks[1], &self.state);
        self.toast.draw(frame, chunks[1]);
    }
}

/// Map a key press to an action.  While a blocking popup is up only its own
/// keys (Enter / r) and quit are live.
fn key_action(key: KeyEvent, state: &AppState, gated: bool) -> Option<Action> {
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        return Some(Action::Quit);
    }
    match key.code {
        KeyCode::Char('q') | KeyCode::Esc => Some(Action::Quit),
        KeyCode::Enter => (!state.started).then_some(Action::Start),
        KeyCode::Char('r') => {
            matches!(state.catalog, CatalogState::Failed(_)).then_some(Action::RetryCatalog)
        }
        _ if gated && !state.is_ready() => None,
        KeyCode::Up => Some(Action::Prev),
        KeyCode::Down => Some(Action::Next),
        // Reserved; consumed so it never scrolls anything.
        KeyCode::Char(' ') => None,
        KeyCode::Char('m') => Some(Action::ToggleMute),
        KeyCode::Char('p') => Some(Action::TogglePause),
        KeyCode::Char('+') | KeyCode::Char('=') => Some(Action::Volume(VOLUME_STEP)),
        KeyCode::Char('-') => Some(Action::Volume(-VOLUME_STEP)),
        KeyCode::Char('g') => Some(Action::ToggleGrid),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::crossterm::event::KeyEventState;
    use swipe_proto::config::Config;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent {
            code,
            modifiers: KeyModifiers::NONE,
            kind: KeyEventKind::Press,
            state: KeyEventState::NONE,
        }
    }

    fn mouse(kind: MouseEventKind, column: u16, row: u16) -> MouseEvent {
        MouseEvent {
            kind,
            column,
            row,
            modifiers: KeyModifiers::NONE,
        }
    }

    fn stations(n: usize) -> Vec<Station> {
        (0..n)
            .map(|i| Station {
                id: format!("s{}", i),
                name: format!("Station {}", i),
                stream_url: format!("http://example.org/{}", i),
                display_order: i as i64,
                active: true,
                ..Station::default()
            })
            .collect()
    }

    struct Harness {
        app: App,
        player_rx: mpsc::Receiver<PlayerEvent>,
    }

    async fn ready_app(n: usize) -> Harness {
        let (player_tx, player_rx) = mpsc::channel(32);
        let mut app = App::new(
            Config::default(),
            player_tx,
            SharedSnapshot::default(),
            Arc::new(PresenceRoom::new()),
            None,
        );
        app.areas = Areas {
            header: Rect::new(0, 0, 100, 1),
            body: Rect::new(0, 1, 100, 50),
        };
        app.handle_message(AppMessage::Catalog(Ok(stations(n)))).await;
        Harness { app, player_rx }
    }

    #[test]
    fn test_key_map() {
        let mut state = AppState::new(Default::default(), 0.8);
        assert_eq!(key_action(key(KeyCode::Char('q')), &state, true), Some(Action::Quit));
        assert_eq!(key_action(key(KeyCode::Enter), &state, true), Some(Action::Start));
        assert_eq!(key_action(key(KeyCode::Down), &state, true), None);

        state.catalog = CatalogState::Failed("No stations available".into());
        assert_eq!(
            key_action(key(KeyCode::Char('r')), &state, true),
            Some(Action::RetryCatalog)
        );

        state.catalog = CatalogState::Ready;
        state.nav = Navigator::with_start(stations(3), 0);
        state.started = true;
        assert_eq!(key_action(key(KeyCode::Down), &state, false), Some(Action::Next));
        assert_eq!(key_action(key(KeyCode::Up), &state, false), Some(Action::Prev));
        assert_eq!(key_action(key(KeyCode::Char(' ')), &state, false), None);
        assert_eq!(key_action(key(KeyCode::Enter), &state, false), None);
        assert_eq!(
            key_action(key(KeyCode::Char('-')), &state, false),
            Some(Action::Volume(-VOLUME_STEP))
        );
    }

    #[tokio::test]
    async fn test_start_gesture_then_navigation_tunes() {
        let mut h = ready_app(3).await;
        let first = h.app.state.current_index().unwrap();

        // Before the gesture navigation is visual only.
        h.app.dispatch(Action::Next).await;
        assert!(h.player_rx.try_recv().is_err());

        h.app.dispatch(Action::Start).await;
        assert!(matches!(h.player_rx.recv().await, Some(PlayerEvent::Start(_))));
        assert_eq!(h.app.presence.count(), 1);

        h.app.dispatch(Action::Next).await;
        match h.player_rx.recv().await {
            Some(PlayerEvent::Tune(s)) => assert_eq!(s.id, format!("s{}", (first + 2) % 3)),
            other => panic!("expected tune, got {:?}", other),
        }
        let snap = h.app.snapshot.read().await.clone();
        assert_eq!(snap.station_count, 3);
        assert_eq!(snap.current_index, Some((first + 2) % 3));
    }

    #[tokio::test]
    async fn test_tuned_preloads_next_and_skip_advances() {
        let mut h = ready_app(4).await;
        h.app.dispatch(Action::Start).await;
        let _ = h.player_rx.recv().await;

        let current = h.app.state.current_station().unwrap().id.clone();
        let next = h.app.state.nav.peek_next().unwrap().id.clone();
        h.app
            .handle_message(AppMessage::Player(PlayerUpdate::Tuned(current)))
            .await;
        match h.player_rx.recv().await {
            Some(PlayerEvent::Preload(s)) => assert_eq!(s.id, next),
            other => panic!("expected preload, got {:?}", other),
        }

        h.app
            .handle_message(AppMessage::Player(PlayerUpdate::SkipRequested))
            .await;
        match h.player_rx.recv().await {
            Some(PlayerEvent::Tune(s)) => assert_eq!(s.id, next),
            other => panic!("expected tune, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_drag_on_carousel_navigates_after_settle() {
        let mut h = ready_app(5).await;
        h.app.dispatch(Action::Start).await;
        let _ = h.player_rx.recv().await;
        let before = h.app.state.current_index().unwrap();

        let t0 = Instant::now();
        let down = mouse(MouseEventKind::Down(MouseButton::Left), 50, 40);
        assert!(h.app.handle_mouse(down, t0).is_empty());
        assert!(h.app.tracker.is_dragging());
        // 20 rows up at 16 px per row = 320 px over half a second.
        for step in 1..=10u16 {
            let ev = mouse(MouseEventKind::Drag(MouseButton::Left), 50, 40 - 2 * step);
            h.app
                .handle_mouse(ev, t0 + Duration::from_millis(50 * step as u64));
        }
        assert!(h.app.state.drag_offset < 0.0);
        let up = mouse(MouseEventKind::Up(MouseButton::Left), 50, 20);
        h.app.handle_mouse(up, t0 + Duration::from_millis(520));
        assert!(h.app.tracker.is_animating());

        let mut now = t0 + Duration::from_millis(520);
        h.app.last_frame = now;
        for _ in 0..1_000 {
            now += FRAME_INTERVAL;
            h.app.on_frame(now).await;
            if !h.app.tracker.is_animating() {
                break;
            }
        }
        assert_eq!(h.app.state.current_index(), Some((before + 1) % 5));
        assert_eq!(h.app.state.drag_offset, 0.0);
        assert!(matches!(h.player_rx.recv().await, Some(PlayerEvent::Tune(_))));
    }

    #[tokio::test]
    async fn test_header_controls_do_not_start_drag() {
        let mut h = ready_app(3).await;
        h.app.dispatch(Action::Start).await;
        let _ = h.player_rx.recv().await;

        let (mute, _) = Header::control_rects(h.app.areas.header);
        let down = mouse(MouseEventKind::Down(MouseButton::Left), mute.x + 1, 0);
        let actions = h.app.handle_mouse(down, Instant::now());
        assert_eq!(actions, vec![Action::ToggleMute]);
        assert!(!h.app.tracker.is_dragging());
    }

    #[tokio::test]
    async fn test_narrow_viewport_uses_grid() {
        let mut h = ready_app(6).await;
        h.app.dispatch(Action::Start).await;
        let _ = h.player_rx.recv().await;

        h.app.set_viewport(40);
        assert!(h.app.state.show_grid());
        assert!(!h.app.tracker.is_enabled());

        // Grid cell for station 3: second row, right column.
        let down = mouse(MouseEventKind::Down(MouseButton::Left), 70, 4);
        let actions = h.app.handle_mouse(down, Instant::now());
        assert_eq!(actions, vec![Action::GoTo(3)]);
        assert!(!h.app.tracker.is_dragging());
    }

    #[tokio::test]
    async fn test_wheel_burst_resolves_on_frame() {
        let mut h = ready_app(5).await;
        let before = h.app.state.current_index().unwrap();
        let t0 = Instant::now();
        for i in 0..3u64 {
            let ev = mouse(MouseEventKind::ScrollDown, 50, 20);
            h.app.handle_mouse(ev, t0 + Duration::from_millis(30 * i));
        }
        h.app.last_frame = t0;
        h.app.on_frame(t0 + Duration::from_millis(100)).await;
        assert_eq!(h.app.state.current_index(), Some(before));
        h.app.on_frame(t0 + Duration::from_millis(400)).await;
        assert_eq!(h.app.state.current_index(), Some((before + 1) % 5));
    }

    async fn settle(h: &mut Harness, mut now: Instant) -> Instant {
        h.app.last_frame = now;
        for _ in 0..1_000 {
            now += FRAME_INTERVAL;
            h.app.on_frame(now).await;
            if !h.app.tracker.is_animating() {
                break;
            }
        }
        now += FRAME_INTERVAL;
        h.app.on_frame(now).await;
        now
    }

    #[tokio::test]
    async fn test_key_during_slide_out_does_not_navigate_twice() {
        let mut h = ready_app(5).await;
        h.app.dispatch(Action::Start).await;
        let _ = h.player_rx.recv().await;
        let before = h.app.state.current_index().unwrap();

        let t0 = Instant::now();
        h.app
            .handle_mouse(mouse(MouseEventKind::Down(MouseButton::Left), 50, 40), t0);
        for step in 1..=10u16 {
            let ev = mouse(MouseEventKind::Drag(MouseButton::Left), 50, 40 - 2 * step);
            h.app
                .handle_mouse(ev, t0 + Duration::from_millis(50 * step as u64));
        }
        let up = mouse(MouseEventKind::Up(MouseButton::Left), 50, 20);
        h.app.handle_mouse(up, t0 + Duration::from_millis(520));
        assert!(h.app.tracker.is_animating());

        h.app.dispatch(Action::Next).await;
        assert_eq!(h.app.state.current_index(), Some(before));
        assert!(h.player_rx.try_recv().is_err());

        settle(&mut h, t0 + Duration::from_millis(520)).await;
        assert_eq!(h.app.state.current_index(), Some((before + 1) % 5));
        assert!(matches!(h.player_rx.recv().await, Some(PlayerEvent::Tune(_))));
        assert!(h.player_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_remote_next_waits_for_snap_back() {
        let mut h = ready_app(5).await;
        h.app.dispatch(Action::Start).await;
        let _ = h.player_rx.recv().await;
        let before = h.app.state.current_index().unwrap();

        // Two rows down, slowly: under both thresholds, so it springs back.
        let t0 = Instant::now();
        h.app
            .handle_mouse(mouse(MouseEventKind::Down(MouseButton::Left), 50, 20), t0);
        h.app.handle_mouse(
            mouse(MouseEventKind::Drag(MouseButton::Left), 50, 21),
            t0 + Duration::from_millis(500),
        );
        h.app.handle_mouse(
            mouse(MouseEventKind::Drag(MouseButton::Left), 50, 22),
            t0 + Duration::from_millis(1_000),
        );
        h.app.handle_mouse(
            mouse(MouseEventKind::Up(MouseButton::Left), 50, 22),
            t0 + Duration::from_millis(1_000),
        );
        assert!(h.app.tracker.is_animating());

        h.app
            .handle_message(AppMessage::Remote(RemoteCommand::Next))
            .await;
        assert_eq!(h.app.state.current_index(), Some(before));

        settle(&mut h, t0 + Duration::from_millis(1_000)).await;
        assert_eq!(h.app.state.current_index(), Some((before + 1) % 5));
        assert_eq!(h.app.state.drag_offset, 0.0);
        assert!(matches!(h.player_rx.recv().await, Some(PlayerEvent::Tune(_))));
    }

    #[tokio::test]
    async fn test_retry_and_mute_toasts() {
        let mut h = ready_app(3).await;
        h.app
            .handle_message(AppMessage::Player(PlayerUpdate::Muted(true)))
            .await;
        assert!(h.app.state.muted);
        assert!(!h.app.toast.is_empty());

        h.app.state.catalog = CatalogState::Failed("No stations available".into());
        h.app.catalog_retry = true;
        h.app.handle_message(AppMessage::Catalog(Ok(stations(2)))).await;
        assert!(h.app.state.is_ready());
        assert!(!h.app.catalog_retry);
    }
}

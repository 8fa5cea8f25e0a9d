/// PlayerCore — single-owner event loop around the crossfade engine.
///
/// The app sends `PlayerEvent`s; nothing else touches the engine's playback
/// calls.  Slow engine calls (play, crossfade) run in spawned tasks bounded by
/// the stall timeout and report back as `PlayerEvent::Settled`, so the loop
/// keeps serving mute/volume while a stream is still connecting.
///
/// Every tune request bumps a sequence number.  A settle whose sequence is
/// stale never touches the status; once the last outstanding task settles, the
/// core re-tunes to the latest request if that is not what is audible.
use std::sync::Arc;

use swipe_proto::audio::{AudioGraph, CrossfadeEngine, CrossfadeOutcome};
use swipe_proto::config::AudioConfig;
use swipe_proto::error::AudioError;
use swipe_proto::protocol::{PlaybackStatus, PlayerSnapshot, Station};
use tokio::sync::{broadcast, mpsc, RwLock};
use tracing::{debug, info, warn};

/// Snapshot shared with the HTTP API.
pub type SharedSnapshot = Arc<RwLock<PlayerSnapshot>>;

// ── PlayerEvent ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    /// Cold start on the active channel (first gesture, or nothing audible).
    Start,
    /// Switch through the standby channel.
    Switch,
    /// Direct play after a failed switch.
    Fallback,
}

/// All inputs into the PlayerCore loop.
#[derive(Debug)]
pub enum PlayerEvent {
    /// First user gesture: build the audio graph and play.
    Start(Station),
    /// The current station changed.
    Tune(Station),
    /// Buffer a station on the standby channel.
    Preload(Station),
    TogglePause,
    ToggleMute,
    SetVolume(f32),
    /// A spawned playback task finished.
    Settled {
        seq: u64,
        station: Station,
        attempt: Attempt,
        result: Result<CrossfadeOutcome, AudioError>,
    },
    /// The grace delay after a failure elapsed.
    AutoSkipDue(u64),
    Shutdown,
}

/// Broadcast to the app after state changes.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerUpdate {
    Status(PlaybackStatus),
    Muted(bool),
    Volume(f32),
    /// This station id is now audible.
    Tuned(String),
    /// User-facing failure message.
    Failed(String),
    /// Advance to the next station.
    SkipRequested,
}

// ── PlayerCore ────────────────────────────────────────────────────────────────

pub struct PlayerCore<G: AudioGraph + 'static> {
    engine: Arc<CrossfadeEngine<G>>,
    audio: AudioConfig,
    /// Our own sender, cloned into spawned tasks.
    event_tx: mpsc::Sender<PlayerEvent>,
    update_tx: broadcast::Sender<PlayerUpdate>,
    snapshot: SharedSnapshot,
    seq: u64,
    /// Latest requested station.
    latest: Option<Station>,
    /// Id of the station actually playing.
    audible: Option<String>,
    /// Spawned playback tasks not yet settled.
    outstanding: usize,
    started: bool,
    status: PlaybackStatus,
}

impl<G: AudioGraph + 'static> PlayerCore<G> {
    pub fn new(
        graph: G,
        audio: AudioConfig,
        event_tx: mpsc::Sender<PlayerEvent>,
        update_tx: broadcast::Sender<PlayerUpdate>,
        snapshot: SharedSnapshot,
    ) -> Self {
        let engine = Arc::new(CrossfadeEngine::new(graph, audio.default_volume));
        Self {
            engine,
            audio,
            event_tx,
            update_tx,
            snapshot,
            seq: 0,
            latest: None,
            audible: None,
            outstanding: 0,
            started: false,
            status: PlaybackStatus::Idle,
        }
    }

    /// Run until `Shutdown` or until every sender is gone.
    pub async fn run(mut self, mut event_rx: mpsc::Receiver<PlayerEvent>) -> anyhow::Result<()> {
        info!("PlayerCore: starting event loop");
        {
            let mut snap = self.snapshot.write().await;
            snap.volume = self.engine.volume();
            snap.muted = self.engine.is_muted();
        }

        while let Some(event) = event_rx.recv().await {
            match event {
                PlayerEvent::Start(station) => self.on_start(station).await,
                PlayerEvent::Tune(station) => self.on_tune(station).await,
                PlayerEvent::Preload(station) => self.on_preload(station),
                PlayerEvent::TogglePause => self.on_toggle_pause().await,
                PlayerEvent::ToggleMute => self.on_toggle_mute().await,
                PlayerEvent::SetVolume(v) => self.on_set_volume(v).await,
                PlayerEvent::Settled {
                    seq,
                    station,
                    attempt,
                    result,
                } => self.on_settled(seq, station, attempt, result).await,
                PlayerEvent::AutoSkipDue(seq) => {
                    if seq == self.seq && self.status == PlaybackStatus::Error {
                        info!("PlayerCore: auto-skipping after failure");
                        let _ = self.update_tx.send(PlayerUpdate::SkipRequested);
                    } else {
                        debug!("PlayerCore: stale auto-skip seq={} (now {})", seq, self.seq);
                    }
                }
                PlayerEvent::Shutdown => break,
            }
        }

        info!("PlayerCore: shutting down");
        if let Err(e) = self.engine.destroy().await {
            warn!("PlayerCore: destroy failed: {}", e);
        }
        Ok(())
    }

    // ── event handlers ────────────────────────────────────────────────────────

    async fn on_start(&mut self, station: Station) {
        if self.started {
            debug!("PlayerCore: already started, treating as tune");
            self.on_tune(station).await;
            return;
        }
        info!("PlayerCore: start with {}", station.name);
        self.started = true;
        self.seq += 1;
        self.latest = Some(station.clone());
        self.spawn_start(station).await;
    }

    async fn on_tune(&mut self, station: Station) {
        if !self.started {
            debug!("PlayerCore: tune to {} before start ignored", station.name);
            return;
        }
        self.seq += 1;
        self.latest = Some(station.clone());
        self.begin(station).await;
    }

    fn on_preload(&self, station: Station) {
        if !self.started || !station.is_playable() {
            return;
        }
        let engine = self.engine.clone();
        tokio::spawn(async move {
            if let Err(e) = engine.preload(&station.stream_url).await {
                warn!("PlayerCore: preload of {} failed: {}", station.name, e);
            }
        });
    }

    async fn on_toggle_pause(&mut self) {
        match self.status {
            PlaybackStatus::Playing => match self.engine.pause().await {
                Ok(()) => self.set_status(PlaybackStatus::Paused).await,
                Err(e) => warn!("PlayerCore: pause failed: {}", e),
            },
            PlaybackStatus::Paused => {
                let stall = self.audio.stall_timeout();
                match tokio::time::timeout(stall, self.engine.resume()).await {
                    Ok(Ok(())) => self.set_status(PlaybackStatus::Playing).await,
                    Ok(Err(e)) => warn!("PlayerCore: resume failed: {}", e),
                    Err(_) => warn!("PlayerCore: resume stalled"),
                }
            }
            other => debug!("PlayerCore: pause toggle ignored in {:?}", other),
        }
    }

    async fn on_toggle_mute(&mut self) {
        match self.engine.toggle_mute().await {
            Ok(muted) => {
                info!("PlayerCore: muted={}", muted);
                self.snapshot.write().await.muted = muted;
                let _ = self.update_tx.send(PlayerUpdate::Muted(muted));
            }
            Err(e) => warn!("PlayerCore: mute toggle failed: {}", e),
        }
    }

    async fn on_set_volume(&mut self, v: f32) {
        match self.engine.set_volume(v).await {
            Ok(applied) => {
                debug!("PlayerCore: volume {:.2}", applied);
                self.snapshot.write().await.volume = applied;
                let _ = self.update_tx.send(PlayerUpdate::Volume(applied));
            }
            Err(e) => warn!("PlayerCore: set volume failed: {}", e),
        }
    }

    async fn on_settled(
        &mut self,
        seq: u64,
        station: Station,
        attempt: Attempt,
        result: Result<CrossfadeOutcome, AudioError>,
    ) {
        self.outstanding = self.outstanding.saturating_sub(1);
        let current = seq == self.seq;
        // A dropped request is served by whichever switch held the engine.
        let superseded = !current || matches!(result, Ok(CrossfadeOutcome::Dropped));
        if result.is_err() {
            // A failed switch has already silenced the outgoing channel.
            self.audible = None;
        }

        match result {
            Ok(CrossfadeOutcome::Switched) => {
                info!("PlayerCore: now playing {} ({:?})", station.name, attempt);
                self.audible = Some(station.id.clone());
                if current {
                    self.snapshot.write().await.error = None;
                    self.set_status(PlaybackStatus::Playing).await;
                    let _ = self.update_tx.send(PlayerUpdate::Tuned(station.id.clone()));
                }
            }
            Ok(CrossfadeOutcome::Dropped) => {
                debug!("PlayerCore: switch to {} dropped", station.name);
            }
            Err(AudioError::Crossfade(msg)) if attempt == Attempt::Switch && current => {
                warn!(
                    "PlayerCore: switch to {} failed ({}), retrying direct play",
                    station.name, msg
                );
                self.spawn_play(station, Attempt::Fallback);
                return;
            }
            Err(e) => {
                if current {
                    self.fail(&station, e).await;
                } else {
                    debug!("PlayerCore: stale failure for {}: {}", station.name, e);
                }
            }
        }

        if superseded {
            self.reconcile().await;
        }
    }

    // ── helpers ───────────────────────────────────────────────────────────────

    /// Re-tune to the latest request once nothing is in flight.
    async fn reconcile(&mut self) {
        if self.outstanding > 0 {
            return;
        }
        let Some(latest) = self.latest.clone() else {
            return;
        };
        if self.audible.as_deref() == Some(latest.id.as_str()) {
            if self.status != PlaybackStatus::Playing {
                self.set_status(PlaybackStatus::Playing).await;
                let _ = self.update_tx.send(PlayerUpdate::Tuned(latest.id.clone()));
            }
            return;
        }
        info!("PlayerCore: reconciling to {}", latest.name);
        self.begin(latest).await;
    }

    async fn begin(&mut self, station: Station) {
        if !station.is_playable() {
            let err = AudioError::Playback("no stream url".into());
            self.fail(&station, err).await;
            return;
        }
        if self.audible.is_none() {
            if self.outstanding > 0 {
                debug!("PlayerCore: {} queued behind start", station.name);
                return;
            }
            self.spawn_start(station).await;
        } else {
            self.snapshot.write().await.error = None;
            self.set_status(PlaybackStatus::Crossfading).await;
            self.spawn_switch(station);
        }
    }

    async fn spawn_start(&mut self, station: Station) {
        if !station.is_playable() {
            let err = AudioError::Playback("no stream url".into());
            self.fail(&station, err).await;
            return;
        }
        self.snapshot.write().await.error = None;
        self.set_status(PlaybackStatus::Loading).await;
        self.spawn_play(station, Attempt::Start);
    }

    /// Initialize (no-op once built) and play on the active channel.
    fn spawn_play(&mut self, station: Station, attempt: Attempt) {
        self.outstanding += 1;
        let seq = self.seq;
        let engine = self.engine.clone();
        let tx = self.event_tx.clone();
        let stall = self.audio.stall_timeout();
        tokio::spawn(async move {
            let result = async {
                engine.initialize().await?;
                match tokio::time::timeout(stall, engine.play(&station.stream_url)).await {
                    Ok(r) => r.map(|_| CrossfadeOutcome::Switched),
                    Err(_) => Err(stalled(stall)),
                }
            }
            .await;
            let _ = tx
                .send(PlayerEvent::Settled {
                    seq,
                    station,
                    attempt,
                    result,
                })
                .await;
        });
    }

    fn spawn_switch(&mut self, station: Station) {
        self.outstanding += 1;
        let seq = self.seq;
        let engine = self.engine.clone();
        let tx = self.event_tx.clone();
        let stall = self.audio.stall_timeout();
        tokio::spawn(async move {
            let result =
                match tokio::time::timeout(stall, engine.crossfade_to(&station.stream_url)).await {
                    Ok(r) => r,
                    Err(_) => Err(stalled(stall)),
                };
            let _ = tx
                .send(PlayerEvent::Settled {
                    seq,
                    station,
                    attempt: Attempt::Switch,
                    result,
                })
                .await;
        });
    }

    async fn fail(&mut self, station: &Station, err: AudioError) {
        warn!("PlayerCore: {} unavailable: {}", station.name, err);
        let message = format!("Station unavailable: {}", station.name);
        self.snapshot.write().await.error = Some(message.clone());
        self.set_status(PlaybackStatus::Error).await;
        let _ = self.update_tx.send(PlayerUpdate::Failed(message));

        let seq = self.seq;
        let delay = self.audio.auto_skip_delay();
        let tx = self.event_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(PlayerEvent::AutoSkipDue(seq)).await;
        });
    }

    async fn set_status(&mut self, status: PlaybackStatus) {
        if self.status == status {
            return;
        }
        debug!("PlayerCore: status {:?} → {:?}", self.status, status);
        self.status = status;
        self.snapshot.write().await.status = status;
        let _ = self.update_tx.send(PlayerUpdate::Status(status));
    }
}

fn stalled(after: std::time::Duration) -> AudioError {
    AudioError::Playback(format!("no audio after {}s", after.as_secs()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use swipe_proto::audio::AudioChannel;
    use swipe_proto::error::ChannelError;
    use tokio::sync::Notify;

    #[derive(Default)]
    struct Shared {
        gate: Notify,
        flaky_once: AtomicBool,
        plays: AtomicUsize,
    }

    struct FakeChannel {
        url: Mutex<Option<String>>,
        shared: Arc<Shared>,
    }

    #[async_trait]
    impl AudioChannel for FakeChannel {
        async fn load(&self, url: &str) -> Result<(), ChannelError> {
            *self.url.lock().unwrap() = Some(url.to_string());
            Ok(())
        }

        async fn play(&self) -> Result<(), ChannelError> {
            let url = self.url.lock().unwrap().clone().unwrap_or_default();
            if url.contains("dead") {
                return Err(ChannelError::new("404"));
            }
            if url.contains("stall") {
                std::future::pending::<()>().await;
            }
            if url.contains("gated") {
                self.shared.gate.notified().await;
            }
            if url.contains("flaky") && self.shared.flaky_once.swap(false, Ordering::SeqCst) {
                return Err(ChannelError::new("decoder hiccup"));
            }
            self.shared.plays.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn pause(&self) -> Result<(), ChannelError> {
            Ok(())
        }

        async fn set_gain(&self, _gain: f32) -> Result<(), ChannelError> {
            Ok(())
        }

        async fn set_muted(&self, _muted: bool) -> Result<(), ChannelError> {
            Ok(())
        }

        async fn stop(&self) -> Result<(), ChannelError> {
            Ok(())
        }

        async fn release(&self) -> Result<(), ChannelError> {
            Ok(())
        }
    }

    struct FakeGraph(Arc<Shared>);

    #[async_trait]
    impl AudioGraph for FakeGraph {
        type Channel = FakeChannel;

        async fn build(&self) -> Result<[FakeChannel; 2], ChannelError> {
            let make = || FakeChannel {
                url: Mutex::new(None),
                shared: self.0.clone(),
            };
            Ok([make(), make()])
        }
    }

    struct Harness {
        tx: mpsc::Sender<PlayerEvent>,
        updates: broadcast::Receiver<PlayerUpdate>,
        snapshot: SharedSnapshot,
        shared: Arc<Shared>,
    }

    fn harness() -> Harness {
        let shared = Arc::new(Shared::default());
        let (tx, rx) = mpsc::channel(32);
        let (update_tx, updates) = broadcast::channel(64);
        let snapshot = SharedSnapshot::default();
        let core = PlayerCore::new(
            FakeGraph(shared.clone()),
            AudioConfig::default(),
            tx.clone(),
            update_tx,
            snapshot.clone(),
        );
        tokio::spawn(core.run(rx));
        Harness {
            tx,
            updates,
            snapshot,
            shared,
        }
    }

    fn station(id: &str, url: &str) -> Station {
        Station {
            id: id.into(),
            name: format!("Radio {}", id),
            stream_url: url.into(),
            ..Station::default()
        }
    }

    async fn wait_for(
        rx: &mut broadcast::Receiver<PlayerUpdate>,
        pred: impl Fn(&PlayerUpdate) -> bool,
    ) -> PlayerUpdate {
        loop {
            let update = rx.recv().await.unwrap();
            if pred(&update) {
                return update;
            }
        }
    }

    #[tokio::test]
    async fn test_start_then_tune() {
        let mut h = harness();
        h.tx.send(PlayerEvent::Start(station("a", "http://a")))
            .await
            .unwrap();
        assert_eq!(
            wait_for(&mut h.updates, |u| matches!(u, PlayerUpdate::Tuned(_))).await,
            PlayerUpdate::Tuned("a".into())
        );

        h.tx.send(PlayerEvent::Tune(station("b", "http://b")))
            .await
            .unwrap();
        assert_eq!(
            wait_for(&mut h.updates, |u| matches!(u, PlayerUpdate::Tuned(_))).await,
            PlayerUpdate::Tuned("b".into())
        );
        assert_eq!(h.snapshot.read().await.status, PlaybackStatus::Playing);
    }

    #[tokio::test]
    async fn test_tune_before_start_is_ignored() {
        let mut h = harness();
        h.tx.send(PlayerEvent::Tune(station("a", "http://a")))
            .await
            .unwrap();
        h.tx.send(PlayerEvent::ToggleMute).await.unwrap();
        // Mute works before start and is the first update we see.
        assert_eq!(h.updates.recv().await.unwrap(), PlayerUpdate::Muted(true));
        assert_eq!(h.snapshot.read().await.status, PlaybackStatus::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_start_fails_then_skips() {
        let mut h = harness();
        h.tx.send(PlayerEvent::Start(station("s", "http://stall")))
            .await
            .unwrap();
        let failed = wait_for(&mut h.updates, |u| matches!(u, PlayerUpdate::Failed(_))).await;
        assert_eq!(failed, PlayerUpdate::Failed("Station unavailable: Radio s".into()));
        assert_eq!(h.snapshot.read().await.status, PlaybackStatus::Error);
        assert_eq!(
            wait_for(&mut h.updates, |u| *u == PlayerUpdate::SkipRequested).await,
            PlayerUpdate::SkipRequested
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_newer_tune_cancels_auto_skip() {
        let mut h = harness();
        h.tx.send(PlayerEvent::Start(station("d", "http://dead")))
            .await
            .unwrap();
        wait_for(&mut h.updates, |u| matches!(u, PlayerUpdate::Failed(_))).await;

        h.tx.send(PlayerEvent::Tune(station("ok", "http://ok")))
            .await
            .unwrap();
        wait_for(&mut h.updates, |u| matches!(u, PlayerUpdate::Tuned(_))).await;

        tokio::time::sleep(Duration::from_secs(5)).await;
        while let Ok(update) = h.updates.try_recv() {
            assert_ne!(update, PlayerUpdate::SkipRequested);
        }
    }

    #[tokio::test]
    async fn test_failed_switch_falls_back_to_direct_play() {
        let mut h = harness();
        h.tx.send(PlayerEvent::Start(station("a", "http://a")))
            .await
            .unwrap();
        wait_for(&mut h.updates, |u| matches!(u, PlayerUpdate::Tuned(_))).await;

        h.shared.flaky_once.store(true, Ordering::SeqCst);
        h.tx.send(PlayerEvent::Tune(station("f", "http://flaky")))
            .await
            .unwrap();
        let next = wait_for(&mut h.updates, |u| {
            matches!(u, PlayerUpdate::Tuned(_) | PlayerUpdate::Failed(_))
        })
        .await;
        assert_eq!(next, PlayerUpdate::Tuned("f".into()));
    }

    #[tokio::test]
    async fn test_dropped_tune_is_reconciled() {
        let mut h = harness();
        h.tx.send(PlayerEvent::Start(station("a", "http://a")))
            .await
            .unwrap();
        wait_for(&mut h.updates, |u| matches!(u, PlayerUpdate::Tuned(_))).await;

        h.tx.send(PlayerEvent::Tune(station("g", "http://gated")))
            .await
            .unwrap();
        wait_for(&mut h.updates, |u| {
            *u == PlayerUpdate::Status(PlaybackStatus::Crossfading)
        })
        .await;
        // Let the gated switch reach the engine before the next request.
        tokio::time::sleep(Duration::from_millis(20)).await;
        h.tx.send(PlayerEvent::Tune(station("c", "http://c")))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        h.shared.gate.notify_one();

        // The stale switch to "g" never reports; the core moves on to "c".
        assert_eq!(
            wait_for(&mut h.updates, |u| matches!(u, PlayerUpdate::Tuned(_))).await,
            PlayerUpdate::Tuned("c".into())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_back_to_previous_after_stalled_switch_replays() {
        let mut h = harness();
        h.tx.send(PlayerEvent::Start(station("a", "http://a")))
            .await
            .unwrap();
        wait_for(&mut h.updates, |u| matches!(u, PlayerUpdate::Tuned(_))).await;
        assert_eq!(h.shared.plays.load(Ordering::SeqCst), 1);

        h.tx.send(PlayerEvent::Tune(station("s", "http://stall")))
            .await
            .unwrap();
        wait_for(&mut h.updates, |u| {
            *u == PlayerUpdate::Status(PlaybackStatus::Crossfading)
        })
        .await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        // Dropped: the stalled switch still holds the engine.
        h.tx.send(PlayerEvent::Tune(station("a", "http://a")))
            .await
            .unwrap();

        // "a" was silenced by the switch, so it has to be played again.
        wait_for(&mut h.updates, |u| {
            *u == PlayerUpdate::Status(PlaybackStatus::Loading)
        })
        .await;
        assert_eq!(
            wait_for(&mut h.updates, |u| matches!(u, PlayerUpdate::Tuned(_))).await,
            PlayerUpdate::Tuned("a".into())
        );
        assert_eq!(h.shared.plays.load(Ordering::SeqCst), 2);
        assert_eq!(h.snapshot.read().await.status, PlaybackStatus::Playing);
    }
}

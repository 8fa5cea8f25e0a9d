//! Crossfade engine behaviour against gated fake channels.
//!
//! The fake's `play()` can be held open on a `Notify`, which lets the test
//! observe the engine while a switch is still pending.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use swipe_proto::audio::{AudioChannel, AudioGraph, CrossfadeEngine, CrossfadeOutcome, LoadState};
use swipe_proto::error::{AudioError, ChannelError};

#[derive(Default)]
struct Shared {
    urls: Mutex<[Option<String>; 2]>,
    hold_play: AtomicBool,
    gate: Notify,
    fail_build: AtomicBool,
}

struct GatedChannel {
    id: usize,
    shared: Arc<Shared>,
}

#[async_trait]
impl AudioChannel for GatedChannel {
    async fn load(&self, url: &str) -> Result<(), ChannelError> {
        self.shared.urls.lock().unwrap()[self.id] = Some(url.to_string());
        Ok(())
    }

    async fn play(&self) -> Result<(), ChannelError> {
        if self.shared.hold_play.load(Ordering::SeqCst) {
            self.shared.gate.notified().await;
        }
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
        self.shared.urls.lock().unwrap()[self.id] = None;
        Ok(())
    }

    async fn release(&self) -> Result<(), ChannelError> {
        Ok(())
    }
}

struct GatedGraph {
    shared: Arc<Shared>,
}

#[async_trait]
impl AudioGraph for GatedGraph {
    type Channel = GatedChannel;

    async fn build(&self) -> Result<[GatedChannel; 2], ChannelError> {
        if self.shared.fail_build.load(Ordering::SeqCst) {
            return Err(ChannelError::new("no output device"));
        }
        Ok([
            GatedChannel {
                id: 0,
                shared: self.shared.clone(),
            },
            GatedChannel {
                id: 1,
                shared: self.shared.clone(),
            },
        ])
    }
}

fn setup() -> (Arc<CrossfadeEngine<GatedGraph>>, Arc<Shared>) {
    let shared = Arc::new(Shared::default());
    let engine = CrossfadeEngine::new(
        GatedGraph {
            shared: shared.clone(),
        },
        1.0,
    );
    (Arc::new(engine), shared)
}

async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..200 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached");
}

#[tokio::test]
async fn second_crossfade_while_pending_is_dropped() {
    let (engine, shared) = setup();
    engine.initialize().await.unwrap();
    engine.play("http://a").await.unwrap();

    shared.hold_play.store(true, Ordering::SeqCst);
    let first = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.crossfade_to("http://b").await })
    };
    wait_until(|| engine.is_crossfading()).await;

    let second = engine.crossfade_to("http://c").await.unwrap();
    assert_eq!(second, CrossfadeOutcome::Dropped);

    let pending = engine.channel_snapshot();
    assert_eq!(pending.active, 0);
    assert_eq!(pending.standby_slot().url.as_deref(), Some("http://b"));
    assert_eq!(shared.urls.lock().unwrap()[1].as_deref(), Some("http://b"));

    shared.hold_play.store(false, Ordering::SeqCst);
    shared.gate.notify_one();
    assert_eq!(first.await.unwrap().unwrap(), CrossfadeOutcome::Switched);

    let done = engine.channel_snapshot();
    assert_eq!(done.active, 1);
    assert_eq!(done.active_slot().url.as_deref(), Some("http://b"));
    assert_eq!(done.active_slot().state, LoadState::Playing);
    assert_eq!(engine.active_url().as_deref(), Some("http://b"));
    assert!(!engine.is_crossfading());

    // The flag is clear again, so the next request goes through.
    assert_eq!(
        engine.crossfade_to("http://c").await.unwrap(),
        CrossfadeOutcome::Switched
    );
    assert_eq!(engine.channel_snapshot().active, 0);
}

#[tokio::test]
async fn preload_is_skipped_during_switch() {
    let (engine, shared) = setup();
    engine.initialize().await.unwrap();
    engine.play("http://a").await.unwrap();

    shared.hold_play.store(true, Ordering::SeqCst);
    let first = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.crossfade_to("http://b").await })
    };
    wait_until(|| engine.is_crossfading()).await;

    engine.preload("http://z").await.unwrap();
    assert_eq!(
        engine.channel_snapshot().standby_slot().url.as_deref(),
        Some("http://b")
    );

    shared.hold_play.store(false, Ordering::SeqCst);
    shared.gate.notify_one();
    first.await.unwrap().unwrap();
    assert_eq!(engine.active_url().as_deref(), Some("http://b"));
}

#[tokio::test]
async fn failed_graph_build_is_not_cached() {
    let (engine, shared) = setup();
    shared.fail_build.store(true, Ordering::SeqCst);
    assert!(matches!(
        engine.initialize().await,
        Err(AudioError::Graph(_))
    ));
    assert!(!engine.is_initialized());

    shared.fail_build.store(false, Ordering::SeqCst);
    engine.initialize().await.unwrap();
    assert!(engine.is_initialized());
}

#[tokio::test]
async fn mute_twice_restores_audible_state() {
    let (engine, _shared) = setup();
    engine.initialize().await.unwrap();
    engine.set_volume(0.6).await.unwrap();
    engine.play("http://a").await.unwrap();
    let before = engine.channel_snapshot().active_slot().clone();

    assert!(engine.toggle_mute().await.unwrap());
    assert!(!engine.toggle_mute().await.unwrap());

    let after = engine.channel_snapshot().active_slot().clone();
    assert_eq!(before.gain, after.gain);
    assert_eq!(before.muted, after.muted);
    assert_eq!(engine.volume(), 0.6);
}

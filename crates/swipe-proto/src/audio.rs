//! Dual-channel audio engine.
//!
//! Two channels are built once by an `AudioGraph`: one is active (audible
//! at the current volume, or muted), the other is standby and can be
//! preloaded.  A "crossfade" is an instant hard switch: the active channel is
//! paused and silenced, the standby channel starts at full gain, and the two
//! swap roles.
//!
//! Channel I/O happens outside the bookkeeping lock; the lock only guards the
//! slot table so snapshots stay readable while a switch is pending.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::error::{AudioError, ChannelError};

/// One playback pipeline: a source plus its own gain stage.
#[async_trait]
pub trait AudioChannel: Send + Sync {
    /// Assign a stream and start buffering it without playing.
    async fn load(&self, url: &str) -> Result<(), ChannelError>;
    async fn play(&self) -> Result<(), ChannelError>;
    async fn pause(&self) -> Result<(), ChannelError>;
    /// Linear gain, 0.0..=1.0.
    async fn set_gain(&self, gain: f32) -> Result<(), ChannelError>;
    /// Output-level mute, independent of gain.
    async fn set_muted(&self, muted: bool) -> Result<(), ChannelError>;
    /// Stop and drop the current stream.
    async fn stop(&self) -> Result<(), ChannelError>;
    /// Tear down the backend.  The channel is unusable afterwards.
    async fn release(&self) -> Result<(), ChannelError>;
}

/// Builds the pair of channels.  Construction may be slow or fail (output
/// device missing, player binary missing) so it is deferred to the first
/// user gesture.
#[async_trait]
pub trait AudioGraph: Send + Sync {
    type Channel: AudioChannel + 'static;

    async fn build(&self) -> Result<[Self::Channel; 2], ChannelError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LoadState {
    #[default]
    Empty,
    Loading,
    Ready,
    Playing,
    Errored,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SlotSnapshot {
    pub state: LoadState,
    pub url: Option<String>,
    pub gain: f32,
    pub muted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ChannelSnapshot {
    /// Index of the active slot (0 or 1).
    pub active: usize,
    pub slots: [SlotSnapshot; 2],
}

impl ChannelSnapshot {
    pub fn active_slot(&self) -> &SlotSnapshot {
        &self.slots[self.active]
    }

    pub fn standby_slot(&self) -> &SlotSnapshot {
        &self.slots[1 - self.active]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrossfadeOutcome {
    Switched,
    /// Another switch was already in flight; nothing changed.
    Dropped,
}

#[derive(Debug)]
struct EngineState {
    active: usize,
    slots: [SlotSnapshot; 2],
    volume: f32,
    muted: bool,
}

impl EngineState {
    fn new(volume: f32) -> Self {
        Self {
            active: 0,
            slots: Default::default(),
            volume,
            muted: false,
        }
    }

    fn audible_gain(&self) -> f32 {
        if self.muted {
            0.0
        } else {
            self.volume
        }
    }
}

/// Clears the in-flight flag however the switch ends.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct CrossfadeEngine<G: AudioGraph> {
    graph: G,
    channels: OnceCell<[G::Channel; 2]>,
    state: Mutex<EngineState>,
    crossfading: AtomicBool,
    destroyed: AtomicBool,
}

impl<G: AudioGraph> CrossfadeEngine<G> {
    pub fn new(graph: G, volume: f32) -> Self {
        Self {
            graph,
            channels: OnceCell::new(),
            state: Mutex::new(EngineState::new(volume.clamp(0.0, 1.0))),
            crossfading: AtomicBool::new(false),
            destroyed: AtomicBool::new(false),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, EngineState> {
        // A panic while holding the lock leaves plain data behind; keep going.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check_alive(&self) -> Result<(), AudioError> {
        if self.destroyed.load(Ordering::SeqCst) {
            Err(AudioError::Destroyed)
        } else {
            Ok(())
        }
    }

    fn channels(&self) -> Result<&[G::Channel; 2], AudioError> {
        self.channels
            .get()
            .ok_or_else(|| AudioError::Graph("audio graph not initialized".into()))
    }

    pub fn is_initialized(&self) -> bool {
        self.channels.initialized()
    }

    /// Build the channel pair.  Only a successful build is cached, so a
    /// failed attempt can be retried on the next gesture.
    pub async fn initialize(&self) -> Result<(), AudioError> {
        self.check_alive()?;
        self.channels
            .get_or_try_init(|| async {
                info!("Building audio graph");
                self.graph.build().await
            })
            .await
            .map_err(|e| AudioError::Graph(e.0))?;
        Ok(())
    }

    /// Play `url` on the active channel at the current gain.  No timeout
    /// here; callers bound the wait.
    pub async fn play(&self, url: &str) -> Result<(), AudioError> {
        self.check_alive()?;
        let channels = self.channels()?;
        let (active, muted, gain) = {
            let mut st = self.state();
            let active = st.active;
            let gain = st.audible_gain();
            let muted = st.muted;
            let slot = &mut st.slots[active];
            slot.url = Some(url.to_string());
            slot.state = LoadState::Loading;
            (active, muted, gain)
        };
        debug!("play on channel {}: {}", active, url);

        let channel = &channels[active];
        let result = async {
            channel.load(url).await?;
            channel.set_muted(muted).await?;
            channel.set_gain(gain).await?;
            channel.play().await
        }
        .await;

        let mut st = self.state();
        let slot = &mut st.slots[active];
        match result {
            Ok(()) => {
                if slot.url.as_deref() == Some(url) {
                    slot.state = LoadState::Playing;
                    slot.gain = gain;
                    slot.muted = muted;
                }
                Ok(())
            }
            Err(e) => {
                slot.state = LoadState::Errored;
                Err(AudioError::Playback(e.0))
            }
        }
    }

    /// Hard switch to `url` through the standby channel.
    pub async fn crossfade_to(&self, url: &str) -> Result<CrossfadeOutcome, AudioError> {
        self.check_alive()?;
        let channels = self.channels()?;
        if self
            .crossfading
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("crossfade to {} dropped: another switch in flight", url);
            return Ok(CrossfadeOutcome::Dropped);
        }
        let _guard = InFlight(&self.crossfading);

        let (current, standby, muted, gain, preloaded) = {
            let mut st = self.state();
            let current = st.active;
            let standby = 1 - current;
            let preloaded = st.slots[standby].url.as_deref() == Some(url)
                && st.slots[standby].state == LoadState::Ready;
            let muted = st.muted;
            let gain = st.audible_gain();
            st.slots[standby].url = Some(url.to_string());
            if !preloaded {
                st.slots[standby].state = LoadState::Loading;
            }
            (current, standby, muted, gain, preloaded)
        };
        info!(
            "Switching channel {} → {}: {}{}",
            current,
            standby,
            url,
            if preloaded { " (preloaded)" } else { "" }
        );

        // Silence the outgoing channel first.
        let outgoing = &channels[current];
        if let Err(e) = outgoing.pause().await {
            warn!("pause on outgoing channel {} failed: {}", current, e);
        }
        if let Err(e) = outgoing.set_gain(0.0).await {
            warn!("silencing outgoing channel {} failed: {}", current, e);
        }
        {
            let mut st = self.state();
            let slot = &mut st.slots[current];
            slot.gain = 0.0;
            if slot.state == LoadState::Playing {
                slot.state = LoadState::Ready;
            }
        }

        let incoming = &channels[standby];
        let result = async {
            if !preloaded {
                incoming.load(url).await?;
            }
            incoming.set_muted(muted).await?;
            incoming.set_gain(gain).await?;
            incoming.play().await
        }
        .await;

        if let Err(e) = result {
            self.state().slots[standby].state = LoadState::Errored;
            return Err(AudioError::Crossfade(e.0));
        }

        {
            let mut st = self.state();
            let slot = &mut st.slots[standby];
            slot.state = LoadState::Playing;
            slot.gain = gain;
            slot.muted = muted;
            st.slots[current] = SlotSnapshot {
                muted,
                ..SlotSnapshot::default()
            };
            st.active = standby;
        }
        if let Err(e) = outgoing.stop().await {
            warn!("clearing outgoing channel {} failed: {}", current, e);
        }
        Ok(CrossfadeOutcome::Switched)
    }

    /// Buffer `url` on the standby channel.  Last call wins.  Skipped while a
    /// switch is in flight, since the standby channel is the one being
    /// switched to.
    pub async fn preload(&self, url: &str) -> Result<(), AudioError> {
        self.check_alive()?;
        let channels = self.channels()?;
        if self.crossfading.load(Ordering::SeqCst) {
            debug!("preload of {} skipped during switch", url);
            return Ok(());
        }
        let standby = {
            let mut st = self.state();
            let standby = 1 - st.active;
            if st.slots[st.active].url.as_deref() == Some(url) {
                return Ok(());
            }
            let slot = &mut st.slots[standby];
            if slot.url.as_deref() == Some(url) && slot.state != LoadState::Errored {
                return Ok(());
            }
            slot.url = Some(url.to_string());
            slot.state = LoadState::Loading;
            standby
        };
        debug!("preload on channel {}: {}", standby, url);

        let result = channels[standby].load(url).await;
        let mut st = self.state();
        let slot = &mut st.slots[standby];
        // A switch or a newer preload may have claimed the slot meanwhile.
        if slot.url.as_deref() != Some(url) || slot.state != LoadState::Loading {
            return Ok(());
        }
        match result {
            Ok(()) => {
                slot.state = LoadState::Ready;
                Ok(())
            }
            Err(e) => {
                slot.state = LoadState::Errored;
                Err(AudioError::Playback(e.0))
            }
        }
    }

    pub async fn pause(&self) -> Result<(), AudioError> {
        self.check_alive()?;
        let channels = self.channels()?;
        let active = self.state().active;
        channels[active]
            .pause()
            .await
            .map_err(|e| AudioError::Playback(e.0))?;
        let mut st = self.state();
        if st.slots[active].state == LoadState::Playing {
            st.slots[active].state = LoadState::Ready;
        }
        Ok(())
    }

    pub async fn resume(&self) -> Result<(), AudioError> {
        self.check_alive()?;
        let channels = self.channels()?;
        let active = {
            let st = self.state();
            if st.slots[st.active].url.is_none() {
                return Err(AudioError::Playback("nothing to resume".into()));
            }
            st.active
        };
        match channels[active].play().await {
            Ok(()) => {
                self.state().slots[active].state = LoadState::Playing;
                Ok(())
            }
            Err(e) => {
                self.state().slots[active].state = LoadState::Errored;
                Err(AudioError::Playback(e.0))
            }
        }
    }

    /// Flip mute.  Muting silences both channels at the output as well as
    /// through gain; unmuting restores the held volume on the active one.
    pub async fn toggle_mute(&self) -> Result<bool, AudioError> {
        self.check_alive()?;
        let (muted, active, volume) = {
            let mut st = self.state();
            st.muted = !st.muted;
            (st.muted, st.active, st.volume)
        };
        info!("Mute {}", if muted { "on" } else { "off" });

        let Some(channels) = self.channels.get() else {
            return Ok(muted);
        };
        for (i, channel) in channels.iter().enumerate() {
            if let Err(e) = channel.set_muted(muted).await {
                warn!("set_muted on channel {} failed: {}", i, e);
            }
            let gain = if muted || i != active { 0.0 } else { volume };
            if muted || i == active {
                if let Err(e) = channel.set_gain(gain).await {
                    warn!("set_gain on channel {} failed: {}", i, e);
                }
            }
        }

        let mut st = self.state();
        for (i, slot) in st.slots.iter_mut().enumerate() {
            slot.muted = muted;
            if muted {
                slot.gain = 0.0;
            } else if i == active {
                slot.gain = volume;
            }
        }
        Ok(muted)
    }

    /// Set the held volume (clamped).  Applied immediately unless muted.
    pub async fn set_volume(&self, volume: f32) -> Result<f32, AudioError> {
        self.check_alive()?;
        let volume = volume.clamp(0.0, 1.0);
        let (apply, active) = {
            let mut st = self.state();
            st.volume = volume;
            (!st.muted, st.active)
        };
        if apply {
            if let Some(channels) = self.channels.get() {
                channels[active]
                    .set_gain(volume)
                    .await
                    .map_err(|e| AudioError::Playback(e.0))?;
                self.state().slots[active].gain = volume;
            }
        }
        Ok(volume)
    }

    /// Stop both channels and release the graph.  Every later call returns
    /// `AudioError::Destroyed`.
    pub async fn destroy(&self) -> Result<(), AudioError> {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        info!("Destroying audio engine");
        if let Some(channels) = self.channels.get() {
            for (i, channel) in channels.iter().enumerate() {
                if let Err(e) = channel.stop().await {
                    warn!("stop on channel {} failed: {}", i, e);
                }
                if let Err(e) = channel.release().await {
                    warn!("release on channel {} failed: {}", i, e);
                }
            }
        }
        let mut st = self.state();
        st.slots = Default::default();
        Ok(())
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    pub fn volume(&self) -> f32 {
        self.state().volume
    }

    pub fn is_muted(&self) -> bool {
        self.state().muted
    }

    pub fn is_playing(&self) -> bool {
        let st = self.state();
        st.slots[st.active].state == LoadState::Playing
    }

    pub fn is_crossfading(&self) -> bool {
        self.crossfading.load(Ordering::SeqCst)
    }

    pub fn active_url(&self) -> Option<String> {
        let st = self.state();
        st.slots[st.active].url.clone()
    }

    pub fn channel_snapshot(&self) -> ChannelSnapshot {
        let st = self.state();
        ChannelSnapshot {
            active: st.active,
            slots: st.slots.clone(),
        }
    }
}

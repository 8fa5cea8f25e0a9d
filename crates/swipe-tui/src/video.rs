/// Station video loops in a separate mpv window.
///
/// The app sends `VideoCommand`s as the current station and terminal focus
/// change; the driver task turns playback signals from the window into loop
/// seeks through `VideoLoop`.
use swipe_proto::protocol::VideoClip;
use swipe_proto::video::{self, VideoLoop, VideoSurface};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::mpv::{MpvEvent, MpvVideo, OBS_EOF_REACHED, OBS_TIME_POS};

#[derive(Debug, Clone)]
pub enum VideoCommand {
    /// Show this station's clip, or nothing.
    Show(Option<VideoClip>),
    /// Terminal focus gained / lost.
    Visible(bool),
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VideoSignal {
    Position(f64),
    Ended,
}

pub struct VideoDriver<S: VideoSurface> {
    surface: S,
    looper: Option<VideoLoop>,
    position: Option<f64>,
}

impl<S: VideoSurface> VideoDriver<S> {
    pub fn new(surface: S) -> Self {
        Self {
            surface,
            looper: None,
            position: None,
        }
    }

    pub async fn run(
        mut self,
        mut cmd_rx: mpsc::Receiver<VideoCommand>,
        mut signal_rx: mpsc::Receiver<VideoSignal>,
    ) -> S {
        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => match cmd {
                    Some(VideoCommand::Shutdown) | None => break,
                    Some(cmd) => self.on_command(cmd).await,
                },
                Some(signal) = signal_rx.recv() => self.on_signal(signal).await,
            }
        }
        if let Err(e) = self.surface.stop().await {
            debug!("video: stop at shutdown failed: {}", e);
        }
        self.surface
    }

    async fn on_command(&mut self, cmd: VideoCommand) {
        match cmd {
            VideoCommand::Show(Some(clip)) => {
                let looper = VideoLoop::for_clip(&clip);
                let url = video::playable_url(&clip);
                info!("video: showing {} from {:.1}s", url, looper.start());
                self.position = None;
                if let Err(e) = self.surface.play(&url, looper.start()).await {
                    warn!("video: play failed: {}", e);
                }
                self.looper = Some(looper);
            }
            VideoCommand::Show(None) => {
                self.looper = None;
                self.position = None;
                if let Err(e) = self.surface.stop().await {
                    warn!("video: stop failed: {}", e);
                }
            }
            VideoCommand::Visible(visible) => {
                let position = self.position;
                let action = self
                    .looper
                    .as_mut()
                    .and_then(|l| l.on_visibility(visible, position));
                self.perform(action).await;
            }
            VideoCommand::Shutdown => {}
        }
    }

    async fn on_signal(&mut self, signal: VideoSignal) {
        let action = match signal {
            VideoSignal::Position(p) => {
                self.position = Some(p);
                self.looper.as_mut().and_then(|l| l.on_time(p))
            }
            VideoSignal::Ended => self.looper.as_mut().and_then(|l| l.on_ended()),
        };
        self.perform(action).await;
    }

    async fn perform(&mut self, action: Option<video::LoopAction>) {
        let Some(action) = action else {
            return;
        };
        debug!("video: {:?}", action);
        if let Err(e) = video::apply(&self.surface, action).await {
            warn!("video: loop action failed: {}", e);
        }
    }
}

/// Map raw mpv observations to loop signals.
fn pump_signals(mut events: mpsc::Receiver<MpvEvent>, tx: mpsc::Sender<VideoSignal>) {
    tokio::spawn(async move {
        while let Some(evt) = events.recv().await {
            let signal = match evt.as_property_change() {
                Some((OBS_TIME_POS, data)) => data.as_f64().map(VideoSignal::Position),
                Some((OBS_EOF_REACHED, data)) if data.as_bool() == Some(true) => {
                    Some(VideoSignal::Ended)
                }
                _ => None,
            };
            if let Some(signal) = signal {
                if tx.send(signal).await.is_err() {
                    break;
                }
            }
        }
    });
}

/// Open the video window in the background.  Commands sent before the
/// window is up are queued; if mpv cannot be started they are discarded.
pub fn spawn_video() -> mpsc::Sender<VideoCommand> {
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<VideoCommand>(32);
    tokio::spawn(async move {
        let (surface, events) = match MpvVideo::spawn().await {
            Ok(v) => v,
            Err(e) => {
                warn!("video: window unavailable: {}", e);
                while cmd_rx.recv().await.is_some() {}
                return;
            }
        };
        let (signal_tx, signal_rx) = mpsc::channel(64);
        pump_signals(events, signal_tx);
        let surface = VideoDriver::new(surface).run(cmd_rx, signal_rx).await;
        surface.shutdown().await;
        info!("video: window closed");
    });
    cmd_tx
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct FakeSurface {
        calls: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl VideoSurface for FakeSurface {
        async fn play(&self, url: &str, start: f64) -> anyhow::Result<()> {
            self.calls.lock().unwrap().push(format!("play {} {}", url, start));
            Ok(())
        }

        async fn seek(&self, secs: f64) -> anyhow::Result<()> {
            self.calls.lock().unwrap().push(format!("seek {}", secs));
            Ok(())
        }

        async fn resume(&self) -> anyhow::Result<()> {
            self.calls.lock().unwrap().push("resume".into());
            Ok(())
        }

        async fn stop(&self) -> anyhow::Result<()> {
            self.calls.lock().unwrap().push("stop".into());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_driver_loops_and_resumes() {
        let surface = FakeSurface::default();
        let calls = surface.calls.clone();
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let (sig_tx, sig_rx) = mpsc::channel(8);
        let handle = tokio::spawn(VideoDriver::new(surface).run(cmd_rx, sig_rx));

        cmd_tx
            .send(VideoCommand::Show(Some(VideoClip {
                url: "https://youtu.be/dQw4w9WgXcQ".into(),
                start_secs: Some(10.0),
                end_secs: Some(30.0),
            })))
            .await
            .unwrap();
        tokio::task::yield_now().await;
        sig_tx.send(VideoSignal::Position(31.0)).await.unwrap();
        sig_tx.send(VideoSignal::Position(14.0)).await.unwrap();
        tokio::task::yield_now().await;
        cmd_tx.send(VideoCommand::Visible(false)).await.unwrap();
        cmd_tx.send(VideoCommand::Visible(true)).await.unwrap();
        cmd_tx.send(VideoCommand::Shutdown).await.unwrap();
        handle.await.unwrap();

        let calls = calls.lock().unwrap().clone();
        assert_eq!(calls[0], "play https://www.youtube.com/watch?v=dQw4w9WgXcQ 10");
        assert!(calls.contains(&"seek 10".to_string()));
        let resume_at = calls.iter().position(|c| c == "resume").unwrap();
        assert_eq!(calls[resume_at - 1], "seek 14");
        assert_eq!(calls.last().map(String::as_str), Some("stop"));
    }
}

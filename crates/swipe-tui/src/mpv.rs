/// mpv IPC driver with separated reader/writer tasks.
///
/// Architecture:
///
/// ```text
///   MpvDriver::spawn_and_connect()
///         │
///         ├── writer_task   ← receives MpvRequest via mpsc, serialises → socket
///         └── reader_task   ← reads JSON lines from socket
///                                ├── response (has request_id) → matched oneshot::Sender
///                                └── event / property-change   → event_tx channel
/// ```
///
/// Each audio channel of the crossfade engine is its own mpv process with its
/// own socket (`swipe-mpv-0`, `swipe-mpv-1`).  The optional video loop runs
/// in a third process (`swipe-mpv-video`).
///
/// Platform notes:
/// - Unix:   Unix domain sockets
/// - Windows: Named pipes  \\.\pipe\<name>
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tracing::{debug, info, warn};

use async_trait::async_trait;
use swipe_proto::audio::{AudioChannel, AudioGraph};
use swipe_proto::error::ChannelError;
use swipe_proto::platform;
use swipe_proto::video::VideoSurface;

#[cfg(unix)]
use tokio::net::UnixStream;

#[cfg(windows)]
use tokio::net::windows::named_pipe::ClientOptions;

// ── global request-id counter ─────────────────────────────────────────────────

static NEXT_REQ_ID: AtomicU64 = AtomicU64::new(1);

// ── observation property IDs ──────────────────────────────────────────────────

pub const OBS_CORE_IDLE: u64 = 1;
pub const OBS_PAUSE: u64 = 2;
pub const OBS_TIME_POS: u64 = 4;
pub const OBS_EOF_REACHED: u64 = 8;

// ── internal channel types ────────────────────────────────────────────────────

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<anyhow::Result<Value>>>>>;

struct PendingRequest {
    req_id: u64,
    payload: String, // serialised JSON line (already has '\n')
    reply: oneshot::Sender<anyhow::Result<Value>>,
}

/// An mpv event / property-change that arrived unsolicited (no request_id).
#[derive(Debug, Clone)]
pub struct MpvEvent {
    pub raw: Value,
}

impl MpvEvent {
    /// Returns `Some((obs_id, data))` if this is a property-change event.
    pub fn as_property_change(&self) -> Option<(u64, &Value)> {
        if self.raw.get("event")?.as_str()? == "property-change" {
            let id = self.raw.get("id")?.as_u64()?;
            let data = self.raw.get("data").unwrap_or(&Value::Null);
            Some((id, data))
        } else {
            None
        }
    }

    /// Returns the event name, e.g. "end-file", "start-file", "file-loaded".
    pub fn event_name(&self) -> Option<&str> {
        self.raw.get("event")?.as_str()
    }

    /// `Some(message)` for an `end-file` event that ended in error.
    pub fn load_error(&self) -> Option<String> {
        if self.event_name()? != "end-file" {
            return None;
        }
        if self.raw.get("reason")?.as_str()? != "error" {
            return None;
        }
        Some(
            self.raw
                .get("file_error")
                .and_then(|v| v.as_str())
                .unwrap_or("stream failed to open")
                .to_string(),
        )
    }
}

// ── public handle ─────────────────────────────────────────────────────────────

/// Cloneable handle to the mpv writer task.  Use `send()` to fire a command
/// and await the response.
#[derive(Clone)]
pub struct MpvHandle {
    tx: mpsc::Sender<PendingRequest>,
}

impl MpvHandle {
    pub async fn send(&self, command: Value) -> anyhow::Result<Value> {
        let req_id = NEXT_REQ_ID.fetch_add(1, Ordering::Relaxed);
        let msg = json!({ "command": command, "request_id": req_id });
        let mut raw = serde_json::to_string(&msg)?;
        raw.push('\n');

        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(PendingRequest {
                req_id,
                payload: raw,
                reply: reply_tx,
            })
            .await
            .map_err(|_| anyhow::anyhow!("mpv writer task gone"))?;

        tokio::time::timeout(tokio::time::Duration::from_secs(5), reply_rx)
            .await
            .map_err(|_| anyhow::anyhow!("mpv IPC timeout for req={}", req_id))?
            .map_err(|_| anyhow::anyhow!("mpv reply channel dropped req={}", req_id))?
    }

    pub async fn set_property(&self, name: &str, value: Value) -> anyhow::Result<()> {
        self.send(json!(["set_property", name, value])).await?;
        Ok(())
    }

    pub async fn load_paused(&self, url: &str) -> anyhow::Result<()> {
        self.set_property("pause", json!(true)).await?;
        debug!("mpv: sending loadfile command for url={}", url);
        self.send(json!(["loadfile", url, "replace"])).await?;
        Ok(())
    }

    pub async fn stop(&self) -> anyhow::Result<()> {
        self.send(json!(["stop"])).await?;
        Ok(())
    }

    pub async fn set_volume(&self, vol: f32) -> anyhow::Result<()> {
        let vol_pct = (vol * 100.0).clamp(0.0, 100.0);
        self.set_property("volume", json!(vol_pct)).await
    }

    pub async fn set_pause(&self, paused: bool) -> anyhow::Result<()> {
        self.set_property("pause", json!(paused)).await
    }

    pub async fn set_mute(&self, muted: bool) -> anyhow::Result<()> {
        self.set_property("mute", json!(muted)).await
    }

    pub async fn seek_to(&self, secs: f64) -> anyhow::Result<()> {
        self.set_property("time-pos", json!(secs)).await
    }

    /// Register observe_property for `props`.  Must be called after every
    /// fresh connection.
    pub async fn observe(&self, props: &[(u64, &str)]) {
        for (id, name) in props {
            match self.send(json!(["observe_property", id, name])).await {
                Ok(_) => debug!("mpv: observe_property id={} name={}", id, name),
                Err(e) => warn!("mpv: observe_property {} failed: {}", name, e),
            }
        }
    }
}

// ── driver ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MpvKind {
    Audio,
    Video,
}

/// Owns one mpv child process.
pub struct MpvDriver {
    pub role: String,
    pub socket_name: String,
    kind: MpvKind,
    process: Option<tokio::process::Child>,
}

impl MpvDriver {
    pub fn new(role: &str, kind: MpvKind) -> Self {
        Self {
            role: role.to_string(),
            socket_name: platform::mpv_socket_name(role),
            kind,
            process: None,
        }
    }

    pub fn process_alive(&mut self) -> bool {
        if let Some(ref mut child) = self.process {
            match child.try_wait() {
                Ok(None) => true,
                Ok(Some(status)) => {
                    if let Some(code) = status.code() {
                        warn!("mpv[{}] process exited with code: {}", self.role, code);
                    } else {
                        warn!("mpv[{}] process terminated by signal", self.role);
                    }
                    false
                }
                Err(e) => {
                    warn!("mpv[{}] process_alive check failed: {}", self.role, e);
                    false
                }
            }
        } else {
            false
        }
    }

    /// Kill the process if running.
    pub async fn kill(&mut self) {
        if let Some(mut p) = self.process.take() {
            let _ = p.kill().await;
        }
        #[cfg(unix)]
        let _ = tokio::fs::remove_file(&self.socket_name).await;
    }

    fn command(&self) -> anyhow::Result<tokio::process::Command> {
        let mpv_binary =
            platform::find_mpv_binary().ok_or_else(|| anyhow::anyhow!("mpv binary not found"))?;
        let mut cmd = tokio::process::Command::new(mpv_binary);
        cmd.arg("--idle=yes")
            .arg(platform::mpv_socket_arg(&self.role))
            .arg("--quiet")
            .stdout(std::process::Stdio::null());
        match self.kind {
            MpvKind::Audio => {
                cmd.arg("--no-video").arg("--volume=0");
            }
            MpvKind::Video => {
                cmd.arg("--no-audio")
                    .arg("--keep-open=yes")
                    .arg("--force-window=yes")
                    .arg(format!("--title=swipe-radio {}", self.role));
            }
        }
        cmd.kill_on_drop(true);
        Ok(cmd)
    }

    // ── spawn ─────────────────────────────────────────────────────────────────

    #[cfg(unix)]
    pub async fn spawn_and_connect(
        &mut self,
        event_tx: mpsc::Sender<MpvEvent>,
    ) -> anyhow::Result<MpvHandle> {
        if let Some(mut p) = self.process.take() {
            let _ = p.kill().await;
        }

        let socket_path = std::path::PathBuf::from(&self.socket_name);
        let _ = tokio::fs::remove_file(&socket_path).await;

        info!("mpv[{}]: spawning new process", self.role);
        let stderr_path = platform::data_dir().join(format!("mpv-{}-stderr.log", self.role));
        let stderr_file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&stderr_path)?;

        let child = self.command()?.stderr(stderr_file).spawn()?;
        info!("mpv[{}]: spawned process with pid {:?}", self.role, child.id());
        self.process = Some(child);

        for _ in 0..50 {
            tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
            if socket_path.exists() {
                break;
            }
        }
        if !socket_path.exists() {
            anyhow::bail!("mpv[{}] IPC socket did not appear", self.role);
        }
        tokio::time::sleep(tokio::time::Duration::from_millis(200)).await;

        let stream = UnixStream::connect(&socket_path).await?;
        info!("mpv[{}]: connected to IPC socket", self.role);
        let (read_half, write_half) = stream.into_split();
        Ok(start_io_tasks(BufReader::new(read_half), write_half, event_tx))
    }

    #[cfg(windows)]
    pub async fn spawn_and_connect(
        &mut self,
        event_tx: mpsc::Sender<MpvEvent>,
    ) -> anyhow::Result<MpvHandle> {
        if let Some(mut p) = self.process.take() {
            let _ = p.kill().await;
        }

        info!("mpv[{}]: spawning new process", self.role);
        let child = self
            .command()?
            .stderr(std::process::Stdio::null())
            .spawn()?;
        self.process = Some(child);

        let pipe_path = format!(r"\\.\pipe\{}", self.socket_name);
        for _ in 0..50 {
            tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
            if let Ok(client) = ClientOptions::new().open(&pipe_path) {
                info!("mpv[{}]: connected to named pipe", self.role);
                let (read_half, write_half) = tokio::io::split(client);
                return Ok(start_io_tasks(
                    BufReader::new(read_half),
                    write_half,
                    event_tx,
                ));
            }
        }
        anyhow::bail!("mpv[{}] named pipe did not appear", self.role)
    }
}

fn start_io_tasks<R, W>(
    reader: BufReader<R>,
    writer: W,
    event_tx: mpsc::Sender<MpvEvent>,
) -> MpvHandle
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
    W: tokio::io::AsyncWrite + Unpin + Send + 'static,
{
    // req_id → reply channel.  Writer inserts, reader resolves.
    let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
    let (cmd_tx, cmd_rx) = mpsc::channel::<PendingRequest>(64);

    tokio::spawn(writer_task(writer, cmd_rx, pending.clone()));
    tokio::spawn(reader_task(reader, pending, event_tx));

    MpvHandle { tx: cmd_tx }
}

// ── reader task ───────────────────────────────────────────────────────────────

async fn reader_task<R>(
    mut reader: BufReader<R>,
    pending: PendingMap,
    event_tx: mpsc::Sender<MpvEvent>,
) where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => {
                debug!("mpv reader: connection closed");
                let mut map = pending.lock().await;
                for (_, tx) in map.drain() {
                    let _ = tx.send(Err(anyhow::anyhow!("mpv IPC connection closed")));
                }
                break;
            }
            Ok(_) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let val: Value = match serde_json::from_str(trimmed) {
                    Ok(v) => v,
                    Err(e) => {
                        debug!("mpv reader: invalid json '{}': {}", trimmed, e);
                        continue;
                    }
                };

                if let Some(req_id) = val.get("request_id").and_then(|v| v.as_u64()) {
                    let mut map = pending.lock().await;
                    if let Some(tx) = map.remove(&req_id) {
                        let result = if val["error"].as_str() == Some("success") {
                            Ok(val)
                        } else {
                            let err = val["error"].as_str().unwrap_or("unknown error").to_string();
                            debug!("mpv reader: response req={} err={}", req_id, err);
                            Err(anyhow::anyhow!("mpv error: {}", err))
                        };
                        let _ = tx.send(result);
                    } else {
                        debug!("mpv reader: response for unknown req={}", req_id);
                    }
                } else {
                    let _ = event_tx.send(MpvEvent { raw: val }).await;
                }
            }
            Err(e) => {
                warn!("mpv reader: read error: {}", e);
                let mut map = pending.lock().await;
                for (_, tx) in map.drain() {
                    let _ = tx.send(Err(anyhow::anyhow!("mpv IPC read error: {}", e)));
                }
                break;
            }
        }
    }
}

// ── writer task ───────────────────────────────────────────────────────────────

async fn writer_task<W>(mut writer: W, mut rx: mpsc::Receiver<PendingRequest>, pending: PendingMap)
where
    W: tokio::io::AsyncWrite + Unpin,
{
    while let Some(req) = rx.recv().await {
        // Register reply channel before writing so reader can match it
        {
            let mut map = pending.lock().await;
            map.insert(req.req_id, req.reply);
        }
        debug!(
            "mpv writer: send req={} payload={}",
            req.req_id,
            req.payload.trim()
        );
        if let Err(e) = writer.write_all(req.payload.as_bytes()).await {
            warn!("mpv writer: write error: {}", e);
            let mut map = pending.lock().await;
            if let Some(tx) = map.remove(&req.req_id) {
                let _ = tx.send(Err(anyhow::anyhow!("mpv write error: {}", e)));
            }
            break;
        }
    }
    debug!("mpv writer: task exiting");
}

// ── audio channel ─────────────────────────────────────────────────────────────

/// What the channel has heard from its mpv process since the last load.
#[derive(Debug, Clone, Default, PartialEq)]
struct ChannelSignals {
    core_idle: Option<bool>,
    load_error: Option<String>,
    /// The process or IPC connection went away.
    gone: bool,
}

/// One crossfade channel backed by a dedicated mpv process.  Gain maps to
/// the mpv `volume` property and hardware-level mute to `mute`.
pub struct MpvChannel {
    role: String,
    handle: MpvHandle,
    driver: Mutex<MpvDriver>,
    signals: Arc<watch::Sender<ChannelSignals>>,
    pump: tokio::task::JoinHandle<()>,
}

impl MpvChannel {
    pub async fn spawn(role: &str) -> anyhow::Result<Self> {
        let mut driver = MpvDriver::new(role, MpvKind::Audio);
        let (event_tx, mut event_rx) = mpsc::channel::<MpvEvent>(256);
        let handle = driver.spawn_and_connect(event_tx).await?;
        handle
            .observe(&[(OBS_CORE_IDLE, "core-idle"), (OBS_PAUSE, "pause")])
            .await;

        let (signals_tx, _) = watch::channel(ChannelSignals::default());
        let signals = Arc::new(signals_tx);
        let pump_signals = signals.clone();
        let pump_role = role.to_string();
        let pump = tokio::spawn(async move {
            while let Some(evt) = event_rx.recv().await {
                if let Some((OBS_CORE_IDLE, data)) = evt.as_property_change() {
                    let idle = data.as_bool();
                    debug!("mpv[{}]: core-idle → {:?}", pump_role, idle);
                    pump_signals.send_modify(|s| s.core_idle = idle);
                } else if let Some(err) = evt.load_error() {
                    warn!("mpv[{}]: load failed: {}", pump_role, err);
                    pump_signals.send_modify(|s| s.load_error = Some(err));
                }
            }
            debug!("mpv[{}]: event pump exiting", pump_role);
            pump_signals.send_modify(|s| s.gone = true);
        });

        Ok(Self {
            role: role.to_string(),
            handle,
            driver: Mutex::new(driver),
            signals,
            pump,
        })
    }

    fn err(&self, e: anyhow::Error) -> ChannelError {
        ChannelError::new(format!("mpv[{}]: {}", self.role, e))
    }
}

#[async_trait]
impl AudioChannel for MpvChannel {
    async fn load(&self, url: &str) -> Result<(), ChannelError> {
        self.signals.send_modify(|s| {
            s.core_idle = None;
            s.load_error = None;
        });
        self.handle.load_paused(url).await.map_err(|e| self.err(e))
    }

    /// Unpause and wait until audio is actually flowing.  There is no
    /// deadline here; the caller bounds the wait.
    async fn play(&self) -> Result<(), ChannelError> {
        let mut rx = self.signals.subscribe();
        self.handle.set_pause(false).await.map_err(|e| self.err(e))?;
        let outcome = rx
            .wait_for(|s| s.core_idle == Some(false) || s.load_error.is_some() || s.gone)
            .await
            .map_err(|_| ChannelError::new(format!("mpv[{}]: channel closed", self.role)))?
            .clone();
        if let Some(err) = outcome.load_error {
            return Err(ChannelError::new(err));
        }
        if outcome.gone {
            return Err(ChannelError::new(format!("mpv[{}] exited", self.role)));
        }
        Ok(())
    }

    async fn pause(&self) -> Result<(), ChannelError> {
        self.handle.set_pause(true).await.map_err(|e| self.err(e))
    }

    async fn set_gain(&self, gain: f32) -> Result<(), ChannelError> {
        self.handle.set_volume(gain).await.map_err(|e| self.err(e))
    }

    async fn set_muted(&self, muted: bool) -> Result<(), ChannelError> {
        self.handle.set_mute(muted).await.map_err(|e| self.err(e))
    }

    async fn stop(&self) -> Result<(), ChannelError> {
        self.handle.stop().await.map_err(|e| self.err(e))
    }

    async fn release(&self) -> Result<(), ChannelError> {
        self.pump.abort();
        let mut driver = self.driver.lock().await;
        if !driver.process_alive() {
            debug!("mpv[{}]: already gone at release", self.role);
        }
        driver.kill().await;
        Ok(())
    }
}

/// Builds the two audio channels as two mpv processes.
pub struct MpvGraph;

#[async_trait]
impl AudioGraph for MpvGraph {
    type Channel = MpvChannel;

    async fn build(&self) -> Result<[MpvChannel; 2], ChannelError> {
        let first = MpvChannel::spawn("0").await?;
        let second = match MpvChannel::spawn("1").await {
            Ok(c) => c,
            Err(e) => {
                let _ = first.release().await;
                return Err(e.into());
            }
        };
        Ok([first, second])
    }
}

// ── video surface ─────────────────────────────────────────────────────────────

/// Video-only mpv window for station loops.
pub struct MpvVideo {
    handle: MpvHandle,
    driver: Mutex<MpvDriver>,
}

impl MpvVideo {
    /// Spawn the window.  Returns the surface plus its raw event stream
    /// (time-pos and eof-reached observations).
    pub async fn spawn() -> anyhow::Result<(Self, mpsc::Receiver<MpvEvent>)> {
        let mut driver = MpvDriver::new("video", MpvKind::Video);
        let (event_tx, event_rx) = mpsc::channel::<MpvEvent>(256);
        let handle = driver.spawn_and_connect(event_tx).await?;
        handle
            .observe(&[(OBS_TIME_POS, "time-pos"), (OBS_EOF_REACHED, "eof-reached")])
            .await;
        Ok((
            Self {
                handle,
                driver: Mutex::new(driver),
            },
            event_rx,
        ))
    }

    pub async fn shutdown(&self) {
        self.driver.lock().await.kill().await;
    }
}

#[async_trait]
impl VideoSurface for MpvVideo {
    async fn play(&self, url: &str, start: f64) -> anyhow::Result<()> {
        self.handle.set_property("start", json!(format!("{}", start))).await?;
        self.handle.send(json!(["loadfile", url, "replace"])).await?;
        self.handle.set_pause(false).await
    }

    async fn seek(&self, secs: f64) -> anyhow::Result<()> {
        self.handle.seek_to(secs).await?;
        // keep-open leaves the player paused at EOF.
        self.handle.set_pause(false).await
    }

    async fn resume(&self) -> anyhow::Result<()> {
        self.handle.set_pause(false).await
    }

    async fn stop(&self) -> anyhow::Result<()> {
        self.handle.stop().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_property_change_parsing() {
        let evt = MpvEvent {
            raw: json!({"event":"property-change","id":1,"name":"core-idle","data":false}),
        };
        let (id, data) = evt.as_property_change().unwrap();
        assert_eq!(id, OBS_CORE_IDLE);
        assert_eq!(data.as_bool(), Some(false));
        assert!(evt.load_error().is_none());
    }

    #[test]
    fn test_end_file_error() {
        let evt = MpvEvent {
            raw: json!({"event":"end-file","reason":"error","file_error":"loading failed"}),
        };
        assert_eq!(evt.load_error().as_deref(), Some("loading failed"));

        let eof = MpvEvent {
            raw: json!({"event":"end-file","reason":"eof"}),
        };
        assert!(eof.load_error().is_none());
    }

    #[tokio::test]
    async fn test_io_tasks_route_replies_and_events() {
        let (client, server) = tokio::io::duplex(4096);
        let (client_read, client_write) = tokio::io::split(client);
        let (event_tx, mut event_rx) = mpsc::channel(8);
        let handle = start_io_tasks(BufReader::new(client_read), client_write, event_tx);

        let (server_read, mut server_write) = tokio::io::split(server);
        tokio::spawn(async move {
            let mut lines = BufReader::new(server_read).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let req: Value = serde_json::from_str(&line).unwrap();
                let id = req["request_id"].as_u64().unwrap();
                let event = "{\"event\":\"property-change\",\"id\":1,\"data\":true}\n";
                server_write.write_all(event.as_bytes()).await.unwrap();
                let reply = format!("{{\"request_id\":{},\"error\":\"success\",\"data\":0.5}}\n", id);
                server_write.write_all(reply.as_bytes()).await.unwrap();
            }
        });

        let reply = handle.send(json!(["get_property", "volume"])).await.unwrap();
        assert_eq!(reply["data"].as_f64(), Some(0.5));
        let evt = event_rx.recv().await.unwrap();
        assert_eq!(evt.as_property_change().map(|(id, _)| id), Some(1));
    }
}

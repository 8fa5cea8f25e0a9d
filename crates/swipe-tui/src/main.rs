mod action;
mod app;
mod app_state;
mod component;
mod components;
mod core;
mod http;
mod mpv;
mod theme;
mod video;
mod widgets;

use std::sync::Arc;
use std::time::Duration;

use swipe_proto::presence::PresenceRoom;
use swipe_proto::protocol::RemoteCommand;
use tokio::sync::{broadcast, mpsc};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let data_dir = swipe_proto::platform::data_dir();
    std::fs::create_dir_all(&data_dir)?;

    let log_path = data_dir.join("swipe.log");
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    // Allow RUST_LOG override; default to debug for app code but suppress noisy
    // connection-level DEBUG from HTTP client internals (hyper_util, reqwest).
    let log_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "debug,hyper_util=warn,reqwest=warn,hyper=warn".to_string());
    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_env_filter(log_filter.as_str())
        .with_ansi(false)
        .init();

    // Print log path to stderr so the operator can tail it immediately.
    eprintln!("swipe-radio log: {}", log_path.display());

    tracing::info!("swipe-radio starting…");

    // ── Load config ──────────────────────────────────────────────────────────
    let config = swipe_proto::config::Config::load().unwrap_or_else(|e| {
        tracing::warn!("config unreadable, using defaults: {}", e);
        Default::default()
    });

    // ── Channels ─────────────────────────────────────────────────────────────
    // PlayerUpdate broadcast (PlayerCore → TUI)
    let (update_tx, update_rx) = broadcast::channel::<crate::core::PlayerUpdate>(256);
    // PlayerEvent channel (TUI → PlayerCore, plus the core's own tasks)
    let (event_tx, event_rx) = mpsc::channel::<crate::core::PlayerEvent>(256);
    // Remote commands (HTTP → TUI)
    let (remote_tx, remote_rx) = mpsc::channel::<RemoteCommand>(64);

    let snapshot = crate::core::SharedSnapshot::default();
    let presence = Arc::new(PresenceRoom::new());

    // ── Spawn PlayerCore event loop ──────────────────────────────────────────
    let player_core = crate::core::PlayerCore::new(
        mpv::MpvGraph,
        config.audio.clone(),
        event_tx.clone(),
        update_tx,
        snapshot.clone(),
    );
    let core_task = tokio::spawn(async move {
        if let Err(e) = player_core.run(event_rx).await {
            tracing::error!("PlayerCore exited with error: {}", e);
        }
    });

    // ── HTTP server ──────────────────────────────────────────────────────────
    if config.http.enabled {
        http::start_server(
            config.http.bind_address.clone(),
            config.http.port,
            snapshot.clone(),
            remote_tx,
            presence.clone(),
        );
    }

    // ── Video window ─────────────────────────────────────────────────────────
    let video_tx = config.video.enabled.then(video::spawn_video);

    // ── Run TUI ──────────────────────────────────────────────────────────────
    let app = app::App::new(config, event_tx, snapshot, presence, video_tx);
    let result = app.run(update_rx, remote_rx).await;

    // Give the core a moment to release the mpv processes.
    if tokio::time::timeout(Duration::from_secs(2), core_task)
        .await
        .is_err()
    {
        tracing::warn!("PlayerCore did not stop in time");
    }
    tracing::info!("swipe-radio exiting");
    result
}

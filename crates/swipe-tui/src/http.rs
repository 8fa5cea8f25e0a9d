use crate::core::SharedSnapshot;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Serialize;
use std::sync::Arc;
use swipe_proto::presence::{PresenceRoom, SessionId};
use swipe_proto::protocol::{PlayerSnapshot, RemoteCommand};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

#[derive(Clone)]
struct HttpState {
    snapshot: SharedSnapshot,
    remote_tx: mpsc::Sender<RemoteCommand>,
    presence: Arc<PresenceRoom>,
}

#[derive(Serialize)]
struct JoinReply {
    id: SessionId,
}

#[derive(Serialize)]
struct PresenceCount {
    count: usize,
}

pub fn start_server(
    bind_address: String,
    port: u16,
    snapshot: SharedSnapshot,
    remote_tx: mpsc::Sender<RemoteCommand>,
    presence: Arc<PresenceRoom>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let app = router(snapshot, remote_tx, presence);

        let addr = format!("{}:{}", bind_address, port);
        let listener = match TcpListener::bind(&addr).await {
            Ok(l) => l,
            Err(e) => {
                error!("Failed to bind HTTP server to {}: {}", addr, e);
                return;
            }
        };

        info!("HTTP API server listening on http://{}", addr);

        if let Err(e) = axum::serve(listener, app).await {
            error!("HTTP server error: {}", e);
        }
    })
}

fn router(
    snapshot: SharedSnapshot,
    remote_tx: mpsc::Sender<RemoteCommand>,
    presence: Arc<PresenceRoom>,
) -> Router {
    let app_state = HttpState {
        snapshot,
        remote_tx,
        presence,
    };

    Router::new()
        .route("/api/state", get(get_state))
        .route("/api/next", get(next_station).post(next_station))
        .route("/api/prev", get(prev_station).post(prev_station))
        .route("/api/goto/:idx", get(go_to).post(go_to))
        .route("/api/mute", get(toggle_mute).post(toggle_mute))
        .route("/api/pause", get(toggle_pause).post(toggle_pause))
        .route("/api/presence", get(presence_count))
        .route("/api/presence/join", post(presence_join))
        .route("/api/presence/leave/:id", post(presence_leave))
        .layer(ServiceBuilder::new().layer(CorsLayer::permissive()))
        .with_state(app_state)
}

async fn get_state(State(state): State<HttpState>) -> Json<PlayerSnapshot> {
    let mut snap = state.snapshot.read().await.clone();
    snap.listeners = state.presence.count();
    Json(snap)
}

async fn forward(state: &HttpState, cmd: RemoteCommand) -> StatusCode {
    match state.remote_tx.send(cmd).await {
        Ok(()) => StatusCode::OK,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

async fn next_station(State(state): State<HttpState>) -> StatusCode {
    info!("HTTP API: next station");
    forward(&state, RemoteCommand::Next).await
}

async fn prev_station(State(state): State<HttpState>) -> StatusCode {
    info!("HTTP API: previous station");
    forward(&state, RemoteCommand::Prev).await
}

async fn go_to(Path(idx): Path<usize>, State(state): State<HttpState>) -> StatusCode {
    info!("HTTP API: go to station {}", idx);
    let count = state.snapshot.read().await.station_count;
    if idx >= count {
        return StatusCode::NOT_FOUND;
    }
    forward(&state, RemoteCommand::GoTo { index: idx }).await
}

async fn toggle_mute(State(state): State<HttpState>) -> StatusCode {
    info!("HTTP API: toggle mute");
    forward(&state, RemoteCommand::ToggleMute).await
}

async fn toggle_pause(State(state): State<HttpState>) -> StatusCode {
    info!("HTTP API: toggle pause");
    forward(&state, RemoteCommand::TogglePause).await
}

async fn presence_count(State(state): State<HttpState>) -> Json<PresenceCount> {
    Json(PresenceCount {
        count: state.presence.count(),
    })
}

async fn presence_join(State(state): State<HttpState>) -> Json<JoinReply> {
    let id = state.presence.join();
    info!("HTTP API: presence join {}", id);
    Json(JoinReply { id })
}

async fn presence_leave(Path(id): Path<String>, State(state): State<HttpState>) -> StatusCode {
    info!("HTTP API: presence leave {}", id);
    if state.presence.leave(&SessionId::from(id)) {
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Method, Request};
    use tower::ServiceExt;

    fn setup() -> (Router, mpsc::Receiver<RemoteCommand>, SharedSnapshot, Arc<PresenceRoom>) {
        let snapshot = SharedSnapshot::default();
        let (tx, rx) = mpsc::channel(8);
        let presence = Arc::new(PresenceRoom::new());
        (
            router(snapshot.clone(), tx, presence.clone()),
            rx,
            snapshot,
            presence,
        )
    }

    fn request(method: Method, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    async fn body_json(resp: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_commands_are_forwarded() {
        let (app, mut rx, snapshot, _) = setup();
        snapshot.write().await.station_count = 4;

        let resp = app
            .clone()
            .oneshot(request(Method::POST, "/api/next"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(rx.recv().await, Some(RemoteCommand::Next));

        let resp = app
            .clone()
            .oneshot(request(Method::GET, "/api/goto/3"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(rx.recv().await, Some(RemoteCommand::GoTo { index: 3 }));

        let resp = app
            .oneshot(request(Method::GET, "/api/goto/4"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_state_includes_listeners() {
        let (app, _rx, snapshot, presence) = setup();
        snapshot.write().await.current_station = Some("Radio Nova".into());
        presence.join();

        let resp = app
            .oneshot(request(Method::GET, "/api/state"))
            .await
            .unwrap();
        let json = body_json(resp).await;
        assert_eq!(json["current_station"], "Radio Nova");
        assert_eq!(json["listeners"], 1);
    }

    #[tokio::test]
    async fn test_presence_join_and_leave() {
        let (app, _rx, _snapshot, presence) = setup();

        let resp = app
            .clone()
            .oneshot(request(Method::POST, "/api/presence/join"))
            .await
            .unwrap();
        let id = body_json(resp).await["id"].as_str().unwrap().to_string();
        assert_eq!(presence.count(), 1);

        let resp = app
            .clone()
            .oneshot(request(Method::GET, "/api/presence"))
            .await
            .unwrap();
        assert_eq!(body_json(resp).await["count"], 1);

        let uri = format!("/api/presence/leave/{}", id);
        let resp = app
            .clone()
            .oneshot(request(Method::POST, &uri))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(presence.count(), 0);

        let resp = app.oneshot(request(Method::POST, &uri)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}

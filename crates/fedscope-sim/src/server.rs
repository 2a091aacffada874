//! REST and WebSocket surface of the simulated backend.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, warn};

use fedscope_protocol::{
    LogMetricRequest, Metadata, MetricSample, NodeMap, RawMetricsByRole, Role,
    UploadDistributionRequest,
};

use crate::state::{SimError, SimStore};

/// Feed subscribers more than this many samples behind start losing frames.
const FEED_BUFFER: usize = 1024;

impl IntoResponse for SimError {
    fn into_response(self) -> Response {
        let status = match &self {
            SimError::AlreadyExists(_) => StatusCode::CONFLICT,
            SimError::NotFound(_) => StatusCode::NOT_FOUND,
            SimError::BadRequest(_) => StatusCode::BAD_REQUEST,
        };
        let body = Json(serde_json::json!({"error": self.to_string()}));
        (status, body).into_response()
    }
}

#[derive(Clone)]
struct WebState {
    store: Arc<RwLock<SimStore>>,
    feed: broadcast::Sender<String>,
}

/// Encode a sample and push it to every feed subscriber.
pub(crate) fn broadcast_sample(feed: &broadcast::Sender<String>, sample: &MetricSample) {
    match serde_json::to_string(sample) {
        Ok(payload) => {
            // No subscribers is fine.
            let _ = feed.send(payload);
        }
        Err(error) => warn!(error = %error, "failed to encode feed frame"),
    }
}

pub struct SimServer {
    listener: tokio::net::TcpListener,
    store: Arc<RwLock<SimStore>>,
    feed: broadcast::Sender<String>,
}

impl SimServer {
    /// Bind the listener without serving yet. Binding port 0 and reading
    /// [`SimServer::local_addr`] gives tests a free port.
    pub async fn bind(addr: &str) -> Result<Self, anyhow::Error> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        let (feed, _) = broadcast::channel(FEED_BUFFER);
        Ok(Self {
            listener,
            store: Arc::new(RwLock::new(SimStore::new())),
            feed,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, anyhow::Error> {
        Ok(self.listener.local_addr()?)
    }

    /// Shared store, for in-process generators and tests.
    pub fn store(&self) -> Arc<RwLock<SimStore>> {
        self.store.clone()
    }

    /// Sender side of the live feed.
    pub fn feed_sender(&self) -> broadcast::Sender<String> {
        self.feed.clone()
    }

    pub async fn run(self) -> Result<(), anyhow::Error> {
        let addr = self.listener.local_addr()?;
        let state = WebState {
            store: self.store,
            feed: self.feed,
        };

        let app = Router::new()
            .route("/experiments", get(list_experiments))
            .route("/experiment/:exp_id/create", post(create_experiment))
            .route(
                "/experiment/:exp_id/topology",
                get(get_topology).post(set_topology),
            )
            .route("/experiment/:exp_id/log/:role", post(log_metric))
            .route("/experiment/:exp_id/distribution/:role", post(log_distribution))
            .route("/experiment/:exp_id/metrics", get(get_metrics))
            .route("/experiment/:exp_id/meta", get(get_metadata))
            .route("/experiment/:exp_id/distributions", get(get_distributions))
            .route("/ws", get(feed_upgrade))
            .with_state(state);

        tracing::info!(addr = %addr, "simulated backend listening");
        axum::serve(self.listener, app).await?;
        Ok(())
    }
}

async fn list_experiments(State(web): State<WebState>) -> Json<Vec<String>> {
    Json(web.store.read().await.list_experiments())
}

async fn create_experiment(
    State(web): State<WebState>,
    Path(exp_id): Path<String>,
    Json(metadata): Json<Metadata>,
) -> Result<impl IntoResponse, SimError> {
    web.store.write().await.create_experiment(&exp_id, metadata)?;
    debug!(exp_id = %exp_id, "experiment created");
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({"status": "created", "exp_id": exp_id})),
    ))
}

async fn set_topology(
    State(web): State<WebState>,
    Path(exp_id): Path<String>,
    Json(topology): Json<NodeMap>,
) -> Result<Json<serde_json::Value>, SimError> {
    web.store.write().await.set_topology(&exp_id, topology)?;
    Ok(Json(serde_json::json!({"status": "ok"})))
}

async fn log_metric(
    State(web): State<WebState>,
    Path((exp_id, role)): Path<(String, Role)>,
    Json(request): Json<LogMetricRequest>,
) -> Result<Json<serde_json::Value>, SimError> {
    if request.device.is_empty() {
        return Err(SimError::BadRequest("missing device"));
    }
    let sample = web.store.write().await.add_metric(&exp_id, role, request)?;
    broadcast_sample(&web.feed, &sample);
    Ok(Json(serde_json::json!({"status": "ok"})))
}

async fn log_distribution(
    State(web): State<WebState>,
    Path((exp_id, role)): Path<(String, Role)>,
    Json(request): Json<UploadDistributionRequest>,
) -> Result<Json<serde_json::Value>, SimError> {
    if request.device.is_empty() || request.distribution.is_empty() {
        return Err(SimError::BadRequest("missing device or distribution"));
    }
    web.store
        .write()
        .await
        .add_distribution(&exp_id, role, request)?;
    Ok(Json(serde_json::json!({"status": "ok"})))
}

async fn get_metrics(
    State(web): State<WebState>,
    Path(exp_id): Path<String>,
) -> Result<Json<RawMetricsByRole>, SimError> {
    Ok(Json(web.store.read().await.metrics(&exp_id)?))
}

async fn get_metadata(
    State(web): State<WebState>,
    Path(exp_id): Path<String>,
) -> Result<Json<Metadata>, SimError> {
    Ok(Json(web.store.read().await.metadata(&exp_id)?))
}

async fn get_distributions(
    State(web): State<WebState>,
    Path(exp_id): Path<String>,
) -> Result<Json<fedscope_protocol::DistributionsByRole>, SimError> {
    Ok(Json(web.store.read().await.distributions(&exp_id)?))
}

async fn get_topology(
    State(web): State<WebState>,
    Path(exp_id): Path<String>,
) -> Result<Json<NodeMap>, SimError> {
    Ok(Json(web.store.read().await.topology(&exp_id)?))
}

async fn feed_upgrade(ws: WebSocketUpgrade, State(web): State<WebState>) -> impl IntoResponse {
    let feed = web.feed.subscribe();
    ws.on_upgrade(move |socket| feed_loop(socket, feed))
}

/// Push-only: forward every broadcast sample, ignore inbound keepalives.
async fn feed_loop(mut socket: WebSocket, mut feed: broadcast::Receiver<String>) {
    loop {
        tokio::select! {
            item = feed.recv() => match item {
                Ok(payload) => {
                    if socket.send(Message::Text(payload)).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "feed subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            inbound = socket.recv() => {
                if !matches!(inbound, Some(Ok(_))) {
                    break;
                }
            }
        }
    }
    debug!("feed subscriber disconnected");
}

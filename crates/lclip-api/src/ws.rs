//! Live progress WebSocket surface.
//!
//! One long-lived bidirectional stream per connection at
//! `/ws/jobs/{job_id}?token=…`: authenticate, verify ownership, subscribe
//! to the job's bus topic, and forward every record as one JSON text frame.
//! Clients may send `{"type":"ping"}` and receive `{"type":"pong"}`.

use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::time::interval;
use tracing::{info, warn};

use lclip_bus::Subscription;
use lclip_models::{ClientFrame, JobId, JobStatus, ProgressRecord};

use crate::error::ApiError;
use crate::metrics;
use crate::quota::EndpointClass;
use crate::state::AppState;

/// Bounded send buffer per connection.
const WS_SEND_BUFFER_SIZE: usize = 32;

/// Server-initiated keep-alive interval.
const WS_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
pub struct WsAuthQuery {
    pub token: String,
}

/// Upgrade handler for `/ws/jobs/{job_id}`.
pub async fn ws_job_progress(
    ws: WebSocketUpgrade,
    Path(job_id): Path<String>,
    Query(query): Query<WsAuthQuery>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let principal = state.auth.verify(&query.token)?;
    state.quota.check(EndpointClass::Progress, &principal)?;

    let job_id = JobId::from_string(job_id);
    // Ownership check doubles as existence check
    let job = state
        .controller
        .get_owned_job(&job_id, &principal)
        .await
        .map_err(ApiError::from)?;

    Ok(ws.on_upgrade(move |socket| async move {
        metrics::adjust_ws_connections(1.0);
        handle_socket(socket, state, job_id, job.status, job.error).await;
        metrics::adjust_ws_connections(-1.0);
    }))
}

async fn handle_socket(
    socket: WebSocket,
    state: AppState,
    job_id: JobId,
    status_at_connect: JobStatus,
    error_at_connect: Option<String>,
) {
    let (ws_sender, mut receiver) = socket.split();

    // Bounded channel so a slow client applies backpressure to the
    // forwarder, never to the bus
    let (tx, mut rx) = mpsc::channel::<Message>(WS_SEND_BUFFER_SIZE);
    let send_task = tokio::spawn(async move {
        let mut ws_sender = ws_sender;
        while let Some(message) = rx.recv().await {
            if ws_sender.send(message).await.is_err() {
                break;
            }
        }
    });

    // Initial connected frame
    send_record(&tx, &ProgressRecord::connected(job_id.clone())).await;

    // Subscribe before consulting the persisted state so a terminal that
    // lands in between is not missed
    let subscription = state.bus.subscribe(&job_id);

    // A job that finished before this connection replays its terminal
    // frame from the persisted row
    if status_at_connect.is_terminal() {
        let frame = match status_at_connect {
            JobStatus::Completed => ProgressRecord::complete(job_id.clone()),
            _ => ProgressRecord::error(
                job_id.clone(),
                error_at_connect.unwrap_or_else(|| "Processing failed".to_string()),
            ),
        };
        send_record(&tx, &frame).await;
        drop(tx);
        let _ = send_task.await;
        info!(job_id = %job_id, "WebSocket served terminal state and closed");
        return;
    }

    forward_until_terminal(&tx, &mut receiver, subscription, &job_id).await;

    drop(tx);
    let _ = send_task.await;
    info!(job_id = %job_id, "WebSocket closed");
}

/// Forward bus records and answer pings until a terminal frame or
/// disconnect.
async fn forward_until_terminal(
    tx: &mpsc::Sender<Message>,
    receiver: &mut futures_util::stream::SplitStream<WebSocket>,
    mut subscription: Subscription,
    job_id: &JobId,
) {
    let mut heartbeat = interval(WS_HEARTBEAT_INTERVAL);
    heartbeat.tick().await; // first tick fires immediately

    loop {
        tokio::select! {
            record = subscription.recv() => {
                match record {
                    Some(record) => {
                        let terminal = record.is_terminal();
                        if !send_record(tx, &record).await {
                            warn!(job_id = %job_id, "Client gone, dropping subscription");
                            break;
                        }
                        if terminal {
                            break;
                        }
                    }
                    None => break,
                }
            }
            _ = heartbeat.tick() => {
                if tx.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }
            client_message = receiver.next() => {
                match client_message {
                    Some(Ok(Message::Text(text))) => {
                        if matches!(serde_json::from_str(&text), Ok(ClientFrame::Ping)) {
                            send_record(tx, &ProgressRecord::Pong).await;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!(job_id = %job_id, "Client closed connection");
                        break;
                    }
                    Some(Err(_)) => break,
                    _ => {}
                }
            }
        }
    }
}

/// Serialize and enqueue one record. Returns false when the client is gone.
async fn send_record(tx: &mpsc::Sender<Message>, record: &ProgressRecord) -> bool {
    let json = match serde_json::to_string(record) {
        Ok(json) => json,
        Err(_) => return false,
    };
    let frame_type = match record {
        ProgressRecord::Connected { .. } => "connected",
        ProgressRecord::Progress { .. } => "progress",
        ProgressRecord::Complete { .. } => "complete",
        ProgressRecord::Error { .. } => "error",
        ProgressRecord::Pong => "pong",
    };
    metrics::record_ws_frame(frame_type);
    tx.send(Message::Text(json)).await.is_ok()
}

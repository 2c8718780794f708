use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt, stream::SplitSink, stream::SplitStream};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;

use super::branding::Branding;
use super::models::*;

/// How often to send WebSocket Ping frames.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// How long to wait for a Pong response before considering the connection dead.
const PONG_TIMEOUT: Duration = Duration::from_secs(60);

// ── WebSocket message types ──────────────────────────────────────────

/// Change events pushed to dashboards. Every variant carries the
/// `workshop_id` it belongs to so clients can subscribe to one workshop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum WsMessage {
    WorkshopCreated {
        workshop_id: i64,
        workshop: Workshop,
    },
    EmployeeSaved {
        workshop_id: i64,
        employee: Employee,
    },
    BrandingUpdated {
        workshop_id: i64,
        branding: Branding,
    },

    // Orders
    OrderCreated {
        workshop_id: i64,
        order: Order,
    },
    OrderUpdated {
        workshop_id: i64,
        order: Order,
    },
    OrderDeleted {
        workshop_id: i64,
        order_id: i64,
    },

    // Builds
    BuildCreated {
        workshop_id: i64,
        build: BikeBuild,
    },
    BuildUpdated {
        workshop_id: i64,
        build: BikeBuild,
    },
    BuildDeleted {
        workshop_id: i64,
        build_id: i64,
    },

    // Templates
    TemplateSaved {
        workshop_id: i64,
        template: ChecklistTemplate,
    },
    TemplateDeleted {
        workshop_id: i64,
        template_id: i64,
    },

    // Kanban board
    TaskCreated {
        workshop_id: i64,
        task: ShopTask,
    },
    TaskUpdated {
        workshop_id: i64,
        task: ShopTask,
    },
    TaskMoved {
        workshop_id: i64,
        task_id: i64,
        from_column: TaskColumn,
        to_column: TaskColumn,
        position: i32,
    },
    TaskDeleted {
        workshop_id: i64,
        task_id: i64,
    },

    // Notebook
    PageSaved {
        workshop_id: i64,
        page: NotebookPage,
    },
    PageMoved {
        workshop_id: i64,
        page_id: i64,
        parent_id: Option<i64>,
        position: i32,
    },
    PageDeleted {
        workshop_id: i64,
        page_id: i64,
        removed_ids: Vec<i64>,
    },

    // Feedback
    FeedbackCreated {
        workshop_id: i64,
        feedback: Feedback,
    },
    FeedbackUpdated {
        workshop_id: i64,
        feedback: Feedback,
    },
    FeedbackDeleted {
        workshop_id: i64,
        feedback_id: i64,
    },
}

impl WsMessage {
    pub fn workshop_id(&self) -> i64 {
        match self {
            Self::WorkshopCreated { workshop_id, .. }
            | Self::EmployeeSaved { workshop_id, .. }
            | Self::BrandingUpdated { workshop_id, .. }
            | Self::OrderCreated { workshop_id, .. }
            | Self::OrderUpdated { workshop_id, .. }
            | Self::OrderDeleted { workshop_id, .. }
            | Self::BuildCreated { workshop_id, .. }
            | Self::BuildUpdated { workshop_id, .. }
            | Self::BuildDeleted { workshop_id, .. }
            | Self::TemplateSaved { workshop_id, .. }
            | Self::TemplateDeleted { workshop_id, .. }
            | Self::TaskCreated { workshop_id, .. }
            | Self::TaskUpdated { workshop_id, .. }
            | Self::TaskMoved { workshop_id, .. }
            | Self::TaskDeleted { workshop_id, .. }
            | Self::PageSaved { workshop_id, .. }
            | Self::PageMoved { workshop_id, .. }
            | Self::PageDeleted { workshop_id, .. }
            | Self::FeedbackCreated { workshop_id, .. }
            | Self::FeedbackUpdated { workshop_id, .. }
            | Self::FeedbackDeleted { workshop_id, .. } => *workshop_id,
        }
    }
}

/// Query string accepted by `/ws`.
#[derive(Debug, Default, Deserialize)]
pub struct WsQuery {
    pub workshop_id: Option<i64>,
}

// ── WebSocket handler ────────────────────────────────────────────────

/// WebSocket handler that accepts a broadcast sender directly (for use with
/// the server router). With `workshop_id` set, only that workshop's events
/// are forwarded.
pub async fn ws_handler_with_sender(
    ws: WebSocketUpgrade,
    tx: broadcast::Sender<String>,
    workshop_id: Option<i64>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket_with_sender(socket, tx, workshop_id))
}

async fn handle_socket_with_sender(
    socket: WebSocket,
    tx: broadcast::Sender<String>,
    workshop_id: Option<i64>,
) {
    let (sender, receiver) = socket.split();
    let rx = tx.subscribe();
    tracing::debug!(?workshop_id, "WebSocket client connected");
    run_socket_loop(sender, receiver, rx, workshop_id).await;
    tracing::debug!(?workshop_id, "WebSocket client disconnected");
}

/// Whether a serialized event should reach a client subscribed to `filter`.
fn passes_filter(json: &str, filter: Option<i64>) -> bool {
    let Some(wanted) = filter else {
        return true;
    };
    serde_json::from_str::<serde_json::Value>(json)
        .ok()
        .and_then(|v| v["data"]["workshop_id"].as_i64())
        == Some(wanted)
}

/// Core WebSocket loop with ping/pong keepalive.
///
/// Combines broadcast forwarding, client message receiving, and periodic
/// ping/pong health checking into a single select loop. If no Pong is
/// received within [`PONG_TIMEOUT`] after a Ping is sent, the connection
/// is considered dead and the loop exits.
async fn run_socket_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut receiver: SplitStream<WebSocket>,
    mut rx: broadcast::Receiver<String>,
    filter: Option<i64>,
) {
    let mut ping_interval = tokio::time::interval(PING_INTERVAL);
    // The first tick completes immediately; consume it so the first real
    // ping fires after PING_INTERVAL has elapsed.
    ping_interval.tick().await;

    let mut last_pong = Instant::now();
    let mut awaiting_pong = false;

    loop {
        tokio::select! {
            // ── Periodic ping ───────────────────────────────────────
            _ = ping_interval.tick() => {
                if awaiting_pong && last_pong.elapsed() > PONG_TIMEOUT {
                    tracing::debug!("WebSocket client missed pong, dropping");
                    break;
                }
                if sender.send(Message::Ping(Vec::<u8>::new().into())).await.is_err() {
                    break;
                }
                awaiting_pong = true;
            }

            // ── Broadcast forwarding ────────────────────────────────
            result = rx.recv() => {
                match result {
                    Ok(msg) => {
                        if !passes_filter(&msg, filter) {
                            continue;
                        }
                        if sender.send(Message::Text(msg.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "WebSocket client lagged behind");
                        continue;
                    }
                }
            }

            // ── Client messages (pong, close, etc.) ─────────────────
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Pong(_))) => {
                        last_pong = Instant::now();
                        awaiting_pong = false;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
        }
    }

    let _ = sender.send(Message::Close(None)).await;
}

// ── Broadcast helper ─────────────────────────────────────────────────

/// Serialize and broadcast a WsMessage to all connected WebSocket clients.
/// Returns silently even if no clients are connected.
pub fn broadcast_message(tx: &broadcast::Sender<String>, msg: &WsMessage) {
    match serde_json::to_string(msg) {
        Ok(json) => {
            let _ = tx.send(json);
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize WsMessage");
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────

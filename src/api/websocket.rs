//! WebSocket topic subscription.
//!
//! `GET /ws/subscribe?facility={id}` or `?resident={id}` upgrades the
//! connection and streams `MonitorEvent`s for that topic as JSON text
//! frames.
//!
//! Connection lifecycle:
//! 1. Query validated (exactly one of `facility` / `resident`), WS upgraded
//! 2. Server registers a subscription and sends `subscribed`
//! 3. Events forwarded as they are published; a slow client loses events
//!    rather than stalling publishers
//! 4. Heartbeat every 30s, client answers `{"type":"pong"}`; 3 missed = disconnect

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::core_state::CoreState;
use crate::monitoring::{Subscription, Topic};

/// Heartbeat interval: server sends Heartbeat every 30 seconds.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Disconnect after this many missed heartbeats (3 × 30s = 90s).
const MAX_MISSED_HEARTBEATS: u32 = 3;

/// Maximum incoming messages per second per connection.
const MAX_INCOMING_PER_SECOND: u32 = 10;

#[derive(Debug, Default, Deserialize)]
pub struct SubscribeQuery {
    pub facility: Option<Uuid>,
    pub resident: Option<Uuid>,
}

impl SubscribeQuery {
    fn topic(&self) -> Result<Topic, ApiError> {
        match (self.facility, self.resident) {
            (Some(id), None) => Ok(Topic::Facility(id)),
            (None, Some(id)) => Ok(Topic::Resident(id)),
            _ => Err(ApiError::BadRequest(
                "Exactly one of `facility` or `resident` is required".into(),
            )),
        }
    }
}

/// Control frames sent alongside topic events.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
enum WsControl {
    Subscribed { topic: String, subscription_id: Uuid },
    Heartbeat { server_time: String },
}

/// Messages accepted from the client.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WsIncoming {
    Pong {},
}

// ═══════════════════════════════════════════════════════════
// WsSessionState: testable heartbeat and rate state
// ═══════════════════════════════════════════════════════════

#[derive(Debug, PartialEq)]
pub(crate) enum HeartbeatAction {
    SendHeartbeat,
    HeartbeatTimeout,
}

pub(crate) struct WsSessionState {
    missed_heartbeats: u32,
    incoming_times: VecDeque<Instant>,
}

impl WsSessionState {
    fn new() -> Self {
        Self {
            missed_heartbeats: 0,
            incoming_times: VecDeque::new(),
        }
    }

    fn on_pong(&mut self) {
        self.missed_heartbeats = 0;
    }

    fn on_heartbeat_tick(&mut self) -> HeartbeatAction {
        if self.missed_heartbeats >= MAX_MISSED_HEARTBEATS {
            return HeartbeatAction::HeartbeatTimeout;
        }
        self.missed_heartbeats += 1;
        HeartbeatAction::SendHeartbeat
    }

    fn check_rate(&mut self) -> bool {
        check_incoming_rate(&mut self.incoming_times)
    }
}

/// `GET /ws/subscribe` upgrade handler.
pub async fn ws_subscribe(
    ws: WebSocketUpgrade,
    State(ctx): State<ApiContext>,
    Query(query): Query<SubscribeQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let topic = query.topic()?;
    tracing::info!(%topic, "WebSocket subscription accepted");
    let core = ctx.core.clone();
    Ok(ws.on_upgrade(move |socket| handle_ws(socket, core, topic)))
}

async fn handle_ws(socket: WebSocket, core: Arc<CoreState>, topic: Topic) {
    let Subscription {
        id: subscription_id,
        receiver: mut events,
        ..
    } = match core.broadcaster.subscribe(topic) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(%topic, error = %e, "Subscription failed");
            return;
        }
    };

    let (ws_sink, mut ws_stream) = socket.split();
    let (tx, mut control) = mpsc::channel::<WsControl>(16);

    // Sender task: topic events and control frames → WebSocket
    let sender_handle = tokio::spawn(async move {
        let mut sink = ws_sink;
        loop {
            let json = tokio::select! {
                Some(event) = events.recv() => serde_json::to_string(&*event),
                Some(msg) = control.recv() => serde_json::to_string(&msg),
                else => break,
            };
            let Ok(json) = json else {
                continue;
            };
            if sink.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    let _ = tx
        .send(WsControl::Subscribed {
            topic: topic.to_string(),
            subscription_id,
        })
        .await;

    let mut session = WsSessionState::new();
    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    heartbeat.tick().await; // Consume initial immediate tick

    loop {
        tokio::select! {
            msg = ws_stream.next() => {
                match msg {
                    Some(Ok(Message::Text(ref text))) => {
                        if !session.check_rate() {
                            continue;
                        }
                        match serde_json::from_str::<WsIncoming>(text) {
                            Ok(WsIncoming::Pong {}) => session.on_pong(),
                            Err(_) => tracing::debug!(%topic, "Ignoring unrecognized client message"),
                        }
                    }
                    Some(Ok(Message::Pong(_))) => session.on_pong(),
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {}
                }
            }
            _ = heartbeat.tick() => {
                match session.on_heartbeat_tick() {
                    HeartbeatAction::HeartbeatTimeout => {
                        tracing::info!(%topic, "{MAX_MISSED_HEARTBEATS} missed heartbeats, disconnecting");
                        break;
                    }
                    HeartbeatAction::SendHeartbeat => {
                        let _ = tx.send(WsControl::Heartbeat {
                            server_time: chrono::Utc::now().to_rfc3339(),
                        }).await;
                    }
                }
            }
        }
    }

    // Closing both channels ends the sender task
    core.broadcaster.unsubscribe(topic, subscription_id);
    drop(tx);
    let _ = sender_handle.await;

    tracing::info!(%topic, "WebSocket disconnected");
}

/// Check if an incoming message is within the rate limit.
fn check_incoming_rate(timestamps: &mut VecDeque<Instant>) -> bool {
    let now = Instant::now();
    let one_sec_ago = now - Duration::from_secs(1);

    while let Some(&front) = timestamps.front() {
        if front < one_sec_ago {
            timestamps.pop_front();
        } else {
            break;
        }
    }

    if timestamps.len() as u32 >= MAX_INCOMING_PER_SECOND {
        return false;
    }

    timestamps.push_back(now);
    true
}

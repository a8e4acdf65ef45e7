//! WebSocket upgrade handler and per-connection event loop.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use chrono::Utc;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast;
use tokio::time;

use cadence_common::events::{DomainEvent, DomainEventKind, EventName};
use cadence_common::id::{self, prefix};
use cadence_common::protocol::{
    ClientMessage, ErrorPayload, GatewayMessage, HeartbeatPayload, JoinPayload, JoinedPayload,
    PresenceChangedPayload, RatingEntry, OP_HEARTBEAT, OP_JOIN, OP_LEAVE, OP_PUBLISH,
};
use cadence_common::SessionResponse;

use crate::AppState;

use super::conn::GatewayConn;
use super::fanout::RoomDispatch;

/// Heartbeat interval advertised to clients in the JOINED payload (ms).
pub const HEARTBEAT_INTERVAL_MS: u64 = 15_000;

/// Close codes (4000-range for application-level).
const CLOSE_UNKNOWN_ERROR: u16 = 4000;
const CLOSE_UNKNOWN_OPCODE: u16 = 4001;
const CLOSE_NOT_JOINED: u16 = 4003;
const CLOSE_JOIN_FAILED: u16 = 4004;
const CLOSE_SESSION_TIMEOUT: u16 = 4009;

/// Timeout for receiving JOIN after connection (seconds).
const JOIN_TIMEOUT_SECS: u64 = 10;

/// How the per-connection loop ended.
enum Exit {
    /// Explicit LEAVE — membership already removed.
    Left,
    /// Transport drop or protocol error — membership survives the grace
    /// period so a reconnect can pick it up.
    Dropped,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/gateway", get(ws_upgrade))
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

async fn handle_connection(socket: WebSocket, state: AppState) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    // Step 1: the first frame must be JOIN, within the handshake timeout.
    let join_result = time::timeout(Duration::from_secs(JOIN_TIMEOUT_SECS), async {
        while let Some(msg) = ws_rx.next().await {
            let msg = match msg {
                Ok(m) => m,
                Err(e) => {
                    tracing::debug!(?e, "ws read error during join");
                    return Err("read error");
                }
            };

            let text = match msg {
                Message::Text(t) => t,
                Message::Close(_) => return Err("client closed"),
                Message::Ping(_) | Message::Pong(_) => continue,
                _ => continue,
            };

            let client_msg: ClientMessage = match serde_json::from_str(&text) {
                Ok(m) => m,
                Err(_) => {
                    let _ = send_close(&mut ws_tx, CLOSE_UNKNOWN_ERROR, "Invalid JSON").await;
                    return Err("invalid json");
                }
            };

            if client_msg.op != OP_JOIN {
                let _ = send_close(&mut ws_tx, CLOSE_NOT_JOINED, "Expected JOIN").await;
                return Err("expected join");
            }

            let payload: JoinPayload =
                serde_json::from_value(client_msg.d).map_err(|_| "invalid join payload")?;
            return Ok(payload);
        }
        Err("connection closed before join")
    })
    .await;

    let payload = match join_result {
        Ok(Ok(payload)) => payload,
        Ok(Err(reason)) => {
            tracing::debug!(%reason, "join handshake failed");
            let _ = send_close(&mut ws_tx, CLOSE_JOIN_FAILED, reason).await;
            return;
        }
        Err(_timeout) => {
            let _ = send_close(&mut ws_tx, CLOSE_SESSION_TIMEOUT, "Handshake timeout").await;
            return;
        }
    };

    let connection_id = id::prefixed_ulid(prefix::CONNECTION);
    let room_key = payload.room.to_string();

    // Step 2: resolve leader/follower atomically under the room lock.
    let outcome = state.presence.join(
        &payload.room,
        &payload.participant_id,
        &payload.display_name,
        &connection_id,
        payload.wants_leadership,
    );

    // Subscribe before announcing presence so this connection cannot miss
    // events published concurrently with its own join.
    let broadcast_rx = state.broadcast.subscribe();

    // The active durable session, so the joiner can reconcile its timer.
    let session = match state
        .store
        .get_active(
            &payload.room.organization_id,
            &payload.room.team_id,
            &payload.room.meeting_type,
        )
        .await
    {
        Ok(found) => found.map(|session| SessionResponse {
            active_duration_seconds: session.active_duration_seconds(Utc::now()),
            session,
        }),
        Err(e) => {
            tracing::warn!(?e, room = %room_key, "active-session lookup failed during join");
            None
        }
    };

    let conn = Arc::new(GatewayConn::new(
        connection_id,
        payload.participant_id.clone(),
        payload.display_name.clone(),
        room_key.clone(),
    ));

    let joined = JoinedPayload {
        room: payload.room.clone(),
        is_leader: outcome.is_leader,
        leader_id: outcome.leader_id.clone(),
        participants: outcome.participants.clone(),
        notes: outcome.notes,
        ratings: outcome.ratings,
        session,
        heartbeat_interval_ms: HEARTBEAT_INTERVAL_MS,
    };
    if !send_dispatch(&mut ws_tx, &conn, EventName::JOINED, &joined).await {
        state
            .presence
            .mark_disconnected(&room_key, &conn.participant_id, &conn.connection_id);
        return;
    }

    // Announce the new membership to the rest of the room.
    state.broadcast.dispatch(RoomDispatch {
        room_key: room_key.clone(),
        originator_id: Some(conn.participant_id.clone()),
        event_name: EventName::PRESENCE_CHANGED.to_string(),
        data: serde_json::to_value(PresenceChangedPayload {
            participants: outcome.participants,
            leader_id: outcome.leader_id,
        })
        .unwrap_or_default(),
    });

    tracing::info!(
        connection_id = %conn.connection_id,
        participant_id = %conn.participant_id,
        room = %room_key,
        is_leader = outcome.is_leader,
        reconnected = outcome.reconnected,
        "gateway connection established"
    );

    let exit = run_session(conn.clone(), &state, ws_tx, ws_rx, broadcast_rx).await;

    match exit {
        Exit::Left => {}
        Exit::Dropped => {
            // Keep membership through the grace period; the sweeper finishes
            // the removal if no reconnect arrives.
            state
                .presence
                .mark_disconnected(&room_key, &conn.participant_id, &conn.connection_id);
        }
    }

    tracing::info!(
        connection_id = %conn.connection_id,
        participant_id = %conn.participant_id,
        room = %room_key,
        "gateway connection ended"
    );
}

/// Main loop: read client frames, forward broadcasts, enforce heartbeat.
async fn run_session(
    conn: Arc<GatewayConn>,
    state: &AppState,
    mut ws_tx: SplitSink<WebSocket, Message>,
    mut ws_rx: SplitStream<WebSocket>,
    mut broadcast_rx: broadcast::Receiver<Arc<RoomDispatch>>,
) -> Exit {
    // Heartbeat deadline: client must heartbeat within 1.5× the interval.
    let heartbeat_deadline = Duration::from_millis(HEARTBEAT_INTERVAL_MS * 3 / 2);
    let mut heartbeat_timer = time::interval(heartbeat_deadline);
    heartbeat_timer.tick().await; // First tick fires immediately; skip it.
    let mut got_heartbeat = true;

    loop {
        tokio::select! {
            // Client sends us a frame.
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let client_msg: ClientMessage = match serde_json::from_str(&text) {
                            Ok(m) => m,
                            Err(_) => {
                                let _ = send_close(&mut ws_tx, CLOSE_UNKNOWN_ERROR, "Invalid JSON").await;
                                return Exit::Dropped;
                            }
                        };

                        match client_msg.op {
                            OP_HEARTBEAT => {
                                got_heartbeat = true;
                                let payload: HeartbeatPayload =
                                    serde_json::from_value(client_msg.d).unwrap_or(HeartbeatPayload { seq: 0 });
                                let ack = GatewayMessage::heartbeat_ack(payload.seq);
                                if send_message(&mut ws_tx, &ack).await.is_err() {
                                    return Exit::Dropped;
                                }
                            }
                            OP_PUBLISH => {
                                let kind: DomainEventKind = match serde_json::from_value(client_msg.d) {
                                    Ok(k) => k,
                                    Err(_) => {
                                        let _ = send_close(&mut ws_tx, CLOSE_UNKNOWN_ERROR, "Invalid event payload").await;
                                        return Exit::Dropped;
                                    }
                                };
                                if !handle_publish(&conn, state, &mut ws_tx, kind).await {
                                    return Exit::Dropped;
                                }
                            }
                            OP_LEAVE => {
                                handle_leave(&conn, state);
                                let _ = ws_tx.send(Message::Close(None)).await;
                                return Exit::Left;
                            }
                            OP_JOIN => {
                                // One join per connection lifetime.
                                let _ = send_close(&mut ws_tx, CLOSE_UNKNOWN_ERROR, "Already joined").await;
                                return Exit::Dropped;
                            }
                            _ => {
                                let _ = send_close(&mut ws_tx, CLOSE_UNKNOWN_OPCODE, "Unknown opcode").await;
                                return Exit::Dropped;
                            }
                        }
                    }
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
                    Some(Ok(Message::Close(_))) | None => return Exit::Dropped,
                    Some(Err(e)) => {
                        tracing::debug!(?e, connection_id = %conn.connection_id, "ws read error");
                        return Exit::Dropped;
                    }
                    _ => continue,
                }
            }

            // Broadcast event from the fanout hub.
            result = broadcast_rx.recv() => {
                match result {
                    Ok(dispatch) => {
                        if !dispatch.deliverable_to(&conn.room_key, &conn.participant_id) {
                            continue;
                        }
                        let seq = conn.next_seq();
                        let msg = GatewayMessage::dispatch(&dispatch.event_name, seq, dispatch.data.clone());
                        if send_message(&mut ws_tx, &msg).await.is_err() {
                            return Exit::Dropped;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(
                            connection_id = %conn.connection_id,
                            skipped = n,
                            "gateway connection lagged behind broadcast"
                        );
                        // Continue — missed events are superseded by later state.
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        return Exit::Dropped;
                    }
                }
            }

            // Heartbeat timeout check.
            _ = heartbeat_timer.tick() => {
                if !got_heartbeat {
                    tracing::debug!(
                        connection_id = %conn.connection_id,
                        "heartbeat timeout — closing connection"
                    );
                    let _ = send_close(&mut ws_tx, CLOSE_SESSION_TIMEOUT, "Heartbeat timeout").await;
                    return Exit::Dropped;
                }
                got_heartbeat = false;
            }
        }
    }
}

/// Apply one published event: enforce leader-only kinds, update room-held
/// state (ratings, notes), and fan out. Returns false if the socket died.
async fn handle_publish(
    conn: &GatewayConn,
    state: &AppState,
    ws_tx: &mut SplitSink<WebSocket, Message>,
    kind: DomainEventKind,
) -> bool {
    if kind.leader_only() {
        let is_leader = state
            .presence
            .registry()
            .with_room(&conn.room_key, |room| {
                room.leader_id.as_deref() == Some(conn.participant_id.as_str())
            })
            .unwrap_or(false);
        if !is_leader {
            tracing::debug!(
                participant_id = %conn.participant_id,
                room = %conn.room_key,
                event = kind.event_name(),
                "non-leader publish denied"
            );
            let error = ErrorPayload {
                code: "NOT_LEADER".to_string(),
                message: "Only the leader can perform this action".to_string(),
            };
            return send_dispatch(ws_tx, conn, EventName::ERROR, &error).await;
        }
    }

    // Room-held state updated before fan-out, so late joiners see it.
    match &kind {
        DomainEventKind::NotesUpdate { section_id, text } => {
            state.presence.registry().with_room(&conn.room_key, |room| {
                room.notes.insert(section_id.clone(), text.clone());
            });
        }
        DomainEventKind::Rating { rating, .. } => {
            let summary = state.presence.registry().with_room(&conn.room_key, |room| {
                room.ratings.insert(
                    conn.participant_id.clone(),
                    RatingEntry {
                        participant_id: conn.participant_id.clone(),
                        display_name: conn.display_name.clone(),
                        rating: *rating,
                        submitted_at: Utc::now(),
                    },
                );
                room.ratings_summary()
            });
            // The aggregate goes to everyone, including the submitter.
            if let Some(summary) = summary {
                state.broadcast.dispatch(RoomDispatch::server(
                    &conn.room_key,
                    EventName::CURRENT_RATINGS,
                    serde_json::to_value(summary).unwrap_or_default(),
                ));
            }
        }
        _ => {}
    }

    let event = DomainEvent {
        // Stamped from the connection, never trusted from the payload.
        originator_id: Some(conn.participant_id.clone()),
        timestamp: Utc::now(),
        kind,
    };
    state
        .broadcast
        .dispatch(RoomDispatch::from_event(&conn.room_key, &event));
    true
}

/// Explicit LEAVE: remove membership now and announce the change.
fn handle_leave(conn: &GatewayConn, state: &AppState) {
    if let Some(outcome) = state.presence.leave(&conn.room_key, &conn.participant_id) {
        if !outcome.room_destroyed {
            state.broadcast.dispatch(RoomDispatch {
                room_key: conn.room_key.clone(),
                originator_id: Some(conn.participant_id.clone()),
                event_name: EventName::PRESENCE_CHANGED.to_string(),
                data: serde_json::to_value(PresenceChangedPayload {
                    participants: outcome.participants,
                    leader_id: outcome.leader_id,
                })
                .unwrap_or_default(),
            });
        }
    }
}

/// Serialize and send one dispatch directly on this connection's socket.
async fn send_dispatch<T: serde::Serialize>(
    ws_tx: &mut SplitSink<WebSocket, Message>,
    conn: &GatewayConn,
    event_name: &str,
    payload: &T,
) -> bool {
    let seq = conn.next_seq();
    let msg = GatewayMessage::dispatch(
        event_name,
        seq,
        serde_json::to_value(payload).unwrap_or_default(),
    );
    send_message(ws_tx, &msg).await.is_ok()
}

async fn send_message(
    ws_tx: &mut SplitSink<WebSocket, Message>,
    msg: &GatewayMessage,
) -> Result<(), axum::Error> {
    let json = serde_json::to_string(msg).unwrap_or_default();
    ws_tx.send(Message::Text(json.into())).await
}

/// Send a WebSocket close frame with a code and reason.
async fn send_close(
    ws_tx: &mut SplitSink<WebSocket, Message>,
    code: u16,
    reason: &str,
) -> Result<(), axum::Error> {
    let close_msg = Message::Close(Some(axum::extract::ws::CloseFrame {
        code,
        reason: reason.to_string().into(),
    }));
    ws_tx.send(close_msg).await
}

//! Reconnecting WebSocket transport for the hub gateway.
//!
//! The transport owns the socket lifecycle: connect, read, write, heartbeat,
//! and reconnect with exponential backoff. It never re-joins a room on its
//! own — a reconnect is a new connection lifetime, and the meeting client
//! decides what to do with it after seeing `TransportEvent::Connected`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use cadence_common::protocol::{ClientMessage, GatewayMessage};

use crate::config::{ClientConfig, SendPolicy};
use crate::error::ClientError;

/// Lifecycle and traffic events surfaced to the meeting client.
#[derive(Debug)]
pub enum TransportEvent {
    /// A connection is up. Emitted for the first connection and after every
    /// successful reconnect; any previous room membership is gone.
    Connected,
    Message(GatewayMessage),
    /// The connection dropped; reconnection is in progress.
    Disconnected,
    /// The reconnect budget is exhausted. No further events will follow.
    Gone,
}

/// Handle to the background connection task.
pub struct Transport {
    outbound: mpsc::UnboundedSender<ClientMessage>,
    events: mpsc::UnboundedReceiver<TransportEvent>,
    heartbeat: watch::Sender<Option<Duration>>,
    reconnecting: Arc<AtomicBool>,
    send_policy: SendPolicy,
}

impl Transport {
    /// Spawn the connection task. The first `TransportEvent::Connected` (or
    /// `Gone`) arrives via [`Transport::next_event`].
    pub fn connect(config: &ClientConfig) -> Self {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (events_tx, events) = mpsc::unbounded_channel();
        let (heartbeat, heartbeat_rx) = watch::channel(None);
        let reconnecting = Arc::new(AtomicBool::new(true));

        tokio::spawn(run_transport(
            config.gateway_url(),
            config.backoff_min,
            config.backoff_max,
            config.max_reconnect_attempts,
            outbound_rx,
            events_tx,
            heartbeat_rx,
            Arc::clone(&reconnecting),
        ));

        Self {
            outbound,
            events,
            heartbeat,
            reconnecting,
            send_policy: config.send_policy,
        }
    }

    pub fn is_reconnecting(&self) -> bool {
        self.reconnecting.load(Ordering::Acquire)
    }

    /// Queue a frame for the writer. Depending on the configured
    /// [`SendPolicy`], sends during a reconnect are buffered or rejected.
    pub fn send(&self, message: ClientMessage) -> Result<(), ClientError> {
        if self.is_reconnecting() && self.send_policy == SendPolicy::Reject {
            return Err(ClientError::Reconnecting);
        }
        self.outbound
            .send(message)
            .map_err(|_| ClientError::ConnectionLost)
    }

    /// Begin (or retune) writer-side heartbeats at the server-advertised
    /// interval from the JOINED payload.
    pub fn start_heartbeats(&self, interval: Duration) {
        let _ = self.heartbeat.send(Some(interval));
    }

    /// Wait for the next transport event. `None` after `Gone`.
    pub async fn next_event(&mut self) -> Option<TransportEvent> {
        self.events.recv().await
    }
}

/// Delay before reconnect attempt `attempt` (0-based): `min * 2^attempt`,
/// capped at `max`.
pub(crate) fn backoff_delay(attempt: u32, min: Duration, max: Duration) -> Duration {
    let factor = 1u32.checked_shl(attempt.min(20)).unwrap_or(u32::MAX);
    min.checked_mul(factor).map_or(max, |delay| delay.min(max))
}

#[allow(clippy::too_many_arguments)]
async fn run_transport(
    url: String,
    backoff_min: Duration,
    backoff_max: Duration,
    max_attempts: u32,
    mut outbound: mpsc::UnboundedReceiver<ClientMessage>,
    events: mpsc::UnboundedSender<TransportEvent>,
    mut heartbeat: watch::Receiver<Option<Duration>>,
    reconnecting: Arc<AtomicBool>,
) {
    let mut attempt: u32 = 0;
    loop {
        let stream = match connect_async(url.as_str()).await {
            Ok((stream, _response)) => stream,
            Err(err) => {
                tracing::warn!(%url, attempt, error = %err, "gateway connect failed");
                attempt += 1;
                if attempt > max_attempts {
                    reconnecting.store(false, Ordering::Release);
                    let _ = events.send(TransportEvent::Gone);
                    return;
                }
                tokio::time::sleep(backoff_delay(attempt - 1, backoff_min, backoff_max)).await;
                continue;
            }
        };

        attempt = 0;
        reconnecting.store(false, Ordering::Release);
        if events.send(TransportEvent::Connected).is_err() {
            return;
        }

        let (mut writer, mut reader) = stream.split();
        let mut heartbeat_seq: u64 = 0;
        // Any advertised interval belongs to a previous join; heartbeats stay
        // off until the meeting client re-tunes them after the next JOINED.
        // Sending one before JOIN would get the handshake rejected.
        let _ = heartbeat.borrow_and_update();
        let mut heartbeat_timer: Option<tokio::time::Interval> = None;

        loop {
            tokio::select! {
                frame = reader.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            match serde_json::from_str::<GatewayMessage>(text.as_str()) {
                                Ok(message) => {
                                    if events.send(TransportEvent::Message(message)).is_err() {
                                        return;
                                    }
                                }
                                Err(err) => {
                                    tracing::warn!(error = %err, "undecodable gateway frame");
                                }
                            }
                        }
                        Some(Ok(Message::Close(frame))) => {
                            tracing::info!(?frame, "gateway closed the connection");
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(err)) => {
                            tracing::warn!(error = %err, "gateway read error");
                            break;
                        }
                        None => break,
                    }
                }
                queued = outbound.recv() => {
                    let Some(message) = queued else {
                        // Handle dropped; close cleanly and stop.
                        let _ = writer.send(Message::Close(None)).await;
                        return;
                    };
                    let text = match serde_json::to_string(&message) {
                        Ok(text) => text,
                        Err(err) => {
                            tracing::warn!(error = %err, "unserializable outbound frame");
                            continue;
                        }
                    };
                    if writer.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                changed = heartbeat.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    // First beat after a full period; the server already knows
                    // we are alive from the JOIN that triggered this retune.
                    heartbeat_timer = (*heartbeat.borrow_and_update()).map(|period| {
                        tokio::time::interval_at(tokio::time::Instant::now() + period, period)
                    });
                }
                _ = tick(&mut heartbeat_timer) => {
                    heartbeat_seq += 1;
                    let frame = ClientMessage::heartbeat(heartbeat_seq);
                    let text = serde_json::to_string(&frame).unwrap_or_default();
                    if writer.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
            }
        }

        reconnecting.store(true, Ordering::Release);
        if events.send(TransportEvent::Disconnected).is_err() {
            return;
        }
        attempt += 1;
        if attempt > max_attempts {
            reconnecting.store(false, Ordering::Release);
            let _ = events.send(TransportEvent::Gone);
            return;
        }
        tokio::time::sleep(backoff_delay(attempt - 1, backoff_min, backoff_max)).await;
    }
}

/// Await the heartbeat interval if one is configured, pending forever
/// otherwise so the select arm stays inert.
async fn tick(timer: &mut Option<tokio::time::Interval>) {
    match timer {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

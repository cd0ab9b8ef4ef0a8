//! Websocket gateway transport.
//!
//! Speaks a small JSON envelope and leaves everything inside `d` opaque:
//!
//! - outbound: `{"op": "identify", "d": {"token": ..., "shards": ...}}`
//!   once per connection, then `{"op": "packet", "shard": n, "d": ...}`
//! - inbound: `{"op": "dispatch", "d": <GatewayEvent>}`; unknown ops are
//!   ignored
//!
//! An unexpected transport drop moves the session into its reconnect
//! loop (jittered backoff, re-identify) until [`GatewayHandle::disconnect`]
//! is called, which disables reconnecting permanently for this handle.

use std::sync::Arc;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use parking_lot::RwLock;
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use croon_core::{GatewayEvent, GuildId, ShardId};

use crate::backoff::Backoff;
use crate::errors::GatewayError;
use crate::shard::ShardMap;
use crate::traits::{Gateway, GatewayHandle, SessionInfo};

/// Event broadcast capacity.
const EVENT_CAPACITY: usize = 256;
/// Outbound packet buffer; packets queue here while a reconnect is in flight.
const OUTBOUND_CAPACITY: usize = 64;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Websocket-backed [`Gateway`].
pub struct WsGateway {
    url: String,
}

impl WsGateway {
    /// Create a gateway for the given `ws://`/`wss://` URL.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl Gateway for WsGateway {
    async fn connect(
        &self,
        token: &str,
        shard_count: u32,
    ) -> Result<Arc<dyn GatewayHandle>, GatewayError> {
        let stream = open_and_identify(&self.url, token, shard_count).await?;
        info!(url = %self.url, shard_count, "gateway transport connected");

        let (event_tx, _) = broadcast::channel(EVENT_CAPACITY);
        let (out_tx, out_rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let handle = Arc::new(WsHandle {
            event_tx,
            session: RwLock::new(None),
            shards: ShardMap::new(shard_count),
            out_tx,
            cancel: CancellationToken::new(),
        });

        let driver = SessionDriver {
            url: self.url.clone(),
            token: token.to_string(),
            shard_count,
            handle: Arc::clone(&handle),
        };
        drop(tokio::spawn(driver.run(stream, out_rx)));

        Ok(handle)
    }
}

/// A live websocket session.
pub struct WsHandle {
    event_tx: broadcast::Sender<GatewayEvent>,
    session: RwLock<Option<SessionInfo>>,
    shards: ShardMap,
    out_tx: mpsc::Sender<(ShardId, Value)>,
    cancel: CancellationToken,
}

impl WsHandle {
    /// Update session bookkeeping for an inbound event, then broadcast it.
    fn apply_event(&self, event: GatewayEvent) {
        match &event {
            GatewayEvent::Ready {
                user_id,
                session_token,
                shard_count,
            } => {
                *self.session.write() = Some(SessionInfo {
                    user_id: *user_id,
                    session_token: session_token.clone(),
                    shard_count: *shard_count,
                });
            }
            GatewayEvent::GuildCreate { guild_id } => {
                let _ = self.shards.assign(*guild_id);
            }
            GatewayEvent::GuildDelete { guild_id } => {
                self.shards.remove(*guild_id);
            }
            GatewayEvent::ShardDisconnected { shard, .. } => {
                self.shards.remove_shard(*shard);
            }
            _ => {}
        }
        let _ = self.event_tx.send(event);
    }
}

#[async_trait]
impl GatewayHandle for WsHandle {
    fn events(&self) -> broadcast::Receiver<GatewayEvent> {
        self.event_tx.subscribe()
    }

    fn session(&self) -> Option<SessionInfo> {
        self.session.read().clone()
    }

    fn shard_for(&self, guild: GuildId) -> Option<ShardId> {
        self.shards.get(guild)
    }

    async fn send(&self, shard: ShardId, payload: Value) -> Result<(), GatewayError> {
        if self.cancel.is_cancelled() {
            return Err(GatewayError::NotConnected);
        }
        self.out_tx
            .send((shard, payload))
            .await
            .map_err(|_| GatewayError::NotConnected)
    }

    async fn disconnect(&self) {
        info!("gateway disconnect requested, reconnect disabled");
        self.cancel.cancel();
        *self.session.write() = None;
    }
}

/// Owns one session's connection lifecycle across reconnects.
struct SessionDriver {
    url: String,
    token: String,
    shard_count: u32,
    handle: Arc<WsHandle>,
}

enum PumpEnd {
    /// Explicit disconnect; do not reconnect.
    Cancelled,
    /// Transport dropped unexpectedly; reconnect.
    Dropped,
}

impl SessionDriver {
    async fn run(self, initial: WsStream, mut out_rx: mpsc::Receiver<(ShardId, Value)>) {
        let mut backoff = Backoff::reconnect();
        let mut stream = Some(initial);

        loop {
            let mut ws = match stream.take() {
                Some(ws) => ws,
                None => {
                    if self.handle.cancel.is_cancelled() {
                        break;
                    }
                    let delay = backoff.next_delay();
                    warn!(
                        attempt = backoff.attempt(),
                        delay_ms = delay.as_millis() as u64,
                        "gateway dropped, reconnecting"
                    );
                    tokio::select! {
                        () = tokio::time::sleep(delay) => {}
                        () = self.handle.cancel.cancelled() => break,
                    }
                    match open_and_identify(&self.url, &self.token, self.shard_count).await {
                        Ok(ws) => {
                            backoff.reset();
                            info!("gateway reconnected");
                            ws
                        }
                        Err(error) => {
                            warn!(%error, "gateway reconnect attempt failed");
                            continue;
                        }
                    }
                }
            };

            match self.pump(&mut ws, &mut out_rx).await {
                PumpEnd::Cancelled => {
                    let _ = ws.close(None).await;
                    break;
                }
                PumpEnd::Dropped => {}
            }
        }
        debug!("gateway session driver exited");
    }

    /// Pump one live connection until it drops or the session is closed.
    async fn pump(
        &self,
        ws: &mut WsStream,
        out_rx: &mut mpsc::Receiver<(ShardId, Value)>,
    ) -> PumpEnd {
        loop {
            tokio::select! {
                () = self.handle.cancel.cancelled() => return PumpEnd::Cancelled,

                outbound = out_rx.recv() => {
                    let Some((shard, payload)) = outbound else {
                        // All senders gone: the handle itself was dropped.
                        return PumpEnd::Cancelled;
                    };
                    let frame = json!({"op": "packet", "shard": shard.get(), "d": payload});
                    if let Err(error) = ws.send(Message::Text(frame.to_string().into())).await {
                        debug!(%error, "dropped outbound packet on dead link");
                        return PumpEnd::Dropped;
                    }
                }

                inbound = ws.next() => {
                    match inbound {
                        Some(Ok(Message::Text(text))) => {
                            if let Some(event) = decode_frame(text.as_str()) {
                                self.handle.apply_event(event);
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            if ws.send(Message::Pong(data)).await.is_err() {
                                return PumpEnd::Dropped;
                            }
                        }
                        Some(Ok(Message::Close(frame))) => {
                            debug!(?frame, "gateway sent close");
                            return PumpEnd::Dropped;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(error)) => {
                            warn!(%error, "gateway read error");
                            return PumpEnd::Dropped;
                        }
                        None => return PumpEnd::Dropped,
                    }
                }
            }
        }
    }
}

/// Open the socket and send the identify envelope.
async fn open_and_identify(
    url: &str,
    token: &str,
    shard_count: u32,
) -> Result<WsStream, GatewayError> {
    let (mut ws, _response) = connect_async(url)
        .await
        .map_err(|e| GatewayError::Handshake(e.to_string()))?;
    let identify = json!({
        "op": "identify",
        "d": {"token": token, "shards": shard_count},
    });
    ws.send(Message::Text(identify.to_string().into())).await?;
    Ok(ws)
}

/// Decode one inbound frame; unknown ops and malformed frames are dropped
/// with a log line rather than killing the connection.
fn decode_frame(text: &str) -> Option<GatewayEvent> {
    let value: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(error) => {
            warn!(%error, "discarding unparseable gateway frame");
            return None;
        }
    };
    match value.get("op").and_then(Value::as_str) {
        Some("dispatch") => {
            let payload = value.get("d").cloned().unwrap_or(Value::Null);
            match serde_json::from_value(payload) {
                Ok(event) => Some(event),
                Err(error) => {
                    warn!(%error, "discarding undecodable dispatch frame");
                    None
                }
            }
        }
        op => {
            debug!(?op, "ignoring non-dispatch frame");
            None
        }
    }
}

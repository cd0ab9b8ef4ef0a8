//! One remote audio-processing node.
//!
//! Each node gets a websocket control channel (authenticated with the
//! node password and the owning session identity) and a REST surface for
//! track resolution. The control channel maintains itself: an unexpected
//! drop marks the node unavailable and retries on a node-local schedule —
//! other nodes never notice.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use serde::Deserialize;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use croon_core::{GuildId, NodeId, UserId};
use croon_settings::NodeSettings;

use crate::errors::AudioError;

/// Control channel event capacity.
const EVENT_CAPACITY: usize = 128;
/// Outbound op buffer per node.
const OP_CAPACITY: usize = 64;
/// Node-local reconnect cap.
const RETRY_CAP: Duration = Duration::from_secs(16);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Inbound event from a node's control channel.
#[derive(Clone, Debug, PartialEq)]
pub enum NodeEvent {
    /// Periodic player state push.
    PlayerUpdate {
        /// Guild whose player updated.
        guild_id: GuildId,
        /// Playback position in milliseconds.
        position_ms: u64,
    },
    /// A track stopped playing.
    TrackEnd {
        /// Guild whose track ended.
        guild_id: GuildId,
        /// Track identifier.
        track: String,
        /// Node-reported end reason.
        reason: String,
    },
    /// Node load statistics.
    Stats {
        /// Players the node is serving (across all sessions).
        players: u32,
        /// CPU load, 0.0–1.0.
        cpu_load: f64,
    },
}

/// A resolved track from the node's REST surface.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct TrackInfo {
    /// Opaque playable identifier.
    pub track: String,
    /// Human-readable title.
    pub title: String,
    /// Track length in milliseconds.
    pub length_ms: u64,
}

/// A single remote audio node.
pub struct NodeConnection {
    id: NodeId,
    settings: NodeSettings,
    user_id: UserId,
    op_tx: mpsc::Sender<Value>,
    available: AtomicBool,
    event_tx: broadcast::Sender<NodeEvent>,
    http: reqwest::Client,
    cancel: CancellationToken,
}

impl NodeConnection {
    /// Create a node handle and spawn its connection maintenance task.
    #[must_use]
    pub fn start(settings: NodeSettings, user_id: UserId) -> Arc<Self> {
        let (op_tx, op_rx) = mpsc::channel(OP_CAPACITY);
        let (event_tx, _) = broadcast::channel(EVENT_CAPACITY);
        let node = Arc::new(Self {
            id: NodeId::new(&settings.host, settings.port),
            settings,
            user_id,
            op_tx,
            available: AtomicBool::new(false),
            event_tx,
            http: reqwest::Client::new(),
            cancel: CancellationToken::new(),
        });
        drop(tokio::spawn(Arc::clone(&node).maintain(op_rx)));
        node
    }

    /// This node's identifier.
    #[must_use]
    pub fn id(&self) -> &NodeId {
        &self.id
    }

    /// Whether the control channel is currently up.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    /// Subscribe to this node's control events.
    pub fn events(&self) -> broadcast::Receiver<NodeEvent> {
        self.event_tx.subscribe()
    }

    /// Send a control op to the node.
    pub async fn send_op(&self, op: Value) -> Result<(), AudioError> {
        if !self.is_available() {
            return Err(AudioError::NodeUnavailable(self.id.clone()));
        }
        self.op_tx
            .send(op)
            .await
            .map_err(|_| AudioError::NodeUnavailable(self.id.clone()))
    }

    /// Resolve a search term or URL into playable tracks via REST.
    pub async fn resolve_tracks(&self, identifier: &str) -> Result<Vec<TrackInfo>, AudioError> {
        let url = loadtracks_url(&self.settings.host, self.settings.port, identifier);
        let response = self
            .http
            .get(&url)
            .header("Authorization", &self.settings.password)
            .send()
            .await?
            .error_for_status()?;
        let body: LoadTracksResponse = response.json().await?;
        Ok(body
            .tracks
            .into_iter()
            .map(|t| TrackInfo {
                track: t.track,
                title: t.info.title,
                length_ms: t.info.length,
            })
            .collect())
    }

    /// Tear down the control channel permanently.
    pub fn shutdown(&self) {
        self.cancel.cancel();
        self.available.store(false, Ordering::SeqCst);
    }

    // ─────────────────────────────────────────────────────────────────────
    // Connection maintenance
    // ─────────────────────────────────────────────────────────────────────

    async fn maintain(self: Arc<Self>, mut op_rx: mpsc::Receiver<Value>) {
        let mut attempt: u32 = 0;
        loop {
            if self.cancel.is_cancelled() {
                break;
            }
            match self.open().await {
                Ok(ws) => {
                    attempt = 0;
                    self.available.store(true, Ordering::SeqCst);
                    info!(node = %self.id, "audio node connected");
                    let cancelled = self.pump(ws, &mut op_rx).await;
                    self.available.store(false, Ordering::SeqCst);
                    if cancelled {
                        break;
                    }
                    warn!(node = %self.id, "audio node control channel dropped");
                }
                Err(error) => {
                    warn!(node = %self.id, %error, "audio node connect failed");
                }
            }
            attempt = attempt.saturating_add(1);
            let delay = Duration::from_secs(1u64 << attempt.min(4)).min(RETRY_CAP);
            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = self.cancel.cancelled() => break,
            }
        }
        debug!(node = %self.id, "audio node maintenance exited");
    }

    async fn open(&self) -> Result<WsStream, AudioError> {
        let url = format!("ws://{}:{}/", self.settings.host, self.settings.port);
        let mut request = url.into_client_request()?;
        let headers = request.headers_mut();
        let _ = headers.insert(
            "Authorization",
            HeaderValue::from_str(&self.settings.password)
                .map_err(|e| AudioError::Handshake(e.to_string()))?,
        );
        let _ = headers.insert(
            "User-Id",
            HeaderValue::from_str(&self.user_id.to_string())
                .map_err(|e| AudioError::Handshake(e.to_string()))?,
        );
        let _ = headers.insert(
            "Num-Shards",
            HeaderValue::from_str(&self.settings.shard_count.to_string())
                .map_err(|e| AudioError::Handshake(e.to_string()))?,
        );
        let (ws, _response) = connect_async(request)
            .await
            .map_err(|e| AudioError::Handshake(e.to_string()))?;
        Ok(ws)
    }

    /// Pump one live control channel; returns `true` on explicit shutdown.
    async fn pump(&self, mut ws: WsStream, op_rx: &mut mpsc::Receiver<Value>) -> bool {
        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    let _ = ws.close(None).await;
                    return true;
                }

                op = op_rx.recv() => {
                    let Some(op) = op else { return true };
                    if let Err(error) = ws.send(Message::Text(op.to_string().into())).await {
                        debug!(node = %self.id, %error, "dropped op on dead control channel");
                        return false;
                    }
                }

                frame = ws.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            if let Some(event) = decode_node_frame(text.as_str()) {
                                let _ = self.event_tx.send(event);
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            if ws.send(Message::Pong(data)).await.is_err() {
                                return false;
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => return false,
                        Some(Ok(_)) => {}
                        Some(Err(error)) => {
                            warn!(node = %self.id, %error, "audio node read error");
                            return false;
                        }
                    }
                }
            }
        }
    }
}

/// REST URL for track resolution, identifier percent-encoded.
#[must_use]
pub fn loadtracks_url(host: &str, port: u16, identifier: &str) -> String {
    let encoded = utf8_percent_encode(identifier, NON_ALPHANUMERIC);
    format!("http://{host}:{port}/loadtracks?identifier={encoded}")
}

/// Decode one inbound control frame; unknown shapes are ignored.
fn decode_node_frame(text: &str) -> Option<NodeEvent> {
    let value: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(error) => {
            warn!(%error, "discarding unparseable node frame");
            return None;
        }
    };
    let guild = || {
        value
            .get("guildId")
            .and_then(Value::as_u64)
            .map(GuildId::new)
    };
    match value.get("op").and_then(Value::as_str) {
        Some("playerUpdate") => Some(NodeEvent::PlayerUpdate {
            guild_id: guild()?,
            position_ms: value
                .pointer("/state/position")
                .and_then(Value::as_u64)
                .unwrap_or(0),
        }),
        Some("event") if value.get("type").and_then(Value::as_str) == Some("TrackEnd") => {
            Some(NodeEvent::TrackEnd {
                guild_id: guild()?,
                track: value.get("track")?.as_str()?.to_string(),
                reason: value
                    .get("reason")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown")
                    .to_string(),
            })
        }
        Some("stats") => Some(NodeEvent::Stats {
            players: value.get("players").and_then(Value::as_u64).unwrap_or(0) as u32,
            cpu_load: value
                .pointer("/cpu/load")
                .and_then(Value::as_f64)
                .unwrap_or(0.0),
        }),
        op => {
            debug!(?op, "ignoring unknown node frame");
            None
        }
    }
}

#[derive(Deserialize)]
struct LoadTracksResponse {
    #[serde(default)]
    tracks: Vec<LoadedTrack>,
}

#[derive(Deserialize)]
struct LoadedTrack {
    track: String,
    info: LoadedTrackInfo,
}

#[derive(Deserialize)]
struct LoadedTrackInfo {
    title: String,
    length: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_hdr_async;
    use tokio_tungstenite::tungstenite::handshake::server::{
        ErrorResponse, Request, Response,
    };

    fn test_settings(port: u16) -> NodeSettings {
        NodeSettings {
            host: "127.0.0.1".to_string(),
            port,
            password: "node-pass".to_string(),
            shard_count: 1,
        }
    }

    /// Scripted node: verifies auth headers, emits a playerUpdate, then
    /// forwards the first op it receives.
    async fn scripted_node(
        listener: TcpListener,
        op_tx: tokio::sync::oneshot::Sender<Value>,
    ) {
        let (stream, _) = listener.accept().await.unwrap();
        let check = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
            assert_eq!(req.headers()["Authorization"], "node-pass");
            assert_eq!(req.headers()["User-Id"], "42");
            Ok(resp)
        };
        let mut ws = accept_hdr_async(stream, check).await.unwrap();

        let update = json!({"op": "playerUpdate", "guildId": 7, "state": {"position": 1500}});
        ws.send(Message::Text(update.to_string().into()))
            .await
            .unwrap();

        while let Some(Ok(msg)) = ws.next().await {
            if let Message::Text(text) = msg {
                op_tx
                    .send(serde_json::from_str(text.as_str()).unwrap())
                    .unwrap();
                break;
            }
        }
    }

    async fn wait_available(node: &NodeConnection) {
        for _ in 0..100 {
            if node.is_available() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("node never became available");
    }

    #[tokio::test]
    async fn connects_receives_events_and_sends_ops() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (op_tx, op_rx) = tokio::sync::oneshot::channel();
        let server = tokio::spawn(scripted_node(listener, op_tx));

        let node = NodeConnection::start(test_settings(port), UserId::new(42));
        let mut events = node.events();
        wait_available(&node).await;

        let event = events.recv().await.unwrap();
        assert_eq!(
            event,
            NodeEvent::PlayerUpdate {
                guild_id: GuildId::new(7),
                position_ms: 1500,
            }
        );

        node.send_op(json!({"op": "play", "guildId": 7, "track": "abc"}))
            .await
            .unwrap();
        let received = op_rx.await.unwrap();
        assert_eq!(received["op"], "play");

        node.shutdown();
        server.await.unwrap();
    }

    #[tokio::test]
    async fn unreachable_node_is_unavailable_and_rejects_ops() {
        // Bind-then-drop: nothing listens on this port.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let node = NodeConnection::start(test_settings(port), UserId::new(42));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!node.is_available());
        let result = node.send_op(json!({"op": "stop"})).await;
        assert!(matches!(result, Err(AudioError::NodeUnavailable(_))));
        node.shutdown();
    }

    #[test]
    fn loadtracks_url_encodes_identifier() {
        let url = loadtracks_url("localhost", 2333, "ytsearch: never gonna");
        assert_eq!(
            url,
            "http://localhost:2333/loadtracks?identifier=ytsearch%3A%20never%20gonna"
        );
    }

    #[test]
    fn decode_track_end_frame() {
        let text = r#"{"op": "event", "type": "TrackEnd", "guildId": 3, "track": "abc", "reason": "finished"}"#;
        assert_eq!(
            decode_node_frame(text),
            Some(NodeEvent::TrackEnd {
                guild_id: GuildId::new(3),
                track: "abc".to_string(),
                reason: "finished".to_string(),
            })
        );
    }

    #[test]
    fn decode_stats_frame() {
        let text = r#"{"op": "stats", "players": 12, "cpu": {"load": 0.25}}"#;
        assert_eq!(
            decode_node_frame(text),
            Some(NodeEvent::Stats {
                players: 12,
                cpu_load: 0.25,
            })
        );
    }

    #[test]
    fn decode_ignores_unknown() {
        assert!(decode_node_frame("garbage").is_none());
        assert!(decode_node_frame(r#"{"op": "mystery"}"#).is_none());
    }
}

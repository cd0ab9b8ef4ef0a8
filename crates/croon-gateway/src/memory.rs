//! In-process gateway double.
//!
//! Deterministic stand-in for the websocket transport: tests (and the
//! binary's `--offline` mode) inject events by hand and inspect every
//! packet the runtime sent. No timers, no sockets.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::debug;

use croon_core::{GatewayEvent, GuildId, ShardId, UserId};

use crate::errors::GatewayError;
use crate::shard::ShardMap;
use crate::traits::{Gateway, GatewayHandle, SessionInfo};

/// Event channel capacity; matches the ws transport.
const EVENT_CAPACITY: usize = 256;

/// A gateway whose sessions are driven entirely by the caller.
pub struct InMemoryGateway {
    auto_ready: bool,
    fail_next: AtomicBool,
    connect_count: AtomicU32,
    last: Mutex<Option<Arc<InMemoryHandle>>>,
}

impl InMemoryGateway {
    /// A gateway that stays silent until events are injected.
    #[must_use]
    pub fn new() -> Self {
        Self {
            auto_ready: false,
            fail_next: AtomicBool::new(false),
            connect_count: AtomicU32::new(0),
            last: Mutex::new(None),
        }
    }

    /// A gateway that emits `ready` shortly after each connect — enough
    /// for an offline run to reach a live state without a platform.
    #[must_use]
    pub fn auto_ready() -> Self {
        Self {
            auto_ready: true,
            ..Self::new()
        }
    }

    /// Make the next `connect` fail with a handshake error.
    pub fn fail_next_connect(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    /// Number of successful connects so far.
    #[must_use]
    pub fn connect_count(&self) -> u32 {
        self.connect_count.load(Ordering::SeqCst)
    }

    /// The handle produced by the most recent connect.
    #[must_use]
    pub fn last_handle(&self) -> Option<Arc<InMemoryHandle>> {
        self.last.lock().clone()
    }
}

impl Default for InMemoryGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Gateway for InMemoryGateway {
    async fn connect(
        &self,
        token: &str,
        shard_count: u32,
    ) -> Result<Arc<dyn GatewayHandle>, GatewayError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(GatewayError::Handshake("simulated handshake failure".into()));
        }
        let n = self.connect_count.fetch_add(1, Ordering::SeqCst) + 1;
        let handle = Arc::new(InMemoryHandle::new(token, shard_count, n));
        *self.last.lock() = Some(Arc::clone(&handle));

        if self.auto_ready {
            let ready_handle = Arc::clone(&handle);
            drop(tokio::spawn(async move {
                tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                ready_handle.inject(GatewayEvent::Ready {
                    user_id: UserId::new(1),
                    session_token: format!("mem-session-{n}"),
                    shard_count: ready_handle.shards.shard_count(),
                });
            }));
        }
        Ok(handle)
    }
}

/// A live in-memory session.
pub struct InMemoryHandle {
    #[allow(dead_code)]
    token: String,
    event_tx: broadcast::Sender<GatewayEvent>,
    session: RwLock<Option<SessionInfo>>,
    shards: ShardMap,
    sent: Mutex<Vec<(ShardId, Value)>>,
    closed: AtomicBool,
}

impl InMemoryHandle {
    fn new(token: &str, shard_count: u32, _connection: u32) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            token: token.to_string(),
            event_tx,
            session: RwLock::new(None),
            shards: ShardMap::new(shard_count),
            sent: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Inject an inbound event, updating session bookkeeping exactly the
    /// way the ws transport does.
    pub fn inject(&self, event: GatewayEvent) {
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
        // No subscribers is fine (e.g. before the dispatcher spawns).
        let _ = self.event_tx.send(event);
    }

    /// Convenience: inject a `ready` for the given identity.
    pub fn emit_ready(&self, user_id: UserId, session_token: &str) {
        self.inject(GatewayEvent::Ready {
            user_id,
            session_token: session_token.to_string(),
            shard_count: self.shards.shard_count(),
        });
    }

    /// Map a guild onto its shard (as a `guild_create` would).
    pub fn add_guild(&self, guild: GuildId) -> ShardId {
        let shard = self.shards.assign(guild);
        let _ = self.event_tx.send(GatewayEvent::GuildCreate { guild_id: guild });
        shard
    }

    /// Every packet sent through this handle, in order.
    #[must_use]
    pub fn sent(&self) -> Vec<(ShardId, Value)> {
        self.sent.lock().clone()
    }

    /// Whether `disconnect` was called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GatewayHandle for InMemoryHandle {
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
        if self.closed.load(Ordering::SeqCst) {
            return Err(GatewayError::NotConnected);
        }
        self.sent.lock().push((shard, payload));
        Ok(())
    }

    async fn disconnect(&self) {
        debug!("in-memory gateway disconnected");
        self.closed.store(true, Ordering::SeqCst);
        *self.session.write() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use croon_core::events::message_event;
    use croon_core::ChannelId;

    #[tokio::test]
    async fn connect_then_ready_populates_session() {
        let gateway = InMemoryGateway::new();
        let handle = gateway.connect("tok", 2).await.unwrap();
        assert!(handle.session().is_none());

        let mem = gateway.last_handle().unwrap();
        mem.emit_ready(UserId::new(42), "sess-token");
        let session = handle.session().unwrap();
        assert_eq!(session.user_id, UserId::new(42));
        assert_eq!(session.shard_count, 2);
    }

    #[tokio::test]
    async fn injected_events_reach_subscribers() {
        let gateway = InMemoryGateway::new();
        let handle = gateway.connect("tok", 1).await.unwrap();
        let mut rx = handle.events();

        let mem = gateway.last_handle().unwrap();
        mem.inject(message_event(
            GuildId::new(1),
            ChannelId::new(2),
            UserId::new(3),
            "hi",
        ));
        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type(), "message_create");
    }

    #[tokio::test]
    async fn guild_lifecycle_updates_shard_map() {
        let gateway = InMemoryGateway::new();
        let handle = gateway.connect("tok", 2).await.unwrap();
        let mem = gateway.last_handle().unwrap();

        let guild = GuildId::new(5 << 22);
        let shard = mem.add_guild(guild);
        assert_eq!(handle.shard_for(guild), Some(shard));

        mem.inject(GatewayEvent::GuildDelete { guild_id: guild });
        assert_eq!(handle.shard_for(guild), None);
    }

    #[tokio::test]
    async fn send_after_disconnect_errors() {
        let gateway = InMemoryGateway::new();
        let handle = gateway.connect("tok", 1).await.unwrap();
        handle
            .send(ShardId::new(0), serde_json::json!({"op": 4}))
            .await
            .unwrap();
        handle.disconnect().await;
        let result = handle
            .send(ShardId::new(0), serde_json::json!({"op": 4}))
            .await;
        assert_matches!(result, Err(GatewayError::NotConnected));

        let mem = gateway.last_handle().unwrap();
        assert_eq!(mem.sent().len(), 1);
        assert!(mem.is_closed());
    }

    #[tokio::test]
    async fn fail_next_connect_fails_once() {
        let gateway = InMemoryGateway::new();
        gateway.fail_next_connect();
        assert_matches!(
            gateway.connect("tok", 1).await,
            Err(GatewayError::Handshake(_))
        );
        assert!(gateway.connect("tok", 1).await.is_ok());
        assert_eq!(gateway.connect_count(), 1);
    }
}

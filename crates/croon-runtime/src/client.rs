//! The orchestrator.
//!
//! `Client` is the single point of truth for process lifecycle and the
//! only component that mutates session state. Everything else receives
//! narrow capabilities from it: the packet-send bridge, the storage
//! handle, the redactor, the translation catalog.
//!
//! Lifecycle: `bootstrap()` wires subsystems in dependency order and
//! opens the session; the asynchronous ready transition starts scheduled
//! tasks and (re)builds the audio cluster bridge; `destroy()` tears
//! everything down without auto-reconnect; `reboot()` is the emergency
//! path — destroy, cool down, bootstrap again, degrading to "try again"
//! rather than "stay dead".

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use metrics::counter;
use parking_lot::{Mutex, RwLock};
use serde_json::{Value, json};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use croon_audio::{ClusterBridge, PlayerRegistry};
use croon_core::redact::SecretRedactor;
use croon_core::{ConnectionState, GatewayEvent, GuildId, Message, PacketSender, UserId};
use croon_gateway::{Gateway, GatewayHandle};
use croon_plugins::{CommandInvocation, Plugin, PluginContext, PluginRegistry};
use croon_settings::{CroonSettings, TranslationCatalog};
use croon_storage::StorageManager;

use crate::errors::RuntimeError;
use crate::tasks::{Scheduler, TaskContext, TaskDescriptor};

/// Guild-routed packet bridge handed to the audio bridge and plugins.
///
/// Looks up the guild's shard at send time; an unmapped guild drops the
/// packet silently — voice control legitimately races shard availability
/// during reconnects, and a dropped control packet is recoverable.
struct ShardSender {
    handle: Arc<RwLock<Option<Arc<dyn GatewayHandle>>>>,
}

#[async_trait]
impl PacketSender for ShardSender {
    async fn send_packet(&self, guild: GuildId, payload: Value) {
        let handle = { self.handle.read().clone() };
        let Some(handle) = handle else {
            debug!(guild_id = %guild, "no gateway session, dropping packet");
            return;
        };
        match handle.shard_for(guild) {
            Some(shard) => {
                if let Err(error) = handle.send(shard, payload).await {
                    debug!(guild_id = %guild, %error, "packet send failed");
                }
            }
            None => {
                debug!(guild_id = %guild, "no shard mapped for guild, dropping packet");
            }
        }
    }
}

/// The client orchestration core.
pub struct Client {
    settings: CroonSettings,
    gateway: Arc<dyn Gateway>,
    storage: Arc<StorageManager>,
    plugins: Vec<Arc<dyn Plugin>>,
    registry: RwLock<Arc<PluginRegistry>>,
    scheduler: Scheduler,
    players: Arc<PlayerRegistry>,
    catalog: Arc<TranslationCatalog>,
    /// Redactor over the configured credential set only.
    base_redactor: SecretRedactor,
    /// Live redactor: base plus the current session token.
    redactor: RwLock<SecretRedactor>,
    state: Mutex<ConnectionState>,
    handle_slot: Arc<RwLock<Option<Arc<dyn GatewayHandle>>>>,
    sender: Arc<ShardSender>,
    /// The active cluster bridge; replaced wholesale on every ready.
    bridge: Mutex<Option<Arc<ClusterBridge>>>,
    dispatcher: Mutex<Option<CancellationToken>>,
    started_at: Instant,
}

impl Client {
    /// Compose a client from its collaborators.
    ///
    /// Nothing connects yet; that happens in [`bootstrap`](Self::bootstrap).
    pub fn new(
        settings: CroonSettings,
        gateway: Arc<dyn Gateway>,
        plugins: Vec<Arc<dyn Plugin>>,
        tasks: Vec<Arc<dyn TaskDescriptor>>,
    ) -> Result<Arc<Self>, RuntimeError> {
        let catalog = Arc::new(TranslationCatalog::load(None, &settings.bot.locale)?);
        let base_redactor = SecretRedactor::new(settings.credentials().secrets())?;
        let storage = Arc::new(StorageManager::new(settings.storage.path.clone()));
        let handle_slot: Arc<RwLock<Option<Arc<dyn GatewayHandle>>>> =
            Arc::new(RwLock::new(None));
        let sender = Arc::new(ShardSender {
            handle: Arc::clone(&handle_slot),
        });

        Ok(Arc::new(Self {
            settings,
            gateway,
            storage,
            plugins,
            registry: RwLock::new(Arc::new(PluginRegistry::new())),
            scheduler: Scheduler::new(tasks),
            players: Arc::new(PlayerRegistry::new()),
            catalog,
            redactor: RwLock::new(base_redactor.clone()),
            base_redactor,
            state: Mutex::new(ConnectionState::Disconnected),
            handle_slot,
            sender,
            bridge: Mutex::new(None),
            dispatcher: Mutex::new(None),
            started_at: Instant::now(),
        }))
    }

    // ─────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────

    /// Start subsystems and open the remote session.
    ///
    /// Start order is load-bearing: plugin/event wiring must exist before
    /// the session goes live, because `ready` can arrive at any point
    /// after connect. Resolves once the transport reports *connected*;
    /// the ready transition happens asynchronously via the dispatcher.
    #[instrument(skip(self))]
    pub async fn bootstrap(self: &Arc<Self>) -> Result<(), RuntimeError> {
        self.settings.validate()?;
        {
            let mut state = self.state.lock();
            if *state != ConnectionState::Disconnected {
                return Err(RuntimeError::AlreadyRunning);
            }
            *state = state.transition_to(ConnectionState::Connecting)?;
        }

        let mut registry = PluginRegistry::new();
        for plugin in &self.plugins {
            registry.register(Arc::clone(plugin));
        }
        registry.start();
        *self.registry.write() = Arc::new(registry);

        let dispatcher_token = CancellationToken::new();
        if let Some(old) = self
            .dispatcher
            .lock()
            .replace(dispatcher_token.clone())
        {
            old.cancel();
        }

        self.scheduler.start()?;
        self.storage.connect()?;

        let handle = match self
            .gateway
            .connect(&self.settings.gateway.token, self.settings.gateway.shard_count)
            .await
        {
            Ok(handle) => handle,
            Err(error) => {
                *self.state.lock() = ConnectionState::Disconnected;
                return Err(error.into());
            }
        };
        let events = handle.events();
        *self.handle_slot.write() = Some(Arc::clone(&handle));
        info!("gateway session opened");

        drop(tokio::spawn(run_dispatcher(
            Arc::clone(self),
            events,
            dispatcher_token,
        )));
        Ok(())
    }

    /// The ready transition. Fires once per successful (re)connection and
    /// is safe to invoke any number of times: tasks are re-run under a
    /// fresh epoch (previous loops cancelled) and the cluster bridge is
    /// **replaced**, never duplicated.
    #[instrument(skip(self, session_token))]
    pub async fn on_ready(self: &Arc<Self>, user_id: UserId, session_token: &str) {
        {
            let mut state = self.state.lock();
            if *state != ConnectionState::Ready {
                match state.transition_to(ConnectionState::Ready) {
                    Ok(next) => *state = next,
                    Err(error) => {
                        warn!(%error, "ignoring ready in unexpected state");
                        return;
                    }
                }
            }
        }
        info!(user_id = %user_id, "session ready");

        // The session token is a secret from this moment on.
        match self.base_redactor.with_secret(session_token) {
            Ok(extended) => *self.redactor.write() = extended,
            Err(error) => error!(%error, "failed to extend redactor with session token"),
        }

        let Some(handle) = self.handle() else {
            warn!("ready received without a live gateway handle");
            return;
        };

        let ctx = TaskContext {
            storage: Arc::clone(&self.storage),
            sender: self.packet_sender(),
            players: Arc::clone(&self.players),
            catalog: Arc::clone(&self.catalog),
            handle,
            user_id,
        };
        self.scheduler.run_ready(&ctx).await;

        let bridge = Arc::new(ClusterBridge::new(
            user_id,
            &self.settings.cluster,
            Arc::clone(&self.players),
            self.packet_sender(),
        ));
        if let Some(old) = self.bridge.lock().replace(bridge) {
            // In-flight dispatches may still hold the old Arc briefly;
            // shutting it down here makes the replacement immediate.
            old.shutdown();
        }
    }

    /// Disconnect the session (no auto-reconnect) and tear down storage.
    ///
    /// Never fails: safe when not connected, errors are logged.
    pub async fn destroy(&self) {
        info!("destroying client session");
        if let Some(token) = self.dispatcher.lock().take() {
            token.cancel();
        }
        self.scheduler.stop();
        if let Some(bridge) = self.bridge.lock().take() {
            bridge.shutdown();
        }
        let handle = self.handle_slot.write().take();
        if let Some(handle) = handle {
            handle.disconnect().await;
        }
        self.storage.destroy();
        *self.state.lock() = ConnectionState::Disconnected;
    }

    /// Emergency restart: destroy, cool down, bootstrap again.
    ///
    /// `destroy` cannot fail and the cool-down always elapses, so this
    /// path degrades to "try again" rather than "stay dead".
    pub async fn reboot(self: &Arc<Self>) -> Result<(), RuntimeError> {
        warn!(
            cooldown_ms = self.settings.bot.reboot_cooldown_ms,
            "emergency reboot requested"
        );
        counter!("client_reboots_total").increment(1);
        self.destroy().await;
        self.sleep(self.settings.bot.reboot_cooldown_ms).await;
        self.bootstrap().await
    }

    /// Suspend the calling flow for `ms` milliseconds without blocking
    /// unrelated concurrent work.
    pub async fn sleep(&self, ms: u64) {
        tokio::time::sleep(std::time::Duration::from_millis(ms)).await;
    }

    /// Scrub every configured secret (and the live session token) out of
    /// `text`. Anything leaving the process goes through here.
    #[must_use]
    pub fn redact(&self, text: &str) -> String {
        self.redactor.read().redact(text)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    /// The live gateway handle, if any.
    #[must_use]
    pub fn handle(&self) -> Option<Arc<dyn GatewayHandle>> {
        self.handle_slot.read().clone()
    }

    /// Active voice players (read access for handlers and tooling).
    #[must_use]
    pub fn players(&self) -> &Arc<PlayerRegistry> {
        &self.players
    }

    /// The active cluster bridge, if the session is ready.
    #[must_use]
    pub fn bridge(&self) -> Option<Arc<ClusterBridge>> {
        self.bridge.lock().clone()
    }

    /// The guild-routed packet capability.
    #[must_use]
    pub fn packet_sender(&self) -> Arc<dyn PacketSender> {
        Arc::clone(&self.sender) as Arc<dyn PacketSender>
    }

    // ─────────────────────────────────────────────────────────────────────
    // Event handling
    // ─────────────────────────────────────────────────────────────────────

    async fn handle_gateway_event(self: &Arc<Self>, event: GatewayEvent) {
        match &event {
            GatewayEvent::Ready {
                user_id,
                session_token,
                ..
            } => {
                self.on_ready(*user_id, session_token).await;
            }
            GatewayEvent::Resumed => {
                let mut state = self.state.lock();
                if *state == ConnectionState::Reconnecting {
                    *state = ConnectionState::Ready;
                    info!("session resumed");
                }
            }
            GatewayEvent::ShardDisconnected { shard, code } => {
                counter!("gateway_shard_drops_total").increment(1);
                let mut state = self.state.lock();
                if *state == ConnectionState::Ready {
                    *state = ConnectionState::Reconnecting;
                    warn!(shard = %shard, ?code, "shard dropped, session reconnecting");
                }
            }
            GatewayEvent::MessageCreate { message } => {
                if !message.author_bot {
                    self.dispatch_message(message.clone());
                }
            }
            _ => {}
        }

        // Voice routing through the active bridge.
        let bridge = self.bridge.lock().clone();
        if let Some(bridge) = bridge {
            bridge.handle_event(&event).await;
        }

        // Plugin event fan-out.
        let registry = self.registry.read().clone();
        if registry.is_started() {
            let ctx = self.plugin_context();
            registry.dispatch_event(&ctx, &event).await;
        }
    }

    /// Run a command dispatch as its own task so a slow handler never
    /// delays the event loop.
    fn dispatch_message(self: &Arc<Self>, message: Message) {
        let client = Arc::clone(self);
        drop(tokio::spawn(async move {
            let ctx = client.plugin_context();
            let prefix = ctx
                .effective_prefix(message.guild_id)
                .unwrap_or_else(|_| ctx.default_prefix.clone());
            let Some(invocation) = CommandInvocation::parse(&prefix, &message) else {
                return;
            };
            let registry = client.registry.read().clone();
            let Some(reply) = registry.dispatch_command(&ctx, &invocation).await else {
                return;
            };
            client.send_reply(&message, &reply.content).await;
        }));
    }

    async fn send_reply(&self, message: &Message, content: &str) {
        let Some(guild) = message.guild_id else {
            debug!("dropping reply outside guild context");
            return;
        };
        // Redaction guarantee: no reply leaves without passing through.
        let content = self.redact(content);
        self.sender
            .send_packet(
                guild,
                json!({
                    "op": "message",
                    "d": {"channelId": message.channel_id, "content": content},
                }),
            )
            .await;
    }

    fn plugin_context(&self) -> PluginContext {
        PluginContext {
            storage: Arc::clone(&self.storage),
            catalog: Arc::clone(&self.catalog),
            redactor: self.redactor.read().clone(),
            sender: self.packet_sender(),
            players: Arc::clone(&self.players),
            bridge: self.bridge.lock().clone(),
            default_prefix: self.settings.bot.prefix.clone(),
            started_at: self.started_at,
        }
    }
}

/// Forward inbound gateway events to the client until cancelled.
async fn run_dispatcher(
    client: Arc<Client>,
    mut events: broadcast::Receiver<GatewayEvent>,
    cancel: CancellationToken,
) {
    debug!("event dispatcher started");
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            event = events.recv() => match event {
                Ok(event) => client.handle_gateway_event(event).await,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event dispatcher lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
    debug!("event dispatcher exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use croon_core::ChannelId;
    use croon_core::events::message_event;
    use croon_gateway::InMemoryGateway;
    use croon_plugins::Reply;
    use croon_plugins::builtin::{PingPlugin, PrefixPlugin, UptimePlugin};

    fn test_settings() -> CroonSettings {
        let mut settings = CroonSettings::default();
        settings.gateway.token = "gw-token-abc".into();
        settings.storage.path = ":memory:".into();
        settings
    }

    fn test_plugins() -> Vec<Arc<dyn Plugin>> {
        vec![
            Arc::new(PingPlugin),
            Arc::new(UptimePlugin),
            Arc::new(PrefixPlugin),
        ]
    }

    fn test_client(gateway: &Arc<InMemoryGateway>) -> Arc<Client> {
        Client::new(
            test_settings(),
            Arc::clone(gateway) as Arc<dyn Gateway>,
            test_plugins(),
            vec![],
        )
        .unwrap()
    }

    async fn wait_for(mut condition: impl FnMut() -> bool) {
        for _ in 0..500 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition never became true");
    }

    #[tokio::test]
    async fn bootstrap_wires_subsystems_and_connects() {
        let gateway = Arc::new(InMemoryGateway::new());
        let client = test_client(&gateway);
        client.bootstrap().await.unwrap();

        assert_eq!(client.state(), ConnectionState::Connecting);
        assert!(client.storage.is_connected());
        assert!(client.registry.read().is_started());
        assert!(client.scheduler.is_started());
        assert_eq!(gateway.connect_count(), 1);
        // Not ready yet: no bridge.
        assert!(client.bridge().is_none());
    }

    #[tokio::test]
    async fn bootstrap_twice_is_rejected() {
        let gateway = Arc::new(InMemoryGateway::new());
        let client = test_client(&gateway);
        client.bootstrap().await.unwrap();
        assert!(matches!(
            client.bootstrap().await,
            Err(RuntimeError::AlreadyRunning)
        ));
    }

    #[tokio::test]
    async fn missing_token_is_fatal_at_bootstrap() {
        let gateway = Arc::new(InMemoryGateway::new());
        let mut settings = test_settings();
        settings.gateway.token = String::new();
        let client = Client::new(
            settings,
            Arc::clone(&gateway) as Arc<dyn Gateway>,
            vec![],
            vec![],
        )
        .unwrap();
        assert!(matches!(
            client.bootstrap().await,
            Err(RuntimeError::Settings(_))
        ));
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn failed_connect_returns_to_disconnected() {
        let gateway = Arc::new(InMemoryGateway::new());
        gateway.fail_next_connect();
        let client = test_client(&gateway);
        assert!(matches!(
            client.bootstrap().await,
            Err(RuntimeError::Gateway(_))
        ));
        assert_eq!(client.state(), ConnectionState::Disconnected);

        // The failure is recoverable: a fresh bootstrap succeeds.
        client.bootstrap().await.unwrap();
        assert_eq!(client.state(), ConnectionState::Connecting);
    }

    #[tokio::test]
    async fn ready_event_starts_tasks_and_builds_bridge() {
        let gateway = Arc::new(InMemoryGateway::new());
        let client = test_client(&gateway);
        client.bootstrap().await.unwrap();

        let mem = gateway.last_handle().unwrap();
        mem.emit_ready(UserId::new(7), "sess-secret-xyz");

        wait_for(|| client.state() == ConnectionState::Ready).await;
        wait_for(|| client.bridge().is_some()).await;

        // The session token joined the redaction set.
        assert_eq!(
            client.redact("leaked sess-secret-xyz here"),
            "leaked [redacted] here"
        );
        // The configured gateway token was already covered.
        assert_eq!(client.redact("gw-token-abc"), "[redacted]");
    }

    #[tokio::test]
    async fn double_ready_leaves_exactly_one_bridge() {
        let gateway = Arc::new(InMemoryGateway::new());
        let client = test_client(&gateway);
        client.bootstrap().await.unwrap();

        client.on_ready(UserId::new(7), "sess-a").await;
        let first = client.bridge().unwrap();

        // Simulate surviving voice state between reconnects.
        client.players.insert(croon_audio::Player::new(
            GuildId::new(11),
            croon_core::NodeId::new("n", 1),
        ));

        // Reconnect path re-enters ready.
        {
            let mut state = client.state.lock();
            *state = state.transition_to(ConnectionState::Reconnecting).unwrap();
        }
        client.on_ready(UserId::new(7), "sess-b").await;
        let second = client.bridge().unwrap();

        assert!(first.is_shutdown());
        assert!(!second.is_shutdown());
        assert!(!Arc::ptr_eq(&first, &second));
        // Players for unaffected guilds are not duplicated or dropped.
        assert_eq!(client.players.len(), 1);
    }

    #[tokio::test]
    async fn destroy_when_never_connected_is_noop() {
        let gateway = Arc::new(InMemoryGateway::new());
        let client = test_client(&gateway);
        client.destroy().await;
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn destroy_tears_everything_down() {
        let gateway = Arc::new(InMemoryGateway::new());
        let client = test_client(&gateway);
        client.bootstrap().await.unwrap();
        client.on_ready(UserId::new(7), "sess").await;

        client.destroy().await;
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert!(client.bridge().is_none());
        assert!(client.handle().is_none());
        assert!(!client.storage.is_connected());
        assert!(gateway.last_handle().unwrap().is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn reboot_waits_cooldown_then_bootstraps_again() {
        let gateway = Arc::new(InMemoryGateway::new());
        let client = test_client(&gateway);
        client.bootstrap().await.unwrap();
        client.on_ready(UserId::new(7), "sess").await;
        let first_handle = gateway.last_handle().unwrap();

        let before = tokio::time::Instant::now();
        client.reboot().await.unwrap();
        let elapsed = before.elapsed();

        // At least the configured cool-down elapsed between destroy and
        // the re-bootstrap.
        assert!(elapsed >= Duration::from_millis(60_000), "elapsed: {elapsed:?}");
        assert!(first_handle.is_closed());
        assert_eq!(gateway.connect_count(), 2);
        assert_eq!(client.state(), ConnectionState::Connecting);

        // Same ready-reachable state as a fresh bootstrap.
        let mem = gateway.last_handle().unwrap();
        mem.emit_ready(UserId::new(7), "sess-2");
        wait_for(|| client.state() == ConnectionState::Ready).await;
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_resolves_after_requested_duration() {
        let gateway = Arc::new(InMemoryGateway::new());
        let client = test_client(&gateway);
        let before = tokio::time::Instant::now();
        client.sleep(500).await;
        assert!(before.elapsed() >= Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_sleeps_do_not_serialize() {
        let gateway = Arc::new(InMemoryGateway::new());
        let client = test_client(&gateway);
        let before = tokio::time::Instant::now();
        tokio::join!(client.sleep(200), client.sleep(200), client.sleep(200));
        let elapsed = before.elapsed();
        assert!(elapsed >= Duration::from_millis(200));
        assert!(elapsed < Duration::from_millis(600), "elapsed: {elapsed:?}");
    }

    #[tokio::test]
    async fn known_command_round_trips_to_a_reply_packet() {
        let gateway = Arc::new(InMemoryGateway::new());
        let client = test_client(&gateway);
        client.bootstrap().await.unwrap();

        let mem = gateway.last_handle().unwrap();
        let guild = GuildId::new(3);
        let _ = mem.add_guild(guild);
        mem.inject(message_event(guild, ChannelId::new(8), UserId::new(55), "!ping"));

        wait_for(|| !mem.sent().is_empty()).await;
        let sent = mem.sent();
        let reply = &sent[sent.len() - 1].1;
        assert_eq!(reply["op"], "message");
        assert_eq!(reply["d"]["channelId"], 8);
        assert_eq!(reply["d"]["content"], "Pong!");
    }

    #[tokio::test]
    async fn unknown_command_has_no_observable_side_effect() {
        let gateway = Arc::new(InMemoryGateway::new());
        let client = test_client(&gateway);
        client.bootstrap().await.unwrap();

        let mem = gateway.last_handle().unwrap();
        let guild = GuildId::new(3);
        let _ = mem.add_guild(guild);
        mem.inject(message_event(guild, ChannelId::new(8), UserId::new(55), "!nope"));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(mem.sent().is_empty());
    }

    #[tokio::test]
    async fn bot_authored_messages_are_never_dispatched() {
        let gateway = Arc::new(InMemoryGateway::new());
        let client = test_client(&gateway);
        client.bootstrap().await.unwrap();

        let mem = gateway.last_handle().unwrap();
        let guild = GuildId::new(3);
        let _ = mem.add_guild(guild);
        mem.inject(GatewayEvent::MessageCreate {
            message: Message {
                guild_id: Some(guild),
                channel_id: ChannelId::new(8),
                author_id: UserId::new(55),
                author_bot: true,
                content: "!ping".into(),
            },
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(mem.sent().is_empty());
    }

    struct FailingPlugin;

    #[async_trait]
    impl Plugin for FailingPlugin {
        fn name(&self) -> &str {
            "failing"
        }

        fn commands(&self) -> &[&str] {
            &["explode"]
        }

        async fn handle_command(
            &self,
            _ctx: &PluginContext,
            _invocation: &CommandInvocation,
        ) -> Result<Option<Reply>, croon_plugins::PluginError> {
            Err(croon_plugins::PluginError::Failed(
                "raw failure mentioning gw-token-abc".into(),
            ))
        }
    }

    #[tokio::test]
    async fn failing_handler_produces_generic_reply_and_recovers() {
        let gateway = Arc::new(InMemoryGateway::new());
        let mut plugins = test_plugins();
        plugins.push(Arc::new(FailingPlugin));
        let client = Client::new(
            test_settings(),
            Arc::clone(&gateway) as Arc<dyn Gateway>,
            plugins,
            vec![],
        )
        .unwrap();
        client.bootstrap().await.unwrap();

        let mem = gateway.last_handle().unwrap();
        let guild = GuildId::new(3);
        let _ = mem.add_guild(guild);

        mem.inject(message_event(guild, ChannelId::new(8), UserId::new(55), "!explode"));
        wait_for(|| mem.sent().len() == 1).await;
        let sent = mem.sent();
        assert_eq!(
            sent[0].1["d"]["content"],
            "Something went wrong while running that command."
        );

        // The next unrelated dispatch succeeds.
        mem.inject(message_event(guild, ChannelId::new(8), UserId::new(55), "!ping"));
        wait_for(|| mem.sent().len() == 2).await;
        assert_eq!(mem.sent()[1].1["d"]["content"], "Pong!");
    }

    #[tokio::test]
    async fn packet_for_unmapped_guild_is_silently_dropped() {
        let gateway = Arc::new(InMemoryGateway::new());
        let client = test_client(&gateway);
        client.bootstrap().await.unwrap();

        // Guild never announced via guild_create: no shard mapping.
        client
            .packet_sender()
            .send_packet(GuildId::new(404), json!({"op": 4}))
            .await;
        assert!(gateway.last_handle().unwrap().sent().is_empty());
    }

    #[tokio::test]
    async fn shard_drop_moves_ready_session_to_reconnecting() {
        let gateway = Arc::new(InMemoryGateway::new());
        let client = test_client(&gateway);
        client.bootstrap().await.unwrap();

        let mem = gateway.last_handle().unwrap();
        mem.emit_ready(UserId::new(7), "sess");
        wait_for(|| client.state() == ConnectionState::Ready).await;

        mem.inject(GatewayEvent::ShardDisconnected {
            shard: croon_core::ShardId::new(0),
            code: Some(4006),
        });
        wait_for(|| client.state() == ConnectionState::Reconnecting).await;

        // Resume collapses straight back to ready.
        mem.inject(GatewayEvent::Resumed);
        wait_for(|| client.state() == ConnectionState::Ready).await;
    }
}

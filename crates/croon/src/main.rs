//! croon — chat-platform bot runtime.
//!
//! Loads configuration, composes the client orchestrator with the
//! built-in plugin and task sets, opens the gateway session, and runs
//! until interrupted.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use croon_gateway::{Gateway, InMemoryGateway, WsGateway};
use croon_plugins::Plugin;
use croon_plugins::builtin::{PingPlugin, PlaybackPlugin, PrefixPlugin, UptimePlugin};
use croon_runtime::tasks::{PresenceTask, StatsTask};
use croon_runtime::{Client, TaskDescriptor};
use croon_settings::CroonSettings;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// Command-line options.
#[derive(Debug, Parser)]
#[command(name = "croon", about = "Chat-platform bot runtime", version)]
struct Cli {
    /// Path to a JSON config file (merged over compiled defaults).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Run against an in-memory gateway instead of the real platform.
    #[arg(long)]
    offline: bool,

    /// Log filter directive (overrides config and `CROON_LOG`).
    #[arg(long)]
    log_filter: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let settings =
        CroonSettings::load(cli.config.as_deref()).context("failed to load configuration")?;

    let filter = cli
        .log_filter
        .clone()
        .unwrap_or_else(|| settings.log.filter.clone());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&filter).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let gateway: Arc<dyn Gateway> = if cli.offline {
        info!("offline mode: using in-memory gateway");
        Arc::new(InMemoryGateway::auto_ready())
    } else {
        Arc::new(WsGateway::new(settings.gateway.url.clone()))
    };

    let plugins: Vec<Arc<dyn Plugin>> = vec![
        Arc::new(PingPlugin),
        Arc::new(UptimePlugin),
        Arc::new(PrefixPlugin),
        Arc::new(PlaybackPlugin),
    ];
    let tasks: Vec<Arc<dyn TaskDescriptor>> = vec![
        Arc::new(PresenceTask::new(
            settings.bot.presence_interval_secs,
            "music",
        )),
        Arc::new(StatsTask::new(300)),
    ];

    let client = Client::new(settings, gateway, plugins, tasks)?;

    if let Err(error) = client.bootstrap().await {
        // Fatal startup error; make sure no credential leaks with it.
        anyhow::bail!("bootstrap failed: {}", client.redact(&error.to_string()));
    }

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutdown requested");
    client.destroy().await;
    Ok(())
}

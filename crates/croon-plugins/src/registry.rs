//! Plugin registry: indexing and failure-contained dispatch.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{error, info, warn};

use croon_core::GatewayEvent;

use crate::types::{CommandInvocation, Plugin, PluginContext, Reply};

/// Holds the loaded plugin set and routes commands/events to them.
pub struct PluginRegistry {
    plugins: Vec<Arc<dyn Plugin>>,
    commands: HashMap<String, Arc<dyn Plugin>>,
    started: bool,
}

impl PluginRegistry {
    /// An empty, not-yet-started registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            plugins: Vec::new(),
            commands: HashMap::new(),
            started: false,
        }
    }

    /// Add a plugin. Must be called before [`start`](Self::start).
    pub fn register(&mut self, plugin: Arc<dyn Plugin>) {
        self.plugins.push(plugin);
    }

    /// Build the command index. Duplicate command names keep the last
    /// registration (load order is deterministic, so this is stable).
    pub fn start(&mut self) {
        self.commands.clear();
        for plugin in &self.plugins {
            for command in plugin.commands() {
                let key = command.to_lowercase();
                if let Some(previous) = self.commands.insert(key.clone(), Arc::clone(plugin)) {
                    warn!(
                        command = %key,
                        previous = previous.name(),
                        replacement = plugin.name(),
                        "duplicate command registration, last one wins"
                    );
                }
            }
        }
        self.started = true;
        info!(
            plugins = self.plugins.len(),
            commands = self.commands.len(),
            "plugin registry started"
        );
    }

    /// Whether [`start`](Self::start) has run.
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Registered command names, sorted (help output, tests).
    #[must_use]
    pub fn command_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.commands.keys().cloned().collect();
        names.sort_unstable();
        names
    }

    /// Dispatch a command by name.
    ///
    /// Unknown name ⇒ `None`, no side effect. A handler error is caught
    /// here: logged once (redacted) and converted into the generic
    /// failure reply — it never propagates.
    pub async fn dispatch_command(
        &self,
        ctx: &PluginContext,
        invocation: &CommandInvocation,
    ) -> Option<Reply> {
        let plugin = self.commands.get(&invocation.name)?;
        match plugin.handle_command(ctx, invocation).await {
            Ok(reply) => reply,
            Err(err) => {
                error!(
                    plugin = plugin.name(),
                    command = %invocation.name,
                    error = %ctx.redactor.redact(&err.to_string()),
                    "command handler failed"
                );
                Some(Reply::text(ctx.catalog.get("error.generic")))
            }
        }
    }

    /// Fan an event out to every plugin.
    ///
    /// One plugin's failure is logged and does not stop the others.
    pub async fn dispatch_event(&self, ctx: &PluginContext, event: &GatewayEvent) {
        for plugin in &self.plugins {
            if let Err(err) = plugin.on_event(ctx, event).await {
                error!(
                    plugin = plugin.name(),
                    event = event.event_type(),
                    error = %ctx.redactor.redact(&err.to_string()),
                    "event handler failed"
                );
            }
        }
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

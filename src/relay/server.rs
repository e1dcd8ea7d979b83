use anyhow::Result;
use log::{debug, info, warn};
use tokio::sync::mpsc;

use super::access::{AccessGate, AccessGrant, GateResult};
use super::admin::{self, AdminCommand, AdminOutcome};
use super::channel::ChannelRegistry;
use super::error::{RelayError, RelayResult};
use super::identity::IdentityManager;
use super::moderation;
use super::pipeline::{RelayOutcome, RelayPipeline};
use super::transport::{ChatKind, FormatHint, InboundEvent, Transport};
use crate::config::Config;
use crate::logutil::escape_log;
use crate::metrics;
use crate::storage::StateStore;

macro_rules! sec_log {
    ($($arg:tt)*) => { log::warn!(target: "security", $($arg)*); };
}

pub const WELCOME: &str = "Welcome! To join, send an *access code*:\n\
• Italians: IT code\n\
• Chinese: CN code\n\n\
Then just write normally: your messages will be published *anonymously* in the channel.";

pub const TEMPORARY_ERROR: &str = "Temporary error. Please try again.";

pub fn access_confirmed(alias: &str) -> String {
    format!(
        "✅ Access confirmed. Your alias: *{}*.\nWrite the message you want to publish.",
        alias
    )
}

/// Terminal result of handling one inbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    /// Not addressed to the relay (channel chatter, group messages).
    Ignored,
    Welcome,
    AccessGranted(AccessGrant),
    Relay(RelayOutcome),
    Admin(AdminOutcome),
    /// Processing failed; the sender got the generic retry reply (if it
    /// could be delivered).
    TemporaryFailure,
}

/// # Relay Server - single authority over relay state
///
/// Owns the [StateStore] and every component that reads or mutates it, and
/// processes inbound events strictly one at a time. That serialization is what
/// keeps alias issuance, bans and channel binds free of lost updates: no two
/// events ever observe the same alias set and both write.
///
/// ```text
/// InboundEvent ─→ admin command? ─→ Moderation / ChannelRegistry / stats
///              └→ private text ─→ AccessGate ─→ IdentityManager
///                                    └ NotACode ─→ RelayPipeline ─→ Transport
/// ```
///
/// ## Failure policy
///
/// [RelayServer::handle_event] never returns an error. Store write failures,
/// exhausted alias space and transport errors are logged and answered with
/// [TEMPORARY_ERROR]; the next event is processed normally.
pub struct RelayServer<T: Transport> {
    config: Config,
    store: StateStore,
    gate: AccessGate,
    identity: IdentityManager,
    channels: ChannelRegistry,
    pipeline: RelayPipeline,
    transport: T,
}

impl<T: Transport> RelayServer<T> {
    /// Load the state store and assemble the components.
    ///
    /// Fails with [RelayError::StoreUnavailable] when a state document exists
    /// but cannot be read; the relay must not start on top of it.
    pub async fn new(config: Config, transport: T) -> RelayResult<Self> {
        let store = StateStore::load(&config.storage.data_dir, &config.storage.db_file).await?;
        Ok(Self::with_store(config, store, transport))
    }

    pub fn with_store(config: Config, store: StateStore, transport: T) -> Self {
        Self {
            gate: AccessGate::new(&config.access),
            identity: IdentityManager::new(),
            channels: ChannelRegistry::new(config.relay.default_channel_id.clone()),
            pipeline: RelayPipeline::new(config.relay.max_message_len),
            config,
            store,
            transport,
        }
    }

    /// Replace the alias generator (seeded generators in tests).
    pub fn with_identity(mut self, identity: IdentityManager) -> Self {
        self.identity = identity;
        self
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Currently effective relay destination.
    pub fn channel_id(&self) -> Option<String> {
        self.channels.get(&self.store)
    }

    fn is_admin(&self, sender_id: &str) -> bool {
        !sender_id.is_empty() && sender_id == self.config.relay.admin_id
    }

    /// Process one event to a terminal outcome.
    pub async fn handle_event(&mut self, ev: InboundEvent) -> EventOutcome {
        metrics::inc_events_processed();
        debug!(
            "Event from {} in {:?} {}: {}",
            ev.sender_id,
            ev.chat_kind,
            ev.chat_id,
            ev.text.as_deref().map(escape_log).unwrap_or_else(|| "<non-text>".into())
        );
        match self.dispatch(&ev).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("Event from {} failed: {}", ev.sender_id, e);
                if ev.chat_kind == ChatKind::Private {
                    if let Err(e) = self
                        .transport
                        .deliver_to_user(&ev.sender_id, TEMPORARY_ERROR, FormatHint::Plain)
                        .await
                    {
                        warn!("Could not deliver error reply to {}: {}", ev.sender_id, e);
                    }
                }
                EventOutcome::TemporaryFailure
            }
        }
    }

    async fn dispatch(&mut self, ev: &InboundEvent) -> RelayResult<EventOutcome> {
        if let Some(cmd) = &ev.command {
            if let Some(admin_cmd) = AdminCommand::from_invocation(cmd) {
                return self.handle_admin(ev, admin_cmd).await.map(EventOutcome::Admin);
            }
            if cmd.name == "start" && ev.chat_kind == ChatKind::Private {
                self.reply_to_user(&ev.sender_id, WELCOME, FormatHint::Markdown)
                    .await?;
                return Ok(EventOutcome::Welcome);
            }
        }
        if ev.chat_kind != ChatKind::Private || ev.sender_id.is_empty() {
            return Ok(EventOutcome::Ignored);
        }

        if let Some(text) = ev.text.as_deref() {
            let gate_result = self
                .gate
                .validate(&mut self.store, &mut self.identity, &ev.sender_id, text.trim())
                .await?;
            if let GateResult::Granted(grant) = gate_result {
                self.reply_to_user(
                    &ev.sender_id,
                    &access_confirmed(&grant.alias),
                    FormatHint::Markdown,
                )
                .await?;
                return Ok(EventOutcome::AccessGranted(grant));
            }
        }

        let outcome = self
            .pipeline
            .process(
                &self.store,
                &self.channels,
                &self.transport,
                &ev.sender_id,
                ev.text.as_deref(),
            )
            .await?;
        if let Some((reply, hint)) = outcome.reply() {
            self.reply_to_user(&ev.sender_id, reply, hint).await?;
        }
        Ok(EventOutcome::Relay(outcome))
    }

    async fn handle_admin(
        &mut self,
        ev: &InboundEvent,
        cmd: AdminCommand,
    ) -> RelayResult<AdminOutcome> {
        if !self.is_admin(&ev.sender_id) {
            sec_log!(
                "Ignored /{} from non-admin sender '{}'",
                cmd.name(),
                ev.sender_id
            );
            return Ok(AdminOutcome::Unauthorized);
        }
        match cmd {
            AdminCommand::Bind => {
                if ev.chat_kind != ChatKind::Channel {
                    self.reply_in_chat(ev, admin::BIND_HINT).await?;
                    return Ok(AdminOutcome::BindHint);
                }
                self.channels.bind(&mut self.store, &ev.chat_id).await?;
                sec_log!("BIND by {}: channel {}", ev.sender_id, ev.chat_id);
                self.reply_in_chat(ev, admin::BIND_OK).await?;
                Ok(AdminOutcome::Bound(ev.chat_id.clone()))
            }
            AdminCommand::Stats => {
                let stats = self.store.stats();
                self.reply_in_chat(ev, &admin::stats_reply(&stats)).await?;
                Ok(AdminOutcome::Stats(stats))
            }
            AdminCommand::Ban(None) => {
                self.reply_in_chat(ev, admin::BAN_USAGE).await?;
                Ok(AdminOutcome::BanUsage)
            }
            AdminCommand::Ban(Some(alias)) => {
                match moderation::ban(&mut self.store, &alias).await {
                    Ok(user_id) => {
                        sec_log!("BAN by {}: {} (user {})", ev.sender_id, alias, user_id);
                        self.reply_in_chat(ev, &admin::banned_reply(&alias)).await?;
                        Ok(AdminOutcome::Banned { alias, user_id })
                    }
                    Err(RelayError::AliasNotFound(alias)) => {
                        self.reply_in_chat(ev, admin::ALIAS_NOT_FOUND).await?;
                        Ok(AdminOutcome::AliasNotFound(alias))
                    }
                    Err(e) => Err(e),
                }
            }
        }
    }

    async fn reply_to_user(&self, user_id: &str, text: &str, hint: FormatHint) -> RelayResult<()> {
        self.transport
            .deliver_to_user(user_id, text, hint)
            .await
            .map_err(|e| {
                metrics::inc_delivery_failures();
                RelayError::Delivery(e.to_string())
            })
    }

    /// Answer in the chat the command came from.
    async fn reply_in_chat(&self, ev: &InboundEvent, text: &str) -> RelayResult<()> {
        match ev.chat_kind {
            ChatKind::Private => self.reply_to_user(&ev.sender_id, text, FormatHint::Plain).await,
            ChatKind::Channel | ChatKind::Other => self
                .transport
                .deliver_to_channel(&ev.chat_id, text, FormatHint::Plain)
                .await
                .map_err(|e| {
                    metrics::inc_delivery_failures();
                    RelayError::Delivery(e.to_string())
                }),
        }
    }

    /// Process events until the sender side closes or Ctrl-C arrives.
    pub async fn run(&mut self, mut events: mpsc::Receiver<InboundEvent>) -> Result<()> {
        info!(
            "Relay started (admin {}, channel {})",
            self.config.relay.admin_id,
            self.channel_id().as_deref().unwrap_or("<unbound>")
        );
        loop {
            tokio::select! {
                ev = events.recv() => {
                    match ev {
                        Some(ev) => {
                            let _ = self.handle_event(ev).await;
                        }
                        None => {
                            info!("Inbound event channel closed");
                            break;
                        }
                    }
                }

                _ = tokio::signal::ctrl_c() => {
                    info!("Received shutdown signal");
                    break;
                }
            }
        }
        self.shutdown().await
    }

    async fn shutdown(&mut self) -> Result<()> {
        info!("Shutting down relay...");
        self.store.flush().await?;
        let snap = metrics::snapshot();
        info!(
            "Relay metrics: events={} aliases_issued={} relayed={} delivery_failures={}",
            snap.events_processed,
            snap.aliases_issued,
            snap.outcome("relayed"),
            snap.delivery_failures
        );
        info!("Relay shutdown complete");
        Ok(())
    }
}

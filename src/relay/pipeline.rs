//! Relay pipeline: decide whether and how a private message is republished.
//!
//! Checks run in a fixed order and the first one that applies is terminal:
//!
//! 1. no channel bound        → [RelayOutcome::ChannelUnbound]
//! 2. sender banned           → [RelayOutcome::Banned] (no reply)
//! 3. text too long           → [RelayOutcome::TooLong]
//! 4. no text (media)         → [RelayOutcome::NotText]
//! 5. no alias/role yet       → [RelayOutcome::NeedsAccessCode]
//! 6. otherwise               → forward `"<alias>:\n<trimmed text>"`
//!
//! An unbound channel wins over everything else because nothing can be
//! relayed regardless of the sender's standing. Rejected messages are dropped,
//! never queued.
use log::{debug, warn};

use crate::logutil::escape_log;
use crate::metrics;
use crate::relay::channel::ChannelRegistry;
use crate::relay::error::{RelayError, RelayResult};
use crate::relay::moderation;
use crate::relay::transport::{FormatHint, Transport};
use crate::storage::StateStore;
use crate::validation::utf16_len;

/// Terminal outcome for one inbound private message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    ChannelUnbound,
    Banned,
    TooLong,
    NotText,
    NeedsAccessCode,
    Relayed { alias: String, channel_id: String },
}

impl RelayOutcome {
    /// Reply owed to the sender, if any. Banned users get none so their
    /// status is not revealed.
    pub fn reply(&self) -> Option<(&'static str, FormatHint)> {
        match self {
            RelayOutcome::ChannelUnbound => Some((
                "⚠️ Channel not configured. Wait for the admin to run /bind in the channel.",
                FormatHint::Plain,
            )),
            RelayOutcome::Banned => None,
            RelayOutcome::TooLong => Some(("Message too long.", FormatHint::Plain)),
            RelayOutcome::NotText => Some(("Only text messages are accepted for now.", FormatHint::Plain)),
            RelayOutcome::NeedsAccessCode => Some((
                "Send your *access code* (IT or CN) first.",
                FormatHint::Markdown,
            )),
            RelayOutcome::Relayed { .. } => Some(("✅ Published anonymously.", FormatHint::Plain)),
        }
    }

    fn label(&self) -> &'static str {
        match self {
            RelayOutcome::ChannelUnbound => "channel_unbound",
            RelayOutcome::Banned => "banned",
            RelayOutcome::TooLong => "too_long",
            RelayOutcome::NotText => "not_text",
            RelayOutcome::NeedsAccessCode => "needs_access_code",
            RelayOutcome::Relayed { .. } => "relayed",
        }
    }
}

/// Result of the eligibility checks, before anything is sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Reject(RelayOutcome),
    Forward {
        alias: String,
        channel_id: String,
        payload: String,
    },
}

/// The exact text posted to the channel.
pub fn format_relay(alias: &str, text: &str) -> String {
    format!("{}:\n{}", alias, text.trim())
}

pub struct RelayPipeline {
    max_message_len: usize,
}

impl RelayPipeline {
    pub fn new(max_message_len: usize) -> Self {
        Self { max_message_len }
    }

    /// Run checks 1-5 and build the payload. Reads state only.
    pub fn evaluate(
        &self,
        store: &StateStore,
        channels: &ChannelRegistry,
        user_id: &str,
        text: Option<&str>,
    ) -> Decision {
        let Some(channel_id) = channels.get(store) else {
            return Decision::Reject(RelayOutcome::ChannelUnbound);
        };
        if moderation::is_banned(store, user_id) {
            return Decision::Reject(RelayOutcome::Banned);
        }
        if text.is_some_and(|t| utf16_len(t) > self.max_message_len) {
            return Decision::Reject(RelayOutcome::TooLong);
        }
        let Some(text) = text else {
            return Decision::Reject(RelayOutcome::NotText);
        };
        let Some((alias, _)) = store.get(user_id).and_then(|r| r.identity()) else {
            return Decision::Reject(RelayOutcome::NeedsAccessCode);
        };
        Decision::Forward {
            alias: alias.to_string(),
            payload: format_relay(alias, text),
            channel_id,
        }
    }

    /// Evaluate and, when eligible, forward to the bound channel.
    ///
    /// A failed channel delivery is returned as [RelayError::Delivery]; the
    /// caller owes the sender a temporary-error reply.
    pub async fn process<T: Transport + ?Sized>(
        &self,
        store: &StateStore,
        channels: &ChannelRegistry,
        transport: &T,
        user_id: &str,
        text: Option<&str>,
    ) -> RelayResult<RelayOutcome> {
        let outcome = match self.evaluate(store, channels, user_id, text) {
            Decision::Reject(outcome) => outcome,
            Decision::Forward {
                alias,
                channel_id,
                payload,
            } => {
                if let Err(e) = transport
                    .deliver_to_channel(&channel_id, &payload, FormatHint::Plain)
                    .await
                {
                    metrics::inc_delivery_failures();
                    warn!("Relay to channel {} failed: {}", channel_id, e);
                    return Err(RelayError::Delivery(e.to_string()));
                }
                debug!("Relayed to {}: {}", channel_id, escape_log(&payload));
                RelayOutcome::Relayed { alias, channel_id }
            }
        };
        metrics::record_outcome(outcome.label());
        Ok(outcome)
    }
}

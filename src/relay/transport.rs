//! Transport collaborator seam.
//!
//! The relay core never talks to a chat network directly. Inbound traffic
//! arrives as [InboundEvent]s and outbound traffic leaves through the two
//! [Transport] operations. [RecordingTransport] keeps everything in memory
//! and is what the tests drive the server with.
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Kind of chat an event was posted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatKind {
    Private,
    Channel,
    Other,
}

/// Markup the transport should honor when rendering text.
///
/// `Markdown` means `*bold*` / `_italic_` may appear; the core never depends
/// on it being rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatHint {
    Plain,
    Markdown,
}

/// A slash command split into name and whitespace-separated arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandInvocation {
    pub name: String,
    pub args: Vec<String>,
    /// Bot named in a `/name@bot` suffix, if any.
    pub mention: Option<String>,
}

impl CommandInvocation {
    /// Parse `/name@bot arg1 arg2`. Returns `None` for text that is not a
    /// command.
    pub fn parse(text: &str) -> Option<Self> {
        let rest = text.trim_start().strip_prefix('/')?;
        let mut parts = rest.split_whitespace();
        let head = parts.next()?;
        let (name, mention) = match head.split_once('@') {
            Some((name, bot)) => (name, Some(bot.to_string())),
            None => (head, None),
        };
        if name.is_empty() {
            return None;
        }
        Some(Self {
            name: name.to_string(),
            args: parts.map(str::to_string).collect(),
            mention,
        })
    }

    /// Unqualified commands are addressed to every bot in the chat.
    pub fn is_addressed_to(&self, bot_username: &str) -> bool {
        self.mention
            .as_deref()
            .map_or(true, |m| m.eq_ignore_ascii_case(bot_username))
    }
}

/// One inbound message as delivered by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEvent {
    /// Opaque sender identity. Empty when the transport could not tell.
    pub sender_id: String,
    /// Chat the event was posted in (equals `sender_id` for private chats).
    pub chat_id: String,
    pub chat_kind: ChatKind,
    /// `None` for media or other non-text content.
    pub text: Option<String>,
    pub command: Option<CommandInvocation>,
}

impl InboundEvent {
    /// Build an event, deriving `command` from the text.
    pub fn new(sender_id: &str, chat_id: &str, chat_kind: ChatKind, text: Option<&str>) -> Self {
        Self {
            sender_id: sender_id.to_string(),
            chat_id: chat_id.to_string(),
            chat_kind,
            text: text.map(str::to_string),
            command: text.and_then(CommandInvocation::parse),
        }
    }

    pub fn private_text(sender_id: &str, text: &str) -> Self {
        Self::new(sender_id, sender_id, ChatKind::Private, Some(text))
    }

    pub fn private_media(sender_id: &str) -> Self {
        Self::new(sender_id, sender_id, ChatKind::Private, None)
    }

    pub fn channel_post(sender_id: &str, channel_id: &str, text: &str) -> Self {
        Self::new(sender_id, channel_id, ChatKind::Channel, Some(text))
    }

    /// Drop a command that names a different bot. The text is kept, so in a
    /// private chat it goes through the relay like any other message.
    pub fn addressed_to(mut self, bot_username: Option<&str>) -> Self {
        if let (Some(cmd), Some(me)) = (&self.command, bot_username) {
            if !cmd.is_addressed_to(me) {
                self.command = None;
            }
        }
        self
    }
}

/// Outbound operations the relay needs from a chat network.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn deliver_to_user(&self, user_id: &str, text: &str, hint: FormatHint) -> Result<()>;

    async fn deliver_to_channel(
        &self,
        channel_id: &str,
        text: &str,
        hint: FormatHint,
    ) -> Result<()>;
}

/// A delivery captured by [RecordingTransport].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    User {
        user_id: String,
        text: String,
        hint: FormatHint,
    },
    Channel {
        channel_id: String,
        text: String,
        hint: FormatHint,
    },
}

/// In-memory transport. Clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct RecordingTransport {
    log: Arc<Mutex<Vec<Delivery>>>,
    fail_channel: Arc<AtomicBool>,
    fail_user: Arc<AtomicBool>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent channel deliveries fail.
    pub fn set_fail_channel(&self, fail: bool) {
        self.fail_channel.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent user deliveries fail.
    pub fn set_fail_user(&self, fail: bool) {
        self.fail_user.store(fail, Ordering::SeqCst);
    }

    pub fn deliveries(&self) -> Vec<Delivery> {
        self.log.lock().map(|g| g.clone()).unwrap_or_default()
    }

    /// Drain and return everything captured so far.
    pub fn take(&self) -> Vec<Delivery> {
        self.log
            .lock()
            .map(|mut g| std::mem::take(&mut *g))
            .unwrap_or_default()
    }

    /// Texts sent to `user_id`, in order.
    pub fn replies_to(&self, user_id: &str) -> Vec<String> {
        self.deliveries()
            .into_iter()
            .filter_map(|d| match d {
                Delivery::User { user_id: u, text, .. } if u == user_id => Some(text),
                _ => None,
            })
            .collect()
    }

    /// Texts posted to any channel, in order.
    pub fn channel_posts(&self) -> Vec<(String, String)> {
        self.deliveries()
            .into_iter()
            .filter_map(|d| match d {
                Delivery::Channel {
                    channel_id, text, ..
                } => Some((channel_id, text)),
                _ => None,
            })
            .collect()
    }

    fn record(&self, delivery: Delivery) -> Result<()> {
        self.log
            .lock()
            .map_err(|_| anyhow!("recording transport poisoned"))?
            .push(delivery);
        Ok(())
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn deliver_to_user(&self, user_id: &str, text: &str, hint: FormatHint) -> Result<()> {
        if self.fail_user.load(Ordering::SeqCst) {
            return Err(anyhow!("simulated delivery failure to user {}", user_id));
        }
        self.record(Delivery::User {
            user_id: user_id.to_string(),
            text: text.to_string(),
            hint,
        })
    }

    async fn deliver_to_channel(
        &self,
        channel_id: &str,
        text: &str,
        hint: FormatHint,
    ) -> Result<()> {
        if self.fail_channel.load(Ordering::SeqCst) {
            return Err(anyhow!("simulated delivery failure to channel {}", channel_id));
        }
        self.record(Delivery::Channel {
            channel_id: channel_id.to_string(),
            text: text.to_string(),
            hint,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_parsing() {
        let cmd = CommandInvocation::parse("/ban@relay_bot  IT-407 ").unwrap();
        assert_eq!(cmd.name, "ban");
        assert_eq!(cmd.args, vec!["IT-407".to_string()]);
        assert!(CommandInvocation::parse("hello /ban").is_none());
        assert!(CommandInvocation::parse("/").is_none());
        assert_eq!(CommandInvocation::parse("/stats").unwrap().args.len(), 0);
        assert_eq!(cmd.mention.as_deref(), Some("relay_bot"));
    }

    #[test]
    fn commands_for_other_bots_are_dropped() {
        let ours = InboundEvent::channel_post("42", "-100", "/stats@Relay_Bot")
            .addressed_to(Some("relay_bot"));
        assert_eq!(ours.command.map(|c| c.name), Some("stats".to_string()));

        let plain = InboundEvent::channel_post("42", "-100", "/stats").addressed_to(Some("relay_bot"));
        assert!(plain.command.is_some());

        let other = InboundEvent::private_text("42", "/stats@someotherbot")
            .addressed_to(Some("relay_bot"));
        assert!(other.command.is_none());
        assert_eq!(other.text.as_deref(), Some("/stats@someotherbot"));

        // Without a known username nothing is filtered
        let unknown = InboundEvent::private_text("42", "/stats@someotherbot").addressed_to(None);
        assert!(unknown.command.is_some());
    }

    #[test]
    fn recording_transport_captures_and_fails() {
        let t = RecordingTransport::new();
        tokio_test::block_on(async {
            t.deliver_to_user("1", "hi", FormatHint::Plain).await.unwrap();
            t.set_fail_channel(true);
            assert!(t
                .deliver_to_channel("-100", "post", FormatHint::Plain)
                .await
                .is_err());
        });
        assert_eq!(t.replies_to("1"), vec!["hi".to_string()]);
        assert!(t.channel_posts().is_empty());
    }
}

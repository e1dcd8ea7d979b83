//! Telegram transport built on teloxide.
//!
//! [poll_updates] long-polls the Bot API and forwards private messages and
//! channel posts as [InboundEvent]s over an mpsc channel; the
//! [RelayServer](crate::relay::RelayServer) consumes them one at a time.
//! [TelegramTransport] implements the outbound side.
//!
//! Telegram channel posts carry no `from` user, so an in-channel `/bind`
//! arrives with an empty sender and is never authorized. Use
//! `anonrelay bind <channel_id>` from the CLI in that case.
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use log::{debug, info, warn};
use std::time::Duration;
use teloxide::payloads::{GetUpdatesSetters, SendMessageSetters};
use teloxide::prelude::*;
use teloxide::types::{AllowedUpdate, ParseMode, Recipient, UpdateKind};
use tokio::sync::mpsc;

use crate::relay::transport::{ChatKind, FormatHint, InboundEvent, Transport};

/// Seconds the Bot API holds a getUpdates request open.
const POLL_TIMEOUT_SECS: u32 = 30;
const POLL_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Build a bot, verify the token and clear any webhook so polling works.
///
/// Returns the bot together with its username, used to skip commands
/// addressed to other bots in shared chats.
pub async fn connect(token: &str) -> Result<(Bot, Option<String>)> {
    // Client timeout must outlast the long-poll timeout
    let client = teloxide::net::default_reqwest_settings()
        .timeout(Duration::from_secs(u64::from(POLL_TIMEOUT_SECS) + 15))
        .build()?;
    let bot = Bot::with_client(token, client);
    let me = bot.get_me().await?;
    bot.delete_webhook().await?;
    info!(
        "Telegram bot connected as @{}",
        me.username.as_deref().unwrap_or("<unknown>")
    );
    Ok((bot, me.username.clone()))
}

/// Map a Telegram message onto the transport-neutral event.
pub fn to_inbound_event(msg: &Message, bot_username: Option<&str>) -> InboundEvent {
    let chat_kind = if msg.chat.is_private() {
        ChatKind::Private
    } else if msg.chat.is_channel() {
        ChatKind::Channel
    } else {
        ChatKind::Other
    };
    let sender_id = msg
        .from
        .as_ref()
        .map(|u| u.id.0.to_string())
        .unwrap_or_default();
    InboundEvent::new(&sender_id, &msg.chat.id.0.to_string(), chat_kind, msg.text())
        .addressed_to(bot_username)
}

/// Long-poll updates until the receiving side of `tx` is dropped.
pub async fn poll_updates(
    bot: Bot,
    bot_username: Option<String>,
    tx: mpsc::Sender<InboundEvent>,
) -> Result<()> {
    let mut offset: i32 = 0;
    loop {
        let result = bot
            .get_updates()
            .offset(offset)
            .timeout(POLL_TIMEOUT_SECS)
            .allowed_updates(vec![AllowedUpdate::Message, AllowedUpdate::ChannelPost])
            .await;
        let updates = match result {
            Ok(updates) => updates,
            Err(e) => {
                warn!("Telegram getUpdates failed: {}", e);
                tokio::time::sleep(POLL_RETRY_DELAY).await;
                continue;
            }
        };
        for update in updates {
            offset = update.id.as_offset();
            let msg = match update.kind {
                UpdateKind::Message(msg) | UpdateKind::ChannelPost(msg) => msg,
                other => {
                    debug!("Ignoring non-message update: {:?}", other);
                    continue;
                }
            };
            if tx.send(to_inbound_event(&msg, bot_username.as_deref())).await.is_err() {
                info!("Relay loop has stopped; ending Telegram polling");
                return Ok(());
            }
        }
    }
}

/// Resolve an opaque id: numeric chat ids or `@channelname`.
pub fn parse_recipient(id: &str) -> Result<Recipient> {
    if id.starts_with('@') {
        return Ok(Recipient::ChannelUsername(id.to_string()));
    }
    id.parse::<i64>()
        .map(|n| Recipient::Id(ChatId(n)))
        .map_err(|_| anyhow!("Invalid Telegram chat id: {}", id))
}

/// Render the `*bold*` / `_italic_` subset as Telegram HTML, escaping the rest.
pub fn markdown_to_html(md: &str) -> String {
    let mut out = String::with_capacity(md.len() + 16);
    let mut bold = false;
    let mut italic = false;
    for ch in md.chars() {
        match ch {
            '*' => {
                out.push_str(if bold { "</b>" } else { "<b>" });
                bold = !bold;
            }
            '_' => {
                out.push_str(if italic { "</i>" } else { "<i>" });
                italic = !italic;
            }
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            c => out.push(c),
        }
    }
    if italic {
        out.push_str("</i>");
    }
    if bold {
        out.push_str("</b>");
    }
    out
}

/// Outbound side of the Telegram transport.
#[derive(Clone)]
pub struct TelegramTransport {
    bot: Bot,
}

impl TelegramTransport {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    async fn send(&self, to: &str, text: &str, hint: FormatHint) -> Result<()> {
        let recipient = parse_recipient(to)?;
        match hint {
            FormatHint::Plain => {
                self.bot.send_message(recipient, text).await?;
            }
            FormatHint::Markdown => {
                self.bot
                    .send_message(recipient, markdown_to_html(text))
                    .parse_mode(ParseMode::Html)
                    .await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for TelegramTransport {
    async fn deliver_to_user(&self, user_id: &str, text: &str, hint: FormatHint) -> Result<()> {
        self.send(user_id, text, hint).await
    }

    async fn deliver_to_channel(
        &self,
        channel_id: &str,
        text: &str,
        hint: FormatHint,
    ) -> Result<()> {
        self.send(channel_id, text, hint).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markdown_subset_renders() {
        assert_eq!(
            markdown_to_html("Your alias: *IT-407*."),
            "Your alias: <b>IT-407</b>."
        );
        assert_eq!(markdown_to_html("_a_ & <b>"), "<i>a</i> &amp; &lt;b&gt;");
        assert_eq!(markdown_to_html("*open"), "<b>open</b>");
    }

    #[test]
    fn recipients() {
        assert!(matches!(
            parse_recipient("-1001234").unwrap(),
            Recipient::Id(ChatId(-1001234))
        ));
        assert!(matches!(
            parse_recipient("@relayroom").unwrap(),
            Recipient::ChannelUsername(ref n) if n == "@relayroom"
        ));
        assert!(parse_recipient("not-a-chat").is_err());
    }
}

//! Telegram channel — long-polls the Bot API for updates.
//!
//! Raw Bot API client over reqwest: `getUpdates` long-polling with
//! offset tracking for inbound, `sendMessage` with a Markdown-then-plain
//! fallback for outbound, and a username/numeric-id allowlist in front
//! of everything.

use async_trait::async_trait;
use secrecy::ExposeSecret;

use crate::channels::{Channel, IncomingMessage, MessageStream, OutgoingResponse, StatusUpdate};
use crate::config::TelegramConfig;
use crate::error::ChannelError;
use crate::executor::floor_char_boundary;

/// Maximum message length for Telegram's sendMessage API.
const TELEGRAM_MAX_MESSAGE_LENGTH: usize = 4096;

/// Seconds to hold a getUpdates long poll open.
const POLL_TIMEOUT_SECS: u64 = 30;

/// Backoff after a failed poll before trying again.
const POLL_RETRY_DELAY: std::time::Duration = std::time::Duration::from_secs(5);

pub struct TelegramChannel {
    config: TelegramConfig,
    client: reqwest::Client,
}

impl TelegramChannel {
    pub fn new(config: TelegramConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn api_url(&self, method: &str) -> String {
        format!(
            "https://api.telegram.org/bot{}/{method}",
            self.config.bot_token.expose_secret()
        )
    }

    /// Check a single identity against the allowlist.
    pub fn is_user_allowed(&self, identity: &str) -> bool {
        check_user_allowed(&self.config.allowed_users, [identity])
    }

    /// Send a text message, trying Markdown first with plain text fallback.
    /// Splits long messages that exceed Telegram's 4096 char limit.
    async fn send_message(&self, chat_id: &str, text: &str) -> Result<(), ChannelError> {
        for chunk in split_message(text, TELEGRAM_MAX_MESSAGE_LENGTH) {
            self.send_message_chunk(chat_id, &chunk).await?;
        }
        Ok(())
    }

    /// Send a single message chunk (≤4096 chars), Markdown-first with
    /// fallback. Task output is arbitrary text and regularly breaks
    /// Markdown parsing.
    async fn send_message_chunk(&self, chat_id: &str, text: &str) -> Result<(), ChannelError> {
        let markdown_body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "Markdown"
        });

        let markdown_resp = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&markdown_body)
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed {
                name: "telegram".into(),
                reason: e.to_string(),
            })?;

        if markdown_resp.status().is_success() {
            return Ok(());
        }

        let markdown_status = markdown_resp.status();
        tracing::warn!(
            status = ?markdown_status,
            "Telegram sendMessage with Markdown failed; retrying without parse_mode"
        );

        let plain_body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
        });
        let plain_resp = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&plain_body)
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed {
                name: "telegram".into(),
                reason: e.to_string(),
            })?;

        if !plain_resp.status().is_success() {
            let plain_err = plain_resp.text().await.unwrap_or_default();
            return Err(ChannelError::SendFailed {
                name: "telegram".into(),
                reason: format!(
                    "sendMessage failed (markdown: {}, plain: {})",
                    markdown_status, plain_err
                ),
            });
        }

        Ok(())
    }

    /// Fire a "typing" chat action. Best effort; the indicator only
    /// lasts a few seconds on the client.
    async fn send_typing(&self, chat_id: &str) {
        let _ = self
            .client
            .post(self.api_url("sendChatAction"))
            .json(&serde_json::json!({
                "chat_id": chat_id,
                "action": "typing"
            }))
            .send()
            .await;
    }
}

// ── Channel trait implementation ────────────────────────────────────

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn start(&self) -> Result<MessageStream, ChannelError> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let poll_url = self.api_url("getUpdates");
        let allowed_users = self.config.allowed_users.clone();
        let client = self.client.clone();

        tokio::spawn(async move {
            let mut offset: i64 = 0;

            tracing::info!("Telegram channel listening for messages...");

            loop {
                let updates =
                    match fetch_updates(&client, &poll_url, offset).await {
                        Ok(updates) => updates,
                        Err(e) => {
                            tracing::warn!("Telegram poll error: {e}");
                            tokio::time::sleep(POLL_RETRY_DELAY).await;
                            continue;
                        }
                    };

                for update in updates {
                    // Acknowledge every update, text or not, so the next
                    // poll does not return it again.
                    if let Some(uid) = update.get("update_id").and_then(serde_json::Value::as_i64)
                    {
                        offset = uid + 1;
                    }

                    let Some(inbound) = parse_message(&update) else {
                        continue;
                    };

                    if !check_user_allowed(&allowed_users, inbound.identities()) {
                        tracing::warn!(
                            "Telegram: ignoring message from unauthorized user: \
                             username={}, user_id={}",
                            inbound.username.as_deref().unwrap_or("unknown"),
                            inbound.user_id.as_deref().unwrap_or("unknown"),
                        );
                        continue;
                    }

                    if tx.send(inbound.into_incoming()).is_err() {
                        tracing::info!("Telegram listener channel closed");
                        return;
                    }
                }
            }
        });

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|msg| (msg, rx))
        });

        Ok(Box::pin(stream))
    }

    async fn respond(
        &self,
        msg: &IncomingMessage,
        response: OutgoingResponse,
    ) -> Result<(), ChannelError> {
        let chat_id = msg
            .metadata
            .get("chat_id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ChannelError::SendFailed {
                name: "telegram".into(),
                reason: "No chat_id in message metadata".into(),
            })?;

        self.send_message(chat_id, &response.content).await
    }

    async fn send_status(
        &self,
        status: StatusUpdate,
        metadata: &serde_json::Value,
    ) -> Result<(), ChannelError> {
        let Some(chat_id) = metadata.get("chat_id").and_then(|v| v.as_str()) else {
            return Ok(());
        };

        match status {
            StatusUpdate::Executing { ref project } => {
                self.send_message(chat_id, &format!("⚙️ Executing...\nDirectory: {project}"))
                    .await?;
                self.send_typing(chat_id).await;
            }
            StatusUpdate::Notice(ref msg) if !msg.is_empty() => {
                self.send_message(chat_id, &format!("ℹ️ {msg}")).await?;
            }
            _ => {}
        }
        Ok(())
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
        let resp = self
            .client
            .get(self.api_url("getMe"))
            .send()
            .await
            .map_err(|e| ChannelError::StartupFailed {
                name: "telegram".into(),
                reason: e.to_string(),
            })?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(ChannelError::StartupFailed {
                name: "telegram".into(),
                reason: format!("getMe returned {}", resp.status()),
            })
        }
    }

    async fn shutdown(&self) -> Result<(), ChannelError> {
        tracing::info!("Telegram channel shutting down");
        Ok(())
    }
}

// ── Polling helpers ─────────────────────────────────────────────────

/// One getUpdates round trip. Returns the raw update objects.
async fn fetch_updates(
    client: &reqwest::Client,
    poll_url: &str,
    offset: i64,
) -> Result<Vec<serde_json::Value>, ChannelError> {
    let body = serde_json::json!({
        "offset": offset,
        "timeout": POLL_TIMEOUT_SECS,
        "allowed_updates": ["message"]
    });

    let failed = |reason: String| ChannelError::SendFailed {
        name: "telegram".into(),
        reason,
    };

    let resp = client
        .post(poll_url)
        .json(&body)
        .send()
        .await
        .map_err(|e| failed(e.to_string()))?;
    let data: serde_json::Value = resp
        .json()
        .await
        .map_err(|e| failed(format!("getUpdates parse error: {e}")))?;

    Ok(data
        .get("result")
        .and_then(serde_json::Value::as_array)
        .cloned()
        .unwrap_or_default())
}

/// Fields extracted from one text-message update.
#[derive(Debug)]
struct InboundMessage {
    text: String,
    /// Where replies and status updates go.
    chat_id: String,
    username: Option<String>,
    /// Numeric account id, rendered as a string for allowlist matching.
    user_id: Option<String>,
    first_name: Option<String>,
}

impl InboundMessage {
    /// Identities the allowlist can match against.
    fn identities(&self) -> Vec<&str> {
        self.username
            .iter()
            .chain(self.user_id.iter())
            .map(String::as_str)
            .collect()
    }

    fn into_incoming(self) -> IncomingMessage {
        let username = self.username.unwrap_or_else(|| "unknown".to_string());
        // The numeric id is the stable submitter identity; usernames can
        // change.
        let submitter = self.user_id.unwrap_or_else(|| username.clone());
        let display = self.first_name.unwrap_or_else(|| username.clone());

        IncomingMessage::new("telegram", submitter, self.text)
            .with_metadata(serde_json::json!({
                "chat_id": self.chat_id,
                "username": username,
            }))
            .with_user_name(display)
    }
}

/// Extract the message fields the bot consumes from one update.
///
/// `None` for anything that is not a text message with a chat id
/// (media, joins, edits); such updates are acknowledged and dropped.
fn parse_message(update: &serde_json::Value) -> Option<InboundMessage> {
    let message = update.get("message")?;
    let text = message.get("text")?.as_str()?.to_string();
    let chat_id = message.get("chat")?.get("id")?.as_i64()?.to_string();

    let from = message.get("from");
    let username = from
        .and_then(|f| f.get("username"))
        .and_then(|u| u.as_str())
        .map(str::to_string);
    let user_id = from
        .and_then(|f| f.get("id"))
        .and_then(serde_json::Value::as_i64)
        .map(|id| id.to_string());
    let first_name = from
        .and_then(|f| f.get("first_name"))
        .and_then(|n| n.as_str())
        .map(str::to_string);

    Some(InboundMessage {
        text,
        chat_id,
        username,
        user_id,
        first_name,
    })
}

/// Check if any identity in the iterator matches the allowed users list.
fn check_user_allowed<'a>(
    allowed_users: &[String],
    identities: impl IntoIterator<Item = &'a str>,
) -> bool {
    let ids: Vec<&str> = identities.into_iter().collect();
    allowed_users
        .iter()
        .any(|u| u == "*" || ids.contains(&u.as_str()))
}

/// Split a message into chunks that fit Telegram's character limit.
/// Tries to split on newlines, then spaces, then hard-cuts.
fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.len() <= max_len {
            chunks.push(remaining.to_string());
            break;
        }

        // A multibyte character straddling the limit moves the cut
        // left, never into the middle of the character.
        let cut = match floor_char_boundary(remaining, max_len) {
            0 => remaining
                .chars()
                .next()
                .map_or(remaining.len(), char::len_utf8),
            n => n,
        };
        let chunk = &remaining[..cut];
        let split_at = chunk
            .rfind('\n')
            .or_else(|| chunk.rfind(' '))
            .unwrap_or(cut);

        // Don't split at position 0 (infinite loop guard)
        let split_at = if split_at == 0 { cut } else { split_at };

        chunks.push(remaining[..split_at].to_string());
        remaining = remaining[split_at..].trim_start();
    }

    chunks
}

// ── Tests ───────────────────────────────────────────────────────────

//! Channel trait and message types.

use std::pin::Pin;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::Stream;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ChannelError;

/// A message received from a channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomingMessage {
    pub id: Uuid,
    /// Which channel produced the message.
    pub channel: String,
    /// Stable submitter identity within the channel.
    pub user_id: String,
    /// Display name, when the channel knows one.
    pub user_name: Option<String>,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// Channel-specific routing data (e.g. Telegram chat_id).
    pub metadata: serde_json::Value,
}

impl IncomingMessage {
    pub fn new(
        channel: impl Into<String>,
        user_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            channel: channel.into(),
            user_id: user_id.into(),
            user_name: None,
            content: content.into(),
            timestamp: Utc::now(),
            metadata: serde_json::Value::Null,
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_user_name(mut self, name: impl Into<String>) -> Self {
        self.user_name = Some(name.into());
        self
    }
}

/// A response to send back on a channel.
#[derive(Debug, Clone)]
pub struct OutgoingResponse {
    pub content: String,
}

impl OutgoingResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }
}

/// Out-of-band progress updates. Channels render these their own way,
/// or drop them.
#[derive(Debug, Clone)]
pub enum StatusUpdate {
    /// A task started executing against a project directory.
    Executing { project: String },
    /// A notable event worth a message of its own.
    Notice(String),
}

/// Boxed stream of incoming messages.
pub type MessageStream = Pin<Box<dyn Stream<Item = IncomingMessage> + Send>>;

/// A message transport.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Short channel name used for routing ("telegram", "cli").
    fn name(&self) -> &str;

    /// Start listening. Returns the stream of incoming messages.
    async fn start(&self) -> Result<MessageStream, ChannelError>;

    /// Send a response correlated with an incoming message.
    async fn respond(
        &self,
        msg: &IncomingMessage,
        response: OutgoingResponse,
    ) -> Result<(), ChannelError>;

    /// Send an uncorrelated update, routed by the metadata captured from
    /// the originating message.
    async fn send_status(
        &self,
        status: StatusUpdate,
        metadata: &serde_json::Value,
    ) -> Result<(), ChannelError>;

    /// Verify the channel can reach its backend.
    async fn health_check(&self) -> Result<(), ChannelError>;

    /// Stop the channel.
    async fn shutdown(&self) -> Result<(), ChannelError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incoming_message_builders() {
        let msg = IncomingMessage::new("telegram", "42", "hello")
            .with_metadata(serde_json::json!({"chat_id": "99"}))
            .with_user_name("Alice");

        assert_eq!(msg.channel, "telegram");
        assert_eq!(msg.user_id, "42");
        assert_eq!(msg.content, "hello");
        assert_eq!(msg.user_name.as_deref(), Some("Alice"));
        assert_eq!(
            msg.metadata.get("chat_id").and_then(|v| v.as_str()),
            Some("99")
        );
    }

    #[test]
    fn metadata_defaults_to_null() {
        let msg = IncomingMessage::new("cli", "local-user", "hi");
        assert!(msg.metadata.is_null());
        assert!(msg.metadata.get("chat_id").is_none());
    }
}

//! Channel manager — owns registered channels and merges their streams.

use std::collections::HashMap;

use futures::stream::select_all;
use tracing::{info, warn};

use crate::channels::{Channel, IncomingMessage, MessageStream, OutgoingResponse, StatusUpdate};
use crate::error::ChannelError;

/// Holds every registered channel and routes traffic by channel name.
#[derive(Default)]
pub struct ChannelManager {
    channels: HashMap<String, Box<dyn Channel>>,
}

impl ChannelManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a channel. A later channel with the same name replaces
    /// the earlier one.
    pub fn add(&mut self, channel: Box<dyn Channel>) {
        self.channels.insert(channel.name().to_string(), channel);
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Names of registered channels, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.channels.keys().cloned().collect();
        names.sort();
        names
    }

    /// Start every channel and merge their message streams into one.
    /// A channel that fails to start is logged and skipped; at least one
    /// must come up.
    pub async fn start_all(&self) -> Result<MessageStream, ChannelError> {
        let mut streams = Vec::new();
        for (name, channel) in &self.channels {
            match channel.start().await {
                Ok(stream) => {
                    info!(channel = %name, "Channel started");
                    streams.push(stream);
                }
                Err(e) => {
                    warn!(channel = %name, "Channel failed to start: {e}");
                }
            }
        }

        if streams.is_empty() {
            return Err(ChannelError::StartupFailed {
                name: "all".to_string(),
                reason: "no channel could be started".to_string(),
            });
        }
        Ok(Box::pin(select_all(streams)))
    }

    /// Respond on the channel a message arrived on.
    pub async fn respond(
        &self,
        msg: &IncomingMessage,
        response: OutgoingResponse,
    ) -> Result<(), ChannelError> {
        let channel = self
            .channels
            .get(&msg.channel)
            .ok_or_else(|| ChannelError::UnknownChannel(msg.channel.clone()))?;
        channel.respond(msg, response).await
    }

    /// Send a status update on a named channel.
    pub async fn send_status(
        &self,
        channel_name: &str,
        status: StatusUpdate,
        metadata: &serde_json::Value,
    ) -> Result<(), ChannelError> {
        let channel = self
            .channels
            .get(channel_name)
            .ok_or_else(|| ChannelError::UnknownChannel(channel_name.to_string()))?;
        channel.send_status(status, metadata).await
    }

    /// Shut down every channel, logging failures rather than stopping
    /// early.
    pub async fn shutdown_all(&self) -> Result<(), ChannelError> {
        for (name, channel) in &self.channels {
            if let Err(e) = channel.shutdown().await {
                warn!(channel = %name, "Channel shutdown error: {e}");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct StubChannel {
        name: &'static str,
    }

    #[async_trait]
    impl Channel for StubChannel {
        fn name(&self) -> &str {
            self.name
        }

        async fn start(&self) -> Result<MessageStream, ChannelError> {
            Ok(Box::pin(futures::stream::empty()))
        }

        async fn respond(
            &self,
            _msg: &IncomingMessage,
            _response: OutgoingResponse,
        ) -> Result<(), ChannelError> {
            Ok(())
        }

        async fn send_status(
            &self,
            _status: StatusUpdate,
            _metadata: &serde_json::Value,
        ) -> Result<(), ChannelError> {
            Ok(())
        }

        async fn health_check(&self) -> Result<(), ChannelError> {
            Ok(())
        }

        async fn shutdown(&self) -> Result<(), ChannelError> {
            Ok(())
        }
    }

    #[test]
    fn add_and_list_channels() {
        let mut manager = ChannelManager::new();
        assert!(manager.is_empty());

        manager.add(Box::new(StubChannel { name: "cli" }));
        manager.add(Box::new(StubChannel { name: "telegram" }));

        assert!(!manager.is_empty());
        assert_eq!(manager.names(), vec!["cli", "telegram"]);
    }

    #[tokio::test]
    async fn respond_unknown_channel_errors() {
        let manager = ChannelManager::new();
        let msg = IncomingMessage::new("ghost", "u", "hi");
        let err = manager
            .respond(&msg, OutgoingResponse::text("reply"))
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::UnknownChannel(_)));
    }

    #[tokio::test]
    async fn start_all_merges_streams() {
        let mut manager = ChannelManager::new();
        manager.add(Box::new(StubChannel { name: "cli" }));

        // The stub produces an empty stream, so the merged stream ends.
        use futures::StreamExt;
        let mut stream = manager.start_all().await.unwrap();
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn start_all_with_no_channels_errors() {
        let manager = ChannelManager::new();
        assert!(manager.start_all().await.is_err());
    }
}

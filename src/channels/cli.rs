//! CLI channel — a stdin/stdout REPL, mainly for running the bot without
//! a Telegram token.

use async_trait::async_trait;
use futures::stream;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::channels::{Channel, IncomingMessage, MessageStream, OutgoingResponse, StatusUpdate};
use crate::error::ChannelError;

/// Submitter identity for everything typed on the terminal.
const LOCAL_USER: &str = "local-user";

pub struct CliChannel;

impl CliChannel {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Channel for CliChannel {
    fn name(&self) -> &str {
        "cli"
    }

    async fn start(&self) -> Result<MessageStream, ChannelError> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();

        tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            eprint!("> ");

            loop {
                let line = match lines.next_line().await {
                    Ok(Some(line)) => line,
                    // EOF reads as a quit so the bot winds down instead of
                    // idling on a closed terminal.
                    Ok(None) => {
                        let _ = tx.send(IncomingMessage::new("cli", LOCAL_USER, "/quit"));
                        break;
                    }
                    Err(e) => {
                        tracing::error!("Error reading stdin: {e}");
                        break;
                    }
                };

                let trimmed = line.trim();
                if trimmed.is_empty() {
                    eprint!("> ");
                    continue;
                }
                if tx
                    .send(IncomingMessage::new("cli", LOCAL_USER, trimmed))
                    .is_err()
                {
                    break;
                }
            }
        });

        let stream = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|msg| (msg, rx))
        });

        Ok(Box::pin(stream))
    }

    async fn respond(
        &self,
        _msg: &IncomingMessage,
        response: OutgoingResponse,
    ) -> Result<(), ChannelError> {
        println!("\n{}\n", response.content);
        eprint!("> ");
        Ok(())
    }

    async fn send_status(
        &self,
        status: StatusUpdate,
        _metadata: &serde_json::Value,
    ) -> Result<(), ChannelError> {
        match status {
            StatusUpdate::Executing { project } => {
                eprintln!("⚙️  Executing in {project}...");
            }
            StatusUpdate::Notice(msg) => eprintln!("ℹ️  {msg}"),
        }
        Ok(())
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), ChannelError> {
        Ok(())
    }
}

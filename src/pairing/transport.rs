//! Session transport between this receiver and connected senders
//!
//! The advertiser only needs three things: the next inbound event, a way to
//! reply to one sender, and a way to stop the whole session.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, Lines};
use tracing::{debug, warn};

/// Inbound event from the session transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TransportEvent {
    Message {
        #[serde(rename = "senderId")]
        sender_id: String,
        namespace: String,
        #[serde(default)]
        data: Value,
    },
    Disconnect {
        #[serde(rename = "senderId")]
        sender_id: String,
    },
}

/// Bidirectional session transport
#[async_trait]
pub trait SessionTransport: Send {
    /// Next inbound event, or `None` once the transport is closed
    async fn next_event(&mut self) -> Option<TransportEvent>;

    /// Send a message to one sender
    async fn send(&mut self, sender_id: &str, namespace: &str, data: Value) -> Result<()>;

    /// Stop the session context; no further events are delivered
    async fn stop(&mut self);
}

/// Outbound frame written by [`LineTransport`]
#[derive(Debug, Serialize)]
struct OutboundFrame<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(rename = "senderId")]
    sender_id: &'a str,
    namespace: &'a str,
    data: Value,
}

/// JSON-lines transport over any async reader/writer pair
pub struct LineTransport<R, W> {
    lines: Lines<BufReader<R>>,
    writer: W,
    stopped: bool,
}

/// Transport bound to the process's stdin/stdout
pub type StdioTransport = LineTransport<tokio::io::Stdin, tokio::io::Stdout>;

impl StdioTransport {
    pub fn stdio() -> Self {
        LineTransport::new(tokio::io::stdin(), tokio::io::stdout())
    }
}

impl<R, W> LineTransport<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            lines: BufReader::new(reader).lines(),
            writer,
            stopped: false,
        }
    }

    pub fn into_writer(self) -> W {
        self.writer
    }
}

#[async_trait]
impl<R, W> SessionTransport for LineTransport<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn next_event(&mut self) -> Option<TransportEvent> {
        while !self.stopped {
            let line = match self.lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => return None,
                Err(e) => {
                    warn!(error = %e, "transport read failed");
                    return None;
                }
            };

            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            match serde_json::from_str::<TransportEvent>(line) {
                Ok(event) => return Some(event),
                Err(e) => debug!(error = %e, "ignoring malformed transport frame"),
            }
        }
        None
    }

    async fn send(&mut self, sender_id: &str, namespace: &str, data: Value) -> Result<()> {
        let frame = OutboundFrame {
            kind: "message",
            sender_id,
            namespace,
            data,
        };
        let mut line = serde_json::to_string(&frame)?;
        line.push('\n');
        self.writer
            .write_all(line.as_bytes())
            .await
            .context("Failed to write transport frame")?;
        self.writer.flush().await.context("Failed to flush transport")?;
        Ok(())
    }

    async fn stop(&mut self) {
        self.stopped = true;
        let _ = self.writer.flush().await;
    }
}

//! Pairing code advertiser
//!
//! Answers pair requests from senders with the current pairing code and pins
//! the session to the first collection that asks. Anything unexpected ends the
//! session so the host can relaunch a clean one.

use serde_json::{json, Value};
use std::fmt;
use tracing::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::models::{BindOutcome, SessionBinding};
use crate::pairing::transport::{SessionTransport, TransportEvent};

/// Message namespace for pair requests and replies
pub const PAIR_REQUEST_NAMESPACE: &str = "urn:x-cast:pair-request";

/// Why an advertiser session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    /// A pair request named a different collection than the bound one
    CollectionMismatch {
        bound: Option<String>,
        requested: Option<String>,
    },
    /// No pairing code was available when a request arrived
    CodeUnavailable,
    /// A sender disconnected
    SenderDisconnected(String),
    /// The transport closed on its own
    TransportClosed,
    /// The shared cancellation token fired
    Cancelled,
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Termination::CollectionMismatch { bound, requested } => write!(
                f,
                "collection mismatch (bound {:?}, requested {:?})",
                bound, requested
            ),
            Termination::CodeUnavailable => write!(f, "pairing code unavailable"),
            Termination::SenderDisconnected(id) => write!(f, "sender {} disconnected", id),
            Termination::TransportClosed => write!(f, "transport closed"),
            Termination::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Advertiser lifecycle state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdvertiserState {
    Idle,
    Listening,
    Bound(Option<String>),
    Terminated(Termination),
}

/// Serves pairing codes over a session transport
pub struct Advertiser<T, P> {
    transport: T,
    code_provider: P,
    binding: SessionBinding,
    state: AdvertiserState,
    cancel: CancelToken,
}

impl<T, P> Advertiser<T, P>
where
    T: SessionTransport,
    P: Fn() -> Option<String> + Send,
{
    /// `code_provider` is called on every request, so a rotated code is
    /// picked up without restarting the advertiser.
    pub fn new(transport: T, code_provider: P, cancel: CancelToken) -> Self {
        Self {
            transport,
            code_provider,
            binding: SessionBinding::new(),
            state: AdvertiserState::Idle,
            cancel,
        }
    }

    pub fn state(&self) -> &AdvertiserState {
        &self.state
    }

    pub fn binding(&self) -> &SessionBinding {
        &self.binding
    }

    /// Handle events in arrival order until the session terminates.
    ///
    /// On return the transport is stopped and the shared token cancelled.
    pub async fn run(&mut self) -> Termination {
        self.state = AdvertiserState::Listening;
        info!(namespace = PAIR_REQUEST_NAMESPACE, "advertising pairing code");

        let reason = loop {
            let event = match self.cancel.run(self.transport.next_event()).await {
                Ok(Some(event)) => event,
                Ok(None) => break Termination::TransportClosed,
                Err(_) => break Termination::Cancelled,
            };

            if let Some(reason) = self.handle_event(event).await {
                break reason;
            }
        };

        self.terminate(reason).await
    }

    /// Process one event; `Some` means the session must end
    pub async fn handle_event(&mut self, event: TransportEvent) -> Option<Termination> {
        match event {
            TransportEvent::Message {
                sender_id,
                namespace,
                data,
            } => {
                if namespace != PAIR_REQUEST_NAMESPACE {
                    debug!(%namespace, "ignoring message on foreign namespace");
                    return None;
                }
                self.handle_pair_request(&sender_id, &data).await
            }
            TransportEvent::Disconnect { sender_id } => {
                info!(%sender_id, "sender disconnected");
                Some(Termination::SenderDisconnected(sender_id))
            }
        }
    }

    async fn handle_pair_request(&mut self, sender_id: &str, data: &Value) -> Option<Termination> {
        let collection_id = extract_collection_id(data);

        match self.binding.bind(collection_id.as_deref()) {
            BindOutcome::Mismatch { bound, requested } => {
                warn!(?bound, ?requested, "pair request for a different collection");
                return Some(Termination::CollectionMismatch { bound, requested });
            }
            BindOutcome::Bound => {
                info!(collection_id = ?collection_id, "session bound");
            }
            BindOutcome::Unchanged => {}
        }
        self.state = AdvertiserState::Bound(self.binding.paired_collection_id.clone());

        let Some(code) = (self.code_provider)() else {
            warn!("pair request arrived with no pairing code available");
            return Some(Termination::CodeUnavailable);
        };

        let reply = json!({ "code": code });
        if let Err(e) = self.transport.send(sender_id, PAIR_REQUEST_NAMESPACE, reply).await {
            // The sender will ask again; a failed reply does not end the session
            warn!(%sender_id, error = %e, "failed to send pairing code");
        } else {
            debug!(%sender_id, "sent pairing code");
        }

        self.state = AdvertiserState::Listening;
        None
    }

    async fn terminate(&mut self, reason: Termination) -> Termination {
        info!(%reason, "ending advertiser session");
        self.transport.stop().await;
        self.cancel.cancel();
        self.state = AdvertiserState::Terminated(reason.clone());
        reason
    }

    pub fn into_transport(self) -> T {
        self.transport
    }
}

/// Pull `collectionID` out of a request body; numbers are accepted too
fn extract_collection_id(data: &Value) -> Option<String> {
    match data.get("collectionID")? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_collection_id() {
        assert_eq!(extract_collection_id(&json!({"collectionID": "12"})).as_deref(), Some("12"));
        assert_eq!(extract_collection_id(&json!({"collectionID": 12})).as_deref(), Some("12"));
        assert_eq!(extract_collection_id(&json!({"collectionID": null})), None);
        assert_eq!(extract_collection_id(&json!({})), None);
        assert_eq!(extract_collection_id(&Value::Null), None);
    }

    #[test]
    fn test_termination_display() {
        assert_eq!(Termination::CodeUnavailable.to_string(), "pairing code unavailable");
        assert_eq!(
            Termination::SenderDisconnected("s1".into()).to_string(),
            "sender s1 disconnected"
        );
    }
}

//! Pairing phase tests
//!
//! Tests the advertiser against scripted and line-based transports, and
//! credential retrieval against both a mock server and an in-process backend.

use async_trait::async_trait;
use mockito::{Matcher, Server};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use castpair::api::{CastApiClient, CastApiError, CastBackend, DiffPage};
use castpair::cancel::CancelToken;
use castpair::crypto::{self, KeyPair};
use castpair::models::Registration;
use castpair::pairing::{
    get_cast_data, poll_for_credentials, register, Advertiser, AdvertiserState, CredentialError,
    LineTransport, SessionTransport, Termination, TransportEvent, PAIR_REQUEST_NAMESPACE,
};
use castpair::receiver::CodeSlot;

// =============================================================================
// Helpers
// =============================================================================

type Sent = Arc<Mutex<Vec<(String, String, Value)>>>;

/// Transport that replays a fixed script of events
struct ScriptedTransport {
    events: VecDeque<TransportEvent>,
    sent: Sent,
    stopped: Arc<AtomicBool>,
    /// Keep the session open once the script runs out
    hold_open: bool,
}

impl ScriptedTransport {
    fn new(events: Vec<TransportEvent>) -> Self {
        Self {
            events: events.into(),
            sent: Arc::default(),
            stopped: Arc::default(),
            hold_open: false,
        }
    }

    fn held_open(mut self) -> Self {
        self.hold_open = true;
        self
    }
}

#[async_trait]
impl SessionTransport for ScriptedTransport {
    async fn next_event(&mut self) -> Option<TransportEvent> {
        if self.stopped.load(Ordering::SeqCst) {
            return None;
        }
        match self.events.pop_front() {
            Some(event) => Some(event),
            None if self.hold_open => std::future::pending().await,
            None => None,
        }
    }

    async fn send(&mut self, sender_id: &str, namespace: &str, data: Value) -> anyhow::Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((sender_id.to_string(), namespace.to_string(), data));
        Ok(())
    }

    async fn stop(&mut self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

fn pair_request(sender: &str, collection_id: Option<&str>) -> TransportEvent {
    let data = match collection_id {
        Some(id) => json!({ "collectionID": id }),
        None => json!({}),
    };
    TransportEvent::Message {
        sender_id: sender.into(),
        namespace: PAIR_REQUEST_NAMESPACE.into(),
        data,
    }
}

fn fixed_code(code: &'static str) -> impl Fn() -> Option<String> + Send {
    move || Some(code.to_string())
}

fn registration(code: &str) -> Registration {
    let keys = KeyPair::generate();
    let public = keys.public_key();
    let (_, secret) = keys.into_parts();
    Registration::new(code, public, secret)
}

fn sealed_credentials(reg: &Registration, key: &[u8], token: &str) -> String {
    let payload = json!({
        "collectionKey": crypto::to_b64(key),
        "castToken": token,
    });
    let sealed = crypto::seal(payload.to_string().as_bytes(), &reg.public_key).unwrap();
    crypto::to_b64(&sealed)
}

// =============================================================================
// Advertiser Tests
// =============================================================================

#[tokio::test]
async fn test_repeated_requests_for_same_collection_are_answered() {
    let transport = ScriptedTransport::new(vec![
        pair_request("s1", Some("42")),
        pair_request("s1", Some("42")),
        pair_request("s2", Some("42")),
    ]);
    let sent = transport.sent.clone();
    let cancel = CancelToken::new();

    let mut advertiser = Advertiser::new(transport, fixed_code("AB12CD"), cancel.clone());
    let reason = advertiser.run().await;

    // Script ran out, so the transport closed
    assert_eq!(reason, Termination::TransportClosed);
    assert_eq!(
        advertiser.binding().paired_collection_id.as_deref(),
        Some("42")
    );

    let sent = sent.lock().unwrap();
    assert_eq!(sent.len(), 3);
    for (_, namespace, data) in sent.iter() {
        assert_eq!(namespace, PAIR_REQUEST_NAMESPACE);
        assert_eq!(data, &json!({ "code": "AB12CD" }));
    }
    assert_eq!(sent[2].0, "s2");
}

#[tokio::test]
async fn test_mismatched_collection_terminates_session() {
    let transport = ScriptedTransport::new(vec![
        pair_request("s1", Some("42")),
        pair_request("s2", Some("99")),
        pair_request("s1", Some("42")),
    ]);
    let sent = transport.sent.clone();
    let stopped = transport.stopped.clone();
    let cancel = CancelToken::new();

    let mut advertiser = Advertiser::new(transport, fixed_code("AB12CD"), cancel.clone());
    let reason = advertiser.run().await;

    assert_eq!(
        reason,
        Termination::CollectionMismatch {
            bound: Some("42".into()),
            requested: Some("99".into()),
        }
    );
    assert!(matches!(advertiser.state(), AdvertiserState::Terminated(_)));
    assert!(stopped.load(Ordering::SeqCst));
    assert!(cancel.is_cancelled());

    // Only the first request got a reply; nothing after the mismatch
    assert_eq!(sent.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_absent_then_present_collection_is_mismatch() {
    let transport = ScriptedTransport::new(vec![
        pair_request("s1", None),
        pair_request("s1", Some("42")),
    ]);
    let cancel = CancelToken::new();

    let mut advertiser = Advertiser::new(transport, fixed_code("AB12CD"), cancel);
    let reason = advertiser.run().await;

    assert_eq!(
        reason,
        Termination::CollectionMismatch {
            bound: None,
            requested: Some("42".into()),
        }
    );
}

#[tokio::test]
async fn test_absent_collection_twice_is_unchanged() {
    let transport = ScriptedTransport::new(vec![pair_request("s1", None), pair_request("s1", None)]);
    let sent = transport.sent.clone();

    let mut advertiser = Advertiser::new(transport, fixed_code("AB12CD"), CancelToken::new());
    let reason = advertiser.run().await;

    assert_eq!(reason, Termination::TransportClosed);
    assert!(advertiser.binding().is_bound());
    assert_eq!(advertiser.binding().paired_collection_id, None);
    assert_eq!(sent.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn test_missing_code_terminates_session() {
    let transport = ScriptedTransport::new(vec![pair_request("s1", Some("42"))]);
    let sent = transport.sent.clone();
    let cancel = CancelToken::new();

    let mut advertiser = Advertiser::new(transport, || None, cancel.clone());
    let reason = advertiser.run().await;

    assert_eq!(reason, Termination::CodeUnavailable);
    assert!(cancel.is_cancelled());
    assert!(sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_disconnect_terminates_session() {
    let transport = ScriptedTransport::new(vec![
        pair_request("s1", Some("42")),
        TransportEvent::Disconnect {
            sender_id: "s1".into(),
        },
        pair_request("s1", Some("42")),
    ])
    .held_open();
    let sent = transport.sent.clone();
    let cancel = CancelToken::new();

    let mut advertiser = Advertiser::new(transport, fixed_code("AB12CD"), cancel.clone());
    let reason = advertiser.run().await;

    assert_eq!(reason, Termination::SenderDisconnected("s1".into()));
    assert!(cancel.is_cancelled());
    assert_eq!(sent.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_foreign_namespace_is_ignored() {
    let transport = ScriptedTransport::new(vec![
        TransportEvent::Message {
            sender_id: "s1".into(),
            namespace: "urn:x-cast:media".into(),
            data: json!({ "collectionID": "7" }),
        },
        pair_request("s1", Some("42")),
    ]);
    let sent = transport.sent.clone();

    let mut advertiser = Advertiser::new(transport, fixed_code("AB12CD"), CancelToken::new());
    let reason = advertiser.run().await;

    // The foreign message neither bound nor mismatched the session
    assert_eq!(reason, Termination::TransportClosed);
    assert_eq!(
        advertiser.binding().paired_collection_id.as_deref(),
        Some("42")
    );
    assert_eq!(sent.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_rotated_code_is_served_without_restart() {
    let transport = ScriptedTransport::new(Vec::new());
    let sent = transport.sent.clone();
    let slot = CodeSlot::new();
    slot.set("FIRST1");

    let mut advertiser = Advertiser::new(transport, slot.provider(), CancelToken::new());

    assert_eq!(advertiser.handle_event(pair_request("s1", Some("42"))).await, None);
    slot.set("SECOND");
    assert_eq!(advertiser.handle_event(pair_request("s1", Some("42"))).await, None);

    let sent = sent.lock().unwrap();
    assert_eq!(sent[0].2["code"], "FIRST1");
    assert_eq!(sent[1].2["code"], "SECOND");
}

#[tokio::test]
async fn test_external_cancel_stops_advertiser() {
    let transport = ScriptedTransport::new(Vec::new()).held_open();
    let stopped = transport.stopped.clone();
    let cancel = CancelToken::new();

    let mut advertiser = Advertiser::new(transport, fixed_code("AB12CD"), cancel.clone());
    let task = tokio::spawn(async move { advertiser.run().await });

    tokio::task::yield_now().await;
    cancel.cancel();

    let reason = task.await.unwrap();
    assert_eq!(reason, Termination::Cancelled);
    assert!(stopped.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_advertiser_over_line_transport() {
    let input = [
        r#"{"type":"message","senderId":"tv-remote","namespace":"urn:x-cast:pair-request","data":{"collectionID":5}}"#,
        "garbage",
        r#"{"type":"message","senderId":"tv-remote","namespace":"urn:x-cast:pair-request","data":{"collectionID":"5"}}"#,
        r#"{"type":"disconnect","senderId":"tv-remote"}"#,
    ]
    .join("\n");
    let transport = LineTransport::new(input.as_bytes(), Vec::new());

    let mut advertiser = Advertiser::new(transport, fixed_code("ZX98YW"), CancelToken::new());
    let reason = advertiser.run().await;
    assert_eq!(reason, Termination::SenderDisconnected("tv-remote".into()));

    // Numeric and string ids compare equal once normalized
    let written = String::from_utf8(advertiser.into_transport().into_writer()).unwrap();
    let frames: Vec<Value> = written
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(frames.len(), 2);
    for frame in frames {
        assert_eq!(frame["type"], "message");
        assert_eq!(frame["senderId"], "tv-remote");
        assert_eq!(frame["namespace"], PAIR_REQUEST_NAMESPACE);
        assert_eq!(frame["data"]["code"], "ZX98YW");
    }
}

// =============================================================================
// Registration Tests
// =============================================================================

#[tokio::test]
async fn test_register_against_server() {
    let mut server = Server::new_async().await;

    let mock = server
        .mock("POST", "/cast/device-registration")
        .match_body(Matcher::Regex(r#""publicKey":"[A-Za-z0-9+/=]{44}""#.into()))
        .with_status(200)
        .with_body(r#"{"pairingCode": "QW12ER"}"#)
        .create_async()
        .await;

    let client = CastApiClient::with_base_url(server.url());
    let reg = register(&client, Duration::from_millis(10), &CancelToken::new())
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(reg.pairing_code, "QW12ER");
}

// =============================================================================
// Credential Tests
// =============================================================================

#[tokio::test]
async fn test_get_cast_data_opens_sealed_payload() {
    let mut server = Server::new_async().await;
    let reg = registration("AB12CD");
    let key = crypto::generate_key();

    let body = json!({ "encryptedPayload": sealed_credentials(&reg, &key, "cast-token") });
    let _mock = server
        .mock("GET", "/cast/device-credentials")
        .match_query(Matcher::UrlEncoded("pairingCode".into(), "AB12CD".into()))
        .with_status(200)
        .with_body(body.to_string())
        .create_async()
        .await;

    let client = CastApiClient::with_base_url(server.url());
    let credentials = get_cast_data(&client, &reg).await.unwrap().unwrap();

    assert_eq!(credentials.collection_key, key.to_vec());
    assert_eq!(credentials.cast_token, "cast-token");
}

#[tokio::test]
async fn test_get_cast_data_nothing_yet() {
    let mut server = Server::new_async().await;
    let reg = registration("AB12CD");

    let _mock = server
        .mock("GET", "/cast/device-credentials")
        .match_query(Matcher::Any)
        .with_status(404)
        .create_async()
        .await;

    let client = CastApiClient::with_base_url(server.url());
    assert!(get_cast_data(&client, &reg).await.unwrap().is_none());
}

#[tokio::test]
async fn test_get_cast_data_sealed_to_another_device() {
    let mut server = Server::new_async().await;
    let ours = registration("AB12CD");
    let theirs = registration("AB12CD");

    let body = json!({ "encryptedPayload": sealed_credentials(&theirs, &[1u8; 32], "t") });
    let _mock = server
        .mock("GET", "/cast/device-credentials")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(body.to_string())
        .create_async()
        .await;

    let client = CastApiClient::with_base_url(server.url());
    let err = get_cast_data(&client, &ours).await.unwrap_err();

    assert!(matches!(
        err.downcast_ref::<CredentialError>(),
        Some(CredentialError::Unseal)
    ));
}

#[tokio::test]
async fn test_get_cast_data_rejects_unknown_fields() {
    let mut server = Server::new_async().await;
    let reg = registration("AB12CD");

    let payload = json!({
        "collectionKey": crypto::to_b64(&[1u8; 32]),
        "castToken": "t",
        "extra": true,
    });
    let sealed = crypto::seal(payload.to_string().as_bytes(), &reg.public_key).unwrap();
    let body = json!({ "encryptedPayload": crypto::to_b64(&sealed) });

    let _mock = server
        .mock("GET", "/cast/device-credentials")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(body.to_string())
        .create_async()
        .await;

    let client = CastApiClient::with_base_url(server.url());
    let err = get_cast_data(&client, &reg).await.unwrap_err();

    assert!(matches!(
        err.downcast_ref::<CredentialError>(),
        Some(CredentialError::Parse(_))
    ));
}

/// Backend that answers credential polls from a script
struct ScriptedPolls {
    responses: Mutex<VecDeque<Result<Option<String>, CastApiError>>>,
    polls: AtomicUsize,
}

impl ScriptedPolls {
    fn new(responses: Vec<Result<Option<String>, CastApiError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            polls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl CastBackend for ScriptedPolls {
    async fn register_device(&self, _public_key: &str) -> Result<String, CastApiError> {
        Err(CastApiError::NotFound)
    }

    async fn fetch_cast_data(&self, _pairing_code: &str) -> Result<Option<String>, CastApiError> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        self.responses.lock().unwrap().pop_front().unwrap_or(Ok(None))
    }

    async fn fetch_diff(&self, _token: &str, _since: i64) -> Result<DiffPage, CastApiError> {
        Err(CastApiError::NotFound)
    }

    async fn fetch_file(&self, _token: &str, _id: u64) -> Result<Vec<u8>, CastApiError> {
        Err(CastApiError::NotFound)
    }
}

#[tokio::test(start_paused = true)]
async fn test_poll_waits_for_payload_on_interval() {
    let reg = registration("AB12CD");
    let payload = sealed_credentials(&reg, &[9u8; 32], "cast-token");
    let backend = ScriptedPolls::new(vec![
        Ok(None),
        Err(CastApiError::ServerError(502)),
        Ok(None),
        Ok(Some(payload)),
    ]);

    let start = tokio::time::Instant::now();
    let credentials =
        poll_for_credentials(&backend, &reg, Duration::from_secs(2), &CancelToken::new())
            .await
            .unwrap();

    // First poll is immediate, then one per interval; HTTP errors are retried
    assert_eq!(backend.polls.load(Ordering::SeqCst), 4);
    assert_eq!(start.elapsed(), Duration::from_secs(6));
    assert_eq!(credentials.cast_token, "cast-token");
}

#[tokio::test(start_paused = true)]
async fn test_poll_stops_on_undecryptable_payload() {
    let reg = registration("AB12CD");
    let backend = ScriptedPolls::new(vec![Ok(None), Ok(Some(crypto::to_b64(b"not sealed")))]);

    let err = poll_for_credentials(&backend, &reg, Duration::from_secs(2), &CancelToken::new())
        .await
        .unwrap_err();

    assert!(err.is::<CredentialError>());
    assert_eq!(backend.polls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_poll_cancelled() {
    let reg = registration("AB12CD");
    let backend = ScriptedPolls::new(Vec::new());
    let cancel = CancelToken::new();

    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(5)).await;
        canceller.cancel();
    });

    let result = poll_for_credentials(&backend, &reg, Duration::from_secs(2), &cancel).await;

    assert!(result.is_err());
    // Polls at 0s, 2s and 4s; cancelled before the 6s tick
    assert_eq!(backend.polls.load(Ordering::SeqCst), 3);
}

//! Credential polling
//!
//! The sender posts the collection key and cast token sealed to our public
//! key. Until it does, the backend has nothing for our pairing code.

use anyhow::Result;
use std::time::Duration;
use thiserror::Error;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, instrument, warn};

use crate::api::{CastApiError, CastBackend};
use crate::cancel::CancelToken;
use crate::crypto::{self, CryptoError};
use crate::models::{Credentials, CredentialsPayload, Registration};

/// Default interval between credential polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// A payload was returned but could not be turned into credentials
#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("Payload is not valid base64: {0}")]
    Decode(CryptoError),

    #[error("Payload could not be opened with this device's key")]
    Unseal,

    #[error("Payload is not a valid credential document: {0}")]
    Parse(String),
}

/// Fetch and open the credential payload once.
///
/// `Ok(None)` means the sender has not posted anything yet.
pub async fn get_cast_data(
    backend: &dyn CastBackend,
    registration: &Registration,
) -> Result<Option<Credentials>> {
    let Some(encrypted) = backend.fetch_cast_data(&registration.pairing_code).await? else {
        return Ok(None);
    };

    Ok(Some(open_payload(&encrypted, registration)?))
}

/// Decode, unseal and validate a sealed payload
pub fn open_payload(
    encrypted_b64: &str,
    registration: &Registration,
) -> Result<Credentials, CredentialError> {
    let sealed = crypto::from_b64(encrypted_b64).map_err(CredentialError::Decode)?;
    let plaintext =
        crypto::unseal(&sealed, registration.private_key()).map_err(|_| CredentialError::Unseal)?;

    let payload: CredentialsPayload =
        serde_json::from_slice(&plaintext).map_err(|e| CredentialError::Parse(e.to_string()))?;
    Credentials::from_payload(payload).map_err(|e| CredentialError::Parse(e.to_string()))
}

/// Poll on a fixed interval until credentials arrive.
///
/// Polls are awaited one at a time; a tick that fires while a poll is still
/// running is skipped. Network and HTTP failures are retried on the next
/// tick, payload failures are returned immediately.
#[instrument(skip_all, fields(interval_ms = interval.as_millis() as u64))]
pub async fn poll_for_credentials(
    backend: &dyn CastBackend,
    registration: &Registration,
    interval: Duration,
    cancel: &CancelToken,
) -> Result<Credentials> {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut polls: u64 = 0;

    loop {
        cancel.run(ticker.tick()).await?;
        polls += 1;

        match cancel.run(get_cast_data(backend, registration)).await? {
            Ok(Some(credentials)) => {
                info!(polls, "received cast credentials");
                return Ok(credentials);
            }
            Ok(None) => debug!(polls, "no cast data yet"),
            Err(e) if e.is::<CastApiError>() => {
                warn!(polls, error = %e, "credential poll failed");
            }
            Err(e) => return Err(e),
        }
    }
}

//! Local key-value state for paired credentials
//!
//! Credentials are written once after pairing and read back when the
//! slideshow starts. State lives in memory for the lifetime of the process.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use thiserror::Error;

use crate::crypto::{self, CryptoError};
use crate::models::{Credentials, CredentialsPayload};

/// Key under which the base64 collection key is stored
pub const COLLECTION_KEY: &str = "collectionKey";

/// Key under which the cast access token is stored
pub const CAST_TOKEN: &str = "castToken";

/// Store error types
#[derive(Error, Debug, PartialEq, Eq)]
pub enum StoreError {
    #[error("Missing stored entry: {0}")]
    Missing(&'static str),

    #[error("Stored entry is invalid: {0}")]
    Invalid(#[from] CryptoError),
}

/// String key-value storage, localStorage style
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: String);
    fn remove(&self, key: &str);
}

/// In-memory store
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: String) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value);
    }

    fn remove(&self, key: &str) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }
}

/// Persist credentials after a successful pairing
pub fn save_credentials(store: &dyn KeyValueStore, credentials: &Credentials) {
    let payload = credentials.to_payload();
    store.set(COLLECTION_KEY, payload.collection_key);
    store.set(CAST_TOKEN, payload.cast_token);
}

/// Read credentials back; both entries must be present
pub fn load_credentials(store: &dyn KeyValueStore) -> Result<Credentials, StoreError> {
    let collection_key = store.get(COLLECTION_KEY).ok_or(StoreError::Missing(COLLECTION_KEY))?;
    let cast_token = store.get(CAST_TOKEN).ok_or(StoreError::Missing(CAST_TOKEN))?;

    Ok(Credentials::from_payload(CredentialsPayload {
        collection_key,
        cast_token,
    })?)
}

/// Forget stored credentials (used when a new pairing cycle starts)
pub fn clear_credentials(store: &dyn KeyValueStore) {
    store.remove(COLLECTION_KEY);
    store.remove(CAST_TOKEN);
}

/// Store credentials given on the command line
pub fn seed_credentials(
    store: &dyn KeyValueStore,
    collection_key_b64: &str,
    cast_token: &str,
) -> Result<(), StoreError> {
    // Validate before writing so a bad key fails at startup
    let key = crypto::from_b64(collection_key_b64)?;
    let credentials = Credentials::new(key, cast_token);
    if credentials.collection_key.len() != crypto::KEY_BYTES {
        return Err(StoreError::Invalid(CryptoError::InvalidKey(
            credentials.collection_key.len(),
        )));
    }
    save_credentials(store, &credentials);
    Ok(())
}

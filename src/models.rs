//! Data structures shared across the pairing and streaming phases
//!
//! Organized by phase:
//! - **Pairing**: registration keys, session binding, decrypted credentials
//! - **Collection**: encrypted records as served, decrypted records as used
//! - **Display**: renderable handles and slides

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;
use zeroize::Zeroize;

use crate::crypto::{self, CryptoError, KEY_BYTES};

// =============================================================================
// Pairing Models
// =============================================================================

/// Result of a successful device registration.
///
/// The private key stays inside this process. A refreshed pairing code means a
/// new `Registration`, never a mutated one.
pub struct Registration {
    pub pairing_code: String,
    pub public_key: [u8; KEY_BYTES],
    private_key: crypto_box::SecretKey,
}

impl Registration {
    pub fn new(
        pairing_code: impl Into<String>,
        public_key: [u8; KEY_BYTES],
        private_key: crypto_box::SecretKey,
    ) -> Self {
        Self {
            pairing_code: pairing_code.into(),
            public_key,
            private_key,
        }
    }

    pub fn private_key(&self) -> &crypto_box::SecretKey {
        &self.private_key
    }

    /// Public key as sent to the backend
    pub fn public_key_b64(&self) -> String {
        crypto::to_b64(&self.public_key)
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("pairing_code", &self.pairing_code)
            .field("public_key", &self.public_key_b64())
            .field("private_key", &"<redacted>")
            .finish()
    }
}

/// Collection binding for one advertiser session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionBinding {
    pub paired_collection_id: Option<String>,
    bound: bool,
}

/// Outcome of offering a collection id to a [`SessionBinding`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindOutcome {
    /// First handshake of the session; the id is now bound
    Bound,
    /// Same id as the one already bound
    Unchanged,
    /// Differs from the bound id; the session must be torn down
    Mismatch {
        bound: Option<String>,
        requested: Option<String>,
    },
}

impl SessionBinding {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_bound(&self) -> bool {
        self.bound
    }

    /// First writer wins. Later requests are compared by plain equality, so
    /// an absent id after a present one (or the reverse) is a mismatch.
    pub fn bind(&mut self, collection_id: Option<&str>) -> BindOutcome {
        if !self.bound {
            self.bound = true;
            self.paired_collection_id = collection_id.map(str::to_owned);
            return BindOutcome::Bound;
        }

        if self.paired_collection_id.as_deref() == collection_id {
            BindOutcome::Unchanged
        } else {
            BindOutcome::Mismatch {
                bound: self.paired_collection_id.clone(),
                requested: collection_id.map(str::to_owned),
            }
        }
    }
}

/// Decrypted access credentials for one collection
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub collection_key: Vec<u8>,
    pub cast_token: String,
}

/// Wire schema of the decrypted credential payload
#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CredentialsPayload {
    #[serde(rename = "collectionKey")]
    pub collection_key: String,
    #[serde(rename = "castToken")]
    pub cast_token: String,
}

impl Credentials {
    pub fn new(collection_key: Vec<u8>, cast_token: impl Into<String>) -> Self {
        Self {
            collection_key,
            cast_token: cast_token.into(),
        }
    }

    /// Validate a decoded payload at the boundary
    pub fn from_payload(payload: CredentialsPayload) -> Result<Self, CryptoError> {
        let collection_key = crypto::from_b64(&payload.collection_key)?;
        if collection_key.len() != KEY_BYTES {
            return Err(CryptoError::InvalidKey(collection_key.len()));
        }
        Ok(Self {
            collection_key,
            cast_token: payload.cast_token,
        })
    }

    pub fn to_payload(&self) -> CredentialsPayload {
        CredentialsPayload {
            collection_key: crypto::to_b64(&self.collection_key),
            cast_token: self.cast_token.clone(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("collection_key", &"<redacted>")
            .field("cast_token", &"<redacted>")
            .finish()
    }
}

impl Drop for Credentials {
    fn drop(&mut self) {
        self.collection_key.zeroize();
    }
}

// =============================================================================
// Collection Models
// =============================================================================

/// Encrypted blob with its decryption header (both base64)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedBlob {
    pub encrypted_data: String,
    pub decryption_header: String,
}

/// Magic metadata blob (edits made after upload)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedMagicMetadata {
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub count: u32,
    pub data: String,
    pub header: String,
}

/// Location of the encrypted file content
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileAttributes {
    pub decryption_header: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
    #[serde(default)]
    pub file_size: Option<u64>,
}

/// File record as returned by the collection diff
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedFileRecord {
    pub id: u64,
    #[serde(rename = "collectionID", default)]
    pub collection_id: Option<u64>,
    #[serde(rename = "ownerID", default)]
    pub owner_id: Option<u64>,
    #[serde(default)]
    pub encrypted_key: String,
    #[serde(default)]
    pub key_decryption_nonce: String,
    pub file: Option<FileAttributes>,
    pub metadata: Option<EncryptedBlob>,
    #[serde(default)]
    pub magic_metadata: Option<EncryptedMagicMetadata>,
    #[serde(default)]
    pub pub_magic_metadata: Option<EncryptedMagicMetadata>,
    #[serde(default)]
    pub info: Option<FileInfo>,
    #[serde(default)]
    pub is_deleted: bool,
    pub updation_time: i64,
}

/// File kind as encoded in metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Image,
    Video,
    LivePhoto,
    Other(u32),
}

impl From<u32> for FileType {
    fn from(value: u32) -> Self {
        match value {
            0 => FileType::Image,
            1 => FileType::Video,
            2 => FileType::LivePhoto,
            other => FileType::Other(other),
        }
    }
}

impl FileType {
    pub fn is_displayable(&self) -> bool {
        matches!(self, FileType::Image | FileType::LivePhoto)
    }
}

impl<'de> Deserialize<'de> for FileType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        u32::deserialize(deserializer).map(FileType::from)
    }
}

/// Decrypted file metadata
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadata {
    #[serde(default)]
    pub title: String,
    pub file_type: FileType,
    /// Microseconds since the epoch
    #[serde(default)]
    pub creation_time: i64,
}

/// Decrypted magic metadata overrides
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MagicMetadata {
    #[serde(default)]
    pub edited_name: Option<String>,
    #[serde(default)]
    pub edited_time: Option<i64>,
}

/// Per-cycle decrypted view of a file
#[derive(Clone, PartialEq, Eq)]
pub struct DecryptedFileRecord {
    pub id: u64,
    pub file_key: Vec<u8>,
    pub metadata: FileMetadata,
    pub size: Option<u64>,
    /// Content decryption header (base64), carried over from the record
    pub file_header: String,
}

impl DecryptedFileRecord {
    /// Lower-cased extension of the title, if any
    pub fn extension(&self) -> Option<String> {
        let (stem, ext) = self.metadata.title.rsplit_once('.')?;
        if stem.is_empty() || ext.is_empty() {
            return None;
        }
        Some(ext.to_ascii_lowercase())
    }
}

impl fmt::Debug for DecryptedFileRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecryptedFileRecord")
            .field("id", &self.id)
            .field("metadata", &self.metadata)
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Display Models
// =============================================================================

/// Unique, never-reused identifier of a renderable handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HandleId(Uuid);

impl HandleId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for HandleId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Revocable reference to displayable image bytes.
///
/// Clones share the same revocation flag; once revoked the bytes are no longer
/// reachable through any clone.
#[derive(Clone)]
pub struct RenderableHandle {
    id: HandleId,
    file_id: u64,
    mime_type: String,
    bytes: Arc<[u8]>,
    revoked: Arc<AtomicBool>,
}

impl RenderableHandle {
    pub(crate) fn new(file_id: u64, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            id: HandleId::new(),
            file_id,
            mime_type: mime_type.into(),
            bytes: bytes.into(),
            revoked: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn id(&self) -> HandleId {
        self.id
    }

    pub fn file_id(&self) -> u64 {
        self.file_id
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn is_revoked(&self) -> bool {
        self.revoked.load(Ordering::Acquire)
    }

    /// Image bytes, or `None` once revoked
    pub fn bytes(&self) -> Option<&[u8]> {
        if self.is_revoked() {
            None
        } else {
            Some(&self.bytes)
        }
    }

    pub(crate) fn revoke(&self) {
        self.revoked.store(true, Ordering::Release);
    }
}

impl fmt::Debug for RenderableHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderableHandle")
            .field("id", &self.id)
            .field("file_id", &self.file_id)
            .field("mime_type", &self.mime_type)
            .field("len", &self.bytes.len())
            .field("revoked", &self.is_revoked())
            .finish()
    }
}

/// One emission of the slideshow
#[derive(Debug, Clone)]
pub struct Slide {
    pub current: RenderableHandle,
    /// Reserved for preloading; always `None` for now
    pub next: Option<RenderableHandle>,
}

/// Serializable summary of a slide for JSON output
#[derive(Debug, Clone, Serialize)]
pub struct SlideEvent {
    pub handle: HandleId,
    pub file_id: u64,
    pub mime_type: String,
    pub size: usize,
}

impl From<&Slide> for SlideEvent {
    fn from(slide: &Slide) -> Self {
        Self {
            handle: slide.current.id(),
            file_id: slide.current.file_id(),
            mime_type: slide.current.mime_type().to_string(),
            size: slide.current.bytes().map(<[u8]>::len).unwrap_or(0),
        }
    }
}

//! castpair - cast receiver pairing and slideshow streaming
//!
//! A display device registers a keypair, advertises a short pairing code,
//! receives sealed collection credentials from a paired sender and then
//! streams the collection's photos as an endless, paced slideshow.
//!
//! # Modules
//!
//! - `models` - Registration, binding, credentials, file records, handles
//! - `api` - Cast backend client
//! - `crypto` - Sealed boxes, secretbox, blob decryption
//! - `pairing` - Registrar, advertiser, credential poller, session transport
//! - `stream` - Collection listing, filtering, pacing, retention, streamer
//! - `store` - Local credential state
//! - `receiver` - The full pairing lifecycle

pub mod api;
pub mod cancel;
pub mod config;
pub mod crypto;
pub mod models;
pub mod pairing;
pub mod receiver;
pub mod store;
pub mod stream;

// Re-export commonly used types
pub use models::{
    Credentials, DecryptedFileRecord, EncryptedFileRecord, FileMetadata, FileType, HandleId,
    Registration, RenderableHandle, SessionBinding, Slide,
};

pub use api::{CastApiClient, CastBackend};
pub use cancel::{CancelToken, Cancelled};
pub use config::Config;
pub use receiver::{DisplaySurface, LifecycleEnd, Receiver, ReceiverConfig};
pub use store::{KeyValueStore, MemoryStore};
pub use stream::{Streamer, StreamerConfig};

//! Streaming phase
//!
//! - Collection: paginated listing and record decryption
//! - Media: eligibility, live photos, MIME sniffing
//! - Retention: handle registry and the two-handle window
//! - Pacer: fixed slide interval
//! - Streamer: the slideshow state machine

pub mod collection;
pub mod media;
pub mod pacer;
pub mod retention;
pub mod streamer;

pub use collection::{decrypt_file_record, fetch_collection_files};
pub use media::{is_file_eligible, MAX_FILE_SIZE};
pub use pacer::Pacer;
pub use retention::{HandleRegistry, RetentionQueue};
pub use streamer::{CycleState, Streamer, StreamerConfig};

//! API clients for external services
//!
//! - Cast: device registration, credential polling, collection diff, file download

pub mod cast;

pub use cast::{CastApiClient, CastApiError, CastBackend, DiffPage, ACCESS_TOKEN_HEADER};

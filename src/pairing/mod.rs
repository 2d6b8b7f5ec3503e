//! Pairing phase
//!
//! - Registrar: keypair + pairing code
//! - Advertiser: answers pair requests over the session transport
//! - Poller: waits for the sealed credentials and opens them
//! - Transport: the session transport seam

pub mod advertiser;
pub mod poller;
pub mod registrar;
pub mod transport;

pub use advertiser::{Advertiser, AdvertiserState, Termination, PAIR_REQUEST_NAMESPACE};
pub use poller::{get_cast_data, poll_for_credentials, CredentialError};
pub use registrar::register;
pub use transport::{LineTransport, SessionTransport, StdioTransport, TransportEvent};

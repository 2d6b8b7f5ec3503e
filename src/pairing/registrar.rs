//! Device registration
//!
//! Generates a keypair and registers its public key to obtain a pairing
//! code. The receiver has no other way to become pairable, so failures are
//! retried on a fixed interval until success or cancellation.

use std::time::Duration;
use tracing::{info, instrument, warn};

use crate::api::CastBackend;
use crate::cancel::{CancelToken, Cancelled};
use crate::crypto::{self, KeyPair};
use crate::models::Registration;

/// Fixed wait between registration attempts
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(10);

/// Register with the backend, retrying until it succeeds.
///
/// Each attempt uses a fresh keypair. Attempts never overlap.
#[instrument(skip_all, fields(retry_secs = retry_interval.as_secs()))]
pub async fn register(
    backend: &dyn CastBackend,
    retry_interval: Duration,
    cancel: &CancelToken,
) -> Result<Registration, Cancelled> {
    let mut attempt: u32 = 0;

    loop {
        cancel.check()?;
        attempt += 1;

        let keys = KeyPair::generate();
        let public_key = crypto::to_b64(&keys.public_key());

        match cancel.run(backend.register_device(&public_key)).await? {
            Ok(pairing_code) => {
                info!(attempt, "device registered");
                let public = keys.public_key();
                let (_, secret) = keys.into_parts();
                return Ok(Registration::new(pairing_code, public, secret));
            }
            Err(e) => {
                warn!(attempt, error = %e, "registration failed, retrying");
                cancel.sleep(retry_interval).await?;
            }
        }
    }
}

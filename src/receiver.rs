//! Receiver lifecycle
//!
//! One run of [`Receiver::run`] is one pairing lifecycle:
//! register -> advertise + poll -> store credentials -> slideshow.
//! Every run creates its own keypair, binding and credentials. Any terminal
//! condition ends the run; the host is expected to start a new one.

use anyhow::{Context, Result};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tracing::{error, info};

use crate::api::CastBackend;
use crate::cancel::CancelToken;
use crate::config::Config;
use crate::models::Slide;
use crate::pairing::{self, Advertiser, SessionTransport, Termination};
use crate::store::{self, KeyValueStore};
use crate::stream::{HandleRegistry, Streamer, StreamerConfig};

/// Where the receiver shows what it is doing
pub trait DisplaySurface: Send {
    /// Show the code a sender should enter
    fn show_pairing_code(&mut self, code: &str);

    /// Brief confirmation once credentials arrive
    fn show_paired(&mut self);

    /// Replace the current slide
    fn show_slide(&mut self, slide: &Slide);
}

/// Current pairing code shared with the advertiser
#[derive(Debug, Clone, Default)]
pub struct CodeSlot {
    code: Arc<RwLock<Option<String>>>,
}

impl CodeSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, code: impl Into<String>) {
        *self.code.write().unwrap_or_else(PoisonError::into_inner) = Some(code.into());
    }

    pub fn clear(&self) {
        *self.code.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn get(&self) -> Option<String> {
        self.code.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Provider closure for the advertiser; reads the slot on every call
    pub fn provider(&self) -> impl Fn() -> Option<String> + Send + 'static {
        let slot = self.clone();
        move || slot.get()
    }
}

/// Receiver timing
#[derive(Debug, Clone, Copy)]
pub struct ReceiverConfig {
    pub registration_retry: Duration,
    pub poll_interval: Duration,
    pub streamer: StreamerConfig,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for ReceiverConfig {
    fn from(config: &Config) -> Self {
        Self {
            registration_retry: config.registration_retry(),
            poll_interval: config.poll_interval(),
            streamer: config.streamer(),
        }
    }
}

/// How a lifecycle ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEnd {
    /// The collection had nothing displayable
    NothingToShow,
    /// The advertiser session terminated (mismatch, disconnect, ...)
    SessionTerminated(Termination),
}

pub struct Receiver {
    backend: Arc<dyn CastBackend>,
    store: Arc<dyn KeyValueStore>,
    registry: HandleRegistry,
    config: ReceiverConfig,
}

impl Receiver {
    pub fn new(
        backend: Arc<dyn CastBackend>,
        store: Arc<dyn KeyValueStore>,
        registry: HandleRegistry,
        config: ReceiverConfig,
    ) -> Self {
        Self {
            backend,
            store,
            registry,
            config,
        }
    }

    /// Run one full pairing lifecycle
    pub async fn run<T, D>(&self, transport: T, display: &mut D) -> Result<LifecycleEnd>
    where
        T: SessionTransport + 'static,
        D: DisplaySurface,
    {
        let cancel = CancelToken::new();
        store::clear_credentials(self.store.as_ref());

        let code = CodeSlot::new();
        let mut advertiser = Advertiser::new(transport, code.provider(), cancel.clone());
        let advertiser_task = tokio::spawn(async move { advertiser.run().await });

        let outcome = self.pair_and_stream(&code, display, &cancel).await;

        // Stop the advertiser if it is still up, then collect its reason
        let session_was_cancelled = cancel.is_cancelled();
        cancel.cancel();
        let termination = advertiser_task
            .await
            .context("Advertiser task failed")?;

        match outcome {
            Ok(()) if session_was_cancelled => {
                info!(reason = %termination, "session terminated");
                Ok(LifecycleEnd::SessionTerminated(termination))
            }
            Ok(()) => Ok(LifecycleEnd::NothingToShow),
            Err(e) if session_was_cancelled => {
                info!(reason = %termination, error = %e, "session terminated");
                Ok(LifecycleEnd::SessionTerminated(termination))
            }
            Err(e) => {
                error!(error = %e, "pairing lifecycle failed");
                Err(e)
            }
        }
    }

    async fn pair_and_stream<D: DisplaySurface>(
        &self,
        code: &CodeSlot,
        display: &mut D,
        cancel: &CancelToken,
    ) -> Result<()> {
        let registration =
            pairing::register(self.backend.as_ref(), self.config.registration_retry, cancel).await?;
        code.set(registration.pairing_code.clone());
        display.show_pairing_code(&registration.pairing_code);

        let credentials = pairing::poll_for_credentials(
            self.backend.as_ref(),
            &registration,
            self.config.poll_interval,
            cancel,
        )
        .await?;
        store::save_credentials(self.store.as_ref(), &credentials);
        display.show_paired();
        info!("paired, starting slideshow");

        let mut streamer = Streamer::from_store(
            self.store.as_ref(),
            Arc::clone(&self.backend),
            self.registry.clone(),
            self.config.streamer,
            cancel.clone(),
        )?;

        let result = loop {
            match streamer.next_slide().await {
                Ok(Some(slide)) => display.show_slide(&slide),
                Ok(None) => break Ok(()),
                Err(e) => break Err(e),
            }
        };
        streamer.shutdown();
        result
    }
}

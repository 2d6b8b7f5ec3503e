//! Slideshow streamer
//!
//! A pull-based state machine over the paired collection. Each cycle lists
//! the collection, shuffles it and walks it one file at a time:
//! decrypt -> filter -> fetch -> decrypt content -> mint handle -> pace -> emit.
//! When a pass is exhausted the next cycle lists the collection again, so
//! additions and removals show up without restarting.

use anyhow::Result;
use futures::stream::{self, Stream};
use rand::seq::SliceRandom;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::api::CastBackend;
use crate::cancel::CancelToken;
use crate::crypto;
use crate::models::{Credentials, DecryptedFileRecord, EncryptedFileRecord, RenderableHandle, Slide};
use crate::store::{self, KeyValueStore, StoreError};
use crate::stream::collection::{decrypt_file_record, fetch_collection_files};
use crate::stream::media::{self, check_eligibility, MAX_FILE_SIZE};
use crate::stream::pacer::{Pacer, DEFAULT_SLIDE_INTERVAL};
use crate::stream::retention::{HandleRegistry, RetentionQueue};

/// Streamer tuning
#[derive(Debug, Clone, Copy)]
pub struct StreamerConfig {
    pub slide_interval: Duration,
    pub max_file_size: u64,
}

impl Default for StreamerConfig {
    fn default() -> Self {
        Self {
            slide_interval: DEFAULT_SLIDE_INTERVAL,
            max_file_size: MAX_FILE_SIZE,
        }
    }
}

/// Where the streamer is within its cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    /// Next step fetches the collection listing
    Listing,
    /// Walking the shuffled records of the current cycle
    Showing,
    /// Sequence ended: nothing eligible, or cancelled
    Finished,
}

pub struct Streamer {
    backend: Arc<dyn CastBackend>,
    credentials: Credentials,
    registry: HandleRegistry,
    retention: RetentionQueue,
    pacer: Pacer,
    config: StreamerConfig,
    cancel: CancelToken,
    state: CycleState,
    pending: Vec<EncryptedFileRecord>,
    emitted_this_cycle: usize,
    cycles: u64,
}

impl Streamer {
    pub fn new(
        backend: Arc<dyn CastBackend>,
        credentials: Credentials,
        registry: HandleRegistry,
        config: StreamerConfig,
        cancel: CancelToken,
    ) -> Self {
        Self {
            backend,
            credentials,
            retention: RetentionQueue::new(registry.clone()),
            registry,
            pacer: Pacer::new(config.slide_interval),
            config,
            cancel,
            state: CycleState::Listing,
            pending: Vec::new(),
            emitted_this_cycle: 0,
            cycles: 0,
        }
    }

    /// Build a streamer from stored credentials; missing entries are fatal
    pub fn from_store(
        store: &dyn KeyValueStore,
        backend: Arc<dyn CastBackend>,
        registry: HandleRegistry,
        config: StreamerConfig,
        cancel: CancelToken,
    ) -> Result<Self, StoreError> {
        let credentials = store::load_credentials(store)?;
        Ok(Self::new(backend, credentials, registry, config, cancel))
    }

    pub fn state(&self) -> CycleState {
        self.state
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Produce the next slide.
    ///
    /// `Ok(None)` ends the sequence: either a whole cycle had nothing to show
    /// or the session was cancelled. A listing failure is returned as an
    /// error; the next call starts a fresh cycle.
    pub async fn next_slide(&mut self) -> Result<Option<Slide>> {
        loop {
            if self.cancel.is_cancelled() {
                self.state = CycleState::Finished;
            }

            match self.state {
                CycleState::Finished => return Ok(None),
                CycleState::Listing => {
                    if let Err(e) = self.start_cycle().await {
                        if self.cancel.is_cancelled() {
                            continue;
                        }
                        return Err(e);
                    }
                }
                CycleState::Showing => {
                    let Some(record) = self.pending.pop() else {
                        self.end_cycle();
                        continue;
                    };

                    let handle = match self.prepare(&record).await {
                        Ok(Some(handle)) => handle,
                        Ok(None) => continue,
                        Err(e) => {
                            if !self.cancel.is_cancelled() {
                                warn!(file_id = record.id, error = %e, "skipping file");
                            }
                            continue;
                        }
                    };

                    if self.pacer.wait(&self.cancel).await.is_err() {
                        self.retention.discard(&handle);
                        self.state = CycleState::Finished;
                        return Ok(None);
                    }

                    self.retention.push(handle.clone());
                    self.emitted_this_cycle += 1;
                    debug!(file_id = record.id, handle = %handle.id(), "emitting slide");
                    return Ok(Some(Slide {
                        current: handle,
                        next: None,
                    }));
                }
            }
        }
    }

    async fn start_cycle(&mut self) -> Result<()> {
        let mut files =
            fetch_collection_files(self.backend.as_ref(), &self.credentials.cast_token, &self.cancel)
                .await?;
        files.shuffle(&mut rand::thread_rng());

        self.cycles += 1;
        info!(cycle = self.cycles, files = files.len(), "starting slideshow cycle");
        self.pending = files;
        self.emitted_this_cycle = 0;
        self.state = CycleState::Showing;
        Ok(())
    }

    fn end_cycle(&mut self) {
        if self.emitted_this_cycle == 0 {
            info!(cycle = self.cycles, "no displayable files, ending slideshow");
            self.state = CycleState::Finished;
        } else {
            self.state = CycleState::Listing;
        }
    }

    /// Turn one record into a live handle, or `None` if it is not displayable
    async fn prepare(&mut self, record: &EncryptedFileRecord) -> Result<Option<RenderableHandle>> {
        let file = decrypt_file_record(record, &self.credentials.collection_key)?;

        if let Err(reason) = check_eligibility(&file, self.config.max_file_size) {
            debug!(file_id = file.id, ?reason, "file not eligible");
            return Ok(None);
        }

        let (bytes, mime_type) = self.load_image(&file).await?;

        // Release the oldest handle before a new one exists
        self.retention.make_room();
        Ok(Some(self.registry.create(file.id, mime_type, bytes)))
    }

    async fn load_image(&self, file: &DecryptedFileRecord) -> Result<(Vec<u8>, &'static str)> {
        let encrypted = self
            .cancel
            .run(self.backend.fetch_file(&self.credentials.cast_token, file.id))
            .await??;

        let header = crypto::from_b64(&file.file_header)?;
        let content = crypto::decrypt_blob(&encrypted, &header, &file.file_key)?;
        let bytes = media::image_bytes(file.metadata.file_type, content)?;
        let mime_type = media::detect_mime_type(&bytes, file.extension().as_deref())?;
        Ok((bytes, mime_type))
    }

    /// Revoke every handle still retained
    pub fn shutdown(&mut self) {
        self.retention.clear();
        self.state = CycleState::Finished;
    }

    /// Adapt into a `Stream` of slides
    pub fn into_stream(self) -> impl Stream<Item = Result<Slide>> {
        stream::unfold(self, |mut streamer| async move {
            match streamer.next_slide().await {
                Ok(Some(slide)) => Some((Ok(slide), streamer)),
                Ok(None) => None,
                Err(e) => Some((Err(e), streamer)),
            }
        })
    }
}

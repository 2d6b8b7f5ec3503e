//! CLI Command Handlers
//!
//! Each handler takes CLI args and Output, returns ExitCode.

use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

use crate::cli::{ConfigCmd, ExitCode, Output, RunCmd, SlideshowCmd};
use castpair::api::{CastApiClient, CastApiError, CastBackend};
use castpair::cancel::CancelToken;
use castpair::config::Config;
use castpair::models::{Slide, SlideEvent};
use castpair::pairing::{CredentialError, StdioTransport};
use castpair::receiver::{DisplaySurface, LifecycleEnd, Receiver, ReceiverConfig};
use castpair::store::{self, MemoryStore, StoreError};
use castpair::stream::{HandleRegistry, Streamer};

// =============================================================================
// Display
// =============================================================================

/// Display events as emitted on stderr
#[derive(Debug, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
enum DisplayEvent<'a> {
    PairingCode { code: &'a str },
    Paired,
    Slide(SlideEvent),
}

/// Display surface that reports events and optionally writes the current
/// slide to disk
pub struct EventDisplay {
    output: Output,
    save_dir: Option<PathBuf>,
    shown: usize,
}

impl EventDisplay {
    pub fn new(output: Output, save_dir: Option<PathBuf>) -> Self {
        Self {
            output,
            save_dir,
            shown: 0,
        }
    }

    pub fn shown(&self) -> usize {
        self.shown
    }

    fn save(&self, slide: &Slide) {
        let (Some(dir), Some(bytes)) = (&self.save_dir, slide.current.bytes()) else {
            return;
        };
        let ext = slide
            .current
            .mime_type()
            .rsplit('/')
            .next()
            .unwrap_or("img");
        let path = dir.join(format!("current.{}", ext));
        if let Err(e) = std::fs::create_dir_all(dir).and_then(|_| std::fs::write(&path, bytes)) {
            tracing::warn!(path = %path.display(), error = %e, "failed to write slide");
        }
    }
}

impl DisplaySurface for EventDisplay {
    fn show_pairing_code(&mut self, code: &str) {
        if self.output.json {
            self.output.event(&DisplayEvent::PairingCode { code });
        } else {
            self.output.info(format!("Pairing code: {}", code));
        }
    }

    fn show_paired(&mut self) {
        if self.output.json {
            self.output.event(&DisplayEvent::Paired);
        } else {
            self.output.info("Paired! Starting slideshow...");
        }
    }

    fn show_slide(&mut self, slide: &Slide) {
        self.shown += 1;
        self.save(slide);
        if self.output.json {
            self.output.event(&DisplayEvent::Slide(SlideEvent::from(slide)));
        } else {
            self.output.info(format!(
                "Slide {}: file {} ({})",
                self.shown,
                slide.current.file_id(),
                slide.current.mime_type()
            ));
        }
    }
}

fn load_config(path: Option<&PathBuf>) -> Config {
    match path {
        Some(p) => Config::load_from(p),
        None => Config::load(),
    }
}

fn backend(config: &Config, api_url: Option<&str>) -> Arc<dyn CastBackend> {
    Arc::new(CastApiClient::with_base_url(config.api_url(api_url)))
}

/// Pick an exit code from an error chain
fn exit_code_for(e: &anyhow::Error) -> ExitCode {
    if e.is::<CredentialError>() {
        ExitCode::PairingFailed
    } else if e.is::<StoreError>() {
        ExitCode::InvalidArgs
    } else if e.chain().any(|cause| cause.is::<CastApiError>()) {
        ExitCode::NetworkError
    } else {
        ExitCode::Error
    }
}

// =============================================================================
// Run Command
// =============================================================================

pub async fn run_cmd(
    cmd: RunCmd,
    config_path: Option<&PathBuf>,
    api_url: Option<&str>,
    output: &Output,
) -> ExitCode {
    let mut config = load_config(config_path);
    if let Some(secs) = cmd.interval {
        config.slide_interval_secs = secs;
    }

    let receiver = Receiver::new(
        backend(&config, api_url),
        Arc::new(MemoryStore::new()),
        HandleRegistry::new(),
        ReceiverConfig::from(&config),
    );
    let mut display = EventDisplay::new(*output, cmd.save_dir);

    match receiver.run(StdioTransport::stdio(), &mut display).await {
        Ok(LifecycleEnd::NothingToShow) => {
            output.error("Collection has nothing to show", ExitCode::NothingToShow)
        }
        Ok(LifecycleEnd::SessionTerminated(reason)) => output.error(
            format!("Session terminated: {}", reason),
            ExitCode::SessionTerminated,
        ),
        Err(e) => output.error(format!("{:#}", e), exit_code_for(&e)),
    }
}

// =============================================================================
// Slideshow Command
// =============================================================================

pub async fn slideshow_cmd(
    cmd: SlideshowCmd,
    config_path: Option<&PathBuf>,
    api_url: Option<&str>,
    output: &Output,
) -> ExitCode {
    let mut config = load_config(config_path);
    if let Some(secs) = cmd.interval {
        config.slide_interval_secs = secs;
    }

    let store = MemoryStore::new();
    if let Err(e) = store::seed_credentials(&store, &cmd.collection_key, &cmd.cast_token) {
        return output.error(format!("Invalid credentials: {}", e), ExitCode::InvalidArgs);
    }

    let cancel = CancelToken::new();
    let mut streamer = match Streamer::from_store(
        &store,
        backend(&config, api_url),
        HandleRegistry::new(),
        config.streamer(),
        cancel.clone(),
    ) {
        Ok(s) => s,
        Err(e) => return output.error(e.to_string(), ExitCode::InvalidArgs),
    };

    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let mut display = EventDisplay::new(*output, cmd.save_dir);
    loop {
        if cmd.limit.is_some_and(|limit| display.shown() >= limit) {
            break;
        }
        match streamer.next_slide().await {
            Ok(Some(slide)) => display.show_slide(&slide),
            Ok(None) => break,
            Err(e) => {
                streamer.shutdown();
                return output.error(format!("Slideshow failed: {:#}", e), exit_code_for(&e));
            }
        }
    }
    streamer.shutdown();

    if display.shown() == 0 && !cancel.is_cancelled() {
        return output.error("Collection has nothing to show", ExitCode::NothingToShow);
    }
    ExitCode::Success
}

// =============================================================================
// Config Command
// =============================================================================

pub async fn config_cmd(cmd: ConfigCmd, config_path: Option<&PathBuf>, output: &Output) -> ExitCode {
    let config = load_config(config_path);

    if cmd.init {
        let saved = match config_path {
            Some(p) => config.save_to(p).map(|_| p.clone()),
            None => config.save(),
        };
        match saved {
            Ok(path) => output.info(format!("Wrote {}", path.display())),
            Err(e) => return output.error(format!("Failed to save config: {}", e), ExitCode::Error),
        }
    }

    if let Err(e) = output.print(&config) {
        return output.error(format!("Failed to serialize: {}", e), ExitCode::Error);
    }
    ExitCode::Success
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_mapping() {
        let e = anyhow::Error::new(CredentialError::Unseal);
        assert_eq!(exit_code_for(&e), ExitCode::PairingFailed);

        let e = anyhow::Error::new(CastApiError::ServerError(500)).context("listing");
        assert_eq!(exit_code_for(&e), ExitCode::NetworkError);

        let e = anyhow::anyhow!("other");
        assert_eq!(exit_code_for(&e), ExitCode::Error);
    }

    #[test]
    fn test_display_event_shape() {
        let json = serde_json::to_value(DisplayEvent::PairingCode { code: "ABC" }).unwrap();
        assert_eq!(json["event"], "pairingCode");
        assert_eq!(json["code"], "ABC");
    }
}

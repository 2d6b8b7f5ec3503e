//! CLI - Command Line Interface for castpair
//!
//! The receiver is meant to be launched by a host that relaunches it when a
//! lifecycle ends. Exit codes say why it ended. All output is JSON-parseable.
//!
//! # Examples
//!
//! ```bash
//! # Full lifecycle: pair over stdin/stdout, then run the slideshow
//! castpair run --json
//!
//! # Slideshow only, with credentials you already have
//! castpair slideshow --collection-key <base64> --cast-token <token> --limit 5
//!
//! # Show or write the config file
//! castpair config --init
//! ```

use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::io::IsTerminal;
use std::path::PathBuf;

// =============================================================================
// Exit Codes
// =============================================================================

/// Exit codes for CLI operations (semantic for the host)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Success
    Success = 0,
    /// General error
    Error = 1,
    /// Invalid arguments
    InvalidArgs = 2,
    /// Network error
    NetworkError = 3,
    /// Pairing failed (bad credential payload)
    PairingFailed = 4,
    /// Session terminated by the advertiser
    SessionTerminated = 5,
    /// Collection had nothing to show
    NothingToShow = 6,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> i32 {
        code as i32
    }
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> std::process::ExitCode {
        std::process::ExitCode::from(code as u8)
    }
}

// =============================================================================
// Main CLI Structure
// =============================================================================

/// castpair - cast receiver for encrypted photo collections
///
/// Run without arguments to start a full pairing lifecycle.
#[derive(Parser, Debug)]
#[command(
    name = "castpair",
    version,
    about = "Cast receiver: pair with a sender, then stream an encrypted photo collection",
    long_about = "Registers this device, advertises a pairing code over a JSON-lines \
                  session transport on stdin/stdout, waits for sealed credentials and \
                  then runs an endless slideshow of the paired collection.",
    after_help = "EXAMPLES:\n\
                  castpair                                   Pair and run the slideshow\n\
                  castpair slideshow -k <b64> -t <token>     Slideshow with known credentials\n\
                  castpair config --init                     Write the default config"
)]
pub struct Cli {
    /// Output format as JSON (default for non-TTY)
    #[arg(long, short = 'j', global = true)]
    pub json: bool,

    /// Suppress non-essential output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Cast API base URL (overrides config and CAST_API_URL)
    #[arg(long, global = true)]
    pub api_url: Option<String>,

    /// Path to config file
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Subcommand to run (omit for a full lifecycle)
    #[command(subcommand)]
    pub command: Option<Command>,
}

impl Cli {
    /// Subcommand, defaulting to a full lifecycle
    pub fn subcommand(&self) -> Command {
        self.command.clone().unwrap_or(Command::Run(RunCmd::default()))
    }

    /// Check if JSON output should be used
    pub fn should_json(&self) -> bool {
        self.json || !std::io::stdout().is_terminal()
    }
}

// =============================================================================
// Subcommands
// =============================================================================

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Pair over stdin/stdout, then run the slideshow
    Run(RunCmd),

    /// Run the slideshow with existing credentials
    #[command(visible_alias = "show")]
    Slideshow(SlideshowCmd),

    /// Show or initialize the config file
    Config(ConfigCmd),
}

/// Full pairing lifecycle
#[derive(Args, Debug, Clone, Default)]
pub struct RunCmd {
    /// Directory to write the current slide into
    #[arg(long, short = 'o')]
    pub save_dir: Option<PathBuf>,

    /// Seconds each slide stays on screen
    #[arg(long)]
    pub interval: Option<u64>,
}

/// Slideshow with known credentials
#[derive(Args, Debug, Clone)]
pub struct SlideshowCmd {
    /// Base64 collection key
    #[arg(long, short = 'k', env = "CAST_COLLECTION_KEY")]
    pub collection_key: String,

    /// Cast access token
    #[arg(long, short = 't', env = "CAST_TOKEN")]
    pub cast_token: String,

    /// Stop after this many slides
    #[arg(long, short = 'l')]
    pub limit: Option<usize>,

    /// Directory to write the current slide into
    #[arg(long, short = 'o')]
    pub save_dir: Option<PathBuf>,

    /// Seconds each slide stays on screen
    #[arg(long)]
    pub interval: Option<u64>,
}

/// Config inspection
#[derive(Args, Debug, Clone)]
pub struct ConfigCmd {
    /// Write the effective config to disk
    #[arg(long)]
    pub init: bool,
}

// =============================================================================
// Output Helpers
// =============================================================================

/// JSON envelope for command results
#[derive(Debug, Serialize)]
pub struct JsonOutput<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonError>,
}

#[derive(Debug, Serialize)]
pub struct JsonError {
    pub code: i32,
    pub message: String,
}

impl<T: Serialize> JsonOutput<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

impl JsonOutput<()> {
    pub fn error_msg(message: &str, code: ExitCode) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(JsonError {
                code: code.into(),
                message: message.to_string(),
            }),
        }
    }
}

/// Output handler for consistent formatting
#[derive(Debug, Clone, Copy)]
pub struct Output {
    pub json: bool,
    pub quiet: bool,
}

impl Output {
    pub fn new(cli: &Cli) -> Self {
        Self {
            json: cli.should_json(),
            quiet: cli.quiet,
        }
    }

    /// Print success data
    pub fn print<T: Serialize>(&self, data: T) -> anyhow::Result<()> {
        if self.json {
            let output = JsonOutput::success(data);
            println!("{}", serde_json::to_string(&output)?);
        } else {
            println!("{}", serde_json::to_string_pretty(&data)?);
        }
        Ok(())
    }

    /// Print a display event as one line on stderr.
    ///
    /// stdout belongs to the session transport during `run`.
    pub fn event<T: Serialize>(&self, event: &T) {
        if self.quiet {
            return;
        }
        if let Ok(line) = serde_json::to_string(event) {
            eprintln!("{}", line);
        }
    }

    /// Print error and return exit code
    pub fn error(&self, msg: impl Into<String>, code: ExitCode) -> ExitCode {
        let msg = msg.into();
        if self.json {
            let output = JsonOutput::<()>::error_msg(&msg, code);
            if let Ok(json) = serde_json::to_string(&output) {
                eprintln!("{}", json);
            }
        } else if !self.quiet {
            eprintln!("Error: {}", msg);
        }
        code
    }

    /// Print info message (suppressed in quiet mode)
    pub fn info(&self, msg: impl std::fmt::Display) {
        if !self.quiet && !self.json {
            eprintln!("{}", msg);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

//! CLI commands implementation.
//!
//! This module contains the CLI parser and dispatches to command-specific modules.

mod config_cmd;
mod info;
mod ocr;
mod validate;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};

use ocr_relay::config::{load_options, LayeredOptions};
use ocr_relay::ocr::{OcrService, ReqwestTransport};

#[derive(Parser)]
#[command(name = "ocr-relay")]
#[command(about = "Relay images to a local PP-OCR service or a cloud vision API")]
#[command(version)]
pub struct Cli {
    /// Options file path (overrides auto-discovery)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override an option, e.g. --set ocrBackendMode=cloud (repeatable)
    #[arg(short, long = "set", value_name = "KEY=VALUE", global = true)]
    set: Vec<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// List accepted source languages
    Languages,

    /// Show the request timeout and the overall per-call budget
    Timeout,

    /// Show the resolved backend configuration (API key redacted)
    Config,

    /// Check that the selected backend is reachable
    Validate,

    /// Recognize the text in an image
    Ocr {
        /// Image file to recognize
        image: PathBuf,
        /// Declared source language (auto, zh-Hans, zh-Hant, en, ja)
        #[arg(long)]
        from: Option<String>,
        /// Language detected by the caller, used when --from is not decisive
        #[arg(long)]
        detect_from: Option<String>,
        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Run the CLI.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let options = load_options(cli.config.as_deref(), &cli.set)
        .await
        .context("Failed to load options")?;

    match cli.command {
        Commands::Languages => info::cmd_languages(),
        Commands::Timeout => info::cmd_timeout(&options),
        Commands::Config => config_cmd::cmd_config_show(&options),
        Commands::Validate => validate::cmd_validate(&build_service(options)?).await,
        Commands::Ocr {
            image,
            from,
            detect_from,
            json,
        } => ocr::cmd_ocr(&build_service(options)?, &image, from, detect_from, json).await,
    }
}

fn build_service(options: LayeredOptions) -> anyhow::Result<OcrService> {
    let transport = ReqwestTransport::new().context("Failed to create HTTP client")?;
    Ok(OcrService::new(Arc::new(transport), Arc::new(options)))
}

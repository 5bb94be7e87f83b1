//! Configuration inspection command.

use console::style;

use ocr_relay::config::LayeredOptions;
use ocr_relay::ocr::{build_runtime_config, keys, option_string, RuntimeConfig};

/// Show the configuration the next call would use.
pub fn cmd_config_show(options: &LayeredOptions) -> anyhow::Result<()> {
    match options.source_path() {
        Some(path) => println!("{} {}", style("Options file:").bold(), path.display()),
        None => println!("{} none (environment and --set only)", style("Options file:").bold()),
    }

    let config = match build_runtime_config(options) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{} {}", style("✗").red(), e.message);
            anyhow::bail!("Configuration is invalid ({})", e.kind);
        }
    };

    println!("{}", serde_json::to_string_pretty(&config)?);

    if let RuntimeConfig::Cloud(_) = config {
        // Length only; the key itself is never printed.
        let length = option_string(options, keys::CLOUD_API_KEY)
            .map(|key| key.chars().count())
            .unwrap_or(0);
        println!(
            "{} set ({} characters, redacted)",
            style("API key:").bold(),
            length
        );
    }
    Ok(())
}

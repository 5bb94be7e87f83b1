//! Backend availability check.

use console::style;

use ocr_relay::ocr::{OcrService, RuntimeConfig};

/// Probe the selected backend and report the outcome.
pub async fn cmd_validate(service: &OcrService) -> anyhow::Result<()> {
    let target = match service.runtime_config() {
        Ok(RuntimeConfig::Local(local)) => format!("local OCR service at {}", local.health_url()),
        Ok(RuntimeConfig::Cloud(cloud)) => format!("cloud API at {}", cloud.models_url()),
        Err(_) => "backend".to_string(),
    };

    match service.validate_backend().await {
        Ok(()) => {
            println!("{} Reached {}", style("✓").green(), target);
            Ok(())
        }
        Err(e) => {
            eprintln!("{} {}", style("✗").red(), e.message);
            if let Some(link) = &e.troubleshooting_link {
                eprintln!("  {} {}", style("→").dim(), link);
            }
            anyhow::bail!("Validation failed ({})", e.kind);
        }
    }
}

//! OCR command.

use std::path::Path;

use anyhow::Context;
use console::style;

use ocr_relay::ocr::{ImageData, OcrQuery, OcrService};

/// Recognize an image file and print the lines (or JSON).
pub async fn cmd_ocr(
    service: &OcrService,
    image: &Path,
    from: Option<String>,
    detect_from: Option<String>,
    json: bool,
) -> anyhow::Result<()> {
    let data = ImageData::from_path(image)
        .await
        .with_context(|| format!("Failed to read image: {}", image.display()))?;

    let mut query = OcrQuery::new(data);
    query.from = from;
    query.detect_from = detect_from;

    match service.perform_ocr(&query).await {
        Ok(result) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                for item in &result.texts {
                    println!("{}", item.text);
                }
                if let Some(from) = &result.from {
                    eprintln!("  {} language: {}", style("→").dim(), from);
                }
            }
            Ok(())
        }
        Err(e) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&e)?);
            } else {
                eprintln!("{} {}", style("✗").red(), e.message);
            }
            Err(e).context("OCR failed")
        }
    }
}

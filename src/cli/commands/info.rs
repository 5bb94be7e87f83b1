//! Informational commands.

use console::style;

use ocr_relay::ocr::{
    resolve_request_timeout_sec, supported_languages, timeout_budget_seconds, OptionSource,
};

/// Print the accepted source languages.
pub fn cmd_languages() -> anyhow::Result<()> {
    for code in supported_languages() {
        println!("{}", code);
    }
    Ok(())
}

/// Print the network timeout and the overall budget.
pub fn cmd_timeout(options: &dyn OptionSource) -> anyhow::Result<()> {
    let request = resolve_request_timeout_sec(options);
    let budget = timeout_budget_seconds(options);

    println!("{} {}s", style("Request timeout:").bold(), request);
    println!("{} {}s", style("Call budget:").bold(), budget);
    Ok(())
}

//! JSON output formatter

use miette::{IntoDiagnostic, Result};

use super::FetchOutcome;

pub fn output_json(outcomes: &[FetchOutcome]) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(outcomes).into_diagnostic()?
    );
    Ok(())
}

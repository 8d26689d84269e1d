//! `config` command

use std::path::Path;

use miette::{IntoDiagnostic, Result};
use pixcache_core::RenderConfig;
use tracing::info;

pub fn run_config(path: &Path) -> Result<()> {
    let config = RenderConfig::from_file(path).into_diagnostic()?;
    info!("{} is valid", path.display());
    println!(
        "{}",
        serde_json::to_string_pretty(&config).into_diagnostic()?
    );
    Ok(())
}

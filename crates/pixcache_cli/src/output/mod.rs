//! Output formatting module

mod json;
mod text;

use miette::Result;
use pixcache_loader::{ImageHandle, ResourceResult};
use serde::Serialize;

use crate::cli::OutputFormat;

/// What happened to one requested source.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Outcome {
    Loaded {
        #[serde(skip_serializing_if = "Option::is_none")]
        media_type: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        width: Option<u32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        height: Option<u32>,
    },
    Skipped,
    Failed {
        error: String,
    },
}

#[derive(Debug, Serialize)]
pub struct FetchOutcome {
    pub source: String,
    #[serde(flatten)]
    pub outcome: Outcome,
}

impl FetchOutcome {
    pub fn new(source: &str, result: ResourceResult) -> Self {
        let outcome = match result {
            Ok(Some(handle)) => loaded(&handle),
            Ok(None) => Outcome::Skipped,
            Err(error) => Outcome::Failed {
                error: error.to_string(),
            },
        };
        Self {
            source: source.to_string(),
            outcome,
        }
    }

    pub fn failed(&self) -> bool {
        matches!(self.outcome, Outcome::Failed { .. })
    }
}

fn loaded(handle: &ImageHandle) -> Outcome {
    let (width, height) = handle.dimensions().unzip();
    Outcome::Loaded {
        media_type: handle.media_type().map(str::to_string),
        width,
        height,
    }
}

pub fn output_outcomes(outcomes: &[FetchOutcome], format: OutputFormat) -> Result<bool> {
    match format {
        OutputFormat::Json => json::output_json(outcomes)?,
        OutputFormat::Text => text::output_text(outcomes),
    }
    Ok(outcomes.iter().any(FetchOutcome::failed))
}

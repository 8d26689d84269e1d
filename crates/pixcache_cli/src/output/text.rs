//! Text output formatter

use pixcache_loader::truncate_key;

use super::{FetchOutcome, Outcome};

pub fn output_text(outcomes: &[FetchOutcome]) {
    for outcome in outcomes {
        let source = truncate_key(&outcome.source);
        match &outcome.outcome {
            Outcome::Loaded {
                media_type,
                width,
                height,
            } => {
                let kind = media_type.as_deref().unwrap_or("unknown");
                match (width, height) {
                    (Some(w), Some(h)) => println!("{}: loaded ({}, {}x{})", source, kind, w, h),
                    _ => println!("{}: loaded ({})", source, kind),
                }
            }
            Outcome::Skipped => println!("{}: skipped", source),
            Outcome::Failed { error } => println!("{}: failed: {}", source, error),
        }
    }

    let loaded = outcomes
        .iter()
        .filter(|o| matches!(o.outcome, Outcome::Loaded { .. }))
        .count();
    let failed = outcomes.iter().filter(|o| o.failed()).count();
    println!();
    println!(
        "Requested {} sources: {} loaded, {} skipped, {} failed",
        outcomes.len(),
        loaded,
        outcomes.len() - loaded - failed,
        failed
    );
}

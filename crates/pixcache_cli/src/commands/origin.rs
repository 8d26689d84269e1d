//! `origin` command

use std::sync::Arc;

use miette::{IntoDiagnostic, Result, miette};
use pixcache_core::CacheRegistry;
use pixcache_loader::{FetchDecoder, ResourceLoader};

pub fn run_origin(url: &str, context: Option<&str>) -> Result<()> {
    let registry = CacheRegistry::new(Arc::new(ResourceLoader::new(Arc::new(
        FetchDecoder::new(),
    ))));
    if let Some(location) = context {
        registry.set_context(location).into_diagnostic()?;
    }

    let resolved = registry
        .resolve_origin(url)
        .ok_or_else(|| miette!("Cannot resolve {} against {}", url, registry.origin()))?;
    println!("origin: {}", resolved);
    println!("same-origin: {}", registry.is_same_origin(url));
    Ok(())
}

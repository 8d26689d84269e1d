//! `fetch` command

use std::path::PathBuf;
use std::sync::Arc;

use futures_util::future::join_all;
use miette::{IntoDiagnostic, Result};
use pixcache_core::{CacheRegistry, RenderConfig};
use pixcache_loader::{FetchDecoder, ResourceLoader};
use tracing::info;

use crate::cli::OutputFormat;
use crate::output::{FetchOutcome, output_outcomes};

pub struct FetchArgs {
    pub sources: Vec<String>,
    pub config: Option<PathBuf>,
    pub origin: Option<String>,
    pub proxy: Option<String>,
    pub timeout: Option<u64>,
    pub use_cors: bool,
    pub allow_taint: bool,
    pub format: OutputFormat,
}

/// Requests every source through one cache. Returns true if any load failed.
pub fn run_fetch(args: FetchArgs) -> Result<bool> {
    let mut config = match &args.config {
        Some(path) => RenderConfig::from_file(path).into_diagnostic()?,
        None => RenderConfig::default(),
    };
    if let Some(proxy) = args.proxy {
        config.resources.proxy_url = Some(proxy);
    }
    if let Some(timeout) = args.timeout {
        config.resources.timeout_ms = timeout;
    }
    config.resources.use_cors |= args.use_cors;
    config.resources.allow_taint |= args.allow_taint;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .into_diagnostic()?;

    let outcomes = runtime.block_on(async {
        let loader = ResourceLoader::new(Arc::new(FetchDecoder::new()));
        let registry = CacheRegistry::new(Arc::new(loader));
        if let Some(origin) = &args.origin {
            registry.set_context(origin).into_diagnostic()?;
        }

        let cache = registry.create_from_config(&config);
        let _scope = registry.enter(cache.clone()).into_diagnostic()?;
        info!(
            "Fetching {} sources with cache {}",
            args.sources.len(),
            cache.id()
        );

        let requests = args.sources.iter().map(|source| cache.request_resource(source));
        let results = join_all(requests).await;
        Ok::<_, miette::Report>(
            args.sources
                .iter()
                .zip(results)
                .map(|(source, result)| FetchOutcome::new(source, result))
                .collect::<Vec<_>>(),
        )
    })?;

    output_outcomes(&outcomes, args.format)
}

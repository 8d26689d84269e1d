//! Resolution of one image source to a decoded handle.

use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use tracing::debug;

use crate::proxy::{ResponseType, fetch_through_proxy};
use crate::source::{is_inline_base64_image, is_inline_image};
use crate::{
    CorsMode, DecodeRequest, ImageDecoder, ImageHandle, PendingDecode, PlatformFeatures,
    ResourceError, ResourceOptions, truncate_key,
};

/// Grace period before trusting a decoder that reported completion synchronously.
pub const DEFAULT_SYNC_COMPLETE_GRACE: Duration = Duration::from_millis(500);

/// Outcome of a load. `Ok(None)` means policy forbade loading the source.
pub type ResourceResult = Result<Option<ImageHandle>, ResourceError>;

/// Tunables of the loader itself, as opposed to per-cache [`ResourceOptions`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoaderSettings {
    pub sync_complete_grace: Duration,
}

impl Default for LoaderSettings {
    fn default() -> Self {
        Self {
            sync_complete_grace: DEFAULT_SYNC_COMPLETE_GRACE,
        }
    }
}

/// How a source will be fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    /// Inline `data:image/...` source, no origin checks.
    Inline,
    /// Plain load: same-origin, or cross-origin with tainting allowed.
    Direct,
    /// Anonymous-CORS load.
    Cors,
    /// Through the configured proxy.
    Proxy,
}

/// The transport decision for one source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadPlan {
    pub transport: Transport,
    pub same_origin: bool,
}

/// Decides how to load `source`. `None` when policy forbids loading it.
///
/// The same-origin predicate is not consulted for inline sources.
pub fn plan_load(
    source: &str,
    options: &ResourceOptions,
    features: &PlatformFeatures,
    same_origin: &(dyn Fn(&str) -> bool + Sync),
) -> Option<LoadPlan> {
    if is_inline_image(source) {
        return Some(LoadPlan {
            transport: Transport::Inline,
            same_origin: false,
        });
    }

    let same_origin = same_origin(source);
    let use_cors = options.use_cors && features.cors_images && !same_origin;
    let use_proxy = !same_origin
        && options.proxy_url.is_some()
        && features.cross_origin_requests
        && !use_cors;

    let transport = if use_cors {
        Transport::Cors
    } else if use_proxy {
        Transport::Proxy
    } else if same_origin || options.allow_taint {
        Transport::Direct
    } else {
        return None;
    };

    Some(LoadPlan {
        transport,
        same_origin,
    })
}

/// Something that can load a source. [`ResourceLoader`] is the production implementation.
pub trait LoadResource: Send + Sync {
    /// Starts loading `source` under the caller's platform capabilities.
    ///
    /// The decision sequence is evaluated before this returns.
    fn load(
        &self,
        source: &str,
        options: &ResourceOptions,
        features: &PlatformFeatures,
        same_origin: &(dyn Fn(&str) -> bool + Sync),
    ) -> BoxFuture<'static, ResourceResult>;
}

/// Loads image sources with CORS, proxy and timeout policy.
///
/// Platform capabilities are supplied per load by the owning cache.
#[derive(Clone)]
pub struct ResourceLoader {
    decoder: Arc<dyn ImageDecoder>,
    client: reqwest::Client,
    settings: LoaderSettings,
}

/// Builder for [`ResourceLoader`].
pub struct ResourceLoaderBuilder {
    decoder: Arc<dyn ImageDecoder>,
    client: Option<reqwest::Client>,
    settings: LoaderSettings,
}

impl ResourceLoader {
    /// Creates a loader with default settings.
    pub fn new(decoder: Arc<dyn ImageDecoder>) -> Self {
        Self::builder(decoder).build()
    }

    /// Creates a builder around `decoder`.
    pub fn builder(decoder: Arc<dyn ImageDecoder>) -> ResourceLoaderBuilder {
        ResourceLoaderBuilder {
            decoder,
            client: None,
            settings: LoaderSettings::default(),
        }
    }

    pub fn settings(&self) -> &LoaderSettings {
        &self.settings
    }
}

impl ResourceLoaderBuilder {
    /// Sets the grace period for synchronously completed decodes.
    pub fn sync_complete_grace(mut self, grace: Duration) -> Self {
        self.settings.sync_complete_grace = grace;
        self
    }

    /// Uses an existing HTTP client for proxy requests.
    pub fn client(mut self, client: reqwest::Client) -> Self {
        self.client = Some(client);
        self
    }

    pub fn build(self) -> ResourceLoader {
        ResourceLoader {
            decoder: self.decoder,
            client: self.client.unwrap_or_default(),
            settings: self.settings,
        }
    }
}

impl LoadResource for ResourceLoader {
    fn load(
        &self,
        source: &str,
        options: &ResourceOptions,
        features: &PlatformFeatures,
        same_origin: &(dyn Fn(&str) -> bool + Sync),
    ) -> BoxFuture<'static, ResourceResult> {
        let Some(plan) = plan_load(source, options, features, same_origin) else {
            debug!(
                "Skipping cross-origin image {} (taint not allowed)",
                truncate_key(source)
            );
            return futures_util::future::ready(Ok(None)).boxed();
        };

        let loader = self.clone();
        let source = source.to_string();
        let proxy = options.proxy_url.clone();
        let blob_responses = features.blob_responses;
        let timeout_ms = options.timeout_ms;
        async move {
            let key = truncate_key(&source);
            let resolved = if plan.transport == Transport::Proxy {
                let response_type = if blob_responses {
                    ResponseType::Blob
                } else {
                    ResponseType::Text
                };
                fetch_through_proxy(
                    &loader.client,
                    proxy.as_deref(),
                    &source,
                    response_type,
                    (timeout_ms > 0).then(|| Duration::from_millis(timeout_ms)),
                )
                .await?
            } else {
                source
            };

            debug!("Added image {}", key);

            let cors = if is_inline_base64_image(&resolved) || plan.transport == Transport::Cors {
                CorsMode::Anonymous
            } else {
                CorsMode::None
            };
            let pending = loader.decoder.decode(DecodeRequest {
                source: resolved,
                cors,
            });
            race_decode(pending, key, loader.settings.sync_complete_grace, timeout_ms).await
        }
        .boxed()
    }
}

/// First of decode success, decode error, grace expiry and timeout wins.
async fn race_decode(
    pending: PendingDecode,
    key: String,
    grace: Duration,
    timeout_ms: u64,
) -> ResourceResult {
    let PendingDecode { completed, outcome } = pending;

    let grace_elapsed = async move {
        match completed {
            Some(handle) => {
                tokio::time::sleep(grace).await;
                handle
            }
            None => std::future::pending().await,
        }
    };
    let timed_out = async move {
        if timeout_ms > 0 {
            tokio::time::sleep(Duration::from_millis(timeout_ms)).await;
        } else {
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        decoded = outcome => decoded
            .map(Some)
            .map_err(|reason| ResourceError::Load { key: key.clone(), reason }),
        handle = grace_elapsed => Ok(Some(handle)),
        () = timed_out => Err(ResourceError::Timeout { timeout_ms, key: key.clone() }),
    }
}

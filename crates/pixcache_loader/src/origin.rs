//! Same-origin resolution against a bound document location.

use std::sync::OnceLock;

use tracing::debug;
use url::Url;

use crate::OriginError;

/// Origin reported while no document location is bound.
pub const UNBOUND_ORIGIN: &str = "about:blank";

#[derive(Debug)]
struct BoundOrigin {
    base: Url,
    origin: String,
}

/// Origin of the document being rendered.
///
/// Bound at most once. Until then every URL resolves to [`UNBOUND_ORIGIN`],
/// which compares equal to the unbound context origin.
#[derive(Debug, Default)]
pub struct OriginContext {
    bound: OnceLock<BoundOrigin>,
}

impl OriginContext {
    /// Creates an unbound context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a context bound to `location`.
    pub fn bound_to(location: &str) -> Result<Self, OriginError> {
        let context = Self::new();
        context.bind(location)?;
        Ok(context)
    }

    /// Binds the context to the document location.
    ///
    /// Rebinding to a location with the same origin is a no-op.
    pub fn bind(&self, location: &str) -> Result<(), OriginError> {
        let base = Url::parse(location)?;
        let origin = origin_key(&base);
        if let Some(existing) = self.bound.get() {
            if existing.origin == origin {
                return Ok(());
            }
            return Err(OriginError::AlreadyBound(existing.origin.clone()));
        }
        debug!("Binding origin context to {}", origin);
        let candidate = BoundOrigin {
            base,
            origin: origin.clone(),
        };
        let bound = self.bound.get_or_init(|| candidate);
        if bound.origin != origin {
            return Err(OriginError::AlreadyBound(bound.origin.clone()));
        }
        Ok(())
    }

    /// Returns true once [`bind`](Self::bind) succeeded.
    pub fn is_bound(&self) -> bool {
        self.bound.get().is_some()
    }

    /// The bound origin.
    pub fn origin(&self) -> &str {
        self.bound
            .get()
            .map(|b| b.origin.as_str())
            .unwrap_or(UNBOUND_ORIGIN)
    }

    /// Resolves `url` (relative URLs against the bound location) to its origin.
    ///
    /// Returns `None` when the URL cannot be resolved.
    pub fn resolve_origin(&self, url: &str) -> Option<String> {
        match self.bound.get() {
            None => Some(UNBOUND_ORIGIN.to_string()),
            Some(bound) => bound.base.join(url).ok().map(|resolved| origin_key(&resolved)),
        }
    }

    /// Returns true if `src` shares scheme, host and port with the bound origin.
    pub fn is_same_origin(&self, src: &str) -> bool {
        self.resolve_origin(src).as_deref() == Some(self.origin())
    }
}

fn origin_key(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{}://{}:{}", url.scheme(), host, port),
        None => format!("{}://{}", url.scheme(), host),
    }
}

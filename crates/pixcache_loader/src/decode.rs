//! Image decode capability and the decoded handle.

use std::fmt;
use std::sync::Arc;

use futures_util::future::BoxFuture;

/// Cross-origin mode requested for a decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CorsMode {
    /// No CORS request; cross-origin pixels taint the output.
    #[default]
    None,
    /// `crossOrigin = "anonymous"`.
    Anonymous,
}

/// A request to decode one resolved source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeRequest {
    /// The source actually decoded. For proxied loads this is the proxy's payload.
    pub source: String,
    pub cors: CorsMode,
}

#[derive(Clone)]
struct ImageData {
    source: String,
    cors: CorsMode,
    media_type: Option<String>,
    bytes: Vec<u8>,
    dimensions: Option<(u32, u32)>,
}

/// A decoded image, cheap to clone and shared by every requester of one source.
#[derive(Clone)]
pub struct ImageHandle {
    inner: Arc<ImageData>,
}

impl fmt::Debug for ImageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageHandle")
            .field("source", &crate::truncate_key(&self.inner.source))
            .field("cors", &self.inner.cors)
            .field("media_type", &self.inner.media_type)
            .field("bytes", &self.inner.bytes.len())
            .field("dimensions", &self.inner.dimensions)
            .finish()
    }
}

impl ImageHandle {
    /// A handle with no decoded payload attached.
    pub fn new(source: impl Into<String>, cors: CorsMode) -> Self {
        Self::with_data(source, cors, None, Vec::new())
    }

    /// A handle carrying the decoded payload.
    pub fn with_data(
        source: impl Into<String>,
        cors: CorsMode,
        media_type: Option<String>,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            inner: Arc::new(ImageData {
                source: source.into(),
                cors,
                media_type,
                bytes,
                dimensions: None,
            }),
        }
    }

    /// Attaches the intrinsic size.
    pub fn with_dimensions(mut self, width: u32, height: u32) -> Self {
        Arc::make_mut(&mut self.inner).dimensions = Some((width, height));
        self
    }

    pub fn source(&self) -> &str {
        &self.inner.source
    }

    pub fn cors(&self) -> CorsMode {
        self.inner.cors
    }

    pub fn media_type(&self) -> Option<&str> {
        self.inner.media_type.as_deref()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.inner.bytes
    }

    /// Intrinsic `(width, height)`, when the decoder determined it.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.inner.dimensions
    }

    /// Returns true if both handles refer to the same decoded image.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// An issued decode.
pub struct PendingDecode {
    /// Set when the platform reported completion synchronously on issue.
    ///
    /// Such decoders may still fail to parse the content afterwards, so the
    /// loader only trusts this handle after a grace period.
    pub completed: Option<ImageHandle>,
    /// Resolves on the decode's load (`Ok`) or error (`Err` with a reason) event.
    pub outcome: BoxFuture<'static, Result<ImageHandle, String>>,
}

impl fmt::Debug for PendingDecode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingDecode")
            .field("completed", &self.completed)
            .finish_non_exhaustive()
    }
}

/// The platform's image decoder.
pub trait ImageDecoder: Send + Sync {
    /// Issues a decode. Must not block; completion is reported through the outcome future.
    fn decode(&self, request: DecodeRequest) -> PendingDecode;
}

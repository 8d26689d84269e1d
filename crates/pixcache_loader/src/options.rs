//! Resource options and platform capabilities.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default image timeout in milliseconds.
pub const DEFAULT_IMAGE_TIMEOUT_MS: u64 = 15_000;

fn default_image_timeout() -> u64 {
    DEFAULT_IMAGE_TIMEOUT_MS
}

/// Resource policy of one cache instance. Fixed for the instance's lifetime.
///
/// Field names on the wire follow the render pipeline's option names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceOptions {
    /// Milliseconds before a load fails with a timeout. `0` waits forever.
    #[serde(rename = "imageTimeout", default = "default_image_timeout")]
    pub timeout_ms: u64,

    /// Load cross-origin images with anonymous CORS.
    #[serde(rename = "useCORS", default)]
    pub use_cors: bool,

    /// Allow cross-origin images that taint the output.
    #[serde(default)]
    pub allow_taint: bool,

    /// Proxy endpoint for cross-origin images.
    #[serde(rename = "proxy", default, skip_serializing_if = "Option::is_none")]
    pub proxy_url: Option<String>,
}

impl Default for ResourceOptions {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_IMAGE_TIMEOUT_MS,
            use_cors: false,
            allow_taint: false,
            proxy_url: None,
        }
    }
}

impl ResourceOptions {
    /// Sets the timeout in milliseconds.
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Enables or disables anonymous CORS.
    pub fn with_cors(mut self, use_cors: bool) -> Self {
        self.use_cors = use_cors;
        self
    }

    /// Enables or disables tainting loads.
    pub fn with_allow_taint(mut self, allow_taint: bool) -> Self {
        self.allow_taint = allow_taint;
        self
    }

    /// Sets the proxy endpoint.
    pub fn with_proxy(mut self, proxy_url: impl Into<String>) -> Self {
        self.proxy_url = Some(proxy_url.into());
        self
    }

    /// The timeout as a duration, `None` when unlimited.
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms))
    }
}

/// Capabilities of the platform the images are decoded on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformFeatures {
    /// Images can be decoded in anonymous-CORS mode.
    pub cors_images: bool,
    /// Cross-origin HTTP requests are possible (required for the proxy).
    pub cross_origin_requests: bool,
    /// Binary (blob) response bodies are supported.
    pub blob_responses: bool,
    /// SVG images can be drawn.
    pub svg_drawing: bool,
}

impl Default for PlatformFeatures {
    fn default() -> Self {
        Self {
            cors_images: true,
            cross_origin_requests: true,
            blob_responses: true,
            svg_drawing: true,
        }
    }
}

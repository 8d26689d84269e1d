//! Image resource loading for the pixcache render cache.
//!
//! [`ResourceLoader`] turns one image source into a decoded [`ImageHandle`],
//! deciding per source whether to load it directly, with anonymous CORS, through
//! a proxy, or not at all, and racing the decode against a timeout.

pub mod decode;
pub mod error;
pub mod fetch;
pub mod loader;
pub mod options;
pub mod origin;
mod proxy;
pub mod source;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use decode::{CorsMode, DecodeRequest, ImageDecoder, ImageHandle, PendingDecode};
pub use error::{OriginError, ResourceError};
pub use fetch::FetchDecoder;
pub use loader::{
    DEFAULT_SYNC_COMPLETE_GRACE, LoadPlan, LoadResource, LoaderSettings, ResourceLoader,
    ResourceLoaderBuilder, ResourceResult, Transport, plan_load,
};
pub use options::{DEFAULT_IMAGE_TIMEOUT_MS, PlatformFeatures, ResourceOptions};
pub use origin::{OriginContext, UNBOUND_ORIGIN};
pub use source::truncate_key;

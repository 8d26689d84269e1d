//! # pixcache_core
//!
//! Pipeline-facing surface of the render cache.
//!
//! This crate provides:
//! - [`CacheRegistry`]: named cache instances, the active-cache slot and the
//!   origin context used for same-origin checks
//! - [`FastCloneCoordinator`]: cached-mirror reuse around an external cloner
//! - [`FrameStore`]: render frames kept between renders
//! - [`RenderConfig`]: schema-validated render options
//!
//! ## Example
//!
//! ```rust,ignore
//! use pixcache_core::{CacheRegistry, RenderConfig};
//!
//! let config = RenderConfig::from_file("render.json")?;
//! let registry = CacheRegistry::new(loader);
//! registry.set_context("https://app.example/index.html")?;
//!
//! let cache = registry.create(&config.instance_name(), config.resources.clone());
//! let _scope = registry.enter(cache.clone())?;
//! let image = cache.request_resource("https://app.example/logo.png").await?;
//! ```

mod clone;
mod config;
mod error;
mod frame;
mod registry;

pub use clone::FastCloneCoordinator;
pub use config::RenderConfig;
pub use error::{ConfigError, RegistryError};
pub use frame::{FrameStore, RenderFrame};
pub use registry::{ActiveScope, CacheRegistry};

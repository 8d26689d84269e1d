//! # pixcache_cache
//!
//! Per-session render cache.
//!
//! A [`RenderCache`] remembers, by tracked id, the mirror cloned for a live
//! subtree, the render-tree container derived from it and the tracked id of
//! its parent. A [`MutationWatcher`] bound to the live root evicts entries
//! (cascading to ancestors) as the live tree changes. Image sources are loaded
//! once per cache and shared between every requester.

mod container;
mod error;
mod render_cache;
mod state;
mod watcher;

pub use container::ContainerRef;
pub use error::CacheError;
pub use render_cache::{RenderCache, ResourceContext, ResourceFuture};
pub use watcher::{InvalidationSink, MutationWatcher, invalidation_candidates};

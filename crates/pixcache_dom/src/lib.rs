//! # pixcache_dom
//!
//! Tree capabilities used by the pixcache render cache.
//!
//! The cache never walks or copies a document itself. Everything it needs from
//! the host tree is expressed here as object-safe traits:
//!
//! - [`Element`] / [`ImageElement`]: attribute access, parent links and the
//!   decode state of embedded images
//! - [`SubtreeChangeObserver`]: the host's change-notification primitive
//! - [`DocumentCloner`] / [`MirrorHost`]: subtree duplication and placement
//!
//! [`memory`] provides an in-process tree implementing all of them, used by the
//! CLI and by tests across the workspace.
//!
//! ## Example
//!
//! ```rust
//! use pixcache_dom::memory::MemoryDocument;
//! use pixcache_dom::{CACHE_ID_ATTRIBUTE, Element, UNTRACKED_ID, tracked_id};
//!
//! let doc = MemoryDocument::new();
//! let body = doc.create_element("body");
//! assert_eq!(tracked_id(&body.to_ref()), UNTRACKED_ID);
//!
//! body.set_attribute(CACHE_ID_ATTRIBUTE, "1f");
//! assert_eq!(tracked_id(&body.to_ref()), "1f");
//! ```

mod clone;
pub mod memory;
mod mutation;
mod node;

pub use clone::{DocumentCloner, MirrorHost};
pub use mutation::{
    MutationCallback, MutationRecord, ObserveOptions, RemovedNode, STYLE_ATTRIBUTES,
    SubtreeChangeObserver,
};
pub use node::{
    CACHE_ID_ATTRIBUTE, Element, ElementRef, IGNORE_ATTRIBUTE, ImageElement, ImageReadyState,
    ImageRef, UNTRACKED_ID, is_ignored, same_element, tracked_id,
};

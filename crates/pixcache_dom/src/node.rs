//! Element capabilities and the identity contract.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::SubtreeChangeObserver;

/// Attribute carrying the tracked id on both a live node and its mirror.
pub const CACHE_ID_ATTRIBUTE: &str = "data-html2canvas-cache-id";

/// Attribute marking an element exempt from attribute-mutation invalidation.
///
/// Only the literal value `"true"` counts.
pub const IGNORE_ATTRIBUTE: &str = "data-html2canvas-ignore";

/// Sentinel id for nodes the cache does not manage. Never stored, never evicted.
pub const UNTRACKED_ID: &str = "-1";

/// Shared handle to an element of some host tree.
pub type ElementRef = Arc<dyn Element>;

/// Shared handle to an image element.
pub type ImageRef = Arc<dyn ImageElement>;

/// An element node of the host tree.
///
/// Implementations use interior mutability; handles are shared freely between
/// the cache, the watcher and the render pipeline.
pub trait Element: Send + Sync + fmt::Debug {
    /// Lowercase tag name.
    fn tag_name(&self) -> String;

    /// Returns the value of an attribute, if present.
    fn attribute(&self, name: &str) -> Option<String>;

    /// Sets an attribute value.
    fn set_attribute(&self, name: &str, value: &str);

    /// Removes an attribute. Removing an absent attribute does nothing.
    fn remove_attribute(&self, name: &str);

    /// The parent element, or `None` for a root or detached node.
    fn parent_element(&self) -> Option<ElementRef>;

    /// Every image element in this subtree, in document order.
    fn images(&self) -> Vec<ImageRef>;

    /// Creates a change observer backed by the tree's native notification primitive.
    fn change_observer(&self) -> Box<dyn SubtreeChangeObserver>;

    /// Converts the handle for downcasting to the concrete element type.
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

/// Decode state of an image element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageReadyState {
    /// No decode has been attempted.
    Uninitialized,
    /// A decode is in flight.
    Loading,
    /// Decode finished successfully.
    Complete,
    /// Decode failed.
    Errored,
}

impl ImageReadyState {
    /// Returns true once the image will not change state again on its own.
    pub fn is_settled(self) -> bool {
        matches!(self, Self::Complete | Self::Errored)
    }
}

/// An image element embedded in a subtree.
pub trait ImageElement: Send + Sync + fmt::Debug {
    /// The image source string (`src`).
    fn source(&self) -> String;

    /// Current decode state.
    fn ready_state(&self) -> ImageReadyState;

    /// Resolves when the image fires its load (`true`) or error (`false`) event.
    ///
    /// Resolves immediately if the image has already settled.
    fn settled(&self) -> BoxFuture<'static, bool>;
}

/// Reads the tracked id of an element, mapping absence to [`UNTRACKED_ID`].
pub fn tracked_id(element: &ElementRef) -> String {
    element
        .attribute(CACHE_ID_ATTRIBUTE)
        .unwrap_or_else(|| UNTRACKED_ID.to_string())
}

/// Returns true if the element opts out of attribute-mutation invalidation.
pub fn is_ignored(element: &ElementRef) -> bool {
    element.attribute(IGNORE_ATTRIBUTE).as_deref() == Some("true")
}

/// Identity comparison of two element handles.
pub fn same_element(a: &ElementRef, b: &ElementRef) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

//! Subtree duplication collaborators.

use crate::ElementRef;

/// Produces an independent duplicate (a mirror) of a live subtree.
pub trait DocumentCloner: Send + Sync {
    /// Clones `node` and its descendants. `None` when the node cannot be cloned.
    fn clone_node(&self, node: &ElementRef) -> Option<ElementRef>;
}

/// The location a freshly cloned mirror is placed into before rendering.
pub trait MirrorHost: Send + Sync {
    /// Puts `mirror` in place of the host's reference element.
    ///
    /// Returns `false` when the reference location no longer exists.
    fn place_mirror(&self, mirror: &ElementRef) -> bool;
}

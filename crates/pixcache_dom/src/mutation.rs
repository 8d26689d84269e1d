//! Mutation records and the subtree change observer capability.

use std::sync::Arc;

use crate::ElementRef;

/// Attributes whose changes can alter rendered output.
pub const STYLE_ATTRIBUTES: [&str; 3] = ["hidden", "style", "class"];

/// A node removed from a child list.
#[derive(Debug, Clone)]
pub enum RemovedNode {
    /// An element node.
    Element(ElementRef),
    /// Text, comments and other non-element nodes.
    Other,
}

/// One observed change to the tree.
#[derive(Debug, Clone)]
pub enum MutationRecord {
    /// Children were added to or removed from `target`.
    ChildList {
        target: ElementRef,
        removed: Vec<RemovedNode>,
    },
    /// An attribute of `target` changed.
    Attributes {
        target: ElementRef,
        name: String,
        old_value: Option<String>,
    },
}

impl MutationRecord {
    /// The element the mutation happened on.
    pub fn target(&self) -> &ElementRef {
        match self {
            Self::ChildList { target, .. } | Self::Attributes { target, .. } => target,
        }
    }
}

/// What an observer should report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObserveOptions {
    /// Report changes anywhere below the root, not only on the root itself.
    pub subtree: bool,
    /// Report child-list changes.
    pub child_list: bool,
    /// Report attribute changes.
    pub attributes: bool,
    /// Record the previous attribute value.
    pub attribute_old_value: bool,
    /// Restrict attribute reports to these names. Empty means every attribute.
    pub attribute_filter: Vec<String>,
}

impl ObserveOptions {
    /// Options used for cache invalidation: style attributes and child lists
    /// across the whole subtree.
    pub fn style_invalidation() -> Self {
        Self {
            subtree: true,
            child_list: true,
            attributes: true,
            attribute_old_value: true,
            attribute_filter: STYLE_ATTRIBUTES.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Returns true if a change to `name` should be reported.
    pub fn accepts_attribute(&self, name: &str) -> bool {
        self.attributes
            && (self.attribute_filter.is_empty() || self.attribute_filter.iter().any(|a| a == name))
    }
}

/// Receives a batch of pending mutation records.
pub type MutationCallback = Arc<dyn Fn(&[MutationRecord]) + Send + Sync>;

/// The host's native change-notification primitive.
///
/// An observer watches at most one root at a time. After [`disconnect`](Self::disconnect)
/// it delivers nothing further and may be pointed at a new root.
pub trait SubtreeChangeObserver: Send + Sync {
    /// Starts reporting changes under `root` to `callback`.
    fn observe(&mut self, root: &ElementRef, options: ObserveOptions, callback: MutationCallback);

    /// Stops observation and drops any undelivered records.
    fn disconnect(&mut self);
}

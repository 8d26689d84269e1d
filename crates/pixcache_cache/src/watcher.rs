//! Mutation-driven invalidation of cached mirrors.

use std::fmt;
use std::sync::{Arc, Weak};

use pixcache_dom::{
    ElementRef, MutationCallback, MutationRecord, ObserveOptions, RemovedNode,
    SubtreeChangeObserver, UNTRACKED_ID, is_ignored, tracked_id,
};
use tracing::trace;

/// Receiver of invalidation requests from a [`MutationWatcher`].
pub trait InvalidationSink: Send + Sync {
    /// Evicts `id` (cascading to its ancestors). Returns the number of ids removed.
    fn invalidate(&self, id: &str) -> usize;
}

/// Tracked ids a batch of mutation records invalidates, in record order.
///
/// Child-list changes invalidate the mutated element and every removed element
/// child. Attribute changes invalidate the element unless it carries the
/// ignore marker. Untracked elements yield nothing.
pub fn invalidation_candidates(records: &[MutationRecord]) -> Vec<String> {
    let mut ids = Vec::new();
    for record in records {
        match record {
            MutationRecord::ChildList { target, removed } => {
                ids.push(tracked_id(target));
                ids.extend(removed.iter().filter_map(|node| match node {
                    RemovedNode::Element(element) => Some(tracked_id(element)),
                    RemovedNode::Other => None,
                }));
            }
            MutationRecord::Attributes { target, .. } => {
                if !is_ignored(target) {
                    ids.push(tracked_id(target));
                }
            }
        }
    }
    ids.retain(|id| id != UNTRACKED_ID);
    ids
}

/// Observes a live subtree and forwards invalidations to a sink.
///
/// The watcher holds its sink weakly so it never keeps a cache alive.
pub struct MutationWatcher {
    observer: Box<dyn SubtreeChangeObserver>,
    active: bool,
}

impl MutationWatcher {
    /// Starts watching `root` for style attribute and child-list changes.
    pub fn bind(root: &ElementRef, sink: Weak<dyn InvalidationSink>) -> Self {
        let mut watcher = Self {
            observer: root.change_observer(),
            active: false,
        };
        watcher.observe(root, sink);
        watcher
    }

    /// Points a released watcher at a new root.
    pub fn rebind(&mut self, root: &ElementRef, sink: Weak<dyn InvalidationSink>) {
        self.disconnect();
        self.observer = root.change_observer();
        self.observe(root, sink);
    }

    fn observe(&mut self, root: &ElementRef, sink: Weak<dyn InvalidationSink>) {
        let callback: MutationCallback = Arc::new(move |records: &[MutationRecord]| {
            let Some(sink) = sink.upgrade() else {
                return;
            };
            let evicted: usize = invalidation_candidates(records)
                .iter()
                .map(|id| sink.invalidate(id))
                .sum();
            trace!(records = records.len(), evicted, "Processed mutation batch");
        });
        self.observer
            .observe(root, ObserveOptions::style_invalidation(), callback);
        self.active = true;
    }

    /// Stops observation. Undelivered records are dropped.
    pub fn disconnect(&mut self) {
        if self.active {
            self.observer.disconnect();
            self.active = false;
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }
}

impl fmt::Debug for MutationWatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutationWatcher")
            .field("active", &self.active)
            .finish_non_exhaustive()
    }
}

impl Drop for MutationWatcher {
    fn drop(&mut self) {
        self.disconnect();
    }
}

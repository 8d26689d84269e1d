//! Identity-keyed maps behind a [`RenderCache`](crate::RenderCache).

use std::collections::{HashMap, HashSet};

use pixcache_dom::{ElementRef, UNTRACKED_ID};

use crate::{CacheError, ContainerRef, ResourceFuture};

#[derive(Default)]
pub(crate) struct CacheState {
    pub(crate) resources: HashMap<String, ResourceFuture>,
    pub(crate) mirrors: HashMap<String, ElementRef>,
    pub(crate) parents: HashMap<String, String>,
    pub(crate) containers: HashMap<String, ContainerRef>,
    pub(crate) next_id: u64,
}

impl CacheState {
    pub(crate) fn with_seed(seed: u64) -> Self {
        Self {
            next_id: seed,
            ..Self::default()
        }
    }

    /// An id counts as tracked while it has a mirror or a container.
    pub(crate) fn is_tracked(&self, id: &str) -> bool {
        self.mirrors.contains_key(id) || self.containers.contains_key(id)
    }

    /// Returns true if walking up from `start` reaches `id`.
    fn has_ancestor(&self, start: &str, id: &str) -> bool {
        let mut seen = HashSet::new();
        let mut current = Some(start);
        while let Some(node) = current {
            if node == id {
                return true;
            }
            if !seen.insert(node) {
                return false;
            }
            current = self.parents.get(node).map(String::as_str);
        }
        false
    }

    pub(crate) fn insert_mirror(
        &mut self,
        id: &str,
        mirror: ElementRef,
        parent: &str,
    ) -> Result<(), CacheError> {
        if parent != UNTRACKED_ID && self.has_ancestor(parent, id) {
            return Err(CacheError::ParentCycle {
                id: id.to_string(),
                parent: parent.to_string(),
            });
        }
        self.mirrors.insert(id.to_string(), mirror);
        if parent == UNTRACKED_ID {
            self.parents.remove(id);
        } else {
            self.parents.insert(id.to_string(), parent.to_string());
        }
        Ok(())
    }

    /// Removes `id` and every tracked ancestor, root first. Returns the removed ids.
    pub(crate) fn evict(&mut self, id: &str) -> Vec<String> {
        let mut chain: Vec<String> = Vec::new();
        let mut current = Some(id.to_string());
        while let Some(node) = current.take() {
            if node == UNTRACKED_ID || !self.is_tracked(&node) || chain.contains(&node) {
                break;
            }
            current = self.parents.get(&node).cloned();
            chain.push(node);
        }

        for node in chain.iter().rev() {
            self.mirrors.remove(node);
            self.parents.remove(node);
            self.containers.remove(node);
        }
        chain
    }

    pub(crate) fn clear_nodes(&mut self) {
        self.mirrors.clear();
        self.parents.clear();
        self.containers.clear();
    }
}

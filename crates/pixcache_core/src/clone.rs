//! Fast cloning of live subtrees with cached mirror reuse.

use futures_util::future::join_all;
use pixcache_cache::RenderCache;
use pixcache_dom::{
    CACHE_ID_ATTRIBUTE, DocumentCloner, ElementRef, ImageReadyState, ImageRef, MirrorHost,
    UNTRACKED_ID, tracked_id,
};
use tracing::{debug, warn};

/// Produces mirrors of live subtrees, reusing cached ones when allowed.
pub struct FastCloneCoordinator<'a> {
    cache: &'a RenderCache,
    cloner: &'a dyn DocumentCloner,
    host: &'a dyn MirrorHost,
    use_cache: bool,
}

impl<'a> FastCloneCoordinator<'a> {
    pub fn new(
        cache: &'a RenderCache,
        cloner: &'a dyn DocumentCloner,
        host: &'a dyn MirrorHost,
    ) -> Self {
        Self {
            cache,
            cloner,
            host,
            use_cache: true,
        }
    }

    /// Enables or disables mirror reuse and registration.
    pub fn use_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }

    /// Returns a mirror of `node`.
    ///
    /// A cached mirror is returned as is. Otherwise the node is cloned, placed
    /// into the host and returned once its images have settled. `None` when
    /// the cloner produced nothing or the host has no slot for the mirror.
    pub async fn clone_node(&self, node: &ElementRef) -> Option<ElementRef> {
        if self.use_cache
            && let Some(mirror) = self.cache.lookup_mirror(&tracked_id(node))
        {
            debug!("Reusing cached mirror for <{}>", node.tag_name());
            return Some(mirror);
        }

        let mirror = self.cloner.clone_node(node)?;
        if !self.host.place_mirror(&mirror) {
            debug!("No reference slot for mirror of <{}>", node.tag_name());
            return None;
        }
        wait_for_images(&mirror).await;

        if !self.use_cache {
            mirror.remove_attribute(CACHE_ID_ATTRIBUTE);
            return Some(mirror);
        }

        let id = self.cache.allocate_id();
        node.set_attribute(CACHE_ID_ATTRIBUTE, &id);
        mirror.set_attribute(CACHE_ID_ATTRIBUTE, &id);
        let parent = node
            .parent_element()
            .map(|parent| tracked_id(&parent))
            .unwrap_or_else(|| UNTRACKED_ID.to_string());
        if let Err(error) = self.cache.register_mirror(&id, mirror.clone(), &parent) {
            warn!("Mirror {} left unregistered: {}", id, error);
        }
        Some(mirror)
    }
}

/// Inline images the platform never started decoding count as settled.
fn needs_wait(image: &ImageRef) -> bool {
    match image.ready_state() {
        ImageReadyState::Complete | ImageReadyState::Errored => false,
        ImageReadyState::Uninitialized => !image.source().starts_with("data:"),
        ImageReadyState::Loading => true,
    }
}

async fn wait_for_images(mirror: &ElementRef) {
    let pending: Vec<_> = mirror
        .images()
        .into_iter()
        .filter(needs_wait)
        .map(|image| image.settled())
        .collect();
    if !pending.is_empty() {
        debug!("Waiting for {} images", pending.len());
        join_all(pending).await;
    }
}

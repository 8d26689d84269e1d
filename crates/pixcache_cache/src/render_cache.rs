//! The per-session render cache.

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::{SystemTime, UNIX_EPOCH};

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use pixcache_dom::{ElementRef, UNTRACKED_ID};
use pixcache_loader::source::is_eligible;
use pixcache_loader::{
    LoadResource, OriginContext, PlatformFeatures, ResourceError, ResourceOptions, ResourceResult,
    truncate_key,
};
use rand::Rng;
use tracing::instrument::WithSubscriber;
use tracing::{Dispatch, Instrument, Span, debug, debug_span};

use crate::state::CacheState;
use crate::{CacheError, ContainerRef, InvalidationSink, MutationWatcher};

/// A load shared by every requester of the same source key.
pub type ResourceFuture = Shared<BoxFuture<'static, ResourceResult>>;

/// Collaborators a cache needs to load resources.
#[derive(Clone)]
pub struct ResourceContext {
    pub loader: Arc<dyn LoadResource>,
    pub origin: Arc<OriginContext>,
    pub features: PlatformFeatures,
}

impl fmt::Debug for ResourceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceContext")
            .field("origin", &self.origin)
            .field("features", &self.features)
            .finish_non_exhaustive()
    }
}

struct SharedState {
    state: Mutex<CacheState>,
    span: Span,
    logging: bool,
}

impl SharedState {
    /// Runs `f` inside the instance span, or with events discarded when
    /// logging is off for this instance.
    fn in_scope<T>(&self, f: impl FnOnce() -> T) -> T {
        if self.logging {
            self.span.in_scope(f)
        } else {
            tracing::dispatcher::with_default(&Dispatch::none(), f)
        }
    }

    fn scope_future<F>(&self, future: F) -> BoxFuture<'static, F::Output>
    where
        F: std::future::Future + Send + 'static,
    {
        if self.logging {
            future.instrument(self.span.clone()).boxed()
        } else {
            future.with_subscriber(Dispatch::none()).boxed()
        }
    }
}

impl InvalidationSink for SharedState {
    fn invalidate(&self, id: &str) -> usize {
        let removed = self.state.lock().evict(id);
        if !removed.is_empty() {
            self.in_scope(|| debug!("Evicted {} ({} entries)", id, removed.len()));
        }
        removed.len()
    }
}

/// Session-scoped store of mirrors, containers, parent links and image loads.
///
/// Resource options are fixed for the life of the instance. Dropping the last
/// handle releases the bound watcher; in-flight loads are not cancelled.
/// With logging disabled, neither the cache nor its loads emit events.
pub struct RenderCache {
    id: String,
    options: ResourceOptions,
    context: ResourceContext,
    shared: Arc<SharedState>,
    watcher: Mutex<Option<MutationWatcher>>,
}

impl RenderCache {
    /// Creates an empty cache whose id allocator is randomly seeded.
    pub fn new(id: impl Into<String>, options: ResourceOptions, context: ResourceContext) -> Self {
        Self::with_logging(id, options, context, true)
    }

    /// Like [`new`](Self::new), with this instance's logging switched on or off.
    pub fn with_logging(
        id: impl Into<String>,
        options: ResourceOptions,
        context: ResourceContext,
        logging: bool,
    ) -> Self {
        let id = id.into();
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as u64)
            .unwrap_or_default();
        let seed = rand::thread_rng().gen_range(0..=1000) + now;
        let span = if logging {
            debug_span!("render_cache", id = %id)
        } else {
            Span::none()
        };

        Self {
            id,
            options,
            context,
            shared: Arc::new(SharedState {
                state: Mutex::new(CacheState::with_seed(seed)),
                span,
                logging,
            }),
            watcher: Mutex::new(None),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn options(&self) -> &ResourceOptions {
        &self.options
    }

    pub fn logging(&self) -> bool {
        self.shared.logging
    }

    /// Returns the load for `key`, starting one if none is stored.
    ///
    /// Concurrent requests for the same key share one load. Sources that can
    /// never be rendered resolve to `Ok(None)` without being stored.
    pub fn request_resource(&self, key: &str) -> ResourceFuture {
        let mut state = self.shared.state.lock();
        if let Some(existing) = state.resources.get(key) {
            return existing.clone();
        }

        if !is_eligible(key, &self.context.features) {
            self.shared
                .in_scope(|| debug!("Ignoring unsupported source {}", truncate_key(key)));
            return futures_util::future::ready(Ok(None)).boxed().shared();
        }

        let origin = self.context.origin.clone();
        let same_origin = move |src: &str| origin.is_same_origin(src);
        let load = self.shared.in_scope(|| {
            self.context
                .loader
                .load(key, &self.options, &self.context.features, &same_origin)
        });
        let load = self.shared.scope_future(load);

        let future = spawn_load(load, key).shared();
        state.resources.insert(key.to_string(), future.clone());
        future
    }

    /// The stored load for `key`, without starting one.
    pub fn match_resource(&self, key: &str) -> Option<ResourceFuture> {
        self.shared.state.lock().resources.get(key).cloned()
    }

    /// Snapshot of the stored resource keys, sorted.
    pub fn list_resource_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.shared.state.lock().resources.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Next tracked id, as lowercase hex. Strictly increasing for this instance.
    pub fn allocate_id(&self) -> String {
        let mut state = self.shared.state.lock();
        state.next_id += 1;
        format!("{:x}", state.next_id)
    }

    /// Stores `mirror` under `id` with a link to `parent`.
    ///
    /// Untracked ids are ignored. An untracked parent stores no link.
    pub fn register_mirror(
        &self,
        id: &str,
        mirror: ElementRef,
        parent: &str,
    ) -> Result<(), CacheError> {
        if id == UNTRACKED_ID {
            return Ok(());
        }
        self.shared.state.lock().insert_mirror(id, mirror, parent)
    }

    /// Stores the render-tree container derived from the mirror `id`.
    pub fn register_container(&self, id: &str, container: ContainerRef) {
        if id == UNTRACKED_ID {
            return;
        }
        self.shared
            .state
            .lock()
            .containers
            .insert(id.to_string(), container);
    }

    /// Removes `id` and its tracked ancestors. Returns the number of ids removed.
    pub fn evict(&self, id: &str) -> usize {
        self.shared.invalidate(id)
    }

    pub fn lookup_mirror(&self, id: &str) -> Option<ElementRef> {
        self.shared.state.lock().mirrors.get(id).cloned()
    }

    pub fn lookup_container(&self, id: &str) -> Option<ContainerRef> {
        self.shared.state.lock().containers.get(id).cloned()
    }

    /// The tracked parent recorded for `id`.
    pub fn parent_of(&self, id: &str) -> Option<String> {
        self.shared.state.lock().parents.get(id).cloned()
    }

    pub fn has_tracked_mirror(&self, id: &str) -> bool {
        self.shared.state.lock().mirrors.contains_key(id)
    }

    pub fn has_tracked_container(&self, id: &str) -> bool {
        self.shared.state.lock().containers.contains_key(id)
    }

    /// Number of stored mirrors.
    pub fn mirror_count(&self) -> usize {
        self.shared.state.lock().mirrors.len()
    }

    /// Drops every mirror, container and parent link. Resource loads are kept.
    pub fn clear_nodes(&self) {
        self.shared.state.lock().clear_nodes();
    }

    /// Watches `root` for invalidating mutations. Returns `false` if a watcher
    /// is already active.
    pub fn bind_watcher(&self, root: &ElementRef) -> bool {
        let mut slot = self.watcher.lock();
        let sink: Weak<dyn InvalidationSink> =
            Arc::downgrade(&self.shared) as Weak<dyn InvalidationSink>;
        match slot.as_mut() {
            Some(watcher) if watcher.is_active() => return false,
            Some(watcher) => watcher.rebind(root, sink),
            None => *slot = Some(MutationWatcher::bind(root, sink)),
        }
        self.shared.in_scope(|| debug!("Bound mutation watcher"));
        true
    }

    /// Disconnects and clears the bound watcher, if any.
    pub fn release_watcher(&self) {
        if let Some(mut watcher) = self.watcher.lock().take() {
            watcher.disconnect();
            self.shared.in_scope(|| debug!("Released mutation watcher"));
        }
    }

    pub fn has_watcher(&self) -> bool {
        self.watcher
            .lock()
            .as_ref()
            .is_some_and(MutationWatcher::is_active)
    }
}

/// Runs the load on the current runtime when there is one, so it progresses
/// without being polled. Outside a runtime the load runs on first poll.
fn spawn_load<F>(load: F, key: &str) -> BoxFuture<'static, ResourceResult>
where
    F: std::future::Future<Output = ResourceResult> + Send + 'static,
{
    match tokio::runtime::Handle::try_current() {
        Ok(runtime) => {
            let key = truncate_key(key);
            let task = runtime.spawn(load);
            task.map(move |joined| {
                joined.unwrap_or_else(|_| Err(ResourceError::Aborted { key }))
            })
            .boxed()
        }
        Err(_) => load.boxed(),
    }
}

impl fmt::Debug for RenderCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderCache")
            .field("id", &self.id)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Drop for RenderCache {
    fn drop(&mut self) {
        self.release_watcher();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pixcache_dom::memory::MemoryDocument;
    use pixcache_dom::{CACHE_ID_ATTRIBUTE, Element};
    use pixcache_loader::ResourceLoader;
    use pixcache_loader::test_utils::{CountingLoader, DecodeBehavior, StubDecoder};
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

    fn cache_with(loader: Arc<dyn LoadResource>, options: ResourceOptions) -> RenderCache {
        RenderCache::new(
            "test",
            options,
            ResourceContext {
                loader,
                origin: Arc::new(OriginContext::bound_to("https://app.test/index.html").unwrap()),
                features: PlatformFeatures::default(),
            },
        )
    }

    fn counting_cache(delay: Duration) -> (RenderCache, Arc<CountingLoader>) {
        let loader = CountingLoader::new(delay);
        (
            cache_with(loader.clone(), ResourceOptions::default()),
            loader,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn overlapping_requests_share_one_load() {
        let (cache, loader) = counting_cache(Duration::from_millis(50));

        let first = cache.request_resource("https://app.test/a.png");
        let second = cache.request_resource("https://app.test/a.png");
        let (a, b) = futures_util::join!(first, second);

        assert_eq!(loader.calls(), 1);
        assert!(a.unwrap().unwrap().ptr_eq(&b.unwrap().unwrap()));
        assert_eq!(cache.list_resource_keys(), vec!["https://app.test/a.png"]);
    }

    #[tokio::test]
    async fn settled_resource_is_reused() {
        let (cache, loader) = counting_cache(Duration::ZERO);

        cache.request_resource("/a.png").await.unwrap();
        cache.request_resource("/a.png").await.unwrap();
        cache.request_resource("/b.png").await.unwrap();

        assert_eq!(loader.calls(), 2);
        assert_eq!(cache.list_resource_keys(), vec!["/a.png", "/b.png"]);
    }

    #[tokio::test]
    async fn unrenderable_sources_are_not_loaded() {
        let loader = CountingLoader::new(Duration::ZERO);
        let cache = RenderCache::new(
            "no-svg",
            ResourceOptions::default(),
            ResourceContext {
                loader: loader.clone(),
                origin: Arc::new(OriginContext::new()),
                features: PlatformFeatures {
                    svg_drawing: false,
                    ..PlatformFeatures::default()
                },
            },
        );

        let result = cache.request_resource("https://app.test/icon.svg").await;
        cache.request_resource("data:image/svg+xml,<svg/>").await.unwrap();

        assert_eq!(result.map(|h| h.is_none()), Ok(true));
        assert_eq!(loader.calls(), 1);
        assert_eq!(cache.list_resource_keys(), vec!["data:image/svg+xml,<svg/>"]);
        assert!(cache.match_resource("https://app.test/icon.svg").is_none());
    }

    #[tokio::test]
    async fn inline_and_blob_sources_are_eligible() {
        let (cache, loader) = counting_cache(Duration::ZERO);

        cache.request_resource("data:image/png;base64,AAAA").await.unwrap();
        cache.request_resource("blob:https://app.test/1234").await.unwrap();

        assert_eq!(loader.calls(), 2);
    }

    #[tokio::test]
    async fn cross_origin_without_policy_resolves_to_nothing() {
        let decoder = StubDecoder::new(DecodeBehavior::Succeed);
        let cache = cache_with(
            Arc::new(ResourceLoader::new(decoder.clone())),
            ResourceOptions::default(),
        );

        let result = cache.request_resource("https://cdn.test/a.png").await;

        assert_eq!(result.map(|h| h.is_none()), Ok(true));
        assert!(decoder.requests().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn never_settling_decode_times_out() {
        let cache = cache_with(
            Arc::new(ResourceLoader::new(StubDecoder::new(DecodeBehavior::Never))),
            ResourceOptions::default().with_timeout_ms(10),
        );
        let started = tokio::time::Instant::now();

        let result = cache.request_resource("/a.png").await;

        assert_eq!(
            result.map(|_| ()),
            Err(ResourceError::Timeout {
                timeout_ms: 10,
                key: "/a.png".to_string(),
            })
        );
        assert!(started.elapsed() < Duration::from_millis(20));
    }

    #[tokio::test]
    async fn match_resource_returns_stored_load() {
        let (cache, _loader) = counting_cache(Duration::ZERO);

        assert!(cache.match_resource("/a.png").is_none());
        let requested = cache.request_resource("/a.png");
        let matched = cache.match_resource("/a.png").expect("stored");

        assert!(matched.ptr_eq(&requested));
    }

    #[test]
    fn request_outside_runtime_completes_when_polled() {
        let (cache, loader) = counting_cache(Duration::ZERO);

        let future = cache.request_resource("/a.png");

        assert_eq!(loader.calls(), 1);
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        let handle = runtime.block_on(future).unwrap().unwrap();
        assert_eq!(handle.source(), "/a.png");
    }

    #[test]
    fn allocated_ids_strictly_increase() {
        let (cache, _) = counting_cache(Duration::ZERO);

        let ids: Vec<u64> = (0..100)
            .map(|_| u64::from_str_radix(&cache.allocate_id(), 16).unwrap())
            .collect();

        assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn evicting_leaf_clears_whole_chain() {
        let doc = MemoryDocument::new();
        let (cache, _) = counting_cache(Duration::ZERO);
        cache
            .register_mirror("g", doc.create_element("body").to_ref(), UNTRACKED_ID)
            .unwrap();
        cache
            .register_mirror("p", doc.create_element("div").to_ref(), "g")
            .unwrap();
        cache
            .register_mirror("l", doc.create_element("span").to_ref(), "p")
            .unwrap();
        for id in ["g", "p", "l"] {
            cache.register_container(id, ContainerRef::new(id.to_string()));
        }

        assert_eq!(cache.evict("l"), 3);

        for id in ["g", "p", "l"] {
            assert!(!cache.has_tracked_mirror(id));
            assert!(!cache.has_tracked_container(id));
            assert!(cache.parent_of(id).is_none());
        }
    }

    #[test]
    fn untracked_id_is_never_stored() {
        let doc = MemoryDocument::new();
        let (cache, _) = counting_cache(Duration::ZERO);

        cache
            .register_mirror(UNTRACKED_ID, doc.create_element("div").to_ref(), UNTRACKED_ID)
            .unwrap();
        cache.register_container(UNTRACKED_ID, ContainerRef::new(()));

        assert_eq!(cache.mirror_count(), 0);
        assert!(!cache.has_tracked_container(UNTRACKED_ID));
        assert_eq!(cache.evict(UNTRACKED_ID), 0);
    }

    #[test]
    fn lookups_return_registered_entries() {
        let doc = MemoryDocument::new();
        let (cache, _) = counting_cache(Duration::ZERO);
        let mirror = doc.create_element("div").to_ref();
        let container = ContainerRef::new(7u32);

        cache.register_mirror("a", mirror.clone(), UNTRACKED_ID).unwrap();
        cache.register_container("a", container.clone());

        assert!(pixcache_dom::same_element(&cache.lookup_mirror("a").unwrap(), &mirror));
        assert!(cache.lookup_container("a").unwrap().ptr_eq(&container));
        assert!(cache.lookup_mirror("b").is_none());
        assert!(cache.lookup_container("b").is_none());
    }

    #[test]
    fn cyclic_registration_is_rejected() {
        let doc = MemoryDocument::new();
        let (cache, _) = counting_cache(Duration::ZERO);
        cache
            .register_mirror("a", doc.create_element("div").to_ref(), UNTRACKED_ID)
            .unwrap();
        cache
            .register_mirror("b", doc.create_element("div").to_ref(), "a")
            .unwrap();

        let result = cache.register_mirror("a", doc.create_element("div").to_ref(), "b");

        assert!(matches!(result, Err(CacheError::ParentCycle { .. })));
        assert_eq!(cache.evict("b"), 2);
    }

    #[test]
    fn watcher_evicts_on_mutation() {
        let doc = MemoryDocument::new();
        let (cache, _) = counting_cache(Duration::ZERO);
        let live = doc.create_element("div");
        live.set_attribute(CACHE_ID_ATTRIBUTE, "a");
        cache
            .register_mirror("a", doc.create_element("div").to_ref(), UNTRACKED_ID)
            .unwrap();

        assert!(cache.bind_watcher(&live.to_ref()));
        assert!(!cache.bind_watcher(&live.to_ref()));
        live.set_attribute("class", "changed");
        doc.flush();

        assert!(!cache.has_tracked_mirror("a"));
    }

    #[test]
    fn released_watcher_can_bind_again() {
        let doc = MemoryDocument::new();
        let (cache, _) = counting_cache(Duration::ZERO);
        let root = doc.create_element("div");

        cache.bind_watcher(&root.to_ref());
        assert_eq!(doc.observer_count(), 1);
        cache.release_watcher();
        assert!(!cache.has_watcher());
        assert_eq!(doc.observer_count(), 0);

        assert!(cache.bind_watcher(&root.to_ref()));
        assert_eq!(doc.observer_count(), 1);
    }

    #[test]
    fn dropping_cache_releases_watcher() {
        let doc = MemoryDocument::new();
        let (cache, _) = counting_cache(Duration::ZERO);
        let root = doc.create_element("div");
        cache.bind_watcher(&root.to_ref());

        drop(cache);

        assert_eq!(doc.observer_count(), 0);
    }

    #[test]
    fn clear_nodes_keeps_resources() {
        let doc = MemoryDocument::new();
        let (cache, _) = counting_cache(Duration::ZERO);
        cache
            .register_mirror("a", doc.create_element("div").to_ref(), UNTRACKED_ID)
            .unwrap();
        let _pending = cache.request_resource("/a.png");

        cache.clear_nodes();

        assert_eq!(cache.mirror_count(), 0);
        assert_eq!(cache.list_resource_keys(), vec!["/a.png"]);
    }

    #[derive(Clone, Default)]
    struct EventCounter(Arc<AtomicUsize>);

    impl<S: tracing::Subscriber> Layer<S> for EventCounter {
        fn on_event(&self, _event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn events_emitted(logging: bool) -> usize {
        let doc = MemoryDocument::new();
        let root = doc.create_element("body");
        let mirror = doc.create_element("div");
        let origin = Arc::new(OriginContext::bound_to("https://app.test/").unwrap());
        let counter = EventCounter::default();
        let subscriber = tracing_subscriber::registry().with(counter.clone());

        tracing::subscriber::with_default(subscriber, || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            let cache = RenderCache::with_logging(
                "session",
                ResourceOptions::default(),
                ResourceContext {
                    loader: Arc::new(ResourceLoader::new(StubDecoder::new(
                        DecodeBehavior::Succeed,
                    ))),
                    origin,
                    features: PlatformFeatures::default(),
                },
                logging,
            );

            runtime.block_on(cache.request_resource("/a.png")).unwrap();
            cache.register_mirror("a", mirror.to_ref(), UNTRACKED_ID).unwrap();
            cache.evict("a");
            cache.bind_watcher(&root.to_ref());
            cache.release_watcher();
        });

        counter.0.load(Ordering::SeqCst)
    }

    #[test]
    fn disabled_logging_silences_instance_and_loads() {
        assert!(events_emitted(true) >= 4);
        assert_eq!(events_emitted(false), 0);
    }
}

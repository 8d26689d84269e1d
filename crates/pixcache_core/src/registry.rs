//! Directory of named caches, the active-cache slot and the origin context.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use pixcache_cache::{RenderCache, ResourceContext};
use pixcache_loader::{LoadResource, OriginContext, PlatformFeatures, ResourceOptions};
use tracing::{debug, info};

use crate::{RegistryError, RenderConfig};

/// Context object threaded through a render pipeline.
///
/// Holds every named [`RenderCache`], a single active-cache slot for
/// collaborators that are not handed a cache explicitly, and the origin
/// context shared by every cache it creates.
pub struct CacheRegistry {
    caches: RwLock<HashMap<String, Arc<RenderCache>>>,
    active: Mutex<ActiveSlot>,
    origin: Arc<OriginContext>,
    loader: Arc<dyn LoadResource>,
    features: PlatformFeatures,
}

impl CacheRegistry {
    /// Creates an empty registry whose caches load through `loader`.
    pub fn new(loader: Arc<dyn LoadResource>) -> Self {
        Self {
            caches: RwLock::new(HashMap::new()),
            active: Mutex::new(ActiveSlot::default()),
            origin: Arc::new(OriginContext::new()),
            loader,
            features: PlatformFeatures::default(),
        }
    }

    /// Sets the platform capabilities handed to new caches.
    pub fn with_features(mut self, features: PlatformFeatures) -> Self {
        self.features = features;
        self
    }

    /// Returns the cache named `name`, creating it with `options` if absent.
    ///
    /// Options of an existing instance are left untouched.
    pub fn create(&self, name: &str, options: ResourceOptions) -> Arc<RenderCache> {
        self.create_with_logging(name, options, true)
    }

    /// Returns the cache a render with `config` uses: `reuseCache` when set,
    /// otherwise a fresh instance, with the config's resource options and
    /// logging switch.
    pub fn create_from_config(&self, config: &RenderConfig) -> Arc<RenderCache> {
        self.create_with_logging(
            &config.instance_name(),
            config.resources.clone(),
            config.logging,
        )
    }

    fn create_with_logging(
        &self,
        name: &str,
        options: ResourceOptions,
        logging: bool,
    ) -> Arc<RenderCache> {
        if let Some(existing) = self.caches.read().get(name) {
            return existing.clone();
        }

        self.caches
            .write()
            .entry(name.to_string())
            .or_insert_with(|| {
                if logging {
                    debug!("Creating cache instance {}", name);
                }
                Arc::new(RenderCache::with_logging(
                    name,
                    options,
                    ResourceContext {
                        loader: self.loader.clone(),
                        origin: self.origin.clone(),
                        features: self.features,
                    },
                    logging,
                ))
            })
            .clone()
    }

    /// Returns the cache named `name`.
    pub fn open(&self, name: &str) -> Result<Arc<RenderCache>, RegistryError> {
        self.caches
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    /// Removes `name` from the directory. Returns `false` if it was absent.
    ///
    /// The instance's watcher stays bound until its last handle is dropped.
    pub fn destroy(&self, name: &str) -> bool {
        let removed = self.caches.write().remove(name).is_some();
        if removed {
            debug!("Destroyed cache instance {}", name);
        }
        removed
    }

    /// Releases every instance's watcher, then empties the directory.
    pub fn clear_all(&self) {
        let caches: Vec<Arc<RenderCache>> = self.caches.write().drain().map(|(_, c)| c).collect();
        for cache in &caches {
            cache.release_watcher();
        }
        info!("Cleared {} cache instances", caches.len());
    }

    /// Names of the registered instances, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.caches.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Binds the registry to the location of the document being rendered.
    pub fn set_context(&self, location: &str) -> Result<(), RegistryError> {
        self.origin.bind(location)?;
        Ok(())
    }

    /// The bound origin, `about:blank` while unbound.
    pub fn origin(&self) -> &str {
        self.origin.origin()
    }

    pub fn resolve_origin(&self, url: &str) -> Option<String> {
        self.origin.resolve_origin(url)
    }

    pub fn is_same_origin(&self, src: &str) -> bool {
        self.origin.is_same_origin(src)
    }

    /// The active cache.
    pub fn get_active(&self) -> Result<Arc<RenderCache>, RegistryError> {
        self.active
            .lock()
            .cache
            .clone()
            .ok_or(RegistryError::NotAttached)
    }

    /// Makes `cache` the active cache. Fails if another one is active.
    pub fn set_active(&self, cache: Arc<RenderCache>) -> Result<(), RegistryError> {
        self.active.lock().activate(cache)
    }

    /// Empties the active slot and ends any open scope.
    pub fn clear_active(&self) {
        let mut slot = self.active.lock();
        slot.cache = None;
        slot.scope = None;
    }

    /// Activates `cache` until the returned scope is dropped.
    ///
    /// Only one scope may be open at a time, even for the same cache.
    pub fn enter(&self, cache: Arc<RenderCache>) -> Result<ActiveScope<'_>, RegistryError> {
        let mut slot = self.active.lock();
        if slot.scope.is_some() {
            let holder = slot.cache.as_ref().map(|c| c.id().to_string());
            return Err(RegistryError::ActiveSlotBusy(holder.unwrap_or_default()));
        }
        slot.activate(cache)?;
        slot.scopes_opened += 1;
        let token = slot.scopes_opened;
        slot.scope = Some(token);
        Ok(ActiveScope {
            registry: self,
            token,
        })
    }
}

/// The active cache and the scope that owns it, if any.
#[derive(Default)]
struct ActiveSlot {
    cache: Option<Arc<RenderCache>>,
    scope: Option<u64>,
    scopes_opened: u64,
}

impl ActiveSlot {
    fn activate(&mut self, cache: Arc<RenderCache>) -> Result<(), RegistryError> {
        if let Some(current) = self.cache.as_ref()
            && !Arc::ptr_eq(current, &cache)
        {
            return Err(RegistryError::ActiveSlotBusy(current.id().to_string()));
        }
        self.cache = Some(cache);
        Ok(())
    }
}

impl fmt::Debug for CacheRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheRegistry")
            .field("caches", &self.names())
            .field("origin", &self.origin())
            .finish_non_exhaustive()
    }
}

/// Keeps a cache active for one render pass.
#[derive(Debug)]
#[must_use = "the cache is deactivated when the scope is dropped"]
pub struct ActiveScope<'a> {
    registry: &'a CacheRegistry,
    token: u64,
}

impl Drop for ActiveScope<'_> {
    fn drop(&mut self) {
        let mut slot = self.registry.active.lock();
        if slot.scope == Some(self.token) {
            slot.cache = None;
            slot.scope = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pixcache_dom::memory::MemoryDocument;
    use pixcache_loader::ResourceLoader;
    use pixcache_loader::test_utils::{CountingLoader, DecodeBehavior, StubDecoder};
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use std::time::Duration;

    fn registry() -> CacheRegistry {
        CacheRegistry::new(CountingLoader::new(Duration::ZERO))
    }

    #[test]
    fn create_is_idempotent_per_name() {
        let registry = registry();

        let first = registry.create("a", ResourceOptions::default());
        let second = registry.create("a", ResourceOptions::default().with_timeout_ms(1));
        let other = registry.create("b", ResourceOptions::default());

        assert!(Arc::ptr_eq(&first, &second));
        assert!(!Arc::ptr_eq(&first, &other));
        assert_eq!(second.options().timeout_ms, 15_000);
        assert_eq!(registry.names(), vec!["a", "b"]);
    }

    #[test]
    fn config_names_and_configures_instance() {
        let registry = registry();
        let config = RenderConfig::from_json(
            r#"{"reuseCache": "main", "logging": false, "imageTimeout": 250}"#,
        )
        .unwrap();

        let cache = registry.create_from_config(&config);

        assert_eq!(cache.id(), "main");
        assert!(!cache.logging());
        assert_eq!(cache.options().timeout_ms, 250);
        assert!(Arc::ptr_eq(&registry.open("main").unwrap(), &cache));
        assert!(registry.create("other", ResourceOptions::default()).logging());
    }

    #[test]
    fn open_requires_existing_instance() {
        let registry = registry();
        let created = registry.create("a", ResourceOptions::default());

        assert!(Arc::ptr_eq(&registry.open("a").unwrap(), &created));
        assert_eq!(
            registry.open("missing").unwrap_err(),
            RegistryError::NotFound("missing".to_string())
        );
    }

    #[test]
    fn destroy_then_create_allocates_new_instance() {
        let registry = registry();
        let first = registry.create("a", ResourceOptions::default());

        assert!(registry.destroy("a"));
        assert!(!registry.destroy("a"));
        let second = registry.create("a", ResourceOptions::default());

        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn destroy_keeps_watcher_while_handle_lives() {
        let doc = MemoryDocument::new();
        let root = doc.create_element("body");
        let registry = registry();
        let cache = registry.create("a", ResourceOptions::default());
        cache.bind_watcher(&root.to_ref());

        registry.destroy("a");
        assert!(cache.has_watcher());

        drop(cache);
        assert_eq!(doc.observer_count(), 0);
    }

    #[test]
    fn clear_all_releases_watchers() {
        let doc = MemoryDocument::new();
        let root = doc.create_element("body");
        let registry = registry();
        let a = registry.create("a", ResourceOptions::default());
        let b = registry.create("b", ResourceOptions::default());
        a.bind_watcher(&root.to_ref());
        b.bind_watcher(&root.to_ref());

        registry.clear_all();

        assert!(!a.has_watcher());
        assert!(!b.has_watcher());
        assert_eq!(doc.observer_count(), 0);
        assert!(registry.names().is_empty());
    }

    #[test]
    fn active_slot_lifecycle() {
        let registry = registry();
        let a = registry.create("a", ResourceOptions::default());
        let b = registry.create("b", ResourceOptions::default());

        assert_eq!(registry.get_active().unwrap_err(), RegistryError::NotAttached);

        registry.set_active(a.clone()).unwrap();
        assert!(Arc::ptr_eq(&registry.get_active().unwrap(), &a));
        registry.set_active(a.clone()).unwrap();
        assert_eq!(
            registry.set_active(b.clone()).unwrap_err(),
            RegistryError::ActiveSlotBusy("a".to_string())
        );

        registry.clear_active();
        registry.set_active(b.clone()).unwrap();
        assert!(Arc::ptr_eq(&registry.get_active().unwrap(), &b));
    }

    #[test]
    fn scope_clears_active_on_drop() {
        let registry = registry();
        let cache = registry.create("a", ResourceOptions::default());

        {
            let _scope = registry.enter(cache.clone()).unwrap();
            assert!(registry.get_active().is_ok());
            assert!(registry.enter(registry.create("b", ResourceOptions::default())).is_err());
        }

        assert_eq!(registry.get_active().unwrap_err(), RegistryError::NotAttached);
    }

    #[test]
    fn nested_scope_is_rejected_and_outer_stays_active() {
        let registry = registry();
        let cache = registry.create("a", ResourceOptions::default());

        let outer = registry.enter(cache.clone()).unwrap();
        assert_eq!(
            registry.enter(cache.clone()).unwrap_err(),
            RegistryError::ActiveSlotBusy("a".to_string())
        );
        assert!(Arc::ptr_eq(&registry.get_active().unwrap(), &cache));

        drop(outer);
        assert_eq!(registry.get_active().unwrap_err(), RegistryError::NotAttached);
    }

    #[test]
    fn stale_scope_does_not_clear_next_pass() {
        let registry = registry();
        let a = registry.create("a", ResourceOptions::default());
        let b = registry.create("b", ResourceOptions::default());

        let first = registry.enter(a).unwrap();
        registry.clear_active();
        let second = registry.enter(b.clone()).unwrap();
        drop(first);

        assert!(Arc::ptr_eq(&registry.get_active().unwrap(), &b));
        drop(second);
        assert_eq!(registry.get_active().unwrap_err(), RegistryError::NotAttached);
    }

    #[tokio::test]
    async fn registry_features_gate_loader_transport() {
        let decoder = StubDecoder::new(DecodeBehavior::Succeed);
        let registry = CacheRegistry::new(Arc::new(ResourceLoader::new(decoder.clone())))
            .with_features(PlatformFeatures {
                cors_images: false,
                cross_origin_requests: false,
                ..PlatformFeatures::default()
            });
        registry.set_context("https://app.test/").unwrap();
        let cache = registry.create("a", ResourceOptions::default().with_cors(true));

        let result = cache.request_resource("https://cdn.test/a.png").await;

        assert_eq!(result.map(|h| h.is_none()), Ok(true));
        assert!(decoder.requests().is_empty());
    }

    #[rstest]
    #[case::same_page("/img/a.png", true)]
    #[case::same_host("https://app.test/b.png", true)]
    #[case::other_port("https://app.test:8443/b.png", false)]
    #[case::other_scheme("http://app.test/b.png", false)]
    #[case::other_host("https://cdn.test/b.png", false)]
    fn same_origin_after_binding(#[case] src: &str, #[case] expected: bool) {
        let registry = registry();
        registry.set_context("https://app.test/index.html").unwrap();

        assert_eq!(registry.is_same_origin(src), expected);
    }

    #[test]
    fn context_binds_once() {
        let registry = registry();

        assert_eq!(registry.origin(), "about:blank");
        assert_eq!(
            registry.resolve_origin("https://cdn.test/a.png").as_deref(),
            Some("about:blank")
        );
        registry.set_context("https://app.test/").unwrap();
        registry.set_context("https://app.test/other").unwrap();

        assert!(matches!(
            registry.set_context("https://evil.test/"),
            Err(RegistryError::ContextAlreadyBound(_))
        ));
        assert!(matches!(
            registry.set_context("not a url"),
            Err(RegistryError::InvalidOrigin(_))
        ));
        assert_eq!(registry.origin(), "https://app.test");
    }

    #[test]
    fn caches_share_registry_origin() {
        let registry = registry();
        let cache = registry.create("a", ResourceOptions::default());

        registry.set_context("https://app.test/").unwrap();

        assert_eq!(cache.id(), "a");
        assert!(registry.is_same_origin("https://app.test/x.png"));
    }
}

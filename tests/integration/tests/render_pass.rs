//! End-to-end render passes
//!
//! Drives the registry, fast clone coordinator and mutation watcher together
//! against the in-memory tree.

use std::sync::Arc;
use std::time::Duration;

use pixcache_core::{CacheRegistry, FastCloneCoordinator, FrameStore, RenderConfig};
use pixcache_dom::memory::{MemoryDocument, MemoryElement, MemoryFrame};
use pixcache_dom::{CACHE_ID_ATTRIBUTE, Element, IGNORE_ATTRIBUTE, same_element, tracked_id};
use pixcache_loader::test_utils::CountingLoader;
use pretty_assertions::assert_eq;

const CONFIG: &str = r#"{
    "reuseCache": "session",
    "renderName": "preview",
    "replaceSelector": "data-slot=ref",
    "useCache": true,
    "imageTimeout": 0
}"#;

struct Page {
    doc: MemoryDocument,
    body: Arc<MemoryElement>,
    main: Arc<MemoryElement>,
    article: Arc<MemoryElement>,
    aside: Arc<MemoryElement>,
}

fn page() -> Page {
    let doc = MemoryDocument::new();
    let body = doc.create_element("body");
    let main = doc.create_element("main");
    let article = doc.create_element("article");
    let aside = doc.create_element("aside");
    article.append_text("Quarterly report");
    main.append_child(&article);
    body.append_child(&main);
    body.append_child(&aside);
    Page {
        doc,
        body,
        main,
        article,
        aside,
    }
}

fn frame_for(config: &RenderConfig) -> Arc<MemoryFrame> {
    let (attribute, value) = config.reference_slot().unwrap();
    Arc::new(MemoryFrame::new(attribute, value))
}

#[tokio::test]
async fn mutation_evicts_ancestors_and_forces_reclone() {
    let config = RenderConfig::from_json(CONFIG).unwrap();
    assert!(config.fast_mode());
    let registry = CacheRegistry::new(CountingLoader::new(Duration::ZERO));
    registry.set_context("https://app.test/report").unwrap();
    let frames = FrameStore::new();
    frames.save(config.render_name.as_deref().unwrap(), frame_for(&config));

    let page = page();
    let cache = registry.create_from_config(&config);
    let _scope = registry.enter(cache.clone()).unwrap();
    assert!(cache.bind_watcher(&page.body.to_ref()));

    let frame = frames.get("preview").unwrap();
    let coordinator = FastCloneCoordinator::new(&cache, frame.document(), &*frame)
        .use_cache(config.use_cache);

    let mut ids = Vec::new();
    for node in [&page.body, &page.main, &page.article, &page.aside] {
        let mirror = coordinator.clone_node(&node.to_ref()).await.unwrap();
        ids.push(tracked_id(&mirror));
    }
    page.doc.flush();
    let [body_id, main_id, article_id, aside_id] = ids.try_into().unwrap();

    assert_eq!(cache.mirror_count(), 4);
    assert_eq!(cache.parent_of(&article_id), Some(main_id.clone()));
    assert_eq!(cache.parent_of(&main_id), Some(body_id.clone()));
    assert_eq!(cache.parent_of(&aside_id), Some(body_id.clone()));

    let cached = cache.lookup_mirror(&main_id).unwrap();
    let again = coordinator.clone_node(&page.main.to_ref()).await.unwrap();
    assert!(same_element(&cached, &again));

    page.article.set_attribute("class", "highlight");
    page.doc.flush();

    for id in [&body_id, &main_id, &article_id] {
        assert!(!cache.has_tracked_mirror(id), "{id} should be evicted");
    }
    assert!(cache.has_tracked_mirror(&aside_id));

    let fresh = coordinator.clone_node(&page.article.to_ref()).await.unwrap();
    let fresh_id = tracked_id(&fresh);
    assert_ne!(fresh_id, article_id);
    assert_eq!(page.article.attribute(CACHE_ID_ATTRIBUTE), Some(fresh_id.clone()));
    assert!(cache.has_tracked_mirror(&fresh_id));
    assert!(Arc::ptr_eq(
        &frame.reference().unwrap(),
        &MemoryElement::from_ref(&fresh).unwrap()
    ));
}

#[tokio::test]
async fn ignored_and_structural_changes() {
    let registry = CacheRegistry::new(CountingLoader::new(Duration::ZERO));
    let config = RenderConfig::from_json(CONFIG).unwrap();
    let cache = registry.create("session", config.resources.clone());
    let frame = frame_for(&config);
    let page = page();
    page.aside.set_attribute(IGNORE_ATTRIBUTE, "true");
    cache.bind_watcher(&page.body.to_ref());
    let coordinator = FastCloneCoordinator::new(&cache, frame.document(), &*frame);

    let aside = coordinator.clone_node(&page.aside.to_ref()).await.unwrap();
    let article = coordinator.clone_node(&page.article.to_ref()).await.unwrap();
    page.doc.flush();

    page.aside.set_attribute("style", "display: none");
    page.doc.flush();
    assert!(cache.has_tracked_mirror(&tracked_id(&aside)));

    page.main.remove_child(&page.article);
    page.doc.flush();
    assert!(!cache.has_tracked_mirror(&tracked_id(&article)));
    assert!(cache.has_tracked_mirror(&tracked_id(&aside)));
}

#[tokio::test]
async fn active_cache_shares_resource_loads() {
    let loader = CountingLoader::new(Duration::from_millis(5));
    let registry = CacheRegistry::new(loader.clone());
    registry.set_context("https://app.test/").unwrap();
    let cache = registry.create("session", Default::default());

    let results = {
        let _scope = registry.enter(cache.clone()).unwrap();
        let active = registry.get_active().unwrap();
        let first = active.request_resource("https://app.test/logo.png");
        let second = registry
            .get_active()
            .unwrap()
            .request_resource("https://app.test/logo.png");
        tokio::join!(first, second)
    };

    assert_eq!(loader.calls(), 1);
    assert!(results.0.unwrap().unwrap().ptr_eq(&results.1.unwrap().unwrap()));
    assert!(registry.get_active().is_err());

    registry.clear_all();
    assert!(registry.open("session").is_err());
}

#[tokio::test]
async fn deleted_frame_stops_fast_clones() {
    let config = RenderConfig::from_json(CONFIG).unwrap();
    let registry = CacheRegistry::new(CountingLoader::new(Duration::ZERO));
    let cache = registry.create("session", config.resources.clone());
    let frames = FrameStore::new();
    frames.save("preview", frame_for(&config));
    let frame = frames.get("preview").unwrap();
    let page = page();

    assert!(frames.delete("preview"));
    let coordinator = FastCloneCoordinator::new(&cache, frame.document(), &*frame);

    assert!(coordinator.clone_node(&page.article.to_ref()).await.is_none());
    assert!(frames.get("preview").is_none());
}

//! In-process tree implementing every capability the cache consumes.
//!
//! Mutations are queued per observer and delivered in batches by
//! [`MemoryDocument::flush`], the way a browser delivers mutation records at
//! a microtask checkpoint.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;
use tracing::trace;

use crate::{
    DocumentCloner, Element, ElementRef, ImageElement, ImageReadyState, ImageRef, MirrorHost,
    MutationCallback, MutationRecord, ObserveOptions, RemovedNode, SubtreeChangeObserver,
};

struct Registration {
    id: u64,
    root: Weak<MemoryElement>,
    options: ObserveOptions,
    callback: MutationCallback,
    pending: Vec<MutationRecord>,
}

#[derive(Default)]
struct DocumentInner {
    observers: Mutex<Vec<Registration>>,
    next_observer: AtomicU64,
}

impl DocumentInner {
    fn queue(&self, target: &Arc<MemoryElement>, record: MutationRecord) {
        let mut observers = self.observers.lock();
        for registration in observers.iter_mut() {
            let Some(root) = registration.root.upgrade() else {
                continue;
            };
            let wanted = match &record {
                MutationRecord::ChildList { .. } => registration.options.child_list,
                MutationRecord::Attributes { name, .. } => {
                    registration.options.accepts_attribute(name)
                }
            };
            if wanted && target.is_within(&root, registration.options.subtree) {
                let mut record = record.clone();
                if let MutationRecord::Attributes { old_value, .. } = &mut record
                    && !registration.options.attribute_old_value
                {
                    *old_value = None;
                }
                registration.pending.push(record);
            }
        }
    }
}

/// A document owning a set of [`MemoryElement`]s and their observers.
#[derive(Clone, Default)]
pub struct MemoryDocument {
    inner: Arc<DocumentInner>,
}

impl fmt::Debug for MemoryDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryDocument")
            .field("observers", &self.inner.observers.lock().len())
            .finish()
    }
}

impl MemoryDocument {
    /// Creates an empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a detached element.
    pub fn create_element(&self, tag: &str) -> Arc<MemoryElement> {
        MemoryElement::new(&self.inner, tag, ImageReadyState::Uninitialized)
    }

    /// Creates a detached `<img>` element with the given source and decode state.
    pub fn create_image(&self, src: &str, state: ImageReadyState) -> Arc<MemoryElement> {
        let image = MemoryElement::new(&self.inner, "img", state);
        image.attributes.write().insert("src".to_string(), src.to_string());
        image
    }

    /// Delivers every pending record to its observer. Returns the number delivered.
    pub fn flush(&self) -> usize {
        let batches: Vec<(MutationCallback, Vec<MutationRecord>)> = {
            let mut observers = self.inner.observers.lock();
            observers
                .iter_mut()
                .filter(|r| !r.pending.is_empty())
                .map(|r| (r.callback.clone(), std::mem::take(&mut r.pending)))
                .collect()
        };

        let mut delivered = 0;
        for (callback, records) in batches {
            delivered += records.len();
            callback(&records);
        }
        trace!("Delivered {} mutation records", delivered);
        delivered
    }

    /// Number of live observer registrations.
    pub fn observer_count(&self) -> usize {
        self.inner.observers.lock().len()
    }

    fn deep_clone(&self, source: &Arc<MemoryElement>) -> Arc<MemoryElement> {
        let copy = MemoryElement::new(&self.inner, &source.tag, *source.image_state.borrow());
        *copy.attributes.write() = source.attributes.read().clone();

        let children = source.children.read().clone();
        let mut copied = Vec::with_capacity(children.len());
        for child in children {
            match child {
                MemoryNode::Element(element) => {
                    let child_copy = self.deep_clone(&element);
                    *child_copy.parent.write() = Arc::downgrade(&copy);
                    copied.push(MemoryNode::Element(child_copy));
                }
                MemoryNode::Text(text) => copied.push(MemoryNode::Text(text)),
            }
        }
        *copy.children.write() = copied;
        copy
    }
}

impl DocumentCloner for MemoryDocument {
    fn clone_node(&self, node: &ElementRef) -> Option<ElementRef> {
        let source = MemoryElement::from_ref(node)?;
        Some(self.deep_clone(&source).to_ref())
    }
}

/// A child slot of a [`MemoryElement`].
#[derive(Debug, Clone)]
pub enum MemoryNode {
    Element(Arc<MemoryElement>),
    Text(String),
}

/// An element of a [`MemoryDocument`].
pub struct MemoryElement {
    this: Weak<MemoryElement>,
    document: Weak<DocumentInner>,
    tag: String,
    attributes: RwLock<BTreeMap<String, String>>,
    children: RwLock<Vec<MemoryNode>>,
    parent: RwLock<Weak<MemoryElement>>,
    image_state: watch::Sender<ImageReadyState>,
}

impl fmt::Debug for MemoryElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryElement")
            .field("tag", &self.tag)
            .field("attributes", &*self.attributes.read())
            .field("children", &self.children.read().len())
            .finish()
    }
}

impl MemoryElement {
    fn new(document: &Arc<DocumentInner>, tag: &str, state: ImageReadyState) -> Arc<Self> {
        let (image_state, _) = watch::channel(state);
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            document: Arc::downgrade(document),
            tag: tag.to_ascii_lowercase(),
            attributes: RwLock::new(BTreeMap::new()),
            children: RwLock::new(Vec::new()),
            parent: RwLock::new(Weak::new()),
            image_state,
        })
    }

    /// Recovers the concrete element behind a type-erased handle.
    pub fn from_ref(element: &ElementRef) -> Option<Arc<Self>> {
        Arc::clone(element).into_any().downcast::<Self>().ok()
    }

    /// Type-erased handle to this element.
    pub fn to_ref(self: &Arc<Self>) -> ElementRef {
        self.clone()
    }

    /// The parent element, if attached.
    pub fn parent(&self) -> Option<Arc<MemoryElement>> {
        self.parent.read().upgrade()
    }

    /// Element children in order.
    pub fn children(&self) -> Vec<Arc<MemoryElement>> {
        self.children
            .read()
            .iter()
            .filter_map(|child| match child {
                MemoryNode::Element(element) => Some(element.clone()),
                MemoryNode::Text(_) => None,
            })
            .collect()
    }

    /// Appends `child`, detaching it from any previous parent first.
    pub fn append_child(self: &Arc<Self>, child: &Arc<MemoryElement>) {
        if let Some(previous) = child.parent() {
            previous.remove_child(child);
        }
        *child.parent.write() = Arc::downgrade(self);
        self.children.write().push(MemoryNode::Element(child.clone()));
        self.record_child_list(Vec::new());
    }

    /// Appends a text node.
    pub fn append_text(self: &Arc<Self>, text: &str) {
        self.children.write().push(MemoryNode::Text(text.to_string()));
        self.record_child_list(Vec::new());
    }

    /// Removes `child` from this element. Returns `false` if it was not a child.
    pub fn remove_child(self: &Arc<Self>, child: &Arc<MemoryElement>) -> bool {
        let removed = {
            let mut children = self.children.write();
            let position = children.iter().position(
                |node| matches!(node, MemoryNode::Element(element) if Arc::ptr_eq(element, child)),
            );
            position.map(|index| children.remove(index))
        };
        if removed.is_none() {
            return false;
        }
        *child.parent.write() = Weak::new();
        self.record_child_list(vec![RemovedNode::Element(child.to_ref())]);
        true
    }

    /// Removes every text child of this element.
    pub fn clear_text(self: &Arc<Self>) {
        let removed = {
            let mut children = self.children.write();
            let before = children.len();
            children.retain(|node| matches!(node, MemoryNode::Element(_)));
            before - children.len()
        };
        if removed > 0 {
            self.record_child_list(vec![RemovedNode::Other; removed]);
        }
    }

    /// Puts `replacement` in this element's place within its parent.
    pub fn replace_with(self: &Arc<Self>, replacement: &Arc<MemoryElement>) -> bool {
        let Some(parent) = self.parent() else {
            return false;
        };
        if let Some(previous) = replacement.parent() {
            previous.remove_child(replacement);
        }
        {
            let mut children = parent.children.write();
            let Some(index) = children.iter().position(
                |node| matches!(node, MemoryNode::Element(element) if Arc::ptr_eq(element, self)),
            ) else {
                return false;
            };
            children[index] = MemoryNode::Element(replacement.clone());
        }
        *replacement.parent.write() = Arc::downgrade(&parent);
        *self.parent.write() = Weak::new();
        parent.record_child_list(vec![RemovedNode::Element(self.to_ref())]);
        true
    }

    /// First element in this subtree (including itself) whose attribute `name` equals `value`.
    pub fn find_by_attribute(self: &Arc<Self>, name: &str, value: &str) -> Option<Arc<Self>> {
        if self.attributes.read().get(name).map(String::as_str) == Some(value) {
            return Some(self.clone());
        }
        self.children()
            .into_iter()
            .find_map(|child| child.find_by_attribute(name, value))
    }

    /// Drives the decode state of an `<img>` element.
    pub fn set_image_state(&self, state: ImageReadyState) {
        self.image_state.send_replace(state);
    }

    fn is_within(&self, root: &Arc<MemoryElement>, subtree: bool) -> bool {
        if std::ptr::eq(self, Arc::as_ptr(root)) {
            return true;
        }
        if !subtree {
            return false;
        }
        let mut current = self.parent();
        while let Some(node) = current {
            if Arc::ptr_eq(&node, root) {
                return true;
            }
            current = node.parent();
        }
        false
    }

    fn record(&self, record: MutationRecord) {
        let (Some(document), Some(this)) = (self.document.upgrade(), self.this.upgrade()) else {
            return;
        };
        document.queue(&this, record);
    }

    fn record_child_list(self: &Arc<Self>, removed: Vec<RemovedNode>) {
        self.record(MutationRecord::ChildList {
            target: self.to_ref(),
            removed,
        });
    }

    fn collect_images(self: &Arc<Self>, out: &mut Vec<ImageRef>) {
        if self.tag == "img" {
            out.push(self.clone());
        }
        for child in self.children() {
            child.collect_images(out);
        }
    }
}

impl Element for MemoryElement {
    fn tag_name(&self) -> String {
        self.tag.clone()
    }

    fn attribute(&self, name: &str) -> Option<String> {
        self.attributes.read().get(name).cloned()
    }

    fn set_attribute(&self, name: &str, value: &str) {
        let old_value = self
            .attributes
            .write()
            .insert(name.to_string(), value.to_string());
        if let Some(this) = self.this.upgrade() {
            self.record(MutationRecord::Attributes {
                target: this.to_ref(),
                name: name.to_string(),
                old_value,
            });
        }
    }

    fn remove_attribute(&self, name: &str) {
        let old_value = self.attributes.write().remove(name);
        if old_value.is_none() {
            return;
        }
        if let Some(this) = self.this.upgrade() {
            self.record(MutationRecord::Attributes {
                target: this.to_ref(),
                name: name.to_string(),
                old_value,
            });
        }
    }

    fn parent_element(&self) -> Option<ElementRef> {
        self.parent().map(|parent| parent.to_ref())
    }

    fn images(&self) -> Vec<ImageRef> {
        let mut images = Vec::new();
        if let Some(this) = self.this.upgrade() {
            this.collect_images(&mut images);
        }
        images
    }

    fn change_observer(&self) -> Box<dyn SubtreeChangeObserver> {
        Box::new(MemoryObserver {
            document: self.document.clone(),
            registration: None,
        })
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

impl ImageElement for MemoryElement {
    fn source(&self) -> String {
        self.attribute("src").unwrap_or_default()
    }

    fn ready_state(&self) -> ImageReadyState {
        *self.image_state.borrow()
    }

    fn settled(&self) -> BoxFuture<'static, bool> {
        let mut receiver = self.image_state.subscribe();
        async move {
            let loaded = receiver
                .wait_for(|state| state.is_settled())
                .await
                .map(|state| *state == ImageReadyState::Complete);
            loaded.unwrap_or(false)
        }
        .boxed()
    }
}

/// Observer handle returned by [`MemoryElement`]'s `change_observer`.
pub struct MemoryObserver {
    document: Weak<DocumentInner>,
    registration: Option<u64>,
}

impl SubtreeChangeObserver for MemoryObserver {
    fn observe(&mut self, root: &ElementRef, options: ObserveOptions, callback: MutationCallback) {
        self.disconnect();
        let (Some(document), Some(root)) = (self.document.upgrade(), MemoryElement::from_ref(root))
        else {
            return;
        };
        let id = document.next_observer.fetch_add(1, Ordering::Relaxed);
        document.observers.lock().push(Registration {
            id,
            root: Arc::downgrade(&root),
            options,
            callback,
            pending: Vec::new(),
        });
        self.registration = Some(id);
    }

    fn disconnect(&mut self) {
        let Some(id) = self.registration.take() else {
            return;
        };
        if let Some(document) = self.document.upgrade() {
            document.observers.lock().retain(|r| r.id != id);
        }
    }
}

impl Drop for MemoryObserver {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// An off-screen frame that mirrors are placed into.
///
/// The frame document holds a root element with a single reference slot,
/// located by attribute. Placing a mirror replaces whatever occupies the slot.
#[derive(Debug)]
pub struct MemoryFrame {
    document: MemoryDocument,
    root: Arc<MemoryElement>,
    reference_attribute: String,
    reference_value: String,
    detached: AtomicBool,
}

impl MemoryFrame {
    /// Creates a frame whose reference slot is the element with `attribute="value"`.
    pub fn new(attribute: &str, value: &str) -> Self {
        let document = MemoryDocument::new();
        let root = document.create_element("html");
        let slot = document.create_element("div");
        slot.attributes
            .write()
            .insert(attribute.to_string(), value.to_string());
        root.append_child(&slot);
        Self {
            document,
            root,
            reference_attribute: attribute.to_string(),
            reference_value: value.to_string(),
            detached: AtomicBool::new(false),
        }
    }

    /// The frame's document, which also acts as the cloner into this frame.
    pub fn document(&self) -> &MemoryDocument {
        &self.document
    }

    /// Root element of the frame.
    pub fn root(&self) -> &Arc<MemoryElement> {
        &self.root
    }

    /// The element currently occupying the reference slot.
    pub fn reference(&self) -> Option<Arc<MemoryElement>> {
        self.root
            .find_by_attribute(&self.reference_attribute, &self.reference_value)
    }

    /// Empties the frame. A detached frame accepts no mirrors.
    pub fn detach(&self) {
        self.detached.store(true, Ordering::Release);
        self.root.children.write().clear();
    }

    /// Returns true once [`detach`](Self::detach) has run.
    pub fn is_detached(&self) -> bool {
        self.detached.load(Ordering::Acquire)
    }
}

impl MirrorHost for MemoryFrame {
    fn place_mirror(&self, mirror: &ElementRef) -> bool {
        if self.is_detached() {
            return false;
        }
        let (Some(slot), Some(mirror)) = (self.reference(), MemoryElement::from_ref(mirror)) else {
            return false;
        };
        if Arc::ptr_eq(&slot, &mirror) {
            return true;
        }
        mirror.attributes.write().insert(
            self.reference_attribute.clone(),
            self.reference_value.clone(),
        );
        slot.replace_with(&mirror)
    }
}

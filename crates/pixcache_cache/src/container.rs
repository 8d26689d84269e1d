//! Type-erased handle to a derived render-tree node.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// A render-tree node built from a mirror by the render pipeline.
///
/// The cache only stores and hands back containers; their concrete type belongs
/// to the pipeline and is recovered with [`downcast`](Self::downcast).
#[derive(Clone)]
pub struct ContainerRef(Arc<dyn Any + Send + Sync>);

impl ContainerRef {
    pub fn new<T: Any + Send + Sync>(container: T) -> Self {
        Self(Arc::new(container))
    }

    /// Shared handle to the concrete container, if it is a `T`.
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.0.clone().downcast::<T>().ok()
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    /// Returns true if both handles refer to the same container.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for ContainerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ContainerRef").finish_non_exhaustive()
    }
}

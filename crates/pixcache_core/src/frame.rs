//! Render frames kept between renders.

use std::sync::Arc;

use parking_lot::Mutex;
use pixcache_dom::memory::MemoryFrame;
use tracing::debug;

/// An off-screen container that mirrors are placed into.
pub trait RenderFrame: Send + Sync {
    /// Removes the frame from its host. A detached frame is never reused.
    fn detach(&self);

    fn is_detached(&self) -> bool;
}

impl RenderFrame for MemoryFrame {
    fn detach(&self) {
        MemoryFrame::detach(self);
    }

    fn is_detached(&self) -> bool {
        MemoryFrame::is_detached(self)
    }
}

/// Frames keyed by render name.
pub struct FrameStore<F> {
    frames: Mutex<Vec<(String, Arc<F>)>>,
}

impl<F: RenderFrame> FrameStore<F> {
    pub fn new() -> Self {
        Self {
            frames: Mutex::new(Vec::new()),
        }
    }

    /// Stores `frame` under `key`, returning the frame it replaced.
    pub fn save(&self, key: &str, frame: Arc<F>) -> Option<Arc<F>> {
        let mut frames = self.frames.lock();
        if let Some((_, slot)) = frames.iter_mut().find(|(k, _)| k == key) {
            return Some(std::mem::replace(slot, frame));
        }
        frames.push((key.to_string(), frame));
        None
    }

    /// The frame stored under `key`, if it is still attached.
    pub fn get(&self, key: &str) -> Option<Arc<F>> {
        self.frames
            .lock()
            .iter()
            .find(|(k, frame)| k == key && !frame.is_detached())
            .map(|(_, frame)| frame.clone())
    }

    /// Detaches and forgets the frame under `key`.
    pub fn delete(&self, key: &str) -> bool {
        let removed = {
            let mut frames = self.frames.lock();
            frames
                .iter()
                .position(|(k, _)| k == key)
                .map(|index| frames.remove(index))
        };
        match removed {
            Some((_, frame)) => {
                frame.detach();
                debug!("Deleted render frame {}", key);
                true
            }
            None => false,
        }
    }

    /// Detaches and forgets every frame.
    pub fn clear_all(&self) {
        let frames = std::mem::take(&mut *self.frames.lock());
        for (_, frame) in &frames {
            frame.detach();
        }
    }

    pub fn len(&self) -> usize {
        self.frames.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.lock().is_empty()
    }
}

impl<F: RenderFrame> Default for FrameStore<F> {
    fn default() -> Self {
        Self::new()
    }
}

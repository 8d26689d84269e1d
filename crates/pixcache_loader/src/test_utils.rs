//! Test doubles for decoders and loaders.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use parking_lot::Mutex;

use crate::{
    DecodeRequest, ImageDecoder, ImageHandle, LoadResource, PendingDecode, PlatformFeatures,
    ResourceOptions, ResourceResult,
};

/// How a [`StubDecoder`] settles its decodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeBehavior {
    /// Never settles.
    Never,
    /// Succeeds immediately.
    Succeed,
    /// Fails immediately with reason `"corrupt"`.
    Fail,
    /// Reports synchronous completion, then never fires an event.
    ReportsCompleteThenHangs,
    /// Succeeds after the given delay.
    SucceedAfter(Duration),
}

/// Decoder recording every request and settling per [`DecodeBehavior`].
#[derive(Debug)]
pub struct StubDecoder {
    behavior: DecodeBehavior,
    requests: Mutex<Vec<DecodeRequest>>,
}

impl StubDecoder {
    pub fn new(behavior: DecodeBehavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Every request seen so far, in order.
    pub fn requests(&self) -> Vec<DecodeRequest> {
        self.requests.lock().clone()
    }
}

impl ImageDecoder for StubDecoder {
    fn decode(&self, request: DecodeRequest) -> PendingDecode {
        self.requests.lock().push(request.clone());
        let handle = ImageHandle::new(request.source, request.cors);
        match self.behavior {
            DecodeBehavior::Never => PendingDecode {
                completed: None,
                outcome: std::future::pending().boxed(),
            },
            DecodeBehavior::Succeed => PendingDecode {
                completed: None,
                outcome: futures_util::future::ready(Ok(handle)).boxed(),
            },
            DecodeBehavior::Fail => PendingDecode {
                completed: None,
                outcome: futures_util::future::ready(Err("corrupt".to_string())).boxed(),
            },
            DecodeBehavior::ReportsCompleteThenHangs => PendingDecode {
                completed: Some(handle),
                outcome: std::future::pending().boxed(),
            },
            DecodeBehavior::SucceedAfter(delay) => PendingDecode {
                completed: None,
                outcome: async move {
                    tokio::time::sleep(delay).await;
                    Ok(handle)
                }
                .boxed(),
            },
        }
    }
}

/// Loader counting invocations per call; resolves after `delay` with a handle for the source.
#[derive(Debug, Default)]
pub struct CountingLoader {
    calls: AtomicUsize,
    delay: Duration,
}

impl CountingLoader {
    pub fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            delay,
        })
    }

    /// Number of times `load` was invoked.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl LoadResource for CountingLoader {
    fn load(
        &self,
        source: &str,
        _options: &ResourceOptions,
        _features: &PlatformFeatures,
        _same_origin: &(dyn Fn(&str) -> bool + Sync),
    ) -> BoxFuture<'static, ResourceResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let handle = ImageHandle::new(source, crate::CorsMode::None);
        let delay = self.delay;
        async move {
            tokio::time::sleep(delay).await;
            Ok(Some(handle))
        }
        .boxed()
    }
}

//! Graceful stop for indefinite streams: once signalled, the source reports end of stream
//! so the pipeline drains instead of being torn down.

use super::{RouteUpdate, UpdateSource};
use crate::error::FeedError;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    stopped: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Safe to call from a signal-handler thread.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.notify.notify_one();
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

pub struct Stoppable<S> {
    inner: S,
    handle: StopHandle,
}

impl<S: UpdateSource> Stoppable<S> {
    pub fn new(inner: S, handle: StopHandle) -> Self {
        Self { inner, handle }
    }
}

#[async_trait]
impl<S: UpdateSource> UpdateSource for Stoppable<S> {
    async fn next_update(&mut self) -> Result<Option<RouteUpdate>, FeedError> {
        if self.handle.is_stopped() {
            return Ok(None);
        }
        tokio::select! {
            _ = self.handle.notify.notified() => Ok(None),
            next = self.inner.next_update() => next,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::MemorySource;

    #[tokio::test]
    async fn stop_ends_the_stream() {
        let handle = StopHandle::new();
        let mut src = Stoppable::new(
            MemorySource::new(vec![
                RouteUpdate::announce("a", "1", 1),
                RouteUpdate::announce("a", "1", 2),
            ]),
            handle.clone(),
        );
        assert!(src.next_update().await.unwrap().is_some());
        handle.stop();
        assert!(src.next_update().await.unwrap().is_none());
    }
}

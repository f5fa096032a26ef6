//! Graceful shutdown.
//!
//! A signal/watch channel pair paired with a reference count is the
//! usual way to know when every in-flight clone has dropped. This
//! crate's connections are plain spawned tasks rather than futures
//! threaded through a watch channel, so the same end state — wait for a
//! shutdown signal, then wait for in-flight connections to finish — is
//! reached with a `tokio::sync::Notify` (the signal) plus an atomic
//! counter (the in-flight tally), at a fraction of the moving parts.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

/// Tracks in-flight connections and lets a caller wait for a shutdown
/// signal and then for the current connections to drain.
#[derive(Clone)]
pub struct GracefulShutdown {
    inner: Arc<Inner>,
}

struct Inner {
    signal: Notify,
    drained: Notify,
    in_flight: AtomicUsize,
    shutting_down: std::sync::atomic::AtomicBool,
}

impl Default for GracefulShutdown {
    fn default() -> Self {
        GracefulShutdown::new()
    }
}

impl GracefulShutdown {
    pub fn new() -> Self {
        GracefulShutdown {
            inner: Arc::new(Inner {
                signal: Notify::new(),
                drained: Notify::new(),
                in_flight: AtomicUsize::new(0),
                shutting_down: std::sync::atomic::AtomicBool::new(false),
            }),
        }
    }

    /// Registers the start of one connection; returns a guard that
    /// decrements the count on drop (normal return or panic unwind).
    pub(crate) fn track(&self) -> ConnectionGuard {
        self.inner.in_flight.fetch_add(1, Ordering::SeqCst);
        ConnectionGuard {
            inner: self.inner.clone(),
        }
    }

    /// Signals every accept loop holding this handle to stop accepting
    /// new connections.
    pub fn shutdown(&self) {
        self.inner.shutting_down.store(true, Ordering::SeqCst);
        self.inner.signal.notify_waiters();
    }

    pub(crate) fn is_shutting_down(&self) -> bool {
        self.inner.shutting_down.load(Ordering::SeqCst)
    }

    pub(crate) async fn shutdown_signaled(&self) {
        self.inner.signal.notified().await;
    }

    /// Waits until every tracked connection has completed.
    pub async fn drained(&self) {
        loop {
            if self.inner.in_flight.load(Ordering::SeqCst) == 0 {
                return;
            }
            self.inner.drained.notified().await;
        }
    }
}

pub(crate) struct ConnectionGuard {
    inner: Arc<Inner>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        if self.inner.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.inner.drained.notify_waiters();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn drained_resolves_immediately_with_no_connections() {
        let shutdown = GracefulShutdown::new();
        shutdown.drained().await;
    }

    #[tokio::test]
    async fn drained_waits_for_guard_to_drop() {
        let shutdown = GracefulShutdown::new();
        let guard = shutdown.track();
        let shutdown2 = shutdown.clone();
        let handle = tokio::spawn(async move {
            shutdown2.drained().await;
        });
        tokio::task::yield_now().await;
        drop(guard);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn shutdown_notifies_waiters() {
        let shutdown = GracefulShutdown::new();
        assert!(!shutdown.is_shutting_down());
        shutdown.shutdown();
        assert!(shutdown.is_shutting_down());
    }
}

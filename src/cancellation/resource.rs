//! `Resource`: the polymorphic capability every worker-registered handle
//! (HTTP client, browser context, ...) implements so the
//! CancellationCoordinator can tear it down without knowing its concrete
//! type (spec.md §4.6 "Resource model").

use async_trait::async_trait;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CloseOutcome {
    Ok,
    TimedOut,
    Forced,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ResourceOutcome {
    pub name: String,
    pub outcome: CloseOutcome,
}

#[async_trait]
pub trait Resource: Send + Sync {
    fn name(&self) -> &str;

    /// Waits up to `deadline` for in-flight work to finish before
    /// returning. Implementations must not block past `deadline`.
    async fn close_gracefully(&self, deadline: Duration) -> CloseOutcome;

    async fn force_close(&self);

    fn is_active(&self) -> bool;
}

/// In-flight request counter for HTTP-like resources: graceful close waits
/// until the count drains or the deadline expires (spec.md §4.6).
pub struct HttpResource {
    name: String,
    in_flight: Arc<AtomicI64>,
    closed: Arc<std::sync::atomic::AtomicBool>,
}

impl HttpResource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            in_flight: Arc::new(AtomicI64::new(0)),
            closed: Arc::new(std::sync::atomic::AtomicBool::new(false)),
        }
    }

    /// Scoped acquisition: increments the in-flight count, decrements it
    /// on drop, regardless of how the in-flight request finishes.
    pub fn acquire(&self) -> InFlightGuard {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        InFlightGuard {
            counter: self.in_flight.clone(),
        }
    }
}

pub struct InFlightGuard {
    counter: Arc<AtomicI64>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Resource for HttpResource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn close_gracefully(&self, deadline: Duration) -> CloseOutcome {
        let start = tokio::time::Instant::now();
        loop {
            if self.in_flight.load(Ordering::SeqCst) == 0 {
                self.closed.store(true, Ordering::SeqCst);
                return CloseOutcome::Ok;
            }
            if start.elapsed() >= deadline {
                return CloseOutcome::TimedOut;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    }

    async fn force_close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn is_active(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn drains_before_closing() {
        let res = Arc::new(HttpResource::new("test-client"));
        let guard = res.acquire();

        let res_for_close = res.clone();
        let close = tokio::spawn(async move {
            res_for_close.close_gracefully(Duration::from_millis(200)).await
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        drop(guard);

        let outcome = close.await.unwrap();
        assert_eq!(outcome, CloseOutcome::Ok);
    }

    #[tokio::test]
    async fn times_out_when_never_drained() {
        let res = HttpResource::new("stuck-client");
        let _guard = res.acquire();
        let outcome = res.close_gracefully(Duration::from_millis(30)).await;
        assert_eq!(outcome, CloseOutcome::TimedOut);
    }
}

//! Process-wide registry of a job's in-flight resources, shared between
//! whatever drives `JobExecutor::execute` and the `CancellationCoordinator`
//! invoked from the HTTP API (spec.md §4.6 "Output metadata for
//! cancellation includes... per-resource outcome").
//!
//! Without this, a `CancellationCoordinator::cancel` call triggered over
//! HTTP has no way to reach the resources a concurrently running worker
//! registered for the same job — they live in different tasks. Both sides
//! hold the same `ResourceRegistry` (via `AppState`), so an executor that
//! registers its handles here makes them visible to whichever caller
//! cancels the job.

use dashmap::DashMap;

use crate::ids::JobId;

use super::Resource;

#[derive(Default)]
pub struct ResourceRegistry {
    inner: DashMap<JobId, Vec<std::sync::Arc<dyn Resource>>>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called by a `JobExecutor` as it acquires a resource for `job_id`.
    pub fn register(&self, job_id: JobId, resource: std::sync::Arc<dyn Resource>) {
        self.inner.entry(job_id).or_default().push(resource);
    }

    /// Removes and returns every resource registered for `job_id`, for a
    /// `CancellationCoordinator` to tear down. Returns an empty vec for a
    /// job that never registered any (e.g. still `pending`).
    pub fn take(&self, job_id: JobId) -> Vec<std::sync::Arc<dyn Resource>> {
        self.inner.remove(&job_id).map(|(_, v)| v).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancellation::resource::HttpResource;
    use std::sync::Arc;

    #[test]
    fn take_removes_and_returns_registered_resources() {
        let registry = ResourceRegistry::new();
        let job_id = JobId::new();
        registry.register(job_id, Arc::new(HttpResource::new("a")));
        registry.register(job_id, Arc::new(HttpResource::new("b")));

        let taken = registry.take(job_id);
        assert_eq!(taken.len(), 2);
        assert!(registry.take(job_id).is_empty());
    }

    #[test]
    fn take_on_unregistered_job_is_empty() {
        let registry = ResourceRegistry::new();
        assert!(registry.take(JobId::new()).is_empty());
    }
}

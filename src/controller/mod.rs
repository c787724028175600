//! Reconciliation pipeline: pod events are filtered into a deduplicating
//! queue, and a pool of workers converges the published metrics of each
//! queued pod with its cached state.

pub mod filter;
pub mod queue;
pub mod rate_limit;
pub mod reconciler;
pub mod worker;

pub use filter::EventFilter;
pub use queue::{KeyState, WorkQueue};
pub use reconciler::{Reconciled, Reconciler};

use crate::k8s::cache::PodSource;
use crate::k8s::types::PodKey;
use crate::metrics::PodNetworkMetrics;
use crate::{NetmetricsError, Result};
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::info;

pub struct Controller<S> {
    queue: WorkQueue<PodKey>,
    reconciler: Arc<Reconciler<S>>,
    filter: EventFilter,
    workers: usize,
}

impl<S: PodSource + 'static> Controller<S> {
    pub fn new(
        node_name: impl Into<String>,
        source: S,
        metrics: PodNetworkMetrics,
        workers: usize,
    ) -> Self {
        let queue = WorkQueue::new("pods");
        info!("Setting up event handlers");
        Self {
            filter: EventFilter::new(node_name, queue.clone()),
            reconciler: Arc::new(Reconciler::new(source, metrics)),
            queue,
            workers,
        }
    }

    /// Handler to feed with the pod events of the watched cache.
    pub fn event_filter(&self) -> EventFilter {
        self.filter.clone()
    }

    pub fn queue(&self) -> &WorkQueue<PodKey> {
        &self.queue
    }

    /// Wait for `synced`, run the workers until `shutdown` is cancelled, then
    /// shut the queue down and wait for the workers to finish.
    pub async fn run<F>(self, synced: F, shutdown: CancellationToken) -> Result<()>
    where
        F: Future<Output = Result<()>>,
    {
        info!("Starting pod controller");

        info!("Waiting for informer caches to sync");
        let sync_result = tokio::select! {
            _ = shutdown.cancelled() => Err(NetmetricsError::CacheSyncFailed),
            result = synced => result,
        };
        if let Err(e) = sync_result {
            self.queue.shut_down();
            return Err(e);
        }

        info!("Starting {} workers", self.workers);
        let tracker = TaskTracker::new();
        worker::spawn_workers(self.workers, &self.queue, &self.reconciler, &tracker);
        tracker.close();
        info!("Started workers");

        shutdown.cancelled().await;
        info!("Shutting down workers");
        self.queue.shut_down();
        tracker.wait().await;

        Ok(())
    }
}

use crate::controller::queue::WorkQueue;
use crate::controller::reconciler::{Reconciled, Reconciler};
use crate::k8s::cache::PodSource;
use crate::k8s::types::PodKey;
use std::sync::Arc;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// Drain the queue until it shuts down, reconciling one key at a time.
pub async fn run_worker<S: PodSource>(
    id: usize,
    queue: WorkQueue<PodKey>,
    reconciler: Arc<Reconciler<S>>,
) {
    debug!(worker = id, "Worker started");

    while let Some(key) = queue.get().await {
        process_item(&queue, &reconciler, &key);
    }

    debug!(worker = id, "Worker stopped");
}

fn process_item<S: PodSource>(
    queue: &WorkQueue<PodKey>,
    reconciler: &Reconciler<S>,
    key: &PodKey,
) {
    match reconciler.reconcile(key) {
        Ok(outcome) => {
            queue.forget(key);
            match outcome {
                Reconciled::Applied { attachments } => {
                    info!(pod = %key, attachments, "Successfully synced")
                }
                Reconciled::Purged => info!(pod = %key, "Successfully synced, pod removed"),
            }
        }
        Err(e) => {
            queue.add_rate_limited(key.clone());
            warn!(
                pod = %key,
                requeues = queue.num_requeues(key),
                "Error syncing '{}': {}, requeuing",
                key,
                e
            );
        }
    }
    queue.done(key);
}

/// Start `count` workers on `tracker`.
pub fn spawn_workers<S>(
    count: usize,
    queue: &WorkQueue<PodKey>,
    reconciler: &Arc<Reconciler<S>>,
    tracker: &TaskTracker,
) where
    S: PodSource + 'static,
{
    for id in 0..count {
        tracker.spawn(run_worker(id, queue.clone(), reconciler.clone()));
    }
}

use crate::k8s::cache::PodSource;
use crate::k8s::types::PodKey;
use crate::metrics::PodNetworkMetrics;
use crate::network::pod_attachments;
use crate::Result;
use tracing::{debug, info};

/// What a successful reconciliation did to the published metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciled {
    /// The pod exists; its attachment set was republished.
    Applied { attachments: usize },
    /// The pod is gone; everything published for it was dropped.
    Purged,
}

/// Converges the metrics published for one pod with its current state.
pub struct Reconciler<S> {
    source: S,
    metrics: PodNetworkMetrics,
}

impl<S: PodSource> Reconciler<S> {
    pub fn new(source: S, metrics: PodNetworkMetrics) -> Self {
        Self { source, metrics }
    }

    /// Failures leave the published metrics untouched: a failed read is not
    /// proof the pod is gone, and a malformed annotation is not proof its
    /// networks are.
    pub fn reconcile(&self, key: &PodKey) -> Result<Reconciled> {
        let pod = match self.source.get(key) {
            Ok(Some(pod)) => pod,
            Ok(None) => return Ok(self.purge(key)),
            Err(e) if e.is_not_found() => return Ok(self.purge(key)),
            Err(e) => return Err(e),
        };

        info!(pod = %key, "Received pod");
        let attachments = pod_attachments(&pod)?;
        let count = attachments.len();
        self.metrics.replace(key, attachments);

        Ok(Reconciled::Applied { attachments: count })
    }

    fn purge(&self, key: &PodKey) -> Reconciled {
        debug!(pod = %key, "Pod is gone, dropping its network metrics");
        self.metrics.remove(key);
        Reconciled::Purged
    }

    pub fn metrics(&self) -> &PodNetworkMetrics {
        &self.metrics
    }
}

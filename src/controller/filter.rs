use crate::controller::queue::WorkQueue;
use crate::k8s::types::{annotation, node_name, PodEvent, PodKey};
use crate::network::NETWORK_STATUS_ANNOTATION;
use k8s_openapi::api::core::v1::Pod;
use tracing::debug;

/// Turns pod change notifications into work for the queue, keeping only the
/// pods scheduled to this node whose network status is worth looking at.
#[derive(Clone)]
pub struct EventFilter {
    node_name: String,
    queue: WorkQueue<PodKey>,
}

impl EventFilter {
    pub fn new(node_name: impl Into<String>, queue: WorkQueue<PodKey>) -> Self {
        Self {
            node_name: node_name.into(),
            queue,
        }
    }

    pub fn handle(&self, event: &PodEvent) {
        match self.accept(event) {
            Some(key) => {
                debug!(pod = %key, "Enqueuing pod");
                self.queue.add(key);
            }
            None => debug!("Ignoring pod event"),
        }
    }

    /// The key to enqueue for `event`, or `None` if it should be dropped.
    pub fn accept(&self, event: &PodEvent) -> Option<PodKey> {
        match event {
            PodEvent::Created(pod) => {
                // An empty annotation still counts.
                annotation(pod, NETWORK_STATUS_ANNOTATION)?;
                if !self.on_this_node(pod) {
                    return None;
                }
                PodKey::from_pod(pod)
            }
            PodEvent::Updated { old, new } => {
                // Absent and empty compare equal.
                let unchanged = annotation(old, NETWORK_STATUS_ANNOTATION).unwrap_or_default()
                    == annotation(new, NETWORK_STATUS_ANNOTATION).unwrap_or_default();
                if unchanged || !self.on_this_node(new) {
                    return None;
                }
                PodKey::from_pod(new)
            }
            PodEvent::Removed(deleted) => {
                if !self.on_this_node(deleted.last_state()) {
                    return None;
                }
                deleted.key()
            }
        }
    }

    fn on_this_node(&self, pod: &Pod) -> bool {
        node_name(pod) == Some(self.node_name.as_str())
    }
}

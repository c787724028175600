use k8s_openapi::api::core::v1::Pod;
use std::fmt;

/// Identity of a pod, used as the key of the work queue and the metrics store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PodKey {
    pub name: String,
    pub namespace: String,
}

impl PodKey {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
        }
    }

    /// Derive the key from pod metadata. Pods without a name cannot be keyed.
    pub fn from_pod(pod: &Pod) -> Option<Self> {
        let name = pod.metadata.name.as_deref()?;
        let namespace = pod.metadata.namespace.as_deref().unwrap_or("default");
        Some(Self::new(name, namespace))
    }
}

impl fmt::Display for PodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Change notification for a pod, as seen by the local cache.
#[derive(Debug, Clone)]
pub enum PodEvent {
    Created(Box<Pod>),
    Updated { old: Box<Pod>, new: Box<Pod> },
    Removed(DeletedPod),
}

/// A removed pod. When the final state of the pod was never observed (the
/// delete happened while the watch was down), only the last cached state is
/// available.
#[derive(Debug, Clone)]
pub enum DeletedPod {
    Final(Box<Pod>),
    Tombstone { key: PodKey, last_known: Box<Pod> },
}

impl DeletedPod {
    pub fn key(&self) -> Option<PodKey> {
        match self {
            DeletedPod::Final(pod) => PodKey::from_pod(pod),
            DeletedPod::Tombstone { key, .. } => Some(key.clone()),
        }
    }

    /// The last state known for the pod, regardless of how the delete was observed.
    pub fn last_state(&self) -> &Pod {
        match self {
            DeletedPod::Final(pod) => pod,
            DeletedPod::Tombstone { last_known, .. } => last_known,
        }
    }
}

/// Name of the node the pod is scheduled to, if any.
pub fn node_name(pod: &Pod) -> Option<&str> {
    pod.spec.as_ref().and_then(|s| s.node_name.as_deref())
}

/// Value of the given annotation on the pod, if present.
pub fn annotation<'a>(pod: &'a Pod, key: &str) -> Option<&'a str> {
    pod.metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(key))
        .map(String::as_str)
}

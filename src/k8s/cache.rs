//! Local mirror of the pods scheduled to this node
//!
//! The watcher keeps this cache in step with the API server and every write
//! reports the change it made as a [`PodEvent`], so the event filter sees the
//! old and new state of a pod without re-reading anything.

use crate::k8s::types::{DeletedPod, PodEvent, PodKey};
use crate::{NetmetricsError, Result};
use dashmap::DashMap;
use k8s_openapi::api::core::v1::Pod;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;

/// Read access to the current state of pods, keyed by identity.
pub trait PodSource: Send + Sync {
    /// `Ok(None)` means the pod is confirmed absent. Errors are transient.
    fn get(&self, key: &PodKey) -> Result<Option<Pod>>;
}

/// Thread-safe pod cache with a synchronization flag
#[derive(Clone)]
pub struct PodCache {
    inner: Arc<DashMap<PodKey, Pod>>,
    synced: Arc<watch::Sender<bool>>,
}

impl PodCache {
    /// Create a new, not yet synced, empty cache
    pub fn new() -> Self {
        let (synced, _) = watch::channel(false);
        Self {
            inner: Arc::new(DashMap::new()),
            synced: Arc::new(synced),
        }
    }

    /// Insert or update a pod
    pub fn apply(&self, pod: Pod) -> Option<PodEvent> {
        let key = PodKey::from_pod(&pod)?;
        let event = match self.inner.insert(key, pod.clone()) {
            Some(old) => PodEvent::Updated {
                old: Box::new(old),
                new: Box::new(pod),
            },
            None => PodEvent::Created(Box::new(pod)),
        };
        Some(event)
    }

    /// Remove a pod whose deletion was observed
    pub fn delete(&self, pod: Pod) -> Option<PodEvent> {
        let key = PodKey::from_pod(&pod)?;
        self.inner.remove(&key);
        Some(PodEvent::Removed(DeletedPod::Final(Box::new(pod))))
    }

    /// Replace the whole content after a relist and mark the cache synced.
    ///
    /// Cached pods missing from the list were deleted while the watch was not
    /// running; they come back as tombstones carrying their last known state.
    pub fn replace(&self, pods: Vec<Pod>) -> Vec<PodEvent> {
        let listed: HashMap<PodKey, Pod> = pods
            .into_iter()
            .filter_map(|pod| PodKey::from_pod(&pod).map(|key| (key, pod)))
            .collect();

        let gone: Vec<PodKey> = self
            .inner
            .iter()
            .filter(|entry| !listed.contains_key(entry.key()))
            .map(|entry| entry.key().clone())
            .collect();

        let mut events = Vec::with_capacity(listed.len() + gone.len());
        for key in gone {
            if let Some((key, last_known)) = self.inner.remove(&key) {
                events.push(PodEvent::Removed(DeletedPod::Tombstone {
                    key,
                    last_known: Box::new(last_known),
                }));
            }
        }
        events.extend(listed.into_values().filter_map(|pod| self.apply(pod)));

        self.synced.send_replace(true);
        events
    }

    /// Flag the cache as stale until the next completed relist
    pub fn mark_desynced(&self) {
        self.synced.send_replace(false);
    }

    pub fn is_synced(&self) -> bool {
        *self.synced.borrow()
    }

    /// Wait until the cache has been populated by a complete list
    pub async fn wait_synced(&self) {
        let mut rx = self.synced.subscribe();
        // The sender lives as long as self, so this only fails if it was dropped.
        let _ = rx.wait_for(|synced| *synced).await;
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl PodSource for PodCache {
    fn get(&self, key: &PodKey) -> Result<Option<Pod>> {
        if !self.is_synced() {
            return Err(NetmetricsError::CacheDesynced {
                key: key.to_string(),
            });
        }
        Ok(self.inner.get(key).map(|r| r.clone()))
    }
}

impl Default for PodCache {
    fn default() -> Self {
        Self::new()
    }
}

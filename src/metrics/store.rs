//! Authoritative store of the network attachments published per pod
//!
//! Owns the `pod_network_name_info` gauge family. Every series belongs to a
//! pod present in the published map, and every published attachment with an
//! interface has a series. Both sides change together under one lock, and
//! rendering takes the same lock, so a scrape never sees a half-replaced pod.

use crate::k8s::types::PodKey;
use crate::network::Attachment;
use crate::Result;
use prometheus::{GaugeVec, Opts, Registry, TextEncoder};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub const METRIC_NAME: &str = "pod_network_name_info";
pub const METRIC_HELP: &str = "Metric to identify network names of networks added to pods.";

const LABEL_NAMES: [&str; 4] = ["pod", "namespace", "interface", "network_name"];

#[derive(Clone)]
pub struct PodNetworkMetrics {
    inner: Arc<Inner>,
}

struct Inner {
    registry: Registry,
    gauge: GaugeVec,
    published: Mutex<HashMap<PodKey, Vec<Attachment>>>,
}

impl PodNetworkMetrics {
    /// Create the store with its own registry holding the gauge family
    pub fn new() -> Result<Self> {
        let registry = Registry::new();
        let gauge = GaugeVec::new(Opts::new(METRIC_NAME, METRIC_HELP), &LABEL_NAMES)?;
        registry.register(Box::new(gauge.clone()))?;

        Ok(Self {
            inner: Arc::new(Inner {
                registry,
                gauge,
                published: Mutex::new(HashMap::new()),
            }),
        })
    }

    /// Swap the published attachments of a pod for `attachments`.
    ///
    /// Always rewrites the series, even when nothing changed.
    pub fn replace(&self, key: &PodKey, attachments: Vec<Attachment>) {
        let mut published = self.lock();

        if let Some(previous) = published.remove(key) {
            self.delete_series(key, &previous);
        }

        for attachment in attachments.iter().filter(|a| a.has_interface()) {
            self.inner
                .gauge
                .with_label_values(&label_values(key, attachment))
                .set(0.0);
        }

        published.insert(key.clone(), attachments);
    }

    /// Stop publishing anything for the pod.
    pub fn remove(&self, key: &PodKey) {
        let mut published = self.lock();

        if let Some(previous) = published.remove(key) {
            self.delete_series(key, &previous);
        }
    }

    /// Attachments currently published for the pod, including the ones
    /// without an interface.
    pub fn published(&self, key: &PodKey) -> Option<Vec<Attachment>> {
        self.lock().get(key).cloned()
    }

    /// Number of pods with a published attachment set
    pub fn pod_count(&self) -> usize {
        self.lock().len()
    }

    /// Render the gauge family in the Prometheus text exposition format
    pub fn render(&self) -> Result<String> {
        let _published = self.lock();
        let families = self.inner.registry.gather();
        Ok(TextEncoder::new().encode_to_string(&families)?)
    }

    fn delete_series(&self, key: &PodKey, attachments: &[Attachment]) {
        for attachment in attachments.iter().filter(|a| a.has_interface()) {
            // Duplicate attachments share a series, so a second delete finds nothing.
            let _ = self
                .inner
                .gauge
                .remove_label_values(&label_values(key, attachment));
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PodKey, Vec<Attachment>>> {
        self.inner
            .published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn label_values<'a>(key: &'a PodKey, attachment: &'a Attachment) -> [&'a str; 4] {
    [
        key.name.as_str(),
        key.namespace.as_str(),
        attachment.interface.as_str(),
        attachment.network_name.as_str(),
    ]
}

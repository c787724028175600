//! Parsing of the CNI network status annotation
//!
//! The annotation is a JSON array written by the meta CNI plugin, one element
//! per network the pod is attached to:
//!
//! ```json
//! [{"name": "kindnet", "interface": "eth0", "ips": ["10.244.0.10"], "default": true}]
//! ```
//!
//! Only `name` and `interface` are read; everything else is ignored.

use crate::k8s::types::annotation;
use crate::{NetmetricsError, Result};
use k8s_openapi::api::core::v1::Pod;
use serde::Deserialize;

/// Name of the network status annotation
pub const NETWORK_STATUS_ANNOTATION: &str = "k8s.v1.cni.cncf.io/networks-status";

#[derive(Debug, Deserialize)]
struct NetworkStatus {
    name: String,
    #[serde(default)]
    interface: Option<String>,
}

/// Link between a pod, one of its interfaces and the network it belongs to.
///
/// `interface` is empty for networks that do not expose an interface in the
/// pod; such attachments are never exported.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Attachment {
    pub interface: String,
    pub network_name: String,
}

impl Attachment {
    pub fn new(interface: impl Into<String>, network_name: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
            network_name: network_name.into(),
        }
    }

    pub fn has_interface(&self) -> bool {
        !self.interface.is_empty()
    }
}

/// Decode the annotation text into attachments, preserving order.
///
/// An absent or empty annotation is a pod with no attachments, not an error.
pub fn parse_network_status(pod_name: &str, text: Option<&str>) -> Result<Vec<Attachment>> {
    let text = match text {
        Some(t) if !t.is_empty() => t,
        _ => return Ok(Vec::new()),
    };

    let statuses: Vec<NetworkStatus> =
        serde_json::from_str(text).map_err(|source| NetmetricsError::AnnotationParse {
            pod: pod_name.to_string(),
            annotation: text.to_string(),
            source,
        })?;

    Ok(statuses
        .into_iter()
        .map(|s| Attachment {
            interface: s.interface.unwrap_or_default(),
            network_name: s.name,
        })
        .collect())
}

/// Attachments declared by the pod's network status annotation.
pub fn pod_attachments(pod: &Pod) -> Result<Vec<Attachment>> {
    let name = pod.metadata.name.as_deref().unwrap_or_default();
    parse_network_status(name, annotation(pod, NETWORK_STATUS_ANNOTATION))
}

use thiserror::Error;

#[derive(Error, Debug)]
pub enum NetmetricsError {
    #[error("Kubernetes error: {0}")]
    KubernetesError(String),

    #[error("Pod not found: {name} in namespace {namespace}")]
    PodNotFound { name: String, namespace: String },

    #[error("Pod cache is not in sync with the API server, cannot resolve {key}")]
    CacheDesynced { key: String },

    #[error("Failed to parse network status annotation for pod {pod}: {source} - [{annotation}]")]
    AnnotationParse {
        pod: String,
        annotation: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Timed out waiting for the pod cache to sync")]
    CacheSyncFailed,

    #[error("Metrics error: {0}")]
    MetricsError(#[from] prometheus::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl NetmetricsError {
    /// Whether the error means the pod is confirmed gone rather than a failed read.
    pub fn is_not_found(&self) -> bool {
        matches!(self, NetmetricsError::PodNotFound { .. })
    }
}

pub type Result<T> = std::result::Result<T, NetmetricsError>;

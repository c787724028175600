use crate::{NetmetricsError, Result};
use k8s_openapi::api::core::v1::Pod;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Api, Client, Config};
use std::path::Path;
use tracing::{debug, info};

pub struct K8sClient {
    client: Client,
}

impl K8sClient {
    /// Build a client from an explicit kubeconfig file when given, otherwise
    /// from the in-cluster or default configuration. `master` replaces the
    /// API server address either way.
    pub async fn new(kubeconfig: Option<&Path>, master: Option<&str>) -> Result<Self> {
        debug!("Initializing Kubernetes client");

        let mut config = match kubeconfig {
            Some(path) => config_from_file(path).await?,
            None => Config::infer().await.map_err(|e| {
                NetmetricsError::ConfigError(format!("Failed to infer K8s config: {}", e))
            })?,
        };
        if let Some(master) = master {
            override_master(&mut config, master)?;
        }

        let client = Client::try_from(config).map_err(|e| {
            NetmetricsError::KubernetesError(format!("Failed to create K8s client: {}", e))
        })?;

        info!("Successfully connected to Kubernetes cluster");

        Ok(Self { client })
    }

    pub fn pods_all(&self) -> Api<Pod> {
        Api::all(self.client.clone())
    }
}

async fn config_from_file(path: &Path) -> Result<Config> {
    debug!("Reading kubeconfig {}", path.display());

    let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
        NetmetricsError::ConfigError(format!(
            "Failed to read kubeconfig {}: {}",
            path.display(),
            e
        ))
    })?;
    Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
        .await
        .map_err(|e| NetmetricsError::ConfigError(format!("Invalid kubeconfig: {}", e)))
}

fn override_master(config: &mut Config, master: &str) -> Result<()> {
    config.cluster_url = master.parse().map_err(|e| {
        NetmetricsError::ConfigError(format!("Invalid API server address {}: {}", master, e))
    })?;
    Ok(())
}

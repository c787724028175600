use crate::cli::Cli;
use crate::controller::Controller;
use crate::k8s::{K8sClient, PodCache, PodWatcher};
use crate::metrics::{PodNetworkMetrics, PrometheusExporter};
use crate::NetmetricsError;
use anyhow::{Context, Result};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Run the daemon until a termination signal is received.
pub async fn run(cli: Cli) -> Result<()> {
    if cli.node_name.is_empty() {
        return Err(NetmetricsError::ConfigError(
            "--node-name required parameter not set".to_string(),
        )
        .into());
    }
    info!(
        node = %cli.node_name,
        metrics_address = %cli.metrics_listen_address,
        workers = cli.workers,
        "Starting with config"
    );

    let shutdown = CancellationToken::new();
    tokio::spawn(wait_for_signal(shutdown.clone()));

    let client = K8sClient::new(cli.kubeconfig.as_deref(), cli.master.as_deref())
        .await
        .context("Error building kubernetes client")?;
    let metrics = PodNetworkMetrics::new().context("Error registering metrics")?;
    let cache = PodCache::new();

    let controller = Controller::new(
        cli.node_name.clone(),
        cache.clone(),
        metrics.clone(),
        usize::from(cli.workers),
    );

    let watcher = PodWatcher::new(client.pods_all(), cache.clone(), cli.node_name.clone());
    let filter = controller.event_filter();
    let watch_task = tokio::spawn({
        let shutdown = shutdown.clone();
        async move { watcher.run(move |event| filter.handle(&event), shutdown).await }
    });

    let exporter = PrometheusExporter::new(metrics, cli.metrics_listen_address);
    let exporter_task = tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if let Err(e) = exporter.start(shutdown).await {
                error!("Failed serving network metrics: {}", e);
            }
        }
    });

    let sync_timeout = Duration::from_secs(cli.cache_sync_timeout);
    let synced = async move {
        tokio::time::timeout(sync_timeout, cache.wait_synced())
            .await
            .map_err(|_| NetmetricsError::CacheSyncFailed)
    };

    let result = controller
        .run(synced, shutdown.clone())
        .await
        .context("Error running controller");

    shutdown.cancel();
    let _ = tokio::join!(watch_task, exporter_task);

    result
}

async fn wait_for_signal(shutdown: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    info!("Shutdown signal received");
    shutdown.cancel();
}

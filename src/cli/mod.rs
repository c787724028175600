pub mod commands;

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "netmetricsd")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(
    about = "Publishes the network attachments of the pods on this node as Prometheus metrics",
    long_about = None
)]
pub struct Cli {
    #[arg(short, long, help = "Enable verbose logging")]
    pub verbose: bool,

    #[arg(long, env = "NODE_NAME", help = "The node the daemon is running on")]
    pub node_name: String,

    #[arg(
        long,
        env = "METRICS_LISTEN_ADDRESS",
        default_value = "0.0.0.0:9091",
        help = "Metrics server listen address"
    )]
    pub metrics_listen_address: SocketAddr,

    // KUBECONFIG itself is left to the default client config, which
    // understands path lists.
    #[arg(long, help = "Path to a kubeconfig. Only required if out-of-cluster")]
    pub kubeconfig: Option<PathBuf>,

    #[arg(
        long,
        help = "The address of the Kubernetes API server. Overrides any value in kubeconfig"
    )]
    pub master: Option<String>,

    #[arg(
        long,
        default_value_t = 2,
        value_parser = clap::value_parser!(u16).range(1..),
        help = "Number of pods reconciled in parallel"
    )]
    pub workers: u16,

    #[arg(
        long,
        default_value_t = 300,
        help = "Seconds to wait for the pod cache to sync before giving up"
    )]
    pub cache_sync_timeout: u64,
}

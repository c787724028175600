pub mod exporter;
pub mod store;

pub use exporter::PrometheusExporter;
pub use store::PodNetworkMetrics;

pub mod cli;
pub mod controller;
pub mod error;
pub mod k8s;
pub mod metrics;
pub mod network;

pub use error::{NetmetricsError, Result};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod cache;
pub mod client;
pub mod types;
pub mod watcher;

pub use cache::{PodCache, PodSource};
pub use client::K8sClient;
pub use types::{DeletedPod, PodEvent, PodKey};
pub use watcher::PodWatcher;

//! Kubernetes pod watcher feeding the local pod cache
//!
//! Watches the pods scheduled to this node and mirrors them into a
//! [`PodCache`]. Every change applied to the cache is handed to the caller
//! as a [`PodEvent`].

use crate::k8s::cache::PodCache;
use crate::k8s::types::PodEvent;
use crate::{NetmetricsError, Result};
use futures::{Stream, TryStreamExt};
use k8s_openapi::api::core::v1::Pod;
use kube::runtime::watcher::{self, Event};
use kube::Api;
use std::fmt::Display;
use std::pin::pin;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

pub struct PodWatcher {
    api: Api<Pod>,
    cache: PodCache,
    node_name: String,
}

impl PodWatcher {
    pub fn new(api: Api<Pod>, cache: PodCache, node_name: impl Into<String>) -> Self {
        Self {
            api,
            cache,
            node_name: node_name.into(),
        }
    }

    /// Watch pods until `shutdown` is cancelled, reconnecting on failure.
    pub async fn run<F>(&self, handler: F, shutdown: CancellationToken)
    where
        F: Fn(PodEvent),
    {
        info!(node = %self.node_name, "Starting pod watcher");

        let mut backoff = INITIAL_BACKOFF;

        loop {
            let result = tokio::select! {
                _ = shutdown.cancelled() => break,
                result = self.watch_pods(&handler) => result,
            };

            match result {
                Ok(()) => {
                    warn!("Pod watch stream ended, reconnecting...");
                    backoff = INITIAL_BACKOFF;
                }
                Err(e) => {
                    error!("Pod watch failed: {}, reconnecting in {:?}", e, backoff);
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(backoff) => {}
                    }
                    backoff = std::cmp::min(backoff * 2, MAX_BACKOFF);
                }
            }
        }

        info!("Pod watcher stopped");
    }

    async fn watch_pods<F>(&self, handler: &F) -> Result<()>
    where
        F: Fn(PodEvent),
    {
        let config =
            watcher::Config::default().fields(&format!("spec.nodeName={}", self.node_name));
        let stream = watcher::watcher(self.api.clone(), config);
        consume(&self.cache, stream, handler).await
    }
}

/// Feed a watch stream into the cache until it ends or fails.
///
/// Whatever the outcome, the cache is left desynced: events may be missed
/// until the next stream completes a relist.
async fn consume<St, E, F>(cache: &PodCache, stream: St, handler: &F) -> Result<()>
where
    St: Stream<Item = std::result::Result<Event<Pod>, E>>,
    E: Display,
    F: Fn(PodEvent),
{
    let result = drain(cache, stream, handler).await;
    cache.mark_desynced();
    result
}

async fn drain<St, E, F>(cache: &PodCache, stream: St, handler: &F) -> Result<()>
where
    St: Stream<Item = std::result::Result<Event<Pod>, E>>,
    E: Display,
    F: Fn(PodEvent),
{
    let mut stream = pin!(stream);
    let mut relisted: Vec<Pod> = Vec::new();

    while let Some(event) = stream
        .try_next()
        .await
        .map_err(|e| NetmetricsError::KubernetesError(e.to_string()))?
    {
        on_event(cache, event, &mut relisted, handler);
    }

    Ok(())
}

fn on_event<F>(cache: &PodCache, event: Event<Pod>, relisted: &mut Vec<Pod>, handler: &F)
where
    F: Fn(PodEvent),
{
    match event {
        Event::Init => {
            debug!("Pod watcher (re)listing");
            relisted.clear();
        }
        Event::InitApply(pod) => {
            relisted.push(pod);
        }
        Event::InitDone => {
            let events = cache.replace(std::mem::take(relisted));
            info!(
                "Pod watcher initial sync complete. Tracking {} pods",
                cache.len()
            );
            events.into_iter().for_each(handler);
        }
        Event::Apply(pod) => {
            if let Some(event) = cache.apply(pod) {
                handler(event);
            }
        }
        Event::Delete(pod) => {
            if let Some(event) = cache.delete(pod) {
                handler(event);
            }
        }
    }
}

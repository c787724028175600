use k8s_openapi::api::core::v1::{Pod, PodSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use netmetricsd::controller::{Controller, EventFilter, WorkQueue};
use netmetricsd::error::{NetmetricsError, Result};
use netmetricsd::k8s::{PodCache, PodEvent, PodKey};
use netmetricsd::metrics::PodNetworkMetrics;
use netmetricsd::network::NETWORK_STATUS_ANNOTATION;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const NODE: &str = "NodeName";

type Series = BTreeMap<String, String>;

fn new_pod(name: &str, namespace: &str, status: &str) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            annotations: Some(BTreeMap::from([(
                NETWORK_STATUS_ANNOTATION.to_string(),
                status.to_string(),
            )])),
            ..Default::default()
        },
        spec: Some(PodSpec {
            node_name: Some(NODE.to_string()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn status(interface: &str, network: &str) -> String {
    format!(r#"[{{"name":"{network}","interface":"{interface}","ips":["10.244.0.10"]}}]"#)
}

fn series(pod: &str, namespace: &str, interface: &str, network: &str) -> Series {
    BTreeMap::from([
        ("pod".to_string(), pod.to_string()),
        ("namespace".to_string(), namespace.to_string()),
        ("interface".to_string(), interface.to_string()),
        ("network_name".to_string(), network.to_string()),
    ])
}

/// Parse the exported `pod_network_name_info` series out of the exposition text.
fn exported(metrics: &PodNetworkMetrics) -> Vec<Series> {
    let rendered = metrics.render().expect("render metrics");
    let mut out: Vec<Series> = rendered
        .lines()
        .filter(|line| line.starts_with("pod_network_name_info{"))
        .map(|line| {
            assert!(line.ends_with("} 0"), "unexpected value in {line}");
            let start = line.find('{').unwrap() + 1;
            let end = line.rfind('}').unwrap();
            line[start..end]
                .split(',')
                .map(|pair| {
                    let (name, value) = pair.split_once('=').unwrap();
                    (name.to_string(), value.trim_matches('"').to_string())
                })
                .collect()
        })
        .collect();
    out.sort();
    out
}

async fn wait_for_series(metrics: &PodNetworkMetrics, expected: Vec<Series>) {
    let mut expected = expected;
    expected.sort();
    let converged = tokio::time::timeout(Duration::from_secs(5), async {
        while exported(metrics) != expected {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(
        converged.is_ok(),
        "expected {:?}, exported {:?}",
        expected,
        exported(metrics)
    );
}

struct Daemon {
    cache: PodCache,
    metrics: PodNetworkMetrics,
    filter: EventFilter,
    shutdown: CancellationToken,
    handle: JoinHandle<Result<()>>,
    queue: WorkQueue<PodKey>,
}

impl Daemon {
    fn start(workers: usize) -> Self {
        let cache = PodCache::new();
        let metrics = PodNetworkMetrics::new().expect("metrics");
        let controller = Controller::new(NODE, cache.clone(), metrics.clone(), workers);
        let filter = controller.event_filter();
        let queue = controller.queue().clone();
        let shutdown = CancellationToken::new();

        let synced = {
            let cache = cache.clone();
            async move {
                cache.wait_synced().await;
                Ok(())
            }
        };
        let handle = tokio::spawn(controller.run(synced, shutdown.clone()));

        Self {
            cache,
            metrics,
            filter,
            shutdown,
            handle,
            queue,
        }
    }

    fn deliver(&self, events: impl IntoIterator<Item = PodEvent>) {
        for event in events {
            self.filter.handle(&event);
        }
    }

    fn sync(&self, pods: Vec<Pod>) {
        let events = self.cache.replace(pods);
        self.deliver(events);
    }

    fn apply(&self, pod: Pod) {
        self.deliver(self.cache.apply(pod));
    }

    fn delete(&self, pod: Pod) {
        self.deliver(self.cache.delete(pod));
    }

    async fn stop(self) {
        self.shutdown.cancel();
        self.handle
            .await
            .expect("controller task")
            .expect("controller result");
    }
}

#[test]
fn test_error_types() {
    let err = NetmetricsError::PodNotFound {
        name: "test-pod".to_string(),
        namespace: "default".to_string(),
    };

    assert!(err.to_string().contains("test-pod"));
    assert!(err.to_string().contains("default"));
    assert!(err.is_not_found());
}

#[test]
fn test_version_const() {
    assert!(!netmetricsd::VERSION.is_empty());
}

#[tokio::test]
async fn test_publishes_metric_for_new_pod() {
    let daemon = Daemon::start(2);

    daemon.sync(vec![new_pod(
        "podname",
        "namespace",
        &status("eth0", "kindnet"),
    )]);

    wait_for_series(
        &daemon.metrics,
        vec![series("podname", "namespace", "eth0", "kindnet")],
    )
    .await;
    daemon.stop().await;
}

#[tokio::test]
async fn test_removed_pod_leaves_no_series() {
    let daemon = Daemon::start(2);
    let pod = new_pod("podname", "namespace", &status("eth0", "kindnet"));

    daemon.sync(vec![pod.clone()]);
    wait_for_series(
        &daemon.metrics,
        vec![series("podname", "namespace", "eth0", "kindnet")],
    )
    .await;

    daemon.delete(pod);
    wait_for_series(&daemon.metrics, Vec::new()).await;
    assert_eq!(daemon.metrics.pod_count(), 0);
    daemon.stop().await;
}

#[tokio::test]
async fn test_changed_attachment_replaces_series() {
    let daemon = Daemon::start(2);

    daemon.sync(vec![new_pod(
        "podname",
        "namespace",
        &status("eth0", "kindnet"),
    )]);
    wait_for_series(
        &daemon.metrics,
        vec![series("podname", "namespace", "eth0", "kindnet")],
    )
    .await;

    daemon.apply(new_pod(
        "podname",
        "namespace",
        &status("net1", "macvlan-conf"),
    ));
    wait_for_series(
        &daemon.metrics,
        vec![series("podname", "namespace", "net1", "macvlan-conf")],
    )
    .await;
    daemon.stop().await;
}

#[tokio::test]
async fn test_removing_one_pod_keeps_the_other() {
    let daemon = Daemon::start(2);
    let first = new_pod("first", "namespace", &status("eth0", "kindnet"));
    let second = new_pod("second", "namespace", &status("eth0", "kindnet"));

    daemon.sync(vec![first, second.clone()]);
    wait_for_series(
        &daemon.metrics,
        vec![
            series("first", "namespace", "eth0", "kindnet"),
            series("second", "namespace", "eth0", "kindnet"),
        ],
    )
    .await;

    daemon.delete(second);
    wait_for_series(
        &daemon.metrics,
        vec![series("first", "namespace", "eth0", "kindnet")],
    )
    .await;
    daemon.stop().await;
}

#[tokio::test]
async fn test_malformed_annotation_keeps_last_good_state() {
    let daemon = Daemon::start(1);
    let key = PodKey::new("podname", "namespace");

    daemon.sync(vec![new_pod(
        "podname",
        "namespace",
        &status("eth0", "kindnet"),
    )]);
    wait_for_series(
        &daemon.metrics,
        vec![series("podname", "namespace", "eth0", "kindnet")],
    )
    .await;

    daemon.apply(new_pod("podname", "namespace", "not json"));
    let retried = tokio::time::timeout(Duration::from_secs(5), async {
        while daemon.queue.num_requeues(&key) < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(retried.is_ok(), "failed reconciliation was not retried");
    assert_eq!(
        exported(&daemon.metrics),
        vec![series("podname", "namespace", "eth0", "kindnet")]
    );

    // A fixed annotation converges and resets the retry history.
    daemon.apply(new_pod(
        "podname",
        "namespace",
        &status("net1", "macvlan-conf"),
    ));
    wait_for_series(
        &daemon.metrics,
        vec![series("podname", "namespace", "net1", "macvlan-conf")],
    )
    .await;
    daemon.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_converges_to_last_update_under_churn() {
    let daemon = Daemon::start(4);
    daemon.sync(vec![new_pod("podname", "namespace", "")]);

    for i in 0..100 {
        daemon.apply(new_pod(
            "podname",
            "namespace",
            &status(&format!("net{i}"), "macvlan-conf"),
        ));
        if i % 10 == 0 {
            tokio::task::yield_now().await;
        }
    }

    wait_for_series(
        &daemon.metrics,
        vec![series("podname", "namespace", "net99", "macvlan-conf")],
    )
    .await;
    daemon.stop().await;
}

#[tokio::test]
async fn test_relist_purges_pods_deleted_while_disconnected() {
    let daemon = Daemon::start(2);
    let first = new_pod("first", "namespace", &status("eth0", "kindnet"));
    let second = new_pod("second", "namespace", &status("eth0", "kindnet"));

    daemon.sync(vec![first.clone(), second]);
    wait_for_series(
        &daemon.metrics,
        vec![
            series("first", "namespace", "eth0", "kindnet"),
            series("second", "namespace", "eth0", "kindnet"),
        ],
    )
    .await;

    daemon.cache.mark_desynced();
    daemon.sync(vec![first]);
    wait_for_series(
        &daemon.metrics,
        vec![series("first", "namespace", "eth0", "kindnet")],
    )
    .await;
    daemon.stop().await;
}

#[tokio::test]
async fn test_pods_on_other_nodes_are_ignored() {
    let daemon = Daemon::start(1);
    let mut elsewhere = new_pod("elsewhere", "namespace", &status("eth0", "kindnet"));
    if let Some(spec) = elsewhere.spec.as_mut() {
        spec.node_name = Some("other-node".to_string());
    }

    daemon.sync(vec![elsewhere]);
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(exported(&daemon.metrics).is_empty());
    assert!(daemon.queue.is_empty());
    daemon.stop().await;
}

#[tokio::test]
async fn test_controller_fails_when_cache_never_syncs() {
    let cache = PodCache::new();
    let metrics = PodNetworkMetrics::new().expect("metrics");
    let controller = Controller::new(NODE, cache, metrics, 1);

    let result = controller
        .run(
            async { Err(NetmetricsError::CacheSyncFailed) },
            CancellationToken::new(),
        )
        .await;

    assert!(matches!(result, Err(NetmetricsError::CacheSyncFailed)));
}

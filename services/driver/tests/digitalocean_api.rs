//! DigitalOcean gateway against a mock API server.

use std::collections::BTreeMap;
use std::time::Duration;

use doks_driver::gateway::{ClusterStatus, DigitalOceanGateway, GatewayError, ProviderGateway};
use doks_reconcile::{FixedRetry, OpContext};
use doks_state::{AccessToken, ClusterState, NodePoolState};
use serde_json::json;
use wiremock::matchers::{body_json, body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CLUSTER: &str = "/v2/kubernetes/clusters/bd5f5959";
const NODE_POOL: &str = "/v2/kubernetes/clusters/bd5f5959/node_pools/cdda885e";

fn gateway(server: &MockServer) -> DigitalOceanGateway {
    DigitalOceanGateway::new(
        &server.uri(),
        &AccessToken::new("dop_v1_test"),
        Duration::from_secs(5),
        FixedRetry {
            attempts: 3,
            delay: Duration::from_millis(10),
        },
    )
    .unwrap()
}

fn cluster_state() -> ClusterState {
    ClusterState {
        name: "prod-cluster".to_string(),
        region_slug: "nyc1".to_string(),
        version_slug: "1.29.1-do.0".to_string(),
        vpc_id: "c33931f2".to_string(),
        tags: ["env:prod".to_string()].into_iter().collect(),
        ..Default::default()
    }
}

fn node_pool_state() -> NodePoolState {
    NodePoolState {
        name: "frontend-pool".to_string(),
        size: "s-1vcpu-2gb".to_string(),
        count: 3,
        labels: BTreeMap::from([("service".to_string(), "frontend".to_string())]),
        auto_scale: Some(true),
        min_nodes: 3,
        max_nodes: 6,
    }
}

fn cluster_body(state: &str) -> serde_json::Value {
    json!({
        "kubernetes_cluster": {
            "id": "bd5f5959",
            "name": "prod-cluster",
            "region": "nyc1",
            "version": "1.29.1-do.0",
            "status": {"state": state, "message": ""},
            "tags": ["env:prod", "k8s", "k8s:bd5f5959"],
            "auto_upgrade": false,
            "node_pools": [{"id": "cdda885e", "name": "frontend-pool", "count": 3}]
        }
    })
}

const KUBECONFIG: &str = "\
apiVersion: v1
clusters:
- cluster:
    certificate-authority-data: LS0tLS1CRUdJTg==
    server: https://bd5f5959.k8s.ondigitalocean.com
  name: do-nyc1-prod-cluster
users:
- name: do-nyc1-prod-cluster-admin
  user:
    token: 403d085f
";

#[tokio::test]
async fn create_cluster_sends_expected_payload() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v2/kubernetes/clusters"))
        .and(header("authorization", "Bearer dop_v1_test"))
        .and(body_json(json!({
            "name": "prod-cluster",
            "region": "nyc1",
            "version": "1.29.1-do.0",
            "vpc_uuid": "c33931f2",
            "tags": ["env:prod"],
            "node_pools": [{
                "name": "frontend-pool",
                "size": "s-1vcpu-2gb",
                "count": 3,
                "labels": {"service": "frontend"},
                "auto_scale": true,
                "min_nodes": 3,
                "max_nodes": 6
            }]
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(cluster_body("provisioning")))
        .expect(1)
        .mount(&server)
        .await;

    let created = gateway(&server)
        .create_cluster(&OpContext::new(), &cluster_state(), &node_pool_state())
        .await
        .unwrap();

    assert_eq!(created.cluster_id, "bd5f5959");
    assert_eq!(created.node_pool_id, "cdda885e");
}

#[tokio::test]
async fn get_cluster_reads_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(CLUSTER))
        .respond_with(ResponseTemplate::new(200).set_body_json(cluster_body("running")))
        .mount(&server)
        .await;

    let gateway = gateway(&server);
    let snapshot = gateway
        .get_cluster(&OpContext::new(), "bd5f5959")
        .await
        .unwrap();

    assert_eq!(snapshot.status, ClusterStatus::Running);
    assert_eq!(snapshot.node_pool_ids, vec!["cdda885e"]);

    let version = gateway
        .get_kubernetes_cluster_version(&OpContext::new(), "bd5f5959")
        .await
        .unwrap();
    assert_eq!(version, "1.29.1-do.0");
}

#[tokio::test]
async fn missing_cluster_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(CLUSTER))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "id": "not_found",
            "message": "The resource you were accessing could not be found."
        })))
        .mount(&server)
        .await;

    let err = gateway(&server)
        .get_cluster(&OpContext::new(), "bd5f5959")
        .await
        .unwrap_err();

    assert!(err.is_not_found());
}

#[tokio::test]
async fn error_body_is_surfaced() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path(CLUSTER))
        .respond_with(ResponseTemplate::new(422).set_body_json(json!({
            "id": "unprocessable_entity",
            "message": "cluster is being upgraded"
        })))
        .mount(&server)
        .await;

    let err = gateway(&server)
        .delete_cluster(&OpContext::new(), "bd5f5959")
        .await
        .unwrap_err();

    match err {
        GatewayError::Api {
            status,
            ref id,
            ref message,
        } => {
            assert_eq!(status, 422);
            assert_eq!(id, "unprocessable_entity");
            assert_eq!(message, "cluster is being upgraded");
        }
        other => panic!("expected API error, got {other:?}"),
    }
}

#[tokio::test]
async fn error_without_body_is_unknown() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path(CLUSTER))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = gateway(&server)
        .delete_cluster(&OpContext::new(), "bd5f5959")
        .await
        .unwrap_err();

    assert!(matches!(err, GatewayError::Api { status: 503, ref id, .. } if id == "unknown"));
    assert!(err.is_transient());
}

#[tokio::test]
async fn update_node_pool_sends_bounds_only_with_autoscale() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path(NODE_POOL))
        .and(body_json(json!({
            "name": "frontend-pool",
            "count": 8,
            "labels": {"service": "frontend"},
            "auto_scale": true,
            "min_nodes": 3,
            "max_nodes": 8
        })))
        .respond_with(ResponseTemplate::new(202).set_body_json(json!({"node_pool": {"id": "cdda885e"}})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path(NODE_POOL))
        .and(body_json(json!({
            "name": "frontend-pool",
            "count": 2,
            "labels": {"service": "frontend"},
            "auto_scale": false
        })))
        .respond_with(ResponseTemplate::new(202).set_body_json(json!({"node_pool": {"id": "cdda885e"}})))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = gateway(&server);
    let ctx = OpContext::new();

    let mut scaled = node_pool_state();
    scaled.count = 8;
    scaled.max_nodes = 8;
    gateway
        .update_node_pool(&ctx, "bd5f5959", "cdda885e", &scaled)
        .await
        .unwrap();

    let mut fixed = node_pool_state();
    fixed.count = 2;
    fixed.auto_scale = Some(false);
    gateway
        .update_node_pool(&ctx, "bd5f5959", "cdda885e", &fixed)
        .await
        .unwrap();
}

#[tokio::test]
async fn get_node_pool_reads_shape() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(NODE_POOL))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "node_pool": {
                "id": "cdda885e",
                "name": "frontend-pool",
                "size": "s-1vcpu-2gb",
                "count": 3,
                "labels": null,
                "auto_scale": true,
                "min_nodes": 3,
                "max_nodes": 6
            }
        })))
        .mount(&server)
        .await;

    let pool = gateway(&server)
        .get_node_pool(&OpContext::new(), "bd5f5959", "cdda885e")
        .await
        .unwrap();

    assert_eq!(pool.count, 3);
    assert!(pool.auto_scale);
    assert_eq!((pool.min_nodes, pool.max_nodes), (3, 6));
    assert!(pool.labels.is_empty());
}

#[tokio::test]
async fn update_cluster_and_upgrade() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path(CLUSTER))
        .and(body_partial_json(json!({"tags": ["env:prod"], "auto_upgrade": true})))
        .respond_with(ResponseTemplate::new(202).set_body_json(cluster_body("running")))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("{CLUSTER}/upgrade")))
        .and(body_json(json!({"version": "1.30.0-do.0"})))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = gateway(&server);
    let ctx = OpContext::new();
    let mut cluster = cluster_state();
    cluster.auto_upgrade = Some(true);

    gateway
        .update_cluster(&ctx, "bd5f5959", &cluster)
        .await
        .unwrap();
    gateway
        .upgrade_kubernetes_version(&ctx, "bd5f5959", "1.30.0-do.0")
        .await
        .unwrap();
}

#[tokio::test]
async fn kubeconfig_is_retried_until_available() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{CLUSTER}/kubeconfig")))
        .respond_with(ResponseTemplate::new(404))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{CLUSTER}/kubeconfig")))
        .respond_with(ResponseTemplate::new(200).set_body_string(KUBECONFIG))
        .expect(1)
        .mount(&server)
        .await;

    let config = gateway(&server)
        .get_kube_config(&OpContext::new(), "bd5f5959")
        .await
        .unwrap();

    assert_eq!(
        config.first_cluster().unwrap().server,
        "https://bd5f5959.k8s.ondigitalocean.com"
    );
    assert_eq!(config.first_user().unwrap().token, "403d085f");
}

#[tokio::test]
async fn kubeconfig_retry_returns_last_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{CLUSTER}/kubeconfig")))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "id": "server_error",
            "message": "kubeconfig not ready"
        })))
        .expect(3)
        .mount(&server)
        .await;

    let err = gateway(&server)
        .get_kube_config(&OpContext::new(), "bd5f5959")
        .await
        .unwrap_err();

    assert!(matches!(err, GatewayError::Api { status: 500, .. }));
}

#[tokio::test]
async fn kubeconfig_rejection_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{CLUSTER}/kubeconfig")))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "id": "unauthorized",
            "message": "Unable to authenticate you"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let err = gateway(&server)
        .get_kube_config(&OpContext::new(), "bd5f5959")
        .await
        .unwrap_err();

    assert!(matches!(err, GatewayError::Api { status: 401, .. }));
}

#[tokio::test]
async fn cancelled_context_sends_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(cluster_body("running")))
        .expect(0)
        .mount(&server)
        .await;

    let ctx = OpContext::new();
    ctx.cancel();

    let err = gateway(&server)
        .get_cluster(&ctx, "bd5f5959")
        .await
        .unwrap_err();

    assert!(matches!(err, GatewayError::Interrupted(_)));
}

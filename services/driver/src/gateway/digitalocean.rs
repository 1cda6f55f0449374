//! DigitalOcean Kubernetes REST client.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use doks_reconcile::{retry_fixed_when, FixedRetry, OpContext};
use doks_state::{AccessToken, ClusterState, NodePoolState};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{
    ClusterSnapshot, ClusterStatus, CreatedCluster, GatewayError, GatewayFactory,
    NodePoolSnapshot, ProviderGateway,
};
use crate::config::Config;
use crate::kubeconfig::KubeConfig;

/// Builds a fresh [`DigitalOceanGateway`] for every token.
#[derive(Debug, Clone)]
pub struct DigitalOceanFactory {
    api_url: String,
    request_timeout: Duration,
    kubeconfig_retry: FixedRetry,
}

impl DigitalOceanFactory {
    pub fn new(config: &Config) -> Self {
        Self {
            api_url: config.api_url.clone(),
            request_timeout: config.request_timeout,
            kubeconfig_retry: config.kubeconfig_retry,
        }
    }
}

impl GatewayFactory for DigitalOceanFactory {
    fn connect(&self, token: &AccessToken) -> Result<Arc<dyn ProviderGateway>, GatewayError> {
        let gateway = DigitalOceanGateway::new(
            &self.api_url,
            token,
            self.request_timeout,
            self.kubeconfig_retry,
        )?;
        Ok(Arc::new(gateway))
    }
}

/// Gateway backed by the DigitalOcean v2 API.
#[derive(Debug, Clone)]
pub struct DigitalOceanGateway {
    client: reqwest::Client,
    base_url: String,
    kubeconfig_retry: FixedRetry,
}

impl DigitalOceanGateway {
    pub fn new(
        api_url: &str,
        token: &AccessToken,
        request_timeout: Duration,
        kubeconfig_retry: FixedRetry,
    ) -> Result<Self, GatewayError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let mut auth = HeaderValue::from_str(&format!("Bearer {}", token.as_str()))
            .map_err(|_| GatewayError::InvalidToken)?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(request_timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: api_url.trim_end_matches('/').to_string(),
            kubeconfig_retry,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn cluster_path(cluster_id: &str) -> String {
        format!("/v2/kubernetes/clusters/{cluster_id}")
    }

    fn node_pool_path(cluster_id: &str, pool_id: &str) -> String {
        format!("/v2/kubernetes/clusters/{cluster_id}/node_pools/{pool_id}")
    }

    /// Send a request, racing it against the context, and map error statuses.
    async fn send(
        &self,
        ctx: &OpContext,
        request: reqwest::RequestBuilder,
        resource: &str,
    ) -> Result<reqwest::Response, GatewayError> {
        let response = ctx.run(request.send()).await??;

        if response.status().is_success() {
            Ok(response)
        } else {
            Err(self.handle_error(ctx, response, resource).await)
        }
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        ctx: &OpContext,
        request: reqwest::RequestBuilder,
        resource: &str,
    ) -> Result<T, GatewayError> {
        let response = self.send(ctx, request, resource).await?;
        ctx.run(response.json::<T>())
            .await?
            .map_err(|e| GatewayError::Decode(format!("{resource}: {e}")))
    }

    async fn handle_error(
        &self,
        ctx: &OpContext,
        response: reqwest::Response,
        resource: &str,
    ) -> GatewayError {
        let status = response.status().as_u16();

        if status == 404 {
            return GatewayError::NotFound {
                resource: resource.to_string(),
            };
        }

        let body = match ctx.run(response.json::<ApiErrorResponse>()).await {
            Ok(Ok(body)) => body,
            Ok(Err(_)) => ApiErrorResponse {
                id: "unknown".to_string(),
                message: "Unknown error".to_string(),
            },
            Err(interrupted) => return interrupted.into(),
        };

        GatewayError::Api {
            status,
            id: body.id,
            message: body.message,
        }
    }
}

#[async_trait]
impl ProviderGateway for DigitalOceanGateway {
    async fn create_cluster(
        &self,
        ctx: &OpContext,
        cluster: &ClusterState,
        pool: &NodePoolState,
    ) -> Result<CreatedCluster, GatewayError> {
        let request = CreateClusterRequest {
            name: &cluster.name,
            region: &cluster.region_slug,
            version: &cluster.version_slug,
            vpc_uuid: non_empty(&cluster.vpc_id),
            tags: cluster.tags.iter().map(String::as_str).collect(),
            auto_upgrade: cluster.auto_upgrade,
            node_pools: vec![NodePoolRequest::for_create(pool)],
        };

        let response: ClusterEnvelope = self
            .send_json(
                ctx,
                self.client
                    .post(self.url("/v2/kubernetes/clusters"))
                    .json(&request),
                &format!("cluster {}", cluster.name),
            )
            .await?;

        let created = response.kubernetes_cluster;
        let node_pool_id = created
            .node_pools
            .first()
            .map(|pool| pool.id.clone())
            .ok_or_else(|| {
                GatewayError::Decode(format!("cluster {} was created without a node pool", created.id))
            })?;

        info!(cluster_id = %created.id, node_pool_id = %node_pool_id, "Cluster creation accepted");
        Ok(CreatedCluster {
            cluster_id: created.id,
            node_pool_id,
        })
    }

    async fn update_cluster(
        &self,
        ctx: &OpContext,
        cluster_id: &str,
        cluster: &ClusterState,
    ) -> Result<(), GatewayError> {
        let request = UpdateClusterRequest {
            name: non_empty(&cluster.name),
            tags: cluster.tags.iter().map(String::as_str).collect(),
            auto_upgrade: cluster.auto_upgrade,
        };

        self.send(
            ctx,
            self.client
                .put(self.url(&Self::cluster_path(cluster_id)))
                .json(&request),
            &format!("cluster {cluster_id}"),
        )
        .await?;

        info!(cluster_id, "Cluster updated");
        Ok(())
    }

    async fn delete_cluster(&self, ctx: &OpContext, cluster_id: &str) -> Result<(), GatewayError> {
        self.send(
            ctx,
            self.client.delete(self.url(&Self::cluster_path(cluster_id))),
            &format!("cluster {cluster_id}"),
        )
        .await?;

        info!(cluster_id, "Cluster deletion accepted");
        Ok(())
    }

    async fn get_cluster(
        &self,
        ctx: &OpContext,
        cluster_id: &str,
    ) -> Result<ClusterSnapshot, GatewayError> {
        let response: ClusterEnvelope = self
            .send_json(
                ctx,
                self.client.get(self.url(&Self::cluster_path(cluster_id))),
                &format!("cluster {cluster_id}"),
            )
            .await?;

        Ok(response.kubernetes_cluster.into())
    }

    async fn get_node_pool(
        &self,
        ctx: &OpContext,
        cluster_id: &str,
        pool_id: &str,
    ) -> Result<NodePoolSnapshot, GatewayError> {
        let response: NodePoolEnvelope = self
            .send_json(
                ctx,
                self.client
                    .get(self.url(&Self::node_pool_path(cluster_id, pool_id))),
                &format!("node pool {pool_id} of cluster {cluster_id}"),
            )
            .await?;

        Ok(response.node_pool.into())
    }

    async fn update_node_pool(
        &self,
        ctx: &OpContext,
        cluster_id: &str,
        pool_id: &str,
        desired: &NodePoolState,
    ) -> Result<(), GatewayError> {
        let request = NodePoolRequest::for_update(desired);

        self.send(
            ctx,
            self.client
                .put(self.url(&Self::node_pool_path(cluster_id, pool_id)))
                .json(&request),
            &format!("node pool {pool_id} of cluster {cluster_id}"),
        )
        .await?;

        info!(cluster_id, pool_id, count = desired.count, "Node pool updated");
        Ok(())
    }

    async fn upgrade_kubernetes_version(
        &self,
        ctx: &OpContext,
        cluster_id: &str,
        version: &str,
    ) -> Result<(), GatewayError> {
        self.send(
            ctx,
            self.client
                .post(self.url(&format!("{}/upgrade", Self::cluster_path(cluster_id))))
                .json(&UpgradeRequest { version }),
            &format!("cluster {cluster_id}"),
        )
        .await?;

        info!(cluster_id, version, "Kubernetes upgrade requested");
        Ok(())
    }

    async fn get_kube_config(
        &self,
        ctx: &OpContext,
        cluster_id: &str,
    ) -> Result<KubeConfig, GatewayError> {
        let url = self.url(&format!("{}/kubeconfig", Self::cluster_path(cluster_id)));
        let resource = format!("kubeconfig of cluster {cluster_id}");
        let (this, url, resource) = (self, url.as_str(), resource.as_str());

        // The bundle 404s for a while after the cluster reports running.
        let retryable = |err: &GatewayError| err.is_not_found() || err.is_transient();

        retry_fixed_when(ctx, self.kubeconfig_retry, retryable, move || async move {
            debug!(cluster_id, "Fetching kubeconfig");
            let request = this.client.get(url).header(ACCEPT, "application/yaml");
            let response = this.send(ctx, request, resource).await?;
            let body = ctx.run(response.text()).await??;
            KubeConfig::from_yaml(&body)
        })
        .await
    }
}

fn non_empty(value: &str) -> Option<&str> {
    (!value.is_empty()).then_some(value)
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    #[serde(default)]
    id: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Serialize)]
struct CreateClusterRequest<'a> {
    name: &'a str,
    region: &'a str,
    version: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    vpc_uuid: Option<&'a str>,
    tags: Vec<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    auto_upgrade: Option<bool>,
    node_pools: Vec<NodePoolRequest<'a>>,
}

#[derive(Debug, Serialize)]
struct UpdateClusterRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
    tags: Vec<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    auto_upgrade: Option<bool>,
}

#[derive(Debug, Serialize)]
struct NodePoolRequest<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    size: Option<&'a str>,
    count: u32,
    labels: &'a BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    auto_scale: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    min_nodes: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_nodes: Option<u32>,
}

impl<'a> NodePoolRequest<'a> {
    fn new(pool: &'a NodePoolState, size: Option<&'a str>) -> Self {
        let (min_nodes, max_nodes) = if pool.autoscale_enabled() {
            (Some(pool.min_nodes), Some(pool.max_nodes))
        } else {
            (None, None)
        };

        Self {
            name: &pool.name,
            size,
            count: pool.count,
            labels: &pool.labels,
            auto_scale: pool.auto_scale,
            min_nodes,
            max_nodes,
        }
    }

    fn for_create(pool: &'a NodePoolState) -> Self {
        Self::new(pool, Some(&pool.size))
    }

    /// The size of an existing pool cannot change.
    fn for_update(pool: &'a NodePoolState) -> Self {
        Self::new(pool, None)
    }
}

#[derive(Debug, Serialize)]
struct UpgradeRequest<'a> {
    version: &'a str,
}

#[derive(Debug, Deserialize)]
struct ClusterEnvelope {
    kubernetes_cluster: ClusterBody,
}

#[derive(Debug, Deserialize)]
struct ClusterBody {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    version: String,
    #[serde(default)]
    status: Option<StatusBody>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    auto_upgrade: bool,
    #[serde(default)]
    node_pools: Vec<NodePoolBody>,
}

#[derive(Debug, Deserialize)]
struct StatusBody {
    state: ClusterStatus,
}

impl From<ClusterBody> for ClusterSnapshot {
    fn from(body: ClusterBody) -> Self {
        Self {
            id: body.id,
            name: body.name,
            status: body
                .status
                .map(|s| s.state)
                .unwrap_or(ClusterStatus::Unknown),
            version: body.version,
            tags: body.tags,
            auto_upgrade: body.auto_upgrade,
            node_pool_ids: body.node_pools.into_iter().map(|p| p.id).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct NodePoolEnvelope {
    node_pool: NodePoolBody,
}

#[derive(Debug, Deserialize)]
struct NodePoolBody {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    size: String,
    #[serde(default)]
    count: u32,
    #[serde(default)]
    labels: Option<BTreeMap<String, String>>,
    #[serde(default)]
    auto_scale: bool,
    #[serde(default)]
    min_nodes: u32,
    #[serde(default)]
    max_nodes: u32,
}

impl From<NodePoolBody> for NodePoolSnapshot {
    fn from(body: NodePoolBody) -> Self {
        Self {
            id: body.id,
            name: body.name,
            size: body.size,
            count: body.count,
            labels: body.labels.unwrap_or_default(),
            auto_scale: body.auto_scale,
            min_nodes: body.min_nodes,
            max_nodes: body.max_nodes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(auto_scale: Option<bool>) -> NodePoolState {
        NodePoolState {
            name: "workers".into(),
            size: "s-2vcpu-2gb".into(),
            count: 3,
            auto_scale,
            min_nodes: 2,
            max_nodes: 6,
            ..Default::default()
        }
    }

    #[test]
    fn test_url_building() {
        let gateway = DigitalOceanGateway::new(
            "https://api.example.test/",
            &AccessToken::new("t"),
            Duration::from_secs(5),
            FixedRetry::default(),
        )
        .unwrap();

        assert_eq!(
            gateway.url(&DigitalOceanGateway::node_pool_path("c1", "p1")),
            "https://api.example.test/v2/kubernetes/clusters/c1/node_pools/p1"
        );
    }

    #[test]
    fn test_bounds_sent_only_with_autoscale() {
        let enabled = pool(Some(true));
        let body = serde_json::to_value(NodePoolRequest::for_update(&enabled)).unwrap();
        assert_eq!(body["min_nodes"], 2);
        assert_eq!(body["max_nodes"], 6);
        assert!(body.get("size").is_none());

        for auto_scale in [Some(false), None] {
            let disabled = pool(auto_scale);
            let body = serde_json::to_value(NodePoolRequest::for_create(&disabled)).unwrap();
            assert!(body.get("min_nodes").is_none());
            assert!(body.get("max_nodes").is_none());
            assert_eq!(body["size"], "s-2vcpu-2gb");
        }
    }

    #[test]
    fn test_invalid_token_is_rejected() {
        let err = DigitalOceanGateway::new(
            "https://api.example.test",
            &AccessToken::new("bad\ntoken"),
            Duration::from_secs(5),
            FixedRetry::default(),
        )
        .unwrap_err();

        assert!(matches!(err, GatewayError::InvalidToken));
    }

    #[test]
    fn test_cluster_body_without_status_is_unknown() {
        let body: ClusterEnvelope =
            serde_json::from_str(r#"{"kubernetes_cluster": {"id": "c1"}}"#).unwrap();
        let snapshot = ClusterSnapshot::from(body.kubernetes_cluster);
        assert_eq!(snapshot.status, ClusterStatus::Unknown);
    }
}

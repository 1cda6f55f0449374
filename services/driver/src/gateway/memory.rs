//! In-process provider for tests and development.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use doks_reconcile::OpContext;
use doks_state::{AccessToken, ClusterState, NodePoolState};
use tracing::{debug, info};

use super::{
    ClusterSnapshot, ClusterStatus, CreatedCluster, GatewayError, GatewayFactory,
    NodePoolSnapshot, ProviderGateway,
};
use crate::kubeconfig::{ClusterEntry, KubeConfig, NamedCluster, NamedUser, UserEntry};

struct Cluster {
    snapshot: ClusterSnapshot,
    pool: NodePoolSnapshot,
    /// Status reported by successive reads; the last entry sticks.
    statuses: VecDeque<ClusterStatus>,
    /// Reads left before a deleting cluster disappears.
    deleting: Option<u32>,
}

#[derive(Default)]
struct Inner {
    next_id: u64,
    clusters: BTreeMap<String, Cluster>,
    next_statuses: Option<Vec<ClusterStatus>>,
    deletion_polls: u32,
    failures: BTreeMap<&'static str, (u16, String)>,
    kube_config: Option<KubeConfig>,
    kube_config_failures: u32,
    calls: Vec<&'static str>,
}

/// Scripted provider that keeps clusters in memory.
///
/// New clusters report `provisioning` once and then `running`, unless a
/// status script was queued with [`script_next_cluster`](Self::script_next_cluster).
/// Deleted clusters report `deleting` for a configurable number of reads and
/// then vanish.
pub struct InMemoryGateway {
    inner: Mutex<Inner>,
}

impl Default for InMemoryGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                deletion_polls: 1,
                ..Default::default()
            }),
        }
    }

    /// A factory that hands out this gateway for every token.
    pub fn factory(self: &Arc<Self>) -> impl GatewayFactory {
        let gateway = Arc::clone(self);
        move |_: &AccessToken| -> Result<Arc<dyn ProviderGateway>, GatewayError> {
            Ok(gateway.clone() as Arc<dyn ProviderGateway>)
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panicking test thread must not take the rest of the suite with it.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Statuses the next created cluster reports on successive reads.
    pub fn script_next_cluster(&self, statuses: impl IntoIterator<Item = ClusterStatus>) {
        self.lock().next_statuses = Some(statuses.into_iter().collect());
    }

    /// Replace the remaining status script of an existing cluster.
    pub fn script_cluster(
        &self,
        cluster_id: &str,
        statuses: impl IntoIterator<Item = ClusterStatus>,
    ) {
        if let Some(cluster) = self.lock().clusters.get_mut(cluster_id) {
            cluster.statuses = statuses.into_iter().collect();
        }
    }

    /// Number of `deleting` reads before a deleted cluster disappears.
    pub fn set_deletion_polls(&self, polls: u32) {
        self.lock().deletion_polls = polls;
    }

    /// Make every call to `operation` fail with a provider API error.
    pub fn fail_on(&self, operation: &'static str, status: u16, message: impl Into<String>) {
        self.lock()
            .failures
            .insert(operation, (status, message.into()));
    }

    pub fn clear_failures(&self) {
        self.lock().failures.clear();
    }

    /// Serve `config` for every cluster instead of a generated bundle.
    pub fn set_kube_config(&self, config: KubeConfig) {
        self.lock().kube_config = Some(config);
    }

    /// Fail the next `times` kubeconfig fetches as not yet available.
    pub fn fail_kube_config_times(&self, times: u32) {
        self.lock().kube_config_failures = times;
    }

    /// Seed an existing cluster.
    pub fn insert_cluster(&self, snapshot: ClusterSnapshot, pool: NodePoolSnapshot) {
        let status = snapshot.status;
        self.lock().clusters.insert(
            snapshot.id.clone(),
            Cluster {
                snapshot,
                pool,
                statuses: VecDeque::from([status]),
                deleting: None,
            },
        );
    }

    pub fn cluster(&self, cluster_id: &str) -> Option<ClusterSnapshot> {
        self.lock()
            .clusters
            .get(cluster_id)
            .map(|c| c.snapshot.clone())
    }

    pub fn node_pool(&self, cluster_id: &str) -> Option<NodePoolSnapshot> {
        self.lock().clusters.get(cluster_id).map(|c| c.pool.clone())
    }

    /// Names of the gateway methods called so far, in order.
    pub fn calls(&self) -> Vec<&'static str> {
        self.lock().calls.clone()
    }

    pub fn call_count(&self, operation: &str) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|call| **call == operation)
            .count()
    }

    /// Record the call and apply any injected failure.
    fn enter(
        &self,
        ctx: &OpContext,
        operation: &'static str,
    ) -> Result<MutexGuard<'_, Inner>, GatewayError> {
        ctx.check()?;
        let mut inner = self.lock();
        inner.calls.push(operation);
        debug!(operation, "In-memory gateway call");

        if let Some((status, message)) = inner.failures.get(operation) {
            return Err(GatewayError::Api {
                status: *status,
                id: "injected".to_string(),
                message: message.clone(),
            });
        }
        Ok(inner)
    }
}

fn not_found(resource: String) -> GatewayError {
    GatewayError::NotFound { resource }
}

fn generated_kube_config(cluster_id: &str) -> KubeConfig {
    KubeConfig {
        clusters: vec![NamedCluster {
            name: format!("do-{cluster_id}"),
            cluster: ClusterEntry {
                server: format!("https://{cluster_id}.k8s.ondigitalocean.com"),
                certificate_authority_data: "ZGV2LWNh".to_string(),
            },
        }],
        users: vec![NamedUser {
            name: format!("do-{cluster_id}-admin"),
            user: UserEntry {
                token: format!("dev-token-{cluster_id}"),
            },
        }],
    }
}

#[async_trait]
impl ProviderGateway for InMemoryGateway {
    async fn create_cluster(
        &self,
        ctx: &OpContext,
        cluster: &ClusterState,
        pool: &NodePoolState,
    ) -> Result<CreatedCluster, GatewayError> {
        let mut inner = self.enter(ctx, "create_cluster")?;

        inner.next_id += 1;
        let cluster_id = format!("cluster-{}", inner.next_id);
        let node_pool_id = format!("pool-{}", inner.next_id);

        let statuses = inner
            .next_statuses
            .take()
            .unwrap_or_else(|| vec![ClusterStatus::Provisioning, ClusterStatus::Running]);

        let autoscale = pool.autoscale_enabled();
        let record = Cluster {
            snapshot: ClusterSnapshot {
                id: cluster_id.clone(),
                name: cluster.name.clone(),
                status: statuses.first().copied().unwrap_or(ClusterStatus::Running),
                version: cluster.version_slug.clone(),
                tags: cluster.tags.iter().cloned().collect(),
                auto_upgrade: cluster.auto_upgrade.unwrap_or(false),
                node_pool_ids: vec![node_pool_id.clone()],
            },
            pool: NodePoolSnapshot {
                id: node_pool_id.clone(),
                name: pool.name.clone(),
                size: pool.size.clone(),
                count: pool.count,
                labels: pool.labels.clone(),
                auto_scale: autoscale,
                min_nodes: if autoscale { pool.min_nodes } else { 0 },
                max_nodes: if autoscale { pool.max_nodes } else { 0 },
            },
            statuses: statuses.into(),
            deleting: None,
        };
        inner.clusters.insert(cluster_id.clone(), record);

        info!(cluster_id = %cluster_id, "In-memory cluster created");
        Ok(CreatedCluster {
            cluster_id,
            node_pool_id,
        })
    }

    async fn update_cluster(
        &self,
        ctx: &OpContext,
        cluster_id: &str,
        cluster: &ClusterState,
    ) -> Result<(), GatewayError> {
        let mut inner = self.enter(ctx, "update_cluster")?;
        let record = inner
            .clusters
            .get_mut(cluster_id)
            .ok_or_else(|| not_found(format!("cluster {cluster_id}")))?;

        if !cluster.name.is_empty() {
            record.snapshot.name = cluster.name.clone();
        }
        record.snapshot.tags = cluster.tags.iter().cloned().collect();
        if let Some(auto_upgrade) = cluster.auto_upgrade {
            record.snapshot.auto_upgrade = auto_upgrade;
        }
        Ok(())
    }

    async fn delete_cluster(&self, ctx: &OpContext, cluster_id: &str) -> Result<(), GatewayError> {
        let mut inner = self.enter(ctx, "delete_cluster")?;
        let polls = inner.deletion_polls;
        let record = inner
            .clusters
            .get_mut(cluster_id)
            .ok_or_else(|| not_found(format!("cluster {cluster_id}")))?;

        record.deleting = Some(polls);
        record.snapshot.status = ClusterStatus::Deleting;
        Ok(())
    }

    async fn get_cluster(
        &self,
        ctx: &OpContext,
        cluster_id: &str,
    ) -> Result<ClusterSnapshot, GatewayError> {
        let mut inner = self.enter(ctx, "get_cluster")?;
        let resource = format!("cluster {cluster_id}");

        let record = inner
            .clusters
            .get_mut(cluster_id)
            .ok_or_else(|| not_found(resource.clone()))?;

        let deleting = record.deleting;
        match deleting {
            Some(0) => {
                inner.clusters.remove(cluster_id);
                return Err(not_found(resource));
            }
            Some(left) => {
                record.deleting = Some(left - 1);
            }
            None => {
                if let Some(status) = record.statuses.front() {
                    record.snapshot.status = *status;
                }
                if record.statuses.len() > 1 {
                    record.statuses.pop_front();
                }
            }
        }

        Ok(record.snapshot.clone())
    }

    async fn get_node_pool(
        &self,
        ctx: &OpContext,
        cluster_id: &str,
        pool_id: &str,
    ) -> Result<NodePoolSnapshot, GatewayError> {
        let inner = self.enter(ctx, "get_node_pool")?;
        inner
            .clusters
            .get(cluster_id)
            .map(|c| &c.pool)
            .filter(|pool| pool.id == pool_id)
            .cloned()
            .ok_or_else(|| not_found(format!("node pool {pool_id} of cluster {cluster_id}")))
    }

    async fn update_node_pool(
        &self,
        ctx: &OpContext,
        cluster_id: &str,
        pool_id: &str,
        desired: &NodePoolState,
    ) -> Result<(), GatewayError> {
        let mut inner = self.enter(ctx, "update_node_pool")?;
        let pool = inner
            .clusters
            .get_mut(cluster_id)
            .map(|c| &mut c.pool)
            .filter(|pool| pool.id == pool_id)
            .ok_or_else(|| not_found(format!("node pool {pool_id} of cluster {cluster_id}")))?;

        if !desired.name.is_empty() {
            pool.name = desired.name.clone();
        }
        pool.count = desired.count;
        pool.labels = desired.labels.clone();
        if let Some(auto_scale) = desired.auto_scale {
            pool.auto_scale = auto_scale;
        }
        if desired.autoscale_enabled() {
            pool.min_nodes = desired.min_nodes;
            pool.max_nodes = desired.max_nodes;
        }
        Ok(())
    }

    async fn get_kubernetes_cluster_version(
        &self,
        ctx: &OpContext,
        cluster_id: &str,
    ) -> Result<String, GatewayError> {
        let inner = self.enter(ctx, "get_kubernetes_cluster_version")?;
        inner
            .clusters
            .get(cluster_id)
            .map(|c| c.snapshot.version.clone())
            .ok_or_else(|| not_found(format!("cluster {cluster_id}")))
    }

    async fn upgrade_kubernetes_version(
        &self,
        ctx: &OpContext,
        cluster_id: &str,
        version: &str,
    ) -> Result<(), GatewayError> {
        let mut inner = self.enter(ctx, "upgrade_kubernetes_version")?;
        let record = inner
            .clusters
            .get_mut(cluster_id)
            .ok_or_else(|| not_found(format!("cluster {cluster_id}")))?;

        record.snapshot.version = version.to_string();
        Ok(())
    }

    async fn get_kube_config(
        &self,
        ctx: &OpContext,
        cluster_id: &str,
    ) -> Result<KubeConfig, GatewayError> {
        let mut inner = self.enter(ctx, "get_kube_config")?;

        if !inner.clusters.contains_key(cluster_id) {
            return Err(not_found(format!("kubeconfig of cluster {cluster_id}")));
        }
        if inner.kube_config_failures > 0 {
            inner.kube_config_failures -= 1;
            return Err(not_found(format!("kubeconfig of cluster {cluster_id}")));
        }

        Ok(inner
            .kube_config
            .clone()
            .unwrap_or_else(|| generated_kube_config(cluster_id)))
    }
}

//! Cluster lifecycle orchestration.
//!
//! Every operation is one complete, stateless transition: load or build
//! state, connect a gateway for the call's token, perform the provider calls,
//! and write any changed state back into the returned [`ClusterInfo`].

use std::sync::Arc;
use std::time::Duration;

use doks_reconcile::{OpContext, DEFAULT_POLL_INTERVAL};
use doks_state::{AccessToken, ClusterInfo, DriverOptions, PersistedState, StateBuilder};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};

use crate::error::DriverError;
use crate::flags::{Capabilities, Capability, DriverFlags, K8sCapabilities};
use crate::gateway::{GatewayFactory, ProviderGateway};
use crate::resize::resize;
use crate::wait::{wait_cluster_deleted, wait_cluster_running};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KubernetesVersion {
    pub version: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeCount {
    pub count: i64,
}

/// The managed Kubernetes driver.
pub struct Driver {
    states: Arc<dyn StateBuilder>,
    gateways: Arc<dyn GatewayFactory>,
    poll_interval: Duration,
    capabilities: Capabilities,
}

impl Driver {
    pub fn new(states: Arc<dyn StateBuilder>, gateways: Arc<dyn GatewayFactory>) -> Self {
        let mut capabilities = Capabilities::default();
        capabilities.add(Capability::GetVersion);
        capabilities.add(Capability::SetVersion);
        capabilities.add(Capability::GetClusterSize);
        capabilities.add(Capability::SetClusterSize);

        Self {
            states,
            gateways,
            poll_interval: DEFAULT_POLL_INTERVAL,
            capabilities,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    fn connect(
        &self,
        operation: &'static str,
        token: &AccessToken,
    ) -> Result<Arc<dyn ProviderGateway>, DriverError> {
        if token.is_empty() {
            return Err(DriverError::Configuration(
                "token was not reported".to_string(),
            ));
        }
        self.gateways
            .connect(token)
            .map_err(|e| DriverError::provider(operation, "provider client", e))
    }

    fn load(&self, info: &ClusterInfo) -> Result<PersistedState, DriverError> {
        let state = self.states.load(info)?;
        debug!(
            cluster_id = %state.cluster_id,
            node_pool_id = %state.node_pool_id,
            "Loaded cluster state"
        );
        Ok(state)
    }

    fn persist(
        &self,
        state: &PersistedState,
        info: &ClusterInfo,
    ) -> Result<ClusterInfo, DriverError> {
        let mut updated = info.clone();
        self.states.save(state, &mut updated)?;
        Ok(updated)
    }

    pub fn create_options(&self) -> DriverFlags {
        debug!("Driver.GetDriverCreateOptions called");
        DriverFlags::create()
    }

    pub fn update_options(&self) -> DriverFlags {
        debug!("Driver.GetDriverUpdateOptions called");
        DriverFlags::update()
    }

    pub fn capabilities(&self) -> Capabilities {
        debug!("Driver.GetCapabilities called");
        self.capabilities.clone()
    }

    pub fn k8s_capabilities(&self, _options: &DriverOptions) -> K8sCapabilities {
        debug!("Driver.GetK8sCapabilities called");
        K8sCapabilities::default()
    }

    /// Create a cluster and wait until it is running.
    ///
    /// State is written into `info` as soon as the provider accepts the
    /// cluster and before waiting, so on a wait failure `info` still holds a
    /// resumable reference. If that write fails the call returns
    /// [`DriverError::Orphaned`] without waiting.
    #[instrument(name = "create", skip_all)]
    pub async fn create(
        &self,
        ctx: &OpContext,
        options: &DriverOptions,
        info: &mut ClusterInfo,
    ) -> Result<(), DriverError> {
        debug!("Driver.Create called");
        let (cluster, node_pool) = self.states.build_from_options(options);

        let gateway = self.connect("Create", &cluster.token)?;

        let created = gateway
            .create_cluster(ctx, &cluster, &node_pool)
            .await
            .map_err(|e| DriverError::provider("Create", format!("cluster {}", cluster.name), e))?;

        let state = PersistedState {
            cluster_id: created.cluster_id,
            node_pool_id: created.node_pool_id,
            cluster,
            node_pool,
        };

        if let Err(source) = self.states.save(&state, info) {
            error!(
                cluster_id = %state.cluster_id,
                node_pool_id = %state.node_pool_id,
                error = %source,
                "Cluster created but state could not be saved"
            );
            return Err(DriverError::Orphaned {
                cluster_id: state.cluster_id,
                node_pool_id: state.node_pool_id,
                source,
            });
        }

        info!(cluster_id = %state.cluster_id, "Cluster state saved, waiting for cluster to run");
        wait_cluster_running(ctx, gateway.as_ref(), &state.cluster_id, self.poll_interval).await
    }

    /// Fill in endpoint, CA, service account token, version and node count.
    #[instrument(name = "post_check", skip_all)]
    pub async fn post_check(
        &self,
        ctx: &OpContext,
        info: &ClusterInfo,
    ) -> Result<ClusterInfo, DriverError> {
        debug!("Driver.PostCheck called");
        let state = self.load(info)?;
        let gateway = self.connect("PostCheck", &state.cluster.token)?;
        let cluster_id = state.cluster_id.as_str();

        let kube_config = gateway
            .get_kube_config(ctx, cluster_id)
            .await
            .map_err(|e| DriverError::provider("PostCheck", format!("cluster {cluster_id}"), e))?;

        let mut checked = info.clone();

        let cluster = kube_config
            .first_cluster()
            .ok_or_else(|| DriverError::KubeConfigMissingCluster {
                cluster_id: cluster_id.to_string(),
            })?;
        checked.root_ca_certificate = cluster.certificate_authority_data.clone();
        checked.endpoint = cluster.server.clone();

        let user = kube_config
            .first_user()
            .ok_or_else(|| DriverError::KubeConfigMissingUser {
                cluster_id: cluster_id.to_string(),
            })?;
        checked.service_account_token = user.token.clone();

        let pool = gateway
            .get_node_pool(ctx, cluster_id, &state.node_pool_id)
            .await
            .map_err(|e| {
                DriverError::provider(
                    "PostCheck",
                    format!("node pool {} of cluster {cluster_id}", state.node_pool_id),
                    e,
                )
            })?;

        checked.version = state.cluster.version_slug.clone();
        checked.node_count = i64::from(pool.count);

        info!(cluster_id, endpoint = %checked.endpoint, "Cluster post-check complete");
        Ok(checked)
    }

    /// Apply new tags and auto-upgrade settings.
    ///
    /// Without either, the provider is not contacted. A rotated token is
    /// still written back; otherwise `info` is returned unchanged.
    #[instrument(name = "update", skip_all)]
    pub async fn update(
        &self,
        ctx: &OpContext,
        info: &ClusterInfo,
        options: &DriverOptions,
    ) -> Result<ClusterInfo, DriverError> {
        debug!("Driver.Update called");
        let mut state = self.load(info)?;
        let (desired, _) = self.states.build_from_options(options);

        let rotated = !desired.token.is_empty() && desired.token != state.cluster.token;
        if rotated {
            state.cluster.token = desired.token;
        }

        let mut changed = false;
        if !desired.tags.is_empty() {
            state.cluster.tags = desired.tags;
            changed = true;
        }
        if desired.auto_upgrade.is_some() {
            state.cluster.auto_upgrade = desired.auto_upgrade;
            changed = true;
        }

        if !changed {
            debug!(cluster_id = %state.cluster_id, "No cluster changes requested");
            if rotated {
                info!(cluster_id = %state.cluster_id, "Access token rotated");
                return self.persist(&state, info);
            }
            return Ok(info.clone());
        }

        let gateway = self.connect("Update", &state.cluster.token)?;
        gateway
            .update_cluster(ctx, &state.cluster_id, &state.cluster)
            .await
            .map_err(|e| {
                DriverError::provider("Update", format!("cluster {}", state.cluster_id), e)
            })?;

        self.persist(&state, info)
    }

    /// Delete the cluster and wait until it is gone.
    #[instrument(name = "remove", skip_all)]
    pub async fn remove(&self, ctx: &OpContext, info: &ClusterInfo) -> Result<(), DriverError> {
        debug!("Driver.Remove called");
        let state = self.load(info)?;
        let gateway = self.connect("Remove", &state.cluster.token)?;
        let cluster_id = state.cluster_id.as_str();

        match gateway.delete_cluster(ctx, cluster_id).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                warn!(cluster_id, "Cluster already gone at the provider");
                return Ok(());
            }
            Err(e) => {
                return Err(DriverError::provider(
                    "Remove",
                    format!("cluster {cluster_id}"),
                    e,
                ))
            }
        }

        wait_cluster_deleted(ctx, gateway.as_ref(), cluster_id, self.poll_interval).await
    }

    pub async fn get_version(
        &self,
        ctx: &OpContext,
        info: &ClusterInfo,
    ) -> Result<KubernetesVersion, DriverError> {
        debug!("Driver.GetVersion called");
        let state = self.load(info)?;
        let gateway = self.connect("GetVersion", &state.cluster.token)?;

        let version = gateway
            .get_kubernetes_cluster_version(ctx, &state.cluster_id)
            .await
            .map_err(|e| {
                DriverError::provider("GetVersion", format!("cluster {}", state.cluster_id), e)
            })?;

        Ok(KubernetesVersion { version })
    }

    /// Request an upgrade and record the new version slug.
    pub async fn set_version(
        &self,
        ctx: &OpContext,
        info: &ClusterInfo,
        version: &KubernetesVersion,
    ) -> Result<ClusterInfo, DriverError> {
        debug!(version = %version.version, "Driver.SetVersion called");
        if version.version.trim().is_empty() {
            return Err(DriverError::Configuration(
                "version must not be empty".to_string(),
            ));
        }

        let mut state = self.load(info)?;
        let gateway = self.connect("SetVersion", &state.cluster.token)?;

        gateway
            .upgrade_kubernetes_version(ctx, &state.cluster_id, &version.version)
            .await
            .map_err(|e| {
                DriverError::provider("SetVersion", format!("cluster {}", state.cluster_id), e)
            })?;

        state.cluster.version_slug = version.version.clone();
        let mut updated = self.persist(&state, info)?;
        updated.version = version.version.clone();
        Ok(updated)
    }

    pub async fn get_cluster_size(
        &self,
        ctx: &OpContext,
        info: &ClusterInfo,
    ) -> Result<NodeCount, DriverError> {
        debug!("Driver.GetClusterSize called");
        let state = self.load(info)?;
        let gateway = self.connect("GetClusterSize", &state.cluster.token)?;

        let pool = gateway
            .get_node_pool(ctx, &state.cluster_id, &state.node_pool_id)
            .await
            .map_err(|e| {
                DriverError::provider(
                    "GetClusterSize",
                    format!("node pool {} of cluster {}", state.node_pool_id, state.cluster_id),
                    e,
                )
            })?;

        Ok(NodeCount {
            count: i64::from(pool.count),
        })
    }

    /// Resize the node pool against a freshly fetched live shape.
    #[instrument(name = "set_cluster_size", skip_all, fields(count = count.count))]
    pub async fn set_cluster_size(
        &self,
        ctx: &OpContext,
        info: &ClusterInfo,
        count: &NodeCount,
    ) -> Result<ClusterInfo, DriverError> {
        debug!("Driver.SetClusterSize called");
        let requested = u32::try_from(count.count).map_err(|_| {
            DriverError::Configuration(format!("invalid node count {}", count.count))
        })?;

        let mut state = self.load(info)?;
        let gateway = self.connect("SetClusterSize", &state.cluster.token)?;
        let resource = format!(
            "node pool {} of cluster {}",
            state.node_pool_id, state.cluster_id
        );

        let live = gateway
            .get_node_pool(ctx, &state.cluster_id, &state.node_pool_id)
            .await
            .map_err(|e| DriverError::provider("SetClusterSize", resource.clone(), e))?;

        let desired = resize(&live, requested);
        debug!(
            from = live.count,
            to = desired.count,
            min = desired.min_nodes,
            max = desired.max_nodes,
            "Resizing node pool"
        );

        gateway
            .update_node_pool(ctx, &state.cluster_id, &state.node_pool_id, &desired)
            .await
            .map_err(|e| DriverError::provider("SetClusterSize", resource, e))?;

        state.node_pool = desired;
        let mut updated = self.persist(&state, info)?;
        updated.node_count = count.count;
        Ok(updated)
    }

    /// Nothing to clean up for this provider.
    pub async fn remove_legacy_service_account(
        &self,
        _ctx: &OpContext,
        _info: &ClusterInfo,
    ) -> Result<(), DriverError> {
        debug!("Driver.RemoveLegacyServiceAccount called");
        Ok(())
    }

    pub async fn etcd_save(
        &self,
        _ctx: &OpContext,
        _info: &ClusterInfo,
        _options: &DriverOptions,
        _snapshot_name: &str,
    ) -> Result<(), DriverError> {
        Err(DriverError::NotImplemented("etcd backup"))
    }

    pub async fn etcd_restore(
        &self,
        _ctx: &OpContext,
        _info: &ClusterInfo,
        _options: &DriverOptions,
        _snapshot_name: &str,
    ) -> Result<ClusterInfo, DriverError> {
        Err(DriverError::NotImplemented("etcd backup"))
    }

    pub async fn etcd_remove_snapshot(
        &self,
        _ctx: &OpContext,
        _info: &ClusterInfo,
        _options: &DriverOptions,
        _snapshot_name: &str,
    ) -> Result<(), DriverError> {
        Err(DriverError::NotImplemented("etcd backup"))
    }
}

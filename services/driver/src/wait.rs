//! Waits on cluster provisioning and deletion.

use std::time::Duration;

use doks_reconcile::{wait_for, OpContext, Probe};
use tracing::info;

use crate::error::DriverError;
use crate::gateway::{ClusterStatus, ProviderGateway};

/// Block until the cluster reports `running`.
///
/// A cluster that disappears while provisioning is a provider error here.
pub async fn wait_cluster_running(
    ctx: &OpContext,
    gateway: &dyn ProviderGateway,
    cluster_id: &str,
    interval: Duration,
) -> Result<(), DriverError> {
    let resource = format!("cluster {cluster_id}");

    wait_for(
        ctx,
        &resource,
        interval,
        move || async move {
            gateway
                .get_cluster(ctx, cluster_id)
                .await
                .map(|cluster| Probe::Status(cluster.status))
        },
        |status: &ClusterStatus| *status == ClusterStatus::Running,
        |status: &ClusterStatus| *status == ClusterStatus::Error,
    )
    .await
    .map_err(|err| DriverError::from_wait("Create", err))?;

    info!(cluster_id, "Cluster is running");
    Ok(())
}

/// Block until the cluster reports `deleted` or can no longer be found.
pub async fn wait_cluster_deleted(
    ctx: &OpContext,
    gateway: &dyn ProviderGateway,
    cluster_id: &str,
    interval: Duration,
) -> Result<(), DriverError> {
    let resource = format!("cluster {cluster_id}");

    wait_for(
        ctx,
        &resource,
        interval,
        move || async move {
            match gateway.get_cluster(ctx, cluster_id).await {
                Ok(cluster) => Ok(Probe::Status(cluster.status)),
                Err(err) if err.is_not_found() => Ok(Probe::Gone),
                Err(err) => Err(err),
            }
        },
        |status: &ClusterStatus| *status == ClusterStatus::Deleted,
        |status: &ClusterStatus| *status == ClusterStatus::Error,
    )
    .await
    .map_err(|err| DriverError::from_wait("Remove", err))?;

    info!(cluster_id, "Cluster is deleted");
    Ok(())
}

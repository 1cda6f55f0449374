//! Driver endpoints.
//!
//! One route per driver operation under `/v1/driver`. Requests carry the
//! host's `cluster_info` and/or `options` plus an optional
//! `timeout_seconds`.

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use doks_state::{ClusterInfo, DriverOptions, STATE_KEY};
use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;
use crate::driver::{KubernetesVersion, NodeCount};
use crate::flags::{Capabilities, DriverFlags, K8sCapabilities};
use crate::state::AppState;

/// /v1/driver
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/create-options", get(create_options))
        .route("/update-options", get(update_options))
        .route("/capabilities", get(capabilities))
        .route("/create", post(create))
        .route("/post-check", post(post_check))
        .route("/update", post(update))
        .route("/remove", post(remove))
        .route("/version/get", post(get_version))
        .route("/version/set", post(set_version))
        .route("/size/get", post(get_cluster_size))
        .route("/size/set", post(set_cluster_size))
        .route("/k8s-capabilities", post(k8s_capabilities))
        .route(
            "/remove-legacy-service-account",
            post(remove_legacy_service_account),
        )
        .route("/etcd/save", post(etcd_save))
        .route("/etcd/restore", post(etcd_restore))
        .route("/etcd/remove-snapshot", post(etcd_remove_snapshot))
}

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize, Serialize)]
pub struct CreateRequest {
    #[serde(default)]
    pub options: DriverOptions,
    #[serde(default)]
    pub cluster_info: ClusterInfo,
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ClusterRequest {
    pub cluster_info: ClusterInfo,
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct UpdateRequest {
    pub cluster_info: ClusterInfo,
    #[serde(default)]
    pub options: DriverOptions,
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct SetVersionRequest {
    pub cluster_info: ClusterInfo,
    pub version: KubernetesVersion,
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct SetSizeRequest {
    pub cluster_info: ClusterInfo,
    pub node_count: NodeCount,
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct OptionsRequest {
    #[serde(default)]
    pub options: DriverOptions,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct EtcdRequest {
    pub cluster_info: ClusterInfo,
    #[serde(default)]
    pub options: DriverOptions,
    pub snapshot_name: String,
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(Deserialize))]
pub struct OkResponse {
    pub ok: bool,
}

// =============================================================================
// Handlers
// =============================================================================

async fn create_options(State(state): State<AppState>) -> Json<DriverFlags> {
    Json(state.driver().create_options())
}

async fn update_options(State(state): State<AppState>) -> Json<DriverFlags> {
    Json(state.driver().update_options())
}

async fn capabilities(State(state): State<AppState>) -> Json<Capabilities> {
    Json(state.driver().capabilities())
}

async fn k8s_capabilities(
    State(state): State<AppState>,
    Json(req): Json<OptionsRequest>,
) -> Json<K8sCapabilities> {
    Json(state.driver().k8s_capabilities(&req.options))
}

/// On failure after state was saved, the problem document carries the
/// saved `ClusterInfo` so the host can still remove the cluster later.
async fn create(
    State(state): State<AppState>,
    Json(req): Json<CreateRequest>,
) -> Result<Json<ClusterInfo>, ApiError> {
    let ctx = state.op_context(req.timeout_seconds);
    let mut info = req.cluster_info;
    let before = info.metadata.get(STATE_KEY).cloned();

    match state.driver().create(&ctx, &req.options, &mut info).await {
        Ok(()) => Ok(Json(info)),
        Err(err) => {
            let saved = info.metadata.get(STATE_KEY) != before.as_ref();
            let api = ApiError::from(err);
            Err(if saved { api.with_info(info) } else { api })
        }
    }
}

async fn post_check(
    State(state): State<AppState>,
    Json(req): Json<ClusterRequest>,
) -> Result<Json<ClusterInfo>, ApiError> {
    let ctx = state.op_context(req.timeout_seconds);
    let info = state.driver().post_check(&ctx, &req.cluster_info).await?;
    Ok(Json(info))
}

async fn update(
    State(state): State<AppState>,
    Json(req): Json<UpdateRequest>,
) -> Result<Json<ClusterInfo>, ApiError> {
    let ctx = state.op_context(req.timeout_seconds);
    let info = state
        .driver()
        .update(&ctx, &req.cluster_info, &req.options)
        .await?;
    Ok(Json(info))
}

async fn remove(
    State(state): State<AppState>,
    Json(req): Json<ClusterRequest>,
) -> Result<Json<OkResponse>, ApiError> {
    let ctx = state.op_context(req.timeout_seconds);
    state.driver().remove(&ctx, &req.cluster_info).await?;
    Ok(Json(OkResponse { ok: true }))
}

async fn get_version(
    State(state): State<AppState>,
    Json(req): Json<ClusterRequest>,
) -> Result<Json<KubernetesVersion>, ApiError> {
    let ctx = state.op_context(req.timeout_seconds);
    let version = state.driver().get_version(&ctx, &req.cluster_info).await?;
    Ok(Json(version))
}

async fn set_version(
    State(state): State<AppState>,
    Json(req): Json<SetVersionRequest>,
) -> Result<Json<ClusterInfo>, ApiError> {
    let ctx = state.op_context(req.timeout_seconds);
    let info = state
        .driver()
        .set_version(&ctx, &req.cluster_info, &req.version)
        .await?;
    Ok(Json(info))
}

async fn get_cluster_size(
    State(state): State<AppState>,
    Json(req): Json<ClusterRequest>,
) -> Result<Json<NodeCount>, ApiError> {
    let ctx = state.op_context(req.timeout_seconds);
    let count = state
        .driver()
        .get_cluster_size(&ctx, &req.cluster_info)
        .await?;
    Ok(Json(count))
}

async fn set_cluster_size(
    State(state): State<AppState>,
    Json(req): Json<SetSizeRequest>,
) -> Result<Json<ClusterInfo>, ApiError> {
    let ctx = state.op_context(req.timeout_seconds);
    let info = state
        .driver()
        .set_cluster_size(&ctx, &req.cluster_info, &req.node_count)
        .await?;
    Ok(Json(info))
}

async fn remove_legacy_service_account(
    State(state): State<AppState>,
    Json(req): Json<ClusterRequest>,
) -> Result<Json<OkResponse>, ApiError> {
    let ctx = state.op_context(req.timeout_seconds);
    state
        .driver()
        .remove_legacy_service_account(&ctx, &req.cluster_info)
        .await?;
    Ok(Json(OkResponse { ok: true }))
}

async fn etcd_save(
    State(state): State<AppState>,
    Json(req): Json<EtcdRequest>,
) -> Result<Json<OkResponse>, ApiError> {
    let ctx = state.op_context(req.timeout_seconds);
    state
        .driver()
        .etcd_save(&ctx, &req.cluster_info, &req.options, &req.snapshot_name)
        .await?;
    Ok(Json(OkResponse { ok: true }))
}

async fn etcd_restore(
    State(state): State<AppState>,
    Json(req): Json<EtcdRequest>,
) -> Result<Json<ClusterInfo>, ApiError> {
    let ctx = state.op_context(req.timeout_seconds);
    let info = state
        .driver()
        .etcd_restore(&ctx, &req.cluster_info, &req.options, &req.snapshot_name)
        .await?;
    Ok(Json(info))
}

async fn etcd_remove_snapshot(
    State(state): State<AppState>,
    Json(req): Json<EtcdRequest>,
) -> Result<Json<OkResponse>, ApiError> {
    let ctx = state.op_context(req.timeout_seconds);
    state
        .driver()
        .etcd_remove_snapshot(&ctx, &req.cluster_info, &req.options, &req.snapshot_name)
        .await?;
    Ok(Json(OkResponse { ok: true }))
}

use axum::{
    http::{header::CONTENT_TYPE, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use doks_state::ClusterInfo;
use serde::Serialize;
use tracing::warn;

use crate::error::DriverError;

#[derive(Debug, Serialize)]
pub struct ProblemDetails {
    #[serde(rename = "type")]
    pub r#type: String,
    pub title: String,
    pub status: u16,
    pub detail: String,
    pub code: String,
    pub retryable: bool,
    /// Persisted state to keep when an operation failed after saving it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<ClusterInfo>,
}

impl ProblemDetails {
    fn new(status: StatusCode, code: impl Into<String>, detail: impl Into<String>) -> Self {
        let code = code.into();
        let title = status
            .canonical_reason()
            .unwrap_or("Unknown Error")
            .to_string();
        Self {
            r#type: format!("urn:doks-driver:problem:{code}"),
            title,
            status: status.as_u16(),
            detail: detail.into(),
            code,
            retryable: false,
            info: None,
        }
    }
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub problem: Box<ProblemDetails>,
}

impl ApiError {
    fn new(status: StatusCode, code: impl Into<String>, detail: impl Into<String>) -> Self {
        let problem = Box::new(ProblemDetails::new(status, code, detail));
        Self { status, problem }
    }

    pub fn bad_request(code: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, code, detail)
    }

    pub fn not_implemented(code: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_IMPLEMENTED, code, detail)
    }

    pub fn gateway_timeout(code: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(StatusCode::GATEWAY_TIMEOUT, code, detail)
    }

    pub fn bad_gateway(code: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, code, detail)
    }

    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.problem.retryable = retryable;
        self
    }

    pub fn with_info(mut self, info: ClusterInfo) -> Self {
        self.problem.info = Some(info);
        self
    }
}

impl From<DriverError> for ApiError {
    fn from(err: DriverError) -> Self {
        let code = err.code();
        let retryable = err.is_retryable();
        warn!(code, error = %err, "Driver operation failed");

        let detail = err.to_string();
        let api = match err {
            DriverError::Configuration(_) | DriverError::State(_) => {
                ApiError::bad_request(code, detail)
            }
            DriverError::NotImplemented(_) => ApiError::not_implemented(code, detail),
            DriverError::Interrupted { .. } => ApiError::gateway_timeout(code, detail),
            DriverError::Provider { .. }
            | DriverError::TerminalFailure { .. }
            | DriverError::Orphaned { .. }
            | DriverError::KubeConfigMissingCluster { .. }
            | DriverError::KubeConfigMissingUser { .. } => ApiError::bad_gateway(code, detail),
        };
        api.with_retryable(retryable)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut response = (self.status, Json(self.problem)).into_response();
        response.headers_mut().insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/problem+json"),
        );
        response
    }
}

//! HTTP handlers for the REST API.
//!
//! Engine calls are synchronous, so every handler that executes against the
//! store runs it on the blocking pool.

use super::types::*;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use ledgerflow_appmanager::{AppManager, AppManagerError, StateVersion};
use ledgerflow_core::{Message, Transaction};
use ledgerflow_stf::{CancelToken, StfError, TxError, TxResult};
use ledgerflow_storage::StoreError;
use std::sync::Arc;

/// Shared state of every handler.
pub struct RestState<T: Transaction> {
    pub app: Arc<AppManager<T>>,
}

impl<T: Transaction> Clone for RestState<T> {
    fn clone(&self) -> Self {
        Self {
            app: Arc::clone(&self.app),
        }
    }
}

/// Error body plus the status it is served with.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<AppManagerError> for ApiError {
    fn from(err: AppManagerError) -> Self {
        let status = match &err {
            AppManagerError::Stf(StfError::Execution(TxError::NotFound(_)))
            | AppManagerError::Store(StoreError::VersionNotFound(_)) => StatusCode::NOT_FOUND,
            AppManagerError::Stf(StfError::Execution(_)) | AppManagerError::HeightMismatch { .. } => {
                StatusCode::BAD_REQUEST
            }
            AppManagerError::Stf(StfError::Cancelled) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %err, "Request failed");
        }
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
            }),
        )
            .into_response()
    }
}

async fn run_blocking<R, F>(f: F) -> Result<R, ApiError>
where
    F: FnOnce() -> ledgerflow_appmanager::Result<R> + Send + 'static,
    R: Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => result.map_err(ApiError::from),
        Err(e) => Err(ApiError::internal(format!("engine task failed: {}", e))),
    }
}

fn decode_hex(field: &str, value: &str) -> Result<Vec<u8>, ApiError> {
    hex::decode(value).map_err(|e| ApiError::bad_request(format!("invalid hex in {}: {}", field, e)))
}

// =============================================================================
// Handlers
// =============================================================================

/// Handler for `GET /status`.
pub async fn status_handler<T: Transaction>(State(state): State<RestState<T>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        latest_version: state.app.latest_version(),
        oldest_version: state.app.oldest_version(),
        root_hash: state.app.latest_root().to_string(),
    })
}

/// Handler for `POST /query`.
pub async fn query_handler<T: Transaction>(
    State(state): State<RestState<T>>,
    Json(req): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, ApiError> {
    let request = Message::new(req.type_url, decode_hex("value", &req.value)?);
    let version = StateVersion::from(req.height);
    let gas_limit = req.gas_limit;

    let app = state.app;
    let response =
        run_blocking(move || app.query(version, gas_limit, &request, &CancelToken::new())).await?;
    Ok(Json(QueryResponse {
        type_url: response.type_url,
        value: hex::encode(response.value),
    }))
}

/// Handler for `POST /validate`.
pub async fn validate_handler<T: Transaction>(
    State(state): State<RestState<T>>,
    Json(req): Json<TxRequest>,
) -> Result<Json<TxResult>, ApiError> {
    let bytes = decode_hex("tx", &req.tx)?;
    let version = StateVersion::from(req.height);
    let gas_limit = req.gas_limit;

    let app = state.app;
    let result = run_blocking(move || {
        app.validate_tx_bytes(version, gas_limit, &bytes, &CancelToken::new())
    })
    .await?;
    Ok(Json(result))
}

/// Handler for `POST /simulate`.
pub async fn simulate_handler<T: Transaction>(
    State(state): State<RestState<T>>,
    Json(req): Json<TxRequest>,
) -> Result<Json<SimulateResponse>, ApiError> {
    let bytes = decode_hex("tx", &req.tx)?;
    let version = StateVersion::from(req.height);
    let gas_limit = req.gas_limit;

    let app = state.app;
    let (result, changes) = run_blocking(move || {
        app.simulate_bytes(version, gas_limit, &bytes, &CancelToken::new())
    })
    .await?;
    Ok(Json(SimulateResponse {
        result,
        writes: changes.len(),
    }))
}

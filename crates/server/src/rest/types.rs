//! Request and response bodies of the REST API.

use ledgerflow_stf::TxResult;
use serde::{Deserialize, Serialize};

/// `POST /query`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub type_url: String,
    /// Hex-encoded message value.
    pub value: String,
    /// Committed version to read; latest when absent.
    #[serde(default)]
    pub height: Option<u64>,
    #[serde(default)]
    pub gas_limit: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub type_url: String,
    pub value: String,
}

/// `POST /validate` and `POST /simulate`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxRequest {
    /// Hex-encoded transaction bytes.
    pub tx: String,
    #[serde(default)]
    pub height: Option<u64>,
    #[serde(default)]
    pub gas_limit: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulateResponse {
    pub result: TxResult,
    /// Number of keys the transaction would write or delete.
    pub writes: usize,
}

/// `GET /status`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub latest_version: u64,
    pub oldest_version: u64,
    pub root_hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

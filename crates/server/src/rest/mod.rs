//! REST front-end.
//!
//! | Route | Body | Answer |
//! |---|---|---|
//! | `GET /status` | | latest and oldest version, root hash |
//! | `POST /query` | `type_url`, hex `value` | hex response message |
//! | `POST /validate` | hex `tx` | `TxResult` |
//! | `POST /simulate` | hex `tx` | `TxResult` and write count |
//!
//! `height` and `gas_limit` are optional on every `POST`.

pub mod handlers;
pub mod routes;
pub mod server;
pub mod types;

pub use routes::create_router;
pub use server::{RestConfig, RestServer, SERVER_NAME};

//! Route table of the REST API.

use super::handlers::*;
use axum::{
    routing::{get, post},
    Router,
};
use ledgerflow_appmanager::AppManager;
use ledgerflow_core::Transaction;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

/// Create the router serving `app`.
pub fn create_router<T: Transaction>(app: Arc<AppManager<T>>) -> Router {
    Router::new()
        .route("/status", get(status_handler::<T>))
        .route("/query", post(query_handler::<T>))
        .route("/validate", post(validate_handler::<T>))
        .route("/simulate", post(simulate_handler::<T>))
        .layer(CorsLayer::permissive())
        .with_state(RestState { app })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rest::types::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::response::Response;
    use ledgerflow_appmanager::AppManagerConfig;
    use ledgerflow_core::{BincodeCodec, HeaderInfo, Keypair, Message, SignedTx, TypedMessage};
    use ledgerflow_modules::auth::QueryAccount;
    use ledgerflow_modules::bank::{self, QueryBalanceResponse};
    use ledgerflow_modules::{build_stf, GenesisState, QueryBalance};
    use ledgerflow_stf::{CancelToken, StfConfig, TxResult};
    use ledgerflow_storage::{StoreConfig, VersionedStore};
    use serde::de::DeserializeOwned;
    use serde_json::json;
    use tower::ServiceExt;

    fn test_app(alice: &Keypair) -> Arc<AppManager<SignedTx>> {
        let store = Arc::new(VersionedStore::in_memory(StoreConfig::default()));
        let stf = build_stf(StfConfig::default()).unwrap();
        let app = AppManager::new(AppManagerConfig::default(), store, stf, BincodeCodec);

        let genesis = GenesisState::new("rest-test").with_account(alice.address(), 500);
        let (_, writer) = app
            .init_genesis(HeaderInfo::at_height("rest-test", 1), Vec::new(), &CancelToken::new(), |ctx| {
                genesis.apply(ctx)
            })
            .unwrap();
        app.commit(writer).unwrap();
        Arc::new(app)
    }

    async fn post_json(router: Router, uri: &str, body: serde_json::Value) -> Response {
        router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap()
    }

    async fn read_json<R: DeserializeOwned>(response: Response) -> R {
        let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    fn query_body<M: TypedMessage>(msg: &M) -> serde_json::Value {
        let packed = Message::pack(msg);
        json!({ "type_url": packed.type_url, "value": hex::encode(packed.value) })
    }

    #[tokio::test]
    async fn test_status() {
        let app = test_app(&Keypair::from_seed(1));
        let root = app.latest_root().to_string();
        let response = create_router(app)
            .oneshot(Request::builder().uri("/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let status: StatusResponse = read_json(response).await;
        assert_eq!(status.latest_version, 1);
        assert_eq!(status.root_hash, root);
    }

    #[tokio::test]
    async fn test_query_balance() {
        let alice = Keypair::from_seed(1);
        let router = create_router(test_app(&alice));
        let response = post_json(
            router,
            "/query",
            query_body(&QueryBalance {
                address: alice.address(),
            }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let body: QueryResponse = read_json(response).await;
        let message = Message::new(body.type_url, hex::decode(body.value).unwrap());
        let balance: QueryBalanceResponse = message.unpack().unwrap();
        assert_eq!(balance.balance, 500);
    }

    #[tokio::test]
    async fn test_query_errors() {
        let alice = Keypair::from_seed(1);
        let router = create_router(test_app(&alice));

        let unseen = query_body(&QueryAccount {
            address: Keypair::from_seed(2).address(),
        });
        let response = post_json(router.clone(), "/query", unseen).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let unknown = json!({ "type_url": "/nope.Query", "value": "" });
        let response = post_json(router.clone(), "/query", unknown).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let error: ErrorResponse = read_json(response).await;
        assert!(error.error.contains("/nope.Query"));

        let bad_hex = json!({ "type_url": "/nope.Query", "value": "zz" });
        let response = post_json(router.clone(), "/query", bad_hex).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let mut pruned = query_body(&QueryBalance {
            address: alice.address(),
        });
        pruned["height"] = json!(40);
        let response = post_json(router, "/query", pruned).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_validate_and_simulate() {
        let alice = Keypair::from_seed(1);
        let app = test_app(&alice);
        let router = create_router(Arc::clone(&app));
        let tx = bank::transfer_tx(&alice, 0, Keypair::from_seed(2).address(), 10, 200_000);
        let body = json!({ "tx": hex::encode(tx.encode()) });

        let response = post_json(router.clone(), "/validate", body.clone()).await;
        assert_eq!(response.status(), StatusCode::OK);
        let result: TxResult = read_json(response).await;
        assert!(result.is_ok());

        let response = post_json(router.clone(), "/simulate", body).await;
        assert_eq!(response.status(), StatusCode::OK);
        let simulated: SimulateResponse = read_json(response).await;
        assert!(simulated.result.is_ok());
        assert!(simulated.writes > 0);
        assert_eq!(app.latest_version(), 1);

        let garbage = json!({ "tx": "00ff" });
        let response = post_json(router, "/validate", garbage).await;
        assert_eq!(response.status(), StatusCode::OK);
        let result: TxResult = read_json(response).await;
        assert_eq!(result.code(), Some(("decode", 1)));
    }
}

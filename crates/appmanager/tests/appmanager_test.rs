use ledgerflow_appmanager::{AppManager, AppManagerConfig, AppManagerError, StateVersion};
use ledgerflow_core::{Address, BincodeCodec, BlockRequest, HeaderInfo, Keypair, Message, SignedTx, Transaction};
use ledgerflow_modules::bank::{self, QueryBalanceResponse};
use ledgerflow_modules::{build_stf, sim_accounts, GenesisState, QueryBalance, TransferGenerator};
use ledgerflow_stf::{CancelToken, StfConfig, StfError, DECODE_CODESPACE};
use ledgerflow_storage::{StoreConfig, StoreError, VersionedStore};
use std::sync::Arc;

const CHAIN: &str = "appmanager-test";

fn app_on(store: Arc<VersionedStore>, config: AppManagerConfig) -> AppManager<SignedTx> {
    let stf = build_stf(StfConfig::default()).unwrap();
    AppManager::new(config, store, stf, BincodeCodec)
}

fn genesis(accounts: &[(&Keypair, u64)]) -> GenesisState {
    accounts
        .iter()
        .fold(GenesisState::new(CHAIN), |g, (k, balance)| g.with_account(k.address(), *balance))
}

/// App with a committed genesis giving `alice` 1000 and `bob` 10.
fn funded_app(config: AppManagerConfig) -> (AppManager<SignedTx>, Keypair, Keypair) {
    let (alice, bob) = (Keypair::from_seed(10), Keypair::from_seed(11));
    let app = app_on(Arc::new(VersionedStore::in_memory(StoreConfig::default())), config);
    let state = genesis(&[(&alice, 1_000), (&bob, 10)]);
    let (_, writer) = app
        .init_genesis(HeaderInfo::at_height(CHAIN, 1), Vec::new(), &CancelToken::new(), |ctx| {
            state.apply(ctx)
        })
        .unwrap();
    app.commit(writer).unwrap();
    (app, alice, bob)
}

fn balance(app: &AppManager<SignedTx>, version: StateVersion, address: Address) -> u64 {
    app.query(version, 0, &Message::pack(&QueryBalance { address }), &CancelToken::new())
        .unwrap()
        .unpack::<QueryBalanceResponse>()
        .unwrap()
        .balance
}

fn next_block(app: &AppManager<SignedTx>, txs: Vec<SignedTx>) -> BlockRequest<SignedTx> {
    BlockRequest::new(HeaderInfo::at_height(CHAIN, app.latest_version() + 1), txs)
}

#[test]
fn test_genesis_commits_version_one() {
    let (app, alice, bob) = funded_app(AppManagerConfig::default());
    assert_eq!(app.latest_version(), 1);
    assert_eq!(balance(&app, StateVersion::Latest, alice.address()), 1_000);
    assert_eq!(balance(&app, StateVersion::Latest, bob.address()), 10);
}

#[test]
fn test_genesis_txs_run_after_initializer() {
    let alice = Keypair::from_seed(20);
    let carol = Address::from_label("carol");
    let app = app_on(
        Arc::new(VersionedStore::in_memory(StoreConfig::default())),
        AppManagerConfig::default(),
    );
    let state = genesis(&[(&alice, 100)]);
    let txs = vec![bank::transfer_tx(&alice, 0, carol, 40, 200_000)];

    let (response, writer) = app
        .init_genesis(HeaderInfo::at_height(CHAIN, 1), txs, &CancelToken::new(), |ctx| state.apply(ctx))
        .unwrap();
    assert!(response.tx_results[0].is_ok());
    app.commit(writer).unwrap();
    assert_eq!(balance(&app, StateVersion::Latest, carol), 40);
}

#[test]
fn test_genesis_only_once() {
    let (app, _, _) = funded_app(AppManagerConfig::default());
    let err = app
        .init_genesis(HeaderInfo::at_height(CHAIN, 2), Vec::new(), &CancelToken::new(), |_| Ok(()))
        .unwrap_err();
    assert!(matches!(err, AppManagerError::AlreadyInitialized(1)));
}

#[test]
fn test_height_must_follow_latest() {
    let (app, _, _) = funded_app(AppManagerConfig::default());
    let block = BlockRequest::new(HeaderInfo::at_height(CHAIN, 5), Vec::new());
    let err = app.deliver_block(&block, &CancelToken::new()).unwrap_err();
    assert!(matches!(
        err,
        AppManagerError::HeightMismatch { expected: 2, got: 5 }
    ));
}

#[test]
fn test_block_runs_on_its_parent_version() {
    let (app, alice, bob) = funded_app(AppManagerConfig::default());
    let block = next_block(&app, vec![bank::transfer_tx(&alice, 0, bob.address(), 5, 200_000)]);
    let (response, writer) = app.deliver_block(&block, &CancelToken::new()).unwrap();
    assert_eq!(writer.base_version() + 1, block.height());
    assert_eq!(response.txs_hash, block.txs_hash());

    // once the block is committed, the same header no longer fits
    app.commit(writer).unwrap();
    let err = app.deliver_block(&block, &CancelToken::new()).unwrap_err();
    assert!(matches!(
        err,
        AppManagerError::HeightMismatch { expected: 3, got: 2 }
    ));
    let err = app
        .deliver_sims(&block, &CancelToken::new(), |_| Ok(None))
        .unwrap_err();
    assert!(matches!(err, AppManagerError::HeightMismatch { .. }));
}

#[test]
fn test_deliver_block_bytes_keeps_positions() {
    let (app, alice, bob) = funded_app(AppManagerConfig::default());
    let raw = vec![
        bank::transfer_tx(&alice, 0, bob.address(), 100, 200_000).encode(),
        vec![0xde, 0xad, 0xbe, 0xef],
        bank::transfer_tx(&alice, 1, bob.address(), 1, 200_000).encode(),
    ];

    let header = HeaderInfo::at_height(CHAIN, 2);
    let (response, writer) = app
        .deliver_block_bytes(header, &raw, &CancelToken::new())
        .unwrap();
    app.commit(writer).unwrap();

    assert_eq!(response.tx_results.len(), 3);
    assert!(response.tx_results[0].is_ok());
    assert_eq!(response.tx_results[1].code(), Some((DECODE_CODESPACE, 1)));
    assert_eq!(response.tx_results[1].gas_used, 0);
    assert!(response.tx_results[2].is_ok());
    assert_eq!(balance(&app, StateVersion::Latest, bob.address()), 111);
}

#[test]
fn test_validate_does_not_touch_state() {
    let (app, alice, bob) = funded_app(AppManagerConfig::default());
    let tx = bank::transfer_tx(&alice, 0, bob.address(), 5, 200_000);
    let cancel = CancelToken::new();

    let first = app.validate_tx(StateVersion::Latest, 0, &tx, &cancel).unwrap();
    let second = app
        .validate_tx_bytes(StateVersion::Latest, 0, &tx.encode(), &cancel)
        .unwrap();
    assert!(first.is_ok());
    assert_eq!(first, second);
    assert_eq!(app.latest_version(), 1);
    assert_eq!(balance(&app, StateVersion::Latest, bob.address()), 10);

    let stale = bank::transfer_tx(&alice, 3, bob.address(), 5, 200_000);
    let result = app.validate_tx(StateVersion::Latest, 0, &stale, &cancel).unwrap();
    assert_eq!(result.code(), Some(("auth", 2)));

    let garbage = app
        .validate_tx_bytes(StateVersion::Latest, 0, b"nope", &cancel)
        .unwrap();
    assert_eq!(garbage.code(), Some((DECODE_CODESPACE, 1)));
}

#[test]
fn test_validate_gas_cap() {
    let config = AppManagerConfig {
        validate_tx_gas_limit: 1_000,
        ..AppManagerConfig::default()
    };
    let (app, alice, bob) = funded_app(config);
    let tx = bank::transfer_tx(&alice, 0, bob.address(), 5, 200_000);
    let result = app
        .validate_tx(StateVersion::Latest, 0, &tx, &CancelToken::new())
        .unwrap();
    assert_eq!(result.code(), Some(("stf", 3)));
    assert_eq!(result.gas_used, 1_000);

    // no declared gas means no gas, even under a cap
    let unfunded = bank::transfer_tx(&alice, 0, bob.address(), 5, 0);
    let result = app
        .validate_tx(StateVersion::Latest, 0, &unfunded, &CancelToken::new())
        .unwrap();
    assert_eq!(result.code(), Some(("stf", 3)));
    assert_eq!(result.gas_used, 0);
}

#[test]
fn test_simulate_previews_changes() {
    let (app, alice, bob) = funded_app(AppManagerConfig::default());
    let tx = bank::transfer_tx(&alice, 0, bob.address(), 5, 200_000);

    let (result, changes) = app
        .simulate(StateVersion::Latest, 0, &tx, &CancelToken::new())
        .unwrap();
    assert!(result.is_ok());
    assert!(result.gas_used > 0);
    assert!(changes.partitions().any(|(name, _)| name == bank::PARTITION));
    assert_eq!(app.latest_version(), 1);
    assert_eq!(balance(&app, StateVersion::Latest, bob.address()), 10);

    let (garbage, empty) = app
        .simulate_bytes(StateVersion::Latest, 0, &[1, 2, 3], &CancelToken::new())
        .unwrap();
    assert_eq!(garbage.code(), Some((DECODE_CODESPACE, 1)));
    assert!(empty.is_empty());
}

#[test]
fn test_query_historical_versions() {
    let (app, alice, bob) = funded_app(AppManagerConfig::default());
    let block = next_block(&app, vec![bank::transfer_tx(&alice, 0, bob.address(), 90, 200_000)]);
    let (_, writer) = app.deliver_block(&block, &CancelToken::new()).unwrap();
    app.commit(writer).unwrap();

    assert_eq!(balance(&app, StateVersion::Latest, bob.address()), 100);
    assert_eq!(balance(&app, StateVersion::At(2), bob.address()), 100);
    assert_eq!(balance(&app, StateVersion::At(1), bob.address()), 10);

    let err = app
        .query(
            StateVersion::At(9),
            0,
            &Message::pack(&QueryBalance {
                address: bob.address(),
            }),
            &CancelToken::new(),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        AppManagerError::Store(StoreError::VersionNotFound(9))
    ));
}

#[test]
fn test_cancelled_query() {
    let (app, _, bob) = funded_app(AppManagerConfig::default());
    let cancel = CancelToken::new();
    cancel.cancel();
    let err = app
        .query(
            StateVersion::Latest,
            0,
            &Message::pack(&QueryBalance {
                address: bob.address(),
            }),
            &cancel,
        )
        .unwrap_err();
    assert!(matches!(err, AppManagerError::Stf(StfError::Cancelled)));
}

#[test]
fn test_deliver_sims() {
    let accounts = sim_accounts(4);
    let app = app_on(
        Arc::new(VersionedStore::in_memory(StoreConfig::default())),
        AppManagerConfig::default(),
    );
    let funded: Vec<(&Keypair, u64)> = accounts.iter().map(|k| (k, 5_000)).collect();
    let state = genesis(&funded);
    let (_, writer) = app
        .init_genesis(HeaderInfo::at_height(CHAIN, 1), Vec::new(), &CancelToken::new(), |ctx| {
            state.apply(ctx)
        })
        .unwrap();
    app.commit(writer).unwrap();

    let block = next_block(&app, Vec::new());
    let generator = TransferGenerator::new(sim_accounts(4), 3, 25).with_max_amount(100);
    let (response, writer) = app
        .deliver_sims(&block, &CancelToken::new(), generator.into_fn())
        .unwrap();
    let info = app.commit(writer).unwrap();

    assert_eq!(info.version, 2);
    assert_eq!(response.tx_results.len(), 25);
    let total: u64 = accounts
        .iter()
        .map(|k| balance(&app, StateVersion::Latest, k.address()))
        .sum();
    assert_eq!(total, 20_000);
}

#[test]
fn test_concurrent_reads_during_delivery() {
    let (app, alice, bob) = funded_app(AppManagerConfig::default());
    let app = Arc::new(app);

    std::thread::scope(|s| {
        for _ in 0..4 {
            let app = Arc::clone(&app);
            let bob = bob.address();
            s.spawn(move || {
                for _ in 0..20 {
                    let b = balance(&app, StateVersion::At(1), bob);
                    assert_eq!(b, 10);
                }
            });
        }
        let block = next_block(&app, vec![bank::transfer_tx(&alice, 0, bob.address(), 1, 200_000)]);
        let (_, writer) = app.deliver_block(&block, &CancelToken::new()).unwrap();
        app.commit(writer).unwrap();
    });

    assert_eq!(balance(&app, StateVersion::Latest, bob.address()), 11);
}

#[test]
fn test_state_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let alice = Keypair::from_seed(30);
    let root = {
        let store = Arc::new(VersionedStore::open(dir.path(), StoreConfig::default()).unwrap());
        let app = app_on(store, AppManagerConfig::default());
        let state = genesis(&[(&alice, 77)]);
        let (_, writer) = app
            .init_genesis(HeaderInfo::at_height(CHAIN, 1), Vec::new(), &CancelToken::new(), |ctx| {
                state.apply(ctx)
            })
            .unwrap();
        app.commit(writer).unwrap().root
    };

    let store = Arc::new(VersionedStore::open(dir.path(), StoreConfig::default()).unwrap());
    let app = app_on(store, AppManagerConfig::default());
    assert_eq!(app.latest_version(), 1);
    assert_eq!(app.latest_root(), root);
    assert_eq!(balance(&app, StateVersion::Latest, alice.address()), 77);
}

//! Integration tests for `RpcLedger` against a mock JSON-RPC node.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use std::{sync::Arc, time::Duration};

use common::{CHAIN_ID, MockRpcNode, owner, reader};
use shelfchain_ledger::{RetryConfig, RpcLedger, RpcLedgerConfig};
use shelfchain_library::{
    Address, BookDraft, BookId, CoverSource, LedgerClient, LedgerError, LibraryConfig,
    LibraryService, MemoryContentStore, MockWallet, Session,
};

// ============================================================================
// Connection
// ============================================================================

#[tokio::test]
async fn connect_performs_one_handshake() {
    let node = MockRpcNode::start().await;
    let ledger = node.client();
    assert_eq!(ledger.chain_id(), None);

    ledger.connect().await.expect("connect");
    ledger.connect().await.expect("second connect is a no-op");
    ledger.get_books().await.expect("get_books");

    assert_eq!(ledger.chain_id(), Some(CHAIN_ID));
    assert_eq!(node.count("ledger_chainId"), 1);
}

#[tokio::test]
async fn reads_connect_lazily() {
    let node = MockRpcNode::start().await;
    let ledger = node.client();

    let super_admin = ledger.get_super_admin().await.expect("super admin");
    assert_eq!(super_admin, owner());
    assert_eq!(node.methods(), ["ledger_chainId", "ledger_call"]);
}

// ============================================================================
// Reads
// ============================================================================

#[tokio::test]
async fn reads_return_raw_records() {
    let node = MockRpcNode::start().await;
    node.ledger.add_book(&owner(), "ipfs://doc", 2).await.expect("seed book");
    let ledger = node.client();

    let books = ledger.get_books().await.expect("get_books");
    assert_eq!(books.len(), 1);
    assert_eq!(books[0].metadata_uri.as_deref(), Some("ipfs://doc"));
    assert_eq!(books[0].quantity, Some(2));

    let book = ledger.get_book(&books[0].id).await.expect("get_book");
    assert_eq!(book, books[0]);

    assert!(ledger.is_user(&reader()).await.expect("is_user"));
    assert!(ledger.is_admin(&owner()).await.expect("is_admin"));
    assert_eq!(ledger.get_all_users().await.expect("users"), [reader()]);
}

#[tokio::test]
async fn missing_book_is_not_found() {
    let node = MockRpcNode::start().await;
    let err = node.client().get_book(&BookId::from("404")).await.unwrap_err();
    assert!(matches!(err, LedgerError::NotFound { .. }));
}

#[tokio::test]
async fn transient_read_failures_are_retried() {
    let node = MockRpcNode::start().await;
    let ledger = node.client();
    ledger.connect().await.expect("connect");
    node.script(|s| s.unavailable = 2);

    let books = ledger.get_books().await.expect("retried read succeeds");
    assert!(books.is_empty());
    assert_eq!(node.count("ledger_call"), 3);
}

#[tokio::test]
async fn exhausted_read_retries_surface_transport_error() {
    let node = MockRpcNode::start().await;
    let ledger = node.client();
    ledger.connect().await.expect("connect");
    node.script(|s| s.unavailable = 10);

    let err = ledger.get_books().await.unwrap_err();
    assert!(matches!(err, LedgerError::Transport { .. }), "got {err:?}");
    assert_eq!(node.count("ledger_call"), 4); // 1 initial + 3 retries
}

#[tokio::test]
async fn rpc_error_codes_map_to_ledger_errors() {
    let node = MockRpcNode::start().await;
    let ledger = node.client();
    ledger.connect().await.expect("connect");

    node.script(|s| s.rpc_error = Some((4900, "Disconnected".into())));
    let err = ledger.get_books().await.unwrap_err();
    assert_eq!(err, LedgerError::connection_unavailable("Disconnected"));
    // Non-transient: exactly one attempt.
    assert_eq!(node.count("ledger_call"), 1);
}

#[tokio::test]
async fn unreachable_endpoint_is_transient() {
    let closed = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        listener.local_addr().expect("addr")
    };
    let config = RpcLedgerConfig::builder()
        .endpoint(format!("http://{closed}/"))
        .contract(common::CONTRACT)
        .read_timeout(Duration::from_secs(2))
        .retry(
            RetryConfig::builder()
                .max_retries(1)
                .initial_backoff(Duration::from_millis(1))
                .build()
                .expect("retry config"),
        )
        .build()
        .expect("config");
    let ledger = RpcLedger::new(config).expect("client");

    let err = ledger.get_books().await.unwrap_err();
    assert!(err.is_transient(), "got {err:?}");
}

// ============================================================================
// Writes
// ============================================================================

#[tokio::test]
async fn write_resolves_after_confirmation() {
    let node = MockRpcNode::start().await;
    let ledger = node.client();
    node.script(|s| s.pending_polls = 3);

    let receipt = ledger.add_book(&owner(), "ipfs://doc", 1).await.expect("add_book");
    assert!(receipt.block_number.is_some());
    assert_eq!(node.count("ledger_sendTransaction"), 1);
    assert_eq!(node.count("ledger_getTransactionReceipt"), 4);
    assert_eq!(node.ledger.get_books().await.expect("books").len(), 1);
}

#[tokio::test]
async fn rejected_execution_is_reverted() {
    let node = MockRpcNode::start().await;
    let ledger = node.client();

    let err = ledger.add_book(&reader(), "ipfs://doc", 1).await.unwrap_err();
    assert_eq!(err, LedgerError::reverted("Caller is not an admin"));
}

#[tokio::test]
async fn failed_receipt_is_reverted() {
    let node = MockRpcNode::start().await;
    let ledger = node.client();
    node.script(|s| s.revert_in_receipt = Some("No copies available".into()));

    let err = ledger.borrow_book(&reader(), &BookId::from("1")).await.unwrap_err();
    assert_eq!(err, LedgerError::reverted("No copies available"));
}

#[tokio::test]
async fn declined_signature_is_user_rejected_and_not_retried() {
    let node = MockRpcNode::start().await;
    let ledger = node.client();
    ledger.connect().await.expect("connect");
    node.ledger.reject_next_signature();

    let err = ledger.register(&Address::parse("0xdd")).await.unwrap_err();
    assert_eq!(err, LedgerError::UserRejected);
    assert_eq!(node.count("ledger_sendTransaction"), 1);
}

#[tokio::test]
async fn unconfirmed_write_times_out() {
    let node = MockRpcNode::start().await;
    let ledger = node.client_with(Duration::from_millis(200));
    node.script(|s| s.never_confirm = true);

    let err = ledger.register(&Address::parse("0xdd")).await.unwrap_err();
    assert_eq!(err, LedgerError::Timeout);
    assert_eq!(node.count("ledger_sendTransaction"), 1);
}

#[tokio::test]
async fn receipt_poll_survives_transient_failures() {
    let node = MockRpcNode::start().await;
    let ledger = node.client();
    ledger.connect().await.expect("connect");

    // The submission succeeds; the node then drops the first polls.
    let addr = Address::parse("0xdd");
    let submit = ledger.register(&addr);
    let outage = async {
        while node.count("ledger_sendTransaction") == 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        node.script(|s| s.unavailable = 2);
    };
    let (receipt, ()) = tokio::join!(submit, outage);
    receipt.expect("confirmed despite poll failures");
    assert_eq!(node.count("ledger_sendTransaction"), 1);
}

// ============================================================================
// Service over RPC
// ============================================================================

#[tokio::test]
async fn library_service_runs_over_rpc() {
    let node = MockRpcNode::start().await;
    let content = Arc::new(MemoryContentStore::new());
    let service =
        LibraryService::new(Arc::new(node.client()), content, LibraryConfig::default());

    let session = Session::new(Arc::new(MockWallet::new(vec![owner()], CHAIN_ID)));
    session.connect().await.expect("wallet connect");
    let draft = BookDraft::builder()
        .title("Dune")
        .author("Frank Herbert")
        .quantity(2)
        .cover(CoverSource::Uri("https://covers.test/dune.png".into()))
        .build();
    service.add_book(&session, draft).await.expect("add_book");

    let report = service.get_books().await.expect("get_books");
    assert_eq!(report.books.len(), 1);
    assert_eq!(report.books[0].title, "Dune");
    assert_eq!(report.books[0].available_copies, 2);
}

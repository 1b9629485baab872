#![cfg(feature = "failpoints")]
#![allow(clippy::expect_used, clippy::unwrap_used)]
//! Integration tests for fail-point injection.
//!
//! These tests require the `failpoints` feature:
//! ```bash
//! cargo test -p shelfchain-ledger --features failpoints --test failpoint_tests
//! ```

mod common;

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use common::{MockRpcNode, reader};
use shelfchain_library::{Address, LedgerClient, LedgerError};

#[tokio::test]
async fn receipt_poll_failpoint_times_out_write() {
    let scenario = fail::FailScenario::setup();
    fail::cfg("rpc-receipt-poll", "return").expect("failed to configure fail point");

    let node = MockRpcNode::start().await;
    let err = node.client().register(&Address::parse("0xdd")).await.unwrap_err();

    assert_eq!(err, LedgerError::Timeout);
    assert_eq!(node.count("ledger_sendTransaction"), 1);
    assert_eq!(node.count("ledger_getTransactionReceipt"), 0);

    scenario.teardown();
}

#[tokio::test]
async fn receipt_poll_without_failpoint_confirms() {
    let scenario = fail::FailScenario::setup();

    let node = MockRpcNode::start().await;
    node.client().register(&Address::parse("0xdd")).await.expect("register");
    assert!(node.ledger.is_user(&Address::parse("0xdd")).await.expect("is_user"));

    scenario.teardown();
}

#[tokio::test]
async fn retry_failpoint_fires_between_read_attempts() {
    let scenario = fail::FailScenario::setup();
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);
    fail::cfg_callback("retry-before-sleep", move || {
        counter.fetch_add(1, Ordering::SeqCst);
    })
    .expect("failed to configure fail point");

    let node = MockRpcNode::start().await;
    let ledger = node.client();
    ledger.connect().await.expect("connect");
    node.script(|s| s.unavailable = 2);

    assert!(ledger.is_user(&reader()).await.expect("retried read"));
    assert_eq!(hits.load(Ordering::SeqCst), 2);

    scenario.teardown();
}

//! A JSON-RPC ledger node for integration tests.
//!
//! `MockRpcNode` serves the wire protocol `RpcLedger` speaks on
//! `127.0.0.1:0` and executes procedures against a shared `MemoryLedger`,
//! so ledger rules (roles, copy counts) behave as they do in production.
//! Faults are scripted per test through `NodeScript`.

#![allow(dead_code, clippy::expect_used, clippy::unwrap_used)]

use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{Arc, Mutex},
    time::Duration,
};

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::post};
use serde_json::{Value, json};
use shelfchain_ledger::{RetryConfig, RpcLedger, RpcLedgerConfig};
use shelfchain_library::{Address, BookId, LedgerClient, LedgerError, MemoryLedger, TxReceipt};

pub const CONTRACT: &str = "0x5fbdb2315678afecb367f032d93f642f64180aa3";
pub const CHAIN_ID: &str = "0x7a69";

pub fn owner() -> Address {
    Address::parse("0x00000000000000000000000000000000000000aa")
}

pub fn reader() -> Address {
    Address::parse("0x00000000000000000000000000000000000000cc")
}

/// Faults injected into the next requests.
#[derive(Debug, Default)]
pub struct NodeScript {
    /// Answer this many requests with HTTP 503.
    pub unavailable: u32,
    /// Answer this many receipt polls with `null` before confirming.
    pub pending_polls: u32,
    /// Never confirm submitted transactions.
    pub never_confirm: bool,
    /// Include the next transaction with a failed status and this reason.
    pub revert_in_receipt: Option<String>,
    /// Answer with this JSON-RPC error instead of executing.
    pub rpc_error: Option<(i64, String)>,
}

#[derive(Default)]
struct NodeState {
    script: NodeScript,
    receipts: HashMap<String, Value>,
    methods: Vec<String>,
    next_hash: u64,
}

#[derive(Clone)]
struct Node {
    ledger: MemoryLedger,
    state: Arc<Mutex<NodeState>>,
}

/// Handle to a running mock node.
pub struct MockRpcNode {
    pub ledger: MemoryLedger,
    pub addr: SocketAddr,
    state: Arc<Mutex<NodeState>>,
}

impl MockRpcNode {
    pub async fn start() -> Self {
        let ledger = MemoryLedger::new(owner());
        ledger.seed_user(reader());
        let state = Arc::new(Mutex::new(NodeState::default()));
        let node = Node { ledger: ledger.clone(), state: Arc::clone(&state) };

        let app = Router::new().route("/", post(handle)).with_state(node);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind listener");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move { axum::serve(listener, app).await.expect("serve node") });

        Self { ledger, addr, state }
    }

    pub fn endpoint(&self) -> String {
        format!("http://{}/", self.addr)
    }

    pub fn script(&self, f: impl FnOnce(&mut NodeScript)) {
        f(&mut self.state.lock().expect("lock poisoned").script);
    }

    /// Methods received so far, in order.
    pub fn methods(&self) -> Vec<String> {
        self.state.lock().expect("lock poisoned").methods.clone()
    }

    pub fn count(&self, method: &str) -> usize {
        self.methods().iter().filter(|m| *m == method).count()
    }

    /// A client with fast retries and short confirmation polling.
    pub fn client(&self) -> RpcLedger {
        self.client_with(Duration::from_secs(5))
    }

    pub fn client_with(&self, confirmation_timeout: Duration) -> RpcLedger {
        let config = RpcLedgerConfig::builder()
            .endpoint(self.endpoint())
            .contract(CONTRACT)
            .request_timeout(Duration::from_secs(2))
            .read_timeout(Duration::from_secs(5))
            .confirmation_timeout(confirmation_timeout)
            .confirmation_poll_interval(Duration::from_millis(10))
            .retry(
                RetryConfig::builder()
                    .max_retries(3)
                    .initial_backoff(Duration::from_millis(5))
                    .max_backoff(Duration::from_millis(20))
                    .build()
                    .expect("valid retry config"),
            )
            .build()
            .expect("valid config");
        RpcLedger::new(config).expect("client")
    }
}

fn rpc_error(id: &Value, code: i64, message: impl Into<String>) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "error": { "code": code, "message": message.into() } })
}

fn rpc_result(id: &Value, result: Value) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "result": result })
}

fn ledger_error(id: &Value, err: LedgerError) -> Value {
    match err {
        LedgerError::UserRejected => rpc_error(id, 4001, "User denied transaction signature"),
        LedgerError::Reverted { reason } => {
            rpc_error(id, 3, format!("execution reverted: {reason}"))
        },
        LedgerError::NotFound { what } => rpc_error(id, -32004, what),
        other => rpc_error(id, -32603, other.to_string()),
    }
}

fn arg_str(args: &Value, i: usize) -> String {
    args.get(i).and_then(Value::as_str).unwrap_or_default().to_owned()
}

fn arg_u64(args: &Value, i: usize) -> u64 {
    args.get(i).and_then(Value::as_u64).unwrap_or_default()
}

async fn call(ledger: &MemoryLedger, procedure: &str, args: &Value) -> Result<Value, LedgerError> {
    let address = || Address::parse(&arg_str(args, 0));
    let id = || BookId::from(arg_str(args, 0));
    let value = match procedure {
        "getBooks" => json!(ledger.get_books().await?),
        "getBook" => match ledger.get_book(&id()).await {
            Ok(book) => json!(book),
            Err(LedgerError::NotFound { .. }) => Value::Null,
            Err(err) => return Err(err),
        },
        "getBorrowHistory" => json!(ledger.get_borrow_history().await?),
        "getUserBorrowHistory" => json!(ledger.get_user_borrow_history(&address()).await?),
        "isAdmin" => json!(ledger.is_admin(&address()).await?),
        "isUser" => json!(ledger.is_user(&address()).await?),
        "superAdmin" => json!(ledger.get_super_admin().await?),
        "getAllAdmins" => json!(ledger.get_all_admins().await?),
        "getAllUsers" => json!(ledger.get_all_users().await?),
        other => return Err(LedgerError::transport(format!("unknown procedure {other}"))),
    };
    Ok(value)
}

async fn send(
    ledger: &MemoryLedger,
    from: &Address,
    procedure: &str,
    args: &Value,
) -> Result<TxReceipt, LedgerError> {
    let address = || Address::parse(&arg_str(args, 0));
    let id = || BookId::from(arg_str(args, 0));
    match procedure {
        "addBook" => ledger.add_book(from, &arg_str(args, 0), arg_u64(args, 1)).await,
        "updateBook" => {
            ledger.update_book(from, &id(), &arg_str(args, 1), arg_u64(args, 2)).await
        },
        "deleteBook" => ledger.delete_book(from, &id()).await,
        "borrowBook" => ledger.borrow_book(from, &id()).await,
        "returnBook" => ledger.return_book(from, &id()).await,
        "register" => ledger.register(from).await,
        "addUser" => ledger.add_user(from, &address()).await,
        "removeUser" => ledger.remove_user(from, &address()).await,
        "makeAdmin" => ledger.make_admin(from, &address()).await,
        "removeAdmin" => ledger.remove_admin(from, &address()).await,
        other => Err(LedgerError::transport(format!("unknown procedure {other}"))),
    }
}

async fn handle(State(node): State<Node>, Json(request): Json<Value>) -> impl IntoResponse {
    let id = request["id"].clone();
    let method = request["method"].as_str().unwrap_or_default().to_owned();
    let params = request["params"].clone();

    {
        let mut state = node.state.lock().expect("lock poisoned");
        state.methods.push(method.clone());
        if state.script.unavailable > 0 {
            state.script.unavailable -= 1;
            return (StatusCode::SERVICE_UNAVAILABLE, Json(Value::Null));
        }
        if let Some((code, message)) = state.script.rpc_error.take() {
            return (StatusCode::OK, Json(rpc_error(&id, code, message)));
        }
    }

    let body = match method.as_str() {
        "ledger_chainId" => rpc_result(&id, json!(CHAIN_ID)),
        "ledger_call" => {
            let call_params = &params[0];
            let procedure = call_params["procedure"].as_str().unwrap_or_default();
            match call(&node.ledger, procedure, &call_params["args"]).await {
                Ok(value) => rpc_result(&id, value),
                Err(err) => ledger_error(&id, err),
            }
        },
        "ledger_sendTransaction" => {
            let tx = &params[0];
            let from = Address::parse(tx["from"].as_str().unwrap_or_default());
            let procedure = tx["procedure"].as_str().unwrap_or_default().to_owned();
            let scripted_revert =
                node.state.lock().expect("lock poisoned").script.revert_in_receipt.take();

            let receipt = match scripted_revert {
                Some(reason) => {
                    let mut state = node.state.lock().expect("lock poisoned");
                    state.next_hash += 1;
                    let hash = format!("0xrevert{:x}", state.next_hash);
                    state.receipts.insert(
                        hash.clone(),
                        json!({ "transactionHash": hash, "status": "0x0", "revertReason": reason }),
                    );
                    Ok(hash)
                },
                None => send(&node.ledger, &from, &procedure, &tx["args"]).await.map(|receipt| {
                    let hash = receipt.tx_hash.as_str().to_owned();
                    let block = format!("0x{:x}", receipt.block_number.unwrap_or_default());
                    node.state.lock().expect("lock poisoned").receipts.insert(
                        hash.clone(),
                        json!({ "transactionHash": hash, "blockNumber": block, "status": "0x1" }),
                    );
                    hash
                }),
            };
            match receipt {
                Ok(hash) => rpc_result(&id, json!(hash)),
                Err(err) => ledger_error(&id, err),
            }
        },
        "ledger_getTransactionReceipt" => {
            let hash = params[0].as_str().unwrap_or_default();
            let mut state = node.state.lock().expect("lock poisoned");
            if state.script.never_confirm {
                rpc_result(&id, Value::Null)
            } else if state.script.pending_polls > 0 {
                state.script.pending_polls -= 1;
                rpc_result(&id, Value::Null)
            } else {
                rpc_result(&id, state.receipts.get(hash).cloned().unwrap_or(Value::Null))
            }
        },
        other => rpc_error(&id, -32601, format!("method {other} not found")),
    };
    (StatusCode::OK, Json(body))
}

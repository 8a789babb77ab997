//! Shared fixtures and mock network services.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use jsonrpsee::core::async_trait;
use jsonrpsee::proc_macros::rpc;
use jsonrpsee::server::{Server, ServerHandle};
use jsonrpsee::types::ErrorObjectOwned;
use serde_json::{Value, json};
use tokio::task::JoinHandle;

use pillar_core::types::Utxo;
use pillar_wallet::{Wallet, WalletConfig, decode_raw_transaction};

/// Phrase behind every reference vector.
pub const REFERENCE_MNEMONIC: &str = "some super random words";

/// Root address of [`REFERENCE_MNEMONIC`] on testnet.
pub const REFERENCE_ROOT_ADDRESS: &str = "mhQ51TfiyTdwxYDq42Wrz1LvLY7PbSEJ9w";

/// Root address of the phrase `"target mnemonic"` on testnet.
pub const TARGET_ADDRESS: &str = "mhZxxh9CTdtLPaZRMydmA25kDUC8mtyP2B";

/// Wallet for [`REFERENCE_MNEMONIC`] with default configuration plus `edit`.
pub fn reference_wallet(edit: impl FnOnce(&mut WalletConfig)) -> Wallet {
    let mut config = WalletConfig::default();
    edit(&mut config);
    Wallet::from_mnemonic(REFERENCE_MNEMONIC, "", config).unwrap()
}

/// A UTXO paying `value` to the wallet's receive address at `index`.
pub fn receive_utxo(wallet: &Wallet, index: u32, value: u64, mint_index: u32) -> Utxo {
    let key = wallet.keychain().key_at(0, index).unwrap();
    Utxo {
        address: wallet.receive_address(index).unwrap(),
        mint_txid: format!("{:064x}", u64::from(mint_index) + 0xbeef),
        mint_index,
        script_pub_key: key.p2pkh_script_hex(),
        value,
        height: 1_180_957,
        confirmations: 6,
    }
}

/// Plain UTXO record for selection-only tests.
pub fn utxo(value: u64, mint_index: u32) -> Utxo {
    Utxo {
        address: REFERENCE_ROOT_ADDRESS.into(),
        mint_txid: format!("{:064x}", u64::from(mint_index) + 1),
        mint_index,
        script_pub_key: "76a91414a2f1bf167a7835c98510fbe79c48d52fa16c6088ac".into(),
        value,
        height: 1_180_957,
        confirmations: 14,
    }
}

#[derive(Clone, Default)]
struct MockState {
    reject: bool,
    received: Arc<Mutex<Vec<String>>>,
}

impl MockState {
    /// Record `raw_tx` and return its txid unless rejecting.
    fn submit(&self, raw_tx: &str) -> Option<String> {
        self.received.lock().unwrap().push(raw_tx.to_string());
        if self.reject {
            return None;
        }
        decode_raw_transaction(raw_tx).map(|tx| tx.compute_txid().to_string())
    }
}

/// A running mock broadcast endpoint.
pub struct MockServer {
    pub url: String,
    received: Arc<Mutex<Vec<String>>>,
    _task: Option<JoinHandle<()>>,
    _rpc: Option<ServerHandle>,
}

impl MockServer {
    /// Raw transactions submitted so far, in arrival order.
    pub fn received(&self) -> Vec<String> {
        self.received.lock().unwrap().clone()
    }
}

async fn send_tx(
    State(state): State<MockState>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, StatusCode> {
    let raw_tx = body
        .get("rawTx")
        .and_then(Value::as_str)
        .ok_or(StatusCode::BAD_REQUEST)?;
    let txid = state.submit(raw_tx).ok_or(StatusCode::BAD_REQUEST)?;
    Ok(Json(json!({ "txid": txid })))
}

/// Indexer stand-in serving `POST /tx/send`. Rejects everything when `reject`.
pub async fn spawn_mock_indexer(reject: bool) -> MockServer {
    let state = MockState {
        reject,
        ..MockState::default()
    };
    let received = state.received.clone();
    let app = Router::new()
        .route("/tx/send", post(send_tx))
        .with_state(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    let task = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    MockServer {
        url: format!("http://{addr}"),
        received,
        _task: Some(task),
        _rpc: None,
    }
}

#[rpc(server)]
pub trait MockNodeRpc {
    #[method(name = "sendrawtransaction")]
    async fn send_raw_transaction(&self, raw_tx: String) -> Result<String, ErrorObjectOwned>;
}

struct MockNode {
    state: MockState,
}

#[async_trait]
impl MockNodeRpcServer for MockNode {
    async fn send_raw_transaction(&self, raw_tx: String) -> Result<String, ErrorObjectOwned> {
        self.state.submit(&raw_tx).ok_or_else(|| {
            ErrorObjectOwned::owned(-26, "txn-mempool-conflict".to_string(), None::<()>)
        })
    }
}

/// Node JSON-RPC stand-in answering `sendrawtransaction`.
pub async fn spawn_mock_node(reject: bool) -> MockServer {
    let state = MockState {
        reject,
        ..MockState::default()
    };
    let received = state.received.clone();
    let server = Server::builder().build("127.0.0.1:0").await.unwrap();
    let addr = server.local_addr().unwrap();
    let handle = server.start(MockNode { state }.into_rpc());
    MockServer {
        url: format!("http://{addr}"),
        received,
        _task: None,
        _rpc: Some(handle),
    }
}

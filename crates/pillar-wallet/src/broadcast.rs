//! Submission of signed transactions to the network.
//!
//! Broadcasting never fails with an error: any decoding, transport or
//! rejection problem yields `None` so the caller can retry with the same
//! bytes later.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use bitcoin::Transaction;
use jsonrpsee::core::client::ClientT;
use jsonrpsee::core::params::ArrayParams;
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::WalletError;

/// Submits raw transactions and reports the accepted txid.
#[async_trait]
pub trait Broadcaster: Send + Sync {
    /// Returns the txid on acceptance, `None` on any failure.
    async fn send_raw_transaction(&self, raw_hex: &str) -> Option<String>;
}

/// Decode raw transaction hex, `None` if it is not a well-formed transaction.
pub fn decode_raw_transaction(raw_hex: &str) -> Option<Transaction> {
    let bytes = hex::decode(raw_hex.trim()).ok()?;
    bitcoin::consensus::deserialize(&bytes).ok()
}

/// Local checks shared by every client. Returns the locally computed txid.
fn prevalidate(raw_hex: &str) -> Option<String> {
    match decode_raw_transaction(raw_hex) {
        Some(tx) => Some(tx.compute_txid().to_string()),
        None => {
            warn!("refusing to broadcast malformed transaction");
            None
        }
    }
}

fn accept(local_txid: &str, remote_txid: String) -> Option<String> {
    if remote_txid != local_txid {
        warn!(local = %local_txid, remote = %remote_txid, "broadcast returned unexpected txid");
    }
    info!(txid = %remote_txid, "transaction accepted");
    Some(remote_txid)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SendTxRequest<'a> {
    raw_tx: &'a str,
}

#[derive(Deserialize)]
struct SendTxResponse {
    txid: String,
}

/// REST indexer client: `POST {base}/tx/send` with `{"rawTx": ...}`.
#[derive(Debug, Clone)]
pub struct IndexerBroadcaster {
    client: reqwest::Client,
    base_url: String,
}

impl IndexerBroadcaster {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, WalletError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| WalletError::Broadcaster(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn post(&self, raw_hex: &str) -> Result<String, reqwest::Error> {
        let response = self
            .client
            .post(format!("{}/tx/send", self.base_url))
            .json(&SendTxRequest { raw_tx: raw_hex })
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json::<SendTxResponse>().await?.txid)
    }
}

#[async_trait]
impl Broadcaster for IndexerBroadcaster {
    async fn send_raw_transaction(&self, raw_hex: &str) -> Option<String> {
        let local_txid = prevalidate(raw_hex)?;
        debug!(txid = %local_txid, url = %self.base_url, "broadcasting via indexer");
        match self.post(raw_hex.trim()).await {
            Ok(txid) => accept(&local_txid, txid),
            Err(e) => {
                warn!(txid = %local_txid, error = %e, "indexer broadcast failed");
                None
            }
        }
    }
}

/// Node JSON-RPC client calling `sendrawtransaction`.
pub struct NodeRpcBroadcaster {
    client: HttpClient,
    endpoint: String,
}

impl NodeRpcBroadcaster {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, WalletError> {
        let client = HttpClientBuilder::default()
            .request_timeout(timeout)
            .build(endpoint)
            .map_err(|e| WalletError::Broadcaster(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }
}

#[async_trait]
impl Broadcaster for NodeRpcBroadcaster {
    async fn send_raw_transaction(&self, raw_hex: &str) -> Option<String> {
        let local_txid = prevalidate(raw_hex)?;
        debug!(txid = %local_txid, endpoint = %self.endpoint, "broadcasting via node rpc");
        let mut params = ArrayParams::new();
        params.insert(raw_hex.trim()).ok()?;
        match self
            .client
            .request::<String, _>("sendrawtransaction", params)
            .await
        {
            Ok(txid) => accept(&local_txid, txid),
            Err(e) => {
                warn!(txid = %local_txid, error = %e, "node rpc broadcast failed");
                None
            }
        }
    }
}

impl fmt::Debug for NodeRpcBroadcaster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeRpcBroadcaster")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

/// Which broadcast client to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BroadcasterKind {
    #[default]
    Indexer,
    NodeRpc,
}

impl FromStr for BroadcasterKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "indexer" | "rest" => Ok(Self::Indexer),
            "node" | "rpc" | "node-rpc" => Ok(Self::NodeRpc),
            other => Err(format!("unknown broadcaster: {other}")),
        }
    }
}

/// Broadcaster connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcasterConfig {
    pub kind: BroadcasterKind,
    pub endpoint: String,
    pub timeout: Duration,
}

impl Default for BroadcasterConfig {
    fn default() -> Self {
        Self {
            kind: BroadcasterKind::Indexer,
            endpoint: "http://127.0.0.1:3000/api/BTC/testnet".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Build the client described by `config`.
pub fn broadcaster_from_config(config: &BroadcasterConfig) -> Result<Box<dyn Broadcaster>, WalletError> {
    Ok(match config.kind {
        BroadcasterKind::Indexer => Box::new(IndexerBroadcaster::new(&config.endpoint, config.timeout)?),
        BroadcasterKind::NodeRpc => Box::new(NodeRpcBroadcaster::new(&config.endpoint, config.timeout)?),
    })
}

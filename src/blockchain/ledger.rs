// src/blockchain/ledger.rs
//! Ledger adapter contract.
//!
//! The pipeline only needs a handful of capabilities from a ledger network
//! client: connection management, transaction autofill, signing with the
//! session wallet, and submission with a wait for validation. Transactions
//! are passed around as JSON objects in the ledger's native field names.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Callback invoked when the ledger connection drops unexpectedly.
pub type DisconnectHandler = Arc<dyn Fn() + Send + Sync>;

/// Public identity of the session wallet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerIdentity {
    /// Classic ledger address, e.g. `rMuwGvcUxnS1LT4xXDaVZGZGbBtrUD5bgd`
    pub address: String,
    /// Public key bytes as published by the ledger
    pub public_key: Vec<u8>,
}

/// Output of signing a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    /// Transaction hash (identifier on the ledger)
    pub hash: String,
    /// Hex-encoded serialized signed transaction, ready for submission
    pub signed_blob: String,
}

/// Validated transaction as returned by the ledger.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(transparent)]
pub struct TransactionReceipt(pub Value);

impl TransactionReceipt {
    /// Transaction hash, if the receipt carries one.
    pub fn hash(&self) -> Option<&str> {
        self.0.get("hash").and_then(Value::as_str)
    }

    /// Engine result code from the transaction metadata, e.g. `tesSUCCESS`.
    pub fn result_code(&self) -> Option<&str> {
        self.0
            .get("meta")
            .and_then(|meta| meta.get("TransactionResult"))
            .and_then(Value::as_str)
    }

    pub fn is_validated(&self) -> bool {
        self.0.get("validated").and_then(Value::as_bool).unwrap_or(false)
    }
}

/// Capabilities consumed from a ledger network client.
#[async_trait]
pub trait LedgerAdapter: Send + Sync {
    /// Opens the network connection. A no-op when already connected.
    async fn connect(&self) -> Result<()>;

    fn is_connected(&self) -> bool;

    /// Registers a callback fired whenever the connection is lost.
    fn on_disconnect(&self, handler: DisconnectHandler);

    /// The signing identity, if a wallet is configured.
    fn identity(&self) -> Option<LedgerIdentity>;

    /// Signs a transaction with the session wallet.
    async fn sign(&self, tx: &Value) -> Result<SignedTransaction>;

    /// Fills network-dependent fields (sequence, fee, expiry) left unset.
    async fn autofill(&self, tx: Value) -> Result<Value>;

    /// Submits a signed blob and waits until the ledger validates it.
    async fn submit_and_wait(&self, signed_blob: &str) -> Result<TransactionReceipt>;

    /// Closes the connection without triggering disconnect callbacks.
    async fn disconnect(&self) -> Result<()>;
}

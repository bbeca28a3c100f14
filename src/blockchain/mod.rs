// src/blockchain/mod.rs
//! Ledger access: the adapter contract, the XRPL client and connection supervision.

pub mod ledger;
pub mod reconnect;
pub mod xrpl_client;

pub use ledger::{
    DisconnectHandler, LedgerAdapter, LedgerIdentity, SignedTransaction, TransactionReceipt,
};
pub use reconnect::{CancellationToken, ConnectionSupervisor, ReconnectOutcome, ReconnectPolicy};
pub use xrpl_client::{XrplClient, XrplWallet};

#[cfg(test)]
pub(crate) mod testing {
    //! In-process ledger double. Signed blobs are the hex-encoded JSON of
    //! the transaction so tests can inspect what was submitted.

    use super::ledger::*;
    use crate::error::{IdentityError, Result};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use sha2::{Digest, Sha256};
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::Mutex;

    pub struct MockLedger {
        identity: Option<LedgerIdentity>,
        connected: AtomicBool,
        connect_failures: AtomicU32,
        connect_calls: AtomicU32,
        fail_signing: AtomicBool,
        fail_submission: AtomicBool,
        handlers: Mutex<Vec<DisconnectHandler>>,
        submitted: Mutex<Vec<Value>>,
    }

    impl MockLedger {
        pub fn new(address: &str) -> Self {
            Self::with_identity(Some(LedgerIdentity {
                address: address.to_string(),
                public_key: vec![0xED, 0x01, 0x02, 0x03],
            }))
        }

        pub fn without_identity() -> Self {
            Self::with_identity(None)
        }

        fn with_identity(identity: Option<LedgerIdentity>) -> Self {
            Self {
                identity,
                connected: AtomicBool::new(false),
                connect_failures: AtomicU32::new(0),
                connect_calls: AtomicU32::new(0),
                fail_signing: AtomicBool::new(false),
                fail_submission: AtomicBool::new(false),
                handlers: Mutex::new(Vec::new()),
                submitted: Mutex::new(Vec::new()),
            }
        }

        pub fn fail_next_connects(&self, count: u32) {
            self.connect_failures.store(count, Ordering::SeqCst);
        }

        pub fn fail_signing(&self) {
            self.fail_signing.store(true, Ordering::SeqCst);
        }

        pub fn fail_submission(&self) {
            self.fail_submission.store(true, Ordering::SeqCst);
        }

        pub fn connect_calls(&self) -> u32 {
            self.connect_calls.load(Ordering::SeqCst)
        }

        /// Transactions decoded from every submitted blob, in order.
        pub fn submitted(&self) -> Vec<Value> {
            self.submitted.lock().unwrap().clone()
        }

        pub fn simulate_disconnect(&self) {
            self.connected.store(false, Ordering::SeqCst);
            let handlers = self.handlers.lock().unwrap().clone();
            for handler in handlers {
                handler();
            }
        }
    }

    #[async_trait]
    impl LedgerAdapter for MockLedger {
        async fn connect(&self) -> Result<()> {
            self.connect_calls.fetch_add(1, Ordering::SeqCst);
            let remaining = self.connect_failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.connect_failures.store(remaining - 1, Ordering::SeqCst);
                return Err(IdentityError::Connection("mock refused".into()));
            }
            self.connected.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn is_connected(&self) -> bool {
            self.connected.load(Ordering::SeqCst)
        }

        fn on_disconnect(&self, handler: DisconnectHandler) {
            self.handlers.lock().unwrap().push(handler);
        }

        fn identity(&self) -> Option<LedgerIdentity> {
            self.identity.clone()
        }

        async fn sign(&self, tx: &Value) -> Result<SignedTransaction> {
            if self.identity.is_none() {
                return Err(IdentityError::MissingIdentity("no wallet".into()));
            }
            if self.fail_signing.load(Ordering::SeqCst) {
                return Err(IdentityError::Signing("mock signer offline".into()));
            }
            let bytes = serde_json::to_vec(tx).unwrap();
            Ok(SignedTransaction {
                hash: hex::encode_upper(Sha256::digest(&bytes)),
                signed_blob: hex::encode(bytes),
            })
        }

        async fn autofill(&self, tx: Value) -> Result<Value> {
            let mut tx = tx;
            let fields = tx.as_object_mut().unwrap();
            fields.entry("Sequence").or_insert(json!(1));
            fields.entry("Fee").or_insert(json!("12"));
            fields.entry("LastLedgerSequence").or_insert(json!(100));
            Ok(tx)
        }

        async fn submit_and_wait(&self, signed_blob: &str) -> Result<TransactionReceipt> {
            if self.fail_submission.load(Ordering::SeqCst) {
                return Err(IdentityError::LedgerSubmission("mock ledger rejected".into()));
            }
            let tx: Value = serde_json::from_slice(&hex::decode(signed_blob).unwrap()).unwrap();
            self.submitted.lock().unwrap().push(tx.clone());
            Ok(TransactionReceipt(json!({
                "hash": "F1NAL",
                "validated": true,
                "ledger_index": 42,
                "meta": { "TransactionResult": "tesSUCCESS" },
                "tx_json": tx,
            })))
        }

        async fn disconnect(&self) -> Result<()> {
            self.connected.store(false, Ordering::SeqCst);
            Ok(())
        }
    }
}

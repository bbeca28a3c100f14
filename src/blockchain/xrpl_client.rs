// src/blockchain/xrpl_client.rs
//! XRP Ledger client implementation.
//!
//! Speaks the rippled WebSocket JSON API over a single long-lived socket.
//! Requests carry a numeric `id`; a background reader task routes each
//! response back to the waiting caller and detects socket loss.
//!
//! Signing is delegated to the node's `sign` command using the session
//! wallet seed, so the configured endpoint must be trusted with the seed.

use crate::blockchain::ledger::{
    DisconnectHandler, LedgerAdapter, LedgerIdentity, SignedTransaction, TransactionReceipt,
};
use crate::config::LedgerSettings;
use crate::error::{IdentityError, Result};
use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use log::{debug, info, warn};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use zeroize::Zeroizing;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Ledgers a transaction may wait for before it expires.
const LEDGER_OFFSET: u64 = 20;

/// Preliminary result prefixes that can never lead to inclusion.
const TERMINAL_RESULT_PREFIXES: [&str; 3] = ["tem", "tef", "tel"];

/// Session wallet: seed plus its public identity.
#[derive(Clone)]
pub struct XrplWallet {
    seed: Zeroizing<String>,
    identity: LedgerIdentity,
}

impl XrplWallet {
    /// Builds a wallet from a seed, classic address and hex public key.
    ///
    /// # Errors
    /// - `InvalidAddress` if the address is empty
    /// - `Config` if the public key is not valid hex
    pub fn new(seed: &str, address: &str, public_key_hex: &str) -> Result<Self> {
        if address.trim().is_empty() {
            return Err(IdentityError::InvalidAddress("wallet address is empty".into()));
        }
        let public_key = hex::decode(public_key_hex.trim())
            .map_err(|e| IdentityError::Config(format!("wallet public key is not hex: {}", e)))?;
        Ok(Self {
            seed: Zeroizing::new(seed.to_string()),
            identity: LedgerIdentity {
                address: address.trim().to_string(),
                public_key,
            },
        })
    }

    /// Reads the wallet from settings. Returns `None` when no seed is configured.
    pub fn from_settings(settings: &LedgerSettings) -> Result<Option<Self>> {
        let Some(seed) = settings.seed.as_deref() else {
            return Ok(None);
        };
        let address = settings.address.as_deref().unwrap_or_default();
        let public_key = settings.public_key.as_deref().ok_or_else(|| {
            IdentityError::Config("ledger.public_key is required when a seed is set".into())
        })?;
        Self::new(seed, address, public_key).map(Some)
    }

    pub fn identity(&self) -> &LedgerIdentity {
        &self.identity
    }
}

/// Error object returned by rippled for a failed request.
#[derive(Debug, Clone)]
struct RpcError {
    code: String,
    message: String,
}

impl RpcError {
    fn describe(&self) -> String {
        if self.message.is_empty() || self.message == self.code {
            self.code.clone()
        } else {
            format!("{}: {}", self.code, self.message)
        }
    }
}

/// State shared between the client and its reader task.
struct Shared {
    connected: AtomicBool,
    /// Set during an explicit disconnect so callbacks stay silent
    closing: AtomicBool,
    pending: Mutex<HashMap<u64, oneshot::Sender<Value>>>,
    handlers: Mutex<Vec<DisconnectHandler>>,
}

impl Shared {
    fn dispatch(&self, text: &str) {
        let message: Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(e) => {
                warn!("Ignoring unparsable ledger message: {}", e);
                return;
            }
        };
        let Some(id) = message.get("id").and_then(Value::as_u64) else {
            debug!("Unsolicited ledger message: {}", message.get("type").unwrap_or(&Value::Null));
            return;
        };
        let waiter = self.pending.lock().ok().and_then(|mut pending| pending.remove(&id));
        match waiter {
            Some(tx) => {
                let _ = tx.send(message);
            }
            None => debug!("Response for unknown request id {}", id),
        }
    }

    /// Registers a waiter for request `id`.
    ///
    /// `connection_lost` clears `connected` before it clears `pending`, so a
    /// waiter inserted after that clear is caught by the re-check below.
    fn register(&self, id: u64) -> Result<oneshot::Receiver<Value>> {
        let (tx, rx) = oneshot::channel();
        let mut pending = self
            .pending
            .lock()
            .map_err(|e| IdentityError::Connection(format!("lock poisoned: {}", e)))?;
        pending.insert(id, tx);
        if !self.connected.load(Ordering::SeqCst) {
            pending.remove(&id);
            return Err(IdentityError::Connection(
                "connection lost before the request was sent".into(),
            ));
        }
        Ok(rx)
    }

    fn connection_lost(&self) {
        self.connected.store(false, Ordering::SeqCst);
        // Dropping the senders fails every in-flight request.
        if let Ok(mut pending) = self.pending.lock() {
            pending.clear();
        }
        if self.closing.load(Ordering::SeqCst) {
            return;
        }
        warn!("Ledger connection lost");
        let handlers: Vec<DisconnectHandler> = match self.handlers.lock() {
            Ok(handlers) => handlers.clone(),
            Err(_) => return,
        };
        for handler in handlers {
            handler();
        }
    }
}

struct Connection {
    sink: SplitSink<WsStream, Message>,
    reader: JoinHandle<()>,
}

/// WebSocket client for a rippled node.
pub struct XrplClient {
    url: String,
    wallet: Option<XrplWallet>,
    poll_interval: Duration,
    connection: AsyncMutex<Option<Connection>>,
    shared: Arc<Shared>,
    next_id: AtomicU64,
}

impl XrplClient {
    /// Creates a client. No connection is made until first use.
    pub fn new(url: &str, wallet: Option<XrplWallet>, poll_interval: Duration) -> Self {
        Self {
            url: url.to_string(),
            wallet,
            poll_interval,
            connection: AsyncMutex::new(None),
            shared: Arc::new(Shared {
                connected: AtomicBool::new(false),
                closing: AtomicBool::new(false),
                pending: Mutex::new(HashMap::new()),
                handlers: Mutex::new(Vec::new()),
            }),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn from_settings(settings: &LedgerSettings) -> Result<Self> {
        let wallet = XrplWallet::from_settings(settings)?;
        Ok(Self::new(&settings.url, wallet, settings.poll_interval()))
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn wallet(&self) -> Result<&XrplWallet> {
        self.wallet
            .as_ref()
            .ok_or_else(|| IdentityError::MissingIdentity("no ledger wallet configured".into()))
    }

    /// Sends one command and waits for its response.
    ///
    /// The outer error covers transport failures; the inner one is a
    /// rippled error response.
    async fn call(
        &self,
        command: &str,
        params: Value,
    ) -> Result<std::result::Result<Value, RpcError>> {
        if !self.is_connected() {
            self.connect().await?;
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut payload = match params {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        payload.insert("id".into(), id.into());
        payload.insert("command".into(), command.into());

        let rx = self.shared.register(id)?;

        if let Err(e) = self.send_text(Value::Object(payload).to_string()).await {
            if let Ok(mut pending) = self.shared.pending.lock() {
                pending.remove(&id);
            }
            return Err(e);
        }

        let response = rx.await.map_err(|_| {
            IdentityError::Connection(format!("connection closed while awaiting `{}`", command))
        })?;
        debug!("Ledger response to `{}` (id {})", command, id);

        if response.get("status").and_then(Value::as_str) == Some("error") {
            let code = response
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string();
            let message = response
                .get("error_message")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            return Ok(Err(RpcError { code, message }));
        }
        Ok(Ok(response.get("result").cloned().unwrap_or(Value::Null)))
    }

    /// Like `call`, mapping rippled errors to the given error kind.
    async fn request(
        &self,
        command: &str,
        params: Value,
        kind: fn(String) -> IdentityError,
    ) -> Result<Value> {
        self.call(command, params)
            .await?
            .map_err(|e| kind(format!("`{}` failed: {}", command, e.describe())))
    }

    async fn send_text(&self, text: String) -> Result<()> {
        let mut guard = self.connection.lock().await;
        let connection = guard
            .as_mut()
            .ok_or_else(|| IdentityError::Connection("not connected".into()))?;
        connection
            .sink
            .send(Message::Text(text))
            .await
            .map_err(|e| IdentityError::Connection(format!("send failed: {}", e)))
    }

    async fn current_ledger_index(&self) -> Result<u64> {
        let result = self
            .request("ledger_current", json!({}), IdentityError::LedgerSubmission)
            .await?;
        result
            .get("ledger_current_index")
            .and_then(Value::as_u64)
            .ok_or_else(|| IdentityError::LedgerSubmission("missing ledger_current_index".into()))
    }
}

async fn read_loop(mut source: SplitStream<WsStream>, shared: Arc<Shared>) {
    while let Some(frame) = source.next().await {
        match frame {
            Ok(Message::Text(text)) => shared.dispatch(&text),
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                warn!("Ledger socket error: {}", e);
                break;
            }
        }
    }
    shared.connection_lost();
}

/// Reads a fee drops value that rippled may return as a string or number.
fn drops_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[async_trait]
impl LedgerAdapter for XrplClient {
    async fn connect(&self) -> Result<()> {
        // Holding the connection lock serializes concurrent connect attempts.
        let mut guard = self.connection.lock().await;
        if self.shared.connected.load(Ordering::SeqCst) {
            return Ok(());
        }
        if let Some(stale) = guard.take() {
            stale.reader.abort();
        }

        let (stream, _) = connect_async(self.url.as_str())
            .await
            .map_err(|e| IdentityError::Connection(format!("{}: {}", self.url, e)))?;
        let (sink, source) = stream.split();

        self.shared.closing.store(false, Ordering::SeqCst);
        self.shared.connected.store(true, Ordering::SeqCst);
        let reader = tokio::spawn(read_loop(source, self.shared.clone()));
        *guard = Some(Connection { sink, reader });

        info!("Connected to ledger at {}", self.url);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    fn on_disconnect(&self, handler: DisconnectHandler) {
        if let Ok(mut handlers) = self.shared.handlers.lock() {
            handlers.push(handler);
        }
    }

    fn identity(&self) -> Option<LedgerIdentity> {
        self.wallet.as_ref().map(|w| w.identity.clone())
    }

    async fn sign(&self, tx: &Value) -> Result<SignedTransaction> {
        let wallet = self.wallet()?;
        let params = json!({
            "tx_json": tx,
            "secret": wallet.seed.as_str(),
            "offline": false,
        });
        let result = self.request("sign", params, IdentityError::Signing).await?;

        let signed_blob = result
            .get("tx_blob")
            .and_then(Value::as_str)
            .ok_or_else(|| IdentityError::Signing("response has no tx_blob".into()))?;
        let hash = result
            .pointer("/tx_json/hash")
            .and_then(Value::as_str)
            .ok_or_else(|| IdentityError::Signing("response has no transaction hash".into()))?;

        Ok(SignedTransaction {
            hash: hash.to_string(),
            signed_blob: signed_blob.to_string(),
        })
    }

    async fn autofill(&self, tx: Value) -> Result<Value> {
        let Value::Object(mut tx) = tx else {
            return Err(IdentityError::LedgerSubmission(
                "transaction must be a JSON object".into(),
            ));
        };

        let account = match tx.get("Account").and_then(Value::as_str) {
            Some(account) => account.to_string(),
            None => self.wallet()?.identity.address.clone(),
        };
        tx.insert("Account".into(), account.clone().into());

        if !tx.contains_key("Sequence") {
            let info = self
                .request(
                    "account_info",
                    json!({ "account": account, "ledger_index": "current" }),
                    IdentityError::LedgerSubmission,
                )
                .await?;
            let sequence = info
                .pointer("/account_data/Sequence")
                .and_then(Value::as_u64)
                .ok_or_else(|| IdentityError::LedgerSubmission("missing account sequence".into()))?;
            tx.insert("Sequence".into(), sequence.into());
        }

        if !tx.contains_key("Fee") {
            let fee = self
                .request("fee", json!({}), IdentityError::LedgerSubmission)
                .await?;
            let drops = fee
                .pointer("/drops/open_ledger_fee")
                .and_then(drops_value)
                .or_else(|| fee.pointer("/drops/base_fee").and_then(drops_value))
                .ok_or_else(|| IdentityError::LedgerSubmission("missing fee drops".into()))?;
            tx.insert("Fee".into(), drops.into());
        }

        if !tx.contains_key("LastLedgerSequence") {
            let current = self.current_ledger_index().await?;
            tx.insert("LastLedgerSequence".into(), (current + LEDGER_OFFSET).into());
        }

        Ok(Value::Object(tx))
    }

    async fn submit_and_wait(&self, signed_blob: &str) -> Result<TransactionReceipt> {
        let submitted = self
            .request(
                "submit",
                json!({ "tx_blob": signed_blob }),
                IdentityError::LedgerSubmission,
            )
            .await?;

        let engine_result = submitted
            .get("engine_result")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if TERMINAL_RESULT_PREFIXES
            .iter()
            .any(|prefix| engine_result.starts_with(prefix))
        {
            let message = submitted
                .get("engine_result_message")
                .and_then(Value::as_str)
                .unwrap_or_default();
            return Err(IdentityError::LedgerSubmission(format!(
                "{}: {}",
                engine_result, message
            )));
        }

        let hash = submitted
            .pointer("/tx_json/hash")
            .and_then(Value::as_str)
            .ok_or_else(|| IdentityError::LedgerSubmission("submit returned no hash".into()))?
            .to_string();
        let last_ledger = submitted
            .pointer("/tx_json/LastLedgerSequence")
            .and_then(Value::as_u64);
        info!("Submitted transaction {} ({})", hash, engine_result);

        loop {
            tokio::time::sleep(self.poll_interval).await;

            match self.call("tx", json!({ "transaction": hash })).await? {
                Ok(result) => {
                    let receipt = TransactionReceipt(result);
                    if receipt.is_validated() {
                        info!(
                            "Transaction {} validated with {}",
                            hash,
                            receipt.result_code().unwrap_or("unknown result")
                        );
                        return Ok(receipt);
                    }
                }
                Err(e) if e.code == "txnNotFound" => {}
                Err(e) => {
                    return Err(IdentityError::LedgerSubmission(format!(
                        "`tx` failed: {}",
                        e.describe()
                    )))
                }
            }

            if let Some(last) = last_ledger {
                if self.current_ledger_index().await? > last {
                    return Err(IdentityError::LedgerSubmission(format!(
                        "transaction {} expired after ledger {}",
                        hash, last
                    )));
                }
            }
        }
    }

    async fn disconnect(&self) -> Result<()> {
        self.shared.closing.store(true, Ordering::SeqCst);
        let mut guard = self.connection.lock().await;
        if let Some(mut connection) = guard.take() {
            if let Err(e) = connection.sink.close().await {
                debug!("Close frame not delivered: {}", e);
            }
            connection.reader.abort();
        }
        self.shared.connected.store(false, Ordering::SeqCst);
        if let Ok(mut pending) = self.shared.pending.lock() {
            pending.clear();
        }
        info!("Disconnected from ledger at {}", self.url);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tokio::net::TcpListener;

    const ADDRESS: &str = "rPEPPER7kfTD9w2To4CQk6UCfuHM9c6GDY";

    fn mock_reply(request: &Value) -> Option<Value> {
        let id = request["id"].clone();
        let result = match request["command"].as_str()? {
            "drop_connection" => return None,
            "account_info" => json!({ "account_data": { "Account": ADDRESS, "Sequence": 7 } }),
            "fee" => json!({ "drops": { "base_fee": "10", "open_ledger_fee": "12" } }),
            "ledger_current" => json!({ "ledger_current_index": 100 }),
            "sign" => {
                if request["secret"] != "sEdSEED" {
                    return Some(json!({
                        "id": id, "status": "error", "type": "response",
                        "error": "badSecret", "error_message": "Secret does not match account."
                    }));
                }
                let mut tx_json = request["tx_json"].clone();
                tx_json["hash"] = json!("AB12");
                json!({ "tx_blob": "120000DEADBEEF", "tx_json": tx_json })
            }
            "submit" => {
                if request["tx_blob"] == "MALFORMED" {
                    json!({ "engine_result": "temMALFORMED",
                            "engine_result_message": "Malformed transaction." })
                } else {
                    json!({ "engine_result": "tesSUCCESS",
                            "tx_json": { "hash": "AB12", "LastLedgerSequence": 120 } })
                }
            }
            "tx" => json!({ "hash": "AB12", "validated": true,
                            "meta": { "TransactionResult": "tesSUCCESS" } }),
            _ => json!({}),
        };
        Some(json!({ "id": id, "status": "success", "type": "response", "result": result }))
    }

    async fn spawn_mock_rippled() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
                    while let Some(Ok(Message::Text(text))) = ws.next().await {
                        let request: Value = serde_json::from_str(&text).unwrap();
                        match mock_reply(&request) {
                            Some(reply) => ws.send(Message::Text(reply.to_string())).await.unwrap(),
                            None => break,
                        }
                    }
                });
            }
        });
        format!("ws://{}", addr)
    }

    fn wallet() -> XrplWallet {
        XrplWallet::new("sEdSEED", ADDRESS, "ED01FA53").unwrap()
    }

    #[test]
    fn test_wallet_rejects_empty_address() {
        let err = XrplWallet::new("sEdSEED", "  ", "ED01").err().unwrap();
        assert!(matches!(err, IdentityError::InvalidAddress(_)));
    }

    #[test]
    fn test_wallet_from_settings_without_seed() {
        let settings = LedgerSettings::default();
        assert!(XrplWallet::from_settings(&settings).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_autofill_fills_missing_fields() {
        let url = spawn_mock_rippled().await;
        let client = XrplClient::new(&url, Some(wallet()), Duration::from_millis(5));

        let tx = client
            .autofill(json!({ "TransactionType": "DIDSet", "URI": "00" }))
            .await
            .unwrap();

        assert!(client.is_connected());
        assert_eq!(tx["Account"], ADDRESS);
        assert_eq!(tx["Sequence"], 7);
        assert_eq!(tx["Fee"], "12");
        assert_eq!(tx["LastLedgerSequence"], 120);
    }

    #[tokio::test]
    async fn test_sign_and_submit_round_trip() {
        let url = spawn_mock_rippled().await;
        let client = XrplClient::new(&url, Some(wallet()), Duration::from_millis(5));

        let signed = client.sign(&json!({ "TransactionType": "Payment" })).await.unwrap();
        assert_eq!(signed.hash, "AB12");
        assert_eq!(signed.signed_blob, "120000DEADBEEF");

        let receipt = client.submit_and_wait(&signed.signed_blob).await.unwrap();
        assert!(receipt.is_validated());
        assert_eq!(receipt.result_code(), Some("tesSUCCESS"));
    }

    #[tokio::test]
    async fn test_malformed_submission_is_rejected() {
        let url = spawn_mock_rippled().await;
        let client = XrplClient::new(&url, Some(wallet()), Duration::from_millis(5));
        let err = client.submit_and_wait("MALFORMED").await.unwrap_err();
        assert!(matches!(err, IdentityError::LedgerSubmission(msg) if msg.starts_with("temMALFORMED")));
    }

    #[tokio::test]
    async fn test_sign_error_maps_to_signing_kind() {
        let url = spawn_mock_rippled().await;
        let wrong = XrplWallet::new("sWRONG", ADDRESS, "ED01").unwrap();
        let client = XrplClient::new(&url, Some(wrong), Duration::from_millis(5));
        let err = client.sign(&json!({})).await.unwrap_err();
        assert!(matches!(err, IdentityError::Signing(msg) if msg.contains("badSecret")));
    }

    #[tokio::test]
    async fn test_sign_without_wallet_is_missing_identity() {
        let client = XrplClient::new("ws://127.0.0.1:1", None, Duration::from_millis(5));
        assert!(client.identity().is_none());
        let err = client.sign(&json!({})).await.unwrap_err();
        assert!(matches!(err, IdentityError::MissingIdentity(_)));
    }

    #[tokio::test]
    async fn test_connection_loss_fires_handlers_and_fails_request() {
        let url = spawn_mock_rippled().await;
        let client = XrplClient::new(&url, Some(wallet()), Duration::from_millis(5));
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        client.on_disconnect(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        let err = client.call("drop_connection", json!({})).await.unwrap_err();
        assert!(matches!(err, IdentityError::Connection(_)));
        assert!(!client.is_connected());
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_register_after_connection_lost_fails() {
        let url = spawn_mock_rippled().await;
        let client = XrplClient::new(&url, Some(wallet()), Duration::from_millis(5));
        client.connect().await.unwrap();
        assert!(client.shared.register(1).is_ok());

        client.shared.connection_lost();
        let err = client.shared.register(2).unwrap_err();
        assert!(matches!(err, IdentityError::Connection(_)));
        assert!(client.shared.pending.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_call_after_drop_does_not_hang() {
        let url = spawn_mock_rippled().await;
        let client = XrplClient::new(&url, Some(wallet()), Duration::from_millis(5));
        let _ = client.call("drop_connection", json!({})).await;

        let reply = tokio::time::timeout(Duration::from_secs(5), client.call("fee", json!({})))
            .await
            .expect("call must resolve after a dropped connection");
        assert!(reply.is_ok());
    }

    #[tokio::test]
    async fn test_explicit_disconnect_is_silent() {
        let url = spawn_mock_rippled().await;
        let client = XrplClient::new(&url, Some(wallet()), Duration::from_millis(5));
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        client.on_disconnect(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        client.connect().await.unwrap();
        client.disconnect().await.unwrap();
        assert!(!client.is_connected());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}

// src/services/anchoring.rs
//! Anchoring pipeline.
//!
//! Moves one [`AnchorRecord`] through
//! `DRAFT -> UPLOADED -> TX_SUBMITTED -> FINALIZED`:
//!
//! 1. upload the record to content-addressed storage
//! 2. submit a `DIDSet` transaction pointing at the upload
//! 3. store the validated receipt on the record and upload it again
//!
//! The first content id stays the canonical `storageUri`; the re-upload's
//! id is kept separately. Steps called out of order fail without touching
//! the record, and a failed step leaves the anchor where it was.

use crate::blockchain::ledger::{LedgerAdapter, TransactionReceipt};
use crate::error::{IdentityError, Result};
use crate::models::anchor::{AnchorRecord, AnchorState};
use crate::models::credential::VerifiableCredential;
use crate::models::did::DIDDocument;
use crate::storage::{StorageAdapter, UploadFile};
use chrono::Utc;
use log::info;
use serde_json::{json, Value};

/// One anchoring run and its receipts.
#[derive(Debug, Clone)]
pub struct Anchor {
    record: AnchorRecord,
    state: AnchorState,
    content_id: Option<String>,
    finalized_content_id: Option<String>,
}

impl Anchor {
    /// Starts a run for a DID document and its encrypted credential.
    pub fn draft(did_document: DIDDocument, verifiable_credential: VerifiableCredential) -> Self {
        Self {
            record: AnchorRecord::draft(did_document, verifiable_credential),
            state: AnchorState::Draft,
            content_id: None,
            finalized_content_id: None,
        }
    }

    pub fn state(&self) -> AnchorState {
        self.state
    }

    pub fn record(&self) -> &AnchorRecord {
        &self.record
    }

    pub fn into_record(self) -> AnchorRecord {
        self.record
    }

    /// Content id of the first upload.
    pub fn content_id(&self) -> Option<&str> {
        self.content_id.as_deref()
    }

    /// Content id of the post-finalization upload.
    pub fn finalized_content_id(&self) -> Option<&str> {
        self.finalized_content_id.as_deref()
    }

    /// Uploads the draft record and fills in its storage URIs.
    ///
    /// # Errors
    /// `StorageUpload` if the anchor is not a draft or the upload fails.
    pub async fn upload(&mut self, storage: &dyn StorageAdapter) -> Result<()> {
        if self.state != AnchorState::Draft {
            return Err(self.out_of_order("upload", IdentityError::StorageUpload));
        }
        let name = format!("{}.json", Utc::now().timestamp_millis());
        let content_id = self.put(storage, name).await?;

        self.record.storage_uri = Some(format!("ipfs://{}", content_id));
        self.record.gateway_uri = Some(storage.gateway_url(&content_id));
        self.content_id = Some(content_id);
        self.transition(AnchorState::Uploaded);
        Ok(())
    }

    /// Submits the `DIDSet` transaction and waits for validation.
    ///
    /// # Errors
    /// - `LedgerSubmission` if called out of order or the ledger rejects the transaction
    /// - `MissingIdentity` if the ledger has no wallet
    /// - `Signing` if the transaction could not be signed
    pub async fn submit_transaction(&mut self, ledger: &dyn LedgerAdapter) -> Result<TransactionReceipt> {
        if self.state != AnchorState::Uploaded {
            return Err(self.out_of_order("submit", IdentityError::LedgerSubmission));
        }
        let identity = ledger
            .identity()
            .ok_or_else(|| IdentityError::MissingIdentity("no ledger wallet configured".into()))?;
        let storage_uri = self.record.storage_uri.clone().unwrap_or_default();

        let tx = did_set_transaction(&identity.address, &self.record.did_document, &storage_uri)?;
        let prepared = ledger.autofill(tx).await?;
        let signed = ledger.sign(&prepared).await?;
        self.transition(AnchorState::TxSubmitted);

        let receipt = ledger.submit_and_wait(&signed.signed_blob).await?;
        self.record.transaction = Some(receipt.clone());
        self.transition(AnchorState::Finalized);
        Ok(receipt)
    }

    /// Re-uploads the finalized record. The new id never replaces `storageUri`.
    ///
    /// # Errors
    /// `StorageUpload` if the anchor is not finalized, was already
    /// re-uploaded, or the upload fails.
    pub async fn publish_final(&mut self, storage: &dyn StorageAdapter) -> Result<String> {
        if self.state != AnchorState::Finalized || self.finalized_content_id.is_some() {
            return Err(self.out_of_order("publish final record", IdentityError::StorageUpload));
        }
        let name = format!("{}_final.json", Utc::now().timestamp_millis());
        let content_id = self.put(storage, name).await?;
        info!("Final record for {} stored as {}", self.record.did, content_id);
        self.finalized_content_id = Some(content_id.clone());
        Ok(content_id)
    }

    /// Runs every remaining step in order.
    pub async fn run(&mut self, ledger: &dyn LedgerAdapter, storage: &dyn StorageAdapter) -> Result<()> {
        if self.state == AnchorState::Draft {
            self.upload(storage).await?;
        }
        if self.state == AnchorState::Uploaded {
            self.submit_transaction(ledger).await?;
        }
        if self.finalized_content_id.is_none() {
            self.publish_final(storage).await?;
        }
        Ok(())
    }

    async fn put(&self, storage: &dyn StorageAdapter, name: String) -> Result<String> {
        let bytes = serde_json::to_vec(&self.record)
            .map_err(|e| IdentityError::StorageUpload(e.to_string()))?;
        Ok(storage.upload(UploadFile::json(name, bytes)).await?.content_id)
    }

    fn transition(&mut self, next: AnchorState) {
        info!("Anchor {}: {} -> {}", self.record.did, self.state, next);
        self.state = next;
    }

    fn out_of_order(&self, step: &str, kind: fn(String) -> IdentityError) -> IdentityError {
        kind(format!("cannot {} an anchor in state {}", step, self.state))
    }
}

/// `DIDSet` transaction carrying the hex-encoded DID document and storage URI.
pub fn did_set_transaction(account: &str, did_document: &DIDDocument, storage_uri: &str) -> Result<Value> {
    let document = serde_json::to_vec(did_document)
        .map_err(|e| IdentityError::LedgerSubmission(e.to_string()))?;
    Ok(json!({
        "TransactionType": "DIDSet",
        "Account": account,
        "DIDDocument": hex::encode(document),
        "URI": hex::encode(storage_uri.as_bytes()),
    }))
}

// src/models/anchor.rs
//! Anchor record persisted to content-addressed storage.

use crate::blockchain::ledger::TransactionReceipt;
use crate::models::credential::VerifiableCredential;
use crate::models::did::DIDDocument;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Bundle uploaded to storage for one anchored identity.
///
/// Created with every nullable field empty, then mutated twice: the first
/// upload fills the storage URIs, and ledger finalization fills
/// `transaction` before the second upload.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnchorRecord {
    pub did: String,
    pub did_document: DIDDocument,
    /// Credential with an encrypted `credentialSubject`
    pub verifiable_credential: VerifiableCredential,
    pub transaction: Option<TransactionReceipt>,
    /// `ipfs://<cid>` of the first upload; the canonical reference
    pub storage_uri: Option<String>,
    pub gateway_uri: Option<String>,
}

impl AnchorRecord {
    /// Builds the upload-pending record for a DID document and its credential.
    pub fn draft(did_document: DIDDocument, verifiable_credential: VerifiableCredential) -> Self {
        Self {
            did: did_document.id.clone(),
            did_document,
            verifiable_credential,
            transaction: None,
            storage_uri: None,
            gateway_uri: None,
        }
    }
}

/// Anchoring lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AnchorState {
    /// Record built in memory, nothing persisted
    Draft,
    /// First upload done, storage URIs known
    Uploaded,
    /// DIDSet transaction signed and handed to the ledger
    TxSubmitted,
    /// Ledger validated the transaction and the receipt is on the record
    Finalized,
}

impl fmt::Display for AnchorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AnchorState::Draft => "DRAFT",
            AnchorState::Uploaded => "UPLOADED",
            AnchorState::TxSubmitted => "TX_SUBMITTED",
            AnchorState::Finalized => "FINALIZED",
        };
        f.write_str(name)
    }
}

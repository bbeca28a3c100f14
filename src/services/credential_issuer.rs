// src/services/credential_issuer.rs
//! Credential Issuer Service
//!
//! Builds Verifiable Credentials from a template and binds them to the
//! session's ledger identity with a signature-backed proof.
//!
//! The proof value is the hash of a ledger transaction that carries the
//! signed data in a memo: a zero-amount payment from the wallet to itself.
//! The transaction is signed but never submitted, so the hash only proves
//! the wallet signed that exact payload.

use crate::blockchain::ledger::LedgerAdapter;
use crate::error::{IdentityError, Result};
use crate::models::credential::{
    CredentialSubject, CredentialTemplate, Proof, SignedData, VerifiableCredential, PROOF_PURPOSE,
    PROOF_TYPE,
};
use async_trait::async_trait;
use log::{debug, info};
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

/// Formats `did:<method>:<address>`.
pub fn did_for(method: &str, address: &str) -> String {
    format!("did:{}:{}", method, address)
}

/// Produces the `proofValue` for a credential.
#[async_trait]
pub trait ProofSigner: Send + Sync {
    /// DID of the signing identity; the proof's verification method hangs off it.
    ///
    /// # Errors
    /// `MissingIdentity` when no identity is available.
    fn signer_did(&self) -> Result<String>;

    /// Signs `data` and returns the proof value.
    async fn sign_proof(&self, data: &SignedData) -> Result<String>;
}

/// Signs proofs with the session wallet through the ledger adapter.
pub struct LedgerProofSigner {
    ledger: Arc<dyn LedgerAdapter>,
    did_method: String,
}

impl LedgerProofSigner {
    /// # Arguments
    /// * `ledger` - Adapter holding the session wallet
    /// * `did_method` - DID method for the signer DID, e.g. `xrpl`
    pub fn new(ledger: Arc<dyn LedgerAdapter>, did_method: &str) -> Self {
        Self {
            ledger,
            did_method: did_method.to_string(),
        }
    }

    fn address(&self) -> Result<String> {
        self.ledger
            .identity()
            .map(|identity| identity.address)
            .ok_or_else(|| IdentityError::MissingIdentity("no ledger wallet configured".into()))
    }
}

/// Zero-amount self-payment whose single memo carries `hex(JSON(data))`.
pub fn memo_transaction(address: &str, data: &SignedData) -> Result<Value> {
    let payload = serde_json::to_vec(data).map_err(|e| IdentityError::Signing(e.to_string()))?;
    Ok(json!({
        "TransactionType": "Payment",
        "Account": address,
        "Destination": address,
        "Amount": "0",
        "Memos": [{ "Memo": { "MemoData": hex::encode(payload) } }],
    }))
}

#[async_trait]
impl ProofSigner for LedgerProofSigner {
    fn signer_did(&self) -> Result<String> {
        Ok(did_for(&self.did_method, &self.address()?))
    }

    async fn sign_proof(&self, data: &SignedData) -> Result<String> {
        let address = self.address()?;
        let tx = memo_transaction(&address, data)?;
        let signed = self.ledger.sign(&tx).await?;
        debug!("Proof for {} signed as {}", data.id, signed.hash);
        Ok(signed.hash)
    }
}

/// Builds and signs a credential.
///
/// # Arguments
/// * `template` - Context, type tags and default subject fields
/// * `issuer_did` - Value of the `issuer` field
/// * `subject_did` - Written to `credentialSubject.id`, overriding the template
/// * `signer` - Produces the proof value
///
/// # Returns
/// A credential with a fresh `urn:uuid` id and a plaintext subject.
///
/// # Errors
/// - `MissingIdentity` if the signer has no identity
/// - `Signing` if the signature could not be produced
pub async fn build_credential(
    template: &CredentialTemplate,
    issuer_did: &str,
    subject_did: &str,
    signer: &dyn ProofSigner,
) -> Result<VerifiableCredential> {
    let signer_did = signer.signer_did()?;
    let id = format!("urn:uuid:{}", Uuid::new_v4());

    let mut claims = template.credential_subject.clone();
    claims.insert("id".to_string(), Value::String(subject_did.to_string()));

    let signed_data = SignedData {
        id: id.clone(),
        credential_type: template.credential_type.clone(),
    };
    let proof_value = signer.sign_proof(&signed_data).await?;

    info!("Issued credential {} to {}", id, subject_did);
    Ok(VerifiableCredential {
        context: template.context.clone(),
        id,
        credential_type: template.credential_type.clone(),
        issuer: issuer_did.to_string(),
        credential_subject: CredentialSubject::Claims(claims),
        proof: Proof {
            proof_type: PROOF_TYPE.to_string(),
            verification_method: format!("{}#key-1", signer_did),
            proof_purpose: PROOF_PURPOSE.to_string(),
            proof_value,
            signed_data,
        },
    })
}

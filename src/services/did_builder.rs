// src/services/did_builder.rs
//! DID document construction.
//!
//! Documents are derived from the ledger address alone, so the same address
//! and key always produce byte-identical documents.

use crate::error::{IdentityError, Result};
use crate::models::did::{DIDDocument, VerificationMethod, DID_CONTEXT, VERIFICATION_KEY_TYPE};
use crate::services::credential_issuer::did_for;

/// Multibase prefix for lowercase base16.
const MULTIBASE_BASE16: char = 'f';

/// Encodes key bytes as multibase base16-lower.
pub fn multibase_hex(bytes: &[u8]) -> String {
    format!("{}{}", MULTIBASE_BASE16, hex::encode(bytes))
}

/// Builds the DID document for a ledger address.
///
/// # Arguments
/// * `method` - DID method, e.g. `xrpl`
/// * `address` - Classic ledger address of the wallet
/// * `public_key` - Wallet public key bytes
///
/// # Errors
/// `InvalidAddress` if `address` is empty. Any other address is used as-is.
pub fn build_did_document(method: &str, address: &str, public_key: &[u8]) -> Result<DIDDocument> {
    if address.is_empty() {
        return Err(IdentityError::InvalidAddress("ledger address is empty".into()));
    }
    let did = did_for(method, address);

    Ok(DIDDocument {
        context: vec![DID_CONTEXT.to_string()],
        authentication: vec![VerificationMethod {
            id: format!("{}#key-1", did),
            method_type: VERIFICATION_KEY_TYPE.to_string(),
            controller: did.clone(),
            public_key_multibase: multibase_hex(public_key),
        }],
        id: did,
    })
}

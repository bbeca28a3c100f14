// src/models/did.rs
//! Decentralized Identifier (DID) data model implementation.
//!
//! Defines the DID Document shape anchored on the ledger, following the
//! [DID Core Specification](https://www.w3.org/TR/did-core/).

use serde::{Deserialize, Serialize};

/// JSON-LD context of every DID document this crate produces.
pub const DID_CONTEXT: &str = "https://www.w3.org/ns/did/v1";

/// Verification method type advertised for the ledger key.
pub const VERIFICATION_KEY_TYPE: &str = "Ed25519VerificationKey2020";

/// A DID Document representing a ledger-bound identity.
///
/// # DID Format
/// ```text
/// did:<method>:<address>
/// ```
/// `id` and every `authentication[..].controller` carry the same DID.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct DIDDocument {
    #[serde(rename = "@context")]
    pub context: Vec<String>,

    /// The complete DID string identifier
    pub id: String,

    pub authentication: Vec<VerificationMethod>,
}

/// Authentication entry of a DID document.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VerificationMethod {
    /// DID URL, `<did>#key-1`
    pub id: String,
    #[serde(rename = "type")]
    pub method_type: String,
    pub controller: String,
    pub public_key_multibase: String,
}

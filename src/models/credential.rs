// src/models/credential.rs
//! Verifiable Credential data model implementation.
//!
//! Follows the JSON shape of the [W3C Verifiable Credentials Data Model](https://www.w3.org/TR/vc-data-model/)
//! with a ledger-backed proof. The `credentialSubject` field is either the
//! plaintext claim object or, after selective encryption, an opaque hex string.

use crate::error::{IdentityError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;

/// Proof suite identifier written into every issued credential.
pub const PROOF_TYPE: &str = "XrplSignature2023";

/// Proof purpose written into every issued credential.
pub const PROOF_PURPOSE: &str = "assertionMethod";

/// Credential `type` value: either a single tag or a list of tags.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum CredentialType {
    Single(String),
    Many(Vec<String>),
}

impl CredentialType {
    /// Returns true when `tag` is one of the credential's type tags.
    pub fn contains(&self, tag: &str) -> bool {
        match self {
            CredentialType::Single(t) => t == tag,
            CredentialType::Many(tags) => tags.iter().any(|t| t == tag),
        }
    }
}

/// The attribute block of a credential.
///
/// A credential never holds both forms: encryption replaces the claim map
/// with ciphertext and decryption restores it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum CredentialSubject {
    /// Hex-encoded ECIES ciphertext of the JSON claim object
    Encrypted(String),
    Claims(Map<String, Value>),
}

impl CredentialSubject {
    pub fn is_encrypted(&self) -> bool {
        matches!(self, CredentialSubject::Encrypted(_))
    }

    /// Plaintext claims, if the subject is not encrypted.
    pub fn claims(&self) -> Option<&Map<String, Value>> {
        match self {
            CredentialSubject::Claims(claims) => Some(claims),
            CredentialSubject::Encrypted(_) => None,
        }
    }

    /// Ciphertext, if the subject is encrypted.
    pub fn ciphertext(&self) -> Option<&str> {
        match self {
            CredentialSubject::Encrypted(hex) => Some(hex),
            CredentialSubject::Claims(_) => None,
        }
    }
}

/// Data covered by the proof signature. Built fresh for every credential.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SignedData {
    pub id: String,
    #[serde(rename = "type")]
    pub credential_type: CredentialType,
}

/// Ledger-backed proof embedded in a credential.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Proof {
    #[serde(rename = "type")]
    pub proof_type: String,
    /// DID URL of the signing key, e.g. `did:xrpl:r...#key-1`
    pub verification_method: String,
    pub proof_purpose: String,
    /// Hash of the signed ledger transaction carrying `signed_data`
    pub proof_value: String,
    /// Echo of the exact data that was signed
    pub signed_data: SignedData,
}

/// A Verifiable Credential bound to a ledger identity.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VerifiableCredential {
    #[serde(rename = "@context", default, skip_serializing_if = "Vec::is_empty")]
    pub context: Vec<String>,

    /// `urn:uuid:<v4>`, unique per issuance
    pub id: String,

    #[serde(rename = "type")]
    pub credential_type: CredentialType,

    /// DID of the issuer
    pub issuer: String,

    pub credential_subject: CredentialSubject,

    pub proof: Proof,
}

/// Static credential schema: type tags and default subject fields.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CredentialTemplate {
    #[serde(rename = "@context", default, skip_serializing_if = "Vec::is_empty")]
    pub context: Vec<String>,

    #[serde(rename = "type")]
    pub credential_type: CredentialType,

    #[serde(default)]
    pub credential_subject: Map<String, Value>,
}

impl CredentialTemplate {
    /// Parses a template from its JSON text.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| IdentityError::Config(format!("invalid credential template: {}", e)))
    }

    /// Loads a template from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            IdentityError::Config(format!("cannot read template {}: {}", path.display(), e))
        })?;
        Self::from_json(&json)
    }
}

impl Default for CredentialTemplate {
    /// Identity credential carrying the attributes the eligibility checks use.
    fn default() -> Self {
        let mut subject = Map::new();
        subject.insert("birthDate".into(), Value::String("2000-01-01".into()));
        subject.insert("nationality".into(), Value::String("French".into()));

        Self {
            context: vec!["https://www.w3.org/2018/credentials/v1".to_string()],
            credential_type: CredentialType::Many(vec![
                "VerifiableCredential".to_string(),
                "IdentityCredential".to_string(),
            ]),
            credential_subject: subject,
        }
    }
}

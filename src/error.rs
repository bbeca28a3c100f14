// src/error.rs
//! Error taxonomy for the identity pipeline.
//!
//! Every component operation either succeeds or fails with exactly one of
//! these kinds. Human-readable status text is produced by the caller, not
//! inside the components.

use thiserror::Error;

/// Failure kinds surfaced by the credential, anchoring and predicate
/// components.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// The ledger connection could not be established or was lost mid-request.
    #[error("ledger connection error: {0}")]
    Connection(String),

    /// No ledger identity (wallet) is available to sign with.
    #[error("missing signing identity: {0}")]
    MissingIdentity(String),

    #[error("signing error: {0}")]
    Signing(String),

    #[error("encryption error: {0}")]
    Encryption(String),

    /// Wrong key, corrupt ciphertext, or malformed JSON after decryption.
    #[error("decryption error: {0}")]
    Decryption(String),

    #[error("storage upload error: {0}")]
    StorageUpload(String),

    #[error("ledger submission error: {0}")]
    LedgerSubmission(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("key generation error: {0}")]
    KeyGeneration(String),

    /// Settings could not be loaded. Only raised while building a session.
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<config::ConfigError> for IdentityError {
    fn from(e: config::ConfigError) -> Self {
        IdentityError::Config(e.to_string())
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, IdentityError>;

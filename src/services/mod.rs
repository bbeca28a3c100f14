// src/services/mod.rs
//! Issuance, encryption, anchoring and predicate services.

pub mod anchoring;
pub mod credential_issuer;
pub mod did_builder;
pub mod selective_encryption;
pub mod session;
pub mod verifier;

pub use anchoring::Anchor;
pub use credential_issuer::{build_credential, LedgerProofSigner, ProofSigner};
pub use did_builder::build_did_document;
pub use selective_encryption::{decrypt_subject, encrypt_subject};
pub use session::IdentitySession;
pub use verifier::{evaluate, evaluate_at, Nationality, Predicate, PredicateOutcome};

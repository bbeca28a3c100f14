// src/models/mod.rs
//! Wire data structures: credentials, DID documents and anchor records.

pub mod anchor;
pub mod credential;
pub mod did;

pub use anchor::{AnchorRecord, AnchorState};
pub use credential::{
    CredentialSubject, CredentialTemplate, CredentialType, Proof, SignedData,
    VerifiableCredential,
};
pub use did::{DIDDocument, VerificationMethod};

// src/lib.rs

//! # did-anchor
//!
//! Issues a verifiable credential bound to an XRP Ledger identity, encrypts
//! its attribute block, anchors a DID document on the ledger and answers
//! eligibility questions from the stored ciphertext.
//!
//! ## Layout
//! 1. **Blockchain Layer**: ledger adapter contract, XRPL WebSocket client, reconnect supervision
//! 2. **Wallet Layer**: encryption key generation and the session secret store
//! 3. **Storage Layer**: content-addressed uploads (Pinata, IPFS node, in-memory)
//! 4. **Services Layer**: credential builder, selective encryption, DID documents,
//!    anchoring pipeline, predicate evaluation and the session context tying them together

pub mod blockchain;
pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod storage;
pub mod utils;
pub mod wallet;

pub use error::{IdentityError, Result};

// src/wallet/mod.rs
//! Session key material.

pub mod key_management;
pub mod secret_store;

pub use key_management::{generate_key_pair, EncryptionKeyPair};
pub use secret_store::{InMemorySecretStore, SecretStore, ENCRYPTION_KEY};

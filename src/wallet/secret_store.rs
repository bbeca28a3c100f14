// src/wallet/secret_store.rs
//! Secret storage for the session wallet.
//!
//! The session keeps its private key behind this capability so the
//! persistence policy is an explicit choice. The default store is
//! in-memory only: the key is gone when the session ends.

use std::collections::HashMap;
use zeroize::Zeroizing;

/// Name under which the session's encryption private key is stored.
pub const ENCRYPTION_KEY: &str = "encryption-key";

/// Pluggable `get`/`put`/`clear` store for secret bytes.
pub trait SecretStore: Send + Sync {
    /// Returns a copy of the secret stored under `name`.
    fn get(&self, name: &str) -> Option<Zeroizing<Vec<u8>>>;

    /// Stores a secret, replacing any previous value under the same name.
    fn put(&mut self, name: &str, secret: Zeroizing<Vec<u8>>);

    /// Removes and wipes every stored secret.
    fn clear(&mut self);
}

/// Volatile secret store.
///
/// Values are held in zeroizing buffers, so removing or overwriting an
/// entry wipes the old bytes.
#[derive(Default)]
pub struct InMemorySecretStore {
    secrets: HashMap<String, Zeroizing<Vec<u8>>>,
}

impl InMemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored secrets.
    pub fn len(&self) -> usize {
        self.secrets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.secrets.is_empty()
    }
}

impl SecretStore for InMemorySecretStore {
    fn get(&self, name: &str) -> Option<Zeroizing<Vec<u8>>> {
        self.secrets.get(name).cloned()
    }

    fn put(&mut self, name: &str, secret: Zeroizing<Vec<u8>>) {
        self.secrets.insert(name.to_string(), secret);
    }

    fn clear(&mut self) {
        self.secrets.clear();
    }
}

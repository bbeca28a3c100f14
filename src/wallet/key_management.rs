// src/wallet/key_management.rs
//! Session encryption key management.
//!
//! Generates the secp256k1 key pair used to encrypt credential subjects.
//! Uses the following primitives:
//! - secp256k1 curve (via `k256` crate)
//! - OS random number generator
//!
//! The private half never leaves the session: it is kept in the session's
//! secret store and wiped from memory when dropped.

use crate::error::{IdentityError, Result};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::{PublicKey, SecretKey};
use rand::rngs::OsRng;
use rand::RngCore;
use std::fmt;
use zeroize::Zeroizing;

/// Asymmetric key pair for subject encryption.
///
/// `k256::SecretKey` zeroizes its scalar on drop, so dropping the pair is
/// enough to wipe the private key.
#[derive(Clone)]
pub struct EncryptionKeyPair {
    secret_key: SecretKey,
    public_key: PublicKey,
}

impl EncryptionKeyPair {
    /// Rebuilds a key pair from raw private key bytes.
    ///
    /// # Errors
    /// `KeyGeneration` if the bytes are not a valid non-zero scalar.
    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self> {
        let secret_key = SecretKey::from_slice(bytes).map_err(|_| {
            IdentityError::KeyGeneration("bytes are not a valid secp256k1 private key".into())
        })?;
        let public_key = secret_key.public_key();
        Ok(Self {
            secret_key,
            public_key,
        })
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    pub fn secret_key(&self) -> &SecretKey {
        &self.secret_key
    }

    /// Uncompressed SEC1 public key (65 bytes).
    pub fn public_key_bytes(&self) -> Vec<u8> {
        self.public_key.to_encoded_point(false).as_bytes().to_vec()
    }

    /// Compressed SEC1 public key (33 bytes).
    pub fn public_key_compressed(&self) -> Vec<u8> {
        self.public_key.to_encoded_point(true).as_bytes().to_vec()
    }

    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public_key_bytes())
    }

    /// Private key bytes in a buffer that is wiped on drop.
    pub fn secret_bytes(&self) -> Zeroizing<Vec<u8>> {
        Zeroizing::new(self.secret_key.to_bytes().to_vec())
    }
}

impl fmt::Debug for EncryptionKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionKeyPair")
            .field("public_key", &self.public_key_hex())
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

/// Generates a fresh key pair from the OS random number generator.
///
/// # Errors
/// `KeyGeneration` if the RNG fails or yields an out-of-range scalar.
pub fn generate_key_pair() -> Result<EncryptionKeyPair> {
    let mut bytes = Zeroizing::new([0u8; 32]);
    OsRng
        .try_fill_bytes(bytes.as_mut())
        .map_err(|e| IdentityError::KeyGeneration(format!("system RNG failure: {}", e)))?;
    EncryptionKeyPair::from_secret_bytes(bytes.as_ref())
}

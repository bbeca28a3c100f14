// src/utils/crypto.rs
//! Cryptographic utilities for credential privacy and content addressing.
//!
//! Implements ECIES over secp256k1 in the layout used by common JavaScript
//! wallets (eciesjs defaults), so payloads interoperate:
//!
//! ```text
//! ephemeral public key (65, uncompressed) | nonce (16) | tag (16) | ciphertext
//! ```
//!
//! The symmetric key is HKDF-SHA256 over the uncompressed ephemeral key
//! followed by the uncompressed ECDH shared point. AES-256-GCM with a
//! 16-byte nonce seals the payload.

use crate::error::{IdentityError, Result};
use aes_gcm::aead::consts::U16;
use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::aes::Aes256;
use aes_gcm::{AesGcm, Nonce, Tag};
use hkdf::Hkdf;
use k256::elliptic_curve::group::Curve;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::{PublicKey, SecretKey};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

type Aes256Gcm16 = AesGcm<Aes256, U16>;

const PUBLIC_KEY_LEN: usize = 65;
const NONCE_LEN: usize = 16;
const TAG_LEN: usize = 16;

/// Bytes added to every plaintext by [`encrypt`].
pub const ECIES_OVERHEAD: usize = PUBLIC_KEY_LEN + NONCE_LEN + TAG_LEN;

/// Computes a SHA-256 hash of the input data.
///
/// # Arguments
/// * `data` - Binary data to hash
///
/// # Returns
/// Fixed-size 32-byte array containing the digest.
pub fn hash_data(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// Encrypts `plaintext` to `recipient` with a fresh ephemeral key.
///
/// # Arguments
/// * `recipient` - secp256k1 public key of the reader
/// * `plaintext` - Bytes to seal
///
/// # Returns
/// The ECIES payload, `ECIES_OVERHEAD` bytes longer than the input.
pub fn encrypt(recipient: &PublicKey, plaintext: &[u8]) -> Result<Vec<u8>> {
    let ephemeral = SecretKey::random(&mut OsRng);
    let ephemeral_public = ephemeral.public_key().to_encoded_point(false);
    let key = derive_key(ephemeral_public.as_bytes(), &ephemeral, recipient);

    let mut nonce = [0u8; NONCE_LEN];
    OsRng
        .try_fill_bytes(&mut nonce)
        .map_err(|e| IdentityError::Encryption(format!("system RNG failure: {}", e)))?;

    let cipher = Aes256Gcm16::new_from_slice(key.as_ref())
        .map_err(|e| IdentityError::Encryption(e.to_string()))?;
    let mut buffer = plaintext.to_vec();
    let tag = cipher
        .encrypt_in_place_detached(Nonce::<U16>::from_slice(&nonce), b"", &mut buffer)
        .map_err(|_| IdentityError::Encryption("AES-GCM sealing failed".into()))?;

    let mut payload = Vec::with_capacity(ECIES_OVERHEAD + buffer.len());
    payload.extend_from_slice(ephemeral_public.as_bytes());
    payload.extend_from_slice(&nonce);
    payload.extend_from_slice(tag.as_slice());
    payload.extend_from_slice(&buffer);
    Ok(payload)
}

/// Opens a payload produced by [`encrypt`].
///
/// # Errors
/// `Decryption` if the payload is truncated, the embedded key is not on the
/// curve, or the authentication tag does not match (wrong key or tampering).
pub fn decrypt(secret: &SecretKey, payload: &[u8]) -> Result<Vec<u8>> {
    if payload.len() < ECIES_OVERHEAD {
        return Err(IdentityError::Decryption(format!(
            "payload too short: {} bytes",
            payload.len()
        )));
    }
    let (ephemeral_bytes, rest) = payload.split_at(PUBLIC_KEY_LEN);
    let (nonce, rest) = rest.split_at(NONCE_LEN);
    let (tag, ciphertext) = rest.split_at(TAG_LEN);

    let ephemeral = PublicKey::from_sec1_bytes(ephemeral_bytes)
        .map_err(|_| IdentityError::Decryption("invalid ephemeral public key".into()))?;
    let key = derive_key(ephemeral_bytes, secret, &ephemeral);

    let cipher = Aes256Gcm16::new_from_slice(key.as_ref())
        .map_err(|e| IdentityError::Decryption(e.to_string()))?;
    let mut buffer = ciphertext.to_vec();
    cipher
        .decrypt_in_place_detached(
            Nonce::<U16>::from_slice(nonce),
            b"",
            &mut buffer,
            Tag::from_slice(tag),
        )
        .map_err(|_| IdentityError::Decryption("authentication failed".into()))?;
    Ok(buffer)
}

/// HKDF-SHA256(ephemeral_public || shared_point), both uncompressed.
///
/// `ephemeral_public` is always the sender's ephemeral key; `secret` and
/// `peer` are whichever halves the caller holds.
fn derive_key(ephemeral_public: &[u8], secret: &SecretKey, peer: &PublicKey) -> Zeroizing<[u8; 32]> {
    let shared = (peer.to_projective() * *secret.to_nonzero_scalar()).to_affine();
    let shared = shared.to_encoded_point(false);

    let mut master = Zeroizing::new(Vec::with_capacity(PUBLIC_KEY_LEN * 2));
    master.extend_from_slice(ephemeral_public);
    master.extend_from_slice(shared.as_bytes());

    let mut key = Zeroizing::new([0u8; 32]);
    // 32 bytes is always a valid HKDF-SHA256 output length
    let _ = Hkdf::<Sha256>::new(None, &master).expand(&[], key.as_mut());
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key_pair() -> (SecretKey, PublicKey) {
        let secret = SecretKey::random(&mut OsRng);
        let public = secret.public_key();
        (secret, public)
    }

    #[test]
    fn test_hash_data_known_vector() {
        assert_eq!(
            hex::encode(hash_data(b"abc")),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_encrypt_then_decrypt() {
        let (secret, public) = key_pair();
        let payload = encrypt(&public, b"{\"nationality\":\"French\"}").unwrap();
        assert_eq!(decrypt(&secret, &payload).unwrap(), b"{\"nationality\":\"French\"}");
    }

    #[test]
    fn test_payload_layout() {
        let (_, public) = key_pair();
        let payload = encrypt(&public, &[0u8; 10]).unwrap();
        assert_eq!(payload.len(), ECIES_OVERHEAD + 10);
        assert_eq!(payload[0], 0x04);
    }

    #[test]
    fn test_same_plaintext_differs_each_time() {
        let (_, public) = key_pair();
        assert_ne!(encrypt(&public, b"x").unwrap(), encrypt(&public, b"x").unwrap());
    }

    #[test]
    fn test_wrong_key_fails() {
        let (_, public) = key_pair();
        let (other_secret, _) = key_pair();
        let payload = encrypt(&public, b"secret").unwrap();
        let err = decrypt(&other_secret, &payload).unwrap_err();
        assert!(matches!(err, IdentityError::Decryption(_)));
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let (secret, public) = key_pair();
        let mut payload = encrypt(&public, b"secret").unwrap();
        let last = payload.len() - 1;
        payload[last] ^= 0x01;
        assert!(matches!(decrypt(&secret, &payload), Err(IdentityError::Decryption(_))));
    }

    #[test]
    fn test_truncated_payload_fails() {
        let (secret, _) = key_pair();
        let err = decrypt(&secret, &[0x04; 40]).unwrap_err();
        assert!(matches!(err, IdentityError::Decryption(msg) if msg.contains("too short")));
    }
}

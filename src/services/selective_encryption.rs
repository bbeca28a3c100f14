// src/services/selective_encryption.rs
//! Selective credential encryption.
//!
//! Only `credentialSubject` is sealed; the envelope (id, type, issuer,
//! proof) stays readable so the credential can still be routed and its
//! proof checked. The guarantee is confidentiality from bystanders who read
//! the stored record, not from the key holder.

use crate::error::{IdentityError, Result};
use crate::models::credential::{CredentialSubject, VerifiableCredential};
use crate::utils::crypto;
use k256::{PublicKey, SecretKey};
use serde_json::{Map, Value};

/// Replaces the plaintext subject with its hex-encoded ECIES ciphertext.
///
/// # Errors
/// `Encryption` if the subject is already encrypted or cannot be sealed.
pub fn encrypt_subject(vc: &VerifiableCredential, recipient: &PublicKey) -> Result<VerifiableCredential> {
    let claims = vc.credential_subject.claims().ok_or_else(|| {
        IdentityError::Encryption("credential subject is already encrypted".into())
    })?;
    let ciphertext = seal_claims(claims, recipient)?;

    let mut encrypted = vc.clone();
    encrypted.credential_subject = CredentialSubject::Encrypted(ciphertext);
    Ok(encrypted)
}

/// Restores the plaintext subject of a credential from [`encrypt_subject`].
///
/// # Errors
/// `Decryption` if the subject is plaintext, the ciphertext is malformed,
/// the key does not match or the plaintext is not a JSON object.
pub fn decrypt_subject(vc: &VerifiableCredential, secret: &SecretKey) -> Result<VerifiableCredential> {
    let ciphertext = vc.credential_subject.ciphertext().ok_or_else(|| {
        IdentityError::Decryption("credential subject is not encrypted".into())
    })?;
    let claims = open_claims(ciphertext, secret)?;

    let mut decrypted = vc.clone();
    decrypted.credential_subject = CredentialSubject::Claims(claims);
    Ok(decrypted)
}

/// Encrypts a claim object to a hex string.
pub fn seal_claims(claims: &Map<String, Value>, recipient: &PublicKey) -> Result<String> {
    let plaintext =
        serde_json::to_vec(claims).map_err(|e| IdentityError::Encryption(e.to_string()))?;
    Ok(hex::encode(crypto::encrypt(recipient, &plaintext)?))
}

/// Decrypts a hex string produced by [`seal_claims`].
pub fn open_claims(ciphertext: &str, secret: &SecretKey) -> Result<Map<String, Value>> {
    let payload = hex::decode(ciphertext)
        .map_err(|e| IdentityError::Decryption(format!("ciphertext is not hex: {}", e)))?;
    let plaintext = crypto::decrypt(secret, &payload)?;
    serde_json::from_slice(&plaintext)
        .map_err(|e| IdentityError::Decryption(format!("subject is not a JSON object: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::credential::{CredentialType, Proof, SignedData};
    use crate::wallet::generate_key_pair;
    use serde_json::json;

    fn credential() -> VerifiableCredential {
        let claims = json!({
            "id": "did:ledger:rSUBJECT",
            "birthDate": "2000-01-01",
            "nationality": "French"
        });
        VerifiableCredential {
            context: vec!["https://www.w3.org/2018/credentials/v1".into()],
            id: "urn:uuid:0".into(),
            credential_type: CredentialType::Many(vec![
                "VerifiableCredential".into(),
                "PersonCredential".into(),
            ]),
            issuer: "did:ledger:rISSUER".into(),
            credential_subject: CredentialSubject::Claims(claims.as_object().unwrap().clone()),
            proof: Proof {
                proof_type: "XrplSignature2023".into(),
                verification_method: "did:ledger:rSUBJECT#key-1".into(),
                proof_purpose: "assertionMethod".into(),
                proof_value: "HASH".into(),
                signed_data: SignedData {
                    id: "urn:uuid:0".into(),
                    credential_type: CredentialType::Single("PersonCredential".into()),
                },
            },
        }
    }

    #[test]
    fn test_round_trip_restores_credential() {
        let keys = generate_key_pair().unwrap();
        let vc = credential();
        let encrypted = encrypt_subject(&vc, keys.public_key()).unwrap();
        let decrypted = decrypt_subject(&encrypted, keys.secret_key()).unwrap();
        assert_eq!(decrypted, vc);
    }

    #[test]
    fn test_only_subject_changes() {
        let keys = generate_key_pair().unwrap();
        let vc = credential();
        let encrypted = encrypt_subject(&vc, keys.public_key()).unwrap();

        let hex_subject = encrypted.credential_subject.ciphertext().unwrap();
        assert!(hex_subject.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(encrypted.id, vc.id);
        assert_eq!(encrypted.issuer, vc.issuer);
        assert_eq!(encrypted.proof, vc.proof);
        assert_eq!(encrypted.context, vc.context);

        let plaintext_len = serde_json::to_vec(vc.credential_subject.claims().unwrap())
            .unwrap()
            .len();
        assert_eq!(hex_subject.len() / 2, crypto::ECIES_OVERHEAD + plaintext_len);
    }

    #[test]
    fn test_wrong_key_is_decryption_error() {
        let keys = generate_key_pair().unwrap();
        let other = generate_key_pair().unwrap();
        let encrypted = encrypt_subject(&credential(), keys.public_key()).unwrap();
        let err = decrypt_subject(&encrypted, other.secret_key()).unwrap_err();
        assert!(matches!(err, IdentityError::Decryption(_)));
    }

    #[test]
    fn test_state_mismatches_are_rejected() {
        let keys = generate_key_pair().unwrap();
        let vc = credential();
        let encrypted = encrypt_subject(&vc, keys.public_key()).unwrap();

        assert!(matches!(
            encrypt_subject(&encrypted, keys.public_key()),
            Err(IdentityError::Encryption(_))
        ));
        assert!(matches!(
            decrypt_subject(&vc, keys.secret_key()),
            Err(IdentityError::Decryption(_))
        ));
    }

    #[test]
    fn test_malformed_ciphertext_is_decryption_error() {
        let keys = generate_key_pair().unwrap();
        assert!(matches!(
            open_claims("zz-not-hex", keys.secret_key()),
            Err(IdentityError::Decryption(_))
        ));

        let not_json = hex::encode(crypto::encrypt(keys.public_key(), b"[1,2]").unwrap());
        let err = open_claims(&not_json, keys.secret_key()).unwrap_err();
        assert!(matches!(err, IdentityError::Decryption(msg) if msg.contains("JSON object")));
    }
}

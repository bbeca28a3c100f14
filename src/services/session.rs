// src/services/session.rs
//! Identity session context.
//!
//! Owns everything one issuance flow needs: the ledger and storage
//! adapters, the connection supervisor, the secret store holding the
//! encryption key, and the artifacts produced along the way (credential,
//! encrypted subject, anchor). Nothing here is global; dropping or tearing
//! down the session releases all of it.

use crate::blockchain::ledger::LedgerAdapter;
use crate::blockchain::reconnect::{CancellationToken, ConnectionSupervisor, ReconnectPolicy};
use crate::config::Settings;
use crate::error::{IdentityError, Result};
use crate::models::anchor::AnchorRecord;
use crate::models::credential::{CredentialTemplate, VerifiableCredential};
use crate::services::anchoring::Anchor;
use crate::services::credential_issuer::{build_credential, LedgerProofSigner, ProofSigner};
use crate::services::did_builder::build_did_document;
use crate::services::selective_encryption::{decrypt_subject, encrypt_subject};
use crate::services::verifier::{evaluate_at, Predicate, PredicateOutcome};
use crate::storage::StorageAdapter;
use crate::wallet::{generate_key_pair, EncryptionKeyPair, SecretStore, ENCRYPTION_KEY};
use chrono::{Local, NaiveDate};
use k256::PublicKey;
use log::{info, warn};
use std::sync::Arc;

pub struct IdentitySession {
    did_method: String,
    issuer_did: String,
    template: CredentialTemplate,
    ledger: Arc<dyn LedgerAdapter>,
    storage: Arc<dyn StorageAdapter>,
    secrets: Box<dyn SecretStore>,
    supervisor: Arc<ConnectionSupervisor>,
    token: CancellationToken,
    public_key: Option<PublicKey>,
    credential: Option<VerifiableCredential>,
    encrypted_credential: Option<VerifiableCredential>,
    /// Ciphertext of the subject, kept for predicate checks
    stored_subject: Option<String>,
    anchor: Option<Anchor>,
}

impl IdentitySession {
    /// Builds a session and starts supervising the ledger connection.
    ///
    /// The connection itself is opened lazily by the first operation that
    /// needs it.
    ///
    /// # Errors
    /// `Config` if the configured credential template cannot be loaded.
    pub fn init(
        settings: &Settings,
        ledger: Arc<dyn LedgerAdapter>,
        storage: Arc<dyn StorageAdapter>,
        secrets: Box<dyn SecretStore>,
    ) -> Result<Self> {
        let template = match &settings.credential.template_path {
            Some(path) => CredentialTemplate::from_file(path)?,
            None => CredentialTemplate::default(),
        };

        let token = CancellationToken::new();
        let supervisor = ConnectionSupervisor::new(
            ledger.clone(),
            ReconnectPolicy::from_settings(&settings.reconnect)?,
            token.clone(),
        );
        supervisor.watch();

        Ok(Self {
            did_method: settings.credential.did_method.clone(),
            issuer_did: settings.credential.issuer_did.clone(),
            template,
            ledger,
            storage,
            secrets,
            supervisor,
            token,
            public_key: None,
            credential: None,
            encrypted_credential: None,
            stored_subject: None,
            anchor: None,
        })
    }

    /// Replaces the credential template.
    pub fn with_template(mut self, template: CredentialTemplate) -> Self {
        self.template = template;
        self
    }

    /// Generates the session encryption key pair and stores the private half.
    ///
    /// # Returns
    /// Hex of the uncompressed public key.
    pub fn generate_encryption_keys(&mut self) -> Result<String> {
        let pair = generate_key_pair()?;
        self.secrets.put(ENCRYPTION_KEY, pair.secret_bytes());
        self.public_key = Some(pair.public_key().clone());
        info!("Encryption keys generated");
        Ok(pair.public_key_hex())
    }

    /// Issues a credential to the session wallet's DID.
    pub async fn issue_credential(&mut self) -> Result<VerifiableCredential> {
        self.supervisor.ensure_connected().await?;
        let signer = LedgerProofSigner::new(self.ledger.clone(), &self.did_method);
        let subject_did = signer.signer_did()?;

        let vc = build_credential(&self.template, &self.issuer_did, &subject_did, &signer).await?;
        self.credential = Some(vc.clone());
        Ok(vc)
    }

    /// Encrypts the issued credential's subject with the session key.
    ///
    /// # Errors
    /// `Encryption` if no credential was issued or no keys were generated.
    pub fn encrypt_credential(&mut self) -> Result<VerifiableCredential> {
        let (credential, public_key) = self.encryption_inputs()?;
        let encrypted = encrypt_subject(credential, &public_key)?;
        self.encrypted_credential = Some(encrypted.clone());
        Ok(encrypted)
    }

    /// Decrypts the last encrypted credential with the stored key.
    ///
    /// # Errors
    /// `Decryption` if nothing was encrypted, the key is gone, or the key does not match.
    pub fn decrypt_credential(&self) -> Result<VerifiableCredential> {
        let encrypted = self
            .encrypted_credential
            .as_ref()
            .ok_or_else(|| IdentityError::Decryption("no encrypted credential available".into()))?;
        let pair = self
            .key_pair()?
            .ok_or_else(|| IdentityError::Decryption("encryption keys not available".into()))?;
        decrypt_subject(encrypted, pair.secret_key())
    }

    /// Builds the DID document, encrypts the credential and anchors both.
    ///
    /// The encrypted subject is retained for predicate checks before the
    /// first upload. The anchor is kept even when a step fails, so its state
    /// can be inspected.
    pub async fn anchor_identity(&mut self) -> Result<AnchorRecord> {
        let (credential, public_key) = self.encryption_inputs()?;
        let encrypted = encrypt_subject(credential, &public_key)?;

        self.supervisor.ensure_connected().await?;
        let identity = self
            .ledger
            .identity()
            .ok_or_else(|| IdentityError::MissingIdentity("no ledger wallet configured".into()))?;
        let did_document =
            build_did_document(&self.did_method, &identity.address, &identity.public_key)?;

        self.stored_subject = encrypted.credential_subject.ciphertext().map(str::to_string);
        self.encrypted_credential = Some(encrypted.clone());

        let mut anchor = Anchor::draft(did_document, encrypted);
        let outcome = anchor.run(self.ledger.as_ref(), self.storage.as_ref()).await;
        let record = anchor.record().clone();
        self.anchor = Some(anchor);
        outcome?;

        info!("Identity {} anchored", record.did);
        Ok(record)
    }

    /// Evaluates a predicate against the stored encrypted subject as of today.
    pub fn check(&self, predicate: Predicate) -> PredicateOutcome {
        self.check_at(predicate, Local::now().date_naive())
    }

    /// Same as [`check`](Self::check) for a fixed date.
    pub fn check_at(&self, predicate: Predicate, today: NaiveDate) -> PredicateOutcome {
        let Some(subject) = self.stored_subject.as_deref() else {
            return PredicateOutcome::Unavailable("no stored credential subject".into());
        };
        let pair = match self.key_pair() {
            Ok(Some(pair)) => pair,
            Ok(None) => return PredicateOutcome::Unavailable("encryption keys not available".into()),
            Err(e) => return PredicateOutcome::Unavailable(e.to_string()),
        };
        match evaluate_at(subject, pair.secret_key(), predicate, today) {
            Ok(satisfied) => PredicateOutcome::from_bool(satisfied),
            Err(e) => {
                warn!("Predicate {} unavailable: {}", predicate, e);
                PredicateOutcome::Unavailable(e.to_string())
            }
        }
    }

    /// Cancels reconnects, wipes secrets and closes the ledger connection.
    pub async fn teardown(&mut self) -> Result<()> {
        self.token.cancel();
        self.secrets.clear();
        self.public_key = None;
        self.ledger.disconnect().await?;
        info!("Session torn down");
        Ok(())
    }

    pub fn credential(&self) -> Option<&VerifiableCredential> {
        self.credential.as_ref()
    }

    pub fn encrypted_credential(&self) -> Option<&VerifiableCredential> {
        self.encrypted_credential.as_ref()
    }

    pub fn anchor(&self) -> Option<&Anchor> {
        self.anchor.as_ref()
    }

    pub fn ledger(&self) -> &Arc<dyn LedgerAdapter> {
        &self.ledger
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    fn encryption_inputs(&self) -> Result<(&VerifiableCredential, PublicKey)> {
        let credential = self
            .credential
            .as_ref()
            .ok_or_else(|| IdentityError::Encryption("no credential issued".into()))?;
        let public_key = self
            .public_key
            .clone()
            .ok_or_else(|| IdentityError::Encryption("encryption keys not generated".into()))?;
        Ok((credential, public_key))
    }

    fn key_pair(&self) -> Result<Option<EncryptionKeyPair>> {
        self.secrets
            .get(ENCRYPTION_KEY)
            .map(|bytes| EncryptionKeyPair::from_secret_bytes(&bytes))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::testing::MockLedger;
    use crate::models::anchor::AnchorState;
    use crate::services::verifier::Nationality;
    use crate::storage::MemoryStorage;
    use crate::wallet::InMemorySecretStore;

    const PERSON_TEMPLATE: &str = r#"{
        "@context": ["https://www.w3.org/2018/credentials/v1"],
        "type": ["VerifiableCredential", "PersonCredential"],
        "credentialSubject": {"birthDate": "2000-01-01", "nationality": "French"}
    }"#;

    struct Fixture {
        ledger: Arc<MockLedger>,
        storage: Arc<MemoryStorage>,
        session: IdentitySession,
    }

    fn fixture(ledger: MockLedger) -> Fixture {
        let mut settings = Settings::default();
        settings.credential.did_method = "ledger".into();
        settings.credential.issuer_did = "did:ledger:rISSUER".into();

        let ledger = Arc::new(ledger);
        let storage = Arc::new(MemoryStorage::new("https://gw.test"));
        let session = IdentitySession::init(
            &settings,
            ledger.clone(),
            storage.clone(),
            Box::new(InMemorySecretStore::new()),
        )
        .unwrap()
        .with_template(CredentialTemplate::from_json(PERSON_TEMPLATE).unwrap());
        Fixture {
            ledger,
            storage,
            session,
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    #[tokio::test]
    async fn test_end_to_end_issuance() {
        let Fixture {
            ledger,
            storage,
            mut session,
        } = fixture(MockLedger::new("rSUBJECT"));

        session.generate_encryption_keys().unwrap();
        let vc = session.issue_credential().await.unwrap();
        assert!(ledger.is_connected());
        assert_eq!(vc.issuer, "did:ledger:rISSUER");
        assert_eq!(vc.credential_subject.claims().unwrap()["id"], "did:ledger:rSUBJECT");

        let encrypted = session.encrypt_credential().unwrap();
        assert!(encrypted.credential_subject.is_encrypted());
        assert_eq!(session.decrypt_credential().unwrap(), vc);

        let record = session.anchor_identity().await.unwrap();
        assert_eq!(record.did, "did:ledger:rSUBJECT");
        assert_eq!(record.did_document.authentication[0].controller, "did:ledger:rSUBJECT");
        assert!(record.verifiable_credential.credential_subject.is_encrypted());
        assert!(record.transaction.is_some());
        assert_eq!(session.anchor().unwrap().state(), AnchorState::Finalized);
        assert_eq!(storage.uploads().len(), 2);

        assert_eq!(session.check_at(Predicate::Adult, today()), PredicateOutcome::Satisfied);
        assert_eq!(
            session.check_at(Predicate::Nationality(Nationality::French), today()),
            PredicateOutcome::Satisfied
        );
        assert_eq!(
            session.check_at(Predicate::Nationality(Nationality::Italian), today()),
            PredicateOutcome::NotSatisfied
        );
        assert_eq!(
            session.check_at(Predicate::Nationality(Nationality::English), today()),
            PredicateOutcome::NotSatisfied
        );
    }

    #[tokio::test]
    async fn test_predicates_unavailable_before_anchoring() {
        let Fixture { mut session, .. } = fixture(MockLedger::new("rSUBJECT"));
        assert!(matches!(
            session.check_at(Predicate::Adult, today()),
            PredicateOutcome::Unavailable(_)
        ));

        session.generate_encryption_keys().unwrap();
        session.issue_credential().await.unwrap();
        session.encrypt_credential().unwrap();
        assert!(!session.check(Predicate::Adult).as_bool());
    }

    #[tokio::test]
    async fn test_teardown_wipes_keys_and_disconnects() {
        let Fixture {
            ledger,
            mut session,
            ..
        } = fixture(MockLedger::new("rSUBJECT"));
        session.generate_encryption_keys().unwrap();
        session.issue_credential().await.unwrap();
        session.anchor_identity().await.unwrap();

        session.teardown().await.unwrap();
        assert!(session.is_cancelled());
        assert!(!ledger.is_connected());
        assert_eq!(
            session.check_at(Predicate::Adult, today()),
            PredicateOutcome::Unavailable("encryption keys not available".into())
        );
        assert!(matches!(session.decrypt_credential(), Err(IdentityError::Decryption(_))));
    }

    #[tokio::test]
    async fn test_anchor_requires_keys_and_credential() {
        let Fixture {
            storage,
            mut session,
            ..
        } = fixture(MockLedger::new("rSUBJECT"));

        let err = session.anchor_identity().await.unwrap_err();
        assert!(matches!(err, IdentityError::Encryption(_)));
        session.issue_credential().await.unwrap();
        let err = session.anchor_identity().await.unwrap_err();
        assert!(matches!(err, IdentityError::Encryption(msg) if msg.contains("keys")));
        assert!(storage.uploads().is_empty());
    }

    #[test]
    fn test_init_rejects_invalid_reconnect_settings() {
        let mut settings = Settings::default();
        settings.reconnect.multiplier = -2.0;
        let result = IdentitySession::init(
            &settings,
            Arc::new(MockLedger::new("rSUBJECT")),
            Arc::new(MemoryStorage::new("https://gw.test")),
            Box::new(InMemorySecretStore::new()),
        );
        assert!(matches!(result, Err(IdentityError::Config(_))));
    }

    #[tokio::test]
    async fn test_issue_without_wallet() {
        let Fixture { mut session, .. } = fixture(MockLedger::without_identity());
        let err = session.issue_credential().await.unwrap_err();
        assert!(matches!(err, IdentityError::MissingIdentity(_)));
    }

    #[tokio::test]
    async fn test_failed_anchor_is_kept_for_inspection() {
        let ledger = MockLedger::new("rSUBJECT");
        ledger.fail_submission();
        let Fixture { mut session, .. } = fixture(ledger);
        session.generate_encryption_keys().unwrap();
        session.issue_credential().await.unwrap();

        let err = session.anchor_identity().await.unwrap_err();
        assert!(matches!(err, IdentityError::LedgerSubmission(_)));
        assert_eq!(session.anchor().unwrap().state(), AnchorState::TxSubmitted);
        // the subject was stored before the pipeline ran
        assert_eq!(session.check_at(Predicate::Adult, today()), PredicateOutcome::Satisfied);
    }

    #[tokio::test]
    async fn test_disconnect_is_recovered_by_supervisor() {
        let Fixture {
            ledger,
            mut session,
            ..
        } = fixture(MockLedger::new("rSUBJECT"));
        session.issue_credential().await.unwrap();
        assert_eq!(ledger.connect_calls(), 1);

        ledger.simulate_disconnect();
        for _ in 0..50 {
            if ledger.is_connected() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert!(ledger.is_connected());
        assert_eq!(ledger.connect_calls(), 2);
    }
}

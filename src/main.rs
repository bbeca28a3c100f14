// src/main.rs

//! # did-anchor - Main Entry Point
//!
//! Runs one complete issuance against the configured ledger and storage:
//! 1. generate session encryption keys
//! 2. issue a credential to the wallet's DID
//! 3. encrypt the subject, build the DID document and anchor both
//! 4. report the eligibility predicates
//!
//! ## Configuration
//! Settings come from `config/default.toml` and `DID_ANCHOR__*` variables
//! (a `.env` file is honoured). The wallet needs:
//! - `DID_ANCHOR__LEDGER__SEED`
//! - `DID_ANCHOR__LEDGER__ADDRESS`
//! - `DID_ANCHOR__LEDGER__PUBLIC_KEY`
//!
//! and the default Pinata backend needs `DID_ANCHOR__STORAGE__PINATA_JWT`.

use anyhow::Context;
use did_anchor::blockchain::XrplClient;
use did_anchor::config::Settings;
use did_anchor::services::{IdentitySession, Predicate};
use did_anchor::storage;
use did_anchor::wallet::InMemorySecretStore;
use log::info;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load().context("failed to load settings")?;
    env_logger::init();

    let ledger = Arc::new(
        XrplClient::from_settings(&settings.ledger).context("invalid ledger settings")?,
    );
    let storage = storage::from_settings(&settings.storage).context("invalid storage settings")?;
    info!("Using ledger at {}", ledger.url());

    let mut session = IdentitySession::init(
        &settings,
        ledger,
        storage,
        Box::new(InMemorySecretStore::new()),
    )?;

    let outcome = run(&mut session).await;
    session.teardown().await.context("teardown failed")?;
    outcome
}

async fn run(session: &mut IdentitySession) -> anyhow::Result<()> {
    let public_key = session.generate_encryption_keys()?;
    println!("Encryption public key: {}", public_key);

    let credential = session
        .issue_credential()
        .await
        .context("credential issuance failed")?;
    println!("Issued credential {}", credential.id);

    let record = session
        .anchor_identity()
        .await
        .context("anchoring failed")?;
    println!("{}", serde_json::to_string_pretty(&record)?);
    if let Some(cid) = session.anchor().and_then(|anchor| anchor.finalized_content_id()) {
        println!("Final record content id: {}", cid);
    }

    println!("Eligibility:");
    for predicate in Predicate::ALL {
        println!("- {}: {}", predicate, session.check(predicate));
    }
    Ok(())
}

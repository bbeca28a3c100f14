// src/config.rs
//! Runtime settings.
//!
//! Settings are layered: built-in defaults, then an optional
//! `config/default.toml`, then `DID_ANCHOR__*` environment variables
//! (double underscore separates sections, e.g. `DID_ANCHOR__LEDGER__SEED`).
//! A `.env` file is loaded into the environment first.

use crate::error::Result;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::time::Duration;

/// Default XRPL devnet WebSocket endpoint.
pub const DEFAULT_LEDGER_URL: &str = "wss://s.devnet.rippletest.net:51233";

/// Top-level settings.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    pub ledger: LedgerSettings,
    pub reconnect: ReconnectSettings,
    pub storage: StorageSettings,
    pub credential: CredentialSettings,
}

/// Ledger endpoint and wallet credentials.
///
/// `seed`, `address` and `public_key` together form the session wallet.
/// When any of them is missing the client runs without a signing identity.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LedgerSettings {
    pub url: String,
    pub seed: Option<String>,
    pub address: Option<String>,
    /// Hex-encoded public key of the wallet
    pub public_key: Option<String>,
    /// Interval between validation polls while waiting for a submitted transaction
    pub poll_interval_ms: u64,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_LEDGER_URL.to_string(),
            seed: None,
            address: None,
            public_key: None,
            poll_interval_ms: 1_000,
        }
    }
}

impl LedgerSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Reconnect policy for the shared ledger connection.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReconnectSettings {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
    pub jitter: f64,
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_delay_ms: 500,
            max_delay_ms: 30_000,
            multiplier: 2.0,
            jitter: 0.2,
        }
    }
}

/// Which content-addressed store receives anchor records.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Pinata,
    Ipfs,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub backend: StorageBackend,
    pub pinata_jwt: Option<String>,
    pub pinata_api_url: String,
    /// Public gateway used to build `gatewayUri` values
    pub gateway_url: String,
    pub ipfs_api_url: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Pinata,
            pinata_jwt: None,
            pinata_api_url: "https://api.pinata.cloud".to_string(),
            gateway_url: "https://gateway.pinata.cloud".to_string(),
            ipfs_api_url: "http://localhost:5001".to_string(),
        }
    }
}

/// Issuance parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CredentialSettings {
    /// DID method used for every identifier this session derives
    pub did_method: String,
    /// DID placed in the `issuer` field of issued credentials
    pub issuer_did: String,
    /// JSON credential template; the built-in template is used when unset
    pub template_path: Option<String>,
}

impl Default for CredentialSettings {
    fn default() -> Self {
        Self {
            did_method: "xrpl".to_string(),
            issuer_did: "did:xrpl:rMuwGvcUxnS1LT4xXDaVZGZGbBtrUD5bgd".to_string(),
            template_path: None,
        }
    }
}

impl Settings {
    /// Loads settings from `.env`, `config/default.toml` and the environment.
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_sources(Some("config/default"))
    }

    /// Builds settings from an optional file (without extension) and the
    /// `DID_ANCHOR` environment prefix.
    pub fn from_sources(file: Option<&str>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(name) = file {
            builder = builder.add_source(File::with_name(name).required(false));
        }
        let settings = builder
            .add_source(Environment::with_prefix("DID_ANCHOR").separator("__"))
            .build()?
            .try_deserialize::<Settings>()?;
        Ok(settings)
    }
}

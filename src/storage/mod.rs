// src/storage/mod.rs
//! Content-addressed storage for anchor records.
//!
//! Three backends share the [`StorageAdapter`] contract: a Pinata pinning
//! account, a plain IPFS node and an in-memory store for tests and offline
//! runs.

pub mod ipfs_client;
pub mod memory;
pub mod pinata;

pub use ipfs_client::IpfsStorage;
pub use memory::MemoryStorage;
pub use pinata::PinataStorage;

use crate::config::{StorageBackend, StorageSettings};
use crate::error::{IdentityError, Result};
use async_trait::async_trait;
use std::sync::Arc;

pub const JSON_MIME: &str = "application/json";

/// A named blob handed to a storage backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    pub fn json(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type: JSON_MIME.to_string(),
            bytes,
        }
    }
}

/// What a backend returns for a stored blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReceipt {
    pub content_id: String,
}

/// Upload capability used by the anchoring pipeline.
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    /// Stores `file` and returns its content identifier.
    ///
    /// # Errors
    /// `StorageUpload` on any transport or backend failure.
    async fn upload(&self, file: UploadFile) -> Result<UploadReceipt>;

    /// Public HTTP URL for a content identifier.
    fn gateway_url(&self, content_id: &str) -> String;
}

/// `<gateway>/ipfs/<cid>` without doubled slashes.
pub(crate) fn gateway_link(gateway: &str, content_id: &str) -> String {
    format!("{}/ipfs/{}", gateway.trim_end_matches('/'), content_id)
}

/// Builds the backend selected in settings.
///
/// # Errors
/// `Config` when the selected backend lacks required settings.
pub fn from_settings(settings: &StorageSettings) -> Result<Arc<dyn StorageAdapter>> {
    match settings.backend {
        StorageBackend::Pinata => {
            let jwt = settings.pinata_jwt.clone().ok_or_else(|| {
                IdentityError::Config("storage.pinata_jwt is required for the pinata backend".into())
            })?;
            Ok(Arc::new(PinataStorage::new(
                &settings.pinata_api_url,
                jwt,
                &settings.gateway_url,
            )))
        }
        StorageBackend::Ipfs => Ok(Arc::new(IpfsStorage::new(
            &settings.ipfs_api_url,
            &settings.gateway_url,
        )?)),
        StorageBackend::Memory => Ok(Arc::new(MemoryStorage::new(&settings.gateway_url))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_link_trims_trailing_slash() {
        assert_eq!(
            gateway_link("https://gateway.example/", "bafy1"),
            "https://gateway.example/ipfs/bafy1"
        );
    }

    #[test]
    fn test_pinata_backend_requires_jwt() {
        let settings = StorageSettings::default();
        assert!(matches!(from_settings(&settings), Err(IdentityError::Config(_))));
    }

    #[test]
    fn test_memory_backend_from_settings() {
        let settings = StorageSettings {
            backend: StorageBackend::Memory,
            ..StorageSettings::default()
        };
        let storage = from_settings(&settings).unwrap();
        assert_eq!(
            storage.gateway_url("abc"),
            "https://gateway.pinata.cloud/ipfs/abc"
        );

        let receipt =
            tokio_test::block_on(storage.upload(UploadFile::json("a.json", b"{}".to_vec()))).unwrap();
        assert_eq!(receipt.content_id.len(), 64);
    }
}

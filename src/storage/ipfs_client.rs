// src/storage/ipfs_client.rs
//! IPFS node storage client.
//!
//! Talks to a node's HTTP API (`/api/v0/add`) for content-addressed storage
//! of anchor records.
//!
//! # Security Considerations
//! - All stored data is public by default (IPFS is a public network)
//! - Credential subjects are encrypted before they reach this layer
//! - Hashes are content-addressable and permanent

use super::{gateway_link, StorageAdapter, UploadFile, UploadReceipt};
use crate::error::{IdentityError, Result};
use async_trait::async_trait;
use ipfs_api_backend_hyper::{IpfsApi, IpfsClient, TryFromUri};
use log::info;
use std::io::Cursor;
use std::sync::Arc;
use tokio::task;

/// Thread-safe IPFS client wrapper.
///
/// The hyper backend's request futures are not `Send`, so each upload runs
/// on a dedicated blocking thread with its own runtime.
#[derive(Clone)]
pub struct IpfsStorage {
    /// Shared IPFS client instance
    client: Arc<IpfsClient>,
    gateway: String,
}

impl IpfsStorage {
    /// Creates a client for the node at `api_url`.
    ///
    /// # Arguments
    /// * `api_url` - Node API root, e.g. `http://localhost:5001`
    /// * `gateway` - Gateway root used for `gatewayUri` values
    ///
    /// # Errors
    /// `Config` if `api_url` is not a valid URI.
    pub fn new(api_url: &str, gateway: &str) -> Result<Self> {
        let client = IpfsClient::from_str(api_url)
            .map_err(|e| IdentityError::Config(format!("invalid IPFS API url {}: {}", api_url, e)))?;
        Ok(IpfsStorage {
            client: Arc::new(client),
            gateway: gateway.to_string(),
        })
    }

    /// Stores raw binary data and returns its CID.
    async fn store_data(&self, data: Vec<u8>) -> Result<String> {
        let client = self.client.clone();

        let added = task::spawn_blocking(move || -> Result<String> {
            let rt = tokio::runtime::Runtime::new()
                .map_err(|e| IdentityError::StorageUpload(e.to_string()))?;
            rt.block_on(async {
                let response = client
                    .add(Cursor::new(data))
                    .await
                    .map_err(|e| IdentityError::StorageUpload(e.to_string()))?;
                Ok(response.hash)
            })
        })
        .await;

        match added {
            Ok(inner) => inner,
            Err(join_err) => Err(IdentityError::StorageUpload(join_err.to_string())),
        }
    }
}

#[async_trait]
impl StorageAdapter for IpfsStorage {
    async fn upload(&self, file: UploadFile) -> Result<UploadReceipt> {
        let content_id = self.store_data(file.bytes).await?;
        info!("Added {} to IPFS as {}", file.name, content_id);
        Ok(UploadReceipt { content_id })
    }

    fn gateway_url(&self, content_id: &str) -> String {
        gateway_link(&self.gateway, content_id)
    }
}

// src/storage/pinata.rs
//! Pinata pinning service client.
//!
//! Uploads go to `POST {api}/pinning/pinFileToIPFS` as a multipart form
//! with a single `file` field, authenticated with a bearer JWT. Pinata
//! answers with the CID in `IpfsHash`.

use super::{gateway_link, StorageAdapter, UploadFile, UploadReceipt};
use crate::error::{IdentityError, Result};
use async_trait::async_trait;
use log::{debug, info};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use zeroize::Zeroizing;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PinResponse {
    ipfs_hash: String,
}

/// Pinata-backed [`StorageAdapter`].
pub struct PinataStorage {
    http: reqwest::Client,
    api_url: String,
    jwt: Zeroizing<String>,
    gateway: String,
}

impl PinataStorage {
    /// # Arguments
    /// * `api_url` - Pinata API root, e.g. `https://api.pinata.cloud`
    /// * `jwt` - API token sent as a bearer credential
    /// * `gateway` - Gateway root used for `gatewayUri` values
    pub fn new(api_url: &str, jwt: String, gateway: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_url: api_url.trim_end_matches('/').to_string(),
            jwt: Zeroizing::new(jwt),
            gateway: gateway.to_string(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/pinning/pinFileToIPFS", self.api_url)
    }
}

#[async_trait]
impl StorageAdapter for PinataStorage {
    async fn upload(&self, file: UploadFile) -> Result<UploadReceipt> {
        let upload_error = |e: reqwest::Error| IdentityError::StorageUpload(e.to_string());
        let size = file.bytes.len();
        let part = Part::bytes(file.bytes)
            .file_name(file.name.clone())
            .mime_str(&file.mime_type)
            .map_err(upload_error)?;
        let form = Form::new().part("file", part);

        debug!("Pinning {} ({} bytes) at {}", file.name, size, self.endpoint());
        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(self.jwt.as_str())
            .multipart(form)
            .send()
            .await
            .map_err(upload_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(IdentityError::StorageUpload(format!(
                "pinata returned {}: {}",
                status, body
            )));
        }

        let pinned: PinResponse = response.json().await.map_err(upload_error)?;
        info!("Pinned {} as {}", file.name, pinned.ipfs_hash);
        Ok(UploadReceipt {
            content_id: pinned.ipfs_hash,
        })
    }

    fn gateway_url(&self, content_id: &str) -> String {
        gateway_link(&self.gateway, content_id)
    }
}

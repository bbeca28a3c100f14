// src/storage/memory.rs
//! In-memory content-addressed store.
//!
//! Content ids are the lowercase hex SHA-256 of the stored bytes, so equal
//! uploads map to the same id.

use super::{gateway_link, StorageAdapter, UploadFile, UploadReceipt};
use crate::error::{IdentityError, Result};
use crate::utils::crypto::hash_data;
use async_trait::async_trait;
use log::debug;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

pub struct MemoryStorage {
    gateway: String,
    files: Mutex<HashMap<String, UploadFile>>,
    /// Upload order, by content id
    log: Mutex<Vec<String>>,
    fail_uploads: AtomicBool,
}

impl MemoryStorage {
    pub fn new(gateway: &str) -> Self {
        Self {
            gateway: gateway.to_string(),
            files: Mutex::new(HashMap::new()),
            log: Mutex::new(Vec::new()),
            fail_uploads: AtomicBool::new(false),
        }
    }

    /// Makes every following upload fail, to exercise error paths offline.
    pub fn fail_uploads(&self, fail: bool) {
        self.fail_uploads.store(fail, Ordering::SeqCst);
    }

    pub fn get(&self, content_id: &str) -> Option<UploadFile> {
        self.files
            .lock()
            .ok()
            .and_then(|files| files.get(content_id).cloned())
    }

    /// Every upload in order, duplicates included.
    pub fn uploads(&self) -> Vec<UploadFile> {
        let Ok(log) = self.log.lock() else {
            return Vec::new();
        };
        log.iter().filter_map(|cid| self.get(cid)).collect()
    }
}

#[async_trait]
impl StorageAdapter for MemoryStorage {
    async fn upload(&self, file: UploadFile) -> Result<UploadReceipt> {
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(IdentityError::StorageUpload("memory store is read-only".into()));
        }
        let content_id = hex::encode(hash_data(&file.bytes));
        debug!("Stored {} ({} bytes) as {}", file.name, file.bytes.len(), content_id);

        self.files
            .lock()
            .map_err(|_| poisoned())?
            .insert(content_id.clone(), file);
        self.log
            .lock()
            .map_err(|_| poisoned())?
            .push(content_id.clone());
        Ok(UploadReceipt { content_id })
    }

    fn gateway_url(&self, content_id: &str) -> String {
        gateway_link(&self.gateway, content_id)
    }
}

fn poisoned() -> IdentityError {
    IdentityError::StorageUpload("memory store lock poisoned".into())
}

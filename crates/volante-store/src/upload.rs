use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use volante_core::error::Result;
use volante_core::store::{FileStore, Uploaded};

/// Upload collaborator stub: retains the bytes in memory and hands back an
/// opaque url. Stands in for the blob store the surrounding application
/// provides.
#[derive(Default)]
pub struct MemoryFileStore {
    files: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryFileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.files.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.files.read().await.is_empty()
    }
}

#[async_trait]
impl FileStore for MemoryFileStore {
    async fn upload(&self, filename: &str, bytes: Vec<u8>) -> Result<Uploaded> {
        let mut files = self.files.write().await;
        files.insert(filename.to_string(), bytes);
        Ok(Uploaded {
            url: format!("memory://{filename}"),
            filename: filename.to_string(),
        })
    }
}

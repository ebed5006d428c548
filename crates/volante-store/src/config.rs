use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tracing::info;

use volante_core::store::EntityStore;

use crate::memory::MemoryStore;
use crate::remote::RedisStore;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    Redis,
}

/// Backend selection happens here, at construction time; call sites receive
/// an `Arc<dyn EntityStore>` and never inspect the environment themselves.
#[derive(Clone, Debug)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub redis_url: Option<String>,
}

impl StoreConfig {
    pub fn memory() -> Self {
        StoreConfig {
            backend: StoreBackend::Memory,
            redis_url: None,
        }
    }

    pub fn from_env() -> Result<Self> {
        let backend = std::env::var("VOLANTE_STORE").unwrap_or_else(|_| "memory".to_string());
        match backend.as_str() {
            "memory" => Ok(Self::memory()),
            "redis" => {
                let redis_url = std::env::var("REDIS_URL")
                    .context("REDIS_URL is required when VOLANTE_STORE=redis")?;
                Ok(StoreConfig {
                    backend: StoreBackend::Redis,
                    redis_url: Some(redis_url),
                })
            }
            other => bail!("unknown VOLANTE_STORE backend: {other}"),
        }
    }

    pub fn connect(&self) -> Result<Arc<dyn EntityStore>> {
        match self.backend {
            StoreBackend::Memory => {
                info!("entity store backend: memory");
                Ok(Arc::new(MemoryStore::new()))
            }
            StoreBackend::Redis => {
                let url = self
                    .redis_url
                    .as_deref()
                    .context("redis backend selected without a url")?;
                info!("entity store backend: redis");
                Ok(Arc::new(RedisStore::connect(url)?))
            }
        }
    }
}

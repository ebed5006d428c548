use std::time::Duration;

use async_trait::async_trait;
use redis::{AsyncCommands, Client};
use serde_json::Value;
use tokio::sync::Mutex;
use uuid::Uuid;

use volante_core::error::{Error, Result};
use volante_core::store::{EntityStore, Predicate};

use crate::stamp::{prepare_create, prepare_update, record_id};

/// Every store call must complete within this bound; a slow or unreachable
/// backend surfaces as `Error::Unavailable` instead of hanging the caller.
const OP_TIMEOUT: Duration = Duration::from_secs(5);

const KEY_PREFIX: &str = "volante";

/// Remote backend: each collection lives under one key as a JSON array,
/// mirroring the KV layout the surrounding application already uses. The
/// write lock serializes read-modify-write cycles within this process.
pub struct RedisStore {
    client: Client,
    write_lock: Mutex<()>,
}

impl RedisStore {
    pub fn connect(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)
            .map_err(|err| Error::Unavailable(format!("redis: {err}")))?;
        Ok(RedisStore {
            client,
            write_lock: Mutex::new(()),
        })
    }

    fn key(collection: &str) -> String {
        format!("{KEY_PREFIX}:{collection}")
    }

    async fn read_all(&self, collection: &str) -> Result<Vec<Value>> {
        let raw: Option<String> = bounded(async {
            let mut connection = self
                .client
                .get_multiplexed_async_connection()
                .await
                .map_err(unavailable)?;
            connection
                .get(Self::key(collection))
                .await
                .map_err(unavailable)
        })
        .await?;

        match raw {
            Some(payload) => serde_json::from_str(&payload).map_err(unavailable),
            None => Ok(Vec::new()),
        }
    }

    async fn write_all(&self, collection: &str, records: &[Value]) -> Result<()> {
        let payload = serde_json::to_string(records).map_err(unavailable)?;
        bounded(async {
            let mut connection = self
                .client
                .get_multiplexed_async_connection()
                .await
                .map_err(unavailable)?;
            let _: () = connection
                .set(Self::key(collection), payload)
                .await
                .map_err(unavailable)?;
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl EntityStore for RedisStore {
    async fn filter(&self, collection: &str, predicate: &Predicate) -> Result<Vec<Value>> {
        let records = self.read_all(collection).await?;
        Ok(records
            .into_iter()
            .filter(|record| predicate.matches(record))
            .collect())
    }

    async fn get(&self, collection: &str, id: Uuid) -> Result<Option<Value>> {
        let records = self.read_all(collection).await?;
        Ok(records
            .into_iter()
            .find(|record| record_id(record) == Some(id)))
    }

    async fn create(&self, collection: &str, mut record: Value) -> Result<Value> {
        let _guard = self.write_lock.lock().await;
        prepare_create(&mut record);
        let mut records = self.read_all(collection).await?;
        records.push(record.clone());
        self.write_all(collection, &records).await?;
        Ok(record)
    }

    async fn update(&self, collection: &str, id: Uuid, mut record: Value) -> Result<Value> {
        let _guard = self.write_lock.lock().await;
        let mut records = self.read_all(collection).await?;
        let slot = records
            .iter_mut()
            .find(|existing| record_id(existing) == Some(id))
            .ok_or_else(|| Error::not_found(collection, id))?;

        prepare_update(&mut record, id);
        *slot = record.clone();
        self.write_all(collection, &records).await?;
        Ok(record)
    }

    async fn delete(&self, collection: &str, id: Uuid) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut records = self.read_all(collection).await?;
        records.retain(|record| record_id(record) != Some(id));
        self.write_all(collection, &records).await
    }
}

async fn bounded<T>(op: impl Future<Output = Result<T>>) -> Result<T> {
    tokio::time::timeout(OP_TIMEOUT, op)
        .await
        .map_err(|_| Error::Unavailable("redis: operation timed out".to_string()))?
}

fn unavailable(err: impl std::fmt::Display) -> Error {
    Error::Unavailable(format!("redis: {err}"))
}

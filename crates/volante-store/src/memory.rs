use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use uuid::Uuid;

use volante_core::error::{Error, Result};
use volante_core::store::{EntityStore, Predicate};

use crate::stamp::{prepare_create, prepare_update, record_id};

/// Local backend: one vector of JSON records per collection name, guarded by
/// a single RwLock. Suitable for tests and single-process deployments.
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Vec<Value>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn filter(&self, collection: &str, predicate: &Predicate) -> Result<Vec<Value>> {
        let collections = self.collections.read().await;
        let records = collections.get(collection).cloned().unwrap_or_default();
        Ok(records
            .into_iter()
            .filter(|record| predicate.matches(record))
            .collect())
    }

    async fn get(&self, collection: &str, id: Uuid) -> Result<Option<Value>> {
        let collections = self.collections.read().await;
        let found = collections
            .get(collection)
            .and_then(|records| records.iter().find(|record| record_id(record) == Some(id)))
            .cloned();
        Ok(found)
    }

    async fn create(&self, collection: &str, mut record: Value) -> Result<Value> {
        prepare_create(&mut record);
        let mut collections = self.collections.write().await;
        collections
            .entry(collection.to_string())
            .or_default()
            .push(record.clone());
        Ok(record)
    }

    async fn update(&self, collection: &str, id: Uuid, mut record: Value) -> Result<Value> {
        let mut collections = self.collections.write().await;
        let records = collections
            .get_mut(collection)
            .ok_or_else(|| Error::not_found(collection, id))?;
        let slot = records
            .iter_mut()
            .find(|existing| record_id(existing) == Some(id))
            .ok_or_else(|| Error::not_found(collection, id))?;

        prepare_update(&mut record, id);
        *slot = record.clone();
        Ok(record)
    }

    async fn delete(&self, collection: &str, id: Uuid) -> Result<()> {
        let mut collections = self.collections.write().await;
        if let Some(records) = collections.get_mut(collection) {
            records.retain(|record| record_id(record) != Some(id));
        }
        Ok(())
    }
}

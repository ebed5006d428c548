use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use uuid::Uuid;

use crate::error::{Error, Result};

/// A record type persisted in a named collection of the entity store.
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync {
    const COLLECTION: &'static str;

    fn id(&self) -> Uuid;
}

/// Conjunctive exact-equality filter. Field values are compared against the
/// serialized form of the record; there are no ranges and no full-text match.
#[derive(Debug, Clone, Default)]
pub struct Predicate(BTreeMap<String, Value>);

impl Predicate {
    pub fn field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn matches(&self, record: &Value) -> bool {
        self.0
            .iter()
            .all(|(key, expected)| record.get(key) == Some(expected))
    }
}

/// Generic document store over named collections of JSON records. The store
/// owns every entity: callers re-fetch on read and replace whole records on
/// write. Implementations must fail fast with `Error::Unavailable` rather
/// than hang.
#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn filter(&self, collection: &str, predicate: &Predicate) -> Result<Vec<Value>>;

    async fn get(&self, collection: &str, id: Uuid) -> Result<Option<Value>>;

    /// Persists a new record, assigning an id when the record carries none
    /// and stamping `created_date`/`updated_date`.
    async fn create(&self, collection: &str, record: Value) -> Result<Value>;

    /// Full-record replacement; restamps `updated_date`. Unknown ids are an
    /// error, surfaced by the typed repository as `NotFound`.
    async fn update(&self, collection: &str, id: Uuid, record: Value) -> Result<Value>;

    async fn delete(&self, collection: &str, id: Uuid) -> Result<()>;
}

/// Stored file handle returned by the upload collaborator.
#[derive(Debug, Clone)]
pub struct Uploaded {
    pub url: String,
    pub filename: String,
}

#[async_trait]
pub trait FileStore: Send + Sync {
    async fn upload(&self, filename: &str, bytes: Vec<u8>) -> Result<Uploaded>;
}

/// Typed access to one collection. Instantiated per entity type over a
/// shared `EntityStore`; holds no private copies of any record.
pub struct Repository<E> {
    store: Arc<dyn EntityStore>,
    _entity: PhantomData<E>,
}

impl<E> Clone for Repository<E> {
    fn clone(&self) -> Self {
        Repository {
            store: Arc::clone(&self.store),
            _entity: PhantomData,
        }
    }
}

impl<E: Entity> Repository<E> {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Repository {
            store,
            _entity: PhantomData,
        }
    }

    pub async fn all(&self) -> Result<Vec<E>> {
        self.filter(&Predicate::default()).await
    }

    pub async fn filter(&self, predicate: &Predicate) -> Result<Vec<E>> {
        let records = self.store.filter(E::COLLECTION, predicate).await?;
        records.into_iter().map(decode::<E>).collect()
    }

    pub async fn find_one(&self, predicate: &Predicate) -> Result<Option<E>> {
        let mut records = self.filter(predicate).await?;
        if records.is_empty() {
            Ok(None)
        } else {
            Ok(Some(records.swap_remove(0)))
        }
    }

    pub async fn get(&self, id: Uuid) -> Result<E> {
        match self.store.get(E::COLLECTION, id).await? {
            Some(record) => decode(record),
            None => Err(Error::not_found(E::COLLECTION, id)),
        }
    }

    pub async fn create(&self, entity: &E) -> Result<E> {
        let record = encode(entity)?;
        let stored = self.store.create(E::COLLECTION, record).await?;
        decode(stored)
    }

    pub async fn update(&self, entity: &E) -> Result<E> {
        let record = encode(entity)?;
        let stored = self.store.update(E::COLLECTION, entity.id(), record).await?;
        decode(stored)
    }

    pub async fn delete(&self, id: Uuid) -> Result<()> {
        self.store.delete(E::COLLECTION, id).await
    }
}

fn encode<E: Entity>(entity: &E) -> Result<Value> {
    serde_json::to_value(entity)
        .map_err(|err| Error::Unavailable(format!("cannot encode {}: {err}", E::COLLECTION)))
}

fn decode<E: Entity>(record: Value) -> Result<E> {
    serde_json::from_value(record)
        .map_err(|err| Error::Unavailable(format!("corrupt {} record: {err}", E::COLLECTION)))
}

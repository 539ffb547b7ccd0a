//! Document store adapter
//!
//! A narrow capability over a document database:
//! - get/set/delete single documents by collection + key
//! - filtered queries over top-level fields
//! - multi-document read-modify-write transactions that abort on conflict
//!
//! Every stored document carries a store-wide monotonically increasing version.
//! A `Transaction` remembers the version of everything it read and the backend
//! re-validates all of them atomically at commit time.

pub mod filter;
pub mod memory;
pub mod postgres;
pub mod transaction;

use std::sync::Arc;

use enlist_common::StoreError;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use uuid::Uuid;

pub use filter::{Clause, Filter};
pub use memory::MemoryStore;
pub use postgres::PgDocumentStore;
pub use transaction::Transaction;

/// Document version as stamped by the store
pub type Version = u64;

/// A typed document living in one collection
pub trait Document: Serialize + DeserializeOwned + Send + Sync + 'static {
    const COLLECTION: &'static str;

    fn key(&self) -> Uuid;
}

/// Raw document as returned by a backend
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub key: Uuid,
    pub version: Version,
    pub body: Value,
}

impl StoredDocument {
    pub fn decode<D: Document>(&self) -> Result<D, StoreError> {
        Ok(serde_json::from_value(self.body.clone())?)
    }
}

/// Version a transaction observed; `None` means it observed absence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Precondition {
    pub collection: &'static str,
    pub key: Uuid,
    pub expected: Option<Version>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    Put {
        collection: &'static str,
        key: Uuid,
        body: Value,
    },
    Delete {
        collection: &'static str,
        key: Uuid,
    },
}

impl Mutation {
    pub fn target(&self) -> (&'static str, Uuid) {
        match self {
            Mutation::Put {
                collection, key, ..
            }
            | Mutation::Delete { collection, key } => (*collection, *key),
        }
    }
}

/// Backend contract
#[async_trait::async_trait]
pub trait DocumentStore: Send + Sync {
    /// Read one document
    async fn fetch(
        &self,
        collection: &str,
        key: Uuid,
    ) -> Result<Option<StoredDocument>, StoreError>;

    /// All documents of a collection matching the filter, ordered by key
    async fn query(
        &self,
        collection: &str,
        filter: &Filter,
    ) -> Result<Vec<StoredDocument>, StoreError>;

    /// Apply every mutation iff every precondition still holds.
    ///
    /// Returns `StoreError::Conflict` without applying anything when any
    /// precondition fails.
    async fn commit(
        &self,
        preconditions: Vec<Precondition>,
        mutations: Vec<Mutation>,
    ) -> Result<(), StoreError>;

    /// Backend name for logs
    fn backend_name(&self) -> &'static str;
}

/// Shared handle over any backend
#[derive(Clone)]
pub struct Store {
    inner: Arc<dyn DocumentStore>,
}

impl Store {
    pub fn new(inner: Arc<dyn DocumentStore>) -> Self {
        Self { inner }
    }

    /// Fresh in-memory store
    pub fn memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    pub fn backend_name(&self) -> &'static str {
        self.inner.backend_name()
    }

    /// Begin a new optimistic transaction.
    pub fn begin(&self) -> Transaction {
        Transaction::new(Arc::clone(&self.inner))
    }

    /// Non-transactional read of one document
    pub async fn get<D: Document>(&self, key: Uuid) -> Result<Option<D>, StoreError> {
        match self.inner.fetch(D::COLLECTION, key).await? {
            Some(doc) => Ok(Some(doc.decode()?)),
            None => Ok(None),
        }
    }

    /// Non-transactional filtered query
    pub async fn find<D: Document>(&self, filter: &Filter) -> Result<Vec<D>, StoreError> {
        self.inner
            .query(D::COLLECTION, filter)
            .await?
            .iter()
            .map(StoredDocument::decode)
            .collect()
    }

    /// Write one document outside any read set (blind write)
    pub async fn put<D: Document>(&self, doc: &D) -> Result<(), StoreError> {
        let mut tx = self.begin();
        tx.set(doc)?;
        tx.commit().await
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("backend", &self.inner.backend_name())
            .finish()
    }
}

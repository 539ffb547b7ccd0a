//! Optimistic multi-document transactions
//!
//! Reads go to the backend and their versions are recorded; writes are
//! buffered locally and are visible to later reads in the same transaction.
//! `commit` hands the read set and the write set to the backend, which
//! applies all writes only if no read document changed in the meantime.
//! Dropping a transaction without committing discards every buffered write.

use std::collections::BTreeMap;
use std::sync::Arc;

use enlist_common::StoreError;
use serde_json::Value;
use uuid::Uuid;

use crate::{Document, DocumentStore, Filter, Mutation, Precondition, StoredDocument, Version};

type DocRef = (&'static str, Uuid);

pub struct Transaction {
    store: Arc<dyn DocumentStore>,
    reads: BTreeMap<DocRef, Option<Version>>,
    writes: BTreeMap<DocRef, Option<Value>>,
}

impl Transaction {
    pub(crate) fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            reads: BTreeMap::new(),
            writes: BTreeMap::new(),
        }
    }

    /// Read a document, seeing this transaction's own buffered writes.
    pub async fn get<D: Document>(&mut self, key: Uuid) -> Result<Option<D>, StoreError> {
        let doc_ref = (D::COLLECTION, key);
        if let Some(pending) = self.writes.get(&doc_ref) {
            return match pending {
                Some(body) => Ok(Some(serde_json::from_value(body.clone())?)),
                None => Ok(None),
            };
        }

        let fetched = self.store.fetch(D::COLLECTION, key).await?;
        self.record_read(doc_ref, fetched.as_ref().map(|d| d.version));
        match fetched {
            Some(doc) => Ok(Some(doc.decode()?)),
            None => Ok(None),
        }
    }

    /// Like `get`, but absence is an error.
    pub async fn require<D: Document>(&mut self, key: Uuid) -> Result<D, StoreError> {
        self.get(key).await?.ok_or(StoreError::NotFound)
    }

    /// Filtered query; every hit joins the read set.
    ///
    /// Buffered writes are overlaid: deleted documents disappear and
    /// written documents are re-evaluated against the filter.
    pub async fn query<D: Document>(&mut self, filter: &Filter) -> Result<Vec<D>, StoreError> {
        let hits = self.store.query(D::COLLECTION, filter).await?;

        let mut merged: BTreeMap<Uuid, Value> = BTreeMap::new();
        for StoredDocument { key, version, body } in hits {
            let doc_ref = (D::COLLECTION, key);
            if self.writes.contains_key(&doc_ref) {
                continue;
            }
            self.record_read(doc_ref, Some(version));
            merged.insert(key, body);
        }

        for ((collection, key), pending) in &self.writes {
            if *collection != D::COLLECTION {
                continue;
            }
            if let Some(body) = pending {
                if filter.matches(body) {
                    merged.insert(*key, body.clone());
                }
            }
        }

        merged
            .into_values()
            .map(|body| Ok(serde_json::from_value(body)?))
            .collect()
    }

    /// Buffer a create-or-replace of the document.
    pub fn set<D: Document>(&mut self, doc: &D) -> Result<(), StoreError> {
        let body = serde_json::to_value(doc)?;
        self.writes.insert((D::COLLECTION, doc.key()), Some(body));
        Ok(())
    }

    /// Buffer a deletion of the document.
    pub fn delete<D: Document>(&mut self, key: Uuid) {
        self.writes.insert((D::COLLECTION, key), None);
    }

    /// Number of buffered writes
    pub fn pending_writes(&self) -> usize {
        self.writes.len()
    }

    /// Validate the read set and apply the write set atomically.
    pub async fn commit(self) -> Result<(), StoreError> {
        if self.writes.is_empty() {
            return Ok(());
        }

        let preconditions = self
            .reads
            .into_iter()
            .map(|((collection, key), expected)| Precondition {
                collection,
                key,
                expected,
            })
            .collect::<Vec<_>>();

        let mutations = self
            .writes
            .into_iter()
            .map(|((collection, key), pending)| match pending {
                Some(body) => Mutation::Put {
                    collection,
                    key,
                    body,
                },
                None => Mutation::Delete { collection, key },
            })
            .collect::<Vec<_>>();

        tracing::trace!(
            backend = self.store.backend_name(),
            reads = preconditions.len(),
            writes = mutations.len(),
            "Committing transaction"
        );

        self.store.commit(preconditions, mutations).await
    }

    /// The first observation wins; a later differing read is caught at commit.
    fn record_read(&mut self, doc_ref: DocRef, version: Option<Version>) {
        self.reads.entry(doc_ref).or_insert(version);
    }
}

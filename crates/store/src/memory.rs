//! In-memory document store
//!
//! Commits are linearized by a single mutex, so precondition checks and
//! mutations never interleave with another commit.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use enlist_common::StoreError;
use serde_json::Value;
use uuid::Uuid;

use crate::{DocumentStore, Filter, Mutation, Precondition, StoredDocument, Version};

#[derive(Default)]
struct State {
    collections: HashMap<String, BTreeMap<Uuid, (Version, Value)>>,
    /// Store-wide counter so a deleted-then-recreated document never reuses a version
    last_version: Version,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents in a collection
    pub fn len(&self, collection: &str) -> Result<usize, StoreError> {
        let state = self.lock()?;
        Ok(state.collections.get(collection).map_or(0, BTreeMap::len))
    }

    pub fn is_empty(&self, collection: &str) -> Result<bool, StoreError> {
        Ok(self.len(collection)? == 0)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, State>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::InvalidData("memory store mutex poisoned".to_string()))
    }
}

#[async_trait::async_trait]
impl DocumentStore for MemoryStore {
    async fn fetch(
        &self,
        collection: &str,
        key: Uuid,
    ) -> Result<Option<StoredDocument>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .collections
            .get(collection)
            .and_then(|docs| docs.get(&key))
            .map(|(version, body)| StoredDocument {
                key,
                version: *version,
                body: body.clone(),
            }))
    }

    async fn query(
        &self,
        collection: &str,
        filter: &Filter,
    ) -> Result<Vec<StoredDocument>, StoreError> {
        let state = self.lock()?;
        let Some(docs) = state.collections.get(collection) else {
            return Ok(Vec::new());
        };
        Ok(docs
            .iter()
            .filter(|(_, (_, body))| filter.matches(body))
            .map(|(key, (version, body))| StoredDocument {
                key: *key,
                version: *version,
                body: body.clone(),
            })
            .collect())
    }

    async fn commit(
        &self,
        preconditions: Vec<Precondition>,
        mutations: Vec<Mutation>,
    ) -> Result<(), StoreError> {
        let mut state = self.lock()?;

        for precondition in &preconditions {
            let current = state
                .collections
                .get(precondition.collection)
                .and_then(|docs| docs.get(&precondition.key))
                .map(|(version, _)| *version);
            if current != precondition.expected {
                tracing::debug!(
                    collection = precondition.collection,
                    key = %precondition.key,
                    expected = ?precondition.expected,
                    actual = ?current,
                    "Precondition failed"
                );
                return Err(StoreError::conflict(precondition.collection, precondition.key));
            }
        }

        for mutation in mutations {
            match mutation {
                Mutation::Put {
                    collection,
                    key,
                    body,
                } => {
                    state.last_version += 1;
                    let version = state.last_version;
                    state
                        .collections
                        .entry(collection.to_string())
                        .or_default()
                        .insert(key, (version, body));
                }
                Mutation::Delete { collection, key } => {
                    if let Some(docs) = state.collections.get_mut(collection) {
                        docs.remove(&key);
                    }
                }
            }
        }

        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

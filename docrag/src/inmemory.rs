//! In-memory vector store with flat and IVF indexes.
//!
//! This module provides [`InMemoryVectorStore`], a vector store backed by a
//! `HashMap` protected by a `tokio::sync::RwLock`. It is suitable for
//! development, testing, and corpora that fit in memory.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::document::{DropKind, DroppedItem, EmbeddingRecord, QueryHit, QueryResult};
use crate::error::{RagError, Result};
use crate::index::{IndexParams, VectorIndex};
use crate::vectorstore::{BatchInsertOutcome, CollectionInfo, CollectionStatus, VectorStore};

const BACKEND: &str = "InMemory";

#[derive(Debug)]
struct CollectionState {
    dimension: usize,
    params: IndexParams,
    records: Vec<EmbeddingRecord>,
    slots: HashMap<String, usize>,
    index: Option<VectorIndex>,
}

impl CollectionState {
    fn info(&self, name: &str) -> CollectionInfo {
        CollectionInfo {
            name: name.to_string(),
            dimension: self.dimension,
            params: self.params,
            row_count: self.records.len(),
            status: if self.index.is_some() {
                CollectionStatus::Indexed
            } else {
                CollectionStatus::Unindexed
            },
        }
    }

    fn vectors(&self) -> Vec<&[f32]> {
        self.records.iter().map(|r| r.vector.as_slice()).collect()
    }
}

/// An in-memory vector store.
///
/// Collections are stored as collection name → records, with an id → slot map
/// so that re-inserting an id replaces the earlier record. All operations
/// are async-safe via `tokio::sync::RwLock`.
///
/// # Example
///
/// ```rust,ignore
/// use docrag::{InMemoryVectorStore, IndexParams, VectorStore};
///
/// let store = InMemoryVectorStore::new();
/// store.ensure_collection("docs", 384, &IndexParams::default()).await?;
/// ```
#[derive(Debug, Default)]
pub struct InMemoryVectorStore {
    collections: RwLock<HashMap<String, CollectionState>>,
}

impl InMemoryVectorStore {
    /// Create a new empty in-memory vector store.
    pub fn new() -> Self {
        Self::default()
    }
}

fn not_ready(collection: &str, reason: &str) -> RagError {
    RagError::StoreNotReady { collection: collection.to_string(), reason: reason.to_string() }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    fn backend(&self) -> &str {
        BACKEND
    }

    async fn ensure_collection(
        &self,
        name: &str,
        dimension: usize,
        params: &IndexParams,
    ) -> Result<CollectionInfo> {
        if dimension == 0 {
            return Err(RagError::ConfigError("collection dimension must be greater than zero".into()));
        }
        let mut collections = self.collections.write().await;
        if collections.remove(name).is_some() {
            debug!(collection = name, "dropped existing collection");
        }
        let state = CollectionState {
            dimension,
            params: *params,
            records: Vec::new(),
            slots: HashMap::new(),
            index: None,
        };
        let info = state.info(name);
        collections.insert(name.to_string(), state);
        info!(collection = name, dimension, "created collection");
        Ok(info)
    }

    async fn drop_collection(&self, name: &str) -> Result<()> {
        let mut collections = self.collections.write().await;
        collections.remove(name);
        Ok(())
    }

    async fn describe_collection(&self, name: &str) -> Result<Option<CollectionInfo>> {
        let collections = self.collections.read().await;
        Ok(collections.get(name).map(|state| state.info(name)))
    }

    async fn insert_batch(
        &self,
        collection: &str,
        records: &[EmbeddingRecord],
    ) -> Result<BatchInsertOutcome> {
        let mut collections = self.collections.write().await;
        let state = collections
            .get_mut(collection)
            .ok_or_else(|| not_ready(collection, "collection does not exist"))?;

        let mut outcome = BatchInsertOutcome::default();
        for record in records {
            if record.vector.len() != state.dimension {
                let error = RagError::DimensionMismatch {
                    id: record.id.clone(),
                    expected: state.dimension,
                    actual: record.vector.len(),
                };
                outcome.rejected.push(DroppedItem::new(
                    &record.id,
                    DropKind::DimensionMismatch,
                    error.to_string(),
                ));
                continue;
            }
            match state.slots.get(&record.id) {
                Some(&slot) => state.records[slot] = record.clone(),
                None => {
                    state.slots.insert(record.id.clone(), state.records.len());
                    state.records.push(record.clone());
                }
            }
            outcome.inserted += 1;
        }
        if outcome.inserted > 0 {
            state.index = None;
        }
        Ok(outcome)
    }

    async fn build_index(&self, collection: &str, params: &IndexParams) -> Result<CollectionInfo> {
        let mut collections = self.collections.write().await;
        let state = collections
            .get_mut(collection)
            .ok_or_else(|| not_ready(collection, "collection does not exist"))?;
        let index = VectorIndex::build(params, &state.vectors());
        state.params = *params;
        state.index = Some(index);
        info!(collection, rows = state.records.len(), index = ?params.index_type, "built index");
        Ok(state.info(collection))
    }

    async fn query(&self, collection: &str, vector: &[f32], k: usize) -> Result<QueryResult> {
        let collections = self.collections.read().await;
        let state = collections
            .get(collection)
            .ok_or_else(|| not_ready(collection, "collection does not exist"))?;
        let index = state.index.as_ref().ok_or_else(|| not_ready(collection, "index has not been built"))?;
        if vector.len() != state.dimension {
            return Err(RagError::DimensionMismatch {
                id: "query".into(),
                expected: state.dimension,
                actual: vector.len(),
            });
        }

        let hits = index
            .search(&state.vectors(), vector, k)
            .into_iter()
            .map(|(slot, distance)| QueryHit { id: state.records[slot].id.clone(), distance })
            .collect();
        Ok(hits)
    }
}

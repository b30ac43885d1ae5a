//! Vector store trait for storing and searching vector embeddings.
//!
//! A collection is either absent, present but unindexed, or present and
//! indexed. Only indexed collections answer queries; inserting into an
//! indexed collection moves it back to unindexed until the next
//! [`build_index`](VectorStore::build_index).

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::StoreConfig;
use crate::document::{DropKind, DroppedItem, EmbeddingRecord, QueryResult};
use crate::error::{RagError, Result};
use crate::index::IndexParams;

/// Whether a collection can serve queries.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CollectionStatus {
    Unindexed,
    Indexed,
}

/// Schema and state of a collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CollectionInfo {
    pub name: String,
    pub dimension: usize,
    /// Parameters of the current index, or the ones requested at creation.
    pub params: IndexParams,
    pub row_count: usize,
    pub status: CollectionStatus,
}

impl CollectionInfo {
    pub fn is_indexed(&self) -> bool {
        self.status == CollectionStatus::Indexed
    }
}

/// Result of one [`VectorStore::insert_batch`] call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchInsertOutcome {
    pub inserted: usize,
    /// Records refused individually, such as those with the wrong dimension.
    pub rejected: Vec<DroppedItem>,
}

/// Batching and deadline for [`VectorStore::insert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertOptions {
    pub batch_size: usize,
    pub timeout: Duration,
}

impl Default for InsertOptions {
    fn default() -> Self {
        Self::from(&StoreConfig::default())
    }
}

impl From<&StoreConfig> for InsertOptions {
    fn from(config: &StoreConfig) -> Self {
        Self { batch_size: config.insert_batch_size, timeout: config.timeout() }
    }
}

/// Counters for one [`VectorStore::insert`] call.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct InsertReport {
    pub inserted: usize,
    /// Batches that failed as a whole and were retried record by record.
    pub retried_batches: usize,
    /// Records that were not stored.
    pub failures: Vec<DroppedItem>,
}

/// A storage backend for vector embeddings with similarity search.
///
/// Implementations manage named collections of [`EmbeddingRecord`]s. A
/// record inserted with an id that already exists replaces the old one.
///
/// # Example
///
/// ```rust,ignore
/// use docrag::{InMemoryVectorStore, IndexParams, InsertOptions, VectorStore};
///
/// let store = InMemoryVectorStore::new();
/// store.ensure_collection("docs", 384, &IndexParams::default()).await?;
/// store.insert("docs", &records, &InsertOptions::default()).await?;
/// store.build_index("docs", &IndexParams::default()).await?;
/// let hits = store.query("docs", &query_vector, 5).await?;
/// ```
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Short name used in logs and errors.
    fn backend(&self) -> &str {
        "store"
    }

    /// Create an empty, unindexed collection, dropping any existing
    /// collection of the same name first.
    async fn ensure_collection(
        &self,
        name: &str,
        dimension: usize,
        params: &IndexParams,
    ) -> Result<CollectionInfo>;

    /// Delete a collection and all its records. No-op if it does not exist.
    async fn drop_collection(&self, name: &str) -> Result<()>;

    /// Schema and state of a collection, or `None` if it does not exist.
    async fn describe_collection(&self, name: &str) -> Result<Option<CollectionInfo>>;

    /// Store one batch of records.
    ///
    /// Records with the wrong dimension are rejected individually and the
    /// rest of the batch is stored. Fails with [`RagError::StoreNotReady`]
    /// if the collection does not exist.
    async fn insert_batch(
        &self,
        collection: &str,
        records: &[EmbeddingRecord],
    ) -> Result<BatchInsertOutcome>;

    /// Build (or rebuild) the similarity index over all stored records.
    async fn build_index(&self, collection: &str, params: &IndexParams) -> Result<CollectionInfo>;

    /// Return up to `k` hits ordered by ascending distance.
    ///
    /// Fails with [`RagError::StoreNotReady`] if the collection is absent or
    /// unindexed, and with [`RagError::DimensionMismatch`] if `vector` has
    /// the wrong dimension.
    async fn query(&self, collection: &str, vector: &[f32], k: usize) -> Result<QueryResult>;

    /// Insert `records` in batches of `options.batch_size`.
    ///
    /// A batch that fails as a whole (or times out) is retried one record at
    /// a time; records that still fail are reported in
    /// [`InsertReport::failures`]. A missing collection is fatal.
    async fn insert(
        &self,
        collection: &str,
        records: &[EmbeddingRecord],
        options: &InsertOptions,
    ) -> Result<InsertReport> {
        if options.batch_size == 0 {
            return Err(RagError::ConfigError("insert batch size must be greater than zero".into()));
        }

        let mut report = InsertReport::default();
        for (index, batch) in records.chunks(options.batch_size).enumerate() {
            match with_timeout(options.timeout, "insert batch", self.insert_batch(collection, batch)).await {
                Ok(outcome) => {
                    report.inserted += outcome.inserted;
                    report.failures.extend(outcome.rejected);
                }
                Err(e @ RagError::StoreNotReady { .. }) => return Err(e),
                Err(e) => {
                    warn!(
                        backend = self.backend(),
                        collection,
                        batch = index,
                        error = %e,
                        "insert batch failed, retrying records one at a time"
                    );
                    report.retried_batches += 1;
                    for record in batch {
                        let single = std::slice::from_ref(record);
                        match with_timeout(options.timeout, "insert record", self.insert_batch(collection, single))
                            .await
                        {
                            Ok(outcome) => {
                                report.inserted += outcome.inserted;
                                report.failures.extend(outcome.rejected);
                            }
                            Err(e @ RagError::StoreNotReady { .. }) => return Err(e),
                            Err(e) => {
                                warn!(record.id = %record.id, error = %e, "record rejected by store");
                                report.failures.push(DroppedItem::new(
                                    &record.id,
                                    DropKind::StoreRejected,
                                    e.to_string(),
                                ));
                            }
                        }
                    }
                }
            }
            info!(
                collection,
                batch = index,
                inserted = report.inserted,
                total = records.len(),
                "insert progress"
            );
        }
        Ok(report)
    }
}

/// Run `future` with a deadline, mapping expiry to [`RagError::Timeout`].
pub async fn with_timeout<T>(
    timeout: Duration,
    operation: &str,
    future: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::time::timeout(timeout, future)
        .await
        .map_err(|_| RagError::Timeout { operation: operation.to_string(), timeout })?
}

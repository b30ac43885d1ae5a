//! Query-time retrieval: embed, search, resolve.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::RetrievalConfig;
use crate::document::{Chunk, ChunkMetadata, EmbeddingRecord, ResolvedHit};
use crate::embedder::BatchEmbedder;
use crate::error::{RagError, Result};
use crate::vectorstore::VectorStore;

/// Chunk id → display metadata, built at ingestion time.
///
/// Hits are resolved with a single map lookup.
#[derive(Debug, Clone, Default)]
pub struct MetadataIndex {
    entries: HashMap<String, ChunkMetadata>,
}

impl MetadataIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: &[EmbeddingRecord]) -> Self {
        let entries = records.iter().map(|r| (r.id.clone(), r.metadata.clone())).collect();
        Self { entries }
    }

    pub fn from_chunks(chunks: &[Chunk]) -> Self {
        let entries = chunks.iter().map(|c| (c.id.clone(), ChunkMetadata::from(c))).collect();
        Self { entries }
    }

    pub fn insert(&mut self, id: impl Into<String>, metadata: ChunkMetadata) {
        self.entries.insert(id.into(), metadata);
    }

    pub fn get(&self, id: &str) -> Option<&ChunkMetadata> {
        self.entries.get(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Embeds a query, searches one collection and resolves the hits.
///
/// The store returns ids and distances only; titles and bodies come from
/// the [`MetadataIndex`]. A process that did not run the ingestion itself
/// rebuilds the index from the saved chunk corpus with
/// `MetadataIndex::from_chunks(&load_chunk_corpus(path)?)`.
///
/// # Example
///
/// ```rust,ignore
/// let retriever = Retriever::new(embedder, store, "medical_rag", Arc::new(metadata));
/// for hit in retriever.retrieve("adrenal tumor symptoms", 5).await? {
///     println!("{} {:.3} {}", hit.rank, hit.distance, hit.title);
/// }
/// ```
pub struct Retriever {
    embedder: Arc<BatchEmbedder>,
    store: Arc<dyn VectorStore>,
    collection: String,
    metadata: Arc<MetadataIndex>,
    config: RetrievalConfig,
}

impl Retriever {
    pub fn new(
        embedder: Arc<BatchEmbedder>,
        store: Arc<dyn VectorStore>,
        collection: impl Into<String>,
        metadata: Arc<MetadataIndex>,
    ) -> Self {
        Self {
            embedder,
            store,
            collection: collection.into(),
            metadata,
            config: RetrievalConfig::default(),
        }
    }

    pub fn with_config(mut self, config: RetrievalConfig) -> Self {
        self.config = config;
        self
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn metadata(&self) -> &MetadataIndex {
        &self.metadata
    }

    /// Retrieve with the configured `top_k`.
    pub async fn retrieve_default(&self, query: &str) -> Result<Vec<ResolvedHit>> {
        self.retrieve(query, self.config.top_k).await
    }

    /// Return up to `k` resolved hits ordered by ascending distance.
    ///
    /// Zero hits is a normal outcome and returns an empty `Vec`. Hits whose
    /// id has no metadata are skipped with a warning, as are hits beyond the
    /// configured `max_distance`.
    ///
    /// # Errors
    ///
    /// - [`RagError::MalformedInput`] for an empty query or `k == 0`
    /// - [`RagError::StoreNotReady`] if the collection is absent or unindexed
    /// - embedding and store failures as returned by those components
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<ResolvedHit>> {
        if k == 0 {
            return Err(RagError::MalformedInput {
                document: "query".into(),
                reason: "k must be greater than zero".into(),
            });
        }
        let vector = self.embedder.embed_query(query).await?;
        let hits = self.store.query(&self.collection, &vector, k).await?;

        let mut resolved = Vec::with_capacity(hits.len());
        for hit in hits {
            if self.config.max_distance.is_some_and(|max| hit.distance > max) {
                continue;
            }
            let Some(metadata) = self.metadata.get(&hit.id) else {
                warn!(collection = %self.collection, id = %hit.id, "hit has no metadata, skipping");
                continue;
            };
            resolved.push(ResolvedHit {
                rank: resolved.len(),
                id: hit.id,
                title: metadata.title.clone(),
                text: metadata.text.clone(),
                corpus_name: metadata.corpus_name.clone(),
                chunk_index: metadata.chunk_index,
                source: metadata.source.clone(),
                distance: hit.distance,
            });
        }

        info!(collection = %self.collection, k, hits = resolved.len(), "retrieval finished");
        Ok(resolved)
    }
}

impl std::fmt::Debug for Retriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Retriever")
            .field("collection", &self.collection)
            .field("metadata_entries", &self.metadata.len())
            .field("config", &self.config)
            .finish()
    }
}

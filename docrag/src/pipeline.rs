//! Ingestion pipeline orchestrator.
//!
//! The [`RagPipeline`] runs the full ingestion workflow by composing a
//! [`Chunker`], a [`BatchEmbedder`] and a [`VectorStore`]:
//!
//! ```text
//! documents -> segment -> embed -> insert -> build index
//! ```
//!
//! The index is built last, so a run that is cancelled part way leaves the
//! collection unindexed and queries against it fail with
//! [`RagError::StoreNotReady`] rather than returning partial results.
//!
//! # Example
//!
//! ```rust,ignore
//! use docrag::{InMemoryVectorStore, RagConfig, RagPipeline};
//!
//! let pipeline = RagPipeline::builder()
//!     .config(RagConfig::default())
//!     .embedding_provider(Arc::new(my_embedder))
//!     .vector_store(Arc::new(InMemoryVectorStore::new()))
//!     .build()?;
//!
//! let outcome = pipeline.ingest(&documents).await?;
//! let retriever = pipeline.retriever(Arc::new(outcome.metadata));
//! let hits = retriever.retrieve("adrenal tumor symptoms", 5).await?;
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::chunking::{Chunker, chunker_for};
use crate::config::RagConfig;
use crate::document::{Chunk, Document, DroppedItem};
use crate::embedder::{BatchEmbedder, ProgressObserver};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::retrieval::{MetadataIndex, Retriever};
use crate::vectorstore::{InsertOptions, VectorStore, with_timeout};

/// A document that produced no chunks because it had no usable text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SkippedDocument {
    /// Position of the document in the input.
    pub position: usize,
    pub reason: String,
}

/// Chunks of a whole corpus in document order.
#[derive(Debug, Clone, Default)]
pub struct SegmentOutput {
    pub chunks: Vec<Chunk>,
    pub skipped: Vec<SkippedDocument>,
}

/// Summary of one ingestion run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IngestReport {
    pub collection: String,
    pub documents_seen: usize,
    pub documents_skipped: Vec<SkippedDocument>,
    pub chunks_produced: usize,
    pub excluded_short: usize,
    pub embedded: usize,
    pub retried_batches: usize,
    pub degraded_batches: usize,
    pub inserted: usize,
    pub insert_retried_batches: usize,
    /// Items lost to embedding or insert failures.
    pub dropped: Vec<DroppedItem>,
    pub indexed: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl IngestReport {
    fn new(collection: &str, started_at: DateTime<Utc>) -> Self {
        Self {
            collection: collection.to_string(),
            documents_seen: 0,
            documents_skipped: Vec::new(),
            chunks_produced: 0,
            excluded_short: 0,
            embedded: 0,
            retried_batches: 0,
            degraded_batches: 0,
            inserted: 0,
            insert_retried_batches: 0,
            dropped: Vec::new(),
            indexed: false,
            started_at,
            finished_at: started_at,
        }
    }

    pub fn elapsed(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

/// Report plus the lookup table retrieval needs.
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub report: IngestReport,
    pub metadata: MetadataIndex,
}

/// The ingestion pipeline orchestrator.
///
/// Construct one via [`RagPipeline::builder()`].
pub struct RagPipeline {
    config: RagConfig,
    embedder: Arc<BatchEmbedder>,
    vector_store: Arc<dyn VectorStore>,
    chunker: Arc<dyn Chunker>,
}

impl RagPipeline {
    /// Create a new [`RagPipelineBuilder`].
    pub fn builder() -> RagPipelineBuilder {
        RagPipelineBuilder::default()
    }

    /// Return a reference to the pipeline configuration.
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    pub fn embedder(&self) -> &Arc<BatchEmbedder> {
        &self.embedder
    }

    /// Return a reference to the vector store.
    pub fn vector_store(&self) -> &Arc<dyn VectorStore> {
        &self.vector_store
    }

    /// Name of the collection this pipeline writes to.
    pub fn collection(&self) -> &str {
        &self.config.store.collection
    }

    /// A retriever over this pipeline's collection.
    pub fn retriever(&self, metadata: Arc<MetadataIndex>) -> Retriever {
        Retriever::new(self.embedder.clone(), self.vector_store.clone(), self.collection(), metadata)
            .with_config(self.config.retrieval.clone())
    }

    /// Segment every document into chunks.
    ///
    /// Documents are chunked on the blocking pool, up to `concurrency` at a
    /// time. Chunks come back in document order and are numbered per corpus
    /// across the whole input, so ids stay unique when several documents
    /// share a corpus. Documents without text are skipped and reported.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::PipelineError`] if a segmentation task panics.
    pub async fn segment_corpus(&self, documents: &[Document]) -> Result<SegmentOutput> {
        let default_corpus = self.config.default_corpus_name.as_str();
        let mut per_document: Vec<Option<Vec<Chunk>>> = vec![None; documents.len()];
        let mut skipped = Vec::new();

        let mut tasks = stream::iter(0..documents.len())
            .map(|position| {
                let chunker = self.chunker.clone();
                let mut document = documents[position].clone();
                document.corpus_name = Some(document.corpus_or(default_corpus).to_string());
                async move {
                    if !document.has_text() {
                        let label = document.source.clone().unwrap_or_else(|| format!("document #{position}"));
                        return (position, Err(RagError::MalformedInput {
                            document: label,
                            reason: "document has no text".into(),
                        }));
                    }
                    let chunks = tokio::task::spawn_blocking(move || chunker.chunk(&document))
                        .await
                        .map_err(|e| RagError::PipelineError(format!("segmentation task failed: {e}")));
                    (position, chunks)
                }
            })
            .buffer_unordered(self.config.embedder.concurrency.max(1));

        while let Some((position, result)) = tasks.next().await {
            match result {
                Ok(chunks) => {
                    debug!(document = position, chunk_count = chunks.len(), "segmented document");
                    per_document[position] = Some(chunks);
                }
                Err(e @ RagError::MalformedInput { .. }) => {
                    warn!(document = position, error = %e, "skipping document");
                    skipped.push(SkippedDocument { position, reason: e.to_string() });
                }
                Err(e) => {
                    error!(document = position, error = %e, "segmentation failed");
                    return Err(e);
                }
            }
        }
        drop(tasks);
        skipped.sort_by_key(|s| s.position);

        let mut next_index: HashMap<String, usize> = HashMap::new();
        let mut chunks = Vec::new();
        for mut chunk in per_document.into_iter().flatten().flatten() {
            let next = next_index.entry(chunk.corpus_name.clone()).or_default();
            chunk.renumber(*next);
            *next += 1;
            chunks.push(chunk);
        }

        info!(documents = documents.len(), skipped = skipped.len(), chunk_count = chunks.len(), "segmentation finished");
        Ok(SegmentOutput { chunks, skipped })
    }

    /// Ingest documents: segment, embed, insert and build the index.
    ///
    /// The target collection is recreated from scratch.
    ///
    /// # Errors
    ///
    /// Returns an error only when the run cannot continue at all: the store
    /// cannot be reached, the collection cannot be created or indexed, or a
    /// segmentation task fails. Per-document and per-item failures are
    /// reported in [`IngestReport`].
    pub async fn ingest(&self, documents: &[Document]) -> Result<IngestOutcome> {
        let started_at = Utc::now();
        let segmented = self.segment_corpus(documents).await?;
        let mut report = IngestReport::new(self.collection(), started_at);
        report.documents_seen = documents.len();
        report.documents_skipped = segmented.skipped;
        self.store_chunks(&segmented.chunks, report).await
    }

    /// Ingest already segmented chunks, such as a loaded chunk corpus.
    pub async fn ingest_chunks(&self, chunks: &[Chunk]) -> Result<IngestOutcome> {
        let report = IngestReport::new(self.collection(), Utc::now());
        self.store_chunks(chunks, report).await
    }

    async fn store_chunks(&self, chunks: &[Chunk], mut report: IngestReport) -> Result<IngestOutcome> {
        let collection = self.config.store.collection.as_str();
        let store_timeout = self.config.store.timeout();
        report.chunks_produced = chunks.len();

        with_timeout(
            store_timeout,
            "ensure collection",
            self.vector_store.ensure_collection(collection, self.embedder.dimension(), &self.config.store.index),
        )
        .await
        .map_err(|e| {
            error!(collection, error = %e, "failed to create collection");
            e
        })?;

        let embedded = self.embedder.embed_chunks(chunks).await?;
        report.excluded_short = embedded.report.excluded_short;
        report.embedded = embedded.report.embedded;
        report.retried_batches = embedded.report.retried_batches;
        report.degraded_batches = embedded.report.degraded_batches;
        report.dropped = embedded.report.dropped;

        let options = InsertOptions::from(&self.config.store);
        let inserted = self
            .vector_store
            .insert(collection, &embedded.records, &options)
            .await
            .map_err(|e| {
                error!(collection, error = %e, "insert failed");
                e
            })?;
        if inserted.inserted == 0 && !embedded.records.is_empty() {
            let e = RagError::VectorStoreError {
                backend: self.vector_store.backend().to_string(),
                message: format!("none of {} records could be stored", embedded.records.len()),
            };
            error!(collection, error = %e, "insert failed");
            return Err(e);
        }
        report.inserted = inserted.inserted;
        report.insert_retried_batches = inserted.retried_batches;
        report.dropped.extend(inserted.failures);

        let info = with_timeout(
            store_timeout,
            "build index",
            self.vector_store.build_index(collection, &self.config.store.index),
        )
        .await
        .map_err(|e| {
            error!(collection, error = %e, "failed to build index");
            e
        })?;
        report.indexed = info.is_indexed();
        report.finished_at = Utc::now();

        info!(
            collection,
            documents = report.documents_seen,
            skipped = report.documents_skipped.len(),
            chunks = report.chunks_produced,
            excluded_short = report.excluded_short,
            embedded = report.embedded,
            inserted = report.inserted,
            dropped = report.dropped.len(),
            retried_batches = report.retried_batches + report.insert_retried_batches,
            degraded_batches = report.degraded_batches,
            elapsed_ms = report.elapsed().num_milliseconds(),
            "ingestion finished"
        );

        Ok(IngestOutcome { report, metadata: MetadataIndex::from_records(&embedded.records) })
    }
}

impl std::fmt::Debug for RagPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RagPipeline")
            .field("config", &self.config)
            .field("embedder", &self.embedder)
            .field("vector_store", &self.vector_store.backend())
            .finish()
    }
}

/// Builder for constructing a [`RagPipeline`].
///
/// `config`, `embedding_provider` and `vector_store` are required. The
/// chunker defaults to the one selected by `config.segmenter.strategy`.
///
/// # Example
///
/// ```rust,ignore
/// let pipeline = RagPipeline::builder()
///     .config(RagConfig::default())
///     .embedding_provider(Arc::new(embedder))
///     .vector_store(Arc::new(store))
///     .chunker(Arc::new(ParagraphChunker::new(1000, 100)))  // optional
///     .build()?;
/// ```
#[derive(Default)]
pub struct RagPipelineBuilder {
    config: Option<RagConfig>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    vector_store: Option<Arc<dyn VectorStore>>,
    chunker: Option<Arc<dyn Chunker>>,
    observer: Option<Arc<dyn ProgressObserver>>,
}

impl RagPipelineBuilder {
    /// Set the pipeline configuration.
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the embedding provider.
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Set the vector store backend.
    pub fn vector_store(mut self, store: Arc<dyn VectorStore>) -> Self {
        self.vector_store = Some(store);
        self
    }

    /// Override the document chunker.
    pub fn chunker(mut self, chunker: Arc<dyn Chunker>) -> Self {
        self.chunker = Some(chunker);
        self
    }

    /// Receive embedding progress updates.
    pub fn progress_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Build the [`RagPipeline`], validating the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if a required field is missing or
    /// the configuration is invalid.
    pub fn build(self) -> Result<RagPipeline> {
        let config =
            self.config.ok_or_else(|| RagError::ConfigError("config is required".to_string()))?;
        config.validate()?;
        let embedding_provider = self
            .embedding_provider
            .ok_or_else(|| RagError::ConfigError("embedding_provider is required".to_string()))?;
        let vector_store = self
            .vector_store
            .ok_or_else(|| RagError::ConfigError("vector_store is required".to_string()))?;
        let chunker = self.chunker.unwrap_or_else(|| chunker_for(&config.segmenter));

        let mut embedder = BatchEmbedder::new(embedding_provider, config.embedder.clone());
        if let Some(observer) = self.observer {
            embedder = embedder.with_observer(observer);
        }

        Ok(RagPipeline { config, embedder: Arc::new(embedder), vector_store, chunker })
    }
}

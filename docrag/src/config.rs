//! Configuration for segmentation, embedding, storage and retrieval.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};
use crate::index::IndexParams;

/// Corpus name used when neither the document nor the config names one.
pub const DEFAULT_CORPUS_NAME: &str = "medical";

/// Which chunker the pipeline uses.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ChunkingStrategy {
    /// Heading detection with a fixed-length fallback.
    #[default]
    Structural,
    /// Fixed-length windows only.
    FixedLength,
    /// Line paragraphs, sentence packing and short-unit merging.
    Paragraph,
}

/// Parameters for the segmenter and the alternative chunkers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SegmenterConfig {
    pub strategy: ChunkingStrategy,
    /// Window size of the fixed-length splitter, in characters.
    pub max_chunk_size: usize,
    /// Characters shared between consecutive fixed-length windows.
    pub overlap: usize,
    /// Below this many boundaries structural detection is not trusted.
    pub min_boundaries: usize,
    /// Candidates this close (in characters) to the previous accepted one are dropped.
    pub collapse_distance: usize,
    /// How far (in characters) the splitter looks around a window edge for a terminator.
    pub snap_window: usize,
    /// Structural sections longer than `oversize_factor * max_chunk_size` are re-split.
    pub oversize_factor: f64,
    /// Characters of body used for a preview title.
    pub title_preview_chars: usize,
    /// Characters the fixed-length splitter may cut after.
    pub sentence_terminators: Vec<char>,
    /// Paragraph chunker: units shorter than this are merged forward.
    pub min_chunk_size: usize,
    /// Paragraph chunker: a short final unit is kept only at or above this length.
    pub trailing_floor: usize,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            strategy: ChunkingStrategy::Structural,
            max_chunk_size: 1200,
            overlap: 150,
            min_boundaries: 5,
            collapse_distance: 50,
            snap_window: 50,
            oversize_factor: 1.5,
            title_preview_chars: 50,
            sentence_terminators: vec!['。', '.', '!', '?', '！', '？', '\n'],
            min_chunk_size: 100,
            trailing_floor: 50,
        }
    }
}

/// Parameters for the batch embedder.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbedderConfig {
    /// Chunks per embedding call.
    pub batch_size: usize,
    /// Chunks whose trimmed text is shorter than this are not embedded.
    pub min_content_chars: usize,
    /// Maximum number of batches in flight.
    pub concurrency: usize,
    /// Deadline for a single provider call, in milliseconds.
    pub timeout_ms: u64,
}

impl Default for EmbedderConfig {
    fn default() -> Self {
        Self { batch_size: 64, min_content_chars: 10, concurrency: 4, timeout_ms: 30_000 }
    }
}

impl EmbedderConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Parameters for the vector store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StoreConfig {
    /// Collection that ingestion writes and retrieval reads.
    pub collection: String,
    /// Records per insert call.
    pub insert_batch_size: usize,
    /// Deadline for a single store call, in milliseconds.
    pub timeout_ms: u64,
    pub index: IndexParams,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            collection: "medical_rag".to_string(),
            insert_batch_size: 100,
            timeout_ms: 30_000,
            index: IndexParams::default(),
        }
    }
}

impl StoreConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Parameters for retrieval.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Number of hits returned when the caller does not ask for a specific count.
    pub top_k: usize,
    /// Hits farther than this are filtered out.
    pub max_distance: Option<f32>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { top_k: 5, max_distance: None }
    }
}

/// Configuration for the whole ingestion and retrieval pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RagConfig {
    pub segmenter: SegmenterConfig,
    pub embedder: EmbedderConfig,
    pub store: StoreConfig,
    pub retrieval: RetrievalConfig,
    /// Corpus name for documents that do not carry one.
    pub default_corpus_name: String,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            segmenter: SegmenterConfig::default(),
            embedder: EmbedderConfig::default(),
            store: StoreConfig::default(),
            retrieval: RetrievalConfig::default(),
            default_corpus_name: DEFAULT_CORPUS_NAME.to_string(),
        }
    }
}

impl RagConfig {
    /// Create a new builder for constructing a [`RagConfig`].
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }

    /// Load a JSON config file. Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Io`] or [`RagError::Serialization`] if the file
    /// cannot be read or parsed, and [`RagError::ConfigError`] if it fails
    /// validation.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: RagConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if:
    /// - `overlap >= max_chunk_size`
    /// - `min_chunk_size > max_chunk_size`
    /// - `oversize_factor < 1.0`
    /// - any batch size, `concurrency`, `top_k` or `min_boundaries` is zero
    /// - the collection name or default corpus name is empty
    pub fn validate(&self) -> Result<()> {
        let seg = &self.segmenter;
        if seg.max_chunk_size == 0 {
            return Err(RagError::ConfigError("max_chunk_size must be greater than zero".into()));
        }
        if seg.overlap >= seg.max_chunk_size {
            return Err(RagError::ConfigError(format!(
                "overlap ({}) must be less than max_chunk_size ({})",
                seg.overlap, seg.max_chunk_size
            )));
        }
        if seg.min_chunk_size > seg.max_chunk_size {
            return Err(RagError::ConfigError(format!(
                "min_chunk_size ({}) must not exceed max_chunk_size ({})",
                seg.min_chunk_size, seg.max_chunk_size
            )));
        }
        if seg.min_boundaries == 0 {
            return Err(RagError::ConfigError("min_boundaries must be greater than zero".into()));
        }
        if seg.oversize_factor.is_nan() || seg.oversize_factor < 1.0 {
            return Err(RagError::ConfigError(format!(
                "oversize_factor ({}) must be at least 1.0",
                seg.oversize_factor
            )));
        }
        if self.embedder.batch_size == 0 {
            return Err(RagError::ConfigError("embedder batch_size must be greater than zero".into()));
        }
        if self.embedder.concurrency == 0 {
            return Err(RagError::ConfigError("concurrency must be greater than zero".into()));
        }
        if self.store.insert_batch_size == 0 {
            return Err(RagError::ConfigError("insert_batch_size must be greater than zero".into()));
        }
        if self.store.collection.trim().is_empty() {
            return Err(RagError::ConfigError("collection name must not be empty".into()));
        }
        if self.retrieval.top_k == 0 {
            return Err(RagError::ConfigError("top_k must be greater than zero".to_string()));
        }
        if self.default_corpus_name.trim().is_empty() {
            return Err(RagError::ConfigError("default_corpus_name must not be empty".into()));
        }
        Ok(())
    }
}

/// Builder for constructing a validated [`RagConfig`].
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
}

impl RagConfigBuilder {
    /// Select the chunking strategy.
    pub fn strategy(mut self, strategy: ChunkingStrategy) -> Self {
        self.config.segmenter.strategy = strategy;
        self
    }

    /// Set the fixed-length window size in characters.
    pub fn max_chunk_size(mut self, size: usize) -> Self {
        self.config.segmenter.max_chunk_size = size;
        self
    }

    /// Set the overlap between consecutive windows in characters.
    pub fn overlap(mut self, overlap: usize) -> Self {
        self.config.segmenter.overlap = overlap;
        self
    }

    /// Replace the whole segmenter section.
    pub fn segmenter(mut self, segmenter: SegmenterConfig) -> Self {
        self.config.segmenter = segmenter;
        self
    }

    /// Set the number of chunks per embedding call.
    pub fn embed_batch_size(mut self, size: usize) -> Self {
        self.config.embedder.batch_size = size;
        self
    }

    /// Set the minimum trimmed length of an embeddable chunk.
    pub fn min_content_chars(mut self, chars: usize) -> Self {
        self.config.embedder.min_content_chars = chars;
        self
    }

    /// Set the maximum number of embedding batches in flight.
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.config.embedder.concurrency = concurrency;
        self
    }

    /// Set the deadline for a single embedding call.
    pub fn embed_timeout(mut self, timeout: Duration) -> Self {
        self.config.embedder.timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the collection name.
    pub fn collection(mut self, name: impl Into<String>) -> Self {
        self.config.store.collection = name.into();
        self
    }

    /// Set the number of records per insert call.
    pub fn insert_batch_size(mut self, size: usize) -> Self {
        self.config.store.insert_batch_size = size;
        self
    }

    /// Set the deadline for a single store call.
    pub fn store_timeout(mut self, timeout: Duration) -> Self {
        self.config.store.timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the metric and index layout.
    pub fn index(mut self, params: IndexParams) -> Self {
        self.config.store.index = params;
        self
    }

    /// Set the default number of hits returned by retrieval.
    pub fn top_k(mut self, k: usize) -> Self {
        self.config.retrieval.top_k = k;
        self
    }

    /// Drop hits farther than `distance`.
    pub fn max_distance(mut self, distance: f32) -> Self {
        self.config.retrieval.max_distance = Some(distance);
        self
    }

    /// Set the corpus name used for documents without one.
    pub fn default_corpus_name(mut self, name: impl Into<String>) -> Self {
        self.config.default_corpus_name = name.into();
        self
    }

    /// Build the [`RagConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// See [`RagConfig::validate`].
    pub fn build(self) -> Result<RagConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

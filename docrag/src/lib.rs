//! Document chunking, batch embedding and vector retrieval.
//!
//! This crate provides:
//! - Structure-aware segmentation of long unstructured documents into chunks
//! - Batch embedding with bounded concurrency, retry and per-item degradation
//! - A logical vector store abstraction with an in-memory implementation
//! - Query-time retrieval that resolves hits back to chunk metadata
//!
//! # Feature flags
//!
//! - `openai`: [`openai::OpenAIEmbeddingProvider`] for OpenAI-compatible servers

pub mod artifact;
pub mod boundary;
pub mod chunking;
pub mod config;
pub mod document;
pub mod embedder;
pub mod embedding;
pub mod error;
pub mod index;
pub mod inmemory;
pub mod pipeline;
pub mod retrieval;
pub mod vectorstore;

#[cfg(feature = "openai")]
pub mod openai;

pub use artifact::{ChunkRecord, ChunkStats, load_chunk_corpus, load_documents, save_chunk_corpus};
pub use boundary::{
    Boundary, BoundaryDetector, DetectorChain, NumberedHeadingDetector, SectionVocabularyDetector,
    UppercaseHeadingDetector,
};
pub use chunking::{
    Chunker, FixedLengthChunker, FixedLengthSplitter, ParagraphChunker, StructuralChunker,
    chunker_for, segment,
};
pub use config::{
    ChunkingStrategy, DEFAULT_CORPUS_NAME, EmbedderConfig, RagConfig, RagConfigBuilder,
    RetrievalConfig, SegmenterConfig, StoreConfig,
};
pub use document::{
    Chunk, ChunkMetadata, Document, DropKind, DroppedItem, EmbeddingRecord, QueryHit, QueryResult,
    ResolvedHit,
};
pub use embedder::{
    BatchEmbedder, BatchState, EmbedOutput, EmbedProgress, EmbedReport, ProgressObserver,
};
pub use embedding::{EmbeddingProvider, l2_normalize};
pub use error::{RagError, Result};
pub use index::{IndexParams, IndexType, Metric, VectorIndex};
pub use inmemory::InMemoryVectorStore;
pub use pipeline::{
    IngestOutcome, IngestReport, RagPipeline, RagPipelineBuilder, SegmentOutput, SkippedDocument,
};
pub use retrieval::{MetadataIndex, Retriever};
pub use vectorstore::{
    BatchInsertOutcome, CollectionInfo, CollectionStatus, InsertOptions, InsertReport, VectorStore,
};

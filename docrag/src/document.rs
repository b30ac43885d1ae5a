//! Data types for documents, chunks, embedding records and query results.

use serde::{Deserialize, Serialize};

/// A source document: raw unstructured text plus the corpus it belongs to.
///
/// Deserializes from either a `text` or a `context` field. A missing text
/// deserializes as empty and is rejected as malformed at ingestion time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Document {
    /// The raw text of the document.
    #[serde(default, alias = "context")]
    pub text: String,
    /// Name of the corpus this document belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corpus_name: Option<String>,
    /// Optional name of the file the document was loaded from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl Document {
    /// Create a document belonging to `corpus_name`.
    pub fn new(text: impl Into<String>, corpus_name: impl Into<String>) -> Self {
        Self { text: text.into(), corpus_name: Some(corpus_name.into()), source: None }
    }

    /// Record the file this document came from.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// The corpus name, or `default` when the document does not carry one.
    pub fn corpus_or<'a>(&'a self, default: &'a str) -> &'a str {
        match self.corpus_name.as_deref() {
            Some(name) if !name.trim().is_empty() => name,
            _ => default,
        }
    }

    /// Whether the document has any non-whitespace text.
    pub fn has_text(&self) -> bool {
        !self.text.trim().is_empty()
    }
}

/// A contiguous span of a [`Document`] selected for independent retrieval.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// Stable identifier, `{corpus_name}_{chunk_index:06}`.
    pub id: String,
    /// Detected heading, or a preview of the body.
    pub title: String,
    /// The chunk body. Never empty.
    pub text: String,
    /// The corpus the source document belongs to.
    pub corpus_name: String,
    /// Zero-based position in emission order.
    pub chunk_index: usize,
    /// Source file of the parent document, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl Chunk {
    /// Build the identifier for the chunk at `index` within `corpus_name`.
    pub fn make_id(corpus_name: &str, index: usize) -> String {
        format!("{corpus_name}_{index:06}")
    }

    /// Length of the body in characters.
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }

    /// Move the chunk to a new sequence position, regenerating its id.
    pub fn renumber(&mut self, index: usize) {
        self.chunk_index = index;
        self.id = Self::make_id(&self.corpus_name, index);
    }
}

/// Display metadata carried next to every stored vector.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkMetadata {
    pub title: String,
    pub text: String,
    pub corpus_name: String,
    pub chunk_index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl From<&Chunk> for ChunkMetadata {
    fn from(chunk: &Chunk) -> Self {
        Self {
            title: chunk.title.clone(),
            text: chunk.text.clone(),
            corpus_name: chunk.corpus_name.clone(),
            chunk_index: chunk.chunk_index,
            source: chunk.source.clone(),
        }
    }
}

/// A chunk id paired with its L2-normalized embedding and denormalized metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingRecord {
    /// The id of the source [`Chunk`].
    pub id: String,
    /// The embedding vector.
    pub vector: Vec<f32>,
    /// Metadata needed to display the hit without another lookup.
    pub metadata: ChunkMetadata,
}

impl EmbeddingRecord {
    /// Pair `chunk` with `vector`.
    pub fn new(chunk: &Chunk, vector: Vec<f32>) -> Self {
        Self { id: chunk.id.clone(), vector, metadata: ChunkMetadata::from(chunk) }
    }
}

/// One entry of a [`QueryResult`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryHit {
    /// The id of the matching record.
    pub id: String,
    /// Distance under the collection metric (lower is closer).
    pub distance: f32,
}

/// Hits ordered by ascending distance, rank 0 first.
pub type QueryResult = Vec<QueryHit>;

/// A query hit resolved back to chunk metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResolvedHit {
    /// Zero-based rank, 0 being the closest.
    pub rank: usize,
    pub id: String,
    pub title: String,
    pub text: String,
    pub corpus_name: String,
    pub chunk_index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Distance under the collection metric (lower is closer).
    pub distance: f32,
}

/// Why an item was left out of the pipeline output.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DropKind {
    /// The embedding call failed even for the single item.
    EmbeddingFailed,
    /// The provider returned a zero or non-finite vector.
    InvalidVector,
    /// The vector did not have the expected dimension.
    DimensionMismatch,
    /// The store refused the record even when retried on its own.
    StoreRejected,
}

/// An item excluded from the output, with the reason.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DroppedItem {
    pub id: String,
    pub kind: DropKind,
    pub reason: String,
}

impl DroppedItem {
    pub fn new(id: impl Into<String>, kind: DropKind, reason: impl Into<String>) -> Self {
        Self { id: id.into(), kind, reason: reason.into() }
    }
}

//! JSON artifacts: source document files and the chunk corpus file.
//!
//! The chunk corpus is the hand-off between segmentation and embedding. Each
//! record stores the chunk body under `abstract` together with the fields the
//! retrieval side displays.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::document::{Chunk, Document};
use crate::error::Result;

/// On-disk form of a [`Chunk`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkRecord {
    pub id: String,
    pub title: String,
    #[serde(rename = "abstract")]
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_file: Option<String>,
    pub chunk_index: usize,
    pub corpus_name: String,
    /// Body length in characters.
    pub chunk_length: usize,
}

impl From<&Chunk> for ChunkRecord {
    fn from(chunk: &Chunk) -> Self {
        Self {
            id: chunk.id.clone(),
            title: chunk.title.clone(),
            body: chunk.text.clone(),
            source_file: chunk.source.clone(),
            chunk_index: chunk.chunk_index,
            corpus_name: chunk.corpus_name.clone(),
            chunk_length: chunk.char_len(),
        }
    }
}

impl From<ChunkRecord> for Chunk {
    fn from(record: ChunkRecord) -> Self {
        Self {
            id: record.id,
            title: record.title,
            text: record.body,
            corpus_name: record.corpus_name,
            chunk_index: record.chunk_index,
            source: record.source_file,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

/// Read documents from a JSON file holding one document object or an array.
///
/// Documents without a `source` get the file name.
///
/// # Errors
///
/// Returns [`RagError::Io`](crate::RagError::Io) or
/// [`RagError::Serialization`](crate::RagError::Serialization).
pub fn load_documents(path: impl AsRef<Path>) -> Result<Vec<Document>> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path)?;
    let documents = match serde_json::from_str::<OneOrMany<Document>>(&raw)? {
        OneOrMany::Many(documents) => documents,
        OneOrMany::One(document) => vec![document],
    };
    let file_name = path.file_name().map(|n| n.to_string_lossy().into_owned());
    let documents: Vec<Document> = documents
        .into_iter()
        .map(|mut d| {
            if d.source.is_none() {
                d.source = file_name.clone();
            }
            d
        })
        .collect();
    debug!(path = %path.display(), count = documents.len(), "loaded documents");
    Ok(documents)
}

/// Write `chunks` as a pretty-printed JSON array of [`ChunkRecord`]s.
pub fn save_chunk_corpus(path: impl AsRef<Path>, chunks: &[Chunk]) -> Result<()> {
    let path = path.as_ref();
    let records: Vec<ChunkRecord> = chunks.iter().map(ChunkRecord::from).collect();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_string_pretty(&records)?)?;
    info!(path = %path.display(), chunks = chunks.len(), "saved chunk corpus");
    Ok(())
}

/// Read a chunk corpus written by [`save_chunk_corpus`].
pub fn load_chunk_corpus(path: impl AsRef<Path>) -> Result<Vec<Chunk>> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path)?;
    let records: Vec<ChunkRecord> = serde_json::from_str(&raw)?;
    debug!(path = %path.display(), chunks = records.len(), "loaded chunk corpus");
    Ok(records.into_iter().map(Chunk::from).collect())
}

/// Length distribution of a chunk corpus.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct ChunkStats {
    pub total: usize,
    pub average_chars: f64,
    pub min_chars: usize,
    pub max_chars: usize,
    /// Chunks under 500 characters.
    pub short: usize,
    /// Chunks of 500 to 1499 characters.
    pub medium: usize,
    /// Chunks of 1500 characters or more.
    pub long: usize,
}

impl ChunkStats {
    pub fn from_chunks(chunks: &[Chunk]) -> Self {
        if chunks.is_empty() {
            return Self::default();
        }
        let lengths: Vec<usize> = chunks.iter().map(Chunk::char_len).collect();
        let mut stats = Self {
            total: lengths.len(),
            average_chars: lengths.iter().sum::<usize>() as f64 / lengths.len() as f64,
            min_chars: lengths.iter().copied().min().unwrap_or_default(),
            max_chars: lengths.iter().copied().max().unwrap_or_default(),
            ..Self::default()
        };
        for len in lengths {
            match len {
                0..500 => stats.short += 1,
                500..1500 => stats.medium += 1,
                _ => stats.long += 1,
            }
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(index: usize, text: &str) -> Chunk {
        Chunk {
            id: Chunk::make_id("medical", index),
            title: format!("Title {index}"),
            text: text.to_string(),
            corpus_name: "medical".into(),
            chunk_index: index,
            source: Some("medical.json".into()),
        }
    }

    #[test]
    fn chunk_corpus_survives_a_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("chunks.json");
        let chunks = vec![chunk(0, "first body"), chunk(1, "第二")];
        save_chunk_corpus(&path, &chunks).unwrap();
        assert_eq!(load_chunk_corpus(&path).unwrap(), chunks);
    }

    #[test]
    fn chunk_record_uses_abstract_field_and_char_length() {
        let value = serde_json::to_value(ChunkRecord::from(&chunk(3, "数据集"))).unwrap();
        assert_eq!(value["abstract"], "数据集");
        assert_eq!(value["chunk_length"], 3);
        assert_eq!(value["id"], "medical_000003");
        assert_eq!(value["source_file"], "medical.json");
    }

    #[test]
    fn load_documents_accepts_single_object() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("medical.json");
        fs::write(&path, r#"{"context": "Body", "corpus_name": "medical"}"#).unwrap();
        let docs = load_documents(&path).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].text, "Body");
        assert_eq!(docs[0].source.as_deref(), Some("medical.json"));
    }

    #[test]
    fn load_documents_accepts_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docs.json");
        fs::write(
            &path,
            r#"[{"text": "a", "corpus_name": "x"}, {"text": "b", "source": "b.txt"}]"#,
        )
        .unwrap();
        let docs = load_documents(&path).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[1].source.as_deref(), Some("b.txt"));
        assert_eq!(docs[1].corpus_name, None);
    }

    #[test]
    fn load_documents_reports_bad_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, "not json").unwrap();
        assert!(matches!(load_documents(&path), Err(crate::RagError::Serialization(_))));
    }

    #[test]
    fn stats_bucket_by_length() {
        let chunks =
            vec![chunk(0, &"a".repeat(100)), chunk(1, &"b".repeat(700)), chunk(2, &"c".repeat(1500))];
        let stats = ChunkStats::from_chunks(&chunks);
        assert_eq!(stats.total, 3);
        assert_eq!((stats.short, stats.medium, stats.long), (1, 1, 1));
        assert_eq!(stats.min_chars, 100);
        assert_eq!(stats.max_chars, 1500);
        assert!((stats.average_chars - 766.666).abs() < 0.01);
    }

    #[test]
    fn stats_of_empty_corpus_are_zero() {
        assert_eq!(ChunkStats::from_chunks(&[]), ChunkStats::default());
    }
}

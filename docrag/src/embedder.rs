//! Batch embedding of chunk corpora.
//!
//! [`BatchEmbedder`] filters out chunks too short to embed, sends the rest to
//! an [`EmbeddingProvider`] in fixed-size batches with bounded concurrency,
//! and turns every returned vector into a normalized [`EmbeddingRecord`].
//!
//! Each batch moves through [`BatchState`]:
//!
//! ```text
//! Pending -> Done
//! Pending -> Retrying -> Done
//! Pending -> Retrying -> Degraded -> Done | PartialFailure
//! ```
//!
//! A batch that fails twice is degraded to one call per item so that a single
//! bad input cannot take the whole batch down. Items that still fail are
//! reported in [`EmbedReport::dropped`] instead of aborting the run.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::EmbedderConfig;
use crate::document::{Chunk, DropKind, DroppedItem, EmbeddingRecord};
use crate::embedding::{EmbeddingProvider, l2_normalize};
use crate::error::{RagError, Result};

/// Lifecycle of one embedding batch.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BatchState {
    Pending,
    Retrying,
    Degraded,
    Done,
    PartialFailure,
}

/// Progress after a batch finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmbedProgress {
    /// Eligible chunks whose batch has finished.
    pub processed: usize,
    /// All eligible chunks.
    pub total: usize,
    pub batches_done: usize,
    pub batches_total: usize,
}

impl EmbedProgress {
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        self.processed as f64 * 100.0 / self.total as f64
    }
}

/// Receives progress updates from [`BatchEmbedder::embed_chunks`].
pub trait ProgressObserver: Send + Sync {
    fn on_progress(&self, progress: &EmbedProgress);
}

impl<F> ProgressObserver for F
where
    F: Fn(&EmbedProgress) + Send + Sync,
{
    fn on_progress(&self, progress: &EmbedProgress) {
        self(progress)
    }
}

/// Counters for one embedding run.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EmbedReport {
    /// Chunks long enough to embed.
    pub eligible: usize,
    /// Chunks skipped for having too little content.
    pub excluded_short: usize,
    /// Records produced.
    pub embedded: usize,
    pub retried_batches: usize,
    pub degraded_batches: usize,
    pub dropped: Vec<DroppedItem>,
}

/// Records in input order plus the run report.
#[derive(Debug, Clone, Default)]
pub struct EmbedOutput {
    pub records: Vec<EmbeddingRecord>,
    pub report: EmbedReport,
}

#[derive(Debug)]
struct BatchOutcome {
    records: Vec<EmbeddingRecord>,
    dropped: Vec<DroppedItem>,
    state: BatchState,
    retried: bool,
    degraded: bool,
}

/// Embeds chunks in batches with retry and per-item degradation.
///
/// # Example
///
/// ```rust,ignore
/// use docrag::{BatchEmbedder, EmbedderConfig};
///
/// let embedder = BatchEmbedder::new(provider, EmbedderConfig::default());
/// let output = embedder.embed_chunks(&chunks).await?;
/// println!("embedded {} of {}", output.report.embedded, chunks.len());
/// ```
pub struct BatchEmbedder {
    provider: Arc<dyn EmbeddingProvider>,
    config: EmbedderConfig,
    observer: Option<Arc<dyn ProgressObserver>>,
}

impl BatchEmbedder {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, config: EmbedderConfig) -> Self {
        Self { provider, config, observer: None }
    }

    /// Report progress to `observer` after every finished batch.
    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.provider
    }

    pub fn config(&self) -> &EmbedderConfig {
        &self.config
    }

    /// Dimension every accepted vector must have.
    pub fn dimension(&self) -> usize {
        self.provider.dimensions()
    }

    /// Whether `chunk` has enough non-whitespace content to embed.
    pub fn is_eligible(&self, chunk: &Chunk) -> bool {
        chunk.text.trim().chars().count() >= self.config.min_content_chars
    }

    /// Embed every eligible chunk.
    ///
    /// Returned records keep the relative order of `chunks`. Failed items
    /// are listed in the report rather than returned as errors.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if the provider reports dimension
    /// zero or the batch size is zero.
    pub async fn embed_chunks(&self, chunks: &[Chunk]) -> Result<EmbedOutput> {
        if self.dimension() == 0 {
            return Err(RagError::ConfigError("embedding dimension must be greater than zero".into()));
        }
        if self.config.batch_size == 0 {
            return Err(RagError::ConfigError("batch_size must be greater than zero".into()));
        }

        let (eligible, excluded): (Vec<&Chunk>, Vec<&Chunk>) =
            chunks.iter().partition(|c| self.is_eligible(c));
        for chunk in &excluded {
            debug!(chunk.id = %chunk.id, "skipping chunk with too little content");
        }

        let batches: Vec<&[&Chunk]> = eligible.chunks(self.config.batch_size).collect();
        let mut progress = EmbedProgress {
            processed: 0,
            total: eligible.len(),
            batches_done: 0,
            batches_total: batches.len(),
        };
        info!(
            provider = self.provider.name(),
            eligible = eligible.len(),
            excluded = excluded.len(),
            batches = batches.len(),
            "embedding chunks"
        );

        let mut slots: Vec<Option<BatchOutcome>> = (0..batches.len()).map(|_| None).collect();
        let mut finished = stream::iter(0..batches.len())
            .map(|index| {
                let batch = batches[index];
                async move { (index, self.run_batch(index, batch).await) }
            })
            .buffer_unordered(self.config.concurrency.max(1));

        while let Some((index, outcome)) = finished.next().await {
            progress.processed += batches[index].len();
            progress.batches_done += 1;
            debug!(batch = index, state = ?outcome.state, "batch finished");
            info!(
                processed = progress.processed,
                total = progress.total,
                percent = progress.percent(),
                "embedding progress"
            );
            if let Some(observer) = &self.observer {
                observer.on_progress(&progress);
            }
            slots[index] = Some(outcome);
        }
        drop(finished);

        let mut output = EmbedOutput {
            records: Vec::with_capacity(eligible.len()),
            report: EmbedReport {
                eligible: eligible.len(),
                excluded_short: excluded.len(),
                ..EmbedReport::default()
            },
        };
        for outcome in slots.into_iter().flatten() {
            output.report.retried_batches += usize::from(outcome.retried);
            output.report.degraded_batches += usize::from(outcome.degraded);
            output.records.extend(outcome.records);
            output.report.dropped.extend(outcome.dropped);
        }
        output.report.embedded = output.records.len();

        if !output.report.dropped.is_empty() {
            warn!(dropped = output.report.dropped.len(), "some chunks could not be embedded");
        }
        Ok(output)
    }

    /// Embed a query string, retrying once on a retryable failure.
    ///
    /// # Errors
    ///
    /// - [`RagError::MalformedInput`] for an empty query
    /// - [`RagError::DimensionMismatch`] (id `"query"`) for a wrong-sized vector
    /// - [`RagError::EmbeddingError`] for a zero or non-finite vector
    /// - the provider's error if both attempts fail
    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let text = text.trim();
        if text.is_empty() {
            return Err(RagError::MalformedInput {
                document: "query".into(),
                reason: "query text is empty".into(),
            });
        }

        let vector = match self.call_single(text).await {
            Ok(vector) => vector,
            Err(e) if e.is_retryable() => {
                warn!(error = %e, "query embedding failed, retrying");
                self.call_single(text).await?
            }
            Err(e) => return Err(e),
        };

        let expected = self.dimension();
        if vector.len() != expected {
            return Err(RagError::DimensionMismatch {
                id: "query".into(),
                expected,
                actual: vector.len(),
            });
        }
        l2_normalize(vector).ok_or_else(|| RagError::EmbeddingError {
            provider: self.provider.name().to_string(),
            message: "query embedding is zero or non-finite".into(),
        })
    }

    async fn run_batch(&self, index: usize, batch: &[&Chunk]) -> BatchOutcome {
        let texts: Vec<&str> = batch.iter().map(|c| c.text.as_str()).collect();
        let mut retried = false;
        let mut failure = String::new();

        for attempt in 0..2 {
            match self.call_batch(&texts).await {
                Ok(vectors) if vectors.len() == texts.len() => {
                    let mut outcome = self.accept_batch(batch, vectors);
                    outcome.retried = retried;
                    return outcome;
                }
                Ok(vectors) => {
                    failure = format!("expected {} vectors, got {}", texts.len(), vectors.len());
                }
                Err(e) => failure = e.to_string(),
            }
            if attempt == 0 {
                retried = true;
                warn!(batch = index, state = ?BatchState::Retrying, error = %failure, "embedding batch failed, retrying");
            }
        }

        let error = RagError::EmbeddingBatchFailure { batch: index, message: failure };
        warn!(batch = index, state = ?BatchState::Degraded, error = %error, "embedding items one at a time");

        let mut records = Vec::with_capacity(batch.len());
        let mut dropped = Vec::new();
        for chunk in batch {
            match self.call_single(&chunk.text).await {
                Ok(vector) => match self.validate(chunk, vector) {
                    Ok(record) => records.push(record),
                    Err(item) => dropped.push(item),
                },
                Err(e) => {
                    warn!(chunk.id = %chunk.id, error = %e, "dropping chunk after embedding failure");
                    dropped.push(DroppedItem::new(&chunk.id, DropKind::EmbeddingFailed, e.to_string()));
                }
            }
        }
        let state = if dropped.is_empty() { BatchState::Done } else { BatchState::PartialFailure };
        BatchOutcome { records, dropped, state, retried, degraded: true }
    }

    fn accept_batch(&self, batch: &[&Chunk], vectors: Vec<Vec<f32>>) -> BatchOutcome {
        let mut records = Vec::with_capacity(batch.len());
        let mut dropped = Vec::new();
        for (chunk, vector) in batch.iter().zip(vectors) {
            match self.validate(chunk, vector) {
                Ok(record) => records.push(record),
                Err(item) => dropped.push(item),
            }
        }
        let state = if dropped.is_empty() { BatchState::Done } else { BatchState::PartialFailure };
        BatchOutcome { records, dropped, state, retried: false, degraded: false }
    }

    fn validate(&self, chunk: &Chunk, vector: Vec<f32>) -> std::result::Result<EmbeddingRecord, DroppedItem> {
        let expected = self.dimension();
        if vector.len() != expected {
            let error = RagError::DimensionMismatch {
                id: chunk.id.clone(),
                expected,
                actual: vector.len(),
            };
            warn!(chunk.id = %chunk.id, error = %error, "dropping chunk");
            return Err(DroppedItem::new(&chunk.id, DropKind::DimensionMismatch, error.to_string()));
        }
        match l2_normalize(vector) {
            Some(vector) => Ok(EmbeddingRecord::new(chunk, vector)),
            None => {
                warn!(chunk.id = %chunk.id, "dropping chunk with zero or non-finite embedding");
                Err(DroppedItem::new(&chunk.id, DropKind::InvalidVector, "zero or non-finite vector"))
            }
        }
    }

    async fn call_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let timeout = self.config.timeout();
        tokio::time::timeout(timeout, self.provider.embed_batch(texts))
            .await
            .map_err(|_| RagError::Timeout { operation: "embedding batch".into(), timeout })?
    }

    async fn call_single(&self, text: &str) -> Result<Vec<f32>> {
        let timeout = self.config.timeout();
        tokio::time::timeout(timeout, self.provider.embed(text))
            .await
            .map_err(|_| RagError::Timeout { operation: "embedding".into(), timeout })?
    }
}

impl std::fmt::Debug for BatchEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchEmbedder")
            .field("provider", &self.provider.name())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::index::norm;

    fn chunk(index: usize, text: &str) -> Chunk {
        Chunk {
            id: Chunk::make_id("medical", index),
            title: format!("t{index}"),
            text: text.to_string(),
            corpus_name: "medical".into(),
            chunk_index: index,
            source: None,
        }
    }

    fn corpus(n: usize) -> Vec<Chunk> {
        (0..n).map(|i| chunk(i, &format!("chunk body number {i}"))).collect()
    }

    fn config(batch_size: usize) -> EmbedderConfig {
        EmbedderConfig { batch_size, ..EmbedderConfig::default() }
    }

    /// Deterministic embeddings derived from the text bytes.
    struct HashProvider {
        dim: usize,
        batch_calls: AtomicUsize,
    }

    impl HashProvider {
        fn new(dim: usize) -> Self {
            Self { dim, batch_calls: AtomicUsize::new(0) }
        }
    }

    #[async_trait]
    impl EmbeddingProvider for HashProvider {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            let seed: u32 = text.bytes().map(u32::from).sum();
            Ok((0..self.dim).map(|i| ((seed + i as u32 * 31) % 97) as f32 + 1.0).collect())
        }

        async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
            self.batch_calls.fetch_add(1, Ordering::SeqCst);
            let mut out = Vec::with_capacity(texts.len());
            for text in texts {
                out.push(self.embed(text).await?);
            }
            Ok(out)
        }

        fn dimensions(&self) -> usize {
            self.dim
        }
    }

    /// Batch calls containing `poison` always fail; single calls fail only for `poison`.
    struct PoisonProvider {
        inner: HashProvider,
        poison: &'static str,
    }

    #[async_trait]
    impl EmbeddingProvider for PoisonProvider {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            if text.contains(self.poison) {
                return Err(RagError::EmbeddingError { provider: "poison".into(), message: "bad input".into() });
            }
            self.inner.embed(text).await
        }

        async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
            if texts.iter().any(|t| t.contains(self.poison)) {
                return Err(RagError::EmbeddingError { provider: "poison".into(), message: "batch rejected".into() });
            }
            self.inner.embed_batch(texts).await
        }

        fn dimensions(&self) -> usize {
            self.inner.dim
        }
    }

    /// Fails the first batch call only.
    struct FlakyOnceProvider {
        inner: HashProvider,
        failed: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingProvider for FlakyOnceProvider {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            self.inner.embed(text).await
        }

        async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
            if self.failed.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(RagError::EmbeddingError { provider: "flaky".into(), message: "503".into() });
            }
            self.inner.embed_batch(texts).await
        }

        fn dimensions(&self) -> usize {
            self.inner.dim
        }
    }

    /// Returns a vector that is wrong in some way for texts containing a marker.
    struct MisbehavingProvider {
        dim: usize,
    }

    #[async_trait]
    impl EmbeddingProvider for MisbehavingProvider {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            if text.contains("zero") {
                Ok(vec![0.0; self.dim])
            } else if text.contains("short") {
                Ok(vec![1.0; self.dim - 1])
            } else {
                Ok(vec![1.0; self.dim])
            }
        }

        fn dimensions(&self) -> usize {
            self.dim
        }
    }

    struct SlowProvider;

    #[async_trait]
    impl EmbeddingProvider for SlowProvider {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(vec![1.0, 0.0])
        }

        fn dimensions(&self) -> usize {
            2
        }
    }

    #[tokio::test]
    async fn embeds_in_batches_and_keeps_order() {
        let provider = Arc::new(HashProvider::new(8));
        let embedder = BatchEmbedder::new(provider.clone(), config(4));
        let chunks = corpus(10);
        let output = embedder.embed_chunks(&chunks).await.unwrap();

        assert_eq!(provider.batch_calls.load(Ordering::SeqCst), 3);
        let ids: Vec<&str> = output.records.iter().map(|r| r.id.as_str()).collect();
        let expected: Vec<&str> = chunks.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, expected);
        assert_eq!(output.report.embedded, 10);
        assert!(output.report.dropped.is_empty());
        for record in &output.records {
            assert!((norm(&record.vector) - 1.0).abs() < 1e-5);
            assert_eq!(record.vector.len(), 8);
        }
    }

    #[tokio::test]
    async fn short_chunks_are_excluded() {
        let embedder = BatchEmbedder::new(Arc::new(HashProvider::new(4)), config(64));
        let chunks = vec![chunk(0, "   tiny    "), chunk(1, "long enough body text")];
        let output = embedder.embed_chunks(&chunks).await.unwrap();
        assert_eq!(output.report.excluded_short, 1);
        assert_eq!(output.report.eligible, 1);
        assert_eq!(output.records.len(), 1);
        assert_eq!(output.records[0].id, "medical_000001");
    }

    #[tokio::test]
    async fn transient_batch_failure_is_retried() {
        let provider = FlakyOnceProvider { inner: HashProvider::new(4), failed: AtomicUsize::new(0) };
        let embedder = BatchEmbedder::new(Arc::new(provider), config(64));
        let output = embedder.embed_chunks(&corpus(5)).await.unwrap();
        assert_eq!(output.report.retried_batches, 1);
        assert_eq!(output.report.degraded_batches, 0);
        assert_eq!(output.report.embedded, 5);
    }

    #[tokio::test]
    async fn persistent_failure_degrades_to_single_items() {
        let mut chunks = corpus(6);
        chunks[2].text = "this one is poisoned".into();
        let provider = PoisonProvider { inner: HashProvider::new(4), poison: "poisoned" };
        let embedder = BatchEmbedder::new(Arc::new(provider), config(3));
        let output = embedder.embed_chunks(&chunks).await.unwrap();

        assert_eq!(output.report.degraded_batches, 1);
        assert_eq!(output.report.retried_batches, 1);
        assert_eq!(output.report.embedded, 5);
        assert_eq!(output.report.dropped.len(), 1);
        assert_eq!(output.report.dropped[0].id, "medical_000002");
        assert_eq!(output.report.dropped[0].kind, DropKind::EmbeddingFailed);
        let ids: Vec<&str> = output.records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["medical_000000", "medical_000001", "medical_000003", "medical_000004", "medical_000005"]);
    }

    #[tokio::test]
    async fn invalid_vectors_are_dropped_with_reason() {
        let chunks = vec![
            chunk(0, "a perfectly normal chunk"),
            chunk(1, "this returns a zero vector"),
            chunk(2, "this returns a short vector"),
        ];
        let embedder = BatchEmbedder::new(Arc::new(MisbehavingProvider { dim: 3 }), config(64));
        let output = embedder.embed_chunks(&chunks).await.unwrap();
        assert_eq!(output.records.len(), 1);
        let kinds: Vec<DropKind> = output.report.dropped.iter().map(|d| d.kind).collect();
        assert_eq!(kinds, vec![DropKind::InvalidVector, DropKind::DimensionMismatch]);
    }

    #[tokio::test]
    async fn progress_is_reported_per_batch() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let embedder = BatchEmbedder::new(Arc::new(HashProvider::new(4)), config(4))
            .with_observer(Arc::new(move |p: &EmbedProgress| sink.lock().unwrap().push(*p)));
        embedder.embed_chunks(&corpus(10)).await.unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        let last = seen.last().unwrap();
        assert_eq!((last.processed, last.total), (10, 10));
        assert_eq!((last.batches_done, last.batches_total), (3, 3));
        assert_eq!(last.percent(), 100.0);
    }

    #[tokio::test]
    async fn empty_input_produces_empty_output() {
        let embedder = BatchEmbedder::new(Arc::new(HashProvider::new(4)), config(4));
        let output = embedder.embed_chunks(&[]).await.unwrap();
        assert!(output.records.is_empty());
        assert_eq!(output.report, EmbedReport::default());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_provider_times_out_and_items_are_dropped() {
        let config = EmbedderConfig { timeout_ms: 1_000, ..config(4) };
        let embedder = BatchEmbedder::new(Arc::new(SlowProvider), config);
        let output = embedder.embed_chunks(&corpus(2)).await.unwrap();
        assert!(output.records.is_empty());
        assert_eq!(output.report.dropped.len(), 2);
        assert!(output.report.dropped[0].reason.contains("timed out"));
    }

    #[tokio::test(start_paused = true)]
    async fn query_timeout_is_reported() {
        let config = EmbedderConfig { timeout_ms: 500, ..config(4) };
        let embedder = BatchEmbedder::new(Arc::new(SlowProvider), config);
        let err = embedder.embed_query("adrenal").await.unwrap_err();
        assert!(matches!(err, RagError::Timeout { .. }));
    }

    #[tokio::test]
    async fn query_is_normalized_and_validated() {
        let embedder = BatchEmbedder::new(Arc::new(HashProvider::new(6)), config(4));
        let v = embedder.embed_query("adrenal tumors").await.unwrap();
        assert!((norm(&v) - 1.0).abs() < 1e-5);
        assert!(matches!(embedder.embed_query("  ").await, Err(RagError::MalformedInput { .. })));

        let zero = BatchEmbedder::new(Arc::new(MisbehavingProvider { dim: 3 }), config(4));
        assert!(matches!(zero.embed_query("zero").await, Err(RagError::EmbeddingError { .. })));
        assert!(matches!(
            zero.embed_query("short").await,
            Err(RagError::DimensionMismatch { ref id, expected: 3, actual: 2 }) if id == "query"
        ));
    }

    #[tokio::test]
    async fn zero_dimension_provider_is_a_config_error() {
        let embedder = BatchEmbedder::new(Arc::new(HashProvider::new(0)), config(4));
        assert!(matches!(embedder.embed_chunks(&corpus(1)).await, Err(RagError::ConfigError(_))));
    }
}

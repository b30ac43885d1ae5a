//! Similarity metrics and index structures used by the in-memory store.
//!
//! Every metric is expressed as a distance where lower means closer:
//!
//! - [`Metric::L2`]: squared Euclidean distance
//! - [`Metric::InnerProduct`]: negated dot product
//! - [`Metric::Cosine`]: `1 - cos(a, b)`
//!
//! [`VectorIndex`] is either an exact scan ([`IndexType::Flat`]) or an
//! inverted-file index ([`IndexType::IvfFlat`]) whose coarse quantizer is
//! trained with a few rounds of k-means over the stored vectors.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// Distance metric used for indexing and querying.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// Squared Euclidean distance.
    #[default]
    L2,
    /// Negated inner product.
    InnerProduct,
    /// One minus cosine similarity.
    Cosine,
}

impl Metric {
    /// Distance between `a` and `b`. Both must have the same length.
    pub fn distance(self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Metric::L2 => a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum(),
            Metric::InnerProduct => -dot(a, b),
            Metric::Cosine => {
                let norm_a = norm(a);
                let norm_b = norm(b);
                if norm_a == 0.0 || norm_b == 0.0 {
                    return 1.0;
                }
                1.0 - dot(a, b) / (norm_a * norm_b)
            }
        }
    }
}

/// The physical layout of a collection index.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IndexType {
    /// Exhaustive scan over every record.
    Flat,
    /// Inverted lists over `nlist` k-means centroids; queries scan the
    /// `nprobe` closest lists.
    IvfFlat { nlist: usize, nprobe: usize },
}

impl Default for IndexType {
    fn default() -> Self {
        IndexType::IvfFlat { nlist: 256, nprobe: 16 }
    }
}

/// Metric plus index layout for a collection.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct IndexParams {
    #[serde(default)]
    pub metric: Metric,
    #[serde(default)]
    pub index_type: IndexType,
}

impl IndexParams {
    pub fn new(metric: Metric, index_type: IndexType) -> Self {
        Self { metric, index_type }
    }

    /// Exact-scan index under `metric`.
    pub fn flat(metric: Metric) -> Self {
        Self { metric, index_type: IndexType::Flat }
    }
}

const KMEANS_ITERATIONS: usize = 10;

/// A built index over a snapshot of a collection's vectors.
///
/// Slots refer to positions in the vector slice the index was built from.
#[derive(Debug, Clone)]
pub enum VectorIndex {
    Flat { metric: Metric },
    IvfFlat { metric: Metric, nprobe: usize, centroids: Vec<Vec<f32>>, lists: Vec<Vec<usize>> },
}

impl VectorIndex {
    /// Build an index over `vectors`.
    pub fn build(params: &IndexParams, vectors: &[&[f32]]) -> Self {
        match params.index_type {
            IndexType::Flat => VectorIndex::Flat { metric: params.metric },
            IndexType::IvfFlat { nlist, nprobe } => {
                let nlist = nlist.clamp(1, vectors.len().max(1));
                let centroids = train_centroids(vectors, nlist);
                let mut lists = vec![Vec::new(); centroids.len()];
                for (slot, vector) in vectors.iter().enumerate() {
                    if let Some(list) = nearest_centroid(&centroids, vector) {
                        lists[list].push(slot);
                    }
                }
                VectorIndex::IvfFlat {
                    metric: params.metric,
                    nprobe: nprobe.max(1),
                    centroids,
                    lists,
                }
            }
        }
    }

    pub fn metric(&self) -> Metric {
        match self {
            VectorIndex::Flat { metric } | VectorIndex::IvfFlat { metric, .. } => *metric,
        }
    }

    /// Return up to `k` `(slot, distance)` pairs ordered by ascending distance.
    ///
    /// Ties are broken by slot so results are deterministic.
    pub fn search(&self, vectors: &[&[f32]], query: &[f32], k: usize) -> Vec<(usize, f32)> {
        if k == 0 || vectors.is_empty() {
            return Vec::new();
        }
        let metric = self.metric();
        let mut scored: Vec<(usize, f32)> = match self {
            VectorIndex::Flat { .. } => vectors
                .iter()
                .enumerate()
                .map(|(slot, v)| (slot, metric.distance(v, query)))
                .collect(),
            VectorIndex::IvfFlat { nprobe, centroids, lists, .. } => {
                // Centroid ranking always uses L2 because that is what k-means minimised.
                let mut ranked: Vec<(usize, f32)> = centroids
                    .iter()
                    .enumerate()
                    .map(|(i, c)| (i, Metric::L2.distance(c, query)))
                    .collect();
                ranked.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
                ranked
                    .iter()
                    .take(*nprobe)
                    .flat_map(|(list, _)| lists[*list].iter().copied())
                    .map(|slot| (slot, metric.distance(vectors[slot], query)))
                    .collect()
            }
        };
        scored.sort_by(|a, b| compare_hits(a, b));
        scored.truncate(k);
        scored
    }
}

fn compare_hits(a: &(usize, f32), b: &(usize, f32)) -> Ordering {
    a.1.total_cmp(&b.1).then(a.0.cmp(&b.0))
}

/// Deterministic k-means: seeds are spread evenly over the input order.
fn train_centroids(vectors: &[&[f32]], nlist: usize) -> Vec<Vec<f32>> {
    if vectors.is_empty() {
        return Vec::new();
    }
    let step = vectors.len() as f64 / nlist as f64;
    let mut centroids: Vec<Vec<f32>> =
        (0..nlist).map(|i| vectors[((i as f64) * step) as usize].to_vec()).collect();
    let dim = centroids[0].len();

    for _ in 0..KMEANS_ITERATIONS {
        let mut sums = vec![vec![0.0f32; dim]; centroids.len()];
        let mut counts = vec![0usize; centroids.len()];
        for vector in vectors {
            if let Some(list) = nearest_centroid(&centroids, vector) {
                counts[list] += 1;
                for (acc, x) in sums[list].iter_mut().zip(vector.iter()) {
                    *acc += x;
                }
            }
        }

        let mut moved = false;
        for ((centroid, sum), count) in centroids.iter_mut().zip(sums).zip(counts) {
            // Empty clusters keep their previous centroid.
            if count == 0 {
                continue;
            }
            let updated: Vec<f32> = sum.into_iter().map(|x| x / count as f32).collect();
            if updated != *centroid {
                moved = true;
                *centroid = updated;
            }
        }
        if !moved {
            break;
        }
    }
    centroids
}

fn nearest_centroid(centroids: &[Vec<f32>], vector: &[f32]) -> Option<usize> {
    centroids
        .iter()
        .enumerate()
        .map(|(i, c)| (i, Metric::L2.distance(c, vector)))
        .min_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)))
        .map(|(i, _)| i)
}

pub(crate) fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

pub(crate) fn norm(a: &[f32]) -> f32 {
    a.iter().map(|x| x * x).sum::<f32>().sqrt()
}

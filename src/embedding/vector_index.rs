/// Exact cosine-similarity index over defect embeddings
use super::{EmbeddingError, TextEncoder};
use crate::records::DefectRecord;
use ahash::AHashMap;
use ndarray::{Array1, Array2, ArrayView1};
use std::cmp::Ordering;

/// Search result with record key and similarity score
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    /// Issue key of the matched record
    pub id: String,
    /// Cosine similarity (-1.0 to 1.0, higher is more similar)
    pub score: f32,
}

/// Previously computed embedding, valid while the record's content hash matches
#[derive(Debug, Clone, PartialEq)]
pub struct CachedVector {
    pub content_hash: String,
    pub vector: Vec<f32>,
}

/// Embedding computed during a build that was not in the cache
#[derive(Debug, Clone)]
pub struct FreshVector {
    pub id: String,
    pub content_hash: String,
    pub vector: Vec<f32>,
}

/// Exact nearest-neighbour index
///
/// Rows are L2-normalized at build time so a query is a single
/// matrix-vector product. Ties keep record insertion order.
#[derive(Debug, Clone)]
pub struct EmbeddingIndex {
    ids: Vec<String>,
    rows: AHashMap<String, usize>,
    matrix: Array2<f32>,
    dimension: usize,
    model_name: String,
}

impl EmbeddingIndex {
    /// Encode every record and build the index
    pub fn build(
        records: &[DefectRecord],
        encoder: &dyn TextEncoder,
    ) -> Result<Self, EmbeddingError> {
        let (index, _) = Self::build_with_cache(records, encoder, &AHashMap::new())?;
        Ok(index)
    }

    /// Build the index, re-encoding only records whose content hash is not cached
    ///
    /// Returns the index together with the vectors that had to be computed.
    pub fn build_with_cache(
        records: &[DefectRecord],
        encoder: &dyn TextEncoder,
        cache: &AHashMap<String, CachedVector>,
    ) -> Result<(Self, Vec<FreshVector>), EmbeddingError> {
        let dimension = encoder.dimension();
        let mut vectors: Vec<Option<Vec<f32>>> = Vec::with_capacity(records.len());
        let mut pending_idx = Vec::new();
        let mut pending_text = Vec::new();
        let mut hashes = Vec::with_capacity(records.len());

        for (idx, record) in records.iter().enumerate() {
            let hash = record.content_hash();
            match cache.get(&record.key) {
                Some(cached) if cached.content_hash == hash && cached.vector.len() == dimension => {
                    vectors.push(Some(cached.vector.clone()));
                }
                _ => {
                    vectors.push(None);
                    pending_idx.push(idx);
                    pending_text.push(record.embedding_text());
                }
            }
            hashes.push(hash);
        }

        tracing::debug!(
            "Encoding {} of {} records ({} cached)",
            pending_text.len(),
            records.len(),
            records.len() - pending_text.len()
        );

        let chunk = encoder.batch_size().unwrap_or(pending_text.len()).max(1);
        let mut encoded = Vec::with_capacity(pending_text.len());
        for batch in pending_text.chunks(chunk) {
            encoded.extend(encoder.encode_batch(batch)?);
        }
        if encoded.len() != pending_idx.len() {
            return Err(EmbeddingError::GenerationError(format!(
                "Embedding count mismatch: expected {}, got {}",
                pending_idx.len(),
                encoded.len()
            )));
        }

        let mut fresh = Vec::with_capacity(encoded.len());
        for (idx, vector) in pending_idx.into_iter().zip(encoded) {
            fresh.push(FreshVector {
                id: records[idx].key.clone(),
                content_hash: hashes[idx].clone(),
                vector: vector.clone(),
            });
            vectors[idx] = Some(vector);
        }

        let ids = records.iter().map(|r| r.key.clone()).collect();
        let vectors = vectors.into_iter().flatten().collect();
        let index = Self::from_vectors(ids, vectors, dimension, encoder.model_name())?;
        Ok((index, fresh))
    }

    /// Build directly from (id, vector) pairs in insertion order
    pub fn from_vectors(
        ids: Vec<String>,
        vectors: Vec<Vec<f32>>,
        dimension: usize,
        model_name: &str,
    ) -> Result<Self, EmbeddingError> {
        if ids.len() != vectors.len() {
            return Err(EmbeddingError::InvalidInput(format!(
                "{} ids for {} vectors",
                ids.len(),
                vectors.len()
            )));
        }

        let mut matrix = Array2::<f32>::zeros((ids.len(), dimension));
        for (row, vector) in vectors.iter().enumerate() {
            if vector.len() != dimension {
                return Err(EmbeddingError::DimensionMismatch {
                    expected: dimension,
                    actual: vector.len(),
                });
            }
            let normalized = normalize(ArrayView1::from(vector.as_slice()));
            matrix.row_mut(row).assign(&normalized);
        }

        let rows = ids
            .iter()
            .enumerate()
            .map(|(row, id)| (id.clone(), row))
            .collect();

        Ok(Self {
            ids,
            rows,
            matrix,
            dimension,
            model_name: model_name.to_string(),
        })
    }

    /// Top-k records by cosine similarity, descending, ties in insertion order
    pub fn query(&self, vector: &[f32], k: usize) -> Result<Vec<SearchResult>, EmbeddingError> {
        if self.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        let query = self.prepare(vector)?;

        let scores = self.matrix.dot(&query);
        let mut ranked: Vec<(usize, f32)> = scores.iter().copied().enumerate().collect();
        // sort_by is stable, so equal scores keep insertion order
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        ranked.truncate(k);

        Ok(ranked
            .into_iter()
            .map(|(row, score)| SearchResult {
                id: self.ids[row].clone(),
                score,
            })
            .collect())
    }

    /// Cosine similarity between `vector` and the record stored under `id`
    pub fn similarity(&self, id: &str, vector: &[f32]) -> Result<Option<f32>, EmbeddingError> {
        let Some(&row) = self.rows.get(id) else {
            return Ok(None);
        };
        let query = self.prepare(vector)?;
        Ok(Some(self.matrix.row(row).dot(&query)))
    }

    fn prepare(&self, vector: &[f32]) -> Result<Array1<f32>, EmbeddingError> {
        if vector.len() != self.dimension {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        Ok(normalize(ArrayView1::from(vector)))
    }

    /// Number of indexed records
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }
}

fn normalize(vector: ArrayView1<'_, f32>) -> Array1<f32> {
    let norm = vector.dot(&vector).sqrt();
    if norm > 0.0 {
        vector.mapv(|x| x / norm)
    } else {
        vector.to_owned()
    }
}

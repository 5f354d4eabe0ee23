/// Text encoder trait with FastEmbed and hashing implementations
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("Model initialization failed: {0}")]
    InitializationError(String),

    #[error("Embedding generation failed: {0}")]
    GenerationError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

impl From<EmbeddingError> for crate::error::BugbusterError {
    fn from(e: EmbeddingError) -> Self {
        crate::error::BugbusterError::Embedding(e.to_string())
    }
}

/// Text-encoding capability
///
/// Implementations must be deterministic: the same text always yields the same
/// vector. Index builds and query-time encoding share one encoder.
pub trait TextEncoder: Send + Sync {
    /// Encode a single text
    fn encode(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Encode several texts, one vector per input in input order
    fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        texts.iter().map(|t| self.encode(t)).collect()
    }

    /// Embedding dimension
    fn dimension(&self) -> usize;

    /// Most texts handed to one `encode_batch` call, unbounded when `None`
    fn batch_size(&self) -> Option<usize> {
        None
    }

    /// Model name, used to key cached embeddings
    fn model_name(&self) -> &str;
}

/// FastEmbed encoder for local embedding generation
///
/// Uses all-MiniLM-L6-v2 (384 dimensions) by default.
pub struct FastEmbedEncoder {
    model: Arc<TextEmbedding>,
    model_name: String,
    dimension: usize,
    batch_size: Option<usize>,
}

impl FastEmbedEncoder {
    /// Create a new FastEmbed encoder
    ///
    /// Models are downloaded on first use to the local HuggingFace cache.
    pub fn new(model_name: &str) -> Result<Self, EmbeddingError> {
        let (embedding_model, dimension) = match model_name {
            "all-MiniLM-L6-v2" | "all-minilm-l6-v2" => (EmbeddingModel::AllMiniLML6V2, 384),
            "bge-small-en-v1.5" => (EmbeddingModel::BGESmallENV15, 384),
            "bge-base-en-v1.5" => (EmbeddingModel::BGEBaseENV15, 768),
            _ => {
                return Err(EmbeddingError::InitializationError(format!(
                    "Unsupported model: {}. Supported: all-MiniLM-L6-v2, bge-small-en-v1.5, bge-base-en-v1.5",
                    model_name
                )));
            }
        };

        tracing::info!("Initializing embedding model: {} ({}D)", model_name, dimension);

        let init_options = InitOptions::new(embedding_model).with_show_download_progress(true);
        let model = TextEmbedding::try_new(init_options)
            .map_err(|e| EmbeddingError::InitializationError(e.to_string()))?;

        Ok(Self {
            model: Arc::new(model),
            model_name: model_name.to_string(),
            dimension,
            batch_size: None,
        })
    }

    /// Limit how many texts are embedded per model call
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size.max(1));
        self
    }

    /// Create encoder with the default model (all-MiniLM-L6-v2)
    pub fn with_default_model() -> Result<Self, EmbeddingError> {
        Self::new("all-MiniLM-L6-v2")
    }

    fn check_dimension(&self, embedding: &[f32]) -> Result<(), EmbeddingError> {
        if embedding.len() != self.dimension {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.dimension,
                actual: embedding.len(),
            });
        }
        Ok(())
    }
}

impl TextEncoder for FastEmbedEncoder {
    fn encode(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::InvalidInput("Empty text".to_string()));
        }

        let mut embeddings = self
            .model
            .embed(vec![text.to_string()], None)
            .map_err(|e| EmbeddingError::GenerationError(e.to_string()))?;

        let embedding = embeddings
            .pop()
            .ok_or_else(|| EmbeddingError::GenerationError("No embeddings generated".to_string()))?;
        self.check_dimension(&embedding)?;

        Ok(embedding)
    }

    fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        // Empty inputs would shift the output alignment
        if texts.iter().any(|t| t.trim().is_empty()) {
            return Err(EmbeddingError::InvalidInput(
                "Batch contains empty text".to_string(),
            ));
        }

        let embeddings = self
            .model
            .embed(texts.to_vec(), self.batch_size)
            .map_err(|e| EmbeddingError::GenerationError(e.to_string()))?;

        if embeddings.len() != texts.len() {
            return Err(EmbeddingError::GenerationError(format!(
                "Embedding count mismatch: expected {}, got {}",
                texts.len(),
                embeddings.len()
            )));
        }
        for embedding in &embeddings {
            self.check_dimension(embedding)?;
        }

        Ok(embeddings)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn batch_size(&self) -> Option<usize> {
        self.batch_size
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

/// Deterministic hashed bag-of-words encoder
///
/// Each lowercase alphanumeric token is hashed with BLAKE3 into one signed
/// bucket; the result is L2-normalized. No model download, so it serves
/// offline deployments and tests.
pub struct HashingEncoder {
    dimension: usize,
    model_name: String,
    batch_size: Option<usize>,
}

impl HashingEncoder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
            model_name: format!("hashing-{}", dimension.max(1)),
            batch_size: None,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size.max(1));
        self
    }

    fn bucket(&self, token: &str) -> (usize, f32) {
        let hash = blake3::hash(token.as_bytes());
        let bytes = hash.as_bytes();
        let mut idx = [0u8; 8];
        idx.copy_from_slice(&bytes[..8]);
        let bucket = (u64::from_le_bytes(idx) % self.dimension as u64) as usize;
        let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };
        (bucket, sign)
    }
}

impl Default for HashingEncoder {
    fn default() -> Self {
        Self::new(384)
    }
}

impl TextEncoder for HashingEncoder {
    fn encode(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let lower = text.to_lowercase();
        let tokens: Vec<&str> = lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .collect();

        if tokens.is_empty() {
            return Err(EmbeddingError::InvalidInput(
                "Text has no tokens".to_string(),
            ));
        }

        let mut vector = vec![0.0f32; self.dimension];
        for token in tokens {
            let (bucket, sign) = self.bucket(token);
            vector[bucket] += sign;
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn batch_size(&self) -> Option<usize> {
        self.batch_size
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
        let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        dot / (mag_a * mag_b)
    }

    #[test]
    fn test_hashing_is_deterministic() {
        let encoder = HashingEncoder::new(64);
        let a = encoder.encode("Kafka consumer stalls").unwrap();
        let b = encoder.encode("kafka   CONSUMER stalls").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_hashing_is_normalized() {
        let encoder = HashingEncoder::default();
        let v = encoder.encode("connection pool exhaustion in kafka").unwrap();
        let magnitude: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((magnitude - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_hashing_overlap_scores_higher() {
        let encoder = HashingEncoder::default();
        let query = encoder.encode("kafka connection pool").unwrap();
        let related = encoder.encode("kafka connection pool exhaustion").unwrap();
        let unrelated = encoder.encode("mobile login button").unwrap();
        assert!(cosine_similarity(&query, &related) > cosine_similarity(&query, &unrelated));
    }

    #[test]
    fn test_hashing_rejects_empty() {
        let encoder = HashingEncoder::default();
        assert!(encoder.encode("  --  ").is_err());
    }

    #[test]
    fn test_default_batch_keeps_order() {
        let encoder = HashingEncoder::new(32);
        let texts = vec!["alpha".to_string(), "beta".to_string()];
        let batch = encoder.encode_batch(&texts).unwrap();
        assert_eq!(batch[0], encoder.encode("alpha").unwrap());
        assert_eq!(batch[1], encoder.encode("beta").unwrap());
    }

    #[test]
    #[ignore] // Requires model download (~90MB) - run with: cargo test -- --ignored
    fn test_fastembed_semantic_similarity() {
        let encoder = FastEmbedEncoder::with_default_model().unwrap();
        assert_eq!(encoder.dimension(), 384);

        let emb1 = encoder.encode("The consumer ran out of pooled connections.").unwrap();
        let emb2 = encoder.encode("Connection pool exhaustion in the consumer.").unwrap();
        let emb3 = encoder.encode("The login button does not respond on mobile.").unwrap();

        assert!(cosine_similarity(&emb1, &emb2) > cosine_similarity(&emb1, &emb3));
    }
}

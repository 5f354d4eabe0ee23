/// Embedding & indexing
///
/// - TextEncoder trait for the text-encoding capability
/// - FastEmbedEncoder for local embedding (all-MiniLM-L6-v2, 384-dim)
/// - HashingEncoder for deterministic offline encoding
/// - EmbeddingIndex for exact cosine search
/// - SharedIndex for atomically swapped corpus snapshots
mod provider;
mod shared;
mod vector_index;

pub use provider::{EmbeddingError, FastEmbedEncoder, HashingEncoder, TextEncoder};
pub use shared::{IndexedCorpus, SharedIndex};
pub use vector_index::{CachedVector, EmbeddingIndex, FreshVector, SearchResult};

use crate::config::EmbeddingConfig;
use crate::error::{BugbusterError, Result};
use std::sync::Arc;

/// Build the encoder selected by configuration
pub fn encoder_from_config(config: &EmbeddingConfig) -> Result<Arc<dyn TextEncoder>> {
    match config.provider.as_str() {
        "fastembed" => Ok(Arc::new(
            FastEmbedEncoder::new(&config.model)?.with_batch_size(config.batch_size),
        )),
        "hashing" => Ok(Arc::new(
            HashingEncoder::new(config.dimension).with_batch_size(config.batch_size),
        )),
        other => Err(BugbusterError::InvalidConfigValue {
            path: "embedding.provider".to_string(),
            message: format!("Unknown embedding provider '{}'", other),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hashing_encoder_from_config() {
        let config = EmbeddingConfig {
            provider: "hashing".to_string(),
            model: "unused".to_string(),
            dimension: 64,
            batch_size: 8,
        };
        let encoder = encoder_from_config(&config).unwrap();
        assert_eq!(encoder.dimension(), 64);
        assert_eq!(encoder.batch_size(), Some(8));
    }

    #[test]
    fn test_unknown_provider_is_rejected() {
        let config = EmbeddingConfig {
            provider: "word2vec".to_string(),
            model: "unused".to_string(),
            dimension: 64,
            batch_size: 8,
        };
        assert!(encoder_from_config(&config).is_err());
    }
}

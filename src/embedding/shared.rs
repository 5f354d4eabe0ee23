/// Shared corpus + index snapshot with copy-on-rebuild semantics
use super::{CachedVector, EmbeddingIndex, FreshVector, TextEncoder};
use crate::error::{BugbusterError, Result};
use crate::records::{DefectCorpus, DefectRecord};
use ahash::AHashMap;
use std::sync::{Arc, RwLock};

/// Records and their embedding index, always built together
#[derive(Debug)]
pub struct IndexedCorpus {
    pub corpus: DefectCorpus,
    pub index: EmbeddingIndex,
}

impl IndexedCorpus {
    pub fn build(records: Vec<DefectRecord>, encoder: &dyn TextEncoder) -> Result<Self> {
        let (indexed, _) = Self::build_with_cache(records, encoder, &AHashMap::new())?;
        Ok(indexed)
    }

    pub fn build_with_cache(
        records: Vec<DefectRecord>,
        encoder: &dyn TextEncoder,
        cache: &AHashMap<String, CachedVector>,
    ) -> Result<(Self, Vec<FreshVector>)> {
        let corpus = DefectCorpus::new(records);
        let (index, fresh) = EmbeddingIndex::build_with_cache(corpus.records(), encoder, cache)?;
        Ok((Self { corpus, index }, fresh))
    }
}

/// Handle readers clone snapshots from; rebuilds swap in a fully built value
#[derive(Debug, Default)]
pub struct SharedIndex {
    current: RwLock<Option<Arc<IndexedCorpus>>>,
}

impl SharedIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current snapshot, or `IndexUnavailable` before the first build
    pub fn snapshot(&self) -> Result<Arc<IndexedCorpus>> {
        let guard = self.current.read().unwrap_or_else(|p| p.into_inner());
        guard.clone().ok_or(BugbusterError::IndexUnavailable)
    }

    pub fn is_ready(&self) -> bool {
        self.current
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .is_some()
    }

    /// Replace the current snapshot
    pub fn install(&self, indexed: IndexedCorpus) {
        let records = indexed.corpus.len();
        let next = Arc::new(indexed);
        let mut guard = self.current.write().unwrap_or_else(|p| p.into_inner());
        *guard = Some(next);
        tracing::info!("Installed defect index with {} records", records);
    }

    /// Build a new snapshot outside the lock, then swap it in
    pub fn rebuild(&self, records: Vec<DefectRecord>, encoder: &dyn TextEncoder) -> Result<()> {
        let indexed = IndexedCorpus::build(records, encoder)?;
        self.install(indexed);
        Ok(())
    }
}

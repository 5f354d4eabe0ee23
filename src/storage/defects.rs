//! Defect record store and embedding cache

use super::Database;
use crate::embedding::{CachedVector, FreshVector};
use crate::error::{BugbusterError, Result};
use crate::records::DefectRecord;
use ahash::AHashMap;
use rusqlite::{params, OptionalExtension};
use std::path::Path;

/// Outcome of an import
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportStats {
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
}

/// Persistent home of the defect corpus
pub struct DefectStore {
    db: Database,
}

impl DefectStore {
    pub fn open(db_path: &Path) -> Result<Self> {
        Ok(Self {
            db: Database::new(db_path)?,
        })
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Insert new records and replace changed ones, keeping ingestion order
    pub fn import_records(&self, records: &[DefectRecord]) -> Result<ImportStats> {
        let mut conn = self.db.get_conn()?;
        let tx = conn.transaction()?;
        let mut stats = ImportStats::default();
        let now = chrono::Utc::now().to_rfc3339();

        for record in records {
            let hash = record.content_hash();
            let json = serde_json::to_string(record).map_err(|e| BugbusterError::Json {
                source: e,
                context: format!("Failed to serialize defect {}", record.key),
            })?;

            let existing: Option<(String, String)> = tx
                .query_row(
                    "SELECT record, content_hash FROM defects WHERE key = ?1",
                    params![record.key],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            match existing {
                None => {
                    tx.execute(
                        "INSERT INTO defects (key, record, content_hash, ingested_at)
                         VALUES (?1, ?2, ?3, ?4)",
                        params![record.key, json, hash, now],
                    )?;
                    stats.inserted += 1;
                }
                Some((stored, _)) if stored == json => stats.unchanged += 1,
                Some(_) => {
                    tx.execute(
                        "UPDATE defects SET record = ?2, content_hash = ?3, ingested_at = ?4
                         WHERE key = ?1",
                        params![record.key, json, hash, now],
                    )?;
                    stats.updated += 1;
                }
            }
        }

        tx.commit()?;
        tracing::info!(
            "Imported defects: {} new, {} updated, {} unchanged",
            stats.inserted,
            stats.updated,
            stats.unchanged
        );
        Ok(stats)
    }

    /// All records in ingestion order
    pub fn load_records(&self) -> Result<Vec<DefectRecord>> {
        let conn = self.db.get_conn()?;
        let mut stmt = conn.prepare("SELECT key, record FROM defects ORDER BY seq")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (key, json) = row?;
            let record: DefectRecord =
                serde_json::from_str(&json).map_err(|e| BugbusterError::Json {
                    source: e,
                    context: format!("Corrupt stored defect {}", key),
                })?;
            records.push(record);
        }
        Ok(records)
    }

    /// Cached vectors for `model`, keyed by issue key
    pub fn cached_embeddings(&self, model: &str) -> Result<AHashMap<String, CachedVector>> {
        let conn = self.db.get_conn()?;
        let mut stmt =
            conn.prepare("SELECT key, content_hash, vector FROM embeddings WHERE model = ?1")?;
        let rows = stmt.query_map(params![model], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Vec<u8>>(2)?,
            ))
        })?;

        let mut cache = AHashMap::new();
        for row in rows {
            let (key, content_hash, blob) = row?;
            match decode_vector(&blob) {
                Some(vector) => {
                    cache.insert(
                        key,
                        CachedVector {
                            content_hash,
                            vector,
                        },
                    );
                }
                None => tracing::warn!("Skipping corrupt cached embedding for {}", key),
            }
        }
        Ok(cache)
    }

    /// Persist freshly computed vectors for `model`
    pub fn store_embeddings(&self, model: &str, vectors: &[FreshVector]) -> Result<()> {
        if vectors.is_empty() {
            return Ok(());
        }

        let mut conn = self.db.get_conn()?;
        let tx = conn.transaction()?;
        let now = chrono::Utc::now().to_rfc3339();
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO embeddings (key, model, content_hash, vector, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for fresh in vectors {
                stmt.execute(params![
                    fresh.id,
                    model,
                    fresh.content_hash,
                    encode_vector(&fresh.vector),
                    now
                ])?;
            }
        }
        tx.commit()?;
        tracing::debug!("Cached {} embeddings for {}", vectors.len(), model);
        Ok(())
    }

    pub fn count(&self) -> Result<usize> {
        Ok(self.db.stats()?.defect_count)
    }
}

fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|x| x.to_le_bytes()).collect()
}

fn decode_vector(bytes: &[u8]) -> Option<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return None;
    }
    Some(
        bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
    )
}

//! Defect records and the in-memory corpus
//!
//! Records are produced by ingestion (see [`ingest`]) and are read-only to the
//! rest of the crate. The corpus keeps them in ingestion order and provides the
//! direct lookups (by key, by service) the retriever needs.

mod ingest;

pub use ingest::{extract_rca_sections, load_records_file, normalize_issue, RcaSections};

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single defect as ingested from an issue tracker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefectRecord {
    /// Unique issue key (e.g. "SCRUM-7"), always uppercase
    #[serde(alias = "bug_id")]
    pub key: String,

    /// One-line summary
    pub summary: String,

    /// Free-form description
    #[serde(default)]
    pub description: String,

    /// Detected service/component tag (lowercase, may be empty)
    #[serde(default)]
    pub service: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_cause: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solution: Option<String>,

    /// Raw source metadata (owner, url, status, logs, ...)
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl DefectRecord {
    pub fn new(key: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            key: key.into().trim().to_uppercase(),
            summary: summary.into(),
            description: String::new(),
            service: String::new(),
            root_cause: None,
            solution: None,
            metadata: Map::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = service.into().trim().to_lowercase();
        self
    }

    pub fn with_root_cause(mut self, root_cause: impl Into<String>) -> Self {
        self.root_cause = non_empty(root_cause.into());
        self
    }

    pub fn with_solution(mut self, solution: impl Into<String>) -> Self {
        self.solution = non_empty(solution.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Text the embedding is computed from: summary, description, root cause
    /// and solution, skipping absent parts (the key alone if all are empty)
    pub fn embedding_text(&self) -> String {
        let mut parts: Vec<&str> = vec![self.summary.trim()];
        parts.push(self.description.trim());
        if let Some(root_cause) = &self.root_cause {
            parts.push(root_cause.trim());
        }
        if let Some(solution) = &self.solution {
            parts.push(solution.trim());
        }
        let text = parts
            .into_iter()
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join("\n");
        if text.is_empty() {
            self.key.clone()
        } else {
            text
        }
    }

    /// BLAKE3 hash of [`Self::embedding_text`], used to detect stale embeddings
    pub fn content_hash(&self) -> String {
        blake3::hash(self.embedding_text().as_bytes())
            .to_hex()
            .to_string()
    }

    pub fn owner(&self) -> Option<&str> {
        self.metadata_str("owner")
    }

    pub fn url(&self) -> Option<&str> {
        self.metadata_str("url")
    }

    pub fn status(&self) -> Option<&str> {
        self.metadata_str("status")
    }

    pub fn logs(&self) -> Option<&str> {
        self.metadata_str("logs")
    }

    fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
    }
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

/// Ordered, key-indexed collection of defect records
#[derive(Debug, Clone, Default)]
pub struct DefectCorpus {
    records: Vec<DefectRecord>,
    by_key: AHashMap<String, usize>,
}

impl DefectCorpus {
    /// Build a corpus, keeping the first record seen for each key
    pub fn new(records: Vec<DefectRecord>) -> Self {
        let mut corpus = Self::default();
        for record in records {
            let key = record.key.to_uppercase();
            if corpus.by_key.contains_key(&key) {
                tracing::warn!("Duplicate defect key {} ignored", key);
                continue;
            }
            corpus.by_key.insert(key, corpus.records.len());
            corpus.records.push(record);
        }
        corpus
    }

    /// Exact, case-insensitive key lookup
    pub fn get(&self, key: &str) -> Option<&DefectRecord> {
        self.by_key
            .get(&key.trim().to_uppercase())
            .map(|&idx| &self.records[idx])
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// All records in ingestion order
    pub fn records(&self) -> &[DefectRecord] {
        &self.records
    }

    /// Records whose service tag equals `service` (case-insensitive), ingestion order
    pub fn by_service(&self, service: &str) -> Vec<&DefectRecord> {
        let wanted = service.trim().to_lowercase();
        self.records
            .iter()
            .filter(|r| r.service.to_lowercase() == wanted)
            .collect()
    }

    pub fn keys(&self) -> Vec<&str> {
        self.records.iter().map(|r| r.key.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<DefectRecord> {
        vec![
            DefectRecord::new("scrum-7", "Kafka consumer stalls")
                .with_service("Kafka")
                .with_root_cause("connection pool exhaustion"),
            DefectRecord::new("SCRUM-9", "Login button unresponsive").with_service("login"),
            DefectRecord::new("SCRUM-11", "Kafka lag alert").with_service("kafka"),
        ]
    }

    #[test]
    fn test_keys_are_uppercased() {
        let record = DefectRecord::new(" scrum-7 ", "x");
        assert_eq!(record.key, "SCRUM-7");
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let corpus = DefectCorpus::new(sample());
        assert_eq!(corpus.get("scrum-7").unwrap().summary, "Kafka consumer stalls");
        assert!(corpus.get("SCRUM-100").is_none());
    }

    #[test]
    fn test_by_service_keeps_ingestion_order() {
        let corpus = DefectCorpus::new(sample());
        let keys: Vec<&str> = corpus
            .by_service("KAFKA")
            .iter()
            .map(|r| r.key.as_str())
            .collect();
        assert_eq!(keys, vec!["SCRUM-7", "SCRUM-11"]);
        assert!(corpus.by_service("billing").is_empty());
    }

    #[test]
    fn test_duplicate_keys_first_wins() {
        let mut records = sample();
        records.push(DefectRecord::new("SCRUM-7", "Replacement summary"));
        let corpus = DefectCorpus::new(records);
        assert_eq!(corpus.len(), 3);
        assert_eq!(corpus.get("SCRUM-7").unwrap().summary, "Kafka consumer stalls");
    }

    #[test]
    fn test_content_hash_tracks_text() {
        let a = DefectRecord::new("A-1", "summary").with_root_cause("cause");
        let b = a.clone().with_metadata("owner", "someone");
        let c = a.clone().with_solution("restart");
        assert_eq!(a.content_hash(), b.content_hash());
        assert_ne!(a.content_hash(), c.content_hash());
        assert_eq!(c.embedding_text(), "summary\ncause\nrestart");
    }

    #[test]
    fn test_deserialize_accepts_bug_id_alias() {
        let json = r#"{"bug_id":"SCRUM-3","summary":"s","rootCause":"rc","metadata":{"owner":"Dana"}}"#;
        let record: DefectRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.key, "SCRUM-3");
        assert_eq!(record.root_cause.as_deref(), Some("rc"));
        assert_eq!(record.owner(), Some("Dana"));
    }
}

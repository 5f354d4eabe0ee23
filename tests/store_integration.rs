//! Import → persist → index round trip through the SQLite store

use std::io::Write;
use std::sync::Arc;

use bugbuster::config::default_known_services;
use bugbuster::embedding::{HashingEncoder, SharedIndex};
use bugbuster::records::load_records_file;
use bugbuster::storage::DefectStore;
use bugbuster::{refresh_index, DefectRecord, RefreshStats};
use tempfile::TempDir;

#[test]
fn test_refresh_reuses_cached_embeddings() {
    let temp = TempDir::new().unwrap();
    let store = DefectStore::open(&temp.path().join("defects.db")).unwrap();
    let encoder = HashingEncoder::new(64);
    let shared = Arc::new(SharedIndex::new());

    store
        .import_records(&[
            DefectRecord::new("SCRUM-1", "Login page times out").with_service("login"),
            DefectRecord::new("SCRUM-2", "Policy sync drops updates").with_service("policy"),
        ])
        .unwrap();

    let first = refresh_index(&store, &encoder, &shared).unwrap();
    assert_eq!(
        first,
        RefreshStats {
            records: 2,
            encoded: 2,
            cached: 0
        }
    );

    let second = refresh_index(&store, &encoder, &shared).unwrap();
    assert_eq!(second.encoded, 0);
    assert_eq!(second.cached, 2);
    assert_eq!(store.database().stats().unwrap().embedding_count, 2);
}

#[test]
fn test_changed_record_is_reencoded() {
    let temp = TempDir::new().unwrap();
    let store = DefectStore::open(&temp.path().join("defects.db")).unwrap();
    let encoder = HashingEncoder::new(64);
    let shared = SharedIndex::new();

    store
        .import_records(&[
            DefectRecord::new("SCRUM-1", "Login page times out"),
            DefectRecord::new("SCRUM-2", "Policy sync drops updates"),
        ])
        .unwrap();
    refresh_index(&store, &encoder, &shared).unwrap();

    store
        .import_records(&[DefectRecord::new("SCRUM-2", "Policy sync drops updates")
            .with_root_cause("stale version vector")])
        .unwrap();
    let stats = refresh_index(&store, &encoder, &shared).unwrap();

    assert_eq!(stats.encoded, 1);
    assert_eq!(stats.cached, 1);
    let snapshot = shared.snapshot().unwrap();
    assert_eq!(
        snapshot.corpus.get("scrum-2").unwrap().root_cause.as_deref(),
        Some("stale version vector")
    );
}

#[test]
fn test_import_file_into_store() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("issues.json");
    let mut file = std::fs::File::create(&path).unwrap();
    write!(
        file,
        r#"{{"issues": [
            {{"key": "SCRUM-7", "summary": "Kafka consumer stalls", "service": "kafka",
              "rootCause": "connection pool exhaustion"}},
            {{"key": "SCRUM-8", "summary": "Notification emails delayed"}},
            {{"summary": "no key, skipped"}}
        ]}}"#
    )
    .unwrap();

    let records = load_records_file(&path, &default_known_services()).unwrap();
    assert_eq!(records.len(), 2);

    let store = DefectStore::open(&temp.path().join("defects.db")).unwrap();
    let stats = store.import_records(&records).unwrap();
    assert_eq!(stats.inserted, 2);

    let loaded = store.load_records().unwrap();
    assert_eq!(loaded[0].key, "SCRUM-7");
    assert_eq!(loaded[0].service, "kafka");
}

//! End-to-end question answering over an in-memory index
//!
//! Uses the hashing encoder and the extractive model so runs are offline and
//! deterministic.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bugbuster::config::Config;
use bugbuster::embedding::{HashingEncoder, IndexedCorpus, SharedIndex, TextEncoder};
use bugbuster::llm::{ExtractiveModel, GenerationOptions, GenerativeModel, RetryingModel};
use bugbuster::{BugbusterError, ContentType, DefectAssistant, DefectRecord, Query};

fn corpus() -> Vec<DefectRecord> {
    vec![
        DefectRecord::new("SCRUM-7", "Kafka consumer stalls under load")
            .with_service("kafka")
            .with_description("Consumers stop reading after a traffic spike")
            .with_root_cause("connection pool exhaustion")
            .with_solution("raise the pool size and add backpressure"),
        DefectRecord::new("SCRUM-8", "Redis cache returns stale sessions")
            .with_service("redis")
            .with_root_cause("missing TTL on session keys"),
        DefectRecord::new("SCRUM-9", "Kafka topic lag alerts fire constantly")
            .with_service("kafka")
            .with_description("Lag alert threshold too low for nightly batch"),
        DefectRecord::new("INC0010001", "Notification emails delayed by hours")
            .with_service("notification")
            .with_root_cause("SMTP relay throttling"),
    ]
}

fn assistant_with(model: Arc<dyn GenerativeModel>) -> DefectAssistant {
    let encoder: Arc<dyn TextEncoder> = Arc::new(HashingEncoder::new(256));
    let shared = Arc::new(SharedIndex::new());
    shared.rebuild(corpus(), encoder.as_ref()).unwrap();

    DefectAssistant::new(&Config::default(), shared, encoder, model).unwrap()
}

fn assistant() -> DefectAssistant {
    assistant_with(Arc::new(ExtractiveModel::new()))
}

/// Fails every call and counts attempts
struct Unreachable {
    calls: AtomicUsize,
}

#[async_trait]
impl GenerativeModel for Unreachable {
    async fn generate(
        &self,
        _prompt: &str,
        _options: &GenerationOptions,
    ) -> bugbuster::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(BugbusterError::Generation("connection refused".to_string()))
    }

    fn model_name(&self) -> &str {
        "unreachable"
    }
}

#[tokio::test]
async fn test_root_cause_answer_is_grounded() {
    let result = assistant()
        .respond(Query::new("What is the root cause of SCRUM-7?"))
        .await;

    assert_eq!(result.content_type, ContentType::Html);
    assert!(result.message.contains("connection pool exhaustion"));
    assert_eq!(result.results.len(), 1);

    let hit = &result.results[0];
    assert_eq!(hit.defect_id.as_deref(), Some("SCRUM-7"));
    assert_eq!(hit.relevance, 1.0);
    assert!(hit.analysis.contains("connection pool exhaustion"));
}

#[tokio::test]
async fn test_solution_lookup_is_case_insensitive() {
    let result = assistant()
        .respond(Query::new("how do I fix scrum-7"))
        .await;

    assert_eq!(result.results.len(), 1);
    assert_eq!(result.results[0].defect_id.as_deref(), Some("SCRUM-7"));
    assert!(result.results[0]
        .analysis
        .contains("raise the pool size and add backpressure"));
}

#[tokio::test]
async fn test_unknown_key_is_reported_as_text() {
    let result = assistant()
        .respond(Query::new("root cause of SCRUM-404"))
        .await;

    assert_eq!(result.content_type, ContentType::Text);
    assert!(result.results.is_empty());
    assert!(result.message.contains("SCRUM-404"));
}

#[tokio::test]
async fn test_service_filter_returns_only_that_service() {
    let result = assistant()
        .respond(Query::new("show all kafka service issues"))
        .await;

    let keys: Vec<&str> = result
        .results
        .iter()
        .filter_map(|m| m.defect_id.as_deref())
        .collect();
    assert_eq!(keys, vec!["SCRUM-7", "SCRUM-9"]);
    assert!(result
        .results
        .iter()
        .all(|m| (0.0..=1.0).contains(&m.relevance)));
}

#[tokio::test]
async fn test_service_without_records_gets_text_answer() {
    let result = assistant()
        .respond(Query::new("any postgres service problems"))
        .await;

    assert_eq!(result.content_type, ContentType::Text);
    assert!(result.message.contains("postgres"));
}

#[tokio::test]
async fn test_list_all_keeps_ingestion_order() {
    let result = assistant().respond(Query::new("list all defects")).await;

    let keys: Vec<&str> = result
        .results
        .iter()
        .filter_map(|m| m.defect_id.as_deref())
        .collect();
    assert_eq!(keys, vec!["SCRUM-7", "SCRUM-8", "SCRUM-9", "INC0010001"]);
}

#[tokio::test]
async fn test_follow_up_uses_previous_subject() {
    let assistant = assistant();

    assistant
        .respond(Query::new("why did SCRUM-8 happen").in_conversation("c1"))
        .await;
    let result = assistant
        .respond(Query::new("and how was it resolved?").in_conversation("c1"))
        .await;

    assert_eq!(result.content_type, ContentType::Html);
    let first = &result.results[0];
    assert_eq!(first.defect_id.as_deref(), Some("SCRUM-8"));
    assert_eq!(first.relevance, 1.0);
    assert_eq!(assistant.conversations().len("c1").await, 2);
}

#[tokio::test]
async fn test_follow_up_without_conversation_has_no_subject() {
    let assistant = assistant();

    assistant
        .respond(Query::new("why did SCRUM-8 happen").in_conversation("c1"))
        .await;
    let result = assistant
        .respond(Query::new("and how was it resolved?").in_conversation("c2"))
        .await;

    let pinned = result
        .results
        .iter()
        .any(|m| m.defect_id.as_deref() == Some("SCRUM-8") && m.relevance == 1.0);
    assert!(!pinned);
    assert_eq!(
        assistant.conversations().last_subject(Some("c1")).await.as_deref(),
        Some("SCRUM-8")
    );
}

#[tokio::test]
async fn test_general_question_mentions_key() {
    let result = assistant()
        .respond(Query::new("tell me about SCRUM-9"))
        .await;

    assert_eq!(result.results[0].defect_id.as_deref(), Some("SCRUM-9"));
    assert_eq!(result.results[0].relevance, 1.0);
}

#[tokio::test]
async fn test_incident_root_cause_by_id() {
    let result = assistant()
        .respond(Query::new("what is the root cause of INC0010001"))
        .await;

    assert_eq!(result.content_type, ContentType::Html);
    assert_eq!(result.results.len(), 1);
    assert_eq!(result.results[0].defect_id.as_deref(), Some("INC0010001"));
    assert_eq!(result.results[0].relevance, 1.0);
    assert!(result.results[0].analysis.contains("SMTP relay throttling"));
}

#[tokio::test]
async fn test_generation_failure_after_retry_is_text() {
    let inner = Arc::new(Unreachable {
        calls: AtomicUsize::new(0),
    });
    let model = RetryingModel::new(
        inner.clone(),
        Duration::from_secs(1),
        1,
        Duration::from_millis(1),
    );
    let assistant = assistant_with(Arc::new(model));

    let result = assistant
        .respond(Query::new("what is the root cause of SCRUM-7").in_conversation("c1"))
        .await;

    assert_eq!(result.content_type, ContentType::Text);
    assert!(result.results.is_empty());
    assert!(result.message.contains("not responding"));
    assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    assert_eq!(assistant.conversations().len("c1").await, 0);
}

#[tokio::test]
async fn test_question_without_terms_gets_no_match_text() {
    let result = assistant().respond(Query::new("???")).await;

    assert_eq!(result.content_type, ContentType::Text);
    assert!(result.results.is_empty());
    assert!(result.message.starts_with("No matching defects found"));
}

#[test]
fn test_rebuild_is_deterministic() {
    let encoder = HashingEncoder::new(256);
    let first = IndexedCorpus::build(corpus(), &encoder).unwrap();
    let second = IndexedCorpus::build(corpus(), &encoder).unwrap();

    let query = encoder.encode("kafka consumer lag").unwrap();
    let a = first.index.query(&query, 3).unwrap();
    let b = second.index.query(&query, 3).unwrap();

    let ids_a: Vec<&str> = a.iter().map(|h| h.id.as_str()).collect();
    let ids_b: Vec<&str> = b.iter().map(|h| h.id.as_str()).collect();
    assert_eq!(ids_a, ids_b);
    assert_eq!(ids_a.len(), 3);
}

//! Candidate selection for a classified question
//!
//! Key-based intents resolve by exact lookup, service and list intents by
//! filtering the corpus, and general questions by nearest-neighbour search
//! over the shared embedding index.

use crate::config::RetrievalConfig;
use crate::conversation::ConversationContext;
use crate::embedding::{IndexedCorpus, SharedIndex, TextEncoder};
use crate::error::{BugbusterError, Result};
use crate::intent::{normalize, Intent, IntentClassifier};
use crate::records::DefectRecord;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Words that make a question refer back to the previous subject
const REFERRING_WORDS: &[&str] = &["it", "its", "this", "that", "same", "previous", "above"];

/// A question as it arrives at the pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Query {
    /// Question text
    pub text: String,

    /// Optional conversation the question belongs to
    pub conversation_id: Option<String>,
}

impl Query {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            conversation_id: None,
        }
    }

    pub fn in_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }
}

/// A record selected for answering, with its retrieval similarity
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub record: DefectRecord,
    pub similarity: f32,
}

impl Candidate {
    fn exact(record: &DefectRecord) -> Self {
        Self {
            record: record.clone(),
            similarity: 1.0,
        }
    }
}

/// Retrieval outcome for one question
#[derive(Debug, Clone, Default)]
pub struct Retrieval {
    pub candidates: Vec<Candidate>,
    /// Issue key the question resolved to, recorded in the conversation
    pub subject: Option<String>,
}

/// Read-only candidate selector over the shared index
pub struct Retriever {
    shared: Arc<SharedIndex>,
    encoder: Arc<dyn TextEncoder>,
    classifier: Arc<IntentClassifier>,
    config: RetrievalConfig,
}

impl Retriever {
    pub fn new(
        shared: Arc<SharedIndex>,
        encoder: Arc<dyn TextEncoder>,
        classifier: Arc<IntentClassifier>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            shared,
            encoder,
            classifier,
            config,
        }
    }

    /// Select candidates for `intent`
    ///
    /// Encodes text, so callers on an async runtime should run this on a
    /// blocking thread.
    pub fn retrieve(
        &self,
        query: &Query,
        intent: &Intent,
        context: &ConversationContext,
    ) -> Result<Retrieval> {
        let snapshot = self.shared.snapshot()?;

        let retrieval = match intent {
            Intent::ListAll => {
                let limit = self.config.list_limit.unwrap_or(usize::MAX);
                Retrieval {
                    candidates: snapshot
                        .corpus
                        .records()
                        .iter()
                        .take(limit)
                        .map(Candidate::exact)
                        .collect(),
                    subject: None,
                }
            }
            Intent::RootCause(key) | Intent::Solution(key) => {
                let record = snapshot
                    .corpus
                    .get(key)
                    .ok_or_else(|| BugbusterError::NotFound { key: key.clone() })?;
                Retrieval {
                    candidates: vec![Candidate::exact(record)],
                    subject: Some(record.key.clone()),
                }
            }
            Intent::ServiceFilter(service) => Retrieval {
                candidates: self.by_service(&snapshot, &query.text, service)?,
                subject: None,
            },
            Intent::General(text) => self.general(&snapshot, text, context)?,
        };

        tracing::debug!(
            "Retrieved {} candidates for {} intent",
            retrieval.candidates.len(),
            intent.label()
        );
        Ok(retrieval)
    }

    fn by_service(
        &self,
        snapshot: &IndexedCorpus,
        text: &str,
        service: &str,
    ) -> Result<Vec<Candidate>> {
        let records = snapshot.corpus.by_service(service);
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let vector = self.encoder.encode(text)?;
        records
            .into_iter()
            .map(|record| -> Result<Candidate> {
                let similarity = snapshot
                    .index
                    .similarity(&record.key, &vector)?
                    .unwrap_or(0.0);
                Ok(Candidate {
                    record: record.clone(),
                    similarity,
                })
            })
            .collect()
    }

    fn general(
        &self,
        snapshot: &IndexedCorpus,
        text: &str,
        context: &ConversationContext,
    ) -> Result<Retrieval> {
        let mut candidates: Vec<Candidate> = Vec::new();

        let follow_up = context
            .last_subject
            .as_deref()
            .filter(|_| is_follow_up(text))
            .and_then(|key| snapshot.corpus.get(key));
        if let Some(record) = follow_up {
            tracing::debug!("Follow-up question refers to {}", record.key);
            push_unique(&mut candidates, Candidate::exact(record));
        }

        for key in self.classifier.issue_keys(text) {
            if let Some(record) = snapshot.corpus.get(&key) {
                push_unique(&mut candidates, Candidate::exact(record));
            }
        }

        if has_search_terms(text) {
            let vector = self.encoder.encode(text)?;
            for hit in snapshot.index.query(&vector, self.config.top_k)? {
                if hit.score < self.config.min_similarity {
                    continue;
                }
                if let Some(record) = snapshot.corpus.get(&hit.id) {
                    push_unique(
                        &mut candidates,
                        Candidate {
                            record: record.clone(),
                            similarity: hit.score,
                        },
                    );
                }
            }
        } else {
            tracing::debug!("Question has no searchable terms, skipping semantic search");
        }

        let subject = candidates.first().map(|c| c.record.key.clone());
        Ok(Retrieval {
            candidates,
            subject,
        })
    }
}

fn push_unique(candidates: &mut Vec<Candidate>, candidate: Candidate) {
    if !candidates
        .iter()
        .any(|c| c.record.key == candidate.record.key)
    {
        candidates.push(candidate);
    }
}

fn has_search_terms(text: &str) -> bool {
    text.chars().any(char::is_alphanumeric)
}

/// Whether the question contains a word referring back to an earlier answer
pub fn is_follow_up(text: &str) -> bool {
    normalize(text)
        .split(|c: char| !c.is_alphanumeric())
        .any(|w| REFERRING_WORDS.contains(&w))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_known_services;
    use crate::embedding::HashingEncoder;

    fn corpus() -> Vec<DefectRecord> {
        vec![
            DefectRecord::new("SCRUM-7", "Kafka consumer stalls under load")
                .with_service("kafka")
                .with_root_cause("connection pool exhaustion")
                .with_solution("raise the pool size and add backpressure"),
            DefectRecord::new("SCRUM-9", "Login button unresponsive on mobile")
                .with_service("login")
                .with_root_cause("click handler detached after rerender"),
            DefectRecord::new("SCRUM-11", "Kafka producer drops messages")
                .with_service("kafka")
                .with_root_cause("acks set to zero"),
        ]
    }

    fn retriever_with(config: RetrievalConfig) -> Retriever {
        let encoder: Arc<dyn TextEncoder> = Arc::new(HashingEncoder::new(256));
        let shared = Arc::new(SharedIndex::new());
        shared.rebuild(corpus(), encoder.as_ref()).unwrap();
        let classifier = Arc::new(IntentClassifier::new(&default_known_services()).unwrap());
        Retriever::new(shared, encoder, classifier, config)
    }

    fn retriever() -> Retriever {
        retriever_with(RetrievalConfig::default())
    }

    fn keys(retrieval: &Retrieval) -> Vec<&str> {
        retrieval
            .candidates
            .iter()
            .map(|c| c.record.key.as_str())
            .collect()
    }

    #[test]
    fn test_key_lookup() {
        let retrieval = retriever()
            .retrieve(
                &Query::new("root cause of scrum-7"),
                &Intent::RootCause("SCRUM-7".into()),
                &ConversationContext::anonymous(),
            )
            .unwrap();
        assert_eq!(keys(&retrieval), vec!["SCRUM-7"]);
        assert_eq!(retrieval.candidates[0].similarity, 1.0);
        assert_eq!(retrieval.subject.as_deref(), Some("SCRUM-7"));
    }

    #[test]
    fn test_missing_key_is_not_found() {
        let result = retriever().retrieve(
            &Query::new("root cause of NOPE-1"),
            &Intent::RootCause("NOPE-1".into()),
            &ConversationContext::anonymous(),
        );
        assert!(matches!(result, Err(BugbusterError::NotFound { key }) if key == "NOPE-1"));
    }

    #[test]
    fn test_list_all_in_ingestion_order_with_limit() {
        let all = retriever()
            .retrieve(
                &Query::new("list all"),
                &Intent::ListAll,
                &ConversationContext::anonymous(),
            )
            .unwrap();
        assert_eq!(keys(&all), vec!["SCRUM-7", "SCRUM-9", "SCRUM-11"]);

        let limited = retriever_with(RetrievalConfig {
            list_limit: Some(2),
            ..Default::default()
        })
        .retrieve(
            &Query::new("list all"),
            &Intent::ListAll,
            &ConversationContext::anonymous(),
        )
        .unwrap();
        assert_eq!(keys(&limited), vec!["SCRUM-7", "SCRUM-9"]);
    }

    #[test]
    fn test_service_filter() {
        let retriever = retriever();
        let kafka = retriever
            .retrieve(
                &Query::new("show all kafka service issues"),
                &Intent::ServiceFilter("KAFKA".into()),
                &ConversationContext::anonymous(),
            )
            .unwrap();
        assert_eq!(keys(&kafka), vec!["SCRUM-7", "SCRUM-11"]);
        assert!(kafka.candidates.iter().all(|c| c.similarity <= 1.0));

        let none = retriever
            .retrieve(
                &Query::new("billing service"),
                &Intent::ServiceFilter("billing".into()),
                &ConversationContext::anonymous(),
            )
            .unwrap();
        assert!(none.candidates.is_empty());
    }

    #[test]
    fn test_general_ranks_by_similarity() {
        let text = "kafka consumer stalls under load";
        let retrieval = retriever()
            .retrieve(
                &Query::new(text),
                &Intent::General(text.into()),
                &ConversationContext::anonymous(),
            )
            .unwrap();
        assert_eq!(keys(&retrieval)[0], "SCRUM-7");
        assert!(retrieval.candidates.iter().all(|c| c.similarity >= 0.3));
    }

    #[test]
    fn test_general_below_threshold_is_empty() {
        let text = "quarterly budget spreadsheet";
        let retrieval = retriever_with(RetrievalConfig {
            min_similarity: 0.9,
            ..Default::default()
        })
        .retrieve(
            &Query::new(text),
            &Intent::General(text.into()),
            &ConversationContext::anonymous(),
        )
        .unwrap();
        assert!(retrieval.candidates.is_empty());
        assert_eq!(retrieval.subject, None);
    }

    #[test]
    fn test_follow_up_puts_previous_subject_first() {
        let text = "show its solution";
        let context = ConversationContext {
            conversation_id: Some("c1".into()),
            last_subject: Some("SCRUM-9".into()),
            recent: Vec::new(),
        };
        let retrieval = retriever()
            .retrieve(&Query::new(text), &Intent::General(text.into()), &context)
            .unwrap();
        assert_eq!(keys(&retrieval)[0], "SCRUM-9");
        assert_eq!(retrieval.candidates[0].similarity, 1.0);
        assert_eq!(
            keys(&retrieval).iter().filter(|k| **k == "SCRUM-9").count(),
            1
        );
    }

    #[test]
    fn test_punctuation_only_question_has_no_candidates() {
        let retrieval = retriever()
            .retrieve(
                &Query::new("???"),
                &Intent::General("???".into()),
                &ConversationContext::anonymous(),
            )
            .unwrap();
        assert!(retrieval.candidates.is_empty());
        assert_eq!(retrieval.subject, None);
    }

    #[test]
    fn test_incident_ids_are_included() {
        let text = "anything similar to INC0010001?";
        let encoder: Arc<dyn TextEncoder> = Arc::new(HashingEncoder::new(64));
        let shared = Arc::new(SharedIndex::new());
        let mut records = corpus();
        records.push(DefectRecord::new("INC0010001", "Email relay rejects attachments"));
        shared.rebuild(records, encoder.as_ref()).unwrap();
        let classifier = Arc::new(IntentClassifier::new(&default_known_services()).unwrap());
        let retrieval = Retriever::new(shared, encoder, classifier, RetrievalConfig::default())
            .retrieve(
                &Query::new(text),
                &Intent::General(text.into()),
                &ConversationContext::anonymous(),
            )
            .unwrap();
        assert_eq!(keys(&retrieval)[0], "INC0010001");
        assert_eq!(retrieval.candidates[0].similarity, 1.0);
    }

    #[test]
    fn test_mentioned_keys_are_included() {
        let text = "compare SCRUM-11 with the login bug";
        let retrieval = retriever()
            .retrieve(
                &Query::new(text),
                &Intent::General(text.into()),
                &ConversationContext::anonymous(),
            )
            .unwrap();
        assert_eq!(keys(&retrieval)[0], "SCRUM-11");
    }

    #[test]
    fn test_unbuilt_index_is_unavailable() {
        let encoder: Arc<dyn TextEncoder> = Arc::new(HashingEncoder::new(16));
        let classifier = Arc::new(IntentClassifier::new(&[]).unwrap());
        let retriever = Retriever::new(
            Arc::new(SharedIndex::new()),
            encoder,
            classifier,
            RetrievalConfig::default(),
        );
        let result = retriever.retrieve(
            &Query::new("list all"),
            &Intent::ListAll,
            &ConversationContext::anonymous(),
        );
        assert!(matches!(result, Err(BugbusterError::IndexUnavailable)));
    }

    #[test]
    fn test_follow_up_detection() {
        assert!(is_follow_up("What was its root cause?"));
        assert!(is_follow_up("show the same for kafka"));
        assert!(!is_follow_up("kafka consumer stalls"));
        assert!(!is_follow_up("items with italics"));
    }
}

//! Question answering pipeline
//!
//! classify → retrieve → compose, once per question. Every failure is turned
//! into a text [`AnalysisResult`] so callers always get a displayable answer.

use crate::compose::{AnalysisResult, AnswerComposer};
use crate::config::Config;
use crate::conversation::ConversationStore;
use crate::embedding::{IndexedCorpus, SharedIndex, TextEncoder};
use crate::error::{BugbusterError, Result};
use crate::intent::IntentClassifier;
use crate::llm::{GenerationOptions, GenerativeModel};
use crate::retrieval::{Query, Retriever};
use crate::storage::DefectStore;
use std::sync::Arc;
use tracing::Instrument;

const EMPTY_QUESTION: &str = "Please enter a question about a defect, for example \
\"what is the root cause of SCRUM-7\".";

/// Number of known keys listed when a lookup fails
const KNOWN_KEYS_SHOWN: usize = 20;

/// Outcome of rebuilding the shared index from the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshStats {
    pub records: usize,
    pub encoded: usize,
    pub cached: usize,
}

/// Rebuild the shared index from the store, reusing cached embeddings
///
/// Blocking; run it on a blocking thread from async code.
pub fn refresh_index(
    store: &DefectStore,
    encoder: &dyn TextEncoder,
    shared: &SharedIndex,
) -> Result<RefreshStats> {
    let records = store.load_records()?;
    let cache = store.cached_embeddings(encoder.model_name())?;
    let (indexed, fresh) = IndexedCorpus::build_with_cache(records, encoder, &cache)?;
    store.store_embeddings(encoder.model_name(), &fresh)?;

    let stats = RefreshStats {
        records: indexed.corpus.len(),
        encoded: fresh.len(),
        cached: indexed.corpus.len() - fresh.len(),
    };
    shared.install(indexed);
    tracing::info!(
        "Index refreshed: {} records ({} encoded, {} from cache)",
        stats.records,
        stats.encoded,
        stats.cached
    );
    Ok(stats)
}

/// Answers defect questions end to end
pub struct DefectAssistant {
    classifier: Arc<IntentClassifier>,
    retriever: Arc<Retriever>,
    composer: AnswerComposer,
    conversations: Arc<ConversationStore>,
    shared: Arc<SharedIndex>,
    history_in_prompt: usize,
}

impl DefectAssistant {
    /// Wire the pipeline from configuration around an existing index
    pub fn new(
        config: &Config,
        shared: Arc<SharedIndex>,
        encoder: Arc<dyn TextEncoder>,
        model: Arc<dyn GenerativeModel>,
    ) -> Result<Self> {
        let classifier = Arc::new(IntentClassifier::new(&config.intent.known_services)?);
        let conversations = Arc::new(ConversationStore::new(config.conversation.max_turns));
        let retriever = Arc::new(Retriever::new(
            Arc::clone(&shared),
            encoder,
            Arc::clone(&classifier),
            config.retrieval.clone(),
        ));
        let composer = AnswerComposer::new(
            model,
            Arc::clone(&conversations),
            GenerationOptions::from(&config.llm),
            &config.compose,
            &config.conversation,
        );

        Ok(Self {
            classifier,
            retriever,
            composer,
            conversations,
            shared,
            history_in_prompt: config.conversation.history_in_prompt,
        })
    }

    pub fn conversations(&self) -> &Arc<ConversationStore> {
        &self.conversations
    }

    pub fn index(&self) -> &Arc<SharedIndex> {
        &self.shared
    }

    /// Answer a question; failures become text results
    pub async fn respond(&self, query: Query) -> AnalysisResult {
        let span = tracing::info_span!("request", id = %uuid::Uuid::new_v4());
        async move {
            match self.try_respond(&query).await {
                Ok(result) => result,
                Err(e) => self.error_result(e),
            }
        }
        .instrument(span)
        .await
    }

    /// Answer a question, surfacing failures
    pub async fn try_respond(&self, query: &Query) -> Result<AnalysisResult> {
        if query.text.trim().is_empty() {
            return Ok(AnalysisResult::text(EMPTY_QUESTION));
        }

        let intent = self.classifier.classify(&query.text);
        tracing::info!("Question classified as {}", intent.label());

        let context = self
            .conversations
            .context(query.conversation_id.as_deref(), self.history_in_prompt)
            .await;

        let retriever = Arc::clone(&self.retriever);
        let (owned_query, owned_intent, owned_context) =
            (query.clone(), intent.clone(), context.clone());
        let retrieval = tokio::task::spawn_blocking(move || {
            retriever.retrieve(&owned_query, &owned_intent, &owned_context)
        })
        .await
        .map_err(|e| BugbusterError::Other(anyhow::anyhow!("Retrieval task failed: {}", e)))??;

        self.composer
            .compose(query, &intent, retrieval, &context)
            .await
    }

    fn error_result(&self, error: BugbusterError) -> AnalysisResult {
        match &error {
            BugbusterError::NotFound { key } => {
                tracing::info!("Defect {} not found", key);
                let mut message = error.user_message();
                if let Ok(snapshot) = self.shared.snapshot() {
                    let keys = snapshot.corpus.keys();
                    if !keys.is_empty() {
                        let shown: Vec<&str> = keys.iter().take(KNOWN_KEYS_SHOWN).copied().collect();
                        message.push_str("\n\nKnown defects: ");
                        message.push_str(&shown.join(", "));
                        if keys.len() > KNOWN_KEYS_SHOWN {
                            message.push_str(&format!(" and {} more", keys.len() - KNOWN_KEYS_SHOWN));
                        }
                    }
                }
                AnalysisResult::text(message)
            }
            BugbusterError::IndexUnavailable => {
                tracing::warn!("Question received before the index was built");
                AnalysisResult::text(error.user_message())
            }
            BugbusterError::Generation(reason) => {
                tracing::warn!("Generation failed: {}", reason);
                AnalysisResult::text(error.user_message())
            }
            _ => {
                tracing::error!("Request failed: {}", error);
                AnalysisResult::text(error.user_message())
            }
        }
    }
}

//! Answer composition
//!
//! Builds the grounded prompt from retrieved candidates, calls the generative
//! model once, and shapes its reply into an [`AnalysisResult`]. Replies that
//! do not follow the requested layout are wrapped in a single fallback entry
//! instead of failing the request.

mod parser;
pub mod prompt;
mod render;
mod result;

pub use parser::{parse_model_output, ParsedReply};
pub use prompt::{Focus, PromptBuilder};
pub use render::{escape_html, HtmlRenderer};
pub use result::{AnalysisResult, ContentType, ScoredMatch};

use crate::config::{ComposeConfig, ConversationConfig};
use crate::conversation::{ConversationContext, ConversationStore};
use crate::error::{BugbusterError, Result};
use crate::intent::Intent;
use crate::llm::{GenerationOptions, GenerativeModel};
use crate::retrieval::{Candidate, Query, Retrieval};
use std::sync::Arc;

const FALLBACK_SUMMARY: &str = "Unstructured answer";

pub struct AnswerComposer {
    model: Arc<dyn GenerativeModel>,
    conversations: Arc<ConversationStore>,
    prompts: PromptBuilder,
    renderer: HtmlRenderer,
    options: GenerationOptions,
    fallback_relevance: f32,
    history_in_prompt: usize,
}

impl AnswerComposer {
    pub fn new(
        model: Arc<dyn GenerativeModel>,
        conversations: Arc<ConversationStore>,
        options: GenerationOptions,
        compose: &ComposeConfig,
        conversation: &ConversationConfig,
    ) -> Self {
        Self {
            model,
            conversations,
            prompts: PromptBuilder::new(compose.issue_base_url.clone()),
            renderer: HtmlRenderer::new(compose.issue_base_url.clone()),
            options,
            fallback_relevance: compose.fallback_relevance.clamp(0.0, 1.0),
            history_in_prompt: conversation.history_in_prompt,
        }
    }

    /// Turn retrieved candidates into an answer and record the turn
    pub async fn compose(
        &self,
        query: &Query,
        intent: &Intent,
        retrieval: Retrieval,
        context: &ConversationContext,
    ) -> Result<AnalysisResult> {
        let conversation_id = query.conversation_id.as_deref();
        let Retrieval {
            candidates,
            subject,
        } = retrieval;

        if candidates.is_empty() {
            self.conversations
                .append(conversation_id, &query.text, intent.clone(), None)
                .await;
            return Ok(AnalysisResult::text(no_results_message(intent)));
        }

        let history_start = context.recent.len().saturating_sub(self.history_in_prompt);
        let prompt = self.prompts.build(
            &query.text,
            intent,
            &candidates,
            &context.recent[history_start..],
        );
        tracing::debug!(
            "Calling {} with {} candidates ({} prompt chars)",
            self.model.model_name(),
            candidates.len(),
            prompt.len()
        );

        let raw = self.model.generate(&prompt, &self.options).await?;
        let keys: Vec<&str> = candidates.iter().map(|c| c.record.key.as_str()).collect();

        let result = match parse_model_output(&raw, &keys) {
            Ok(reply) => self.structured(reply, &candidates, &keys),
            Err(BugbusterError::MalformedModelOutput(reason)) => {
                tracing::warn!("Model output did not follow the layout ({}), using fallback", reason);
                self.fallback(&raw, intent, &candidates, &keys)
            }
            Err(e) => return Err(e),
        };

        self.conversations
            .append(conversation_id, &query.text, intent.clone(), subject)
            .await;
        Ok(result)
    }

    fn structured(
        &self,
        reply: ParsedReply,
        candidates: &[Candidate],
        keys: &[&str],
    ) -> AnalysisResult {
        let results = candidates
            .iter()
            .filter_map(|candidate| {
                let analysis = reply.analysis_for(&candidate.record.key)?;
                Some(ScoredMatch {
                    defect_id: Some(candidate.record.key.clone()),
                    defect_summary: candidate.record.summary.clone(),
                    relevance: relevance(candidate.similarity),
                    analysis: analysis.to_string(),
                })
            })
            .collect();
        AnalysisResult::html(self.renderer.render(&reply.message, keys), results)
    }

    fn fallback(
        &self,
        raw: &str,
        intent: &Intent,
        candidates: &[Candidate],
        keys: &[&str],
    ) -> AnalysisResult {
        let entry = match (intent.subject_key(), candidates.first()) {
            (Some(_), Some(candidate)) => ScoredMatch {
                defect_id: Some(candidate.record.key.clone()),
                defect_summary: candidate.record.summary.clone(),
                relevance: 1.0,
                analysis: raw.trim().to_string(),
            },
            _ => ScoredMatch {
                defect_id: None,
                defect_summary: FALLBACK_SUMMARY.to_string(),
                relevance: self.fallback_relevance,
                analysis: raw.trim().to_string(),
            },
        };
        AnalysisResult::html(self.renderer.render(raw.trim(), keys), vec![entry])
    }
}

/// Similarity mapped into [0, 1]
fn relevance(similarity: f32) -> f32 {
    if similarity.is_nan() {
        0.0
    } else {
        similarity.clamp(0.0, 1.0)
    }
}

fn no_results_message(intent: &Intent) -> String {
    match intent {
        Intent::ServiceFilter(service) => {
            format!("No defects are recorded for the {} service.", service)
        }
        Intent::ListAll => "No defects have been imported yet.".to_string(),
        _ => "No matching defects found. Try rephrasing your question or mention an issue key."
            .to_string(),
    }
}

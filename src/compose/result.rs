/// Typed answer returned for every question
use serde::{Deserialize, Serialize};

/// How `message` should be displayed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Html,
    Text,
}

/// One record discussed in an answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredMatch {
    /// Issue key, absent for the entry wrapping unstructured output
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub defect_id: Option<String>,
    pub defect_summary: String,
    /// Relevance in [0, 1]
    pub relevance: f32,
    pub analysis: String,
}

/// Complete answer to one question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub message: String,
    pub content_type: ContentType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub results: Vec<ScoredMatch>,
}

impl AnalysisResult {
    /// Plain-text answer without matches
    pub fn text(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            content_type: ContentType::Text,
            results: Vec::new(),
        }
    }

    pub fn html(message: impl Into<String>, results: Vec<ScoredMatch>) -> Self {
        Self {
            message: message.into(),
            content_type: ContentType::Html,
            results,
        }
    }

    pub fn is_text(&self) -> bool {
        self.content_type == ContentType::Text
    }
}

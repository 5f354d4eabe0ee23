//! Per-conversation history for follow-up questions
//!
//! Each conversation owns a bounded FIFO of turns behind its own mutex, so
//! appends on one conversation serialize while different conversations proceed
//! independently. Requests without a conversation id are anonymous and leave
//! no trace.

use crate::intent::Intent;
use ahash::AHashMap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// One answered question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub query: String,
    pub intent: Intent,
    /// Issue key the answer resolved to, if any
    pub subject: Option<String>,
    pub at: DateTime<Utc>,
}

/// Read-only view of a conversation handed to retrieval and composition
#[derive(Debug, Clone, Default)]
pub struct ConversationContext {
    pub conversation_id: Option<String>,
    pub last_subject: Option<String>,
    /// Most recent turns, oldest first
    pub recent: Vec<Turn>,
}

impl ConversationContext {
    /// Context for a request without a conversation id
    pub fn anonymous() -> Self {
        Self::default()
    }
}

type History = Arc<Mutex<VecDeque<Turn>>>;

/// Bounded, append-only conversation store
#[derive(Debug)]
pub struct ConversationStore {
    conversations: RwLock<AHashMap<String, History>>,
    max_turns: usize,
}

impl ConversationStore {
    pub fn new(max_turns: usize) -> Self {
        Self {
            conversations: RwLock::new(AHashMap::new()),
            max_turns: max_turns.max(1),
        }
    }

    pub fn max_turns(&self) -> usize {
        self.max_turns
    }

    async fn history(&self, conversation_id: &str) -> History {
        if let Some(history) = self.conversations.read().await.get(conversation_id) {
            return Arc::clone(history);
        }
        let mut conversations = self.conversations.write().await;
        Arc::clone(
            conversations
                .entry(conversation_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(VecDeque::new()))),
        )
    }

    async fn existing(&self, conversation_id: &str) -> Option<History> {
        self.conversations
            .read()
            .await
            .get(conversation_id)
            .map(Arc::clone)
    }

    /// Record a turn, evicting the oldest past the window
    pub async fn append(
        &self,
        conversation_id: Option<&str>,
        query: &str,
        intent: Intent,
        subject: Option<String>,
    ) {
        let Some(id) = conversation_id else {
            return;
        };

        let history = self.history(id).await;
        let mut turns = history.lock().await;
        turns.push_back(Turn {
            query: query.to_string(),
            intent,
            subject,
            at: Utc::now(),
        });
        while turns.len() > self.max_turns {
            turns.pop_front();
        }
        tracing::debug!("Conversation {} now holds {} turns", id, turns.len());
    }

    /// Most recent non-empty subject in the window
    pub async fn last_subject(&self, conversation_id: Option<&str>) -> Option<String> {
        let history = self.existing(conversation_id?).await?;
        let turns = history.lock().await;
        turns.iter().rev().find_map(|t| t.subject.clone())
    }

    /// Last `n` turns, oldest first
    pub async fn recent(&self, conversation_id: Option<&str>, n: usize) -> Vec<Turn> {
        let Some(id) = conversation_id else {
            return Vec::new();
        };
        let Some(history) = self.existing(id).await else {
            return Vec::new();
        };
        let turns = history.lock().await;
        let skip = turns.len().saturating_sub(n);
        turns.iter().skip(skip).cloned().collect()
    }

    /// Snapshot used by one request
    pub async fn context(&self, conversation_id: Option<&str>, n: usize) -> ConversationContext {
        let Some(id) = conversation_id else {
            return ConversationContext::anonymous();
        };
        let Some(history) = self.existing(id).await else {
            return ConversationContext {
                conversation_id: Some(id.to_string()),
                ..Default::default()
            };
        };

        let turns = history.lock().await;
        let skip = turns.len().saturating_sub(n);
        ConversationContext {
            conversation_id: Some(id.to_string()),
            last_subject: turns.iter().rev().find_map(|t| t.subject.clone()),
            recent: turns.iter().skip(skip).cloned().collect(),
        }
    }

    /// Number of turns held for a conversation
    pub async fn len(&self, conversation_id: &str) -> usize {
        match self.existing(conversation_id).await {
            Some(history) => history.lock().await.len(),
            None => 0,
        }
    }

    pub async fn conversation_count(&self) -> usize {
        self.conversations.read().await.len()
    }
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new(20)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_window_keeps_most_recent() {
        let store = ConversationStore::new(20);
        for i in 0..21 {
            store
                .append(Some("c1"), &format!("q{}", i), Intent::ListAll, None)
                .await;
        }
        assert_eq!(store.len("c1").await, 20);

        let turns = store.recent(Some("c1"), 20).await;
        assert_eq!(turns.first().unwrap().query, "q1");
        assert_eq!(turns.last().unwrap().query, "q20");
    }

    #[tokio::test]
    async fn test_anonymous_is_not_stored() {
        let store = ConversationStore::default();
        store
            .append(None, "q", Intent::ListAll, Some("A-1".into()))
            .await;
        assert_eq!(store.conversation_count().await, 0);
        assert_eq!(store.last_subject(None).await, None);
    }

    #[tokio::test]
    async fn test_last_subject_skips_empty_turns() {
        let store = ConversationStore::default();
        store
            .append(
                Some("c1"),
                "root cause of A-1",
                Intent::RootCause("A-1".into()),
                Some("A-1".into()),
            )
            .await;
        store
            .append(Some("c1"), "list all", Intent::ListAll, None)
            .await;
        assert_eq!(store.last_subject(Some("c1")).await, Some("A-1".into()));
        assert_eq!(store.last_subject(Some("other")).await, None);
    }

    #[tokio::test]
    async fn test_context_snapshot() {
        let store = ConversationStore::default();
        for key in ["A-1", "A-2", "A-3", "A-4"] {
            store
                .append(
                    Some("c1"),
                    key,
                    Intent::Solution(key.into()),
                    Some(key.into()),
                )
                .await;
        }
        let context = store.context(Some("c1"), 3).await;
        assert_eq!(context.last_subject.as_deref(), Some("A-4"));
        let queries: Vec<&str> = context.recent.iter().map(|t| t.query.as_str()).collect();
        assert_eq!(queries, vec!["A-2", "A-3", "A-4"]);

        let fresh = store.context(Some("new"), 3).await;
        assert_eq!(fresh.conversation_id.as_deref(), Some("new"));
        assert!(fresh.recent.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_appends_on_one_conversation() {
        let store = Arc::new(ConversationStore::new(100));
        let mut handles = Vec::new();
        for i in 0..10 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store
                    .append(Some("shared"), &format!("q{}", i), Intent::ListAll, None)
                    .await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(store.len("shared").await, 10);
    }
}

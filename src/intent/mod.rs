//! Rule-based intent classification
//!
//! Input is normalized (lowercased, whitespace collapsed) and checked against
//! the following rules; the first match wins:
//!
//! 1. issue key (`ABC-123`, or an incident id such as `INC0010001`) + root-cause wording ("root cause", "cause", "why")
//!    → [`Intent::RootCause`]
//! 2. issue key + solution wording ("solution", "fix", "resolve", "resolution")
//!    → [`Intent::Solution`]
//! 3. a known service token, or a word followed by "service"
//!    → [`Intent::ServiceFilter`]
//! 4. "list all" / "show all" → [`Intent::ListAll`]
//! 5. anything else → [`Intent::General`] carrying the raw text
//!
//! Rule 3 is checked before rule 4 so that "show all kafka service issues"
//! filters by service instead of enumerating everything.

use crate::error::{BugbusterError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Classified shape of a question
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Intent {
    ListAll,
    RootCause(String),
    Solution(String),
    ServiceFilter(String),
    General(String),
}

impl Intent {
    /// Issue key the intent is about, for key-based intents
    pub fn subject_key(&self) -> Option<&str> {
        match self {
            Intent::RootCause(key) | Intent::Solution(key) => Some(key),
            _ => None,
        }
    }

    pub fn is_key_based(&self) -> bool {
        self.subject_key().is_some()
    }

    /// Short label used in logs and prompts
    pub fn label(&self) -> &'static str {
        match self {
            Intent::ListAll => "list_all",
            Intent::RootCause(_) => "root_cause",
            Intent::Solution(_) => "solution",
            Intent::ServiceFilter(_) => "service",
            Intent::General(_) => "general",
        }
    }
}

const ROOT_CAUSE_WORDS: &[&str] = &["cause", "why"];
const SOLUTION_WORDS: &[&str] = &["solution", "fix", "resolve", "resolution", "solutions"];
const LIST_PHRASES: &[&str] = &["list all", "show all"];
const ISSUE_KEY_PATTERN: &str = r"\b([a-z]+-\d+|inc\d+)\b";

/// Hyphenated technical terms shaped like issue keys (`utf-8`, `sha-256`)
const NON_ISSUE_PREFIXES: &[&str] = &[
    "utf", "ucs", "iso", "sha", "md", "crc", "base", "ipv", "rfc", "http", "tls", "ssl", "win",
    "cp", "ansi",
];

/// Words that can precede "service" without naming one
const SERVICE_STOP_WORDS: &[&str] = &[
    "a", "all", "any", "each", "every", "per", "that", "the", "this", "which", "what", "whose",
    "my", "our", "by", "for", "of", "in", "on",
];

/// Stateless rule-based classifier
#[derive(Debug, Clone)]
pub struct IntentClassifier {
    key_pattern: Regex,
    known_services: Vec<String>,
}

impl IntentClassifier {
    pub fn new(known_services: &[String]) -> Result<Self> {
        let key_pattern = Regex::new(ISSUE_KEY_PATTERN).map_err(|e| {
            BugbusterError::Config(format!("Invalid issue key pattern: {}", e))
        })?;
        Ok(Self {
            key_pattern,
            known_services: known_services
                .iter()
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
        })
    }

    pub fn known_services(&self) -> &[String] {
        &self.known_services
    }

    /// Classify a question
    pub fn classify(&self, text: &str) -> Intent {
        let normalized = normalize(text);
        let words = words(&normalized);

        if let Some(key) = self.issue_key(&normalized) {
            if normalized.contains("root cause") || contains_any(&words, ROOT_CAUSE_WORDS) {
                return Intent::RootCause(key);
            }
            if contains_any(&words, SOLUTION_WORDS) {
                return Intent::Solution(key);
            }
        }

        if let Some(service) = self.service_name(&words) {
            return Intent::ServiceFilter(service);
        }

        if LIST_PHRASES.iter().any(|p| normalized.contains(p)) {
            return Intent::ListAll;
        }

        Intent::General(text.trim().to_string())
    }

    /// First issue key mentioned, uppercased
    pub fn issue_key(&self, normalized: &str) -> Option<String> {
        self.key_pattern
            .captures_iter(normalized)
            .map(|c| c[1].to_string())
            .find(|key| is_issue_key(key))
            .map(|key| key.to_uppercase())
    }

    /// Every issue key mentioned, uppercased, in order of appearance
    pub fn issue_keys(&self, text: &str) -> Vec<String> {
        let normalized = normalize(text);
        let mut keys: Vec<String> = Vec::new();
        for capture in self.key_pattern.captures_iter(&normalized) {
            if !is_issue_key(&capture[1]) {
                continue;
            }
            let key = capture[1].to_uppercase();
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
        keys
    }

    fn service_name(&self, words: &[&str]) -> Option<String> {
        if let Some(known) = words
            .iter()
            .find(|w| self.known_services.iter().any(|s| s == *w))
        {
            return Some((*known).to_string());
        }

        let position = words
            .iter()
            .position(|w| *w == "service" || *w == "services")?;
        let previous = words.get(position.checked_sub(1)?)?;
        if SERVICE_STOP_WORDS.contains(previous) || previous.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        Some((*previous).to_string())
    }
}

fn is_issue_key(candidate: &str) -> bool {
    match candidate.split_once('-') {
        Some((prefix, _)) => !NON_ISSUE_PREFIXES.contains(&prefix),
        None => true,
    }
}

/// Lowercase and collapse whitespace
pub fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn words(normalized: &str) -> Vec<&str> {
    normalized
        .split(|c: char| !(c.is_alphanumeric() || c == '-' || c == '\''))
        .map(|w| w.trim_matches(|c: char| c == '-' || c == '\''))
        .filter(|w| !w.is_empty())
        .collect()
}

fn contains_any(words: &[&str], wanted: &[&str]) -> bool {
    words.iter().any(|w| wanted.contains(w))
}

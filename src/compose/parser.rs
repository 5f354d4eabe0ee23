/// Parsing of the structured model reply
use super::prompt::{MESSAGE_HEADER, RESULT_HEADER};
use crate::error::{BugbusterError, Result};

/// A reply that followed the requested layout
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedReply {
    pub message: String,
    /// (issue key, analysis) in reply order, keys restricted to the candidates
    pub analyses: Vec<(String, String)>,
}

impl ParsedReply {
    pub fn analysis_for(&self, key: &str) -> Option<&str> {
        self.analyses
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, a)| a.as_str())
    }
}

enum Section {
    Preamble,
    Message,
    Result(Option<String>),
}

/// Parse `raw` into a message and per-record analyses
///
/// Blocks naming keys outside `known_keys` are dropped. The reply is malformed
/// when the message is missing or no block names a known key.
pub fn parse_model_output(raw: &str, known_keys: &[&str]) -> Result<ParsedReply> {
    let mut message: Vec<&str> = Vec::new();
    let mut analyses: Vec<(String, Vec<&str>)> = Vec::new();
    let mut saw_message = false;
    let mut section = Section::Preamble;

    for line in raw.lines() {
        let trimmed = strip_emphasis(line.trim());

        if let Some(rest) = trimmed.strip_prefix(MESSAGE_HEADER) {
            saw_message = true;
            section = Section::Message;
            let rest = rest.trim().trim_matches('*').trim();
            if !rest.is_empty() {
                message.push(rest);
            }
            continue;
        }

        if let Some((key, rest)) = result_header(trimmed) {
            let known = known_keys
                .iter()
                .find(|k| k.eq_ignore_ascii_case(&key))
                .map(|k| k.to_string());
            match &known {
                Some(k) if analyses.iter().any(|(existing, _)| existing == k) => {
                    tracing::debug!("Ignoring repeated result block for {}", k);
                    section = Section::Result(None);
                }
                Some(k) => {
                    analyses.push((k.clone(), Vec::new()));
                    if !rest.is_empty() {
                        if let Some((_, lines)) = analyses.last_mut() {
                            lines.push(rest);
                        }
                    }
                    section = Section::Result(Some(k.clone()));
                }
                None => {
                    tracing::warn!("Model referenced unknown defect {}, block discarded", key);
                    section = Section::Result(None);
                }
            }
            continue;
        }

        match &section {
            Section::Preamble => {}
            Section::Message => message.push(line.trim_end()),
            Section::Result(Some(_)) => {
                if let Some((_, lines)) = analyses.last_mut() {
                    lines.push(line.trim_end());
                }
            }
            Section::Result(None) => {}
        }
    }

    let message = join_block(&message);
    if !saw_message || message.is_empty() {
        return Err(BugbusterError::MalformedModelOutput(
            "missing MESSAGE section".to_string(),
        ));
    }

    let analyses: Vec<(String, String)> = analyses
        .into_iter()
        .map(|(key, lines)| (key, join_block(&lines)))
        .collect();
    if analyses.is_empty() {
        return Err(BugbusterError::MalformedModelOutput(
            "no RESULT block names a retrieved defect".to_string(),
        ));
    }

    Ok(ParsedReply { message, analyses })
}

/// `RESULT <KEY>: rest` → (KEY, rest)
fn result_header(line: &str) -> Option<(String, &str)> {
    let rest = line.strip_prefix(RESULT_HEADER)?;
    let (key, tail) = rest.split_once(':')?;
    let key = key
        .trim()
        .trim_matches(|c: char| c == '<' || c == '>' || c == '[' || c == ']');
    if key.is_empty() || key.contains(char::is_whitespace) {
        return None;
    }
    Some((key.to_uppercase(), tail.trim().trim_matches('*').trim()))
}

/// Markdown emphasis around headers (`**MESSAGE:**`)
fn strip_emphasis(line: &str) -> &str {
    line.trim_start_matches(['*', '#', ' '])
}

/// Join lines, dropping leading and trailing blank lines
fn join_block(lines: &[&str]) -> String {
    lines.join("\n").trim().to_string()
}

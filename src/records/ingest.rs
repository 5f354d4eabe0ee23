//! Normalization of issue-tracker exports into [`DefectRecord`]s
//!
//! Accepts either already-normalized records or raw issue objects shaped like
//! the tracker's search API (`key` + `fields.summary` / `fields.description`).
//! Root cause, solution and logs are pulled out of free text when the export
//! does not carry them as fields.

use super::DefectRecord;
use crate::error::{BugbusterError, Result};
use ahash::AHashSet;
use serde_json::Value;
use std::path::Path;

/// Sections recovered from an RCA-style description
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RcaSections {
    pub root_cause: String,
    pub solution: String,
    pub logs: String,
}

#[derive(Clone, Copy, PartialEq)]
enum Section {
    RootCause,
    Solution,
    Logs,
}

const MARKERS: &[(&str, Section)] = &[
    ("root cause:", Section::RootCause),
    ("cause:", Section::RootCause),
    ("reason:", Section::RootCause),
    ("solution:", Section::Solution),
    ("fix:", Section::Solution),
    ("resolution:", Section::Solution),
    ("error log:", Section::Logs),
    ("stack trace:", Section::Logs),
    ("exception:", Section::Logs),
];

/// Split free text into root cause / solution / log sections using marker lines
///
/// A marker starts a section; text after the marker on the same line belongs
/// to it. Lines before the first marker are ignored.
pub fn extract_rca_sections(text: &str) -> RcaSections {
    let mut sections = RcaSections::default();
    let mut current: Option<Section> = None;

    for line in text.lines() {
        let trimmed = line.trim();
        let lower = trimmed.to_lowercase();

        let mut content = trimmed;
        if let Some((marker, section)) = MARKERS.iter().find(|(m, _)| lower.starts_with(m)) {
            current = Some(*section);
            content = trimmed[marker.len()..].trim();
        }

        let Some(section) = current else { continue };
        if content.is_empty() {
            continue;
        }

        let target = match section {
            Section::RootCause => &mut sections.root_cause,
            Section::Solution => &mut sections.solution,
            Section::Logs => &mut sections.logs,
        };
        if !target.is_empty() {
            target.push('\n');
        }
        target.push_str(content);
    }

    sections
}

/// Flatten tracker rich-text (document nodes with nested `content`) to plain text
fn plain_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Object(map) => {
            if let Some(text) = map.get("text").and_then(Value::as_str) {
                return text.to_string();
            }
            let is_block = matches!(
                map.get("type").and_then(Value::as_str),
                Some("paragraph") | Some("heading") | Some("listItem") | Some("codeBlock")
            );
            let inner = map.get("content").map(plain_text).unwrap_or_default();
            if is_block {
                format!("{}\n", inner)
            } else {
                inner
            }
        }
        Value::Array(items) => items.iter().map(plain_text).collect::<Vec<_>>().join(""),
        _ => String::new(),
    }
}

fn first_str(value: &Value, paths: &[&[&str]]) -> Option<String> {
    for path in paths {
        let mut node = value;
        let mut found = true;
        for segment in *path {
            match node.get(segment) {
                Some(next) => node = next,
                None => {
                    found = false;
                    break;
                }
            }
        }
        if !found || node.is_null() {
            continue;
        }
        let text = plain_text(node);
        if !text.trim().is_empty() {
            return Some(text.trim().to_string());
        }
    }
    None
}

/// First known service mentioned in the text, as a whole word
fn detect_service(text: &str, known_services: &[String]) -> Option<String> {
    let lower = text.to_lowercase();
    let words: AHashSet<&str> = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    known_services
        .iter()
        .find(|s| words.contains(s.to_lowercase().as_str()))
        .map(|s| s.to_lowercase())
}

/// Normalize one exported issue; returns `None` when it has no key or summary
pub fn normalize_issue(value: &Value, known_services: &[String]) -> Option<DefectRecord> {
    let key = first_str(value, &[&["key"], &["bug_id"], &["incident_id"]])?;
    let summary = first_str(
        value,
        &[
            &["summary"],
            &["fields", "summary"],
            &["Defect Summary"],
            &["short_description"],
        ],
    )?;
    let description =
        first_str(value, &[&["description"], &["fields", "description"]]).unwrap_or_default();

    let sections = extract_rca_sections(&description);

    let root_cause = first_str(value, &[&["rootCause", "description"], &["rootCause"]])
        .or_else(|| first_str(value, &[&["root_cause"]]))
        .unwrap_or(sections.root_cause);
    let solution = first_str(value, &[&["solution"]]).unwrap_or(sections.solution);

    let service = first_str(value, &[&["service"], &["component"]])
        .or_else(|| {
            detect_service(&format!("{}\n{}", summary, description), known_services)
        })
        .unwrap_or_default();

    let mut record = DefectRecord::new(key, summary)
        .with_description(description)
        .with_service(service)
        .with_root_cause(root_cause)
        .with_solution(solution);

    let owner = first_str(
        value,
        &[
            &["owner"],
            &["metadata", "owner"],
            &["fields", "assignee", "displayName"],
            &["assigned_to"],
        ],
    );
    if let Some(owner) = owner {
        record = record.with_metadata("owner", owner);
    }
    if let Some(url) = first_str(value, &[&["url"], &["bug_url"], &["metadata", "url"]]) {
        record = record.with_metadata("url", url);
    }
    if let Some(status) = first_str(
        value,
        &[
            &["status"],
            &["metadata", "status"],
            &["fields", "status", "name"],
            &["state"],
        ],
    ) {
        record = record.with_metadata("status", status);
    }
    let logs = first_str(
        value,
        &[
            &["logs"],
            &["metadata", "logs"],
            &["rootCause", "analysis", "logs"],
        ],
    )
    .unwrap_or(sections.logs);
    if !logs.is_empty() {
        record = record.with_metadata("logs", logs);
    }

    Some(record)
}

/// Load a JSON array of issues from disk, normalizing and de-duplicating by key
pub fn load_records_file(path: &Path, known_services: &[String]) -> Result<Vec<DefectRecord>> {
    let content = std::fs::read_to_string(path).map_err(|e| BugbusterError::Io {
        source: e,
        context: format!("Failed to read records file: {:?}", path),
    })?;
    let value: Value = serde_json::from_str(&content).map_err(|e| BugbusterError::Json {
        source: e,
        context: format!("Failed to parse records file: {:?}", path),
    })?;

    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("issues") {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(BugbusterError::Config(format!(
                    "Records file {:?} must contain a JSON array or an \"issues\" array",
                    path
                )))
            }
        },
        _ => {
            return Err(BugbusterError::Config(format!(
                "Records file {:?} must contain a JSON array",
                path
            )))
        }
    };

    let mut seen = AHashSet::new();
    let mut records = Vec::new();
    for item in &items {
        match normalize_issue(item, known_services) {
            Some(record) => {
                if seen.insert(record.key.clone()) {
                    records.push(record);
                } else {
                    tracing::debug!("Skipping duplicate issue {}", record.key);
                }
            }
            None => tracing::warn!("Skipping issue without key or summary"),
        }
    }

    tracing::info!("Loaded {} defect records from {:?}", records.len(), path);
    Ok(records)
}

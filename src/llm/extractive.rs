/// Offline model that answers by quoting the records in the prompt
///
/// It reads the FOCUS line and the RECORD blocks of a grounded prompt and
/// writes a reply in the layout the prompt asks for. Used when no remote model
/// is configured, and as a deterministic model in tests.
use super::{GenerationOptions, GenerativeModel};
use crate::compose::prompt::{
    Focus, FIELD_LINK, FIELD_OWNER, FIELD_ROOT_CAUSE, FIELD_SERVICE, FIELD_SOLUTION,
    FIELD_SUMMARY, FOCUS_PREFIX, MESSAGE_HEADER, RECORD_END, RECORD_START, RESULT_HEADER,
};
use crate::error::{BugbusterError, Result};
use async_trait::async_trait;
use std::fmt::Write;

#[derive(Debug, Default)]
struct PromptRecord {
    key: String,
    fields: Vec<(String, String)>,
}

impl PromptRecord {
    fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    fn summary(&self) -> &str {
        self.field(FIELD_SUMMARY).unwrap_or("(no summary)")
    }
}

#[derive(Debug, Default)]
pub struct ExtractiveModel;

impl ExtractiveModel {
    pub fn new() -> Self {
        Self
    }

    fn parse(prompt: &str) -> (Focus, Option<String>, Vec<PromptRecord>) {
        let mut focus = Focus::General;
        let mut service = None;
        let mut records = Vec::new();
        let mut current: Option<PromptRecord> = None;

        for line in prompt.lines() {
            let line = line.trim_end();
            if let Some(rest) = line.strip_prefix(FOCUS_PREFIX) {
                focus = Focus::parse(rest).unwrap_or(Focus::General);
            } else if let Some(rest) = line.strip_prefix("SERVICE:") {
                service = Some(rest.trim().to_string());
            } else if line == RECORD_END {
                if let Some(record) = current.take() {
                    records.push(record);
                }
            } else if let Some(key) = line.strip_prefix(RECORD_START) {
                current = Some(PromptRecord {
                    key: key.trim().to_string(),
                    fields: Vec::new(),
                });
            } else if let Some(record) = current.as_mut() {
                if let Some((name, value)) = line.split_once(": ") {
                    record.fields.push((name.to_string(), value.to_string()));
                }
            }
        }

        (focus, service, records)
    }

    fn analysis(focus: Focus, record: &PromptRecord) -> String {
        let mut text = String::new();
        let root_cause = record.field(FIELD_ROOT_CAUSE);
        let solution = record.field(FIELD_SOLUTION);

        match focus {
            Focus::RootCause => {
                let _ = write!(
                    text,
                    "Root cause: {}",
                    root_cause.unwrap_or("not recorded for this defect")
                );
                if let Some(solution) = solution {
                    let _ = write!(text, "\nSolution: {}", solution);
                }
            }
            Focus::Solution => {
                let _ = write!(
                    text,
                    "Solution: {}",
                    solution.unwrap_or("no solution has been recorded yet")
                );
                if let Some(root_cause) = root_cause {
                    let _ = write!(text, "\nRoot cause: {}", root_cause);
                }
            }
            Focus::List | Focus::Service | Focus::General => {
                let _ = write!(text, "{}", record.summary());
                if let Some(root_cause) = root_cause {
                    let _ = write!(text, "\nRoot cause: {}", root_cause);
                }
                if let Some(solution) = solution {
                    let _ = write!(text, "\nSolution: {}", solution);
                }
            }
        }

        if let Some(owner) = record.field(FIELD_OWNER) {
            let _ = write!(text, "\nOwner: {}", owner);
        }
        if let Some(link) = record.field(FIELD_LINK) {
            let _ = write!(text, "\nLink: {}", link);
        }
        text
    }

    fn message(focus: Focus, service: Option<&str>, records: &[PromptRecord]) -> String {
        let first = &records[0];
        match focus {
            Focus::RootCause => format!(
                "{} ({}) was caused by: {}\nSummary: Root cause of {} identified from the defect record.",
                first.key,
                first.summary(),
                first
                    .field(FIELD_ROOT_CAUSE)
                    .unwrap_or("no root cause has been recorded"),
                first.key
            ),
            Focus::Solution => format!(
                "{} ({}) is resolved by: {}\nSummary: Solution for {} taken from the defect record.",
                first.key,
                first.summary(),
                first
                    .field(FIELD_SOLUTION)
                    .unwrap_or("no solution has been recorded"),
                first.key
            ),
            Focus::List | Focus::Service => {
                let mut text = match (focus, service) {
                    (Focus::Service, Some(service)) => {
                        format!("Defects affecting the {} service:\n", service)
                    }
                    _ => "Known defects:\n".to_string(),
                };
                for record in records {
                    let _ = write!(text, "- {}: {}", record.key, record.summary());
                    if let Some(service) = record.field(FIELD_SERVICE) {
                        if focus == Focus::List {
                            let _ = write!(text, " [{}]", service);
                        }
                    }
                    text.push('\n');
                }
                let _ = write!(text, "Summary: {} defect(s) found.", records.len());
                text
            }
            Focus::General => {
                let mut text = format!(
                    "The most relevant defect is {}: {}.",
                    first.key,
                    first.summary()
                );
                if let Some(root_cause) = first.field(FIELD_ROOT_CAUSE) {
                    let _ = write!(text, " Its root cause was {}.", root_cause);
                }
                if records.len() > 1 {
                    let others: Vec<&str> = records[1..].iter().map(|r| r.key.as_str()).collect();
                    let _ = write!(text, " Related defects: {}.", others.join(", "));
                }
                let _ = write!(
                    text,
                    "\nSummary: {} related defect(s) found, {} matches best.",
                    records.len(),
                    first.key
                );
                text
            }
        }
    }
}

#[async_trait]
impl GenerativeModel for ExtractiveModel {
    async fn generate(&self, prompt: &str, _options: &GenerationOptions) -> Result<String> {
        let (focus, service, records) = Self::parse(prompt);
        if records.is_empty() {
            return Err(BugbusterError::Generation(
                "Prompt contains no defect records".to_string(),
            ));
        }

        let mut reply = format!(
            "{}\n{}\n",
            MESSAGE_HEADER,
            Self::message(focus, service.as_deref(), &records)
        );
        for record in &records {
            let _ = write!(
                reply,
                "{}{}:\n{}\n",
                RESULT_HEADER,
                record.key,
                Self::analysis(focus, record)
            );
        }
        Ok(reply)
    }

    fn model_name(&self) -> &str {
        "extractive"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::prompt::PromptBuilder;
    use crate::intent::Intent;
    use crate::records::DefectRecord;
    use crate::retrieval::Candidate;

    fn prompt_for(intent: Intent, records: Vec<DefectRecord>) -> String {
        let candidates: Vec<Candidate> = records
            .into_iter()
            .map(|record| Candidate {
                record,
                similarity: 1.0,
            })
            .collect();
        PromptBuilder::default().build("question", &intent, &candidates, &[])
    }

    #[tokio::test]
    async fn test_root_cause_reply() {
        let prompt = prompt_for(
            Intent::RootCause("SCRUM-7".into()),
            vec![DefectRecord::new("SCRUM-7", "Kafka consumer stalls")
                .with_root_cause("connection pool exhaustion")],
        );
        let reply = ExtractiveModel::new()
            .generate(&prompt, &GenerationOptions::default())
            .await
            .unwrap();

        assert!(reply.starts_with("MESSAGE:\n"));
        assert!(reply.contains("caused by: connection pool exhaustion"));
        assert!(reply.contains("\nSummary: "));
        assert!(reply.contains("RESULT SCRUM-7:\nRoot cause: connection pool exhaustion"));
    }

    #[tokio::test]
    async fn test_list_reply_has_block_per_record() {
        let prompt = prompt_for(
            Intent::ListAll,
            vec![
                DefectRecord::new("A-1", "first").with_service("kafka"),
                DefectRecord::new("A-2", "second"),
            ],
        );
        let reply = ExtractiveModel::new()
            .generate(&prompt, &GenerationOptions::default())
            .await
            .unwrap();
        assert!(reply.contains("- A-1: first [kafka]"));
        assert!(reply.contains("RESULT A-1:"));
        assert!(reply.contains("RESULT A-2:"));
    }

    #[tokio::test]
    async fn test_prompt_without_records_fails() {
        let result = ExtractiveModel::new()
            .generate("no records here", &GenerationOptions::default())
            .await;
        assert!(matches!(result, Err(BugbusterError::Generation(_))));
    }
}

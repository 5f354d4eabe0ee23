/// Grounded prompt assembly
use crate::conversation::Turn;
use crate::intent::Intent;
use crate::retrieval::Candidate;
use std::fmt::Write;

pub const FOCUS_PREFIX: &str = "FOCUS:";
pub const QUESTION_PREFIX: &str = "QUESTION:";
pub const RECORD_START: &str = "RECORD ";
pub const RECORD_END: &str = "END RECORD";
pub const MESSAGE_HEADER: &str = "MESSAGE:";
pub const RESULT_HEADER: &str = "RESULT ";

/// Record fields, in prompt order
pub const FIELD_SUMMARY: &str = "Summary";
pub const FIELD_SERVICE: &str = "Service";
pub const FIELD_DESCRIPTION: &str = "Description";
pub const FIELD_ROOT_CAUSE: &str = "Root cause";
pub const FIELD_SOLUTION: &str = "Solution";
pub const FIELD_OWNER: &str = "Owner";
pub const FIELD_LOGS: &str = "Logs";
pub const FIELD_LINK: &str = "Link";

const PERSONA: &str = "You are Bugbuster, a defect analysis assistant for a software \
engineering team. You answer questions about known defects using only the defect \
records provided below. If the records do not contain the answer, say so plainly.";

/// What the answer should concentrate on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    RootCause,
    Solution,
    List,
    Service,
    General,
}

impl Focus {
    pub fn for_intent(intent: &Intent) -> Self {
        match intent {
            Intent::RootCause(_) => Focus::RootCause,
            Intent::Solution(_) => Focus::Solution,
            Intent::ListAll => Focus::List,
            Intent::ServiceFilter(_) => Focus::Service,
            Intent::General(_) => Focus::General,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Focus::RootCause => "root_cause",
            Focus::Solution => "solution",
            Focus::List => "list",
            Focus::Service => "service",
            Focus::General => "general",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "root_cause" => Some(Focus::RootCause),
            "solution" => Some(Focus::Solution),
            "list" => Some(Focus::List),
            "service" => Some(Focus::Service),
            "general" => Some(Focus::General),
            _ => None,
        }
    }

    fn instruction(&self) -> &'static str {
        match self {
            Focus::RootCause => {
                "Explain the root cause of the defect: what failed, why it failed and \
                 which evidence in the record supports it."
            }
            Focus::Solution => {
                "Describe the solution for the defect: the fix that was applied or \
                 recommended and how to verify it."
            }
            Focus::List => "Give an overview of every defect listed, one line each.",
            Focus::Service => {
                "Summarize the defects affecting this service and any pattern they share."
            }
            Focus::General => {
                "Answer the question using the most relevant records. Mention issue keys \
                 when you refer to a record."
            }
        }
    }
}

/// Builds the grounded prompt for one question
#[derive(Debug, Clone, Default)]
pub struct PromptBuilder {
    issue_base_url: Option<String>,
}

impl PromptBuilder {
    pub fn new(issue_base_url: Option<String>) -> Self {
        Self {
            issue_base_url: issue_base_url.map(|u| u.trim_end_matches('/').to_string()),
        }
    }

    /// Link to a record in the issue tracker, if one is known
    pub fn issue_link(&self, key: &str, url: Option<&str>) -> Option<String> {
        url.map(str::to_string)
            .or_else(|| self.issue_base_url.as_ref().map(|base| format!("{}/{}", base, key)))
    }

    pub fn build(
        &self,
        question: &str,
        intent: &Intent,
        candidates: &[Candidate],
        history: &[Turn],
    ) -> String {
        let focus = Focus::for_intent(intent);
        let mut prompt = String::new();

        let _ = writeln!(prompt, "{}\n", PERSONA);
        let _ = writeln!(prompt, "{} {}", FOCUS_PREFIX, focus.as_str());
        if let Intent::ServiceFilter(service) = intent {
            let _ = writeln!(prompt, "SERVICE: {}", service);
        }
        let _ = writeln!(prompt, "{} {}\n", QUESTION_PREFIX, single_line(question));

        if !history.is_empty() {
            let _ = writeln!(prompt, "CONVERSATION SO FAR:");
            for turn in history {
                match &turn.subject {
                    Some(subject) => {
                        let _ = writeln!(
                            prompt,
                            "- User asked \"{}\" (about {})",
                            single_line(&turn.query),
                            subject
                        );
                    }
                    None => {
                        let _ = writeln!(prompt, "- User asked \"{}\"", single_line(&turn.query));
                    }
                }
            }
            prompt.push('\n');
        }

        let _ = writeln!(prompt, "DEFECT RECORDS:");
        for candidate in candidates {
            self.write_record(&mut prompt, candidate);
        }
        prompt.push('\n');

        let _ = writeln!(prompt, "INSTRUCTIONS:\n{}", focus.instruction());
        let _ = writeln!(
            prompt,
            "Reply in exactly this layout:\n\
             {}\n\
             <direct answer to the question, ending with a line \"Summary: <one sentence>\">\n\
             {}<ISSUE-KEY>:\n\
             <analysis of that record>\n\
             Write one {}block for each record you discuss and use only the issue keys listed above.",
            MESSAGE_HEADER,
            RESULT_HEADER,
            RESULT_HEADER
        );

        prompt
    }

    fn write_record(&self, prompt: &mut String, candidate: &Candidate) {
        let record = &candidate.record;
        let _ = writeln!(prompt, "{}{}", RECORD_START, record.key);

        let mut field = |name: &str, value: Option<&str>| {
            if let Some(value) = value.map(single_line).filter(|v| !v.is_empty()) {
                let _ = writeln!(prompt, "{}: {}", name, value);
            }
        };
        field(FIELD_SUMMARY, Some(record.summary.as_str()));
        field(FIELD_SERVICE, Some(record.service.as_str()));
        field(FIELD_DESCRIPTION, Some(record.description.as_str()));
        field(FIELD_ROOT_CAUSE, record.root_cause.as_deref());
        field(FIELD_SOLUTION, record.solution.as_deref());
        field(FIELD_OWNER, record.owner());
        field(FIELD_LOGS, record.logs());
        let link = self.issue_link(&record.key, record.url());
        field(FIELD_LINK, link.as_deref());

        let _ = writeln!(prompt, "{}", RECORD_END);
    }
}

/// Collapse all whitespace, newlines included, to single spaces
pub fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::DefectRecord;
    use chrono::Utc;

    fn candidate() -> Candidate {
        Candidate {
            record: DefectRecord::new("SCRUM-7", "Kafka consumer stalls")
                .with_service("kafka")
                .with_description("Consumers stop\npolling after an hour")
                .with_root_cause("connection pool exhaustion")
                .with_metadata("owner", "dana"),
            similarity: 1.0,
        }
    }

    #[test]
    fn test_prompt_contains_grounding() {
        let builder = PromptBuilder::new(Some("https://jira.example.com/browse/".into()));
        let prompt = builder.build(
            "what is the root cause of SCRUM-7",
            &Intent::RootCause("SCRUM-7".into()),
            &[candidate()],
            &[],
        );

        assert!(prompt.contains("FOCUS: root_cause"));
        assert!(prompt.contains("RECORD SCRUM-7\n"));
        assert!(prompt.contains("Root cause: connection pool exhaustion"));
        assert!(prompt.contains("Description: Consumers stop polling after an hour"));
        assert!(prompt.contains("Owner: dana"));
        assert!(prompt.contains("Link: https://jira.example.com/browse/SCRUM-7"));
        assert!(!prompt.contains("Solution:"));
        assert!(!prompt.contains("CONVERSATION SO FAR"));
    }

    #[test]
    fn test_prompt_includes_history() {
        let history = vec![Turn {
            query: "root cause of SCRUM-7".into(),
            intent: Intent::RootCause("SCRUM-7".into()),
            subject: Some("SCRUM-7".into()),
            at: Utc::now(),
        }];
        let prompt = PromptBuilder::default().build(
            "show its solution",
            &Intent::General("show its solution".into()),
            &[candidate()],
            &history,
        );
        assert!(prompt.contains("CONVERSATION SO FAR:"));
        assert!(prompt.contains("(about SCRUM-7)"));
        assert!(prompt.contains("FOCUS: general"));
    }

    #[test]
    fn test_service_line() {
        let prompt = PromptBuilder::default().build(
            "kafka issues",
            &Intent::ServiceFilter("kafka".into()),
            &[candidate()],
            &[],
        );
        assert!(prompt.contains("SERVICE: kafka"));
    }
}

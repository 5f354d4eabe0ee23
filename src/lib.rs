//! Bugbuster - Defect Q&A assistant
//!
//! Imports defect records, indexes them semantically and answers questions
//! about root causes, solutions and affected services with answers grounded
//! in the retrieved records.

pub mod cli;
pub mod compose;
pub mod config;
pub mod conversation;
pub mod embedding;
pub mod error;
pub mod intent;
pub mod llm;
pub mod pipeline;
pub mod records;
pub mod retrieval;
pub mod server;
pub mod storage;

pub use compose::{AnalysisResult, ContentType, ScoredMatch};
pub use error::{BugbusterError, Result};
pub use intent::{Intent, IntentClassifier};
pub use pipeline::{refresh_index, DefectAssistant, RefreshStats};
pub use records::{DefectCorpus, DefectRecord};
pub use retrieval::Query;

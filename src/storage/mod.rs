//! Storage layer for Bugbuster
//!
//! Imported defect records and their cached embeddings live in one SQLite
//! database behind an r2d2 pool.

pub mod database;
mod defects;

pub use database::{Database, DbPool, DbStats};
pub use defects::{DefectStore, ImportStats};

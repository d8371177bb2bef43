//! # Retrieval
//!
//! Keyword-based question answering. No index is kept: every question scans
//! the knowledge base, the supplied context and then the saved records.

pub mod engine;
pub mod keywords;
pub mod knowledge_base;

pub use engine::{Answer, RetrievalEngine};
pub use knowledge_base::SUPPORTED_QUERIES;

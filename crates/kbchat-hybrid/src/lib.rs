//! kbchat-hybrid
//!
//! Hybrid (keyword + vector) retrieval against the knowledge index, with the
//! noise filters, keyword-only fallback and quality gate that decide whether
//! generation may run at all.

pub mod azure;
pub mod quality;
pub mod retrieval;

pub use azure::AzureSearchIndex;
pub use quality::{is_search_quality_good, search_quality, UsableHits};
pub use retrieval::{index_from_settings, Retrieval, RetrievalOrchestrator, RetrievalTimeouts};

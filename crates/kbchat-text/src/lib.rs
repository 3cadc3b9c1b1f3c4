//! kbchat-text
//!
//! Tantivy-backed keyword index over chunked `.txt` documents. It stands in for
//! the managed hybrid index during development and offline runs: the vector
//! component of a query is ignored and BM25 provides the relevance score.

pub mod schema;
pub mod index;

pub use index::LocalIndex;

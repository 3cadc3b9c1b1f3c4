//! Capability seams for the external collaborators.
//!
//! Every remote service the pipeline talks to sits behind one of these traits so
//! the orchestration can be exercised against scripted doubles.

use async_trait::async_trait;

use crate::types::{Completion, GenerationParams, GroundedMessage, SearchQuery, SearchResponse, TelemetryEvent};

#[async_trait]
pub trait Translator: Send + Sync {
    async fn detect(&self, text: &str) -> anyhow::Result<String>;
    async fn translate(&self, text: &str, from: &str, to: &str) -> anyhow::Result<String>;
}

#[async_trait]
pub trait Embedder: Send + Sync {
    fn dim(&self) -> usize;
    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>>;
}

#[async_trait]
pub trait KnowledgeIndex: Send + Sync {
    async fn search(&self, query: &SearchQuery) -> anyhow::Result<SearchResponse>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMode {
    Buffered,
    Streamed,
}

#[async_trait]
pub trait Generator: Send + Sync {
    async fn complete(
        &self,
        messages: &[GroundedMessage],
        params: &GenerationParams,
        mode: ResponseMode,
    ) -> anyhow::Result<Completion>;
}

/// Fire-and-forget destination for per-request telemetry.
///
/// Implementations must return promptly and swallow their own failures.
pub trait TelemetrySink: Send + Sync {
    fn record(&self, event: &TelemetryEvent);
}

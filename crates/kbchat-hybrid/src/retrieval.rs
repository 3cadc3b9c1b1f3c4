use std::sync::Arc;
use std::time::Duration;

use kbchat_core::config::{RetrievalSettings, SearchBackend, SearchSettings};
use kbchat_core::deadline::{bounded, CancelSignal};
use kbchat_core::error::Error;
use kbchat_core::traits::{Embedder, KnowledgeIndex};
use kbchat_core::types::{SearchHit, SearchQuality, SearchQuery, SearchResponse};
use kbchat_text::LocalIndex;

use crate::azure::AzureSearchIndex;
use crate::quality::{search_quality, UsableHits};

#[derive(Debug, Clone, Copy)]
pub struct RetrievalTimeouts {
    pub embedding: Duration,
    pub search: Duration,
}

impl Default for RetrievalTimeouts {
    fn default() -> Self { Self { embedding: Duration::from_secs(5), search: Duration::from_secs(8) } }
}

/// Outcome of one retrieval pass.
#[derive(Debug, Clone)]
pub struct Retrieval {
    pub response: SearchResponse,
    pub quality: SearchQuality,
    pub used_fallback: bool,
    pub used_vector: bool,
}

impl Retrieval {
    /// Hand the hits to prompt construction, or `None` when nothing survived.
    pub fn into_usable(self) -> Option<UsableHits> { UsableHits::new(self.response.hits) }
}

pub struct RetrievalOrchestrator {
    index: Arc<dyn KnowledgeIndex>,
    embedder: Arc<dyn Embedder>,
    settings: RetrievalSettings,
    timeouts: RetrievalTimeouts,
}

impl RetrievalOrchestrator {
    pub fn new(
        index: Arc<dyn KnowledgeIndex>,
        embedder: Arc<dyn Embedder>,
        settings: RetrievalSettings,
        timeouts: RetrievalTimeouts,
    ) -> Self {
        Self { index, embedder, settings, timeouts }
    }

    /// Hybrid search with keyword-only fallback.
    ///
    /// Collaborator failures never surface: a failed embedding drops the vector
    /// half, a failed primary query counts as empty, a failed fallback yields
    /// no hits. Only cancellation is reported to the caller.
    pub async fn retrieve(&self, query: &str, k: usize, cancel: &CancelSignal) -> Result<Retrieval, Error> {
        let vector = match bounded("embedding", self.timeouts.embedding, cancel, self.embedder.embed(query)).await {
            Ok(v) => Some(v),
            Err(Error::Cancelled(stage)) => return Err(Error::Cancelled(stage)),
            Err(e) => {
                tracing::warn!(error = %e, "embedding failed; issuing lexical-only query");
                None
            }
        };
        let used_vector = vector.is_some();

        let primary = SearchQuery::hybrid(query, vector, k);
        let primary = match bounded("search", self.timeouts.search, cancel, self.index.search(&primary)).await {
            Ok(resp) => resp,
            Err(Error::Cancelled(stage)) => return Err(Error::Cancelled(stage)),
            Err(e) => {
                tracing::warn!(error = %e, "primary search failed");
                SearchResponse::empty()
            }
        };
        let raw_primary = primary.hits.len();
        let response = SearchResponse {
            hits: self.filter_primary(primary.hits),
            total_count: primary.total_count,
        };

        if !response.hits.is_empty() {
            tracing::debug!(raw = raw_primary, kept = response.hits.len(), used_vector, "primary retrieval");
            let quality = search_quality(&response.hits, &self.settings);
            return Ok(Retrieval { response, quality, used_fallback: false, used_vector });
        }

        tracing::info!(raw = raw_primary, "no usable primary hits; falling back to keyword search");
        let fallback = SearchQuery::keyword(query, k);
        let fallback = match bounded("search", self.timeouts.search, cancel, self.index.search(&fallback)).await {
            Ok(resp) => resp,
            Err(Error::Cancelled(stage)) => return Err(Error::Cancelled(stage)),
            Err(e) => {
                tracing::warn!(error = %e, "fallback search failed");
                SearchResponse::empty()
            }
        };
        let response = SearchResponse {
            hits: self.filter_fallback(fallback.hits),
            total_count: fallback.total_count,
        };
        let quality = search_quality(&response.hits, &self.settings);
        Ok(Retrieval { response, quality, used_fallback: true, used_vector })
    }

    fn filter_primary(&self, hits: Vec<SearchHit>) -> Vec<SearchHit> {
        hits.into_iter()
            .filter(|h| h.score > self.settings.min_hit_score && h.content.trim().chars().count() > self.settings.min_hit_chars)
            .collect()
    }

    fn filter_fallback(&self, hits: Vec<SearchHit>) -> Vec<SearchHit> {
        hits.into_iter()
            .filter(|h| h.content.trim().chars().count() > self.settings.fallback_min_chars)
            .collect()
    }
}

/// Build the knowledge index selected by configuration.
pub fn index_from_settings(client: reqwest::Client, settings: &SearchSettings) -> anyhow::Result<Arc<dyn KnowledgeIndex>> {
    match settings.backend {
        SearchBackend::Azure => {
            let target = settings.azure()?;
            tracing::info!(index = %target.index, "using Azure AI Search");
            Ok(Arc::new(AzureSearchIndex::new(client, target)))
        }
        SearchBackend::Local => {
            let dir = settings.local_dir()?;
            tracing::info!(dir = %dir.display(), "using local keyword index");
            Ok(Arc::new(LocalIndex::open(&dir)?))
        }
    }
}

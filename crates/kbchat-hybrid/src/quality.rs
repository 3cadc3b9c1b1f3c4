use kbchat_core::config::RetrievalSettings;
use kbchat_core::types::{SearchHit, SearchQuality};

/// A hit list that is guaranteed non-empty.
///
/// Prompt construction only accepts this type, so an empty retrieval can never
/// reach the generation collaborator.
#[derive(Debug, Clone, PartialEq)]
pub struct UsableHits(Vec<SearchHit>);

impl UsableHits {
    pub fn new(hits: Vec<SearchHit>) -> Option<Self> {
        if hits.is_empty() { None } else { Some(Self(hits)) }
    }

    pub fn as_slice(&self) -> &[SearchHit] { &self.0 }

    pub fn filenames(&self) -> Vec<String> { self.0.iter().map(|h| h.filename.clone()).collect() }
}

/// Whether the passages are strong enough to ground an answer.
///
/// Needs at least one hit, a top score above `quality_min_top_score`, and more
/// than `quality_min_total_chars` characters of content overall.
pub fn is_search_quality_good(hits: &[SearchHit], settings: &RetrievalSettings) -> bool {
    let Some(top) = hits.first() else { return false };
    if top.score <= settings.quality_min_top_score { return false; }
    let total_chars: usize = hits.iter().map(|h| h.content.chars().count()).sum();
    total_chars > settings.quality_min_total_chars
}

pub fn search_quality(hits: &[SearchHit], settings: &RetrievalSettings) -> SearchQuality {
    SearchQuality {
        total_hits: hits.len(),
        top_score: hits.first().map_or(0.0, |h| h.score),
        has_good_quality: is_search_quality_good(hits, settings),
    }
}

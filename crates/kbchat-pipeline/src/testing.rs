//! Scripted collaborators with call counters.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use kbchat_core::config::Settings;
use kbchat_core::traits::{Embedder, Generator, KnowledgeIndex, ResponseMode, Translator};
use kbchat_core::types::{Completion, GenerationParams, GroundedMessage, QueryMode, SearchHit, SearchQuery, SearchResponse};

use crate::pipeline::{Collaborators, Pipeline};
use crate::telemetry::MemorySink;

fn bump(counter: &AtomicUsize) { counter.fetch_add(1, Ordering::SeqCst); }

/// Detects a fixed language and "translates" by tagging the text with the
/// language pair, e.g. `[af->en] text`.
#[derive(Default)]
pub struct ScriptedTranslator {
    language: Option<String>,
    inbound_fails: bool,
    outbound_fails: bool,
    detects: AtomicUsize,
    translations: AtomicUsize,
}

impl ScriptedTranslator {
    pub fn detecting(language: &str) -> Self { Self { language: Some(language.to_string()), ..Self::default() } }

    /// Every call fails.
    pub fn failing() -> Self { Self { language: None, inbound_fails: true, outbound_fails: true, ..Self::default() } }

    /// Detection and inbound translation work, translating back to the user fails.
    pub fn failing_outbound(language: &str) -> Self { Self { outbound_fails: true, ..Self::detecting(language) } }

    pub fn failing_inbound(language: &str) -> Self { Self { inbound_fails: true, ..Self::detecting(language) } }

    pub fn detect_calls(&self) -> usize { self.detects.load(Ordering::SeqCst) }
    pub fn translate_calls(&self) -> usize { self.translations.load(Ordering::SeqCst) }
}

#[async_trait]
impl Translator for ScriptedTranslator {
    async fn detect(&self, _text: &str) -> Result<String> {
        bump(&self.detects);
        self.language.clone().ok_or_else(|| anyhow!("translator unavailable"))
    }

    async fn translate(&self, text: &str, from: &str, to: &str) -> Result<String> {
        bump(&self.translations);
        let outbound = from.eq_ignore_ascii_case("en");
        if (outbound && self.outbound_fails) || (!outbound && self.inbound_fails) {
            return Err(anyhow!("translator unavailable"));
        }
        Ok(format!("[{from}->{to}] {text}"))
    }
}

#[derive(Default)]
pub struct ScriptedEmbedder {
    fails: bool,
    calls: AtomicUsize,
}

impl ScriptedEmbedder {
    pub fn failing() -> Self { Self { fails: true, ..Self::default() } }
    pub fn calls(&self) -> usize { self.calls.load(Ordering::SeqCst) }
}

#[async_trait]
impl Embedder for ScriptedEmbedder {
    fn dim(&self) -> usize { 4 }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        bump(&self.calls);
        if self.fails { Err(anyhow!("embedding unavailable")) } else { Ok(vec![0.5; 4]) }
    }
}

/// Answers hybrid and keyword queries from fixed hit lists.
#[derive(Default)]
pub struct ScriptedIndex {
    hybrid: Vec<SearchHit>,
    keyword: Vec<SearchHit>,
    fails: bool,
    queries: Mutex<Vec<SearchQuery>>,
}

impl ScriptedIndex {
    pub fn with_hits(hybrid: Vec<SearchHit>) -> Self { Self { hybrid, ..Self::default() } }
    pub fn with_fallback_hits(keyword: Vec<SearchHit>) -> Self { Self { keyword, ..Self::default() } }
    pub fn empty() -> Self { Self::default() }
    pub fn failing() -> Self { Self { fails: true, ..Self::default() } }

    pub fn queries(&self) -> Vec<SearchQuery> { self.queries.lock().map(|q| q.clone()).unwrap_or_default() }
    pub fn calls(&self) -> usize { self.queries().len() }
}

#[async_trait]
impl KnowledgeIndex for ScriptedIndex {
    async fn search(&self, query: &SearchQuery) -> Result<SearchResponse> {
        if let Ok(mut seen) = self.queries.lock() {
            seen.push(query.clone());
        }
        if self.fails {
            return Err(anyhow!("search unavailable"));
        }
        let hits = match query.mode {
            QueryMode::Hybrid => self.hybrid.clone(),
            QueryMode::KeywordOnly => self.keyword.clone(),
        };
        let total_count = hits.len();
        Ok(SearchResponse { hits, total_count })
    }
}

#[derive(Default)]
pub struct ScriptedGenerator {
    reply: Option<String>,
    stalls: bool,
    calls: AtomicUsize,
    last: Mutex<Option<(Vec<GroundedMessage>, GenerationParams, ResponseMode)>>,
}

impl ScriptedGenerator {
    pub fn replying(text: &str) -> Self { Self { reply: Some(text.to_string()), ..Self::default() } }
    pub fn failing() -> Self { Self::default() }
    /// Never answers; only a timeout or cancellation ends the call.
    pub fn stalled() -> Self { Self { stalls: true, ..Self::default() } }

    pub fn calls(&self) -> usize { self.calls.load(Ordering::SeqCst) }

    pub fn last_request(&self) -> Option<(Vec<GroundedMessage>, GenerationParams, ResponseMode)> {
        self.last.lock().ok().and_then(|l| l.clone())
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn complete(&self, messages: &[GroundedMessage], params: &GenerationParams, mode: ResponseMode) -> Result<Completion> {
        bump(&self.calls);
        if let Ok(mut last) = self.last.lock() {
            *last = Some((messages.to_vec(), *params, mode));
        }
        if self.stalls {
            std::future::pending::<()>().await;
        }
        self.reply
            .clone()
            .map(|text| Completion { text, usage: None })
            .ok_or_else(|| anyhow!("generation unavailable"))
    }
}

pub fn hit(filename: &str, score: f32, content: &str) -> SearchHit {
    SearchHit { content: content.to_string(), filename: filename.to_string(), score, path: None }
}

/// A full set of scripted collaborators plus an in-memory telemetry sink.
pub struct Harness {
    pub translator: Arc<ScriptedTranslator>,
    pub embedder: Arc<ScriptedEmbedder>,
    pub index: Arc<ScriptedIndex>,
    pub generator: Arc<ScriptedGenerator>,
    pub telemetry: Arc<MemorySink>,
}

impl Harness {
    pub fn new(translator: ScriptedTranslator, index: ScriptedIndex, generator: ScriptedGenerator) -> Self {
        Self {
            translator: Arc::new(translator),
            embedder: Arc::new(ScriptedEmbedder::default()),
            index: Arc::new(index),
            generator: Arc::new(generator),
            telemetry: Arc::new(MemorySink::default()),
        }
    }

    #[must_use]
    pub fn with_embedder(mut self, embedder: ScriptedEmbedder) -> Self {
        self.embedder = Arc::new(embedder);
        self
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            translator: self.translator.clone(),
            embedder: self.embedder.clone(),
            index: self.index.clone(),
            generator: self.generator.clone(),
            telemetry: self.telemetry.clone(),
        }
    }

    pub fn pipeline(&self, settings: &Settings) -> kbchat_core::error::Result<Pipeline> {
        Pipeline::new(self.collaborators(), settings)
    }

    /// Calls made to any remote collaborator.
    pub fn collaborator_calls(&self) -> usize {
        self.translator.detect_calls()
            + self.translator.translate_calls()
            + self.embedder.calls()
            + self.index.calls()
            + self.generator.calls()
    }
}

//! The staged request pipeline.
//!
//! Each stage either hands its result to the next one ([`Flow::Continue`]) or
//! finishes the turn with a reply ([`Flow::ShortCircuit`]). Whatever happens,
//! [`Pipeline::handle`] records exactly one telemetry event per request.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use kbchat_core::config::{PipelineSettings, Settings};
use kbchat_core::deadline::CancelSignal;
use kbchat_core::error::Result;
use kbchat_core::traits::{Embedder, Generator, KnowledgeIndex, ResponseMode, TelemetrySink, Translator};
use kbchat_core::types::{ChatRequest, Intent, IntentLabel, SearchQuality, TelemetryEvent, PIVOT_LANGUAGE};
use kbchat_embed::embedder_from_settings;
use kbchat_hybrid::{index_from_settings, RetrievalOrchestrator, RetrievalTimeouts, UsableHits};

use crate::generation::{AnswerSynthesizer, AzureChatGenerator};
use crate::guard::IntentGuard;
use crate::language::{LanguageNormalizer, ResponseLocalizer};
use crate::prompt::{format_citations, no_information, Citation, GroundedPrompt, REFUSAL};
use crate::telemetry::{sink_from_settings, TelemetryGuard};
use crate::translator::translator_from_settings;

/// Everything the pipeline talks to.
pub struct Collaborators {
    pub translator: Arc<dyn Translator>,
    pub embedder: Arc<dyn Embedder>,
    pub index: Arc<dyn KnowledgeIndex>,
    pub generator: Arc<dyn Generator>,
    pub telemetry: Arc<dyn TelemetrySink>,
}

impl Collaborators {
    /// Clients for the configured backends, sharing one HTTP connection pool.
    ///
    /// Spawns the telemetry writer when a JSON-lines file is configured, so it
    /// must run inside a Tokio runtime. Shut the returned guard down before exit.
    pub fn from_settings(settings: &Settings) -> anyhow::Result<(Self, TelemetryGuard)> {
        let client = reqwest::Client::builder().connect_timeout(Duration::from_secs(5)).build()?;
        let (telemetry, guard) = sink_from_settings(&settings.telemetry);
        let collaborators = Self {
            translator: translator_from_settings(client.clone(), &settings.translator)?,
            embedder: embedder_from_settings(client.clone(), &settings.embedding, &settings.generation)?,
            index: index_from_settings(client.clone(), &settings.search)?,
            generator: Arc::new(AzureChatGenerator::new(client, settings.generation.azure()?)),
            telemetry,
        };
        Ok((collaborators, guard))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IntentView {
    pub label: IntentLabel,
    pub confidence: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatReply {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citations: Option<Vec<Citation>>,
    pub refused: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<IntentView>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

pub enum Flow<T> {
    Continue(T),
    ShortCircuit(ChatReply),
}

/// Facts gathered about one request for its telemetry event.
pub struct Turn<'a> {
    request: &'a ChatRequest,
    started: Instant,
    language: String,
    intent: Option<Intent>,
    unsafe_content: bool,
    documents: Vec<String>,
    quality: SearchQuality,
    used_fallback: bool,
}

impl<'a> Turn<'a> {
    pub fn new(request: &'a ChatRequest) -> Self {
        let language = if request.wants_detection() { PIVOT_LANGUAGE.to_string() } else { request.language_hint().to_string() };
        Self {
            request,
            started: Instant::now(),
            language,
            intent: None,
            unsafe_content: false,
            documents: Vec::new(),
            quality: SearchQuality::default(),
            used_fallback: false,
        }
    }

    pub fn language(&self) -> &str { &self.language }
    pub fn intent(&self) -> Option<&Intent> { self.intent.as_ref() }
    pub fn is_unsafe(&self) -> bool { self.unsafe_content }

    fn reply(&self, text: impl Into<String>, refused: bool, citations: Option<Vec<Citation>>) -> ChatReply {
        ChatReply {
            text: text.into(),
            citations,
            refused,
            intent: self.intent.as_ref().map(|i| IntentView { label: i.label, confidence: i.confidence }),
            session_id: self.request.session_id().map(str::to_string),
        }
    }

    fn event(&self, outcome: &Result<ChatReply>) -> TelemetryEvent {
        let (refused, response_length, error) = match outcome {
            Ok(reply) => (reply.refused, reply.text.chars().count(), None),
            Err(err) => (true, 0, Some(err.to_string())),
        };
        TelemetryEvent {
            timestamp: chrono::Utc::now(),
            session_id: self.request.session_id().map(str::to_string),
            question: self.request.message().to_string(),
            detected_language: self.language.clone(),
            intent: self.intent.clone(),
            refused,
            unsafe_content: self.unsafe_content,
            documents_used: self.documents.clone(),
            response_length,
            search_quality: self.quality,
            used_fallback: self.used_fallback,
            processing_time_ms: u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX),
            error,
            channel: self.request.channel().map(str::to_string),
        }
    }
}

pub struct Pipeline {
    normalizer: LanguageNormalizer,
    guard: IntentGuard,
    retrieval: RetrievalOrchestrator,
    synthesizer: AnswerSynthesizer,
    localizer: ResponseLocalizer,
    telemetry: Arc<dyn TelemetrySink>,
    policy: PipelineSettings,
    top_k: usize,
}

impl Pipeline {
    pub fn new(collaborators: Collaborators, settings: &Settings) -> Result<Self> {
        let Collaborators { translator, embedder, index, generator, telemetry } = collaborators;
        let mode = if settings.generation.stream { ResponseMode::Streamed } else { ResponseMode::Buffered };
        let timeouts = RetrievalTimeouts { embedding: settings.embedding.timeout(), search: settings.search.timeout() };
        Ok(Self {
            normalizer: LanguageNormalizer::new(
                translator.clone(),
                settings.translator.timeout(),
                settings.pipeline.inbound_translation,
            ),
            guard: IntentGuard::standard()?,
            retrieval: RetrievalOrchestrator::new(index, embedder, settings.retrieval, timeouts),
            synthesizer: AnswerSynthesizer::new(generator, settings.generation.params(), mode, settings.generation.timeout()),
            localizer: ResponseLocalizer::new(translator, settings.translator.timeout()),
            telemetry,
            policy: settings.pipeline,
            top_k: settings.retrieval.top_k,
        })
    }

    /// Answer one request. Exactly one telemetry event is recorded, whether the
    /// turn succeeds, short-circuits, fails or is cancelled.
    pub async fn handle(&self, request: &ChatRequest, cancel: &CancelSignal) -> Result<ChatReply> {
        let mut turn = Turn::new(request);
        let outcome = self.run(&mut turn, cancel).await;
        match &outcome {
            Ok(reply) => tracing::debug!(refused = reply.refused, language = %turn.language, "chat turn answered"),
            Err(err) => tracing::error!(error = %err, "chat turn failed"),
        }
        self.telemetry.record(&turn.event(&outcome));
        outcome
    }

    async fn run(&self, turn: &mut Turn<'_>, cancel: &CancelSignal) -> Result<ChatReply> {
        let text = self.normalize(turn, cancel).await?;
        let intent = match self.screen(turn, &text) {
            Flow::Continue(intent) => intent,
            Flow::ShortCircuit(reply) => return Ok(reply),
        };
        let hits = match self.ground(turn, &text, &intent, cancel).await? {
            Flow::Continue(hits) => hits,
            Flow::ShortCircuit(reply) => return Ok(reply),
        };
        self.answer(turn, &text, &hits, cancel).await
    }

    /// Detect the language and return the pivot-language text.
    pub async fn normalize(&self, turn: &mut Turn<'_>, cancel: &CancelSignal) -> Result<String> {
        turn.language = self.normalizer.detect(turn.request, cancel).await?;
        self.normalizer.to_pivot(turn.request.message(), &turn.language, cancel).await
    }

    /// Classify scope and refuse or clarify when the turn cannot be answered.
    pub fn screen(&self, turn: &mut Turn<'_>, text: &str) -> Flow<Intent> {
        let intent = self.guard.classify(text);
        turn.unsafe_content = self.guard.is_unsafe(text);
        turn.intent = Some(intent.clone());
        if turn.unsafe_content {
            tracing::warn!(label = %intent.label, session_id = turn.request.session_id().unwrap_or(""), "unsafe content flagged");
        }
        match intent.label {
            IntentLabel::Out => Flow::ShortCircuit(turn.reply(REFUSAL, true, None)),
            IntentLabel::Ambiguous => Flow::ShortCircuit(turn.reply(self.guard.clarifier(), true, None)),
            IntentLabel::In if turn.unsafe_content && self.policy.refuse_unsafe => {
                Flow::ShortCircuit(turn.reply(REFUSAL, true, None))
            }
            IntentLabel::In => Flow::Continue(intent),
        }
    }

    /// Retrieve grounding passages; without any, reply with the no-information text.
    pub async fn ground(&self, turn: &mut Turn<'_>, text: &str, intent: &Intent, cancel: &CancelSignal) -> Result<Flow<UsableHits>> {
        let retrieval = self.retrieval.retrieve(text, self.top_k, cancel).await?;
        turn.quality = retrieval.quality;
        turn.used_fallback = retrieval.used_fallback;
        let Some(hits) = retrieval.into_usable() else {
            tracing::info!(used_fallback = turn.used_fallback, "no grounding passages found");
            return Ok(Flow::ShortCircuit(turn.reply(no_information(intent.label), false, None)));
        };
        if !turn.quality.has_good_quality {
            tracing::info!(top_score = turn.quality.top_score, hits = turn.quality.total_hits, "answering from weak grounding");
        }
        turn.documents = hits.filenames();
        Ok(Flow::Continue(hits))
    }

    /// Generate the grounded answer and translate it back to the user.
    pub async fn answer(&self, turn: &Turn<'_>, text: &str, hits: &UsableHits, cancel: &CancelSignal) -> Result<ChatReply> {
        let prompt = GroundedPrompt::build(hits, text);
        let completion = self.synthesizer.synthesize(&prompt, cancel).await?;
        let localized = self.localizer.localize(completion.text, &turn.language, cancel).await?;
        Ok(turn.reply(localized, false, Some(format_citations(hits.as_slice()))))
    }
}

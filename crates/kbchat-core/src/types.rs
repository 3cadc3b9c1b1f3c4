//! Domain types shared by the retrieval, guard and generation stages.

use serde::{Deserialize, Serialize};

/// The canonical language every request is normalized to before classification.
pub const PIVOT_LANGUAGE: &str = "en";

/// Language hint value that asks the pipeline to detect the language itself.
pub const AUTO_LANGUAGE: &str = "auto";

/// A validated inbound question.
///
/// Built only through [`ChatRequest::new`], which rejects empty and
/// whitespace-only messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRequest {
    message: String,
    language_hint: String,
    session_id: Option<String>,
    channel: Option<String>,
}

impl ChatRequest {
    pub fn new(message: impl Into<String>) -> Result<Self, crate::error::Error> {
        let message = message.into();
        if message.trim().is_empty() {
            return Err(crate::error::Error::Validation(
                "Message is required and must be a string".to_string(),
            ));
        }
        Ok(Self { message, language_hint: AUTO_LANGUAGE.to_string(), session_id: None, channel: None })
    }

    #[must_use]
    pub fn with_language_hint(mut self, hint: Option<String>) -> Self {
        if let Some(hint) = hint.filter(|h| !h.trim().is_empty()) {
            self.language_hint = hint;
        }
        self
    }

    #[must_use]
    pub fn with_session_id(mut self, session_id: Option<String>) -> Self {
        self.session_id = session_id;
        self
    }

    #[must_use]
    pub fn with_channel(mut self, channel: Option<String>) -> Self {
        self.channel = channel;
        self
    }

    pub fn message(&self) -> &str { &self.message }
    pub fn language_hint(&self) -> &str { &self.language_hint }
    pub fn session_id(&self) -> Option<&str> { self.session_id.as_deref() }
    pub fn channel(&self) -> Option<&str> { self.channel.as_deref() }

    /// True when the caller left language selection to detection.
    pub fn wants_detection(&self) -> bool { self.language_hint.eq_ignore_ascii_case(AUTO_LANGUAGE) }
}

/// Scope label assigned by the intent guard.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum IntentLabel {
    In,
    Out,
    Ambiguous,
}

impl IntentLabel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::In => "in",
            Self::Out => "out",
            Self::Ambiguous => "ambiguous",
        }
    }
}

impl std::fmt::Display for IntentLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str(self.as_str()) }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Intent {
    pub label: IntentLabel,
    pub confidence: f32,
    pub reason: String,
}

/// One passage returned by the knowledge index.
///
/// `filename` identifies the source document and is what citations point at.
/// `score` is index-specific; higher is always better.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchHit {
    pub content: String,
    pub filename: String,
    pub score: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// Hits in index order plus the index's own match count.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub hits: Vec<SearchHit>,
    pub total_count: usize,
}

impl SearchResponse {
    pub fn empty() -> Self { Self::default() }
}

/// How a knowledge-index query should be evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryMode {
    /// Full query syntax, optionally combined with a vector component.
    Hybrid,
    /// Simple keyword semantics, never a vector component.
    KeywordOnly,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    pub text: String,
    pub vector: Option<Vec<f32>>,
    pub top: usize,
    pub mode: QueryMode,
}

impl SearchQuery {
    pub fn hybrid(text: &str, vector: Option<Vec<f32>>, top: usize) -> Self {
        Self { text: text.to_string(), vector, top, mode: QueryMode::Hybrid }
    }

    pub fn keyword(text: &str, top: usize) -> Self {
        Self { text: text.to_string(), vector: None, top, mode: QueryMode::KeywordOnly }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GroundedMessage {
    pub role: Role,
    pub content: String,
}

impl GroundedMessage {
    pub fn system(content: impl Into<String>) -> Self { Self { role: Role::System, content: content.into() } }
    pub fn user(content: impl Into<String>) -> Self { Self { role: Role::User, content: content.into() } }
}

/// Sampling bounds handed to the generation collaborator with every request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GenerationParams {
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_p: f32,
    pub frequency_penalty: f32,
    pub presence_penalty: f32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self { temperature: 0.2, max_tokens: 1000, top_p: 0.9, frequency_penalty: 0.0, presence_penalty: 0.0 }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    #[serde(alias = "prompt_tokens")]
    pub prompt_tokens: u32,
    #[serde(alias = "completion_tokens")]
    pub completion_tokens: u32,
    #[serde(alias = "total_tokens")]
    pub total_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Completion {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
}

/// Summary of retrieval quality carried into telemetry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuality {
    pub total_hits: usize,
    pub top_score: f32,
    pub has_good_quality: bool,
}

/// One record per handled request, successful or not.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryEvent {
    pub timestamp: chrono::DateTime<chrono::Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub question: String,
    pub detected_language: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<Intent>,
    pub refused: bool,
    #[serde(rename = "unsafe")]
    pub unsafe_content: bool,
    pub documents_used: Vec<String>,
    pub response_length: usize,
    pub search_quality: SearchQuality,
    pub used_fallback: bool,
    pub processing_time_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
}

/// A chunk of a source document that is independently indexed.
///
/// - `id`: globally unique chunk identifier
/// - `doc_id`: stable document identity (file stem)
/// - `doc_path`: original path to the source file
/// - `filename`: file name shown in citations
/// - `content`: the text payload of the chunk
/// - `chunk_index`/`total_chunks`: position within the parent document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DocumentChunk {
    pub id: String,
    pub doc_id: String,
    pub doc_path: String,
    pub filename: String,
    pub content: String,
    pub chunk_index: usize,
    pub total_chunks: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_messages_are_rejected() {
        assert!(ChatRequest::new("").is_err());
        assert!(ChatRequest::new("  \n\t ").is_err());
        assert!(ChatRequest::new("hi").is_ok());
    }

    #[test]
    fn language_hint_defaults_to_auto() {
        let req = ChatRequest::new("hello").unwrap();
        assert!(req.wants_detection());
        let req = req.with_language_hint(Some("fr".into()));
        assert_eq!(req.language_hint(), "fr");
        assert!(!req.wants_detection());
        let blank = ChatRequest::new("hello").unwrap().with_language_hint(Some(" ".into()));
        assert!(blank.wants_detection());
    }

    #[test]
    fn telemetry_event_serializes_camel_case() {
        let ev = TelemetryEvent {
            timestamp: chrono::Utc::now(),
            session_id: Some("s1".into()),
            question: "q".into(),
            detected_language: "en".into(),
            intent: Some(Intent { label: IntentLabel::In, confidence: 0.9, reason: "Contains Discovery-related terms".into() }),
            refused: false,
            unsafe_content: false,
            documents_used: vec!["a.pdf".into()],
            response_length: 3,
            search_quality: SearchQuality { total_hits: 1, top_score: 0.5, has_good_quality: true },
            used_fallback: false,
            processing_time_ms: 12,
            error: None,
            channel: None,
        };
        let v = serde_json::to_value(&ev).unwrap();
        assert_eq!(v["sessionId"], "s1");
        assert_eq!(v["searchQuality"]["totalHits"], 1);
        assert_eq!(v["unsafe"], false);
        assert_eq!(v["intent"]["label"], "in");
        assert_eq!(v["intent"]["reason"], "Contains Discovery-related terms");
        assert!(v.get("error").is_none());
    }
}

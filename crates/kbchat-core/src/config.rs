//! Configuration loader, typed settings and path helpers.
//!
//! Uses Figment to merge `config.toml` + `config.<env>.toml`, the flat `AZURE_*`
//! variables of the reference deployment, and `APP_*` env vars (nesting with `__`).
//! The resulting [`Settings`] are validated once at startup and then shared
//! read-only by every collaborator client.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::types::GenerationParams;

/// Flat variable names accepted for compatibility with existing deployments.
const LEGACY_ENV_KEYS: &[(&str, &str)] = &[
    ("AZURE_OPENAI_ENDPOINT", "generation.endpoint"),
    ("AZURE_OPENAI_API_KEY", "generation.api_key"),
    ("AZURE_OPENAI_DEPLOYMENT", "generation.deployment"),
    ("AZURE_OPENAI_EMBEDDING", "embedding.deployment"),
    ("AZURE_SEARCH_ENDPOINT", "search.endpoint"),
    ("AZURE_SEARCH_API_KEY", "search.api_key"),
    ("AZURE_SEARCH_INDEX", "search.index"),
    ("AZURE_TRANSLATOR_KEY", "translator.key"),
    ("AZURE_TRANSLATOR_ENDPOINT", "translator.endpoint"),
    ("AZURE_TRANSLATOR_REGION", "translator.region"),
];

pub struct Config {
    figment: Figment,
    env_name: String,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::new().merge(Toml::file("config.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        for (var, key) in LEGACY_ENV_KEYS {
            figment = figment.merge(Env::raw().only(&[*var]).map(move |_| (*key).into()));
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        Ok(Self { figment, env_name })
    }

    pub fn env_name(&self) -> &str { &self.env_name }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    /// Extract and validate the full typed settings.
    pub fn settings(&self) -> Result<Settings> {
        let settings = self.settings_unchecked()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Typed settings without backend validation, for tools that only need a
    /// few sections (the indexer has no use for generation credentials).
    pub fn settings_unchecked(&self) -> Result<Settings> {
        Figment::from(Serialized::defaults(Settings::default()))
            .merge(self.figment.clone())
            .extract()
            .map_err(|e| Error::InvalidConfig(e.to_string()))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub translator: TranslatorSettings,
    pub embedding: EmbeddingSettings,
    pub search: SearchSettings,
    pub generation: GenerationSettings,
    pub retrieval: RetrievalSettings,
    pub pipeline: PipelineSettings,
    pub telemetry: TelemetrySettings,
}

impl Settings {
    /// Fail fast on any key the selected backends cannot do without.
    pub fn validate(&self) -> Result<()> {
        if matches!(self.translator.backend, TranslatorBackend::Azure) {
            self.translator.azure()?;
        }
        if matches!(self.embedding.backend, EmbeddingBackend::Azure) {
            self.embedding.azure(&self.generation)?;
        }
        match self.search.backend {
            SearchBackend::Azure => { self.search.azure()?; }
            SearchBackend::Local => { self.search.local_dir()?; }
        }
        self.generation.azure()?;
        self.retrieval.validate()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self { Self { host: "0.0.0.0".to_string(), port: 3000 } }
}

impl ServerSettings {
    pub fn bind_addr(&self) -> String { format!("{}:{}", self.host, self.port) }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TranslatorBackend {
    #[default]
    Azure,
    /// Detects nothing and translates nothing; every request is treated as pivot language.
    Passthrough,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslatorSettings {
    pub backend: TranslatorBackend,
    pub endpoint: Option<String>,
    pub key: Option<String>,
    pub region: Option<String>,
    pub timeout_ms: u64,
}

impl Default for TranslatorSettings {
    fn default() -> Self {
        Self { backend: TranslatorBackend::default(), endpoint: None, key: None, region: None, timeout_ms: 5_000 }
    }
}

/// Resolved connection details for the translation service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslatorTarget {
    pub endpoint: String,
    pub key: String,
    pub region: String,
}

impl TranslatorSettings {
    pub fn azure(&self) -> Result<TranslatorTarget> {
        Ok(TranslatorTarget {
            endpoint: trim_endpoint(required(self.endpoint.as_deref(), "translator.endpoint")?),
            key: required(self.key.as_deref(), "translator.key")?.to_string(),
            region: required(self.region.as_deref(), "translator.region")?.to_string(),
        })
    }

    pub fn timeout(&self) -> Duration { Duration::from_millis(self.timeout_ms) }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    #[default]
    Azure,
    Fake,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub backend: EmbeddingBackend,
    /// Falls back to `generation.endpoint` when unset.
    pub endpoint: Option<String>,
    /// Falls back to `generation.api_key` when unset.
    pub api_key: Option<String>,
    /// Falls back to `generation.deployment` when unset.
    pub deployment: Option<String>,
    pub api_version: String,
    pub dim: usize,
    pub timeout_ms: u64,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackend::default(),
            endpoint: None,
            api_key: None,
            deployment: None,
            api_version: "2024-02-15-preview".to_string(),
            dim: 1536,
            timeout_ms: 5_000,
        }
    }
}

/// Resolved connection details for an Azure OpenAI deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenAiTarget {
    pub endpoint: String,
    pub api_key: String,
    pub deployment: String,
    pub api_version: String,
}

impl EmbeddingSettings {
    pub fn azure(&self, generation: &GenerationSettings) -> Result<OpenAiTarget> {
        let endpoint = self.endpoint.as_deref().or(generation.endpoint.as_deref());
        let api_key = self.api_key.as_deref().or(generation.api_key.as_deref());
        let deployment = self.deployment.as_deref().or(generation.deployment.as_deref());
        Ok(OpenAiTarget {
            endpoint: trim_endpoint(required(endpoint, "embedding.endpoint")?),
            api_key: required(api_key, "embedding.api_key")?.to_string(),
            deployment: required(deployment, "embedding.deployment")?.to_string(),
            api_version: self.api_version.clone(),
        })
    }

    pub fn timeout(&self) -> Duration { Duration::from_millis(self.timeout_ms) }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SearchBackend {
    #[default]
    Azure,
    /// Tantivy index on local disk, keyword scoring only.
    Local,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    pub backend: SearchBackend,
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub index: Option<String>,
    pub api_version: String,
    pub vector_field: String,
    pub local_index_dir: Option<String>,
    pub timeout_ms: u64,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            backend: SearchBackend::default(),
            endpoint: None,
            api_key: None,
            index: None,
            api_version: "2023-11-01".to_string(),
            vector_field: "contentVector".to_string(),
            local_index_dir: None,
            timeout_ms: 8_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchTarget {
    pub endpoint: String,
    pub api_key: String,
    pub index: String,
    pub api_version: String,
    pub vector_field: String,
}

impl SearchSettings {
    pub fn azure(&self) -> Result<SearchTarget> {
        Ok(SearchTarget {
            endpoint: trim_endpoint(required(self.endpoint.as_deref(), "search.endpoint")?),
            api_key: required(self.api_key.as_deref(), "search.api_key")?.to_string(),
            index: required(self.index.as_deref(), "search.index")?.to_string(),
            api_version: self.api_version.clone(),
            vector_field: self.vector_field.clone(),
        })
    }

    pub fn local_dir(&self) -> Result<PathBuf> {
        required(self.local_index_dir.as_deref(), "search.local_index_dir").map(expand_path)
    }

    pub fn timeout(&self) -> Duration { Duration::from_millis(self.timeout_ms) }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub deployment: Option<String>,
    pub api_version: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_p: f32,
    pub frequency_penalty: f32,
    pub presence_penalty: f32,
    pub stream: bool,
    pub timeout_ms: u64,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        let params = GenerationParams::default();
        Self {
            endpoint: None,
            api_key: None,
            deployment: None,
            api_version: "2024-02-15-preview".to_string(),
            temperature: params.temperature,
            max_tokens: params.max_tokens,
            top_p: params.top_p,
            frequency_penalty: params.frequency_penalty,
            presence_penalty: params.presence_penalty,
            stream: false,
            timeout_ms: 30_000,
        }
    }
}

impl GenerationSettings {
    pub fn azure(&self) -> Result<OpenAiTarget> {
        Ok(OpenAiTarget {
            endpoint: trim_endpoint(required(self.endpoint.as_deref(), "generation.endpoint")?),
            api_key: required(self.api_key.as_deref(), "generation.api_key")?.to_string(),
            deployment: required(self.deployment.as_deref(), "generation.deployment")?.to_string(),
            api_version: self.api_version.clone(),
        })
    }

    pub fn params(&self) -> GenerationParams {
        GenerationParams {
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            top_p: self.top_p,
            frequency_penalty: self.frequency_penalty,
            presence_penalty: self.presence_penalty,
        }
    }

    pub fn timeout(&self) -> Duration { Duration::from_millis(self.timeout_ms) }
}

/// Retrieval limits and quality-gate thresholds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrievalSettings {
    pub top_k: usize,
    /// Primary hits must score strictly above this.
    pub min_hit_score: f32,
    /// Primary hits must carry more trimmed characters than this.
    pub min_hit_chars: usize,
    /// Keyword fallback hits must carry more trimmed characters than this.
    pub fallback_min_chars: usize,
    pub quality_min_top_score: f32,
    pub quality_min_total_chars: usize,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            top_k: 3,
            min_hit_score: 0.01,
            min_hit_chars: 20,
            fallback_min_chars: 50,
            quality_min_top_score: 0.05,
            quality_min_total_chars: 100,
        }
    }
}

impl RetrievalSettings {
    fn validate(&self) -> Result<()> {
        if self.top_k == 0 {
            return Err(Error::InvalidConfig("retrieval.top_k must be at least 1".to_string()));
        }
        if !(0.0..=1.0).contains(&self.min_hit_score) || !(0.0..=1.0).contains(&self.quality_min_top_score) {
            tracing::warn!(
                min_hit_score = self.min_hit_score,
                quality_min_top_score = self.quality_min_top_score,
                "retrieval score thresholds outside [0,1]; make sure they match the index scoring"
            );
        }
        Ok(())
    }
}

/// What to do when the inbound (user → pivot) translation fails.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum InboundTranslationPolicy {
    /// Abort the request with the generic apology.
    #[default]
    Fail,
    /// Continue with the untranslated text.
    Degrade,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PipelineSettings {
    pub inbound_translation: InboundTranslationPolicy,
    pub refuse_unsafe: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetrySettings {
    /// Append events as JSON lines to this file in addition to the log.
    pub jsonl_path: Option<String>,
    pub channel_capacity: usize,
}

impl Default for TelemetrySettings {
    fn default() -> Self { Self { jsonl_path: None, channel_capacity: 1024 } }
}

fn required<'a>(value: Option<&'a str>, key: &str) -> Result<&'a str> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(Error::InvalidConfig(format!("missing required key `{key}`"))),
    }
}

fn trim_endpoint(endpoint: &str) -> String { endpoint.trim_end_matches('/').to_string() }

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

//! Inbound language normalization and outbound localization.

use std::sync::Arc;
use std::time::Duration;

use kbchat_core::config::InboundTranslationPolicy;
use kbchat_core::deadline::{bounded, CancelSignal};
use kbchat_core::error::{Error, Result};
use kbchat_core::traits::Translator;
use kbchat_core::types::{ChatRequest, PIVOT_LANGUAGE};

fn is_pivot(code: &str) -> bool { code.eq_ignore_ascii_case(PIVOT_LANGUAGE) }

pub struct LanguageNormalizer {
    translator: Arc<dyn Translator>,
    timeout: Duration,
    policy: InboundTranslationPolicy,
}

impl LanguageNormalizer {
    pub fn new(translator: Arc<dyn Translator>, timeout: Duration, policy: InboundTranslationPolicy) -> Self {
        Self { translator, timeout, policy }
    }

    /// Language of the request.
    ///
    /// An explicit hint wins. Otherwise the translator is asked; any failure or
    /// empty answer resolves to the pivot language. Only cancellation is an error.
    pub async fn detect(&self, request: &ChatRequest, cancel: &CancelSignal) -> Result<String> {
        if !request.wants_detection() {
            return Ok(request.language_hint().trim().to_string());
        }
        match bounded("translation", self.timeout, cancel, self.translator.detect(request.message())).await {
            Ok(code) if !code.trim().is_empty() => Ok(code.trim().to_string()),
            Ok(_) => Ok(PIVOT_LANGUAGE.to_string()),
            Err(err @ Error::Cancelled(_)) => Err(err),
            Err(err) => {
                tracing::warn!(error = %err, "language detection failed; assuming pivot language");
                Ok(PIVOT_LANGUAGE.to_string())
            }
        }
    }

    /// Bring `text` into the pivot language. No call is made when it already is.
    pub async fn to_pivot(&self, text: &str, from: &str, cancel: &CancelSignal) -> Result<String> {
        if is_pivot(from) {
            return Ok(text.to_string());
        }
        let outcome = bounded("translation", self.timeout, cancel, self.translator.translate(text, from, PIVOT_LANGUAGE))
            .await
            .and_then(|t| {
                if t.trim().is_empty() {
                    Err(Error::Collaborator { service: "translation", message: "empty translation".to_string() })
                } else {
                    Ok(t)
                }
            });
        match outcome {
            Ok(translated) => Ok(translated),
            Err(err @ Error::Cancelled(_)) => Err(err),
            Err(err) => match self.policy {
                InboundTranslationPolicy::Fail => {
                    tracing::error!(error = %err, from, "inbound translation failed");
                    Err(err)
                }
                InboundTranslationPolicy::Degrade => {
                    tracing::warn!(error = %err, from, "inbound translation failed; continuing with original text");
                    Ok(text.to_string())
                }
            },
        }
    }
}

/// Translates the final answer back to the user's language, falling back to
/// the pivot-language answer on any translation failure.
pub struct ResponseLocalizer {
    translator: Arc<dyn Translator>,
    timeout: Duration,
}

impl ResponseLocalizer {
    pub fn new(translator: Arc<dyn Translator>, timeout: Duration) -> Self { Self { translator, timeout } }

    pub async fn localize(&self, answer: String, to: &str, cancel: &CancelSignal) -> Result<String> {
        if is_pivot(to) {
            return Ok(answer);
        }
        match bounded("translation", self.timeout, cancel, self.translator.translate(&answer, PIVOT_LANGUAGE, to)).await {
            Ok(translated) if !translated.trim().is_empty() => Ok(translated),
            Ok(_) => {
                tracing::warn!(to, "translator returned an empty answer; replying in pivot language");
                Ok(answer)
            }
            Err(err @ Error::Cancelled(_)) => Err(err),
            Err(err) => {
                tracing::warn!(error = %err, to, "answer translation failed; replying in pivot language");
                Ok(answer)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedTranslator;

    fn normalizer(t: Arc<ScriptedTranslator>, policy: InboundTranslationPolicy) -> LanguageNormalizer {
        LanguageNormalizer::new(t, Duration::from_secs(1), policy)
    }

    #[tokio::test]
    async fn explicit_hint_skips_detection() {
        let t = Arc::new(ScriptedTranslator::detecting("de"));
        let n = normalizer(t.clone(), InboundTranslationPolicy::Fail);
        let req = ChatRequest::new("Hola").unwrap().with_language_hint(Some("es".into()));
        assert_eq!(n.detect(&req, &CancelSignal::never()).await.unwrap(), "es");
        assert_eq!(t.detect_calls(), 0);
    }

    #[tokio::test]
    async fn detection_failure_defaults_to_pivot() {
        let t = Arc::new(ScriptedTranslator::failing());
        let n = normalizer(t.clone(), InboundTranslationPolicy::Fail);
        let req = ChatRequest::new("Hola").unwrap();
        assert_eq!(n.detect(&req, &CancelSignal::never()).await.unwrap(), "en");
        assert_eq!(t.detect_calls(), 1);
    }

    #[tokio::test]
    async fn pivot_input_is_not_translated() {
        let t = Arc::new(ScriptedTranslator::detecting("en"));
        let n = normalizer(t.clone(), InboundTranslationPolicy::Fail);
        assert_eq!(n.to_pivot("join vitality", "EN", &CancelSignal::never()).await.unwrap(), "join vitality");
        assert_eq!(t.translate_calls(), 0);
    }

    #[tokio::test]
    async fn inbound_failure_follows_policy() {
        let t = Arc::new(ScriptedTranslator::failing());
        let strict = normalizer(t.clone(), InboundTranslationPolicy::Fail);
        let err = strict.to_pivot("Hoe sluit ek aan", "af", &CancelSignal::never()).await.unwrap_err();
        assert!(matches!(err, Error::Collaborator { service: "translation", .. }));

        let lenient = normalizer(t, InboundTranslationPolicy::Degrade);
        let text = lenient.to_pivot("Hoe sluit ek aan", "af", &CancelSignal::never()).await.unwrap();
        assert_eq!(text, "Hoe sluit ek aan");
    }

    #[tokio::test]
    async fn outbound_failure_returns_pivot_answer() {
        let localizer = ResponseLocalizer::new(Arc::new(ScriptedTranslator::failing()), Duration::from_secs(1));
        let out = localizer.localize("Vitality rewards you.".into(), "fr", &CancelSignal::never()).await.unwrap();
        assert_eq!(out, "Vitality rewards you.");
    }

    #[tokio::test]
    async fn outbound_translation_is_applied() {
        let t = Arc::new(ScriptedTranslator::detecting("fr"));
        let localizer = ResponseLocalizer::new(t.clone(), Duration::from_secs(1));
        let out = localizer.localize("Hello".into(), "fr", &CancelSignal::never()).await.unwrap();
        assert_eq!(out, "[en->fr] Hello");
        assert_eq!(t.translate_calls(), 1);
    }
}

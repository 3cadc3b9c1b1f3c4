//! Translation collaborators.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use kbchat_core::config::{TranslatorBackend, TranslatorSettings, TranslatorTarget};
use kbchat_core::traits::Translator;
use kbchat_core::types::PIVOT_LANGUAGE;

const API_VERSION: &str = "3.0";

/// Client for the Azure Translator text API (`/detect` and `/translate`).
pub struct AzureTranslator {
    client: reqwest::Client,
    target: TranslatorTarget,
}

#[derive(Serialize)]
struct TextItem<'a> {
    #[serde(rename = "Text")]
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct Detection {
    #[serde(default)]
    language: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TranslationResult {
    #[serde(default)]
    translations: Vec<TranslatedText>,
}

#[derive(Debug, Deserialize)]
struct TranslatedText {
    text: String,
}

impl AzureTranslator {
    pub fn new(client: reqwest::Client, target: TranslatorTarget) -> Self { Self { client, target } }

    async fn post<T: serde::de::DeserializeOwned>(&self, path: &str, query: &[(&str, &str)], text: &str) -> Result<T> {
        let response = self
            .client
            .post(format!("{}/{}", self.target.endpoint, path))
            .query(query)
            .header("Ocp-Apim-Subscription-Key", &self.target.key)
            .header("Ocp-Apim-Subscription-Region", &self.target.region)
            .json(&[TextItem { text }])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Translator API error {}: {}", status, body));
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl Translator for AzureTranslator {
    async fn detect(&self, text: &str) -> Result<String> {
        let detections: Vec<Detection> = self.post("detect", &[("api-version", API_VERSION)], text).await?;
        detections
            .into_iter()
            .next()
            .and_then(|d| d.language)
            .filter(|l| !l.trim().is_empty())
            .ok_or_else(|| anyhow!("Translator returned no language"))
    }

    async fn translate(&self, text: &str, from: &str, to: &str) -> Result<String> {
        let results: Vec<TranslationResult> = self
            .post("translate", &[("api-version", API_VERSION), ("from", from), ("to", to)], text)
            .await?;
        results
            .into_iter()
            .next()
            .and_then(|r| r.translations.into_iter().next())
            .map(|t| t.text)
            .ok_or_else(|| anyhow!("Translator returned no translation"))
    }
}

/// Treats every input as pivot language and returns text untouched.
pub struct PassthroughTranslator;

#[async_trait]
impl Translator for PassthroughTranslator {
    async fn detect(&self, _text: &str) -> Result<String> { Ok(PIVOT_LANGUAGE.to_string()) }

    async fn translate(&self, text: &str, _from: &str, _to: &str) -> Result<String> { Ok(text.to_string()) }
}

pub fn translator_from_settings(client: reqwest::Client, settings: &TranslatorSettings) -> Result<Arc<dyn Translator>> {
    match settings.backend {
        TranslatorBackend::Azure => {
            let target = settings.azure()?;
            tracing::info!(region = %target.region, "using Azure Translator");
            Ok(Arc::new(AzureTranslator::new(client, target)))
        }
        TranslatorBackend::Passthrough => {
            tracing::info!("translation disabled; all requests handled as pivot language");
            Ok(Arc::new(PassthroughTranslator))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_uses_capitalised_text_key() {
        let body = serde_json::to_value([TextItem { text: "Hola" }]).unwrap();
        assert_eq!(body, serde_json::json!([{ "Text": "Hola" }]));
    }

    #[test]
    fn translation_payload_shape() {
        let parsed: Vec<TranslationResult> =
            serde_json::from_str(r#"[{"translations":[{"text":"Hello","to":"en"}]}]"#).unwrap();
        assert_eq!(parsed[0].translations[0].text, "Hello");
    }

    #[tokio::test]
    async fn passthrough_is_identity() {
        let t = PassthroughTranslator;
        assert_eq!(t.detect("Hallo").await.unwrap(), "en");
        assert_eq!(t.translate("Hallo", "de", "en").await.unwrap(), "Hallo");
    }
}

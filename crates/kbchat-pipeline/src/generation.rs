//! Chat-completion client and the answer synthesizer on top of it.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use kbchat_core::config::OpenAiTarget;
use kbchat_core::deadline::{bounded, CancelSignal};
use kbchat_core::traits::{Generator, ResponseMode};
use kbchat_core::types::{Completion, GenerationParams, GroundedMessage, TokenUsage};

use crate::prompt::GroundedPrompt;

/// Azure OpenAI `chat/completions` deployment.
pub struct AzureChatGenerator {
    client: reqwest::Client,
    target: OpenAiTarget,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    messages: &'a [GroundedMessage],
    temperature: f32,
    max_tokens: u32,
    top_p: f32,
    frequency_penalty: f32,
    presence_penalty: f32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct CompletionPayload {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<TokenUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    message: Option<ChoiceMessage>,
    #[serde(default)]
    delta: Option<ChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl AzureChatGenerator {
    pub fn new(client: reqwest::Client, target: OpenAiTarget) -> Self { Self { client, target } }

    fn url(&self) -> String {
        format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            self.target.endpoint, self.target.deployment, self.target.api_version
        )
    }
}

#[async_trait]
impl Generator for AzureChatGenerator {
    async fn complete(&self, messages: &[GroundedMessage], params: &GenerationParams, mode: ResponseMode) -> Result<Completion> {
        let body = CompletionRequest {
            messages,
            temperature: params.temperature,
            max_tokens: params.max_tokens,
            top_p: params.top_p,
            frequency_penalty: params.frequency_penalty,
            presence_penalty: params.presence_penalty,
            stream: mode == ResponseMode::Streamed,
        };
        let response = self
            .client
            .post(self.url())
            .header("api-key", &self.target.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Azure OpenAI API error {}: {}", status, body));
        }

        match mode {
            ResponseMode::Buffered => {
                let payload: CompletionPayload = response.json().await.context("malformed completion body")?;
                let text = payload
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|c| c.message)
                    .and_then(|m| m.content)
                    .unwrap_or_default();
                Ok(Completion { text, usage: payload.usage })
            }
            ResponseMode::Streamed => {
                let mut events = SseAccumulator::default();
                let mut stream = response.bytes_stream();
                while let Some(chunk) = stream.next().await {
                    events.push(&chunk?)?;
                    if events.is_done() { break; }
                }
                events.finish()
            }
        }
    }
}

/// Reassembles a server-sent-event completion stream.
///
/// Bytes are buffered until a full line is available, so events and multi-byte
/// characters split across network chunks are handled.
#[derive(Debug, Default)]
pub struct SseAccumulator {
    pending: Vec<u8>,
    text: String,
    usage: Option<TokenUsage>,
    done: bool,
}

impl SseAccumulator {
    pub fn push(&mut self, chunk: &[u8]) -> Result<()> {
        self.pending.extend_from_slice(chunk);
        while let Some(end) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=end).collect();
            self.line(&line)?;
        }
        Ok(())
    }

    pub fn is_done(&self) -> bool { self.done }

    pub fn finish(mut self) -> Result<Completion> {
        let rest = std::mem::take(&mut self.pending);
        self.line(&rest)?;
        Ok(Completion { text: self.text, usage: self.usage })
    }

    fn line(&mut self, raw: &[u8]) -> Result<()> {
        if self.done { return Ok(()); }
        let line = std::str::from_utf8(raw).context("stream line is not UTF-8")?.trim();
        let Some(data) = line.strip_prefix("data:") else { return Ok(()) };
        let data = data.trim_start();
        if data == "[DONE]" {
            self.done = true;
            return Ok(());
        }
        if data.is_empty() { return Ok(()); }
        let event: CompletionPayload = serde_json::from_str(data).context("malformed stream event")?;
        if let Some(content) = event.choices.into_iter().next().and_then(|c| c.delta).and_then(|d| d.content) {
            self.text.push_str(&content);
        }
        if event.usage.is_some() { self.usage = event.usage; }
        Ok(())
    }
}

/// Runs generation with the configured sampling bounds, mode and timeout.
pub struct AnswerSynthesizer {
    generator: Arc<dyn Generator>,
    params: GenerationParams,
    mode: ResponseMode,
    timeout: Duration,
}

impl AnswerSynthesizer {
    pub fn new(generator: Arc<dyn Generator>, params: GenerationParams, mode: ResponseMode, timeout: Duration) -> Self {
        Self { generator, params, mode, timeout }
    }

    pub async fn synthesize(&self, prompt: &GroundedPrompt, cancel: &CancelSignal) -> kbchat_core::error::Result<Completion> {
        let messages = prompt.messages();
        let completion = bounded("generation", self.timeout, cancel, self.generator.complete(&messages, &self.params, self.mode)).await?;
        if let Some(usage) = completion.usage {
            tracing::debug!(prompt_tokens = usage.prompt_tokens, completion_tokens = usage.completion_tokens, "generation usage");
        }
        Ok(completion)
    }
}

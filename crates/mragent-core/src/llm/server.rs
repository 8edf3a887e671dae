use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{LanguageModel, Message, SamplingOptions};
use crate::{MragentError, SecretValue};

/// Client for an OpenAI-compatible `/chat/completions` endpoint (vLLM, llama.cpp, hosted APIs).
pub struct ServerLlm {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<SecretValue>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    temperature: f32,
    top_p: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "no_stop_sequences")]
    stop: &'a [String],
}

fn no_stop_sequences(stop: &&[String]) -> bool {
    stop.is_empty()
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

impl ServerLlm {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<SecretValue>,
        timeout: Duration,
    ) -> Result<Self, MragentError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| MragentError::Llm(format!("failed to build http client: {err}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key,
        })
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[async_trait]
impl LanguageModel for ServerLlm {
    async fn generate(
        &self,
        conversation: &[Message],
        options: &SamplingOptions,
    ) -> Result<String, MragentError> {
        let body = ChatRequest {
            model: &self.model,
            messages: conversation,
            temperature: options.temperature,
            top_p: options.top_p,
            max_tokens: options.max_tokens,
            stop: &options.stop,
        };

        let mut request = self.client.post(self.completions_url()).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key.expose());
        }

        let response = request
            .send()
            .await
            .map_err(|err| MragentError::Llm(format!("{}: {err}", self.model)))?;
        if !response.status().is_success() {
            return Err(MragentError::Llm(format!(
                "{} returned HTTP {}",
                self.model,
                response.status()
            )));
        }
        let payload: ChatResponse = response
            .json()
            .await
            .map_err(|err| MragentError::Llm(format!("undecodable completion: {err}")))?;

        let text = payload
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| MragentError::Llm(format!("{} returned no choices", self.model)))?;
        debug!(model = %self.model, chars = text.len(), "completion received");
        Ok(text)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

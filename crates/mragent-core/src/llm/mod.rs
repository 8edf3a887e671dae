//! Generative model collaborator.
//!
//! The coordinator, the searcher and every specialist talk to models through
//! [`LanguageModel`]: a conversation goes in, exactly one completion comes out.

mod scripted;
mod server;

pub use scripted::ScriptedLlm;
pub use server::ServerLlm;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::MragentError;
use crate::config::ModelConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Ordered message log sent to a model.
pub type Conversation = Vec<Message>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplingOptions {
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn generate(
        &self,
        conversation: &[Message],
        options: &SamplingOptions,
    ) -> Result<String, MragentError>;

    fn model_name(&self) -> &str;
}

pub type DynLanguageModel = Arc<dyn LanguageModel>;

/// OpenAI-compatible client for the endpoint described by `config`.
pub fn build_model(config: &ModelConfig) -> Result<DynLanguageModel, MragentError> {
    let model = ServerLlm::new(
        config.endpoint()?,
        config.model.as_str(),
        config.api_key()?,
        config.timeout(),
    )?;
    Ok(Arc::new(model))
}

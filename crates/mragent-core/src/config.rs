use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::llm::SamplingOptions;
use crate::{MragentError, SecretValue, require_env};

const DEFAULT_CONFIG_PATH: &str = "mragent.toml";
const CONFIG_PATH_ENV: &str = "MRAGENT_CONFIG";

/// Stop sequence the searcher prompts ask the model to close each JSON reply with.
pub const SEARCHER_STOP: &str = "<ENDJSON>";

/// Top-level configuration file.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub agent_model: ModelConfig,
    /// Falls back to `agent_model` when omitted.
    #[serde(default)]
    pub environment_model: Option<ModelConfig>,
    pub retriever: RetrieverConfig,
    #[serde(default)]
    pub execution: ExecuteConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    pub fn environment_model(&self) -> &ModelConfig {
        self.environment_model.as_ref().unwrap_or(&self.agent_model)
    }
}

/// Helper to load configuration with guard rails.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a provided path or discoverable defaults.
    ///
    /// Resolution order:
    /// 1. Explicit `path` argument.
    /// 2. `MRAGENT_CONFIG` environment variable.
    /// 3. `mragent.toml` in the current working directory.
    pub fn load(path: Option<PathBuf>) -> Result<Config, MragentError> {
        let candidate = resolve_path(path);
        let raw = fs::read_to_string(&candidate)
            .map_err(|err| MragentError::config_io(candidate.clone(), err))?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Config, MragentError> {
        let config: Config =
            toml::from_str(raw).map_err(|err| MragentError::InvalidConfiguration(err.to_string()))?;
        Self::validate(&config)?;
        Ok(config)
    }

    fn validate(config: &Config) -> Result<(), MragentError> {
        for model in [&config.agent_model, config.environment_model()] {
            if model.model.trim().is_empty() {
                return Err(MragentError::InvalidConfiguration(
                    "model name must not be empty".into(),
                ));
            }
            if model.base_url.is_none() && model.server_log_file.is_none() {
                return Err(MragentError::InvalidConfiguration(format!(
                    "model `{}` needs either base_url or server_log_file",
                    model.model
                )));
            }
            // Keys live in the environment only; fail early when one is referenced but unset.
            if let Some(var) = &model.api_key_env {
                require_env(var)?;
            }
        }

        let retriever = &config.retriever;
        match retriever.kind {
            RetrieverKind::Bm25 if retriever.corpus_path.is_none() => {
                return Err(MragentError::InvalidConfiguration(
                    "retriever.corpus_path is required for bm25".into(),
                ));
            }
            RetrieverKind::Sparse if retriever.url.is_none() && retriever.log_file.is_none() => {
                return Err(MragentError::InvalidConfiguration(
                    "retriever.url or retriever.log_file is required for sparse".into(),
                ));
            }
            _ => {}
        }
        if retriever.max_session_ids == 0 {
            return Err(MragentError::InvalidConfiguration(
                "retriever.max_session_ids must be positive".into(),
            ));
        }

        let execution = &config.execution;
        if execution.max_actions == 0 {
            return Err(MragentError::InvalidConfiguration(
                "execution.max_actions must be positive".into(),
            ));
        }
        if execution.max_verification_same_query == 0 {
            return Err(MragentError::InvalidConfiguration(
                "execution.max_verification_same_query must be positive".into(),
            ));
        }
        Ok(())
    }
}

fn resolve_path(path: Option<PathBuf>) -> PathBuf {
    if let Some(path) = path {
        return path;
    }

    if let Ok(from_env) = env::var(CONFIG_PATH_ENV) {
        if !from_env.trim().is_empty() {
            return PathBuf::from(from_env);
        }
    }

    Path::new(DEFAULT_CONFIG_PATH).to_path_buf()
}

/// Reads a two-line `host` / `port` file written by a model or retrieval server on startup.
pub fn endpoint_from_log_file(path: &Path, route: &str) -> Result<String, MragentError> {
    let raw =
        fs::read_to_string(path).map_err(|err| MragentError::config_io(path.to_path_buf(), err))?;
    let mut lines = raw.lines().map(str::trim).filter(|line| !line.is_empty());
    match (lines.next(), lines.next()) {
        (Some(host), Some(port)) => Ok(format!("http://{host}:{port}{route}")),
        _ => Err(MragentError::InvalidConfiguration(format!(
            "{} must contain a host line and a port line",
            path.display()
        ))),
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    pub model: String,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub server_log_file: Option<PathBuf>,
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "ModelConfig::default_timeout_secs")]
    pub timeout_secs: u64,
}

impl ModelConfig {
    const fn default_timeout_secs() -> u64 {
        300
    }

    /// Base URL of the OpenAI-compatible API (without `/chat/completions`).
    pub fn endpoint(&self) -> Result<String, MragentError> {
        if let Some(url) = &self.base_url {
            return Ok(url.clone());
        }
        match &self.server_log_file {
            Some(path) => endpoint_from_log_file(path, "/v1"),
            None => Err(MragentError::InvalidConfiguration(format!(
                "no endpoint configured for model `{}`",
                self.model
            ))),
        }
    }

    pub fn api_key(&self) -> Result<Option<SecretValue>, MragentError> {
        self.api_key_env.as_deref().map(require_env).transpose()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrieverKind {
    Bm25,
    Sparse,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetrieverConfig {
    pub kind: RetrieverKind,
    /// JSONL corpus with `{"id", "contents"}` rows (bm25).
    #[serde(default)]
    pub corpus_path: Option<PathBuf>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub log_file: Option<PathBuf>,
    #[serde(default)]
    pub top_k: Option<usize>,
    #[serde(default)]
    pub threshold: f32,
    #[serde(default = "RetrieverConfig::default_cache_k")]
    pub cache_k: usize,
    #[serde(default = "RetrieverConfig::default_max_session_ids")]
    pub max_session_ids: usize,
}

impl RetrieverConfig {
    const fn default_cache_k() -> usize {
        20
    }

    const fn default_max_session_ids() -> usize {
        1000
    }

    pub fn effective_top_k(&self) -> usize {
        self.top_k.unwrap_or(match self.kind {
            RetrieverKind::Bm25 => 2,
            RetrieverKind::Sparse => 10,
        })
    }

    pub fn search_url(&self) -> Result<String, MragentError> {
        if let Some(url) = &self.url {
            return Ok(url.clone());
        }
        match &self.log_file {
            Some(path) => endpoint_from_log_file(path, "/search"),
            None => Err(MragentError::InvalidConfiguration(
                "sparse retriever has no url".into(),
            )),
        }
    }
}

/// Budgets and sampling shared by every run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecuteConfig {
    pub max_actions: usize,
    pub max_tokens_agent: u32,
    pub max_tokens_environment: u32,
    pub temperature_agent: f32,
    pub temperature_environment: f32,
    pub top_p: f32,
    pub max_verification_same_query: usize,
    pub searcher_steps_total_cap: usize,
    /// Absolute RFC 3339 timestamp after which searcher calls become no-ops.
    pub searcher_deadline: Option<DateTime<Utc>>,
    pub searcher_max_tokens: u32,
    pub max_retries: usize,
    pub concise: bool,
    /// Count a run that verified no documents as a failed attempt.
    pub require_documents: bool,
}

impl Default for ExecuteConfig {
    fn default() -> Self {
        Self {
            max_actions: 20,
            max_tokens_agent: 32_000,
            max_tokens_environment: 8_192,
            temperature_agent: 0.1,
            temperature_environment: 0.1,
            top_p: 0.95,
            max_verification_same_query: 5,
            searcher_steps_total_cap: 6,
            searcher_deadline: None,
            searcher_max_tokens: 500,
            max_retries: 20,
            concise: true,
            require_documents: true,
        }
    }
}

impl ExecuteConfig {
    pub fn agent_sampling(&self) -> SamplingOptions {
        SamplingOptions {
            temperature: self.temperature_agent,
            top_p: self.top_p,
            max_tokens: self.max_tokens_agent,
            stop: Vec::new(),
        }
    }

    pub fn environment_sampling(&self) -> SamplingOptions {
        SamplingOptions {
            temperature: self.temperature_environment,
            top_p: self.top_p,
            max_tokens: self.max_tokens_environment,
            stop: Vec::new(),
        }
    }

    /// Agent-model sampling with the environment token limit, used by the specialists.
    pub fn specialist_sampling(&self) -> SamplingOptions {
        SamplingOptions {
            max_tokens: self.max_tokens_environment,
            ..self.agent_sampling()
        }
    }

    pub fn searcher_sampling(&self) -> SamplingOptions {
        SamplingOptions {
            temperature: self.temperature_agent,
            top_p: self.top_p,
            max_tokens: self.searcher_max_tokens,
            stop: vec![SEARCHER_STOP.to_string()],
        }
    }

    pub fn deadline_passed(&self, now: DateTime<Utc>) -> bool {
        self.searcher_deadline
            .map(|deadline| now >= deadline)
            .unwrap_or(false)
    }

    /// Copy with both temperatures nudged up by 0.1 while they are below 1.0.
    pub fn perturbed(&self) -> Self {
        let mut next = self.clone();
        if next.temperature_agent < 1.0 {
            next.temperature_agent += 0.1;
        }
        if next.temperature_environment < 1.0 {
            next.temperature_environment += 0.1;
        }
        next
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

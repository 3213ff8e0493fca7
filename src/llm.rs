//! Language model providers and the completion client used by the agent.
//!
//! [`create_model`] builds a [`LanguageModel`] from `[llm]` config:
//! `openai` (chat completions), `ollama` (`/api/generate`), or `disabled`.
//! [`ModelClient`] layers prompts, temperatures and retry on top and turns
//! every failure into `None`, which is what the judge and the answer
//! generator branch on.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use rfp_harness_core::llm::LanguageModel;
use rfp_harness_core::prompt::PromptSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::{Config, LlmConfig, PromptsConfig};
use crate::http::{malformed, network_error, status_error};
use crate::retry::{with_backoff, BackoffPolicy};

pub struct DisabledModel;

#[async_trait]
impl LanguageModel for DisabledModel {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn complete(&self, _prompt: &str, _temperature: f32) -> Result<String> {
        bail!("Language model is disabled")
    }
}

/// OpenAI-compatible chat completions. Requires `OPENAI_API_KEY`.
pub struct OpenAiChatModel {
    model: String,
    api_key: String,
    url: String,
    max_output_tokens: u32,
    client: reqwest::Client,
}

impl OpenAiChatModel {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("llm.model required for OpenAI provider"))?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| "https://api.openai.com".to_string());
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model,
            api_key,
            url,
            max_output_tokens: config.max_output_tokens,
            client,
        })
    }
}

#[async_trait]
impl LanguageModel for OpenAiChatModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str, temperature: f32) -> Result<String> {
        const SERVICE: &str = "openai chat";
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
            "temperature": temperature,
            "top_p": 1.0,
            "max_tokens": self.max_output_tokens,
        });

        let response = self
            .client
            .post(format!(
                "{}/v1/chat/completions",
                self.url.trim_end_matches('/')
            ))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| network_error(SERVICE, e))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(status_error(SERVICE, status, body_text).into());
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| malformed(SERVICE, e.to_string()))?;
        Ok(parse_chat_response(&json)?)
    }
}

/// `choices[0].message.content`; a null content is an empty completion.
fn parse_chat_response(
    json: &serde_json::Value,
) -> Result<String, rfp_harness_core::error::UpstreamError> {
    let message = json
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .ok_or_else(|| malformed("openai chat", "missing choices[0].message"))?;
    Ok(message
        .get("content")
        .and_then(|c| c.as_str())
        .unwrap_or_default()
        .to_string())
}

/// Local Ollama text generation (default `http://localhost:11434`).
pub struct OllamaModel {
    model: String,
    url: String,
    max_output_tokens: u32,
    client: reqwest::Client,
}

impl OllamaModel {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("llm.model required for Ollama provider"))?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| "http://localhost:11434".to_string());
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model,
            url,
            max_output_tokens: config.max_output_tokens,
            client,
        })
    }
}

#[async_trait]
impl LanguageModel for OllamaModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str, temperature: f32) -> Result<String> {
        const SERVICE: &str = "ollama generate";
        let body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": {
                "temperature": temperature,
                "top_p": 1.0,
                "num_predict": self.max_output_tokens,
            },
        });

        let response = self
            .client
            .post(format!("{}/api/generate", self.url.trim_end_matches('/')))
            .json(&body)
            .send()
            .await
            .map_err(|e| network_error(SERVICE, e))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(status_error(SERVICE, status, body_text).into());
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| malformed(SERVICE, e.to_string()))?;
        json.get("response")
            .and_then(|r| r.as_str())
            .map(str::to_string)
            .ok_or_else(|| malformed(SERVICE, "missing response field").into())
    }
}

pub fn create_model(config: &LlmConfig) -> Result<Arc<dyn LanguageModel>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledModel)),
        "openai" => Ok(Arc::new(OpenAiChatModel::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaModel::new(config)?)),
        other => bail!("Unknown llm provider: {}", other),
    }
}

/// Built-in prompts, or the `[rfp_expert]` / `[sufficiency_evaluator]`
/// tables from `prompts.path` when set.
pub fn load_prompt_set(config: &PromptsConfig) -> Result<PromptSet> {
    match &config.path {
        None => Ok(PromptSet::default()),
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read prompts file: {}", path.display()))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse prompts file: {}", path.display()))
        }
    }
}

/// Prompted, retried access to the language model.
///
/// Both completions return `None` when the model could not be reached or
/// kept failing after retries. `Some("")` is a successful empty completion.
pub struct ModelClient {
    model: Arc<dyn LanguageModel>,
    prompts: PromptSet,
    backoff: BackoffPolicy,
    answer_temperature: f32,
    sufficiency_temperature: f32,
}

impl ModelClient {
    pub fn new(model: Arc<dyn LanguageModel>, prompts: PromptSet, backoff: BackoffPolicy) -> Self {
        Self {
            model,
            prompts,
            backoff,
            answer_temperature: 0.0,
            sufficiency_temperature: 0.7,
        }
    }

    pub fn with_temperatures(mut self, answer: f32, sufficiency: f32) -> Self {
        self.answer_temperature = answer;
        self.sufficiency_temperature = sufficiency;
        self
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let model = create_model(&config.llm)?;
        let prompts = load_prompt_set(&config.prompts)?;
        let backoff = BackoffPolicy::new(
            config.retry.llm_max_attempts,
            config.retry.llm_base_delay(),
        );
        Ok(Self::new(model, prompts, backoff).with_temperatures(
            config.llm.answer_temperature,
            config.llm.sufficiency_temperature,
        ))
    }

    pub fn model_name(&self) -> &str {
        self.model.model_name()
    }

    /// Draft an answer to `requirement` from `context`.
    pub async fn answer_completion(&self, context: &str, requirement: &str) -> Option<String> {
        let prompt = self.prompts.answer_prompt(context, requirement);
        self.complete("answer completion", &prompt, self.answer_temperature)
            .await
    }

    /// Ask whether `context` is enough to answer `question`.
    pub async fn sufficiency_completion(&self, context: &str, question: &str) -> Option<String> {
        let prompt = self.prompts.sufficiency_prompt(context, question);
        self.complete(
            "sufficiency completion",
            &prompt,
            self.sufficiency_temperature,
        )
        .await
    }

    async fn complete(&self, label: &str, prompt: &str, temperature: f32) -> Option<String> {
        let model = self.model.clone();
        let result = with_backoff(self.backoff, label, || {
            let model = model.clone();
            async move { model.complete(prompt, temperature).await }
        })
        .await;

        match result {
            Ok(text) => {
                debug!(model = self.model.model_name(), label, chars = text.len(), "completion");
                Some(text)
            }
            Err(e) => {
                warn!(model = self.model.model_name(), label, "model call failed: {:#}", e);
                None
            }
        }
    }
}

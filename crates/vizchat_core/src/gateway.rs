use crate::protocol;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde_json::Value;

/// Model used for diagnostic text calls (relevance check, chart description).
pub const TEXT_MODEL: &str = "gpt-3.5-turbo";
/// Model used for chart generation and revision.
pub const CHART_MODEL: &str = "gpt-4o-mini";

const DEFAULT_BASE: &str = "https://api.openai.com";

/// Capability-typed client for the hosted LLM service. Exactly two
/// operations: free-text completion and a completion constrained to the
/// `{spec: string}` schema. Single-attempt semantics per call; retry policy
/// belongs to the pipeline, not the gateway.
#[async_trait]
pub trait LlmGateway: Send + Sync {
    async fn complete_text(&self, prompt: &str) -> Result<String>;

    /// Schema-constrained completion; returns the `spec` string from the
    /// structured response.
    async fn complete_structured(&self, prompt: &str) -> Result<String>;
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub api_key: String,
    pub base_url: String,
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY").context("OPENAI_API_KEY is not set")?;
        Ok(Self {
            api_key,
            base_url: DEFAULT_BASE.to_string(),
        })
    }
}

pub struct OpenAiGateway {
    cfg: GatewayConfig,
    client: reqwest::Client,
}

impl OpenAiGateway {
    pub fn new(cfg: GatewayConfig) -> Self {
        Self {
            cfg,
            client: reqwest::Client::new(),
        }
    }

    async fn chat(&self, model: &str, prompt: &str, response_format: Option<Value>) -> Result<String> {
        let url = format!(
            "{}/v1/chat/completions",
            self.cfg.base_url.trim_end_matches('/')
        );
        let mut body = serde_json::json!({
            "model": model,
            "messages": [
                {"role": "user", "content": prompt}
            ]
        });
        if let Some(format) = response_format {
            body["response_format"] = format;
        }

        let resp = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, "application/json")
            .header(AUTHORIZATION, format!("Bearer {}", self.cfg.api_key))
            .json(&body)
            .send()
            .await?;
        if !resp.status().is_success() {
            let txt = resp.text().await.unwrap_or_default();
            anyhow::bail!("provider error: {}", txt);
        }
        let v: Value = resp.json().await?;
        let content = v
            .pointer("/choices/0/message/content")
            .and_then(|x| x.as_str())
            .ok_or_else(|| anyhow::anyhow!("provider response missing message content"))?;
        Ok(content.trim().to_string())
    }
}

#[async_trait]
impl LlmGateway for OpenAiGateway {
    async fn complete_text(&self, prompt: &str) -> Result<String> {
        self.chat(TEXT_MODEL, prompt, None).await
    }

    async fn complete_structured(&self, prompt: &str) -> Result<String> {
        let raw = self
            .chat(CHART_MODEL, prompt, Some(protocol::spec_response_format()))
            .await?;
        let parsed: Value = serde_json::from_str(&raw)
            .with_context(|| format!("structured output was not valid JSON: {raw}"))?;
        let spec = parsed
            .get("spec")
            .and_then(|s| s.as_str())
            .ok_or_else(|| anyhow::anyhow!("structured output missing `spec` field"))?;
        Ok(spec.to_string())
    }
}

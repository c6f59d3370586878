use std::time::Instant;

use anyhow::Context;
use axum::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::LlmConfig;
use crate::nutrition::prompt::SYSTEM_PROMPT;

#[async_trait]
pub trait AdvisoryClient: Send + Sync {
    /// Returns the raw completion text. The text is expected, not guaranteed,
    /// to embed the JSON object the prompt asks for.
    async fn analyze(&self, prompt: &str) -> anyhow::Result<String>;
}

/// OpenAI-compatible chat completion client for the hosted inference router.
pub struct HostedAdvisor {
    client: Client,
    config: LlmConfig,
}

impl HostedAdvisor {
    pub fn new(config: LlmConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChatMessage,
}

fn chat_request<'a>(config: &'a LlmConfig, prompt: &str) -> ChatRequest<'a> {
    ChatRequest {
        model: &config.model,
        messages: vec![
            ChatMessage {
                role: "system".to_string(),
                content: SYSTEM_PROMPT.to_string(),
            },
            ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            },
        ],
        max_tokens: config.max_tokens,
        temperature: config.temperature,
    }
}

fn first_choice(response: ChatResponse) -> anyhow::Result<String> {
    let content = response
        .choices
        .into_iter()
        .next()
        .map(|c| c.message.content)
        .context("completion returned no choices")?;
    Ok(content.trim().to_string())
}

#[async_trait]
impl AdvisoryClient for HostedAdvisor {
    async fn analyze(&self, prompt: &str) -> anyhow::Result<String> {
        let start = Instant::now();
        let body = chat_request(&self.config, prompt);

        debug!(model = %self.config.model, prompt_chars = prompt.len(), "requesting completion");

        let response = self
            .client
            .post(format!(
                "{}/chat/completions",
                self.config.base_url.trim_end_matches('/')
            ))
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .context("inference HTTP request failed")?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            anyhow::bail!("inference endpoint returned {}: {}", status, error_body);
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .context("failed to parse inference response")?;
        let content = first_choice(parsed)?;

        debug!(
            latency_ms = start.elapsed().as_millis() as u64,
            chars = content.len(),
            "completion received"
        );
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> LlmConfig {
        LlmConfig {
            base_url: "http://llm.local/v1".into(),
            api_key: "token".into(),
            model: "meta-llama/Meta-Llama-3-8B-Instruct".into(),
            max_tokens: 400,
            temperature: 0.7,
        }
    }

    #[test]
    fn request_carries_fixed_parameters() {
        let cfg = config();
        let value = serde_json::to_value(chat_request(&cfg, "Is this ok?")).unwrap();
        assert_eq!(value["model"], "meta-llama/Meta-Llama-3-8B-Instruct");
        assert_eq!(value["max_tokens"], 400);
        assert!((value["temperature"].as_f64().unwrap() - 0.7).abs() < 1e-6);
        assert_eq!(value["messages"][0]["role"], "system");
        assert_eq!(value["messages"][1]["role"], "user");
        assert_eq!(value["messages"][1]["content"], "Is this ok?");
    }

    #[test]
    fn first_choice_is_trimmed() {
        let raw = r#"{"choices":[{"message":{"role":"assistant","content":"  {\"advisability\":\"No\"}\n"}}]}"#;
        let parsed: ChatResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(first_choice(parsed).unwrap(), r#"{"advisability":"No"}"#);
    }

    #[test]
    fn empty_choices_is_an_error() {
        let parsed: ChatResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(first_choice(parsed).is_err());
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_an_error() {
        let mut cfg = config();
        cfg.base_url = "http://127.0.0.1:9".into();
        let err = HostedAdvisor::new(cfg).analyze("hi").await.unwrap_err();
        assert!(err.to_string().contains("inference HTTP request failed"));
    }
}

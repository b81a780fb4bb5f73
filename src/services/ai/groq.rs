use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{http_client, with_system, ChatResponse, LlmProvider, Message, TokenUsage};

const COMPLETIONS_URL: &str = "https://api.groq.com/openai/v1/chat/completions";

const TEMPERATURE: f32 = 0.3;

pub struct GroqProvider {
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl GroqProvider {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            api_key,
            model,
            client: http_client(),
        }
    }
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
    temperature: f32,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Deserialize)]
struct Usage {
    prompt_tokens: i64,
    completion_tokens: i64,
}

#[async_trait]
impl LlmProvider for GroqProvider {
    async fn chat(&self, system_prompt: &str, messages: &[Message]) -> anyhow::Result<ChatResponse> {
        let request = CompletionRequest {
            model: &self.model,
            messages: with_system(system_prompt, messages),
            temperature: TEMPERATURE,
        };

        let resp = self
            .client
            .post(COMPLETIONS_URL)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .context("failed to call Groq API")?;

        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            anyhow::bail!("Groq API error ({status}): {detail}");
        }

        let completion: CompletionResponse = resp.json().await.context("failed to parse Groq response")?;
        let content = completion
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .context("Groq response had no choices")?;
        let usage = completion
            .usage
            .map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
            })
            .unwrap_or_default();

        tracing::debug!(model = %self.model, prompt_tokens = usage.prompt_tokens, completion_tokens = usage.completion_tokens, "groq completion");
        Ok(ChatResponse { content, usage })
    }
}

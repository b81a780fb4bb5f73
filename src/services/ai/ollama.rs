use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{http_client, with_system, ChatResponse, LlmProvider, Message, TokenUsage};

pub struct OllamaProvider {
    url: String,
    model: String,
    client: reqwest::Client,
}

impl OllamaProvider {
    pub fn new(url: String, model: String) -> Self {
        Self {
            url: url.trim_end_matches('/').to_string(),
            model,
            client: http_client(),
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
    stream: bool,
}

#[derive(Deserialize)]
struct ChatReply {
    message: Message,
    // Ollama reports token counts as eval counters.
    #[serde(default)]
    prompt_eval_count: i64,
    #[serde(default)]
    eval_count: i64,
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    async fn chat(&self, system_prompt: &str, messages: &[Message]) -> anyhow::Result<ChatResponse> {
        let request = ChatRequest {
            model: &self.model,
            messages: with_system(system_prompt, messages),
            stream: false,
        };

        let resp = self
            .client
            .post(format!("{}/api/chat", self.url))
            .json(&request)
            .send()
            .await
            .context("failed to call Ollama API")?
            .error_for_status()
            .context("Ollama rejected the chat request")?;

        let reply: ChatReply = resp.json().await.context("failed to parse Ollama response")?;
        Ok(ChatResponse {
            content: reply.message.content,
            usage: TokenUsage {
                prompt_tokens: reply.prompt_eval_count,
                completion_tokens: reply.eval_count,
            },
        })
    }
}

pub mod classifier;
pub mod extraction;
pub mod groq;
pub mod heuristics;
pub mod ollama;

use std::sync::Mutex;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::models::ConversationMessage;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn user(content: &str) -> Self {
        Self {
            role: "user".to_string(),
            content: content.to_string(),
        }
    }

    pub fn assistant(content: &str) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.to_string(),
        }
    }

    fn system(content: &str) -> Self {
        Self {
            role: "system".to_string(),
            content: content.to_string(),
        }
    }
}

pub(crate) fn with_system(system_prompt: &str, messages: &[Message]) -> Vec<Message> {
    let mut all = Vec::with_capacity(messages.len() + 1);
    all.push(Message::system(system_prompt));
    all.extend_from_slice(messages);
    all
}

pub(crate) const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

pub(crate) fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .unwrap_or_default()
}

impl From<&ConversationMessage> for Message {
    fn from(m: &ConversationMessage) -> Self {
        Self {
            role: m.role.clone(),
            content: m.content.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TokenUsage {
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
}

impl TokenUsage {
    pub fn add(&mut self, other: TokenUsage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
    }
}

#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub content: String,
    pub usage: TokenUsage,
}

#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn chat(&self, system_prompt: &str, messages: &[Message]) -> anyhow::Result<ChatResponse>;
}

pub struct MeteredLlm<'a> {
    inner: &'a dyn LlmProvider,
    usage: Mutex<TokenUsage>,
}

impl<'a> MeteredLlm<'a> {
    pub fn new(inner: &'a dyn LlmProvider) -> Self {
        Self {
            inner,
            usage: Mutex::new(TokenUsage::default()),
        }
    }

    pub fn usage(&self) -> TokenUsage {
        self.usage.lock().map(|u| *u).unwrap_or_default()
    }
}

#[async_trait]
impl<'a> LlmProvider for MeteredLlm<'a> {
    async fn chat(&self, system_prompt: &str, messages: &[Message]) -> anyhow::Result<ChatResponse> {
        let response = self.inner.chat(system_prompt, messages).await?;
        if let Ok(mut usage) = self.usage.lock() {
            usage.add(response.usage);
        }
        Ok(response)
    }
}

pub fn parse_json_reply<T: DeserializeOwned>(response: &str) -> Option<T> {
    if let Ok(v) = serde_json::from_str::<T>(response) {
        return Some(v);
    }

    let trimmed = response.trim();
    let cleaned = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    let cleaned = cleaned.strip_suffix("```").unwrap_or(cleaned).trim();

    if let Ok(v) = serde_json::from_str::<T>(cleaned) {
        return Some(v);
    }

    let start = cleaned.find('{')?;
    let end = cleaned.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str::<T>(&cleaned[start..=end]).ok()
}

#[cfg(test)]
pub mod testing {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::{ChatResponse, LlmProvider, Message, TokenUsage};

    pub struct ScriptedLlm {
        rules: Vec<(&'static str, String)>,
        pub calls: Mutex<Vec<String>>,
    }

    impl ScriptedLlm {
        pub fn new(rules: Vec<(&'static str, &str)>) -> Self {
            Self {
                rules: rules.into_iter().map(|(k, v)| (k, v.to_string())).collect(),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn failing() -> Self {
            Self::new(vec![])
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedLlm {
        async fn chat(&self, system_prompt: &str, messages: &[Message]) -> anyhow::Result<ChatResponse> {
            let last = messages.last().map(|m| m.content.clone()).unwrap_or_default();
            self.calls.lock().unwrap().push(last);
            self.rules
                .iter()
                .find(|(key, _)| system_prompt.contains(key))
                .map(|(_, content)| ChatResponse {
                    content: content.clone(),
                    usage: TokenUsage {
                        prompt_tokens: 10,
                        completion_tokens: 5,
                    },
                })
                .ok_or_else(|| anyhow::anyhow!("scripted provider has no answer"))
        }
    }
}

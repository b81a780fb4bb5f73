use anyhow::Context;
use async_trait::async_trait;
use serde_json::json;

use super::MessagingProvider;

const GRAPH_URL: &str = "https://graph.facebook.com/v19.0";

#[derive(Debug, Clone)]
pub enum MetaEndpoint {
    WhatsApp { phone_number_id: String },
    PageSend,
}

pub struct MetaGraphProvider {
    access_token: String,
    endpoint: MetaEndpoint,
    client: reqwest::Client,
}

impl MetaGraphProvider {
    pub fn new(access_token: String, endpoint: MetaEndpoint) -> Self {
        Self {
            access_token,
            endpoint,
            client: reqwest::Client::new(),
        }
    }

    fn request(&self, to: &str, body: &str) -> (String, serde_json::Value) {
        match &self.endpoint {
            MetaEndpoint::WhatsApp { phone_number_id } => (
                format!("{GRAPH_URL}/{phone_number_id}/messages"),
                json!({
                    "messaging_product": "whatsapp",
                    "to": to.trim_start_matches('+'),
                    "type": "text",
                    "text": { "body": body },
                }),
            ),
            MetaEndpoint::PageSend => (
                format!("{GRAPH_URL}/me/messages"),
                json!({
                    "recipient": { "id": to },
                    "messaging_type": "RESPONSE",
                    "message": { "text": body },
                }),
            ),
        }
    }
}

#[async_trait]
impl MessagingProvider for MetaGraphProvider {
    async fn send_message(&self, to: &str, body: &str) -> anyhow::Result<()> {
        let (url, payload) = self.request(to, body);

        self.client
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(&payload)
            .send()
            .await
            .context("failed to call Meta Graph API")?
            .error_for_status()
            .context("Meta Graph API returned error")?;

        Ok(())
    }
}

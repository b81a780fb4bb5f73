pub mod meta;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::models::{Channel, Customer};

#[async_trait]
pub trait MessagingProvider: Send + Sync {
    async fn send_message(&self, to: &str, body: &str) -> anyhow::Result<()>;
}

#[derive(Default)]
pub struct MessagingRegistry {
    providers: HashMap<Channel, Arc<dyn MessagingProvider>>,
}

impl MessagingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, channel: Channel, provider: Arc<dyn MessagingProvider>) -> Self {
        self.providers.insert(channel, provider);
        self
    }

    pub fn get(&self, channel: Channel) -> Option<Arc<dyn MessagingProvider>> {
        self.providers.get(&channel).cloned()
    }

    pub async fn send(&self, channel: Channel, to: &str, body: &str) -> anyhow::Result<()> {
        let provider = self
            .providers
            .get(&channel)
            .ok_or_else(|| anyhow::anyhow!("no delivery adapter for channel {}", channel.as_str()))?;
        provider.send_message(to, body).await
    }

    pub async fn send_to_customer(&self, customer: &Customer, body: &str) -> anyhow::Result<()> {
        let identity = customer
            .identities
            .iter()
            .find(|i| self.providers.contains_key(&i.channel))
            .ok_or_else(|| anyhow::anyhow!("customer {} has no deliverable channel", customer.id))?;
        self.send(identity.channel, &identity.external_id, body).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    struct Recorder(Mutex<Vec<String>>);

    #[async_trait]
    impl MessagingProvider for Recorder {
        async fn send_message(&self, to: &str, body: &str) -> anyhow::Result<()> {
            self.0.lock().unwrap().push(format!("{to}:{body}"));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_registry_routes_by_channel() {
        let recorder = Arc::new(Recorder(Mutex::new(vec![])));
        let registry = MessagingRegistry::new().with(Channel::Instagram, recorder.clone());

        registry.send(Channel::Instagram, "ig-1", "hi").await.unwrap();
        assert!(registry.send(Channel::Whatsapp, "+1555", "hi").await.is_err());
        assert_eq!(recorder.0.lock().unwrap().as_slice(), ["ig-1:hi"]);
    }
}

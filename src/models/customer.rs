use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Whatsapp,
    Instagram,
    Messenger,
    Dev,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Whatsapp => "whatsapp",
            Channel::Instagram => "instagram",
            Channel::Messenger => "messenger",
            Channel::Dev => "dev",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "whatsapp" => Some(Channel::Whatsapp),
            "instagram" => Some(Channel::Instagram),
            "messenger" => Some(Channel::Messenger),
            "dev" => Some(Channel::Dev),
            _ => None,
        }
    }

    pub fn identifier_is_phone(&self) -> bool {
        matches!(self, Channel::Whatsapp)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChannelIdentity {
    pub channel: Channel,
    pub external_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub id: String,
    pub display_name: Option<String>,
    pub identities: Vec<ChannelIdentity>,
    pub ai_enabled: bool,
    pub paused: bool,
    pub active: bool,
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Customer {
    pub fn accepts_ai_replies(&self) -> bool {
        self.active && self.ai_enabled && !self.paused
    }

    pub fn phone(&self) -> Option<&str> {
        self.identities
            .iter()
            .find(|i| i.channel.identifier_is_phone())
            .map(|i| i.external_id.as_str())
    }
}

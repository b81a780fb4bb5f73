use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

pub const HISTORY_LIMIT: usize = 20;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationMessage {
    pub role: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,
}

impl ConversationMessage {
    pub fn user(content: &str) -> Self {
        Self {
            role: "user".to_string(),
            content: content.to_string(),
            strategy: None,
        }
    }

    pub fn assistant(content: &str, strategy: Option<&str>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.to_string(),
            strategy: strategy.map(str::to_string),
        }
    }

    pub fn is_assistant(&self) -> bool {
        self.role == "assistant"
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub customer_id: String,
    pub messages: Vec<ConversationMessage>,
    pub started_at: NaiveDateTime,
    pub last_activity: NaiveDateTime,
    pub expires_at: NaiveDateTime,
}

impl Conversation {
    pub fn user_turns(&self) -> usize {
        self.messages.iter().filter(|m| !m.is_assistant()).count()
    }

    pub fn trim_history(&mut self) {
        if self.messages.len() > HISTORY_LIMIT {
            let excess = self.messages.len() - HISTORY_LIMIT;
            self.messages.drain(..excess);
        }
    }

    pub fn recent_assistant_turns(&self, n: usize) -> Vec<&ConversationMessage> {
        self.messages
            .iter()
            .rev()
            .filter(|m| m.is_assistant())
            .take(n)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conversation(messages: Vec<ConversationMessage>) -> Conversation {
        let now = chrono::Utc::now().naive_utc();
        Conversation {
            customer_id: "c1".to_string(),
            messages,
            started_at: now,
            last_activity: now,
            expires_at: now,
        }
    }

    #[test]
    fn test_trim_keeps_most_recent() {
        let msgs = (0..25)
            .map(|i| ConversationMessage::user(&format!("m{i}")))
            .collect();
        let mut conv = conversation(msgs);
        conv.trim_history();
        assert_eq!(conv.messages.len(), HISTORY_LIMIT);
        assert_eq!(conv.messages[0].content, "m5");
    }

    #[test]
    fn test_recent_assistant_turns_order() {
        let conv = conversation(vec![
            ConversationMessage::assistant("first", Some("faq")),
            ConversationMessage::user("hi"),
            ConversationMessage::assistant("second", None),
        ]);
        let recent = conv.recent_assistant_turns(3);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].content, "second");
        assert_eq!(conv.user_turns(), 1);
    }
}

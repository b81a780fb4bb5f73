use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::assessment::{EmotionalTone, Intent};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TurnOutcome {
    BookingInitiated,
    BookingInProgress,
    InformationProvided,
    Resolved,
    Error,
}

impl TurnOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnOutcome::BookingInitiated => "booking_initiated",
            TurnOutcome::BookingInProgress => "booking_in_progress",
            TurnOutcome::InformationProvided => "information_provided",
            TurnOutcome::Resolved => "resolved",
            TurnOutcome::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "booking_initiated" => TurnOutcome::BookingInitiated,
            "booking_in_progress" => TurnOutcome::BookingInProgress,
            "information_provided" => TurnOutcome::InformationProvided,
            "error" => TurnOutcome::Error,
            _ => TurnOutcome::Resolved,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationLearningRecord {
    pub id: i64,
    pub customer_id: String,
    pub user_message: String,
    pub reply: String,
    pub intent: Intent,
    pub emotional_tone: EmotionalTone,
    pub success: bool,
    pub outcome: TurnOutcome,
    pub conversation_length: i64,
    pub resolution_secs: i64,
    pub kb_flagged: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct IntentPattern {
    pub intent: Intent,
    pub total: usize,
    pub success_rate: f64,
    pub average_resolution_secs: f64,
    pub common_failure_reasons: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FaqEntryStatus {
    Suggested,
    Active,
}

impl FaqEntryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FaqEntryStatus::Suggested => "suggested",
            FaqEntryStatus::Active => "active",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "active" => FaqEntryStatus::Active,
            _ => FaqEntryStatus::Suggested,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaqEntry {
    pub id: i64,
    pub question: String,
    pub answer: String,
    pub status: FaqEntryStatus,
    pub occurrences: i64,
    pub success_rate: f64,
}

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EscalationType {
    AutoDetected,
    Manual,
    AiEscalation,
}

impl EscalationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EscalationType::AutoDetected => "auto_detected",
            EscalationType::Manual => "manual",
            EscalationType::AiEscalation => "ai_escalation",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "manual" => EscalationType::Manual,
            "ai_escalation" => EscalationType::AiEscalation,
            _ => EscalationType::AutoDetected,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EscalationStatus {
    Open,
    Resolved,
}

impl EscalationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EscalationStatus::Open => "open",
            EscalationStatus::Resolved => "resolved",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "resolved" => EscalationStatus::Resolved,
            _ => EscalationStatus::Open,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Escalation {
    pub id: i64,
    pub customer_id: String,
    pub reason: String,
    pub kind: EscalationType,
    pub status: EscalationStatus,
    pub sentiment: Option<f64>,
    pub metadata: serde_json::Value,
    pub created_at: NaiveDateTime,
    pub resolved_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EscalationAlert {
    pub customer_id: String,
    pub kind: EscalationType,
    pub title: String,
    pub description: String,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionNote {
    pub id: i64,
    pub customer_id: String,
    pub note: String,
    pub created_at: NaiveDateTime,
}

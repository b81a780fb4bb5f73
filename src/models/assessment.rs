use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case", from = "String")]
pub enum Intent {
    Booking,
    PackageInquiry,
    Faq,
    Greeting,
    Payment,
    Cancellation,
    Complaint,
    HumanRequest,
    Unknown,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Booking => "booking",
            Intent::PackageInquiry => "package_inquiry",
            Intent::Faq => "faq",
            Intent::Greeting => "greeting",
            Intent::Payment => "payment",
            Intent::Cancellation => "cancellation",
            Intent::Complaint => "complaint",
            Intent::HumanRequest => "human_request",
            Intent::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "booking" => Intent::Booking,
            "package_inquiry" => Intent::PackageInquiry,
            "faq" => Intent::Faq,
            "greeting" => Intent::Greeting,
            "payment" => Intent::Payment,
            "cancellation" => Intent::Cancellation,
            "complaint" => Intent::Complaint,
            "human_request" => Intent::HumanRequest,
            _ => Intent::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", from = "String")]
pub enum EmotionalTone {
    Positive,
    Excited,
    Neutral,
    Confused,
    Anxious,
    Frustrated,
    Angry,
}

impl EmotionalTone {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmotionalTone::Positive => "positive",
            EmotionalTone::Excited => "excited",
            EmotionalTone::Neutral => "neutral",
            EmotionalTone::Confused => "confused",
            EmotionalTone::Anxious => "anxious",
            EmotionalTone::Frustrated => "frustrated",
            EmotionalTone::Angry => "angry",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "positive" => EmotionalTone::Positive,
            "excited" => EmotionalTone::Excited,
            "confused" => EmotionalTone::Confused,
            "anxious" => EmotionalTone::Anxious,
            "frustrated" => EmotionalTone::Frustrated,
            "angry" => EmotionalTone::Angry,
            _ => EmotionalTone::Neutral,
        }
    }

    pub fn satisfaction(&self) -> f64 {
        match self {
            EmotionalTone::Excited => 10.0,
            EmotionalTone::Positive => 9.0,
            EmotionalTone::Neutral => 7.0,
            EmotionalTone::Confused => 5.0,
            EmotionalTone::Anxious => 5.0,
            EmotionalTone::Frustrated => 3.0,
            EmotionalTone::Angry => 1.0,
        }
    }

    pub fn is_negative(&self) -> bool {
        matches!(self, EmotionalTone::Frustrated | EmotionalTone::Angry)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case", from = "String")]
pub enum UrgencyLevel {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case", from = "String")]
pub enum Complexity {
    Simple,
    Moderate,
    Complex,
}

impl UrgencyLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            UrgencyLevel::Low => "low",
            UrgencyLevel::Medium => "medium",
            UrgencyLevel::High => "high",
            UrgencyLevel::Critical => "critical",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "low" => UrgencyLevel::Low,
            "high" => UrgencyLevel::High,
            "critical" => UrgencyLevel::Critical,
            _ => UrgencyLevel::Medium,
        }
    }
}

impl Complexity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Complexity::Simple => "simple",
            Complexity::Moderate => "moderate",
            Complexity::Complex => "complex",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "simple" => Complexity::Simple,
            "complex" => Complexity::Complex,
            _ => Complexity::Moderate,
        }
    }
}

// Model output is free text; unrecognised labels fall back instead of failing.
impl From<String> for Intent {
    fn from(s: String) -> Self {
        Intent::parse(&s)
    }
}

impl From<String> for EmotionalTone {
    fn from(s: String) -> Self {
        EmotionalTone::parse(&s)
    }
}

impl From<String> for UrgencyLevel {
    fn from(s: String) -> Self {
        UrgencyLevel::parse(&s)
    }
}

impl From<String> for Complexity {
    fn from(s: String) -> Self {
        Complexity::parse(&s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IntentAssessment {
    pub primary_intent: Intent,
    #[serde(default)]
    pub secondary_intents: Vec<Intent>,
    pub confidence: f64,
    pub emotional_tone: EmotionalTone,
    pub urgency_level: UrgencyLevel,
    pub complexity: Complexity,
    #[serde(default)]
    pub requires_human_handoff: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub handoff_reasons: Vec<String>,
}

impl Default for IntentAssessment {
    fn default() -> Self {
        Self {
            primary_intent: Intent::Unknown,
            secondary_intents: Vec::new(),
            confidence: 0.3,
            emotional_tone: EmotionalTone::Neutral,
            urgency_level: UrgencyLevel::Medium,
            complexity: Complexity::Moderate,
            requires_human_handoff: false,
            handoff_reasons: Vec::new(),
        }
    }
}

impl IntentAssessment {
    pub fn has_intent(&self, intent: Intent) -> bool {
        self.primary_intent == intent || self.secondary_intents.contains(&intent)
    }
}

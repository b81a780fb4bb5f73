use std::collections::BTreeSet;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

pub const SUMMARY_WINDOW: usize = 20;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RelationshipStage {
    New,
    Interested,
    Booked,
    Returning,
    Vip,
}

impl RelationshipStage {
    pub const ALL: [RelationshipStage; 5] = [
        RelationshipStage::New,
        RelationshipStage::Interested,
        RelationshipStage::Booked,
        RelationshipStage::Returning,
        RelationshipStage::Vip,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipStage::New => "new",
            RelationshipStage::Interested => "interested",
            RelationshipStage::Booked => "booked",
            RelationshipStage::Returning => "returning",
            RelationshipStage::Vip => "vip",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "new" => Some(RelationshipStage::New),
            "interested" => Some(RelationshipStage::Interested),
            "booked" => Some(RelationshipStage::Booked),
            "returning" => Some(RelationshipStage::Returning),
            "vip" => Some(RelationshipStage::Vip),
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            RelationshipStage::New => 0,
            RelationshipStage::Interested => 1,
            RelationshipStage::Booked => 2,
            RelationshipStage::Returning => 3,
            RelationshipStage::Vip => 4,
        }
    }

    // Automatic transitions only ever move forward.
    pub fn advanced_to(self, candidate: RelationshipStage) -> RelationshipStage {
        if candidate.rank() > self.rank() {
            candidate
        } else {
            self
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CommunicationStyle {
    Brief,
    Friendly,
    Detailed,
}

impl CommunicationStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommunicationStyle::Brief => "brief",
            CommunicationStyle::Friendly => "friendly",
            CommunicationStyle::Detailed => "detailed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "brief" => CommunicationStyle::Brief,
            "detailed" => CommunicationStyle::Detailed,
            _ => CommunicationStyle::Friendly,
        }
    }

    pub fn infer(average_message_chars: f64) -> Self {
        if average_message_chars < 40.0 {
            CommunicationStyle::Brief
        } else if average_message_chars > 200.0 {
            CommunicationStyle::Detailed
        } else {
            CommunicationStyle::Friendly
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum TimeOfDay {
    Morning,
    Afternoon,
    Evening,
}

impl TimeOfDay {
    pub fn of(time: chrono::NaiveTime) -> Self {
        use chrono::Timelike;
        match time.hour() {
            0..=11 => TimeOfDay::Morning,
            12..=16 => TimeOfDay::Afternoon,
            _ => TimeOfDay::Evening,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TimeOfDay::Morning => "morning",
            TimeOfDay::Afternoon => "afternoon",
            TimeOfDay::Evening => "evening",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BudgetRange {
    pub min: f64,
    pub max: f64,
}

impl BudgetRange {
    pub fn widen(range: Option<BudgetRange>, price: f64) -> BudgetRange {
        match range {
            Some(r) => BudgetRange {
                min: r.min.min(price),
                max: r.max.max(price),
            },
            None => BudgetRange {
                min: price,
                max: price,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationSummary {
    pub at: NaiveDateTime,
    pub intent: String,
    pub summary: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerMemory {
    pub customer_id: String,
    pub stage: RelationshipStage,
    #[serde(default)]
    pub preferred_packages: BTreeSet<String>,
    #[serde(default)]
    pub budget: Option<BudgetRange>,
    #[serde(default)]
    pub preferred_times: BTreeSet<TimeOfDay>,
    pub style: CommunicationStyle,
    pub lifetime_value: f64,
    pub satisfaction: f64,
    pub satisfaction_samples: i64,
    #[serde(default)]
    pub summaries: Vec<ConversationSummary>,
}

impl CustomerMemory {
    pub fn new(customer_id: &str) -> Self {
        Self {
            customer_id: customer_id.to_string(),
            stage: RelationshipStage::New,
            preferred_packages: BTreeSet::new(),
            budget: None,
            preferred_times: BTreeSet::new(),
            style: CommunicationStyle::Friendly,
            lifetime_value: 0.0,
            satisfaction: 0.0,
            satisfaction_samples: 0,
            summaries: Vec::new(),
        }
    }

    pub fn record_satisfaction(&mut self, sample: f64) {
        let n = self.satisfaction_samples as f64;
        self.satisfaction = (self.satisfaction * n + sample) / (n + 1.0);
        self.satisfaction_samples += 1;
    }

    pub fn push_summary(&mut self, summary: ConversationSummary) {
        self.summaries.push(summary);
        if self.summaries.len() > SUMMARY_WINDOW {
            let excess = self.summaries.len() - SUMMARY_WINDOW;
            self.summaries.drain(..excess);
        }
    }

    pub fn to_prompt(&self) -> String {
        let mut lines = Vec::new();

        match self.stage {
            RelationshipStage::New => {
                lines.push("This is a new customer. Be welcoming.".to_string())
            }
            RelationshipStage::Interested => lines.push(
                "The customer has shown interest before but has not booked yet.".to_string(),
            ),
            RelationshipStage::Booked | RelationshipStage::Returning => lines
                .push("The customer has booked with the studio before.".to_string()),
            RelationshipStage::Vip => lines.push(
                "The customer is a VIP. Be especially attentive and thank them for their loyalty."
                    .to_string(),
            ),
        }

        match self.style {
            CommunicationStyle::Brief => {
                lines.push("Keep replies short and to the point.".to_string())
            }
            CommunicationStyle::Detailed => {
                lines.push("The customer appreciates thorough explanations.".to_string())
            }
            CommunicationStyle::Friendly => {}
        }

        if !self.preferred_packages.is_empty() {
            let names: Vec<&str> = self.preferred_packages.iter().map(String::as_str).collect();
            lines.push(format!("Packages they liked before: {}.", names.join(", ")));
        }
        if !self.preferred_times.is_empty() {
            let times: Vec<&str> = self.preferred_times.iter().map(|t| t.as_str()).collect();
            lines.push(format!("They usually prefer the {}.", times.join(" or ")));
        }
        if let Some(budget) = self.budget {
            lines.push(format!(
                "Their budget has ranged from {:.0} to {:.0}.",
                budget.min, budget.max
            ));
        }

        format!("\nCustomer context:\n{}", lines.join("\n"))
    }
}

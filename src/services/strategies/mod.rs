pub mod booking;
pub mod faq;
pub mod package_inquiry;

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;

use crate::models::{
    BookingDraft, Channel, ConversationMessage, Customer, CustomerMemory, IntentAssessment,
    Package,
};
use crate::services::ai::LlmProvider;
use crate::state::AppState;

pub const CLARIFICATION_REPLY: &str =
    "I'm not sure I understood. Are you asking about our packages, a booking, or something else?";

#[derive(Debug, Clone, PartialEq)]
pub enum DraftUpdate {
    Unchanged,
    Save(BookingDraft),
    Discard,
}

#[derive(Debug, Clone)]
pub struct StrategyResponse {
    pub reply: String,
    pub draft: DraftUpdate,
    pub action: Option<&'static str>,
    pub generated: bool,
}

impl StrategyResponse {
    pub fn canned(reply: impl Into<String>, action: &'static str) -> Self {
        Self {
            reply: reply.into(),
            draft: DraftUpdate::Unchanged,
            action: Some(action),
            generated: false,
        }
    }

    pub fn with_draft(mut self, draft: DraftUpdate) -> Self {
        self.draft = draft;
        self
    }
}

pub struct TurnContext<'a> {
    pub state: &'a AppState,
    pub llm: &'a dyn LlmProvider,
    pub customer: &'a Customer,
    pub channel: Channel,
    pub sender_id: &'a str,
    pub message: &'a str,
    pub assessment: &'a IntentAssessment,
    pub history: &'a [ConversationMessage],
    pub draft: Option<&'a BookingDraft>,
    pub memory: &'a CustomerMemory,
    pub packages: &'a [Package],
    pub today: NaiveDate,
}

impl TurnContext<'_> {
    pub fn active_draft(&self) -> Option<&BookingDraft> {
        self.draft.filter(|d| d.is_active())
    }

    pub fn recent_assistant_turns(&self, n: usize) -> Vec<&ConversationMessage> {
        self.history
            .iter()
            .rev()
            .filter(|m| m.is_assistant())
            .take(n)
            .collect()
    }

    pub fn continues_draft_with_date_or_time(&self) -> bool {
        self.active_draft().is_some() && matches_any(&DATE_TIME, self.message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Faq,
    PackageInquiry,
    Booking,
}

const STRATEGIES: [Strategy; 3] = [Strategy::Booking, Strategy::Faq, Strategy::PackageInquiry];

impl Strategy {
    pub fn name(&self) -> &'static str {
        match self {
            Strategy::Faq => "faq",
            Strategy::PackageInquiry => "package_inquiry",
            Strategy::Booking => "booking",
        }
    }

    pub fn priority(&self) -> u32 {
        match self {
            Strategy::Faq => 100,
            Strategy::PackageInquiry => 50,
            Strategy::Booking => 10,
        }
    }

    pub fn can_handle(&self, ctx: &TurnContext<'_>) -> bool {
        match self {
            Strategy::Faq => faq::can_handle(ctx),
            Strategy::PackageInquiry => package_inquiry::can_handle(ctx),
            Strategy::Booking => booking::can_handle(ctx),
        }
    }

    // `Ok(None)` declines the turn and the next strategy tries.
    pub async fn generate_response(
        &self,
        ctx: &TurnContext<'_>,
    ) -> anyhow::Result<Option<StrategyResponse>> {
        match self {
            Strategy::Faq => faq::generate_response(ctx).await,
            Strategy::PackageInquiry => package_inquiry::generate_response(ctx).await,
            Strategy::Booking => booking::generate_response(ctx).await,
        }
    }
}

pub fn by_priority() -> Vec<Strategy> {
    let mut ordered = STRATEGIES.to_vec();
    ordered.sort_by_key(|s| std::cmp::Reverse(s.priority()));
    ordered
}

pub struct Routed {
    pub strategy: Option<Strategy>,
    pub response: StrategyResponse,
}

pub async fn route(ctx: &TurnContext<'_>) -> anyhow::Result<Routed> {
    for strategy in by_priority() {
        if !strategy.can_handle(ctx) {
            continue;
        }
        match strategy.generate_response(ctx).await? {
            Some(response) => {
                tracing::info!(
                    customer = %ctx.customer.id,
                    strategy = strategy.name(),
                    action = ?response.action,
                    "strategy selected"
                );
                return Ok(Routed {
                    strategy: Some(strategy),
                    response,
                });
            }
            None => {
                tracing::debug!(strategy = strategy.name(), "strategy declined");
            }
        }
    }

    tracing::info!(customer = %ctx.customer.id, "no strategy matched, asking for clarification");
    Ok(Routed {
        strategy: None,
        response: StrategyResponse::canned(CLARIFICATION_REPLY, "clarify"),
    })
}

// ── Shared patterns ──

pub(crate) type PatternSet = Vec<Regex>;

pub(crate) fn patterns(sources: &[&str]) -> PatternSet {
    sources.iter().filter_map(|p| Regex::new(p).ok()).collect()
}

pub(crate) fn matches_any(set: &PatternSet, text: &str) -> bool {
    set.iter().any(|re| re.is_match(text))
}

pub(crate) static DATE_TIME: LazyLock<PatternSet> = LazyLock::new(|| {
    patterns(&[
        r"(?i)\b(monday|tuesday|wednesday|thursday|friday|saturday|sunday|mon|tues?|wed|thurs?|fri|sat|sun)\b",
        r"(?i)\b(january|february|march|april|june|july|august|september|october|november|december|jan|feb|mar|apr|jun|jul|aug|sept?|oct|nov|dec)\b",
        r"(?i)\bmay \d",
        r"(?i)\b(today|tomorrow|tonight|next week|this week|weekend)\b",
        r"(?i)\b\d{1,2}(:\d{2})?\s*(am|pm)\b",
        r"\b\d{1,2}:\d{2}\b",
        r"\b\d{1,2}[/-]\d{1,2}([/-]\d{2,4})?\b",
        r"\b\d{4}-\d{2}-\d{2}\b",
        r"(?i)\b\d{1,2}(st|nd|rd|th)\b",
        r"(?i)\b(morning|afternoon|evening|noon)\b",
    ])
});

pub(crate) static BOOKING_START: LazyLock<PatternSet> = LazyLock::new(|| {
    patterns(&[
        r"(?i)\b(i want|i'd like|i would like|can i|could i|let me|help me|i wanna)( to)? (make a |start a |do a )?(book|booking|reserve|reservation|schedule)\b",
        r"(?i)\bbook (a|me|the|an|in)\b",
        r"(?i)\b(new|another) (booking|session)\b",
        r"(?i)\b(start over|book again)\b",
    ])
});

pub(crate) static PAYMENT: LazyLock<PatternSet> = LazyLock::new(|| {
    patterns(&[r"(?i)\b(deposit|payment|pay|paid|transfer\w*|receipt|invoice)\b"])
});

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::services::ai::LlmProvider;

    pub struct Fixture {
        pub state: AppState,
        pub customer: Customer,
        pub memory: CustomerMemory,
        pub packages: Vec<Package>,
        pub history: Vec<ConversationMessage>,
        pub draft: Option<BookingDraft>,
        pub assessment: IntentAssessment,
    }

    impl Fixture {
        pub fn new(llm: Box<dyn LlmProvider>) -> Self {
            let state = crate::state::testing::state_with(llm);
            let customer = state
                .db
                .call(|conn| {
                    crate::db::queries::resolve_customer(conn, Channel::Whatsapp, "+15551230000", Some("Ada"))
                })
                .unwrap();
            let packages = state.catalog.packages(&state.db).unwrap().to_vec();
            Self {
                memory: CustomerMemory::new(&customer.id),
                state,
                customer,
                packages,
                history: Vec::new(),
                draft: None,
                assessment: IntentAssessment::default(),
            }
        }

        pub fn ctx<'a>(&'a self, message: &'a str) -> TurnContext<'a> {
            TurnContext {
                state: &self.state,
                llm: self.state.llm.as_ref(),
                customer: &self.customer,
                channel: Channel::Whatsapp,
                sender_id: "+15551230000",
                message,
                assessment: &self.assessment,
                history: &self.history,
                draft: self.draft.as_ref(),
                memory: &self.memory,
                packages: &self.packages,
                today: NaiveDate::from_ymd_opt(2031, 6, 10).unwrap(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::Fixture;
    use super::*;
    use crate::models::Intent;
    use crate::services::ai::testing::ScriptedLlm;

    #[test]
    fn test_priority_order() {
        assert_eq!(
            by_priority(),
            vec![Strategy::Faq, Strategy::PackageInquiry, Strategy::Booking]
        );
    }

    #[tokio::test]
    async fn test_package_question_routes_to_package_inquiry() {
        let fx = Fixture::new(Box::new(ScriptedLlm::failing()));
        let routed = route(&fx.ctx("What packages do you have?")).await.unwrap();
        assert_eq!(routed.strategy, Some(Strategy::PackageInquiry));
        assert_eq!(routed.response.draft, DraftUpdate::Unchanged);
        for name in ["Silver Package", "Gold Package", "VIP Package", "VVIP Package", "Garden Package"] {
            assert!(routed.response.reply.contains(name), "missing {name}");
        }
    }

    #[tokio::test]
    async fn test_unmatched_message_gets_clarification() {
        let fx = Fixture::new(Box::new(ScriptedLlm::failing()));
        let routed = route(&fx.ctx("blue")).await.unwrap();
        assert!(routed.strategy.is_none());
        assert_eq!(routed.response.reply, CLARIFICATION_REPLY);
    }

    #[tokio::test]
    async fn test_declined_booking_falls_through() {
        let mut fx = Fixture::new(Box::new(ScriptedLlm::failing()));
        fx.assessment.primary_intent = Intent::Booking;
        fx.history = vec![
            ConversationMessage::user("can I bring my dog?"),
            ConversationMessage::assistant("Of course, pets are welcome at the studio!", Some("faq")),
        ];
        let routed = route(&fx.ctx("ok")).await.unwrap();
        assert!(routed.strategy.is_none());
        assert_eq!(routed.response.action, Some("clarify"));
    }

    #[test]
    fn test_date_time_patterns() {
        for text in ["saturday", "the 16th", "3pm", "10:30", "16/06", "2031-06-16", "next week"] {
            assert!(matches_any(&DATE_TIME, text), "{text}");
        }
        assert!(!matches_any(&DATE_TIME, "do you allow pets"));
    }
}

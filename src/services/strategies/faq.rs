use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::db::queries;
use crate::models::{EscalationAlert, EscalationType, FaqEntry, FaqEntryStatus, Intent};
use crate::services::ai::Message;
use crate::services::catalog;
use crate::services::escalation;
use crate::services::learning::normalize_question;

use super::{
    matches_any, patterns, PatternSet, StrategyResponse, TurnContext, BOOKING_START,
};

const KB_MATCH_THRESHOLD: f64 = 0.75;
const ANSWER_HISTORY: usize = 6;

const ANSWER_PROMPT: &str = r#"You are the front-desk assistant for {studio}, a photography studio. Answer the customer's question in two or three warm, plain sentences. Use only the facts below; if the answer is not there, say you will check with the team. Do not invent prices, dates or policies.

Studio facts:
- Opening hours: {open} to {close}
- Packages:
{packages}"#;

const UNAVAILABLE_REPLY: &str =
    "Thanks for your question! Let me check with the team and get back to you shortly.";

static FAQ_PATTERNS: LazyLock<PatternSet> = LazyLock::new(|| {
    patterns(&[
        // permission
        r"(?i)\b(can|may|could) (i|we)\b",
        r"(?i)\b(am i|are we) allowed\b",
        r"(?i)\bis it (ok|okay|fine|possible)\b",
        // family and partners
        r"(?i)\bmy (husband|wife|partner|boyfriend|girlfriend|fianc[eé]e?|kids?|children|baby|son|daughter|mum|mom|mother|dad|father|family|friends?)\b",
        // open questions
        r"(?i)^\s*(what|how|when|why|where|who|which|do|does|is|are)\b",
        // backdrops and portfolio
        r"(?i)\b(backdrops?|background|portfolio|samples?|previous (work|shoots)|examples? of your)\b",
        // business information
        r"(?i)\b(location|address|located|directions|parking|opening hours|open on|contact|instagram page|website)\b",
        r"\?",
    ])
});

static PRICING: LazyLock<PatternSet> = LazyLock::new(|| {
    patterns(&[
        r"(?i)\b(how much|price|prices|pricing|cost|costs|rates?|packages?|deposit|what do you offer)\b",
    ])
});

static CANCELLATION: LazyLock<PatternSet> =
    LazyLock::new(|| patterns(&[r"(?i)\b(cancel|cancell?ation|call (it|this) off)\b"]));

static BRINGING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:bring|bringing|come with|coming with|accompanied by|tag along)\b.{0,40}?\b((?:my|our|a|an|some|the)\s+)?(husband|wife|partner|boyfriend|girlfriend|fianc[eé]e?|kids?|children|child|baby|babies|son|daughter|mum|mom|mother|dad|father|family|friends?|dog|puppy|cat|pets?|props?|balloons?|flowers|cake|outfits?)\b",
    )
    .unwrap()
});

pub fn can_handle(ctx: &TurnContext<'_>) -> bool {
    let text = ctx.message;
    let candidate = matches!(ctx.assessment.primary_intent, Intent::Faq | Intent::Greeting)
        || matches_any(&FAQ_PATTERNS, text);
    if !candidate {
        return false;
    }

    let pricing = matches_any(&PRICING, text) || !catalog::mentioned_packages(text, ctx.packages).is_empty();
    let starts_booking = matches_any(&BOOKING_START, text);
    let cancels = ctx.assessment.primary_intent == Intent::Cancellation || matches_any(&CANCELLATION, text);

    !(pricing || starts_booking || cancels || ctx.continues_draft_with_date_or_time())
}

pub async fn generate_response(ctx: &TurnContext<'_>) -> anyhow::Result<Option<StrategyResponse>> {
    note_external_guests(ctx).await;

    if ctx.assessment.primary_intent == Intent::Greeting && !ctx.message.contains('?') {
        return Ok(Some(StrategyResponse::canned(greeting(ctx), "greeting")));
    }

    let active = ctx
        .state
        .db
        .call(|conn| queries::list_faq_entries(conn, Some(FaqEntryStatus::Active)))?;
    if let Some(entry) = best_kb_match(ctx.message, &active) {
        tracing::info!(customer = %ctx.customer.id, entry = entry.id, "answered from knowledge base");
        return Ok(Some(StrategyResponse::canned(entry.answer.clone(), "kb_answer")));
    }

    let system = format!("{}{}", answer_prompt(ctx), ctx.memory.to_prompt());
    let start = ctx.history.len().saturating_sub(ANSWER_HISTORY);
    let mut messages: Vec<Message> = ctx.history[start..].iter().map(Message::from).collect();
    messages.push(Message::user(ctx.message));

    match ctx.llm.chat(&system, &messages).await {
        Ok(response) => Ok(Some(StrategyResponse {
            reply: response.content.trim().to_string(),
            draft: super::DraftUpdate::Unchanged,
            action: Some("faq_answer"),
            generated: true,
        })),
        Err(e) => {
            tracing::warn!(customer = %ctx.customer.id, error = %e, "faq answer unavailable");
            Ok(Some(StrategyResponse::canned(UNAVAILABLE_REPLY, "faq_unavailable")))
        }
    }
}

fn greeting(ctx: &TurnContext<'_>) -> String {
    let name = ctx
        .customer
        .display_name
        .as_deref()
        .map(|n| format!(" {n}"))
        .unwrap_or_default();
    format!(
        "Hi{name}! Welcome to {}. I can tell you about our packages, answer questions, or help you book a session. What would you like to do?",
        ctx.state.config.studio_name
    )
}

fn answer_prompt(ctx: &TurnContext<'_>) -> String {
    let packages: Vec<String> = ctx.packages.iter().map(|p| p.summary_line()).collect();
    ANSWER_PROMPT
        .replace("{studio}", &ctx.state.config.studio_name)
        .replace("{open}", &ctx.state.config.business_open.format("%H:%M").to_string())
        .replace("{close}", &ctx.state.config.business_close.format("%H:%M").to_string())
        .replace("{packages}", &packages.join("\n"))
}

fn words(text: &str) -> BTreeSet<String> {
    normalize_question(text)
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

fn best_kb_match<'a>(message: &str, entries: &'a [FaqEntry]) -> Option<&'a FaqEntry> {
    let asked = words(message);
    if asked.is_empty() {
        return None;
    }
    entries
        .iter()
        .map(|entry| {
            let known = words(&entry.question);
            let shared = asked.intersection(&known).count() as f64;
            let union = asked.union(&known).count() as f64;
            (entry, if union > 0.0 { shared / union } else { 0.0 })
        })
        .filter(|(_, overlap)| *overlap >= KB_MATCH_THRESHOLD)
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(entry, _)| entry)
}

async fn note_external_guests(ctx: &TurnContext<'_>) {
    let Some(caps) = BRINGING.captures(ctx.message) else {
        return;
    };
    let who = caps.get(2).map(|m| m.as_str()).unwrap_or_default().to_lowercase();
    let note = format!("Customer plans to bring: {who} (\"{}\")", ctx.message.trim());

    if let Err(e) = ctx
        .state
        .db
        .call(|conn| queries::insert_session_note(conn, &ctx.customer.id, &note))
    {
        tracing::error!(customer = %ctx.customer.id, error = %e, "failed to save session note");
    }

    escalation::alert(
        ctx.state.notifier.as_ref(),
        &EscalationAlert {
            customer_id: ctx.customer.id.clone(),
            kind: EscalationType::AutoDetected,
            title: "Session note added".to_string(),
            description: note.clone(),
            metadata: serde_json::json!({ "bringing": who }),
        },
    )
    .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Intent;
    use crate::services::ai::testing::ScriptedLlm;
    use crate::services::strategies::testing::Fixture;
    use crate::services::strategies::DraftUpdate;

    fn answering(reply: &str) -> Box<ScriptedLlm> {
        Box::new(ScriptedLlm::new(vec![("front-desk assistant", reply)]))
    }

    #[test]
    fn test_can_handle_questions_but_not_pricing_or_booking() {
        let fx = Fixture::new(Box::new(ScriptedLlm::failing()));
        assert!(can_handle(&fx.ctx("Can I bring my husband?")));
        assert!(can_handle(&fx.ctx("Where are you located")));
        assert!(can_handle(&fx.ctx("Do you have a pink backdrop?")));
        assert!(!can_handle(&fx.ctx("How much is the gold package?")));
        assert!(!can_handle(&fx.ctx("Can I book for Saturday?")));
        assert!(!can_handle(&fx.ctx("I want to cancel")));
        assert!(!can_handle(&fx.ctx("sounds good")));
    }

    #[test]
    fn test_date_continuation_with_active_draft_is_not_faq() {
        let mut fx = Fixture::new(Box::new(ScriptedLlm::failing()));
        let mut draft = crate::models::BookingDraft::new(&fx.customer.id);
        draft.service = Some("Gold Package".to_string());
        draft.advance();
        fx.draft = Some(draft);
        assert!(!can_handle(&fx.ctx("is saturday at 3pm ok?")));
    }

    #[tokio::test]
    async fn test_answer_comes_from_model() {
        let fx = Fixture::new(answering("Yes, partners are very welcome to join the session."));
        let response = generate_response(&fx.ctx("Can my partner come along?")).await.unwrap().unwrap();
        assert!(response.generated);
        assert_eq!(response.action, Some("faq_answer"));
        assert_eq!(response.draft, DraftUpdate::Unchanged);
        assert!(response.reply.contains("partners"));
    }

    #[tokio::test]
    async fn test_guest_note_is_saved_even_when_answer_fails() {
        let fx = Fixture::new(Box::new(ScriptedLlm::failing()));
        let response = generate_response(&fx.ctx("Is it ok if I bring my dog to the shoot?"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(response.action, Some("faq_unavailable"));

        let notes = fx
            .state
            .db
            .call(|conn| queries::get_session_notes(conn, &fx.customer.id))
            .unwrap();
        assert_eq!(notes.len(), 1);
        assert!(notes[0].note.contains("dog"));
    }

    #[tokio::test]
    async fn test_active_kb_entry_answers_first() {
        let llm = ScriptedLlm::failing();
        let fx = Fixture::new(Box::new(llm));
        fx.state
            .db
            .call(|conn| {
                queries::upsert_faq_suggestion(conn, "do you have parking", "Yes, free parking behind the studio.", 4, 1.0)?;
                let id = queries::list_faq_entries(conn, None)?[0].id;
                queries::activate_faq_entry(conn, id, None)
            })
            .unwrap();

        let response = generate_response(&fx.ctx("Do you have parking?")).await.unwrap().unwrap();
        assert_eq!(response.action, Some("kb_answer"));
        assert_eq!(response.reply, "Yes, free parking behind the studio.");
        assert!(!response.generated);
    }

    #[tokio::test]
    async fn test_greeting_is_canned() {
        let mut fx = Fixture::new(Box::new(ScriptedLlm::failing()));
        fx.assessment.primary_intent = Intent::Greeting;
        let response = generate_response(&fx.ctx("hello there")).await.unwrap().unwrap();
        assert_eq!(response.action, Some("greeting"));
        assert!(response.reply.starts_with("Hi Ada!"));
    }
}

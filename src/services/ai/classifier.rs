use chrono::NaiveDate;

use crate::errors::{Degraded, DegradedResult};
use crate::models::{IntentAssessment, Intent};
use crate::services::ai::heuristics;
use crate::services::ai::{parse_json_reply, LlmProvider, Message};

const SYSTEM_PROMPT: &str = r#"You are the intent classifier for a photography studio's booking assistant. Read the customer's latest message and describe it.

Return ONLY valid JSON (no markdown, no explanation) with this exact structure:
{
  "primary_intent": "booking|package_inquiry|faq|greeting|payment|cancellation|complaint|human_request|unknown",
  "secondary_intents": [],
  "confidence": 0.0,
  "emotional_tone": "positive|excited|neutral|confused|anxious|frustrated|angry",
  "urgency_level": "low|medium|high|critical",
  "complexity": "simple|moderate|complex",
  "requires_human_handoff": false
}

Intent rules:
- "booking": wants to book, pick a date/time, or continues giving booking details
- "package_inquiry": asks about packages, prices, deposits or what a package includes
- "faq": asks about policies, location, what to bring, backdrops, the portfolio
- "payment": talks about paying a deposit or sending a receipt
- "cancellation": wants to cancel a booking or booking request
- "complaint": unhappy with the service
- "human_request": asks for a person
"#;

// Two-shot examples sent ahead of the real message.
const EXAMPLE_ONE_USER: &str = "Hi! How much is the gold package and does it include makeup?";
const EXAMPLE_ONE_REPLY: &str = r#"{"primary_intent":"package_inquiry","secondary_intents":["faq"],"confidence":0.92,"emotional_tone":"positive","urgency_level":"low","complexity":"moderate","requires_human_handoff":false}"#;
const EXAMPLE_TWO_USER: &str = "I've messaged three times and nobody has confirmed my booking for tomorrow.";
const EXAMPLE_TWO_REPLY: &str = r#"{"primary_intent":"complaint","secondary_intents":["booking"],"confidence":0.88,"emotional_tone":"frustrated","urgency_level":"high","complexity":"moderate","requires_human_handoff":true}"#;

pub async fn classify(
    llm: &dyn LlmProvider,
    message: &str,
    conversation_length: usize,
    personalization: Option<&str>,
    today: NaiveDate,
) -> DegradedResult<IntentAssessment> {
    let system = format!("{SYSTEM_PROMPT}{}", personalization.unwrap_or_default());
    let messages = [
        Message::user(EXAMPLE_ONE_USER),
        Message::assistant(EXAMPLE_ONE_REPLY),
        Message::user(EXAMPLE_TWO_USER),
        Message::assistant(EXAMPLE_TWO_REPLY),
        Message::user(message),
    ];

    let outcome = match llm.chat(&system, &messages).await {
        Ok(response) => parse_json_reply::<IntentAssessment>(&response.content)
            .ok_or_else(|| "classifier returned malformed JSON".to_string()),
        Err(e) => Err(format!("classifier call failed: {e}")),
    };

    match outcome {
        Ok(mut assessment) => {
            assessment.confidence = assessment.confidence.clamp(0.0, 1.0);
            // the model may under-read time pressure, never lower it
            assessment.urgency_level = assessment
                .urgency_level
                .max(heuristics::estimate_urgency(message, today));
            assessment.complexity = assessment
                .complexity
                .max(heuristics::estimate_complexity(message));
            apply_safety_triggers(&mut assessment, message, conversation_length);
            Ok(assessment)
        }
        Err(reason) => {
            tracing::warn!(reason = %reason, "intent classification degraded");
            let mut fallback = IntentAssessment {
                emotional_tone: heuristics::estimate_tone(message),
                urgency_level: heuristics::estimate_urgency(message, today),
                complexity: heuristics::estimate_complexity(message),
                ..IntentAssessment::default()
            };
            apply_safety_triggers(&mut fallback, message, conversation_length);
            Err(Degraded::new(fallback, reason))
        }
    }
}

fn apply_safety_triggers(
    assessment: &mut IntentAssessment,
    message: &str,
    conversation_length: usize,
) {
    let fired = heuristics::handoff_triggers(message, assessment.emotional_tone, conversation_length);
    if fired.is_empty() {
        return;
    }

    if fired.iter().any(|r| r == "explicit_human_request")
        && !assessment.has_intent(Intent::HumanRequest)
    {
        if assessment.primary_intent == Intent::Unknown {
            assessment.primary_intent = Intent::HumanRequest;
        } else {
            assessment.secondary_intents.push(Intent::HumanRequest);
        }
    }

    tracing::info!(triggers = ?fired, "human handoff forced");
    assessment.requires_human_handoff = true;
    assessment.handoff_reasons = fired;
}

use std::sync::atomic::Ordering;

use chrono::{Duration, NaiveDateTime, Utc};
use serde::Serialize;

use crate::db::queries;
use crate::models::{
    BookingDraft, Channel, Conversation, ConversationMessage, Customer, EmotionalTone,
    Complexity, EscalationType, Intent, IntentAssessment, UrgencyLevel,
};
use crate::services::ai::{classifier, MeteredLlm, TokenUsage};
use crate::services::escalation::{self, EscalationRequest};
use crate::services::learning::{self, TurnRecord};
use crate::services::quality::{self, QualityContext};
use crate::services::strategies::{self, DraftUpdate, TurnContext};
use crate::services::{catalog, memory};
use crate::state::AppState;

const CONVERSATION_TTL_HOURS: i64 = 24;

const HANDOFF_REPLY: &str = "Thanks for your patience. I've passed your message to our team and someone will get back to you shortly.";
const FALLBACK_REPLY: &str = "Thanks for your message! Let me check with the team and get back to you shortly.";

#[derive(Debug, Clone, Serialize)]
pub struct QualitySummary {
    pub passed: bool,
    pub reason: Option<String>,
    pub overall: Option<f64>,
    pub improved: bool,
    pub degraded: bool,
    pub flags: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TurnTrace {
    pub customer_id: String,
    pub intent: Intent,
    pub confidence: f64,
    pub emotional_tone: EmotionalTone,
    pub urgency_level: UrgencyLevel,
    pub complexity: Complexity,
    pub classifier_degraded: bool,
    pub handoff_reasons: Vec<String>,
    pub strategy: Option<&'static str>,
    pub action: Option<&'static str>,
    pub quality: Option<QualitySummary>,
    pub escalated: bool,
    pub usage: TokenUsage,
}

impl TurnTrace {
    fn new(customer_id: &str) -> Self {
        Self {
            customer_id: customer_id.to_string(),
            intent: Intent::Unknown,
            confidence: 0.0,
            emotional_tone: EmotionalTone::Neutral,
            urgency_level: UrgencyLevel::Low,
            complexity: Complexity::Simple,
            classifier_degraded: false,
            handoff_reasons: Vec::new(),
            strategy: None,
            action: None,
            quality: None,
            escalated: false,
            usage: TokenUsage::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TurnResult {
    pub reply: Option<String>,
    pub trace: TurnTrace,
}

struct Outgoing {
    text: String,
    tag: Option<&'static str>,
    draft: DraftUpdate,
    success: bool,
}

// Turns for the same sender are serialized.
pub async fn process_message(
    state: &AppState,
    channel: Channel,
    sender_id: &str,
    text: &str,
    sender_name: Option<&str>,
) -> anyhow::Result<TurnResult> {
    let _ticket = state.queue.acquire(&format!("{}:{}", channel.as_str(), sender_id)).await;

    let customer = state.db.call(|conn| {
        let customer = queries::resolve_customer(conn, channel, sender_id, sender_name)?;
        queries::touch_customer(conn, &customer.id, sender_name)?;
        Ok(customer)
    })?;
    let mut trace = TurnTrace::new(&customer.id);

    let now = Utc::now().naive_utc();
    let mut conv = state
        .db
        .call(|conn| queries::get_conversation(conn, &customer.id))?
        .unwrap_or_else(|| new_conversation(&customer.id, now));
    let history = conv.messages.clone();
    conv.messages.push(ConversationMessage::user(text));
    conv.last_activity = now;
    conv.expires_at = now + Duration::hours(CONVERSATION_TTL_HOURS);

    if state.paused.load(Ordering::Relaxed) || !customer.accepts_ai_replies() {
        tracing::info!(customer = %customer.id, channel = channel.as_str(), "replies paused, message stored only");
        conv.trim_history();
        state.db.call(|conn| queries::save_conversation(conn, &conv))?;
        return Ok(TurnResult { reply: None, trace });
    }

    let profile = state.db.call(|conn| memory::load(conn, &customer.id))?;
    let draft = state.db.call(|conn| queries::get_draft(conn, &customer.id))?;
    let packages = state.catalog.packages(&state.db)?;
    let metered = MeteredLlm::new(state.llm.as_ref());

    let length = conv.user_turns();
    let personalization = profile.to_prompt();
    let assessment = match classifier::classify(&metered, text, length, Some(&personalization), now.date()).await {
        Ok(assessment) => assessment,
        Err(degraded) => {
            trace.classifier_degraded = true;
            degraded.fallback
        }
    };
    trace.intent = assessment.primary_intent;
    trace.confidence = assessment.confidence;
    trace.emotional_tone = assessment.emotional_tone;
    trace.urgency_level = assessment.urgency_level;
    trace.complexity = assessment.complexity;
    trace.handoff_reasons = assessment.handoff_reasons.clone();

    tracing::info!(
        customer = %customer.id,
        channel = channel.as_str(),
        intent = assessment.primary_intent.as_str(),
        confidence = assessment.confidence,
        tone = assessment.emotional_tone.as_str(),
        urgency = assessment.urgency_level.as_str(),
        handoff = assessment.requires_human_handoff,
        "message classified"
    );

    let outgoing = if assessment.requires_human_handoff {
        let reason = if assessment.handoff_reasons.is_empty() {
            "classifier requested a human".to_string()
        } else {
            assessment.handoff_reasons.join(", ")
        };
        trace.escalated = open_escalation(state, &customer, EscalationType::AutoDetected, &reason, &assessment, text).await;
        trace.action = Some("handoff");
        Outgoing {
            text: HANDOFF_REPLY.to_string(),
            tag: Some("handoff"),
            draft: DraftUpdate::Unchanged,
            success: true,
        }
    } else {
        let ctx = TurnContext {
            state,
            llm: &metered,
            customer: &customer,
            channel,
            sender_id,
            message: text,
            assessment: &assessment,
            history: &history,
            draft: draft.as_ref(),
            memory: &profile,
            packages: &packages,
            today: now.date(),
        };
        let routed = match strategies::route(&ctx).await {
            Ok(routed) => routed,
            Err(e) => {
                record_learning(state, &customer, text, "", &assessment, false, draft.as_ref(), true, length, conv.started_at);
                return Err(e.context("strategy failed to produce a reply"));
            }
        };
        trace.strategy = routed.strategy.map(|s| s.name());
        trace.action = routed.response.action;

        let mut outgoing = Outgoing {
            text: routed.response.reply.clone(),
            tag: trace.strategy,
            draft: routed.response.draft.clone(),
            success: true,
        };

        if state.config.quality_gate_enabled {
            let quality_ctx = QualityContext {
                user_message: text,
                customer_id: &customer.id,
                intent: assessment.primary_intent,
                emotional_tone: assessment.emotional_tone,
                history: &history,
            };
            let verdict = quality::validate(&metered, &routed.response.reply, &quality_ctx, routed.response.generated).await;
            trace.quality = Some(QualitySummary {
                passed: verdict.passed,
                reason: verdict.reason.clone(),
                overall: verdict.score.map(|s| s.overall()),
                improved: verdict.improved,
                degraded: verdict.degraded,
                flags: verdict.flags.clone(),
            });

            if verdict.should_escalate {
                let reason = verdict
                    .reason
                    .clone()
                    .unwrap_or_else(|| "reply quality below escalation threshold".to_string());
                trace.escalated = open_escalation(state, &customer, EscalationType::AiEscalation, &reason, &assessment, text).await;
                outgoing.text = HANDOFF_REPLY.to_string();
                outgoing.success = false;
            } else if !verdict.passed && verdict.score.is_none() {
                // rejected before scoring; nothing worth sending
                outgoing.text = FALLBACK_REPLY.to_string();
                outgoing.success = false;
            } else {
                outgoing.success = verdict.passed;
                outgoing.text = verdict.response;
            }
        }
        outgoing
    };

    let final_draft = match &outgoing.draft {
        DraftUpdate::Save(updated) => {
            state.db.call(|conn| queries::save_draft(conn, updated))?;
            tracing::info!(customer = %customer.id, step = updated.step.as_str(), "draft saved");
            Some(updated.clone())
        }
        DraftUpdate::Discard => {
            state.db.call(|conn| queries::delete_draft(conn, &customer.id))?;
            None
        }
        DraftUpdate::Unchanged => draft.clone(),
    };

    conv.messages.push(ConversationMessage::assistant(&outgoing.text, outgoing.tag));
    conv.trim_history();
    state.db.call(|conn| queries::save_conversation(conn, &conv))?;

    record_learning(
        state,
        &customer,
        text,
        &outgoing.text,
        &assessment,
        outgoing.success,
        final_draft.as_ref(),
        false,
        length,
        conv.started_at,
    );
    update_memory(state, &conv, text, &outgoing.text, &assessment, final_draft.as_ref(), &packages);

    trace.usage = metered.usage();
    if let Err(e) = state.db.call(|conn| {
        queries::add_token_usage(conn, &customer.id, trace.usage.prompt_tokens, trace.usage.completion_tokens)
    }) {
        tracing::error!(customer = %customer.id, error = %e, "failed to record token usage");
    }

    tracing::info!(
        customer = %customer.id,
        strategy = ?trace.strategy,
        action = ?trace.action,
        escalated = trace.escalated,
        prompt_tokens = trace.usage.prompt_tokens,
        completion_tokens = trace.usage.completion_tokens,
        "turn complete"
    );
    Ok(TurnResult {
        reply: Some(outgoing.text),
        trace,
    })
}

fn new_conversation(customer_id: &str, now: NaiveDateTime) -> Conversation {
    Conversation {
        customer_id: customer_id.to_string(),
        messages: Vec::new(),
        started_at: now,
        last_activity: now,
        expires_at: now + Duration::hours(CONVERSATION_TTL_HOURS),
    }
}

async fn open_escalation(
    state: &AppState,
    customer: &Customer,
    kind: EscalationType,
    reason: &str,
    assessment: &IntentAssessment,
    text: &str,
) -> bool {
    let request = EscalationRequest {
        customer_id: &customer.id,
        kind,
        reason,
        sentiment: Some(assessment.emotional_tone.satisfaction()),
        metadata: serde_json::json!({
            "message": text,
            "intent": assessment.primary_intent.as_str(),
            "triggers": assessment.handoff_reasons,
            "customer_name": customer.display_name,
        }),
    };
    match escalation::raise(&state.db, state.notifier.as_ref(), request).await {
        Ok(_) => true,
        Err(e) => {
            tracing::error!(customer = %customer.id, error = %e, "failed to open escalation");
            false
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn record_learning(
    state: &AppState,
    customer: &Customer,
    text: &str,
    reply: &str,
    assessment: &IntentAssessment,
    success: bool,
    draft: Option<&BookingDraft>,
    failed: bool,
    length: usize,
    started: NaiveDateTime,
) {
    let turn = TurnRecord {
        customer_id: &customer.id,
        user_message: text,
        reply,
        assessment,
        success: success && !failed,
        outcome: learning::classify_outcome(draft, assessment.primary_intent, failed),
        conversation_length: length,
        conversation_started: started,
    };
    if let Err(e) = state.db.call(|conn| learning::record_turn(conn, &turn)) {
        tracing::error!(customer = %customer.id, error = %e, "failed to record learning entry");
    }
}

fn update_memory(
    state: &AppState,
    conv: &Conversation,
    text: &str,
    reply: &str,
    assessment: &IntentAssessment,
    draft: Option<&BookingDraft>,
    packages: &[crate::models::Package],
) {
    let user_messages: Vec<&ConversationMessage> = conv.messages.iter().filter(|m| !m.is_assistant()).collect();
    let average_message_chars = if user_messages.is_empty() {
        0.0
    } else {
        user_messages.iter().map(|m| m.content.chars().count()).sum::<usize>() as f64 / user_messages.len() as f64
    };
    let mentioned = catalog::mentioned_packages(text, packages);

    let result = state.db.call(|conn| {
        let mut profile = memory::load(conn, &conv.customer_id)?;
        memory::observe_turn(
            &mut profile,
            &memory::TurnObservation {
                message: text,
                reply,
                assessment,
                draft,
                mentioned: &mentioned,
                average_message_chars,
            },
        );
        queries::save_memory(conn, &profile)
    });
    if let Err(e) = result {
        tracing::error!(customer = %conv.customer_id, error = %e, "failed to update customer memory");
    }
}

use chrono::Utc;
use rusqlite::Connection;

use crate::db::queries;
use crate::models::memory::{BudgetRange, ConversationSummary};
use crate::models::{
    BookingDraft, CommunicationStyle, CustomerMemory, Intent, IntentAssessment, Package,
    RelationshipStage, TimeOfDay,
};

pub fn load(conn: &Connection, customer_id: &str) -> anyhow::Result<CustomerMemory> {
    Ok(queries::get_memory(conn, customer_id)?.unwrap_or_else(|| CustomerMemory::new(customer_id)))
}

pub struct TurnObservation<'a> {
    pub message: &'a str,
    pub reply: &'a str,
    pub assessment: &'a IntentAssessment,
    pub draft: Option<&'a BookingDraft>,
    pub mentioned: &'a [&'a Package],
    pub average_message_chars: f64,
}

pub fn observe_turn(memory: &mut CustomerMemory, turn: &TurnObservation<'_>) {
    for package in turn.mentioned {
        memory.preferred_packages.insert(package.name.clone());
        memory.budget = Some(BudgetRange::widen(memory.budget, package.price));
    }
    if let Some(draft) = turn.draft {
        if let Some(service) = &draft.service {
            memory.preferred_packages.insert(service.clone());
        }
        if let Some(time) = draft.time {
            memory.preferred_times.insert(TimeOfDay::of(time));
        }
    }

    memory.style = CommunicationStyle::infer(turn.average_message_chars);
    memory.record_satisfaction(turn.assessment.emotional_tone.satisfaction());

    let showed_interest = turn.assessment.has_intent(Intent::Booking)
        || turn.assessment.has_intent(Intent::PackageInquiry)
        || !turn.mentioned.is_empty();
    if showed_interest {
        memory.stage = memory.stage.advanced_to(RelationshipStage::Interested);
    }

    memory.push_summary(ConversationSummary {
        at: Utc::now().naive_utc(),
        intent: turn.assessment.primary_intent.as_str().to_string(),
        summary: summarize(turn.message, turn.reply),
    });
}

fn summarize(message: &str, reply: &str) -> String {
    let clip = |s: &str, n: usize| -> String {
        let mut out: String = s.chars().take(n).collect();
        if s.chars().count() > n {
            out.push('…');
        }
        out
    };
    format!("Customer: {} / Studio: {}", clip(message, 80), clip(reply, 80))
}

pub fn apply_booking_history(
    memory: &mut CustomerMemory,
    confirmed_bookings: i64,
    confirmed_spend: f64,
    vip_threshold: f64,
) -> bool {
    let before = (memory.stage, memory.lifetime_value);

    memory.lifetime_value = confirmed_spend;
    let earned = if confirmed_spend >= vip_threshold {
        RelationshipStage::Vip
    } else if confirmed_bookings >= 2 {
        RelationshipStage::Returning
    } else if confirmed_bookings >= 1 {
        RelationshipStage::Booked
    } else if !memory.preferred_packages.is_empty() || !memory.summaries.is_empty() {
        RelationshipStage::Interested
    } else {
        RelationshipStage::New
    };
    memory.stage = memory.stage.advanced_to(earned);

    before != (memory.stage, memory.lifetime_value)
}

pub fn refresh_from_bookings(
    conn: &Connection,
    customer_id: &str,
    vip_threshold: f64,
) -> anyhow::Result<CustomerMemory> {
    let mut memory = load(conn, customer_id)?;
    let (count, spend) = queries::confirmed_spend(conn, customer_id)?;
    if apply_booking_history(&mut memory, count, spend, vip_threshold) {
        tracing::info!(
            customer = %customer_id,
            stage = memory.stage.as_str(),
            lifetime_value = memory.lifetime_value,
            "customer memory promoted"
        );
        queries::save_memory(conn, &memory)?;
    }
    Ok(memory)
}

// The only path that may move a stage backwards.
pub fn override_stage(
    conn: &Connection,
    customer_id: &str,
    stage: RelationshipStage,
) -> anyhow::Result<bool> {
    let Some(mut memory) = queries::get_memory(conn, customer_id)? else {
        return Ok(false);
    };
    memory.stage = stage;
    queries::save_memory(conn, &memory)?;
    tracing::info!(customer = %customer_id, stage = stage.as_str(), "stage overridden by operator");
    Ok(true)
}

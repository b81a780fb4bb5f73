use std::collections::BTreeMap;

use chrono::{NaiveDateTime, Utc};
use rusqlite::Connection;
use serde::Serialize;

use crate::db::queries;
use crate::models::{
    BookingDraft, ConversationLearningRecord, DraftStep, Intent, IntentAssessment, IntentPattern,
    TurnOutcome,
};
use crate::services::memory;

const FAQ_MIN_SUCCESS_RATE: f64 = 0.8;
const MAX_FAILURE_REASONS: usize = 3;

pub fn normalize_question(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() || c.is_whitespace() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

// Errors first, then drafts that reached the deposit step, then the intent.
pub fn classify_outcome(draft: Option<&BookingDraft>, intent: Intent, failed: bool) -> TurnOutcome {
    if failed {
        return TurnOutcome::Error;
    }
    if draft.is_some_and(|d| matches!(d.step, DraftStep::ConfirmDeposit | DraftStep::Confirmed)) {
        return TurnOutcome::BookingInitiated;
    }
    match intent {
        Intent::Booking => TurnOutcome::BookingInProgress,
        Intent::PackageInquiry => TurnOutcome::InformationProvided,
        _ => TurnOutcome::Resolved,
    }
}

pub struct TurnRecord<'a> {
    pub customer_id: &'a str,
    pub user_message: &'a str,
    pub reply: &'a str,
    pub assessment: &'a IntentAssessment,
    pub success: bool,
    pub outcome: TurnOutcome,
    pub conversation_length: usize,
    pub conversation_started: NaiveDateTime,
}

pub fn record_turn(conn: &Connection, turn: &TurnRecord<'_>) -> anyhow::Result<i64> {
    let now = Utc::now().naive_utc();
    let record = ConversationLearningRecord {
        id: 0,
        customer_id: turn.customer_id.to_string(),
        user_message: turn.user_message.to_string(),
        reply: turn.reply.to_string(),
        intent: turn.assessment.primary_intent,
        emotional_tone: turn.assessment.emotional_tone,
        success: turn.success,
        outcome: turn.outcome,
        conversation_length: turn.conversation_length as i64,
        resolution_secs: (now - turn.conversation_started).num_seconds().max(0),
        kb_flagged: false,
        created_at: now,
    };
    queries::insert_learning_record(conn, &record)
}

fn length_bucket(conversation_length: i64) -> &'static str {
    match conversation_length {
        ..=3 => "failed early in the conversation (1-3 turns)",
        4..=10 => "failed mid-conversation (4-10 turns)",
        _ => "failed in a long conversation (over 10 turns)",
    }
}

pub fn analyze_patterns(conn: &Connection) -> anyhow::Result<Vec<IntentPattern>> {
    let records = queries::list_learning_records(conn, None)?;

    let mut by_intent: BTreeMap<&'static str, Vec<&ConversationLearningRecord>> = BTreeMap::new();
    for record in &records {
        by_intent.entry(record.intent.as_str()).or_default().push(record);
    }

    let mut patterns: Vec<IntentPattern> = by_intent
        .into_values()
        .map(|group| {
            let total = group.len();
            let successes = group.iter().filter(|r| r.success).count();
            let resolution: i64 = group.iter().map(|r| r.resolution_secs).sum();

            let mut reasons: BTreeMap<&'static str, usize> = BTreeMap::new();
            for r in group.iter().filter(|r| !r.success) {
                *reasons.entry(length_bucket(r.conversation_length)).or_default() += 1;
            }
            let mut reasons: Vec<(&'static str, usize)> = reasons.into_iter().collect();
            reasons.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));

            IntentPattern {
                intent: group[0].intent,
                total,
                success_rate: successes as f64 / total as f64,
                average_resolution_secs: resolution as f64 / total as f64,
                common_failure_reasons: reasons
                    .into_iter()
                    .take(MAX_FAILURE_REASONS)
                    .map(|(r, _)| r.to_string())
                    .collect(),
            }
        })
        .collect();
    patterns.sort_by(|a, b| b.total.cmp(&a.total));
    Ok(patterns)
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FaqMiningReport {
    pub examined: usize,
    pub suggested: Vec<String>,
    pub new_entries: usize,
}

pub fn mine_faqs(conn: &Connection, min_occurrences: usize) -> anyhow::Result<FaqMiningReport> {
    let records = queries::list_learning_records(conn, Some(Intent::Faq))?;
    let mut report = FaqMiningReport {
        examined: records.len(),
        ..Default::default()
    };

    let mut groups: BTreeMap<String, Vec<&ConversationLearningRecord>> = BTreeMap::new();
    for record in &records {
        let question = normalize_question(&record.user_message);
        if !question.is_empty() {
            groups.entry(question).or_default().push(record);
        }
    }

    for (question, group) in groups {
        if group.len() < min_occurrences.max(1) {
            continue;
        }
        let successes = group.iter().filter(|r| r.success).count();
        let rate = successes as f64 / group.len() as f64;
        if rate <= FAQ_MIN_SUCCESS_RATE {
            continue;
        }
        let Some(answer) = group.iter().rev().find(|r| r.success).map(|r| r.reply.clone()) else {
            continue;
        };

        if queries::upsert_faq_suggestion(conn, &question, &answer, group.len() as i64, rate)? {
            report.new_entries += 1;
        }
        let ids: Vec<i64> = group.iter().map(|r| r.id).collect();
        queries::flag_learning_records(conn, &ids)?;
        tracing::info!(question = %question, occurrences = group.len(), success_rate = rate, "faq entry suggested");
        report.suggested.push(question);
    }
    Ok(report)
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MaintenanceReport {
    pub examined: usize,
    pub promoted: usize,
}

pub fn maintain_memories(conn: &Connection, vip_threshold: f64) -> anyhow::Result<MaintenanceReport> {
    let memories = queries::list_memories(conn)?;
    let mut report = MaintenanceReport {
        examined: memories.len(),
        promoted: 0,
    };
    for mut profile in memories {
        let (count, spend) = queries::confirmed_spend(conn, &profile.customer_id)?;
        if memory::apply_booking_history(&mut profile, count, spend, vip_threshold) {
            queries::save_memory(conn, &profile)?;
            report.promoted += 1;
        }
    }
    tracing::info!(examined = report.examined, promoted = report.promoted, "memory maintenance finished");
    Ok(report)
}

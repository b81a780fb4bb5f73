use std::sync::LazyLock;

use regex::Regex;

use crate::db::queries;
use crate::errors::Settle;
use crate::models::{BookingDraft, BookingExtraction, DraftField, DraftStep, Intent};
use crate::services::ai::extraction;
use crate::services::availability::{format_alternatives, Availability, AvailabilityError};
use crate::services::catalog;
use crate::services::drafts::{self, PromotionError};

use super::{matches_any, patterns, DraftUpdate, PatternSet, StrategyResponse, TurnContext, BOOKING_START};

static ACKNOWLEDGEMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*(?:(?:ok(?:ay)?|sure|alright|cool|great|nice|thanks|thank you|noted|got it|sounds good|will do|perfect)\b[\s,.!]*)+(?:i'?ll come\b.*|i will come\b.*)?$|^\s*i'?ll come\b.*$",
    )
    .unwrap()
});

static CONFIRM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*(yes,?\s+)?confirm(ed)?\b").unwrap());

static SLOT_CHOICE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*(?:option\s*|number\s*|#)?(\d{1,2})[\s.!)]*$").unwrap());

static CANCEL: LazyLock<PatternSet> =
    LazyLock::new(|| patterns(&[r"(?i)\b(cancel|call (it|this) off|never ?mind)\b"]));

static EDIT_REQUEST: LazyLock<PatternSet> =
    LazyLock::new(|| patterns(&[r"(?i)\b(change|edit|update|fix|wrong|different)\b"]));

static EDIT_FIELDS: LazyLock<Vec<(Regex, DraftField)>> = LazyLock::new(|| {
    [
        (r"(?i)\b(package|service)\b", DraftField::Service),
        (r"(?i)\b(date|day)\b", DraftField::Date),
        (r"(?i)\btime\b", DraftField::Time),
        (r"(?i)\bname\b", DraftField::Name),
        (r"(?i)\b(phone|number)\b", DraftField::Phone),
    ]
    .into_iter()
    .filter_map(|(p, f)| Regex::new(p).ok().map(|re| (re, f)))
    .collect()
});

pub fn can_handle(ctx: &TurnContext<'_>) -> bool {
    ctx.active_draft().is_some()
        || ctx.assessment.has_intent(Intent::Booking)
        || ctx.assessment.has_intent(Intent::Cancellation)
        || matches_any(&BOOKING_START, ctx.message)
}

pub async fn generate_response(ctx: &TurnContext<'_>) -> anyhow::Result<Option<StrategyResponse>> {
    if is_acknowledgement_after_faq(ctx) {
        tracing::debug!(customer = %ctx.customer.id, "acknowledgement, not a booking turn");
        return Ok(None);
    }

    if ctx.assessment.primary_intent == Intent::Cancellation || matches_any(&CANCEL, ctx.message) {
        return cancel(ctx).await.map(Some);
    }

    let active = ctx.active_draft();

    if let Some(draft) = active.filter(|d| d.step == DraftStep::Review) {
        if CONFIRM.is_match(ctx.message) {
            return confirm(ctx, draft.clone()).await.map(Some);
        }
        if let Some(field) = edit_target(ctx.message) {
            return edit_field(ctx, draft, field).await.map(Some);
        }
    }

    if let Some(draft) = active.filter(|d| !d.offered_slots.is_empty()) {
        if let Some(choice) = SLOT_CHOICE.captures(ctx.message) {
            let mut picked = draft.clone();
            let n: usize = choice[1].parse().unwrap_or(0);
            if !picked.pick_offered(n) {
                return Ok(Some(StrategyResponse::canned(
                    format!(
                        "Please reply with one of the numbers listed:\n{}",
                        format_alternatives(&draft.offered_slots)
                    ),
                    "slot_choice_invalid",
                )));
            }
            return progress(ctx, draft.clone(), picked, None).await.map(Some);
        }
    }

    // booking-start phrasing always opens a fresh draft
    let starts_over = matches_any(&BOOKING_START, ctx.message);
    if let Some(draft) = active.filter(|d| d.step.is_committed()) {
        if !starts_over {
            return awaiting_deposit(ctx, draft).map(Some);
        }
    }

    let base = match active {
        Some(draft) if !starts_over && !draft.step.is_committed() => draft.clone(),
        Some(_) => {
            tracing::info!(customer = %ctx.customer.id, "previous draft set aside for a new booking");
            BookingDraft::new(&ctx.customer.id)
        }
        None => BookingDraft::new(&ctx.customer.id),
    };
    let mut extraction = extract(ctx).await;
    if extraction.phone.is_none() && ctx.channel.identifier_is_phone() {
        extraction.phone = Some(ctx.sender_id.to_string());
    }
    merge_and_progress(ctx, base, extraction).await.map(Some)
}

fn is_acknowledgement_after_faq(ctx: &TurnContext<'_>) -> bool {
    if !ACKNOWLEDGEMENT.is_match(ctx.message) {
        return false;
    }
    ctx.recent_assistant_turns(1)
        .first()
        .is_some_and(|m| m.strategy.as_deref() == Some("faq"))
}

fn edit_target(message: &str) -> Option<DraftField> {
    if !matches_any(&EDIT_REQUEST, message) {
        return None;
    }
    EDIT_FIELDS
        .iter()
        .find(|(re, _)| re.is_match(message))
        .map(|(_, field)| *field)
}

async fn extract(ctx: &TurnContext<'_>) -> BookingExtraction {
    let names: Vec<String> = ctx.packages.iter().map(|p| p.name.clone()).collect();
    let mut extraction = extraction::extract_booking_fields(
        ctx.llm,
        ctx.history,
        ctx.message,
        ctx.today,
        &names,
    )
    .await
    .settle();

    // unknown package names are dropped rather than stored
    let named = extraction.service.as_deref().unwrap_or(ctx.message);
    extraction.service = catalog::resolve_package(named, ctx.packages).map(|p| p.name.clone());

    extraction
}

async fn edit_field(
    ctx: &TurnContext<'_>,
    draft: &BookingDraft,
    field: DraftField,
) -> anyhow::Result<StrategyResponse> {
    let mut reopened = draft.clone();
    reopened.reopen(field);

    let extraction = extract(ctx).await;
    let supplied = match field {
        DraftField::Service => extraction.service.is_some(),
        DraftField::Date => extraction.date.is_some(),
        DraftField::Time => extraction.time.is_some(),
        DraftField::Name => extraction.name.is_some(),
        DraftField::Phone => extraction.phone.is_some(),
    };
    if supplied {
        return merge_and_progress(ctx, reopened, extraction).await;
    }

    Ok(StrategyResponse::canned(
        format!("No problem. {}", reopened.step.prompt()),
        "edit_field",
    )
    .with_draft(DraftUpdate::Save(reopened)))
}

async fn merge_and_progress(
    ctx: &TurnContext<'_>,
    before: BookingDraft,
    extraction: BookingExtraction,
) -> anyhow::Result<StrategyResponse> {
    let mut draft = before.clone();
    let changed = draft.merge(&extraction);
    if !changed.is_empty() {
        tracing::debug!(customer = %ctx.customer.id, changed = ?changed, "draft fields merged");
    }
    progress(ctx, before, draft, Some(&changed)).await
}

async fn progress(
    ctx: &TurnContext<'_>,
    before: BookingDraft,
    mut draft: BookingDraft,
    changed: Option<&[DraftField]>,
) -> anyhow::Result<StrategyResponse> {
    if draft.date.is_some_and(|d| d < ctx.today) {
        draft.reopen(DraftField::Date);
        return Ok(StrategyResponse::canned(
            format!("That date has already passed. {}", draft.step.prompt()),
            "invalid_date",
        )
        .with_draft(DraftUpdate::Save(draft)));
    }

    if let (Some(service), Some(start)) = (draft.service.clone(), draft.start_at()) {
        let duration = ctx
            .packages
            .iter()
            .find(|p| p.name == service)
            .map(|p| p.duration_minutes())
            .unwrap_or(crate::models::package::DEFAULT_DURATION_MINUTES);

        match ctx.state.availability().check(start, duration).await {
            Ok(Availability::Available) => draft.offered_slots.clear(),
            Ok(Availability::Unavailable { alternatives }) => {
                // keep the previous slot; only the offer is new
                draft.date = before.date;
                draft.time = before.time;
                draft.offered_slots = alternatives.clone();
                draft.advance();
                return Ok(unavailable_reply(&service, start, &alternatives)
                    .with_draft(DraftUpdate::Save(draft)));
            }
            Err(AvailabilityError::Storage(e)) => return Err(e),
            Err(e) => {
                tracing::warn!(customer = %ctx.customer.id, error = %e, "slot could not be verified");
                draft.advance();
                return Ok(StrategyResponse::canned(
                    format!(
                        "I couldn't check the studio calendar just now, so I can't promise {} at {} yet. Please try again in a few minutes.",
                        start.format("%A %d %B"),
                        start.format("%H:%M")
                    ),
                    "availability_unverified",
                )
                .with_draft(DraftUpdate::Save(draft)));
            }
        }
    }

    let step = draft.advance();
    let slot_confirmed = draft.has_slot()
        && changed.map_or(true, |c| c.iter().any(|f| matches!(f, DraftField::Date | DraftField::Time | DraftField::Service)));

    let reply = match step {
        DraftStep::Review => format!(
            "Here's your booking:\n{}\n\n{}",
            draft.summary(),
            step.prompt()
        ),
        DraftStep::CollectName if slot_confirmed => {
            format!("Good news, that slot is free! {}", step.prompt())
        }
        DraftStep::CollectService if !ctx.packages.is_empty() => {
            let names: Vec<&str> = ctx.packages.iter().map(|p| p.name.as_str()).collect();
            format!("{} We offer: {}.", step.prompt(), names.join(", "))
        }
        DraftStep::CollectDate | DraftStep::CollectTime => {
            "What date and time would you like to come in?".to_string()
        }
        other => other.prompt().to_string(),
    };

    let action = if step == DraftStep::Review { "review" } else { "collecting" };
    Ok(StrategyResponse::canned(reply, action).with_draft(DraftUpdate::Save(draft)))
}

fn unavailable_reply(
    service: &str,
    start: chrono::NaiveDateTime,
    alternatives: &[chrono::NaiveDateTime],
) -> StrategyResponse {
    let requested = format!("{} at {}", start.format("%A %d %B"), start.format("%H:%M"));
    let reply = if alternatives.is_empty() {
        format!("Sorry, the {service} isn't available on {requested} and I couldn't find a free slot nearby. Could you suggest another day?")
    } else {
        format!(
            "Sorry, the {service} isn't available on {requested}. The nearest free times are:\n{}\nReply with a number to pick one, or suggest another time.",
            format_alternatives(alternatives)
        )
    };
    StrategyResponse::canned(reply, "unavailable")
}

async fn confirm(ctx: &TurnContext<'_>, mut draft: BookingDraft) -> anyhow::Result<StrategyResponse> {
    match drafts::promote(ctx.state, &mut draft, ctx.packages).await {
        Ok(promotion) => {
            let b = &promotion.booking;
            let reply = format!(
                "Your {} on {} at {} is provisionally held.\n{}\n{}",
                b.service,
                b.date_time.format("%A %d %B"),
                b.date_time.format("%H:%M"),
                promotion.payment.instructions,
                DraftStep::ConfirmDeposit.prompt()
            );
            Ok(StrategyResponse::canned(reply, "awaiting_deposit").with_draft(DraftUpdate::Save(draft)))
        }
        Err(PromotionError::Conflict { alternatives }) => {
            draft.reopen(DraftField::Time);
            draft.offered_slots = alternatives.clone();
            let reply = if alternatives.is_empty() {
                "Sorry, that slot was just taken. What other time would suit you?".to_string()
            } else {
                format!(
                    "Sorry, that slot was just taken. Here are the nearest free times:\n{}\nReply with a number to pick one.",
                    format_alternatives(&alternatives)
                )
            };
            Ok(StrategyResponse::canned(reply, "conflict").with_draft(DraftUpdate::Save(draft)))
        }
        Err(PromotionError::Incomplete(missing)) => {
            let step = draft.advance();
            let labels: Vec<&str> = missing.iter().map(|f| f.label()).collect();
            Ok(StrategyResponse::canned(
                format!("I still need your {}. {}", labels.join(" and "), step.prompt()),
                "incomplete",
            )
            .with_draft(DraftUpdate::Save(draft)))
        }
        Err(PromotionError::Availability(AvailabilityError::UnknownService(name))) => {
            draft.reopen(DraftField::Service);
            Ok(StrategyResponse::canned(
                format!("Sorry, we don't offer the {name} any more. {}", draft.step.prompt()),
                "unknown_service",
            )
            .with_draft(DraftUpdate::Save(draft)))
        }
        Err(PromotionError::Availability(AvailabilityError::Calendar(e))) => {
            tracing::warn!(customer = %ctx.customer.id, error = %e, "confirmation blocked by calendar");
            Ok(StrategyResponse::canned(
                "I couldn't check the studio calendar just now. Please reply CONFIRM again in a few minutes.",
                "availability_unverified",
            ))
        }
        Err(PromotionError::Payment(e)) => {
            tracing::error!(customer = %ctx.customer.id, error = %e, "deposit could not be initiated");
            Ok(StrategyResponse::canned(
                "We couldn't set up the deposit just now. Please reply CONFIRM again in a moment.",
                "payment_unavailable",
            ))
        }
        Err(PromotionError::Availability(AvailabilityError::Storage(e)) | PromotionError::Storage(e)) => Err(e),
    }
}

fn awaiting_deposit(ctx: &TurnContext<'_>, draft: &BookingDraft) -> anyhow::Result<StrategyResponse> {
    let booking = match &draft.booking_id {
        Some(id) => ctx.state.db.call(|conn| queries::get_booking_by_id(conn, id))?,
        None => None,
    };
    let reply = match booking.and_then(|b| b.payment_reference.map(|r| (b.service, r))) {
        Some((service, reference)) => format!(
            "Your {service} is held while we wait for the deposit (reference {reference}). {}",
            ctx.state.config.deposit_instructions
        ),
        None => DraftStep::ConfirmDeposit.prompt().to_string(),
    };
    Ok(StrategyResponse::canned(reply, "awaiting_deposit"))
}

async fn cancel(ctx: &TurnContext<'_>) -> anyhow::Result<StrategyResponse> {
    let had_draft = ctx.draft.is_some();
    let reply = match drafts::cancel_draft(ctx.state, &ctx.customer.id).await? {
        Some(booking) => format!(
            "Your {} on {} has been cancelled. We hope to see you another time!",
            booking.service,
            booking.date_time.format("%A %d %B at %H:%M")
        ),
        None if had_draft => DraftStep::Cancelled.prompt().to_string(),
        None => "There's no booking in progress to cancel. Is there anything else I can help with?".to_string(),
    };
    Ok(StrategyResponse::canned(reply, "cancelled").with_draft(DraftUpdate::Discard))
}

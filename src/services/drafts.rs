use chrono::{NaiveDateTime, Utc};

use crate::db::queries::{self, GuardedWrite};
use crate::models::{Booking, BookingDraft, BookingStatus, DraftField, DraftStep, Package};
use crate::services::availability::{Availability, AvailabilityError};
use crate::services::memory;
use crate::services::payment::PaymentRequest;
use crate::state::AppState;

#[derive(Debug, thiserror::Error)]
pub enum PromotionError {
    #[error("draft is missing {0:?}")]
    Incomplete(Vec<DraftField>),

    #[error("requested slot is taken")]
    Conflict { alternatives: Vec<NaiveDateTime> },

    #[error(transparent)]
    Availability(#[from] AvailabilityError),

    #[error("payment initiation failed: {0}")]
    Payment(anyhow::Error),

    #[error("storage error: {0}")]
    Storage(anyhow::Error),
}

#[derive(Debug)]
pub struct Promotion {
    pub booking: Booking,
    pub payment: PaymentRequest,
}

// The slot is written under the overlap guard, so a lost race surfaces as `Conflict`.
pub async fn promote(
    state: &AppState,
    draft: &mut BookingDraft,
    packages: &[Package],
) -> Result<Promotion, PromotionError> {
    let missing = draft.missing_fields();
    if !missing.is_empty() {
        return Err(PromotionError::Incomplete(missing));
    }
    let (Some(service), Some(start), Some(name), Some(phone)) = (
        draft.service.clone(),
        draft.start_at(),
        draft.name.clone(),
        draft.phone.clone(),
    ) else {
        return Err(PromotionError::Incomplete(draft.missing_fields()));
    };

    let package = packages
        .iter()
        .find(|p| p.name.eq_ignore_ascii_case(&service))
        .ok_or_else(|| AvailabilityError::UnknownService(service.clone()))?;
    let duration = package.duration_minutes();

    let checker = state.availability();
    if let Availability::Unavailable { alternatives } = checker.check(start, duration).await? {
        return Err(PromotionError::Conflict { alternatives });
    }

    let now = Utc::now().naive_utc();
    let mut booking = Booking {
        id: uuid::Uuid::new_v4().to_string(),
        customer_id: draft.customer_id.clone(),
        service: package.name.clone(),
        customer_name: name,
        phone,
        date_time: start,
        duration_minutes: duration,
        status: BookingStatus::Provisional,
        payment_reference: None,
        created_at: now,
        updated_at: now,
    };

    let write = state
        .db
        .call(|conn| queries::create_booking_guarded(conn, &booking))
        .map_err(PromotionError::Storage)?;
    if let GuardedWrite::Conflict(clashes) = write {
        tracing::warn!(
            customer = %draft.customer_id,
            clashes = clashes.len(),
            "slot taken between check and write"
        );
        let alternatives = match checker.check(start, duration).await? {
            Availability::Unavailable { alternatives } => alternatives,
            Availability::Available => Vec::new(),
        };
        return Err(PromotionError::Conflict { alternatives });
    }

    let payment = match state.payments.initiate_deposit(&booking, package).await {
        Ok(payment) => payment,
        Err(e) => {
            // release the hold so the slot is not blocked by an unpaid booking
            if let Err(release) = state
                .db
                .call(|conn| queries::update_booking_status(conn, &booking.id, BookingStatus::Cancelled))
            {
                tracing::error!(booking = %booking.id, error = %release, "failed to release provisional booking");
            }
            return Err(PromotionError::Payment(e));
        }
    };
    state
        .db
        .call(|conn| queries::set_payment_reference(conn, &booking.id, &payment.reference))
        .map_err(PromotionError::Storage)?;
    booking.payment_reference = Some(payment.reference.clone());

    draft.booking_id = Some(booking.id.clone());
    draft.offered_slots.clear();
    draft.step = DraftStep::ConfirmDeposit;
    draft.updated_at = now;

    tracing::info!(
        customer = %draft.customer_id,
        booking = %booking.id,
        service = %booking.service,
        start = %booking.date_time,
        "provisional booking created"
    );
    Ok(Promotion { booking, payment })
}

#[derive(Debug)]
pub enum PaymentOutcome {
    Confirmed(Booking),
    Conflict(Vec<Booking>),
    NotFound,
    Cancelled,
}

pub async fn confirm_payment(
    state: &AppState,
    booking_id: &str,
    reference: Option<&str>,
) -> anyhow::Result<PaymentOutcome> {
    let Some(booking) = state.db.call(|conn| queries::get_booking_by_id(conn, booking_id))? else {
        return Ok(PaymentOutcome::NotFound);
    };
    match booking.status {
        BookingStatus::Cancelled => return Ok(PaymentOutcome::Cancelled),
        BookingStatus::Confirmed => return Ok(PaymentOutcome::Confirmed(booking)),
        BookingStatus::Provisional => {}
    }

    let write = state
        .db
        .call(|conn| queries::confirm_booking_guarded(conn, booking_id, reference))?;
    if let GuardedWrite::Conflict(clashes) = write {
        tracing::warn!(booking = %booking_id, clashes = clashes.len(), "payment confirmation conflicts with a confirmed booking");
        return Ok(PaymentOutcome::Conflict(clashes));
    }

    let booking = state
        .db
        .call(|conn| queries::get_booking_by_id(conn, booking_id))?
        .ok_or_else(|| anyhow::anyhow!("booking {booking_id} vanished after confirmation"))?;

    state.db.call(|conn| {
        if let Some(mut draft) = queries::get_draft_for_booking(conn, booking_id)? {
            draft.step = DraftStep::Confirmed;
            draft.updated_at = Utc::now().naive_utc();
            queries::save_draft(conn, &draft)?;
        }
        Ok(())
    })?;
    tracing::info!(booking = %booking.id, customer = %booking.customer_id, "booking confirmed");

    let vip_threshold = state.config.vip_threshold;
    if let Err(e) = state
        .db
        .call(|conn| memory::refresh_from_bookings(conn, &booking.customer_id, vip_threshold))
    {
        tracing::error!(customer = %booking.customer_id, error = %e, "failed to refresh customer memory");
    }
    if let Err(e) = state.calendar.create_event(&booking).await {
        tracing::error!(booking = %booking.id, error = %e, "failed to create calendar event");
    }

    let body = format!(
        "Deposit received, thank you! Your {} on {} at {} is confirmed. {}",
        booking.service,
        booking.date_time.format("%A %d %B"),
        booking.date_time.format("%H:%M"),
        DraftStep::Confirmed.prompt(),
    );
    notify_customer(state, &booking.customer_id, &body).await;

    Ok(PaymentOutcome::Confirmed(booking))
}

pub async fn cancel_booking(state: &AppState, booking_id: &str) -> anyhow::Result<Option<Booking>> {
    let Some(mut booking) = state.db.call(|conn| queries::get_booking_by_id(conn, booking_id))? else {
        return Ok(None);
    };

    state.db.call(|conn| {
        queries::update_booking_status(conn, booking_id, BookingStatus::Cancelled)?;
        if let Some(draft) = queries::get_draft_for_booking(conn, booking_id)? {
            queries::delete_draft(conn, &draft.customer_id)?;
        }
        Ok(())
    })?;
    booking.status = BookingStatus::Cancelled;
    tracing::info!(booking = %booking_id, customer = %booking.customer_id, "booking cancelled");

    if let Err(e) = state.calendar.delete_event(booking_id).await {
        tracing::error!(booking = %booking_id, error = %e, "failed to delete calendar event");
    }
    Ok(Some(booking))
}

pub async fn cancel_draft(state: &AppState, customer_id: &str) -> anyhow::Result<Option<Booking>> {
    let draft = state.db.call(|conn| queries::get_draft(conn, customer_id))?;
    let cancelled = match draft.and_then(|d| d.booking_id) {
        Some(booking_id) => cancel_booking(state, &booking_id).await?,
        None => None,
    };
    state.db.call(|conn| queries::delete_draft(conn, customer_id))?;
    Ok(cancelled)
}

async fn notify_customer(state: &AppState, customer_id: &str, body: &str) {
    let customer = match state.db.call(|conn| queries::get_customer(conn, customer_id)) {
        Ok(Some(customer)) => customer,
        Ok(None) => return,
        Err(e) => {
            tracing::error!(customer = %customer_id, error = %e, "failed to load customer for notification");
            return;
        }
    };
    if let Err(e) = state.messaging.send_to_customer(&customer, body).await {
        tracing::error!(customer = %customer_id, error = %e, "failed to message customer");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Channel, RelationshipStage};
    use crate::services::ai::testing::ScriptedLlm;
    use crate::state::testing::state_with;

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap()
    }

    fn complete_draft(customer_id: &str, start: &str) -> BookingDraft {
        let start = dt(start);
        let mut draft = BookingDraft::new(customer_id);
        draft.service = Some("Gold Package".to_string());
        draft.date = Some(start.date());
        draft.time = Some(start.time());
        draft.name = Some("Ada".to_string());
        draft.phone = Some("+15551230000".to_string());
        draft.advance();
        draft
    }

    fn customer(state: &AppState, external_id: &str) -> String {
        state
            .db
            .call(|conn| queries::resolve_customer(conn, Channel::Dev, external_id, None))
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_incomplete_draft_is_not_promoted() {
        let state = state_with(Box::new(ScriptedLlm::failing()));
        let packages = state.catalog.packages(&state.db).unwrap();
        let mut draft = complete_draft("c1", "2031-06-16 10:00");
        draft.phone = None;

        let err = promote(&state, &mut draft, &packages).await.unwrap_err();
        assert!(matches!(err, PromotionError::Incomplete(ref f) if f == &vec![DraftField::Phone]));
        assert!(state
            .db
            .call(|conn| queries::get_all_bookings(conn, None, 10))
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_promote_then_confirm_payment() {
        let state = state_with(Box::new(ScriptedLlm::failing()));
        let packages = state.catalog.packages(&state.db).unwrap();
        let id = customer(&state, "ada");
        let mut draft = complete_draft(&id, "2031-06-16 10:00");

        let promotion = promote(&state, &mut draft, &packages).await.unwrap();
        assert_eq!(promotion.booking.status, BookingStatus::Provisional);
        assert_eq!(promotion.booking.duration_minutes, 90);
        assert_eq!(draft.step, DraftStep::ConfirmDeposit);
        assert!(promotion.payment.reference.starts_with("DEP-"));
        state.db.call(|conn| queries::save_draft(conn, &draft)).unwrap();

        let outcome = confirm_payment(&state, &promotion.booking.id, None).await.unwrap();
        assert!(matches!(outcome, PaymentOutcome::Confirmed(ref b) if b.status == BookingStatus::Confirmed));

        let saved = state.db.call(|conn| queries::get_draft(conn, &id)).unwrap().unwrap();
        assert_eq!(saved.step, DraftStep::Confirmed);
        let memory = state.db.call(|conn| memory::load(conn, &id)).unwrap();
        assert_eq!(memory.stage, RelationshipStage::Booked);
        assert_eq!(memory.lifetime_value, 350.0);
    }

    #[tokio::test]
    async fn test_taken_slot_returns_alternatives() {
        let state = state_with(Box::new(ScriptedLlm::failing()));
        let packages = state.catalog.packages(&state.db).unwrap();

        let mut first = complete_draft(&customer(&state, "a"), "2031-06-16 10:00");
        promote(&state, &mut first, &packages).await.unwrap();

        let mut second = complete_draft(&customer(&state, "b"), "2031-06-16 10:30");
        match promote(&state, &mut second, &packages).await.unwrap_err() {
            PromotionError::Conflict { alternatives } => {
                assert!(!alternatives.is_empty());
                assert!(alternatives.iter().all(|s| *s >= dt("2031-06-16 11:30") || *s <= dt("2031-06-16 08:30")));
            }
            other => panic!("expected conflict, got {other:?}"),
        }
        assert_eq!(second.step, DraftStep::Review);
        assert!(second.booking_id.is_none());
    }

    #[tokio::test]
    async fn test_confirmed_bookings_never_overlap() {
        let state = state_with(Box::new(ScriptedLlm::failing()));
        let now = Utc::now().naive_utc();
        let provisional = |id: &str, start: &str| Booking {
            id: id.to_string(),
            customer_id: "c1".to_string(),
            service: "Gold Package".to_string(),
            customer_name: "Ada".to_string(),
            phone: "+15550000000".to_string(),
            date_time: dt(start),
            duration_minutes: 60,
            status: BookingStatus::Provisional,
            payment_reference: None,
            created_at: now,
            updated_at: now,
        };
        state
            .db
            .call(|conn| {
                queries::create_booking(conn, &provisional("b1", "2031-06-16 10:00"))?;
                queries::create_booking(conn, &provisional("b2", "2031-06-16 10:30"))
            })
            .unwrap();

        assert!(matches!(confirm_payment(&state, "b1", Some("DEP-1")).await.unwrap(), PaymentOutcome::Confirmed(_)));
        assert!(matches!(confirm_payment(&state, "b2", None).await.unwrap(), PaymentOutcome::Conflict(_)));
        assert!(matches!(confirm_payment(&state, "nope", None).await.unwrap(), PaymentOutcome::NotFound));
    }

    #[tokio::test]
    async fn test_cancel_draft_releases_booking() {
        let state = state_with(Box::new(ScriptedLlm::failing()));
        let packages = state.catalog.packages(&state.db).unwrap();
        let id = customer(&state, "ada");
        let mut draft = complete_draft(&id, "2031-06-16 10:00");
        let promotion = promote(&state, &mut draft, &packages).await.unwrap();
        state.db.call(|conn| queries::save_draft(conn, &draft)).unwrap();

        let cancelled = cancel_draft(&state, &id).await.unwrap().unwrap();
        assert_eq!(cancelled.id, promotion.booking.id);
        assert_eq!(cancelled.status, BookingStatus::Cancelled);
        assert!(state.db.call(|conn| queries::get_draft(conn, &id)).unwrap().is_none());

        // the slot is free again
        let mut again = complete_draft(&customer(&state, "bea"), "2031-06-16 10:00");
        assert!(promote(&state, &mut again, &packages).await.is_ok());
    }
}

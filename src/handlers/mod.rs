pub mod admin;
pub mod calendar;
pub mod dev;
pub mod health;
pub mod webhook;

use std::sync::Arc;

use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::Router;

use crate::errors::AppError;
use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/webhook/:channel", post(webhook::receive))
        .route("/api/admin/status", get(admin::get_status))
        .route("/api/admin/pause", post(admin::pause_agent))
        .route("/api/admin/resume", post(admin::resume_agent))
        .route("/api/admin/customers", get(admin::get_customers))
        .route("/api/admin/customers/:id/flags", post(admin::update_customer_flags))
        .route("/api/admin/customers/:id/stage", post(admin::override_stage))
        .route("/api/admin/packages", get(admin::get_packages).post(admin::upsert_package))
        .route("/api/admin/bookings", get(admin::get_bookings))
        .route("/api/admin/bookings/:id/cancel", post(admin::cancel_booking))
        .route("/api/admin/escalations", get(admin::get_escalations))
        .route("/api/admin/escalations/:id/resolve", post(admin::resolve_escalation))
        .route("/api/admin/learning/patterns", get(admin::get_patterns))
        .route("/api/admin/faq", get(admin::get_faq_entries))
        .route("/api/admin/faq/mine", post(admin::mine_faqs))
        .route("/api/admin/faq/:id/activate", post(admin::activate_faq_entry))
        .route("/api/admin/memory/maintain", post(admin::maintain_memories))
        .route("/api/admin/payments/:booking_id/confirm", post(admin::confirm_payment))
        .route("/calendar/:booking_id", get(calendar::download_ics))
        .route("/api/dev/message", post(dev::send_message))
        .with_state(state)
}

pub(crate) fn check_auth(headers: &HeaderMap, expected_token: &str) -> Result<(), AppError> {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let token = auth.strip_prefix("Bearer ").unwrap_or("");
    if expected_token.is_empty() || token != expected_token {
        return Err(AppError::Unauthorized);
    }
    Ok(())
}

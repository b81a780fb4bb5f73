use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};

use super::check_auth;
use crate::db::queries::{self, CustomerFlags};
use crate::errors::AppError;
use crate::models::{
    Booking, BookingStatus, Customer, Escalation, EscalationStatus, FaqEntry, FaqEntryStatus,
    IntentPattern, Package, RelationshipStage,
};
use crate::services::{drafts, escalation, learning, memory};
use crate::services::drafts::PaymentOutcome;
use crate::services::learning::{FaqMiningReport, MaintenanceReport};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
    pub limit: Option<i64>,
}

// GET /api/admin/status
#[derive(Serialize)]
pub struct StatusResponse {
    paused: bool,
    customers: i64,
    open_escalations: i64,
    upcoming_confirmed: i64,
    awaiting_deposit: i64,
    stages: Vec<StageCount>,
}

#[derive(Serialize)]
pub struct StageCount {
    stage: &'static str,
    customers: i64,
}

pub async fn get_status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<StatusResponse>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let (stats, stages) = state.db.call(|conn| {
        let stats = queries::get_dashboard_stats(conn)?;
        let mut stages = Vec::new();
        for stage in RelationshipStage::ALL {
            stages.push(StageCount {
                stage: stage.as_str(),
                customers: queries::count_by_stage(conn, stage)?,
            });
        }
        Ok((stats, stages))
    })?;
    Ok(Json(StatusResponse {
        paused: state.paused.load(Ordering::SeqCst),
        customers: stats.customers,
        open_escalations: stats.open_escalations,
        upcoming_confirmed: stats.upcoming_confirmed,
        awaiting_deposit: stats.awaiting_deposit,
        stages,
    }))
}

// POST /api/admin/pause
pub async fn pause_agent(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;
    state.paused.store(true, Ordering::SeqCst);
    tracing::info!("agent paused by operator");
    Ok(Json(serde_json::json!({"ok": true, "paused": true})))
}

// POST /api/admin/resume
pub async fn resume_agent(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;
    state.paused.store(false, Ordering::SeqCst);
    tracing::info!("agent resumed by operator");
    Ok(Json(serde_json::json!({"ok": true, "paused": false})))
}

// ── Customers ──

// GET /api/admin/customers
pub async fn get_customers(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Customer>>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;
    let limit = query.limit.unwrap_or(100);
    let customers = state.db.call(|conn| queries::list_customers(conn, limit))?;
    Ok(Json(customers))
}

// POST /api/admin/customers/:id/flags
#[derive(Deserialize)]
pub struct FlagsRequest {
    pub ai_enabled: Option<bool>,
    pub paused: Option<bool>,
    pub active: Option<bool>,
}

pub async fn update_customer_flags(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<FlagsRequest>,
) -> Result<Json<Customer>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let flags = CustomerFlags {
        ai_enabled: body.ai_enabled,
        paused: body.paused,
        active: body.active,
    };
    let customer = state.db.call(|conn| {
        if !queries::update_customer_flags(conn, &id, &flags)? {
            return Ok(None);
        }
        queries::get_customer(conn, &id)
    })?;
    let customer = customer.ok_or_else(|| AppError::NotFound(format!("customer {id}")))?;
    tracing::info!(
        customer = %id,
        ai_enabled = customer.ai_enabled,
        paused = customer.paused,
        active = customer.active,
        "customer flags updated"
    );
    Ok(Json(customer))
}

// POST /api/admin/customers/:id/stage
#[derive(Deserialize)]
pub struct StageRequest {
    pub stage: String,
}

pub async fn override_stage(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<StageRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let stage = RelationshipStage::parse(&body.stage)
        .ok_or_else(|| AppError::BadRequest(format!("unknown stage {}", body.stage)))?;
    if !state.db.call(|conn| memory::override_stage(conn, &id, stage))? {
        return Err(AppError::NotFound(format!("customer {id}")));
    }
    Ok(Json(serde_json::json!({"ok": true, "stage": stage.as_str()})))
}

// ── Packages ──

// GET /api/admin/packages
pub async fn get_packages(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<Package>>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;
    let packages = state.db.call(queries::list_packages)?;
    Ok(Json(packages))
}

// POST /api/admin/packages
pub async fn upsert_package(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(package): Json<Package>,
) -> Result<Json<Package>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    if package.name.trim().is_empty() {
        return Err(AppError::BadRequest("package name is required".to_string()));
    }
    if package.price < 0.0 || package.deposit < 0.0 || package.deposit > package.price {
        return Err(AppError::BadRequest(
            "deposit must be between zero and the package price".to_string(),
        ));
    }
    state.db.call(|conn| queries::upsert_package(conn, &package))?;
    state.catalog.invalidate();
    tracing::info!(package = %package.name, price = package.price, "package saved");
    Ok(Json(package))
}

// ── Bookings ──

// GET /api/admin/bookings
pub async fn get_bookings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Booking>>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let limit = query.limit.unwrap_or(50);
    let status = query.status.as_deref().map(BookingStatus::parse);
    let bookings = state
        .db
        .call(|conn| queries::get_all_bookings(conn, status.as_ref().map(|s| s.as_str()), limit))?;
    Ok(Json(bookings))
}

// POST /api/admin/bookings/:id/cancel
pub async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Booking>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let booking = drafts::cancel_booking(&state, &id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("booking {id}")))?;
    Ok(Json(booking))
}

// POST /api/admin/payments/:booking_id/confirm
#[derive(Deserialize, Default)]
pub struct PaymentConfirmation {
    pub reference: Option<String>,
}

pub async fn confirm_payment(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(booking_id): Path<String>,
    body: Option<Json<PaymentConfirmation>>,
) -> Result<Json<Booking>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let confirmation = body.map(|Json(b)| b).unwrap_or_default();
    match drafts::confirm_payment(&state, &booking_id, confirmation.reference.as_deref()).await? {
        PaymentOutcome::Confirmed(booking) => Ok(Json(booking)),
        PaymentOutcome::NotFound => Err(AppError::NotFound(format!("booking {booking_id}"))),
        PaymentOutcome::Cancelled => Err(AppError::Conflict(format!(
            "booking {booking_id} was cancelled"
        ))),
        PaymentOutcome::Conflict(clashes) => Err(AppError::Conflict(format!(
            "booking {booking_id} overlaps {} confirmed booking(s)",
            clashes.len()
        ))),
    }
}

// ── Escalations ──

// GET /api/admin/escalations
pub async fn get_escalations(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Escalation>>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let limit = query.limit.unwrap_or(50);
    let status = query.status.as_deref().map(EscalationStatus::parse);
    let escalations = state.db.call(|conn| queries::list_escalations(conn, status, limit))?;
    Ok(Json(escalations))
}

// POST /api/admin/escalations/:id/resolve
pub async fn resolve_escalation(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    if !escalation::resolve(&state.db, id)? {
        return Err(AppError::NotFound(format!("open escalation {id}")));
    }
    Ok(Json(serde_json::json!({"ok": true})))
}

// ── Learning ──

// GET /api/admin/learning/patterns
pub async fn get_patterns(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<IntentPattern>>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;
    let patterns = state.db.call(learning::analyze_patterns)?;
    Ok(Json(patterns))
}

// POST /api/admin/faq/mine
pub async fn mine_faqs(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<FaqMiningReport>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;
    let min_occurrences = state.config.faq_min_occurrences;
    let report = state.db.call(|conn| learning::mine_faqs(conn, min_occurrences))?;
    Ok(Json(report))
}

// GET /api/admin/faq
pub async fn get_faq_entries(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<FaqEntry>>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;
    let status = query.status.as_deref().map(FaqEntryStatus::parse);
    let entries = state.db.call(|conn| queries::list_faq_entries(conn, status))?;
    Ok(Json(entries))
}

// POST /api/admin/faq/:id/activate
#[derive(Deserialize, Default)]
pub struct ActivateFaqRequest {
    pub answer: Option<String>,
}

pub async fn activate_faq_entry(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    body: Option<Json<ActivateFaqRequest>>,
) -> Result<Json<serde_json::Value>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let request = body.map(|Json(b)| b).unwrap_or_default();
    let answer = request.answer.as_deref().map(str::trim).filter(|a| !a.is_empty());
    if !state.db.call(|conn| queries::activate_faq_entry(conn, id, answer))? {
        return Err(AppError::NotFound(format!("faq entry {id}")));
    }
    tracing::info!(faq = id, "faq entry activated");
    Ok(Json(serde_json::json!({"ok": true})))
}

// POST /api/admin/memory/maintain
#[derive(Serialize)]
pub struct MaintenanceResponse {
    #[serde(flatten)]
    report: MaintenanceReport,
    expired_conversations: usize,
}

pub async fn maintain_memories(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<MaintenanceResponse>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;
    let vip_threshold = state.config.vip_threshold;
    let (report, expired_conversations) = state.db.call(|conn| {
        let report = learning::maintain_memories(conn, vip_threshold)?;
        Ok((report, queries::expire_old_conversations(conn)?))
    })?;
    tracing::info!(
        examined = report.examined,
        promoted = report.promoted,
        expired_conversations,
        "memory maintenance finished"
    );
    Ok(Json(MaintenanceResponse {
        report,
        expired_conversations,
    }))
}

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use base64::Engine;
use chrono::{NaiveDateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tower::ServiceExt;

use studiobook::config::AppConfig;
use studiobook::db::{self, queries, Db};
use studiobook::handlers;
use studiobook::models::{Booking, BookingStatus, Channel, Package, PackageFeatures, PackageType};
use studiobook::services::ai::{ChatResponse, LlmProvider, Message, TokenUsage};
use studiobook::services::calendar::NoopCalendar;
use studiobook::services::escalation::LogSink;
use studiobook::services::messaging::{MessagingProvider, MessagingRegistry};
use studiobook::services::payment::BankTransferPayments;
use studiobook::state::AppState;

// ── Mock Providers ──

const CLASSIFY_PACKAGES: &str = r#"{"primary_intent":"package_inquiry","confidence":0.9,"emotional_tone":"neutral","urgency_level":"low","complexity":"simple","requires_human_handoff":false}"#;
const CLASSIFY_BOOKING: &str = r#"{"primary_intent":"booking","confidence":0.9,"emotional_tone":"positive","urgency_level":"medium","complexity":"simple","requires_human_handoff":false}"#;
const EXTRACT_FULL: &str = r#"{"service":"gold","date":"2031-06-16","time":"10:00","name":"Ada Lovelace","phone":"+15551230000"}"#;

struct MockLlm;

#[async_trait]
impl LlmProvider for MockLlm {
    async fn chat(&self, system_prompt: &str, messages: &[Message]) -> anyhow::Result<ChatResponse> {
        let last = messages.last().map(|m| m.content.to_lowercase()).unwrap_or_default();

        let content = if system_prompt.contains("intent classifier") {
            if last.contains("package") && !last.contains("book") {
                CLASSIFY_PACKAGES
            } else {
                CLASSIFY_BOOKING
            }
        } else if system_prompt.contains("booking field extractor") {
            EXTRACT_FULL
        } else {
            anyhow::bail!("mock has no answer for this prompt");
        };

        Ok(ChatResponse {
            content: content.to_string(),
            usage: TokenUsage {
                prompt_tokens: 10,
                completion_tokens: 5,
            },
        })
    }
}

struct MockMessaging {
    sent: Arc<Mutex<Vec<(String, String)>>>,
}

#[async_trait]
impl MessagingProvider for MockMessaging {
    async fn send_message(&self, to: &str, body: &str) -> anyhow::Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((to.to_string(), body.to_string()));
        Ok(())
    }
}

// ── Helpers ──

fn test_config() -> AppConfig {
    AppConfig {
        database_url: ":memory:".to_string(),
        admin_token: "test-token".to_string(),
        studio_name: "Lumen Studio".to_string(),
        ..Default::default()
    }
}

fn package(name: &str, price: f64, duration: &str) -> Package {
    Package {
        name: name.to_string(),
        package_type: PackageType::Studio,
        price,
        deposit: (price * 0.3).round(),
        duration: duration.to_string(),
        features: PackageFeatures::default(),
        notes: String::new(),
    }
}

fn test_state_with(config: AppConfig) -> (Arc<AppState>, Arc<Mutex<Vec<(String, String)>>>) {
    let conn = db::init_db(":memory:").unwrap();
    queries::upsert_package(&conn, &package("Silver Package", 250.0, "1 hr")).unwrap();
    queries::upsert_package(&conn, &package("Gold Package", 450.0, "1 hr 30 min")).unwrap();

    let sent = Arc::new(Mutex::new(vec![]));
    let messaging = MessagingRegistry::new().with(
        Channel::Whatsapp,
        Arc::new(MockMessaging {
            sent: Arc::clone(&sent),
        }),
    );
    let state = Arc::new(AppState::new(
        Db::new(conn),
        config,
        Box::new(MockLlm),
        messaging,
        Box::new(NoopCalendar),
        Box::new(BankTransferPayments::new("Pay to account 001.".to_string())),
        Box::new(LogSink),
    ));
    (state, sent)
}

fn test_state() -> Arc<AppState> {
    test_state_with(test_config()).0
}

fn test_app(state: Arc<AppState>) -> Router {
    handlers::router(state)
}

fn dev_message(sender: &str, text: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/dev/message")
        .header("Content-Type", "application/json")
        .body(Body::from(
            serde_json::json!({"sender_id": sender, "text": text}).to_string(),
        ))
        .unwrap()
}

fn admin(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("Authorization", "Bearer test-token")
        .body(Body::empty())
        .unwrap()
}

async fn json_body(res: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(res.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

fn confirmed_booking(id: &str, start: &str) -> Booking {
    let now = Utc::now().naive_utc();
    Booking {
        id: id.to_string(),
        customer_id: "someone-else".to_string(),
        service: "Gold Package".to_string(),
        customer_name: "Bea".to_string(),
        phone: "+15550000000".to_string(),
        date_time: NaiveDateTime::parse_from_str(start, "%Y-%m-%d %H:%M").unwrap(),
        duration_minutes: 90,
        status: BookingStatus::Confirmed,
        payment_reference: None,
        created_at: now,
        updated_at: now,
    }
}

fn sign(secret: &str, body: &str) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(body.as_bytes());
    base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes())
}

// ── Health ──

#[tokio::test]
async fn test_health() {
    let res = test_app(test_state())
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let json = json_body(res).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["database"], true);
}

// ── Conversation Tests ──

#[tokio::test]
async fn test_package_inquiry_lists_catalog() {
    let res = test_app(test_state())
        .oneshot(dev_message("alice", "What packages do you have?"))
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let json = json_body(res).await;
    let reply = json["reply"].as_str().unwrap();
    assert!(reply.contains("Gold Package"));
    assert!(reply.contains("Silver Package"));
    assert_eq!(json["trace"]["strategy"], "package_inquiry");
    assert_eq!(json["trace"]["escalated"], false);
}

#[tokio::test]
async fn test_booking_flow_through_payment_confirmation() {
    let state = test_state();

    // full details land on the review summary
    let res = test_app(state.clone())
        .oneshot(dev_message("ada", "I'd like to book a session on 16 June 2031 at 10am, I'm Ada Lovelace"))
        .await
        .unwrap();
    let json = json_body(res).await;
    assert_eq!(json["trace"]["strategy"], "booking");
    assert_eq!(json["trace"]["action"], "review");
    assert!(json["reply"].as_str().unwrap().contains("CONFIRM"));

    // confirming creates a provisional booking with deposit instructions
    let res = test_app(state.clone())
        .oneshot(dev_message("ada", "CONFIRM"))
        .await
        .unwrap();
    let json = json_body(res).await;
    assert_eq!(json["trace"]["action"], "awaiting_deposit");
    let reply = json["reply"].as_str().unwrap();
    assert!(reply.contains("DEP-"));
    assert!(reply.contains("Pay to account 001."));

    let res = test_app(state.clone())
        .oneshot(admin("GET", "/api/admin/bookings?status=provisional"))
        .await
        .unwrap();
    let bookings = json_body(res).await;
    assert_eq!(bookings.as_array().unwrap().len(), 1);
    let booking_id = bookings[0]["id"].as_str().unwrap().to_string();
    assert_eq!(bookings[0]["service"], "Gold Package");

    // operator records the deposit
    let res = test_app(state.clone())
        .oneshot(admin("POST", &format!("/api/admin/payments/{booking_id}/confirm")))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let json = json_body(res).await;
    assert_eq!(json["status"], "confirmed");

    // calendar file is served for the booking
    let res = test_app(state)
        .oneshot(
            Request::builder()
                .uri(format!("/calendar/{booking_id}.ics"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = axum::body::to_bytes(res.into_body(), usize::MAX)
        .await
        .unwrap();
    let ics = String::from_utf8(body.to_vec()).unwrap();
    assert!(ics.contains("BEGIN:VCALENDAR"));
    assert!(ics.contains("Gold Package"));
}

#[tokio::test]
async fn test_taken_slot_offers_alternatives() {
    let state = test_state();
    state
        .db
        .call(|conn| queries::create_booking(conn, &confirmed_booking("taken", "2031-06-16 10:00")))
        .unwrap();

    let res = test_app(state)
        .oneshot(dev_message("ada", "I'd like to book a session on 16 June 2031 at 10am, I'm Ada Lovelace"))
        .await
        .unwrap();
    let json = json_body(res).await;
    assert_eq!(json["trace"]["action"], "unavailable");
    assert!(json["reply"].as_str().unwrap().contains("1. "));
}

#[tokio::test]
async fn test_human_request_opens_escalation() {
    let state = test_state();

    let res = test_app(state.clone())
        .oneshot(dev_message("bob", "I want to speak to a human please"))
        .await
        .unwrap();
    let json = json_body(res).await;
    assert_eq!(json["trace"]["escalated"], true);

    let res = test_app(state.clone())
        .oneshot(admin("GET", "/api/admin/escalations?status=open"))
        .await
        .unwrap();
    let escalations = json_body(res).await;
    assert_eq!(escalations.as_array().unwrap().len(), 1);
    let id = escalations[0]["id"].as_i64().unwrap();

    let res = test_app(state.clone())
        .oneshot(admin("POST", &format!("/api/admin/escalations/{id}/resolve")))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = test_app(state)
        .oneshot(admin("GET", "/api/admin/escalations?status=open"))
        .await
        .unwrap();
    assert_eq!(json_body(res).await.as_array().unwrap().len(), 0);
}

// ── Webhook Tests ──

#[tokio::test]
async fn test_webhook_rejects_bad_signature() {
    let (state, _) = test_state_with(AppConfig {
        webhook_secret: "s3cret".to_string(),
        ..test_config()
    });
    let body = r#"{"sender_id":"+15551230000","text":"What packages do you have?"}"#;

    let res = test_app(state)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhook/whatsapp")
                .header("Content-Type", "application/json")
                .header("X-Signature", sign("wrong", body))
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_webhook_unknown_channel() {
    let res = test_app(test_state())
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhook/sms")
                .header("Content-Type", "application/json")
                .body(Body::from(r#"{"sender_id":"x","text":"hi"}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_webhook_accepts_and_delivers_reply() {
    let (state, sent) = test_state_with(AppConfig {
        webhook_secret: "s3cret".to_string(),
        ..test_config()
    });
    let body = r#"{"sender_id":"+15551230000","text":"What packages do you have?","sender_name":"Ada"}"#;

    let res = test_app(state)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhook/whatsapp")
                .header("Content-Type", "application/json")
                .header("X-Signature", sign("s3cret", body))
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::ACCEPTED);

    // processing runs in a spawned task
    for _ in 0..50 {
        if !sent.lock().unwrap().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let sent = sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "+15551230000");
    assert!(sent[0].1.contains("Gold Package"));
}

// ── Admin API Tests ──

#[tokio::test]
async fn test_admin_requires_auth() {
    let res = test_app(test_state())
        .oneshot(
            Request::builder()
                .uri("/api/admin/status")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = test_app(test_state())
        .oneshot(
            Request::builder()
                .uri("/api/admin/status")
                .header("Authorization", "Bearer wrong-token")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_admin_pause_resume() {
    let state = test_state();

    let res = test_app(state.clone())
        .oneshot(admin("POST", "/api/admin/pause"))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = test_app(state.clone())
        .oneshot(admin("GET", "/api/admin/status"))
        .await
        .unwrap();
    let json = json_body(res).await;
    assert_eq!(json["paused"], true);
    assert_eq!(json["customers"], 0);

    // paused agent stores the message but does not answer
    let res = test_app(state.clone())
        .oneshot(dev_message("carol", "What packages do you have?"))
        .await
        .unwrap();
    assert!(json_body(res).await["reply"].is_null());

    let res = test_app(state.clone())
        .oneshot(admin("POST", "/api/admin/resume"))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = test_app(state)
        .oneshot(admin("GET", "/api/admin/status"))
        .await
        .unwrap();
    let json = json_body(res).await;
    assert_eq!(json["paused"], false);
    assert_eq!(json["customers"], 1);
}

#[tokio::test]
async fn test_admin_package_upsert_refreshes_catalog() {
    let state = test_state();

    // warm the catalog cache
    test_app(state.clone())
        .oneshot(dev_message("dan", "What packages do you have?"))
        .await
        .unwrap();

    let res = test_app(state.clone())
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/admin/packages")
                .header("Authorization", "Bearer test-token")
                .header("Content-Type", "application/json")
                .body(Body::from(
                    r#"{"name":"Platinum Package","package_type":"studio","price":800,"deposit":240,"duration":"2 hrs"}"#,
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = test_app(state.clone())
        .oneshot(dev_message("dan", "Which packages do you offer?"))
        .await
        .unwrap();
    assert!(json_body(res).await["reply"].as_str().unwrap().contains("Platinum Package"));

    let res = test_app(state)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/admin/packages")
                .header("Authorization", "Bearer test-token")
                .header("Content-Type", "application/json")
                .body(Body::from(
                    r#"{"name":"Odd Package","package_type":"studio","price":100,"deposit":200,"duration":"1 hr"}"#,
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_admin_customer_flags_and_stage() {
    let state = test_state();
    let res = test_app(state.clone())
        .oneshot(dev_message("erin", "What packages do you have?"))
        .await
        .unwrap();
    let customer_id = json_body(res).await["trace"]["customer_id"]
        .as_str()
        .unwrap()
        .to_string();

    let res = test_app(state.clone())
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/api/admin/customers/{customer_id}/flags"))
                .header("Authorization", "Bearer test-token")
                .header("Content-Type", "application/json")
                .body(Body::from(r#"{"ai_enabled":false}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(json_body(res).await["ai_enabled"], false);

    let res = test_app(state.clone())
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/api/admin/customers/{customer_id}/stage"))
                .header("Authorization", "Bearer test-token")
                .header("Content-Type", "application/json")
                .body(Body::from(r#"{"stage":"vip"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = test_app(state)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/api/admin/customers/{customer_id}/stage"))
                .header("Authorization", "Bearer test-token")
                .header("Content-Type", "application/json")
                .body(Body::from(r#"{"stage":"legend"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_admin_payment_confirm_unknown_booking() {
    let res = test_app(test_state())
        .oneshot(admin("POST", "/api/admin/payments/nope/confirm"))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_admin_learning_endpoints() {
    let state = test_state();
    test_app(state.clone())
        .oneshot(dev_message("fay", "What packages do you have?"))
        .await
        .unwrap();

    let res = test_app(state.clone())
        .oneshot(admin("GET", "/api/admin/learning/patterns"))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let patterns = json_body(res).await;
    assert_eq!(patterns.as_array().unwrap().len(), 1);

    let res = test_app(state.clone())
        .oneshot(admin("POST", "/api/admin/faq/mine"))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(json_body(res).await["suggested"], 0);

    let res = test_app(state)
        .oneshot(admin("POST", "/api/admin/memory/maintain"))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

use std::sync::Arc;

use async_trait::async_trait;

use crate::db::{queries, Db};
use crate::models::{Escalation, EscalationAlert, EscalationType};
use crate::services::messaging::MessagingProvider;

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, alert: &EscalationAlert) -> anyhow::Result<()>;
}

pub struct OwnerMessagingSink {
    messaging: Arc<dyn MessagingProvider>,
    owner_phone: String,
}

impl OwnerMessagingSink {
    pub fn new(messaging: Arc<dyn MessagingProvider>, owner_phone: String) -> Self {
        Self {
            messaging,
            owner_phone,
        }
    }
}

#[async_trait]
impl NotificationSink for OwnerMessagingSink {
    async fn notify(&self, alert: &EscalationAlert) -> anyhow::Result<()> {
        let body = format!("[{}] {}\n{}", alert.kind.as_str(), alert.title, alert.description);
        self.messaging.send_message(&self.owner_phone, &body).await
    }
}

pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn notify(&self, alert: &EscalationAlert) -> anyhow::Result<()> {
        tracing::warn!(
            customer = %alert.customer_id,
            kind = alert.kind.as_str(),
            title = %alert.title,
            "escalation alert"
        );
        Ok(())
    }
}

pub struct EscalationRequest<'a> {
    pub customer_id: &'a str,
    pub kind: EscalationType,
    pub reason: &'a str,
    pub sentiment: Option<f64>,
    pub metadata: serde_json::Value,
}

// Reuses an open escalation of the same type for the customer.
pub async fn raise(
    db: &Db,
    sink: &dyn NotificationSink,
    request: EscalationRequest<'_>,
) -> anyhow::Result<Escalation> {
    let existing = db.call(|conn| queries::find_open_escalation(conn, request.customer_id, request.kind))?;
    if let Some(open) = existing {
        tracing::info!(
            customer = %request.customer_id,
            escalation = open.id,
            "reusing open escalation"
        );
        return Ok(open);
    }

    let escalation = db.call(|conn| {
        queries::insert_escalation(
            conn,
            request.customer_id,
            request.reason,
            request.kind,
            request.sentiment,
            &request.metadata,
        )
    })?;
    tracing::warn!(
        customer = %request.customer_id,
        escalation = escalation.id,
        kind = request.kind.as_str(),
        reason = %request.reason,
        "escalation opened"
    );

    alert(
        sink,
        &EscalationAlert {
            customer_id: request.customer_id.to_string(),
            kind: request.kind,
            title: format!("Escalation #{} needs attention", escalation.id),
            description: request.reason.to_string(),
            metadata: request.metadata.clone(),
        },
    )
    .await;

    Ok(escalation)
}

pub async fn alert(sink: &dyn NotificationSink, alert: &EscalationAlert) {
    if let Err(e) = sink.notify(alert).await {
        tracing::error!(error = %e, customer = %alert.customer_id, "failed to deliver escalation alert");
    }
}

pub fn resolve(db: &Db, id: i64) -> anyhow::Result<bool> {
    let resolved = db.call(|conn| queries::resolve_escalation(conn, id))?;
    if resolved {
        tracing::info!(escalation = id, "escalation resolved");
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::db;

    #[derive(Default)]
    struct RecordingSink(Mutex<Vec<EscalationAlert>>);

    #[async_trait]
    impl NotificationSink for RecordingSink {
        async fn notify(&self, alert: &EscalationAlert) -> anyhow::Result<()> {
            self.0.lock().unwrap().push(alert.clone());
            Ok(())
        }
    }

    struct FailingSink;

    #[async_trait]
    impl NotificationSink for FailingSink {
        async fn notify(&self, _alert: &EscalationAlert) -> anyhow::Result<()> {
            anyhow::bail!("owner phone unreachable")
        }
    }

    fn request(kind: EscalationType) -> EscalationRequest<'static> {
        EscalationRequest {
            customer_id: "c1",
            kind,
            reason: "asked for a human",
            sentiment: Some(0.2),
            metadata: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn test_open_escalation_is_reused() {
        let db = Db::new(db::init_db(":memory:").unwrap());
        let sink = RecordingSink::default();

        let first = raise(&db, &sink, request(EscalationType::AutoDetected)).await.unwrap();
        let second = raise(&db, &sink, request(EscalationType::AutoDetected)).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(sink.0.lock().unwrap().len(), 1);

        let other = raise(&db, &sink, request(EscalationType::AiEscalation)).await.unwrap();
        assert_ne!(other.id, first.id);

        assert!(resolve(&db, first.id).unwrap());
        let third = raise(&db, &sink, request(EscalationType::AutoDetected)).await.unwrap();
        assert_ne!(third.id, first.id);
    }

    #[tokio::test]
    async fn test_sink_failure_does_not_fail_raise() {
        let db = Db::new(db::init_db(":memory:").unwrap());
        assert!(raise(&db, &FailingSink, request(EscalationType::Manual)).await.is_ok());
    }
}

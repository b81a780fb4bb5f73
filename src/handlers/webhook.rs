use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

use crate::errors::AppError;
use crate::models::Channel;
use crate::services::conversation;
use crate::state::AppState;

const APOLOGY: &str = "Sorry, something went wrong on our side. Please try again in a moment.";

#[derive(Debug, Deserialize)]
pub struct InboundMessage {
    pub sender_id: String,
    pub text: String,
    #[serde(default)]
    pub sender_name: Option<String>,
}

fn validate_signature(secret: &str, signature: &str, body: &[u8]) -> bool {
    let Ok(expected) = base64::engine::general_purpose::STANDARD.decode(signature.trim()) else {
        return false;
    };
    let mut mac = match Hmac::<Sha256>::new_from_slice(secret.as_bytes()) {
        Ok(m) => m,
        Err(_) => return false,
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

// POST /webhook/:channel
pub async fn receive(
    State(state): State<Arc<AppState>>,
    Path(channel): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, AppError> {
    let channel = Channel::parse(&channel)
        .ok_or_else(|| AppError::NotFound(format!("unknown channel {channel}")))?;

    // Signature checks are skipped when no secret is configured (local dev).
    if !state.config.webhook_secret.is_empty() {
        let signature = headers
            .get("x-signature")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if signature.is_empty() {
            tracing::warn!(channel = channel.as_str(), "missing X-Signature header");
            return Err(AppError::Unauthorized);
        }
        if !validate_signature(&state.config.webhook_secret, signature, &body) {
            tracing::warn!(channel = channel.as_str(), "invalid webhook signature");
            return Err(AppError::Unauthorized);
        }
    }

    let inbound: InboundMessage = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("invalid payload: {e}")))?;
    let sender_id = inbound.sender_id.trim().to_string();
    let text = inbound.text.trim().to_string();
    if sender_id.is_empty() {
        return Err(AppError::BadRequest("sender_id is required".to_string()));
    }

    tracing::info!(channel = channel.as_str(), sender = %sender_id, "incoming message");
    if text.is_empty() {
        return Ok(StatusCode::ACCEPTED);
    }

    tokio::spawn(async move {
        handle_inbound(&state, channel, &sender_id, &text, inbound.sender_name.as_deref()).await;
    });

    Ok(StatusCode::ACCEPTED)
}

pub async fn handle_inbound(
    state: &AppState,
    channel: Channel,
    sender_id: &str,
    text: &str,
    sender_name: Option<&str>,
) {
    let reply = match conversation::process_message(state, channel, sender_id, text, sender_name).await {
        Ok(result) => result.reply,
        Err(e) => {
            tracing::error!(channel = channel.as_str(), sender = %sender_id, error = %e, "failed to process message");
            Some(APOLOGY.to_string())
        }
    };

    let Some(reply) = reply else {
        return;
    };
    if let Err(e) = state.messaging.send(channel, sender_id, &reply).await {
        tracing::error!(channel = channel.as_str(), sender = %sender_id, error = %e, "failed to deliver reply");
    }
}

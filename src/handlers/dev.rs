use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Deserialize;

use crate::errors::AppError;
use crate::models::Channel;
use crate::services::conversation::{self, TurnResult};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct DevMessage {
    pub sender_id: String,
    pub text: String,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub sender_name: Option<String>,
}

// POST /api/dev/message
pub async fn send_message(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<DevMessage>,
) -> Result<Json<TurnResult>, AppError> {
    let channel = match payload.channel.as_deref() {
        Some(name) => {
            Channel::parse(name).ok_or_else(|| AppError::BadRequest(format!("unknown channel {name}")))?
        }
        None => Channel::Dev,
    };
    let sender_id = payload.sender_id.trim();
    let text = payload.text.trim();
    if sender_id.is_empty() || text.is_empty() {
        return Err(AppError::BadRequest("sender_id and text are required".to_string()));
    }

    let result = conversation::process_message(
        &state,
        channel,
        sender_id,
        text,
        payload.sender_name.as_deref(),
    )
    .await?;
    Ok(Json(result))
}

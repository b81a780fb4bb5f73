use chrono::NaiveDate;

use crate::errors::{Degraded, DegradedResult};
use crate::models::{BookingExtraction, ConversationMessage};
use crate::services::ai::{parse_json_reply, LlmProvider, Message};

const SYSTEM_PROMPT: &str = r#"You are a booking field extractor for a photography studio. Pull booking details out of the customer's latest message, using the earlier conversation only to resolve references like "that day" or "the first one".

Return ONLY valid JSON (no markdown, no explanation) with this exact structure:
{
  "service": "package name or null",
  "date": "YYYY-MM-DD or null",
  "time": "HH:MM (24h) or null",
  "name": "customer's name or null",
  "phone": "phone number or null"
}

Use null for anything the customer did not say. Never guess."#;

pub async fn extract_booking_fields(
    llm: &dyn LlmProvider,
    history: &[ConversationMessage],
    message: &str,
    today: NaiveDate,
    package_names: &[String],
) -> DegradedResult<BookingExtraction> {
    let system = format!(
        "{SYSTEM_PROMPT}\n\nToday is {} ({}). Packages offered: {}.",
        today.format("%Y-%m-%d"),
        today.format("%A"),
        package_names.join(", "),
    );

    let mut messages: Vec<Message> = history.iter().map(Message::from).collect();
    messages.push(Message::user(message));

    match llm.chat(&system, &messages).await {
        Ok(response) => match parse_json_reply::<BookingExtraction>(&response.content) {
            Some(extraction) => Ok(extraction),
            None => {
                tracing::warn!("booking extraction returned malformed JSON");
                Err(Degraded::new(
                    BookingExtraction::default(),
                    "extraction returned malformed JSON",
                ))
            }
        },
        Err(e) => {
            tracing::warn!(error = %e, "booking extraction failed");
            Err(Degraded::new(
                BookingExtraction::default(),
                format!("extraction call failed: {e}"),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::ai::testing::ScriptedLlm;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 10).unwrap()
    }

    #[tokio::test]
    async fn test_extracts_fields() {
        let llm = ScriptedLlm::new(vec![(
            "booking field extractor",
            r#"```json
{"service":"Gold Package","date":"2025-06-16","time":"14:00","name":null,"phone":null}
```"#,
        )]);
        let extraction = extract_booking_fields(&llm, &[], "Gold on the 16th at 2pm", today(), &[])
            .await
            .unwrap();
        assert_eq!(extraction.service.as_deref(), Some("Gold Package"));
        assert_eq!(extraction.time.as_deref(), Some("14:00"));
        assert!(extraction.name.is_none());
    }

    #[tokio::test]
    async fn test_failure_is_empty_extraction() {
        let result = extract_booking_fields(&ScriptedLlm::failing(), &[], "hi", today(), &[]).await;
        let degraded = result.unwrap_err();
        assert!(degraded.fallback.is_empty());
    }
}

use anyhow::Context;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::models::Booking;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusyInterval {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

// A failed lookup is never read as free.
#[async_trait]
pub trait CalendarService: Send + Sync {
    async fn free_busy(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> anyhow::Result<Vec<BusyInterval>>;
    async fn create_event(&self, booking: &Booking) -> anyhow::Result<()>;
    async fn update_event(&self, booking: &Booking) -> anyhow::Result<()>;
    async fn delete_event(&self, booking_id: &str) -> anyhow::Result<()>;
}

pub struct NoopCalendar;

#[async_trait]
impl CalendarService for NoopCalendar {
    async fn free_busy(
        &self,
        _start: NaiveDateTime,
        _end: NaiveDateTime,
    ) -> anyhow::Result<Vec<BusyInterval>> {
        Ok(Vec::new())
    }

    async fn create_event(&self, _booking: &Booking) -> anyhow::Result<()> {
        Ok(())
    }

    async fn update_event(&self, _booking: &Booking) -> anyhow::Result<()> {
        Ok(())
    }

    async fn delete_event(&self, _booking_id: &str) -> anyhow::Result<()> {
        Ok(())
    }
}

pub struct HttpCalendar {
    base_url: String,
    token: String,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct FreeBusyResponse {
    #[serde(default)]
    busy: Vec<BusyInterval>,
}

impl HttpCalendar {
    pub fn new(base_url: String, token: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            client: reqwest::Client::new(),
        }
    }

    fn event_body(booking: &Booking) -> serde_json::Value {
        json!({
            "id": booking.id,
            "title": format!("{} - {}", booking.service, booking.customer_name),
            "start": booking.date_time,
            "end": booking.end_time(),
            "phone": booking.phone,
            "status": booking.status.as_str(),
        })
    }
}

#[async_trait]
impl CalendarService for HttpCalendar {
    async fn free_busy(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> anyhow::Result<Vec<BusyInterval>> {
        let resp = self
            .client
            .get(format!("{}/free-busy", self.base_url))
            .bearer_auth(&self.token)
            .query(&[
                ("start", start.format("%Y-%m-%dT%H:%M:%S").to_string()),
                ("end", end.format("%Y-%m-%dT%H:%M:%S").to_string()),
            ])
            .send()
            .await
            .context("failed to call calendar free-busy")?
            .error_for_status()
            .context("calendar free-busy returned error")?;

        let data: FreeBusyResponse = resp
            .json()
            .await
            .context("failed to parse calendar free-busy response")?;
        Ok(data.busy)
    }

    async fn create_event(&self, booking: &Booking) -> anyhow::Result<()> {
        self.client
            .post(format!("{}/events", self.base_url))
            .bearer_auth(&self.token)
            .json(&Self::event_body(booking))
            .send()
            .await
            .context("failed to create calendar event")?
            .error_for_status()
            .context("calendar rejected event")?;
        Ok(())
    }

    async fn update_event(&self, booking: &Booking) -> anyhow::Result<()> {
        self.client
            .put(format!("{}/events/{}", self.base_url, booking.id))
            .bearer_auth(&self.token)
            .json(&Self::event_body(booking))
            .send()
            .await
            .context("failed to update calendar event")?
            .error_for_status()
            .context("calendar rejected event update")?;
        Ok(())
    }

    async fn delete_event(&self, booking_id: &str) -> anyhow::Result<()> {
        self.client
            .delete(format!("{}/events/{}", self.base_url, booking_id))
            .bearer_auth(&self.token)
            .send()
            .await
            .context("failed to delete calendar event")?
            .error_for_status()
            .context("calendar rejected event deletion")?;
        Ok(())
    }
}

pub fn generate_ics(booking: &Booking, studio_name: &str) -> String {
    let dtstart = booking.date_time.format("%Y%m%dT%H%M%S").to_string();
    let dtend = booking.end_time().format("%Y%m%dT%H%M%S").to_string();
    let dtstamp = booking.created_at.format("%Y%m%dT%H%M%S").to_string();
    let uid = format!("{}@studiobook", booking.id);

    let summary = format!("{} at {}", booking.service, studio_name);
    let description = format!(
        "Photo session for {} ({}). Status: {}",
        booking.customer_name,
        booking.phone,
        booking.status.as_str()
    );

    format!(
        "BEGIN:VCALENDAR\r\n\
         VERSION:2.0\r\n\
         PRODID:-//Studiobook//Session Booking//EN\r\n\
         BEGIN:VEVENT\r\n\
         UID:{uid}\r\n\
         DTSTAMP:{dtstamp}\r\n\
         DTSTART:{dtstart}\r\n\
         DTEND:{dtend}\r\n\
         SUMMARY:{summary}\r\n\
         DESCRIPTION:{description}\r\n\
         END:VEVENT\r\n\
         END:VCALENDAR\r\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BookingStatus;

    fn ts(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    #[test]
    fn test_generate_ics() {
        let booking = Booking {
            id: "bk-123".to_string(),
            customer_id: "c1".to_string(),
            service: "Gold Package".to_string(),
            customer_name: "Ada".to_string(),
            phone: "+15550001111".to_string(),
            date_time: ts("2025-03-15 14:00:00"),
            duration_minutes: 90,
            status: BookingStatus::Confirmed,
            payment_reference: None,
            created_at: ts("2025-03-10 10:00:00"),
            updated_at: ts("2025-03-10 10:00:00"),
        };

        let ics = generate_ics(&booking, "Lumen Studio");
        assert!(ics.contains("BEGIN:VEVENT"));
        assert!(ics.contains("DTSTART:20250315T140000"));
        assert!(ics.contains("DTEND:20250315T153000"));
        assert!(ics.contains("SUMMARY:Gold Package at Lumen Studio"));
        assert!(ics.contains("UID:bk-123@studiobook"));
        assert!(ics.ends_with("END:VCALENDAR\r\n"));
    }

    #[tokio::test]
    async fn test_noop_calendar_is_always_free() {
        let busy = NoopCalendar
            .free_busy(ts("2025-03-15 00:00:00"), ts("2025-03-16 00:00:00"))
            .await
            .unwrap();
        assert!(busy.is_empty());
    }
}

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: String,
    pub customer_id: String,
    pub service: String,
    pub customer_name: String,
    pub phone: String,
    pub date_time: NaiveDateTime,
    pub duration_minutes: i64,
    pub status: BookingStatus,
    pub payment_reference: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Booking {
    pub fn end_time(&self) -> NaiveDateTime {
        self.date_time + Duration::minutes(self.duration_minutes)
    }

    // Half-open `[start, end)`; back-to-back sessions do not clash.
    pub fn overlaps(&self, start: &NaiveDateTime, end: &NaiveDateTime) -> bool {
        self.date_time < *end && self.end_time() > *start
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Provisional,
    Confirmed,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Provisional => "provisional",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "confirmed" => BookingStatus::Confirmed,
            "cancelled" => BookingStatus::Cancelled,
            _ => BookingStatus::Provisional,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap()
    }

    fn booking_at(start: &str, minutes: i64) -> Booking {
        let now = dt("2025-06-01 09:00");
        Booking {
            id: "b1".to_string(),
            customer_id: "c1".to_string(),
            service: "Gold Package".to_string(),
            customer_name: "Ada".to_string(),
            phone: "+15550000000".to_string(),
            date_time: dt(start),
            duration_minutes: minutes,
            status: BookingStatus::Confirmed,
            payment_reference: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_overlap_half_open() {
        let b = booking_at("2025-06-16 10:00", 60);
        assert!(b.overlaps(&dt("2025-06-16 10:30"), &dt("2025-06-16 11:30")));
        assert!(b.overlaps(&dt("2025-06-16 09:30"), &dt("2025-06-16 10:01")));
        assert!(!b.overlaps(&dt("2025-06-16 11:00"), &dt("2025-06-16 12:00")));
        assert!(!b.overlaps(&dt("2025-06-16 09:00"), &dt("2025-06-16 10:00")));
    }
}

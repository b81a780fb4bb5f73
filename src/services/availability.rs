use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};

use crate::db::{queries, Db};
use crate::models::BookingStatus;
use crate::services::calendar::{BusyInterval, CalendarService};

pub const SLOT_STEP_MINUTES: i64 = 30;
const LOOKAHEAD_DAYS: i64 = 7;

#[derive(Debug, thiserror::Error)]
pub enum AvailabilityError {
    #[error("calendar lookup failed: {0}")]
    Calendar(anyhow::Error),

    #[error("booking lookup failed: {0}")]
    Storage(anyhow::Error),

    #[error("unknown service: {0}")]
    UnknownService(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Availability {
    Available,
    Unavailable { alternatives: Vec<NaiveDateTime> },
}

pub struct BusinessHours {
    pub open: NaiveTime,
    pub close: NaiveTime,
}

impl BusinessHours {
    pub fn contains(&self, start: NaiveDateTime, end: NaiveDateTime) -> bool {
        start.date() == end.date() && start.time() >= self.open && end.time() <= self.close
    }
}

pub struct AvailabilityChecker<'a> {
    pub db: &'a Db,
    pub calendar: &'a dyn CalendarService,
    pub hours: BusinessHours,
    pub max_alternatives: usize,
}

impl AvailabilityChecker<'_> {
    pub async fn check(
        &self,
        start: NaiveDateTime,
        duration_minutes: i64,
    ) -> Result<Availability, AvailabilityError> {
        let duration = Duration::minutes(duration_minutes);
        let window_start = start.date().and_time(NaiveTime::MIN);
        let window_end = window_start + Duration::days(LOOKAHEAD_DAYS + 1);

        let busy = self.busy_between(window_start, window_end).await?;

        if self.hours.contains(start, start + duration) && is_free(&busy, start, start + duration) {
            return Ok(Availability::Available);
        }

        let mut alternatives = free_slots(
            &busy,
            start.date(),
            duration,
            &self.hours,
            self.max_alternatives,
        );
        let mut day = start.date();
        for _ in 0..LOOKAHEAD_DAYS {
            if !alternatives.is_empty() {
                break;
            }
            day = day.succ_opt().unwrap_or(day);
            alternatives = free_slots(&busy, day, duration, &self.hours, self.max_alternatives);
        }

        tracing::info!(
            requested = %start,
            alternatives = alternatives.len(),
            "requested slot unavailable"
        );
        Ok(Availability::Unavailable { alternatives })
    }

    async fn busy_between(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<BusyInterval>, AvailabilityError> {
        let mut busy: Vec<BusyInterval> = self
            .db
            .call(|conn| {
                queries::overlapping_bookings(
                    conn,
                    &start,
                    &end,
                    &[BookingStatus::Provisional, BookingStatus::Confirmed],
                )
            })
            .map_err(AvailabilityError::Storage)?
            .into_iter()
            .map(|b| BusyInterval {
                start: b.date_time,
                end: b.end_time(),
            })
            .collect();

        let external = self
            .calendar
            .free_busy(start, end)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "calendar free-busy lookup failed");
                AvailabilityError::Calendar(e)
            })?;
        busy.extend(external);
        Ok(busy)
    }
}

fn is_free(busy: &[BusyInterval], start: NaiveDateTime, end: NaiveDateTime) -> bool {
    busy.iter().all(|b| !(b.start < end && b.end > start))
}

pub fn free_slots(
    busy: &[BusyInterval],
    day: NaiveDate,
    duration: Duration,
    hours: &BusinessHours,
    limit: usize,
) -> Vec<NaiveDateTime> {
    let mut slots = Vec::new();
    let mut cursor = day.and_time(hours.open);
    let close = day.and_time(hours.close);

    while cursor + duration <= close && slots.len() < limit {
        if is_free(busy, cursor, cursor + duration) {
            slots.push(cursor);
        }
        cursor += Duration::minutes(SLOT_STEP_MINUTES);
    }
    slots
}

pub fn format_alternatives(slots: &[NaiveDateTime]) -> String {
    slots
        .iter()
        .enumerate()
        .map(|(i, s)| format!("{}. {}", i + 1, s.format("%a %d %b, %H:%M")))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::models::Booking;
    use crate::services::calendar::NoopCalendar;
    use async_trait::async_trait;

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap()
    }

    fn hours() -> BusinessHours {
        BusinessHours {
            open: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            close: NaiveTime::from_hms_opt(12, 0, 0).unwrap(),
        }
    }

    fn confirmed(id: &str, start: &str, minutes: i64) -> Booking {
        let now = chrono::Utc::now().naive_utc();
        Booking {
            id: id.to_string(),
            customer_id: "other".to_string(),
            service: "Gold Package".to_string(),
            customer_name: "Bea".to_string(),
            phone: "+15550000000".to_string(),
            date_time: dt(start),
            duration_minutes: minutes,
            status: BookingStatus::Confirmed,
            payment_reference: None,
            created_at: now,
            updated_at: now,
        }
    }

    struct BrokenCalendar;

    #[async_trait]
    impl CalendarService for BrokenCalendar {
        async fn free_busy(
            &self,
            _start: NaiveDateTime,
            _end: NaiveDateTime,
        ) -> anyhow::Result<Vec<BusyInterval>> {
            anyhow::bail!("401 from calendar")
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

    #[test]
    fn test_free_slots_skip_busy_and_respect_close() {
        let busy = vec![BusyInterval {
            start: dt("2025-06-16 09:30"),
            end: dt("2025-06-16 10:30"),
        }];
        let slots = free_slots(&busy, dt("2025-06-16 00:00").date(), Duration::minutes(60), &hours(), 10);
        assert_eq!(
            slots,
            vec![dt("2025-06-16 10:30"), dt("2025-06-16 11:00")]
        );
    }

    #[tokio::test]
    async fn test_conflict_offers_alternatives() {
        let db = Db::new(db::init_db(":memory:").unwrap());
        db.call(|conn| queries::create_booking(conn, &confirmed("b1", "2025-06-16 10:00", 60)))
            .unwrap();

        let checker = AvailabilityChecker {
            db: &db,
            calendar: &NoopCalendar,
            hours: hours(),
            max_alternatives: 3,
        };
        match checker.check(dt("2025-06-16 10:00"), 60).await.unwrap() {
            Availability::Unavailable { alternatives } => {
                assert_eq!(
                    alternatives,
                    vec![dt("2025-06-16 09:00"), dt("2025-06-16 11:00")]
                );
            }
            Availability::Available => panic!("slot should be taken"),
        }
        assert_eq!(
            checker.check(dt("2025-06-16 11:00"), 60).await.unwrap(),
            Availability::Available
        );
    }

    #[tokio::test]
    async fn test_full_day_rolls_to_next_day() {
        let db = Db::new(db::init_db(":memory:").unwrap());
        db.call(|conn| queries::create_booking(conn, &confirmed("b1", "2025-06-16 09:00", 180)))
            .unwrap();
        let checker = AvailabilityChecker {
            db: &db,
            calendar: &NoopCalendar,
            hours: hours(),
            max_alternatives: 2,
        };
        match checker.check(dt("2025-06-16 09:00"), 60).await.unwrap() {
            Availability::Unavailable { alternatives } => {
                assert_eq!(
                    alternatives,
                    vec![dt("2025-06-17 09:00"), dt("2025-06-17 09:30")]
                );
            }
            Availability::Available => panic!("day is full"),
        }
    }

    #[tokio::test]
    async fn test_outside_hours_is_unavailable() {
        let db = Db::new(db::init_db(":memory:").unwrap());
        let checker = AvailabilityChecker {
            db: &db,
            calendar: &NoopCalendar,
            hours: hours(),
            max_alternatives: 1,
        };
        assert!(matches!(
            checker.check(dt("2025-06-16 11:30"), 60).await.unwrap(),
            Availability::Unavailable { .. }
        ));
    }

    #[tokio::test]
    async fn test_calendar_failure_is_not_free() {
        let db = Db::new(db::init_db(":memory:").unwrap());
        let checker = AvailabilityChecker {
            db: &db,
            calendar: &BrokenCalendar,
            hours: hours(),
            max_alternatives: 3,
        };
        let err = checker.check(dt("2025-06-16 10:00"), 60).await.unwrap_err();
        assert!(matches!(err, AvailabilityError::Calendar(_)));
    }
}

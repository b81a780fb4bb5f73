use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DraftStep {
    CollectService,
    CollectDate,
    CollectTime,
    CollectName,
    Review,
    ConfirmDeposit,
    Confirmed,
    Cancelled,
}

impl DraftStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            DraftStep::CollectService => "collect_service",
            DraftStep::CollectDate => "collect_date",
            DraftStep::CollectTime => "collect_time",
            DraftStep::CollectName => "collect_name",
            DraftStep::Review => "review",
            DraftStep::ConfirmDeposit => "confirm_deposit",
            DraftStep::Confirmed => "confirmed",
            DraftStep::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "collect_date" => DraftStep::CollectDate,
            "collect_time" => DraftStep::CollectTime,
            "collect_name" => DraftStep::CollectName,
            "review" => DraftStep::Review,
            "confirm_deposit" => DraftStep::ConfirmDeposit,
            "confirmed" => DraftStep::Confirmed,
            "cancelled" => DraftStep::Cancelled,
            _ => DraftStep::CollectService,
        }
    }

    pub fn is_committed(&self) -> bool {
        matches!(
            self,
            DraftStep::ConfirmDeposit | DraftStep::Confirmed | DraftStep::Cancelled
        )
    }

    pub fn prompt(&self) -> &'static str {
        match self {
            DraftStep::CollectService => "Which package would you like to book?",
            DraftStep::CollectDate => "What date would you like your session?",
            DraftStep::CollectTime => "What time works best for you?",
            DraftStep::CollectName => {
                "Could I have the name for the booking and a phone number we can reach you on?"
            }
            DraftStep::Review => "Please reply CONFIRM to lock in this booking, or tell me what to change.",
            DraftStep::ConfirmDeposit => "Your slot is held while we wait for the deposit.",
            DraftStep::Confirmed => "Your booking is confirmed. See you at the studio!",
            DraftStep::Cancelled => "Your booking request has been cancelled.",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DraftField {
    Service,
    Date,
    Time,
    Name,
    Phone,
}

impl DraftField {
    pub fn label(&self) -> &'static str {
        match self {
            DraftField::Service => "package",
            DraftField::Date => "date",
            DraftField::Time => "time",
            DraftField::Name => "name",
            DraftField::Phone => "phone number",
        }
    }

    fn collection_step(&self) -> DraftStep {
        match self {
            DraftField::Service => DraftStep::CollectService,
            DraftField::Date => DraftStep::CollectDate,
            DraftField::Time => DraftStep::CollectTime,
            DraftField::Name | DraftField::Phone => DraftStep::CollectName,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BookingExtraction {
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

impl BookingExtraction {
    pub fn is_empty(&self) -> bool {
        self.service.is_none()
            && self.date.is_none()
            && self.time.is_none()
            && self.name.is_none()
            && self.phone.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BookingDraft {
    pub customer_id: String,
    pub service: Option<String>,
    pub date: Option<NaiveDate>,
    pub time: Option<NaiveTime>,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub step: DraftStep,
    #[serde(default)]
    pub booking_id: Option<String>,
    #[serde(default)]
    pub offered_slots: Vec<NaiveDateTime>,
    pub updated_at: NaiveDateTime,
}

impl BookingDraft {
    pub fn new(customer_id: &str) -> Self {
        Self {
            customer_id: customer_id.to_string(),
            service: None,
            date: None,
            time: None,
            name: None,
            phone: None,
            step: DraftStep::CollectService,
            booking_id: None,
            offered_slots: Vec::new(),
            updated_at: chrono::Utc::now().naive_utc(),
        }
    }

    // Absent or unparseable values leave the existing field untouched.
    pub fn merge(&mut self, extraction: &BookingExtraction) -> Vec<DraftField> {
        let mut changed = Vec::new();

        if let Some(service) = non_empty(&extraction.service) {
            if self.service.as_deref() != Some(service) {
                self.service = Some(service.to_string());
                changed.push(DraftField::Service);
            }
        }
        if let Some(date) = non_empty(&extraction.date).and_then(parse_date) {
            if self.date != Some(date) {
                self.date = Some(date);
                changed.push(DraftField::Date);
            }
        }
        if let Some(time) = non_empty(&extraction.time).and_then(parse_time) {
            if self.time != Some(time) {
                self.time = Some(time);
                changed.push(DraftField::Time);
            }
        }
        if let Some(name) = non_empty(&extraction.name) {
            if self.name.as_deref() != Some(name) {
                self.name = Some(name.to_string());
                changed.push(DraftField::Name);
            }
        }
        if let Some(phone) = non_empty(&extraction.phone).and_then(normalize_phone) {
            if self.phone.as_deref() != Some(phone.as_str()) {
                self.phone = Some(phone);
                changed.push(DraftField::Phone);
            }
        }

        if !changed.is_empty() {
            self.updated_at = chrono::Utc::now().naive_utc();
        }
        changed
    }

    pub fn missing_fields(&self) -> Vec<DraftField> {
        let mut missing = Vec::new();
        if self.service.is_none() {
            missing.push(DraftField::Service);
        }
        if self.date.is_none() {
            missing.push(DraftField::Date);
        }
        if self.time.is_none() {
            missing.push(DraftField::Time);
        }
        if self.name.is_none() {
            missing.push(DraftField::Name);
        }
        if self.phone.is_none() {
            missing.push(DraftField::Phone);
        }
        missing
    }

    pub fn is_complete(&self) -> bool {
        self.missing_fields().is_empty()
    }

    pub fn is_active(&self) -> bool {
        !matches!(self.step, DraftStep::Confirmed | DraftStep::Cancelled)
    }

    pub fn pick_offered(&mut self, n: usize) -> bool {
        let Some(slot) = n.checked_sub(1).and_then(|i| self.offered_slots.get(i)).copied() else {
            return false;
        };
        self.date = Some(slot.date());
        self.time = Some(slot.time());
        self.offered_slots.clear();
        self.updated_at = chrono::Utc::now().naive_utc();
        true
    }

    pub fn has_slot(&self) -> bool {
        self.service.is_some() && self.date.is_some() && self.time.is_some()
    }

    pub fn start_at(&self) -> Option<NaiveDateTime> {
        Some(self.date?.and_time(self.time?))
    }

    // Committed steps are left alone.
    pub fn advance(&mut self) -> DraftStep {
        if self.step.is_committed() {
            return self.step;
        }
        self.step = match self.missing_fields().first() {
            Some(field) => field.collection_step(),
            None => DraftStep::Review,
        };
        self.step
    }

    pub fn reopen(&mut self, field: DraftField) {
        match field {
            DraftField::Service => self.service = None,
            DraftField::Date => self.date = None,
            DraftField::Time => self.time = None,
            DraftField::Name => self.name = None,
            DraftField::Phone => self.phone = None,
        }
        self.step = field.collection_step();
        self.updated_at = chrono::Utc::now().naive_utc();
    }

    pub fn summary(&self) -> String {
        let or_dash = |v: Option<String>| v.unwrap_or_else(|| "-".to_string());
        [
            format!("Package: {}", or_dash(self.service.clone())),
            format!(
                "Date: {}",
                or_dash(self.date.map(|d| d.format("%A, %d %B %Y").to_string()))
            ),
            format!("Time: {}", or_dash(self.time.map(|t| t.format("%H:%M").to_string()))),
            format!("Name: {}", or_dash(self.name.clone())),
            format!("Phone: {}", or_dash(self.phone.clone())),
        ]
        .join("\n")
    }
}

fn non_empty(v: &Option<String>) -> Option<&str> {
    v.as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("null"))
}

pub fn parse_date(s: &str) -> Option<NaiveDate> {
    ["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y", "%Y/%m/%d"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s.trim(), fmt).ok())
}

pub fn parse_time(s: &str) -> Option<NaiveTime> {
    let cleaned = s.trim().to_lowercase().replace(' ', "").replace('.', ":");
    for fmt in ["%H:%M", "%H:%M:%S"] {
        if let Ok(t) = NaiveTime::parse_from_str(&cleaned, fmt) {
            return Some(t);
        }
    }
    // 3pm, 3:30pm, 11am
    let (digits, pm) = if let Some(d) = cleaned.strip_suffix("pm") {
        (d, true)
    } else if let Some(d) = cleaned.strip_suffix("am") {
        (d, false)
    } else {
        return None;
    };
    let (h, m) = match digits.split_once(':') {
        Some((h, m)) => (h.parse::<u32>().ok()?, m.parse::<u32>().ok()?),
        None => (digits.parse::<u32>().ok()?, 0),
    };
    if !(1..=12).contains(&h) {
        return None;
    }
    let hour = match (h, pm) {
        (12, false) => 0,
        (12, true) => 12,
        (h, true) => h + 12,
        (h, false) => h,
    };
    NaiveTime::from_hms_opt(hour, m, 0)
}

pub fn normalize_phone(s: &str) -> Option<String> {
    let trimmed = s.trim();
    let digits: String = trimmed.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() < 7 || digits.len() > 15 {
        return None;
    }
    if trimmed.starts_with('+') {
        Some(format!("+{digits}"))
    } else {
        Some(digits)
    }
}

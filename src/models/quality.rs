use serde::{Deserialize, Serialize};

pub const MIN_HELPFULNESS: f64 = 7.0;
pub const MIN_ACCURACY: f64 = 8.0;
pub const MIN_EMPATHY: f64 = 6.0;
pub const MIN_CLARITY: f64 = 7.0;
pub const MIN_OVERALL: f64 = 7.0;
pub const ESCALATION_THRESHOLD: f64 = 5.0;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct QualityScore {
    pub helpfulness: f64,
    pub accuracy: f64,
    pub empathy: f64,
    pub clarity: f64,
}

impl QualityScore {
    pub fn neutral() -> Self {
        Self {
            helpfulness: 5.0,
            accuracy: 5.0,
            empathy: 5.0,
            clarity: 5.0,
        }
    }

    pub fn clamped(self) -> Self {
        let c = |v: f64| v.clamp(0.0, 10.0);
        Self {
            helpfulness: c(self.helpfulness),
            accuracy: c(self.accuracy),
            empathy: c(self.empathy),
            clarity: c(self.clarity),
        }
    }

    pub fn overall(&self) -> f64 {
        (self.helpfulness + self.accuracy + self.empathy + self.clarity) / 4.0
    }

    pub fn shortfalls(&self) -> Vec<&'static str> {
        let mut short = Vec::new();
        if self.helpfulness < MIN_HELPFULNESS {
            short.push("helpfulness");
        }
        if self.accuracy < MIN_ACCURACY {
            short.push("accuracy");
        }
        if self.empathy < MIN_EMPATHY {
            short.push("empathy");
        }
        if self.clarity < MIN_CLARITY {
            short.push("clarity");
        }
        short
    }

    pub fn meets_bar(&self) -> bool {
        self.shortfalls().is_empty() && self.overall() >= MIN_OVERALL
    }

    pub fn warrants_escalation(&self) -> bool {
        self.overall() < ESCALATION_THRESHOLD
    }

    pub fn failure_reason(&self) -> Option<String> {
        let mut parts: Vec<String> = self
            .shortfalls()
            .into_iter()
            .map(|d| format!("{d} below minimum"))
            .collect();
        if self.overall() < MIN_OVERALL {
            parts.push(format!("overall {:.1} below {MIN_OVERALL}", self.overall()));
        }
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("; "))
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct QualityVerdict {
    pub passed: bool,
    pub reason: Option<String>,
    pub should_escalate: bool,
    pub score: Option<QualityScore>,
    pub flags: Vec<String>,
    pub response: String,
    pub improved: bool,
    pub degraded: bool,
}

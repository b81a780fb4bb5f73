use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

pub const DEFAULT_DURATION_MINUTES: i64 = 60;

static HOURS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*(?:hours?|hrs?|h)\b").unwrap());
static MINUTES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d+)\s*(?:minutes?|mins?)\b").unwrap());

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PackageType {
    Studio,
    Outdoor,
}

impl PackageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PackageType::Studio => "studio",
            PackageType::Outdoor => "outdoor",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "outdoor" => PackageType::Outdoor,
            _ => PackageType::Studio,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PackageFeatures {
    #[serde(default)]
    pub makeup: bool,
    #[serde(default)]
    pub outfits: u32,
    #[serde(default)]
    pub styling: bool,
    #[serde(default)]
    pub photobook: bool,
    #[serde(default)]
    pub mount: bool,
    #[serde(default)]
    pub balloon_backdrop: bool,
    #[serde(default)]
    pub wig: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Package {
    pub name: String,
    pub package_type: PackageType,
    pub price: f64,
    pub deposit: f64,
    pub duration: String,
    #[serde(default)]
    pub features: PackageFeatures,
    #[serde(default)]
    pub notes: String,
}

impl Package {
    pub fn duration_minutes(&self) -> i64 {
        parse_duration_minutes(&self.duration)
    }

    pub fn summary_line(&self) -> String {
        format!("• {} ({}) - {:.0}", self.name, self.package_type.as_str(), self.price)
    }

    pub fn detail_view(&self) -> String {
        let mut lines = vec![
            format!("*{}* ({} session)", self.name, self.package_type.as_str()),
            format!("Price: {:.0}", self.price),
            format!("Deposit: {:.0}", self.deposit),
            format!("Duration: {}", self.duration),
        ];

        let f = &self.features;
        let mut included = Vec::new();
        if f.makeup {
            included.push("professional makeup".to_string());
        }
        if f.outfits > 0 {
            let plural = if f.outfits == 1 { "" } else { "s" };
            included.push(format!("{} outfit{plural}", f.outfits));
        }
        if f.styling {
            included.push("styling".to_string());
        }
        if f.photobook {
            included.push("photobook".to_string());
        }
        if f.mount {
            included.push("framed mount".to_string());
        }
        if f.balloon_backdrop {
            included.push("balloon backdrop".to_string());
        }
        if f.wig {
            included.push("wig".to_string());
        }
        if !included.is_empty() {
            lines.push(format!("Includes: {}", included.join(", ")));
        }
        if !self.notes.is_empty() {
            lines.push(self.notes.clone());
        }

        lines.join("\n")
    }
}

pub fn parse_duration_minutes(text: &str) -> i64 {
    let mut total = 0.0;
    let mut matched = false;

    for cap in HOURS.captures_iter(text) {
        if let Ok(h) = cap[1].parse::<f64>() {
            total += h * 60.0;
            matched = true;
        }
    }
    for cap in MINUTES.captures_iter(text) {
        if let Ok(m) = cap[1].parse::<f64>() {
            total += m;
            matched = true;
        }
    }

    if matched && total > 0.0 {
        total.round() as i64
    } else {
        DEFAULT_DURATION_MINUTES
    }
}

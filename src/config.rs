use std::env;

use chrono::NaiveTime;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    pub admin_token: String,
    pub llm_provider: String,
    pub groq_api_key: String,
    pub groq_model: String,
    pub ollama_url: String,
    pub ollama_model: String,
    pub meta_access_token: String,
    pub whatsapp_phone_number_id: String,
    pub webhook_secret: String,
    pub owner_phone: String,
    pub studio_name: String,
    pub business_open: NaiveTime,
    pub business_close: NaiveTime,
    pub slot_suggestions: usize,
    pub quality_gate_enabled: bool,
    pub calendar_url: String,
    pub calendar_token: String,
    pub catalog_ttl_secs: u64,
    pub vip_threshold: f64,
    pub faq_min_occurrences: usize,
    pub deposit_instructions: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            database_url: "studiobook.db".to_string(),
            admin_token: "changeme".to_string(),
            llm_provider: "ollama".to_string(),
            groq_api_key: String::new(),
            groq_model: "llama-3.3-70b-versatile".to_string(),
            ollama_url: "http://localhost:11434".to_string(),
            ollama_model: "llama3.2".to_string(),
            meta_access_token: String::new(),
            whatsapp_phone_number_id: String::new(),
            webhook_secret: String::new(),
            owner_phone: String::new(),
            studio_name: "the studio".to_string(),
            business_open: NaiveTime::from_hms_opt(9, 0, 0).unwrap_or_default(),
            business_close: NaiveTime::from_hms_opt(18, 0, 0).unwrap_or_default(),
            slot_suggestions: 5,
            quality_gate_enabled: true,
            calendar_url: String::new(),
            calendar_token: String::new(),
            catalog_ttl_secs: 300,
            vip_threshold: 1000.0,
            faq_min_occurrences: 3,
            deposit_instructions: "Please transfer the deposit to the studio account and reply with your receipt.".to_string(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            port: parsed("PORT").unwrap_or(defaults.port),
            database_url: env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            admin_token: env::var("ADMIN_TOKEN").unwrap_or(defaults.admin_token),
            llm_provider: env::var("LLM_PROVIDER").unwrap_or(defaults.llm_provider),
            groq_api_key: env::var("GROQ_API_KEY").unwrap_or_default(),
            groq_model: env::var("GROQ_MODEL").unwrap_or(defaults.groq_model),
            ollama_url: env::var("OLLAMA_URL").unwrap_or(defaults.ollama_url),
            ollama_model: env::var("OLLAMA_MODEL").unwrap_or(defaults.ollama_model),
            meta_access_token: env::var("META_ACCESS_TOKEN").unwrap_or_default(),
            whatsapp_phone_number_id: env::var("WHATSAPP_PHONE_NUMBER_ID").unwrap_or_default(),
            webhook_secret: env::var("WEBHOOK_SECRET").unwrap_or_default(),
            owner_phone: env::var("OWNER_PHONE").unwrap_or_default(),
            studio_name: env::var("STUDIO_NAME").unwrap_or(defaults.studio_name),
            business_open: time_var("BUSINESS_OPEN").unwrap_or(defaults.business_open),
            business_close: time_var("BUSINESS_CLOSE").unwrap_or(defaults.business_close),
            slot_suggestions: parsed("SLOT_SUGGESTIONS").unwrap_or(defaults.slot_suggestions),
            quality_gate_enabled: parsed("QUALITY_GATE_ENABLED")
                .unwrap_or(defaults.quality_gate_enabled),
            calendar_url: env::var("CALENDAR_URL").unwrap_or_default(),
            calendar_token: env::var("CALENDAR_TOKEN").unwrap_or_default(),
            catalog_ttl_secs: parsed("CATALOG_TTL_SECS").unwrap_or(defaults.catalog_ttl_secs),
            vip_threshold: parsed("VIP_THRESHOLD").unwrap_or(defaults.vip_threshold),
            faq_min_occurrences: parsed("FAQ_MIN_OCCURRENCES")
                .unwrap_or(defaults.faq_min_occurrences),
            deposit_instructions: env::var("DEPOSIT_INSTRUCTIONS")
                .unwrap_or(defaults.deposit_instructions),
        }
    }
}

fn parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

fn time_var(key: &str) -> Option<NaiveTime> {
    env::var(key)
        .ok()
        .and_then(|v| NaiveTime::parse_from_str(v.trim(), "%H:%M").ok())
}

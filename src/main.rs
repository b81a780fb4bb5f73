use std::sync::Arc;

use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use studiobook::config::AppConfig;
use studiobook::db::{self, Db};
use studiobook::handlers;
use studiobook::models::Channel;
use studiobook::services::ai::groq::GroqProvider;
use studiobook::services::ai::ollama::OllamaProvider;
use studiobook::services::ai::LlmProvider;
use studiobook::services::calendar::{CalendarService, HttpCalendar, NoopCalendar};
use studiobook::services::escalation::{LogSink, NotificationSink, OwnerMessagingSink};
use studiobook::services::messaging::meta::{MetaEndpoint, MetaGraphProvider};
use studiobook::services::messaging::MessagingRegistry;
use studiobook::services::payment::BankTransferPayments;
use studiobook::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();

    let conn = db::init_db(&config.database_url)?;

    let llm: Box<dyn LlmProvider> = match config.llm_provider.as_str() {
        "groq" => {
            anyhow::ensure!(!config.groq_api_key.is_empty(), "GROQ_API_KEY must be set when LLM_PROVIDER=groq");
            tracing::info!("using Groq LLM provider (model: {})", config.groq_model);
            Box::new(GroqProvider::new(config.groq_api_key.clone(), config.groq_model.clone()))
        }
        _ => {
            tracing::info!("using Ollama LLM provider (url: {}, model: {})", config.ollama_url, config.ollama_model);
            Box::new(OllamaProvider::new(config.ollama_url.clone(), config.ollama_model.clone()))
        }
    };

    let mut messaging = MessagingRegistry::new();
    if config.meta_access_token.is_empty() {
        tracing::warn!("META_ACCESS_TOKEN not set, replies will not be delivered");
    } else {
        let page_send = Arc::new(MetaGraphProvider::new(
            config.meta_access_token.clone(),
            MetaEndpoint::PageSend,
        ));
        messaging = messaging
            .with(Channel::Instagram, page_send.clone())
            .with(Channel::Messenger, page_send);
        if !config.whatsapp_phone_number_id.is_empty() {
            messaging = messaging.with(
                Channel::Whatsapp,
                Arc::new(MetaGraphProvider::new(
                    config.meta_access_token.clone(),
                    MetaEndpoint::WhatsApp {
                        phone_number_id: config.whatsapp_phone_number_id.clone(),
                    },
                )),
            );
        }
    }

    let calendar: Box<dyn CalendarService> = if config.calendar_url.is_empty() {
        tracing::info!("no calendar configured, availability uses stored bookings only");
        Box::new(NoopCalendar)
    } else {
        Box::new(HttpCalendar::new(config.calendar_url.clone(), config.calendar_token.clone()))
    };

    let notifier: Box<dyn NotificationSink> = match messaging.get(Channel::Whatsapp) {
        Some(provider) if !config.owner_phone.is_empty() => {
            Box::new(OwnerMessagingSink::new(provider, config.owner_phone.clone()))
        }
        _ => Box::new(LogSink),
    };

    let payments = Box::new(BankTransferPayments::new(config.deposit_instructions.clone()));

    let addr = format!("0.0.0.0:{}", config.port);
    let state = Arc::new(AppState::new(
        Db::new(conn),
        config,
        llm,
        messaging,
        calendar,
        payments,
        notifier,
    ));

    let app = handlers::router(state).layer(TraceLayer::new_for_http());

    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

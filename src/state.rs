use std::sync::atomic::AtomicBool;
use std::time::Duration;

use crate::config::AppConfig;
use crate::db::Db;
use crate::services::ai::LlmProvider;
use crate::services::availability::{AvailabilityChecker, BusinessHours};
use crate::services::calendar::CalendarService;
use crate::services::catalog::PackageCatalog;
use crate::services::escalation::NotificationSink;
use crate::services::messaging::MessagingRegistry;
use crate::services::payment::PaymentProvider;
use crate::services::queue::CustomerQueue;

pub struct AppState {
    pub db: Db,
    pub config: AppConfig,
    pub llm: Box<dyn LlmProvider>,
    pub messaging: MessagingRegistry,
    pub calendar: Box<dyn CalendarService>,
    pub payments: Box<dyn PaymentProvider>,
    pub notifier: Box<dyn NotificationSink>,
    pub catalog: PackageCatalog,
    pub queue: CustomerQueue,
    // Inbound messages are stored but not answered while set.
    pub paused: AtomicBool,
}

impl AppState {
    pub fn new(
        db: Db,
        config: AppConfig,
        llm: Box<dyn LlmProvider>,
        messaging: MessagingRegistry,
        calendar: Box<dyn CalendarService>,
        payments: Box<dyn PaymentProvider>,
        notifier: Box<dyn NotificationSink>,
    ) -> Self {
        let catalog = PackageCatalog::new(Duration::from_secs(config.catalog_ttl_secs));
        Self {
            db,
            config,
            llm,
            messaging,
            calendar,
            payments,
            notifier,
            catalog,
            queue: CustomerQueue::new(),
            paused: AtomicBool::new(false),
        }
    }

    pub fn availability(&self) -> AvailabilityChecker<'_> {
        AvailabilityChecker {
            db: &self.db,
            calendar: self.calendar.as_ref(),
            hours: BusinessHours {
                open: self.config.business_open,
                close: self.config.business_close,
            },
            max_alternatives: self.config.slot_suggestions,
        }
    }
}

pub mod ai;
pub mod availability;
pub mod calendar;
pub mod catalog;
pub mod conversation;
pub mod drafts;
pub mod escalation;
pub mod learning;
pub mod memory;
pub mod messaging;
pub mod payment;
pub mod quality;
pub mod queue;
pub mod strategies;

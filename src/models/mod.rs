pub mod assessment;
pub mod booking;
pub mod conversation;
pub mod customer;
pub mod draft;
pub mod escalation;
pub mod learning;
pub mod memory;
pub mod package;
pub mod quality;

pub use assessment::{Complexity, EmotionalTone, Intent, IntentAssessment, UrgencyLevel};
pub use booking::{Booking, BookingStatus};
pub use conversation::{Conversation, ConversationMessage, HISTORY_LIMIT};
pub use customer::{Channel, ChannelIdentity, Customer};
pub use draft::{BookingDraft, BookingExtraction, DraftField, DraftStep};
pub use escalation::{Escalation, EscalationAlert, EscalationStatus, EscalationType, SessionNote};
pub use learning::{ConversationLearningRecord, FaqEntry, FaqEntryStatus, IntentPattern, TurnOutcome};
pub use memory::{CommunicationStyle, CustomerMemory, RelationshipStage, TimeOfDay};
pub use package::{Package, PackageFeatures, PackageType};
pub use quality::{QualityScore, QualityVerdict};

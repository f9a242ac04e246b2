//! Database model modules - extends Database with domain-specific methods
//!
//! Each module adds `impl Database` blocks with methods for a specific table group.

mod analytics;     // dashboard aggregation queries
mod auth;          // auth_sessions
mod batch_jobs;    // batch_jobs
mod conversations; // conversations, messages
mod integrations;  // integration_configs
mod knowledge;     // knowledge_files
mod notifications; // notifications
mod subscriptions; // subscription_tiers, user_subscriptions, invoices, payments
mod tasks;         // tasks
mod users;         // users
mod webhook_events; // webhook_events

pub use analytics::{DailyActivity, PlatformCount, ResponseTimeSample, StatusCount};
pub use conversations::ConversationFilter;

mod batch_job;
mod conversation;
mod integration;
mod knowledge;
mod notification;
mod session;
mod subscription;
mod task;
mod user;
mod webhook_event;

pub use batch_job::{BatchJob, CreateBatchJobRequest, JobStatus, JobType};
pub use conversation::{
    Conversation, ConversationStatus, ConversationWithMessages, CreateConversationRequest,
    CreateMessageRequest, Message, Platform, SenderType, Sentiment, UpdateConversationRequest,
};
pub use integration::{ConnectIntegrationRequest, IntegrationConfig, IntegrationKind, IntegrationStatus};
pub use knowledge::{KnowledgeFile, KnowledgeSearchHit, NewKnowledgeFile, UpdateKnowledgeFileRequest};
pub use notification::{Notification, NotificationLevel};
pub use session::Session;
pub use subscription::{
    BillingCycle, CreatePaymentRequest, CreateTierRequest, Invoice, InvoiceStatus, Payment,
    SubscribeRequest, SubscriptionStatus, SubscriptionTier, UpdateTierRequest, UserSubscription,
};
pub use task::{CreateTaskRequest, Task, TaskPriority, TaskStatus, UpdateTaskRequest};
pub use user::{
    AdminUpdateUserRequest, ChangePasswordRequest, LoginRequest, RegisterRequest,
    UpdateProfileRequest, User, UserRole,
};
pub use webhook_event::WebhookEvent;

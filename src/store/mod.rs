mod memory;
mod postgres;

use async_trait::async_trait;
pub use memory::InMemoryStore;
pub use postgres::PgStore;

use crate::domain::MailTask;
use crate::domain::ReminderMarker;

/// Per-user record owned by the payment integration
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct CustomerRecord {
    pub user_id: String,
    /// Payment-provider customer id, once established
    pub stripe_id: Option<String>,
    pub email: Option<String>,
}

/// Per-user profile document
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct UserProfile {
    pub user_id: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
}

/// Result of the conditional marker write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerWrite {
    /// Marker created and reminder mail enqueued, atomically
    Recorded,
    /// A marker already existed; nothing was written
    AlreadySent,
}

/// All durable state goes through here. Identity, customer and subscription
/// data are read-only; markers and mail tasks are write-once.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Whether any subscription is `active` or `trialing`
    async fn has_entitled_subscription(
        &self,
        user_id: &str,
    ) -> Result<bool, anyhow::Error>;

    async fn customer(
        &self,
        user_id: &str,
    ) -> Result<Option<CustomerRecord>, anyhow::Error>;

    /// Exact match on the payment-provider customer id
    async fn customer_by_stripe_id(
        &self,
        stripe_id: &str,
    ) -> Result<Option<CustomerRecord>, anyhow::Error>;

    async fn user_profile(
        &self,
        user_id: &str,
    ) -> Result<Option<UserProfile>, anyhow::Error>;

    async fn reminder_marker_exists(
        &self,
        user_id: &str,
    ) -> Result<bool, anyhow::Error>;

    /// Create `marker` if absent and, only then, enqueue `mail`. Both writes
    /// commit together or not at all; concurrent callers for the same user
    /// see exactly one `MarkerWrite::Recorded`.
    async fn record_reminder(
        &self,
        marker: &ReminderMarker,
        mail: &MailTask,
    ) -> Result<MarkerWrite, anyhow::Error>;

    /// Enqueue all `tasks`, or none
    async fn enqueue_mail(
        &self,
        tasks: &[MailTask],
    ) -> Result<(), anyhow::Error>;
}

use chrono::DateTime;
use chrono::Utc;

/// Reminder kind stored alongside each marker; a user has at most one marker
/// per kind.
pub const ABANDONED_REGISTRATION: &str = "abandoned_registration";

/// Durable proof that the abandoned-registration reminder was sent to a user.
/// Written once, never updated or deleted.
#[derive(Debug, Clone, PartialEq)]
pub struct ReminderMarker {
    pub user_id: String,
    pub sent_at: DateTime<Utc>,
    pub email: String,
    /// Price id of the plan offered in the reminder
    pub plan: String,
}

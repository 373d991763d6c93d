use chrono::DateTime;
use chrono::Utc;

/// A registered user, as listed by the identity provider. Read-only here.
#[derive(Debug, Clone, PartialEq)]
pub struct Identity {
    pub id: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub created_at: DateTime<Utc>,
    /// ISO 3166-1 alpha-2, e.g. "MX"
    pub country: Option<String>,
    pub marketing_opt_out: bool,
}

impl Identity {
    /// The provider reports creation time in milliseconds since the epoch
    pub fn created_at_from_millis(millis: i64) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(millis)
    }
}

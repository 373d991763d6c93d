use chrono::DateTime;
use chrono::Duration;
use chrono::Utc;

/// Registration-age interval during which an unsubscribed user is eligible for
/// the abandoned-registration reminder.
///
/// For `now`, a user is inside the window iff
/// `now - start_age < created_at < now - end_age`. Both bounds are exclusive,
/// and everything is evaluated in UTC.
///
/// With the default 30h/24h band and a cron running a few times a day, each
/// user falls into the window during exactly one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReminderWindow {
    start_age: Duration,
    end_age: Duration,
}

impl ReminderWindow {
    pub fn new(
        start_age: Duration,
        end_age: Duration,
    ) -> Result<Self, anyhow::Error> {
        if end_age < Duration::zero() {
            anyhow::bail!("window end cannot be in the future (end_age = {end_age})")
        }
        if end_age >= start_age {
            anyhow::bail!(
                "window start must be older than window end (start_age = {start_age}, end_age = \
                 {end_age})"
            )
        }
        Ok(Self { start_age, end_age })
    }

    pub fn from_hours(
        start_hours: i64,
        end_hours: i64,
    ) -> Result<Self, anyhow::Error> {
        Self::new(Duration::hours(start_hours), Duration::hours(end_hours))
    }

    /// `(low, high)` creation-time bounds for `now`
    pub fn bounds(
        &self,
        now: DateTime<Utc>,
    ) -> (DateTime<Utc>, DateTime<Utc>) {
        (now - self.start_age, now - self.end_age)
    }

    pub fn contains(
        &self,
        now: DateTime<Utc>,
        created_at: DateTime<Utc>,
    ) -> bool {
        let (low, high) = self.bounds(now);
        low < created_at && created_at < high
    }
}

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::MutexGuard;

use async_trait::async_trait;

use super::CustomerRecord;
use super::DocumentStore;
use super::MarkerWrite;
use super::UserProfile;
use crate::domain::MailTask;
use crate::domain::ReminderMarker;
use crate::domain::SubscriptionStatus;

#[derive(Default)]
struct State {
    customers: HashMap<String, CustomerRecord>,
    subscriptions: HashMap<String, Vec<SubscriptionStatus>>,
    profiles: HashMap<String, UserProfile>,
    markers: HashMap<String, ReminderMarker>,
    mail: Vec<MailTask>,
}

/// In-process `DocumentStore`, used wherever a real database would get in the
/// way (tests, mostly). A single lock guards everything, so the conditional
/// marker write is trivially atomic.
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Self { Self::default() }

    fn state(&self) -> MutexGuard<'_, State> {
        // a panic while holding the lock leaves plain data behind; keep going
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn insert_customer(
        &self,
        customer: CustomerRecord,
    ) {
        self.state()
            .customers
            .insert(customer.user_id.clone(), customer);
    }

    pub fn insert_subscription(
        &self,
        user_id: &str,
        status: SubscriptionStatus,
    ) {
        self.state()
            .subscriptions
            .entry(user_id.to_string())
            .or_default()
            .push(status);
    }

    pub fn insert_profile(
        &self,
        profile: UserProfile,
    ) {
        self.state()
            .profiles
            .insert(profile.user_id.clone(), profile);
    }

    pub fn insert_marker(
        &self,
        marker: ReminderMarker,
    ) {
        self.state()
            .markers
            .insert(marker.user_id.clone(), marker);
    }

    pub fn mail(&self) -> Vec<MailTask> { self.state().mail.clone() }

    pub fn markers(&self) -> Vec<ReminderMarker> {
        self.state().markers.values().cloned().collect()
    }

    pub fn marker(
        &self,
        user_id: &str,
    ) -> Option<ReminderMarker> {
        self.state().markers.get(user_id).cloned()
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn has_entitled_subscription(
        &self,
        user_id: &str,
    ) -> Result<bool, anyhow::Error> {
        let state = self.state();
        Ok(state
            .subscriptions
            .get(user_id)
            .is_some_and(|subs| subs.iter().any(SubscriptionStatus::is_entitled)))
    }

    async fn customer(
        &self,
        user_id: &str,
    ) -> Result<Option<CustomerRecord>, anyhow::Error> {
        let state = self.state();
        Ok(state.customers.get(user_id).cloned())
    }

    async fn customer_by_stripe_id(
        &self,
        stripe_id: &str,
    ) -> Result<Option<CustomerRecord>, anyhow::Error> {
        let state = self.state();
        Ok(state
            .customers
            .values()
            .find(|c| c.stripe_id.as_deref() == Some(stripe_id))
            .cloned())
    }

    async fn user_profile(
        &self,
        user_id: &str,
    ) -> Result<Option<UserProfile>, anyhow::Error> {
        let state = self.state();
        Ok(state.profiles.get(user_id).cloned())
    }

    async fn reminder_marker_exists(
        &self,
        user_id: &str,
    ) -> Result<bool, anyhow::Error> {
        let state = self.state();
        Ok(state.markers.contains_key(user_id))
    }

    async fn record_reminder(
        &self,
        marker: &ReminderMarker,
        mail: &MailTask,
    ) -> Result<MarkerWrite, anyhow::Error> {
        let mut state = self.state();
        if state.markers.contains_key(&marker.user_id) {
            return Ok(MarkerWrite::AlreadySent);
        }
        state
            .markers
            .insert(marker.user_id.clone(), marker.clone());
        state.mail.push(mail.clone());
        Ok(MarkerWrite::Recorded)
    }

    async fn enqueue_mail(
        &self,
        tasks: &[MailTask],
    ) -> Result<(), anyhow::Error> {
        self.state().mail.extend_from_slice(tasks);
        Ok(())
    }
}

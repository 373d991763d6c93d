use std::fmt::Debug;
use std::fmt::Display;
use std::sync::Arc;

use chrono::DateTime;
use chrono::Utc;
use serde::Serialize;
use serde_json::json;

use crate::configuration::Settings;
use crate::domain::DisplayName;
use crate::domain::Identity;
use crate::domain::MailTask;
use crate::domain::PlanCatalog;
use crate::domain::ReminderMarker;
use crate::domain::ReminderWindow;
use crate::domain::UserEmail;
use crate::identity_provider::IdentityPages;
use crate::identity_provider::IdentityProvider;
use crate::payment::CheckoutCustomer;
use crate::payment::CheckoutRequest;
use crate::payment::PaymentProvider;
use crate::store::DocumentStore;
use crate::store::MarkerWrite;
use crate::utils::error_chain_fmt;

/// Everything about a scan that comes from configuration rather than from
/// collaborators
#[derive(Clone)]
pub struct ReminderPolicy {
    pub window: ReminderWindow,
    pub plans: PlanCatalog,
    pub trial_period_days: u32,
    /// Call-to-action when no checkout session could be created
    pub fallback_checkout_url: String,
    pub template: String,
}

impl ReminderPolicy {
    pub fn from_settings(cfg: &Settings) -> Result<Self, anyhow::Error> {
        Ok(Self {
            window: cfg.reminders.window()?,
            plans: cfg.stripe.plan_catalog(),
            trial_period_days: cfg.stripe.trial_period_days,
            fallback_checkout_url: cfg.stripe.fallback_checkout_url.clone(),
            template: cfg.mail.reminder_template.clone(),
        })
    }
}

/// Users reminded by one scan
#[derive(Debug, Default, Serialize)]
pub struct ScanReport {
    pub processed: usize,
    pub emails: Vec<String>,
}

#[derive(thiserror::Error)]
pub enum ScanError {
    #[error("could not list identities: {0}")]
    Listing(#[source] anyhow::Error),
}

impl Debug for ScanError {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

#[derive(Debug)]
enum Skip {
    OptedOut,
    NoUsableEmail,
    Subscribed,
    AlreadyReminded,
}

impl Display for Skip {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.write_str(match self {
            Skip::OptedOut => "opted out of marketing email",
            Skip::NoUsableEmail => "no usable email",
            Skip::Subscribed => "already subscribed",
            Skip::AlreadyReminded => "already reminded",
        })
    }
}

enum Outcome {
    Reminded(UserEmail),
    Skipped(Skip),
}

/// Finds users who registered (inside the reminder window) but never
/// subscribed, and sends each of them one reminder with a checkout link.
///
/// Stateless; all state lives behind `DocumentStore`, so any number of scans
/// may run concurrently without sending a reminder twice.
pub struct ReminderScan {
    identities: Arc<dyn IdentityProvider>,
    store: Arc<dyn DocumentStore>,
    payments: Arc<dyn PaymentProvider>,
    policy: ReminderPolicy,
}

impl ReminderScan {
    pub fn new(
        identities: Arc<dyn IdentityProvider>,
        store: Arc<dyn DocumentStore>,
        payments: Arc<dyn PaymentProvider>,
        policy: ReminderPolicy,
    ) -> Self {
        Self {
            identities,
            store,
            payments,
            policy,
        }
    }

    /// Walk every identity page. Failures concerning a single user are logged
    /// and skipped; only a failed listing call aborts the scan.
    #[tracing::instrument(
        name = "Scanning for abandoned registrations",
        skip(self),
        fields(processed = tracing::field::Empty)
    )]
    pub async fn run(
        &self,
        now: DateTime<Utc>,
    ) -> Result<ScanReport, ScanError> {
        let mut report = ScanReport::default();
        let mut pages = IdentityPages::new(self.identities.as_ref());

        while let Some(page) = pages.next_page().await.map_err(ScanError::Listing)? {
            for identity in page {
                if !self.policy.window.contains(now, identity.created_at) {
                    continue;
                }
                match self.remind(&identity).await {
                    Ok(Outcome::Reminded(email)) => {
                        report.processed += 1;
                        report.emails.push(email.as_ref().to_string());
                    }
                    Ok(Outcome::Skipped(reason)) => {
                        tracing::debug!(user_id = %identity.id, %reason, "skipping user")
                    }
                    Err(e) => tracing::error!(
                        error.cause_chain = ?e,
                        error.message = %e,
                        user_id = %identity.id,
                        "failed to remind user, skipping"
                    ),
                }
            }
        }

        tracing::Span::current().record("processed", report.processed);
        Ok(report)
    }

    /// Gates run cheapest-first, with opt-out before anything else
    async fn remind(
        &self,
        identity: &Identity,
    ) -> Result<Outcome, anyhow::Error> {
        if identity.marketing_opt_out {
            return Ok(Outcome::Skipped(Skip::OptedOut));
        }
        let Some(email) = UserEmail::resolve([identity.email.clone()]) else {
            return Ok(Outcome::Skipped(Skip::NoUsableEmail));
        };
        if self.store.has_entitled_subscription(&identity.id).await? {
            return Ok(Outcome::Skipped(Skip::Subscribed));
        }
        // not the commit point (see `record_reminder`), but it saves minting a
        // checkout session for users we already reminded
        if self.store.reminder_marker_exists(&identity.id).await? {
            return Ok(Outcome::Skipped(Skip::AlreadyReminded));
        }

        let plan = self.policy.plans.for_country(identity.country.as_deref());
        let customer = match self
            .store
            .customer(&identity.id)
            .await?
            .and_then(|c| c.stripe_id)
            .filter(|id| !id.trim().is_empty())
        {
            Some(stripe_id) => CheckoutCustomer::Existing(stripe_id),
            None => CheckoutCustomer::Email(email.clone()),
        };
        let checkout_url = self
            .checkout_url(&CheckoutRequest {
                customer,
                price_id: plan.price_id.clone(),
                trial_period_days: self.policy.trial_period_days,
                client_reference_id: identity.id.clone(),
            })
            .await;

        let name = DisplayName::resolve([identity.display_name.clone()]);
        let mut data = serde_json::Map::new();
        data.insert("displayName".to_string(), json!(name.as_ref()));
        data.insert("checkoutUrl".to_string(), json!(checkout_url));
        data.insert("planLabel".to_string(), json!(plan.label));
        let mail = MailTask::new(&email, &self.policy.template, data);

        let marker = ReminderMarker {
            user_id: identity.id.clone(),
            sent_at: Utc::now(),
            email: email.as_ref().to_string(),
            plan: plan.price_id.clone(),
        };
        match self.store.record_reminder(&marker, &mail).await? {
            MarkerWrite::Recorded => Ok(Outcome::Reminded(email)),
            // another scan got there between our check and our write
            MarkerWrite::AlreadySent => Ok(Outcome::Skipped(Skip::AlreadyReminded)),
        }
    }

    /// A failed checkout session degrades the call-to-action; it never blocks
    /// the reminder.
    async fn checkout_url(
        &self,
        request: &CheckoutRequest,
    ) -> String {
        match self.payments.create_checkout_session(request).await {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!(
                    error.cause_chain = ?e,
                    error.message = %e,
                    user_id = %request.client_reference_id,
                    "could not create checkout session, using fallback url"
                );
                self.policy.fallback_checkout_url.clone()
            }
        }
    }
}

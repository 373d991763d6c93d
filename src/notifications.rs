use std::fmt::Debug;
use std::sync::Arc;

use chrono::DateTime;
use chrono::Utc;
use serde_json::json;

use crate::configuration::Settings;
use crate::domain::DisplayName;
use crate::domain::MailTask;
use crate::domain::PlanCatalog;
use crate::domain::UserEmail;
use crate::payment::CustomerRef;
use crate::payment::PaymentProvider;
use crate::payment::StripeEvent;
use crate::payment::SubscriptionObject;
use crate::store::DocumentStore;
use crate::utils::error_chain_fmt;

/// Used when a subscription carries no price we can name
pub const DEFAULT_PLAN_LABEL: &str = "Premium";

#[derive(Clone)]
pub struct NotificationPolicy {
    pub plans: PlanCatalog,
    pub admin_email: UserEmail,
    pub welcome_template: String,
    pub admin_template: String,
}

impl NotificationPolicy {
    pub fn from_settings(cfg: &Settings) -> Result<Self, anyhow::Error> {
        Ok(Self {
            plans: cfg.stripe.plan_catalog(),
            admin_email: cfg.mail.admin()?,
            welcome_template: cfg.mail.welcome_template.clone(),
            admin_template: cfg.mail.admin_template.clone(),
        })
    }
}

/// What a verified event led to. Every variant is a success as far as the
/// payment provider is concerned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// Not a `customer.subscription.created` event
    Ignored,
    /// No customer record carries this provider id
    UnknownCustomer(String),
    /// Customer resolved, but no candidate email parsed
    NoUsableEmail(String),
    /// Welcome and admin mails enqueued
    Notified { user_id: String },
}

#[derive(thiserror::Error)]
pub enum WebhookError {
    #[error("malformed subscription payload")]
    MalformedPayload(#[source] serde_json::Error),
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

impl Debug for WebhookError {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

/// Sends the welcome and admin mails for a newly created subscription. The
/// event must already be authenticated (see `WebhookVerifier`).
pub struct SubscriptionNotifier {
    store: Arc<dyn DocumentStore>,
    payments: Arc<dyn PaymentProvider>,
    policy: NotificationPolicy,
}

impl SubscriptionNotifier {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        payments: Arc<dyn PaymentProvider>,
        policy: NotificationPolicy,
    ) -> Self {
        Self {
            store,
            payments,
            policy,
        }
    }

    #[tracing::instrument(
        name = "Handling payment event",
        skip_all,
        fields(event_id = %event.id, event_type = %event.event_type)
    )]
    pub async fn handle(
        &self,
        event: &StripeEvent,
    ) -> Result<WebhookOutcome, WebhookError> {
        if !event.is_subscription_created() {
            return Ok(WebhookOutcome::Ignored);
        }
        let subscription = event.subscription().map_err(WebhookError::MalformedPayload)?;
        let stripe_id = subscription.customer.id();

        let Some(customer) = self.store.customer_by_stripe_id(stripe_id).await? else {
            tracing::warn!(stripe_id, "no customer record for subscription, ignoring");
            return Ok(WebhookOutcome::UnknownCustomer(stripe_id.to_string()));
        };
        let profile = self.store.user_profile(&customer.user_id).await?;

        let email = UserEmail::resolve([
            profile.as_ref().and_then(|p| p.email.clone()),
            customer.email.clone(),
            subscription.customer.email().map(str::to_string),
        ]);
        let Some(email) = email else {
            tracing::warn!(user_id = %customer.user_id, "no usable email for new subscriber");
            return Ok(WebhookOutcome::NoUsableEmail(customer.user_id));
        };
        let name = DisplayName::resolve([
            self.live_name(&subscription.customer).await,
            profile.and_then(|p| p.display_name),
        ]);
        let plan_label = self.plan_label(&subscription);
        let created_at = event
            .created
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .unwrap_or_else(Utc::now);

        let mut welcome = serde_json::Map::new();
        welcome.insert("displayName".to_string(), json!(name.as_ref()));
        welcome.insert("planLabel".to_string(), json!(plan_label));

        let mut admin = serde_json::Map::new();
        admin.insert("customerName".to_string(), json!(name.as_ref()));
        admin.insert("customerEmail".to_string(), json!(email.as_ref()));
        admin.insert("planLabel".to_string(), json!(plan_label));
        admin.insert("subscriptionId".to_string(), json!(subscription.id));
        admin.insert("createdAt".to_string(), json!(human_readable(created_at)));

        self.store
            .enqueue_mail(&[
                MailTask::new(&email, &self.policy.welcome_template, welcome),
                MailTask::new(
                    &self.policy.admin_email,
                    &self.policy.admin_template,
                    admin,
                ),
            ])
            .await?;

        tracing::info!(user_id = %customer.user_id, "new subscriber notified");
        Ok(WebhookOutcome::Notified {
            user_id: customer.user_id,
        })
    }

    /// The provider's current name for the customer. A failed lookup falls
    /// back to the name embedded in the event, if it was expanded.
    async fn live_name(
        &self,
        customer: &CustomerRef,
    ) -> Option<String> {
        let embedded = || match customer {
            CustomerRef::Expanded(c) => c.name.clone(),
            CustomerRef::Id(_) => None,
        };
        match self.payments.customer_name(customer.id()).await {
            Ok(name) => name.or_else(embedded),
            Err(e) => {
                tracing::warn!(
                    error.cause_chain = ?e,
                    error.message = %e,
                    "could not fetch customer name"
                );
                embedded()
            }
        }
    }

    fn plan_label(
        &self,
        subscription: &SubscriptionObject,
    ) -> String {
        let Some(price) = subscription.price() else {
            return DEFAULT_PLAN_LABEL.to_string();
        };
        self.policy
            .plans
            .label_for_price(&price.id)
            .map(str::to_string)
            .or_else(|| price.nickname.clone().filter(|n| !n.trim().is_empty()))
            .unwrap_or_else(|| price.id.clone())
    }
}

/// e.g. `02/05/2024 14:30 UTC`
fn human_readable(at: DateTime<Utc>) -> String { at.format("%d/%m/%Y %H:%M UTC").to_string() }

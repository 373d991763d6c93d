mod events;
mod signature;
mod stripe_client;

use async_trait::async_trait;
pub use events::CustomerRef;
pub use events::ExpandedCustomer;
pub use events::StripeEvent;
pub use events::SubscriptionObject;
pub use events::SUBSCRIPTION_CREATED;
pub use signature::compute_signature;
pub use signature::SignatureError;
pub use signature::WebhookVerifier;
pub use stripe_client::StripeClient;

use crate::domain::UserEmail;

/// Who a checkout session is for. An existing provider customer keeps their
/// saved details; otherwise the provider creates one from the email.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckoutCustomer {
    Existing(String),
    Email(UserEmail),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutRequest {
    pub customer: CheckoutCustomer,
    pub price_id: String,
    pub trial_period_days: u32,
    /// Our user id, echoed back by the provider on completion
    pub client_reference_id: String,
}

#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Create a hosted subscription checkout and return its URL
    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<String, anyhow::Error>;

    /// The customer's current name, as held by the provider
    async fn customer_name(
        &self,
        customer_id: &str,
    ) -> Result<Option<String>, anyhow::Error>;
}

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use secrecy::ExposeSecret;
use secrecy::Secret;
use serde::Deserialize;

use super::CheckoutCustomer;
use super::CheckoutRequest;
use super::PaymentProvider;

/// Minimal Stripe client built on reqwest; only the two calls we need.
pub struct StripeClient {
    http_client: Client,
    base_url: String,
    secret_key: Secret<String>,
    success_url: String,
    cancel_url: String,
}

#[derive(Debug, Deserialize)]
struct StripeErrorEnvelope {
    error: StripeErrorDetails,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetails {
    #[serde(rename = "type")]
    error_type: Option<String>,
    code: Option<String>,
    message: Option<String>,
}

#[derive(Deserialize)]
struct CheckoutSessionResponse {
    id: Option<String>,
    url: Option<String>,
}

#[derive(Deserialize)]
struct CustomerResponse {
    name: Option<String>,
}

impl StripeClient {
    pub fn new(
        base_url: String,
        secret_key: Secret<String>,
        success_url: String,
        cancel_url: String,
        timeout: Duration,
    ) -> Result<Self, anyhow::Error> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .context("could not build stripe http client")?;
        Ok(Self {
            http_client,
            base_url,
            secret_key,
            success_url,
            cancel_url,
        })
    }

    /// Pass 2xx responses through; log and fail on anything else, including
    /// Stripe's error envelope if present.
    async fn ensure_success(
        resp: reqwest::Response,
        context: &str,
    ) -> Result<reqwest::Response, anyhow::Error> {
        if resp.status().is_success() {
            return Ok(resp);
        }

        let status = resp.status();
        let request_id = resp
            .headers()
            .get("request-id")
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string());
        let body = resp.text().await.unwrap_or_default();
        let details = serde_json::from_str::<StripeErrorEnvelope>(&body)
            .map(|envelope| envelope.error)
            .ok();

        tracing::error!(
            status = %status,
            stripe_request_id = ?request_id,
            stripe_error_type = ?details.as_ref().and_then(|d| d.error_type.as_deref()),
            stripe_error_code = ?details.as_ref().and_then(|d| d.code.as_deref()),
            stripe_error_message = ?details.as_ref().and_then(|d| d.message.as_deref()),
            context = %context,
            "stripe api request failed"
        );

        anyhow::bail!("stripe api request failed: {context} (status {status})")
    }
}

#[async_trait]
impl PaymentProvider for StripeClient {
    #[tracing::instrument(
        name = "Creating checkout session",
        skip_all,
        fields(price_id = %request.price_id, user_id = %request.client_reference_id)
    )]
    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<String, anyhow::Error> {
        let mut form = vec![
            ("mode", "subscription".to_string()),
            ("line_items[0][price]", request.price_id.clone()),
            ("line_items[0][quantity]", "1".to_string()),
            (
                "subscription_data[trial_period_days]",
                request.trial_period_days.to_string(),
            ),
            ("client_reference_id", request.client_reference_id.clone()),
            ("success_url", self.success_url.clone()),
            ("cancel_url", self.cancel_url.clone()),
        ];
        match &request.customer {
            CheckoutCustomer::Existing(id) => form.push(("customer", id.clone())),
            CheckoutCustomer::Email(email) => {
                form.push(("customer_email", email.as_ref().to_string()))
            }
        }

        let resp = self
            .http_client
            .post(format!("{}/v1/checkout/sessions", self.base_url))
            .bearer_auth(self.secret_key.expose_secret())
            .form(&form)
            .send()
            .await
            .context("could not reach stripe")?;
        let session: CheckoutSessionResponse = Self::ensure_success(resp, "create checkout session")
            .await?
            .json()
            .await
            .context("invalid checkout session response")?;

        tracing::debug!(session_id = ?session.id, "checkout session created");
        session
            .url
            .ok_or_else(|| anyhow::anyhow!("checkout session has no url"))
    }

    #[tracing::instrument(name = "Fetching customer name", skip(self))]
    async fn customer_name(
        &self,
        customer_id: &str,
    ) -> Result<Option<String>, anyhow::Error> {
        let resp = self
            .http_client
            .get(format!("{}/v1/customers/{customer_id}", self.base_url))
            .bearer_auth(self.secret_key.expose_secret())
            .send()
            .await
            .context("could not reach stripe")?;
        let customer: CustomerResponse = Self::ensure_success(resp, "retrieve customer")
            .await?
            .json()
            .await
            .context("invalid customer response")?;
        Ok(customer.name)
    }
}

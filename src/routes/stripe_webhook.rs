use std::fmt::Debug;

use actix_web::http::StatusCode;
use actix_web::web;
use actix_web::HttpRequest;
use actix_web::HttpResponse;
use actix_web::ResponseError;
use chrono::Utc;
use serde_json::json;

use super::json_error;
use crate::notifications::SubscriptionNotifier;
use crate::notifications::WebhookError;
use crate::payment::SignatureError;
use crate::payment::StripeEvent;
use crate::payment::WebhookVerifier;
use crate::utils::error_chain_fmt;

pub const SIGNATURE_HEADER: &str = "Stripe-Signature";

/// Reasons to refuse a delivery outright. Nothing is written in any of these
/// cases.
#[derive(thiserror::Error)]
pub enum WebhookRejection {
    #[error("missing Stripe-Signature header")]
    MissingSignature,
    #[error("invalid signature")]
    InvalidSignature(#[source] SignatureError),
    #[error("malformed payload")]
    MalformedPayload(#[source] serde_json::Error),
}

impl Debug for WebhookRejection {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

impl ResponseError for WebhookRejection {
    fn status_code(&self) -> StatusCode { StatusCode::BAD_REQUEST }

    fn error_response(&self) -> HttpResponse { json_error(self.status_code(), self.to_string()) }
}

/// `POST /webhooks/stripe`
///
/// The body is taken raw; the signature covers the exact bytes sent. Once the
/// signature checks out we always answer 200, otherwise the provider would
/// keep redelivering an event we have already seen.
#[tracing::instrument(name = "Payment webhook", skip_all)]
pub async fn stripe_webhook(
    request: HttpRequest,
    body: web::Bytes,
    verifier: web::Data<WebhookVerifier>,
    notifier: web::Data<SubscriptionNotifier>,
) -> Result<HttpResponse, WebhookRejection> {
    let signature = request
        .headers()
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or(WebhookRejection::MissingSignature)?;
    verifier
        .verify(&body, signature, Utc::now())
        .map_err(WebhookRejection::InvalidSignature)?;
    let event: StripeEvent =
        serde_json::from_slice(&body).map_err(WebhookRejection::MalformedPayload)?;

    match notifier.handle(&event).await {
        Ok(outcome) => tracing::info!(?outcome, "payment event handled"),
        Err(WebhookError::MalformedPayload(e)) => {
            return Err(WebhookRejection::MalformedPayload(e))
        }
        Err(e) => tracing::error!(
            error.cause_chain = ?e,
            error.message = %e,
            event_id = %event.id,
            "failed to handle payment event"
        ),
    }
    Ok(HttpResponse::Ok().json(json!({ "status": "success" })))
}

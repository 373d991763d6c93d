use chrono::DateTime;
use chrono::Duration;
use chrono::Utc;
use hmac::Hmac;
use hmac::Mac;
use secrecy::ExposeSecret;
use secrecy::Secret;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum SignatureError {
    #[error("missing timestamp in signature header")]
    MissingTimestamp,
    #[error("invalid timestamp in signature header")]
    InvalidTimestamp,
    #[error("missing v1 signature in signature header")]
    MissingSignature,
    #[error("signature timestamp outside tolerance")]
    Expired,
    #[error("no signature matches the payload")]
    Mismatch,
}

/// Hex-encoded HMAC-SHA256 of `"{timestamp}.{payload}"`, as the payment
/// provider computes it.
pub fn compute_signature(
    payload: &[u8],
    secret: &Secret<String>,
    timestamp: i64,
) -> String {
    hex::encode(mac(payload, secret, timestamp).finalize().into_bytes())
}

fn mac(
    payload: &[u8],
    secret: &Secret<String>,
    timestamp: i64,
) -> HmacSha256 {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret.expose_secret().as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(format!("{timestamp}.").as_bytes());
    mac.update(payload);
    mac
}

/// Verifies `Stripe-Signature` headers (`t=<unix>,v1=<hex>[,v1=<hex>...]`)
/// against the raw request body. The secret never leaves this struct.
#[derive(Clone)]
pub struct WebhookVerifier {
    secret: Secret<String>,
    tolerance: Duration,
}

impl WebhookVerifier {
    pub fn new(
        secret: Secret<String>,
        tolerance: Duration,
    ) -> Self {
        Self { secret, tolerance }
    }

    /// Any `v1` entry may match (the provider sends several while a secret is
    /// being rolled). Comparison is constant-time.
    pub fn verify(
        &self,
        payload: &[u8],
        header: &str,
        now: DateTime<Utc>,
    ) -> Result<(), SignatureError> {
        let mut timestamp = None;
        let mut signatures = vec![];
        for part in header.split(',') {
            let part = part.trim();
            if let Some(t) = part.strip_prefix("t=") {
                timestamp = Some(t);
            } else if let Some(sig) = part.strip_prefix("v1=") {
                signatures.push(sig);
            }
        }

        let timestamp: i64 = timestamp
            .ok_or(SignatureError::MissingTimestamp)?
            .parse()
            .map_err(|_| SignatureError::InvalidTimestamp)?;
        if signatures.is_empty() {
            return Err(SignatureError::MissingSignature);
        }

        let signed_at =
            DateTime::from_timestamp(timestamp, 0).ok_or(SignatureError::InvalidTimestamp)?;
        if now - signed_at > self.tolerance {
            return Err(SignatureError::Expired);
        }

        let expected = mac(payload, &self.secret, timestamp);
        let matched = signatures
            .into_iter()
            .filter_map(|sig| hex::decode(sig).ok())
            .any(|sig| expected.clone().verify_slice(&sig).is_ok());
        match matched {
            true => Ok(()),
            false => Err(SignatureError::Mismatch),
        }
    }
}

use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::fmt;

use crate::error::{AppError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Proof that a gateway callback carried a valid signature.
///
/// Only [`SignatureVerifier::verify`] can construct one, so holding a value
/// means the HMAC check has passed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedPayment {
    gateway_order_id: String,
    gateway_payment_id: String,
    signature: String,
}

impl VerifiedPayment {
    pub fn gateway_order_id(&self) -> &str {
        &self.gateway_order_id
    }

    pub fn gateway_payment_id(&self) -> &str {
        &self.gateway_payment_id
    }

    pub fn signature(&self) -> &str {
        &self.signature
    }
}

/// Checks gateway callbacks against the shared key secret.
#[derive(Clone)]
pub struct SignatureVerifier {
    secret: String,
}

impl fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignatureVerifier").field("secret", &"***").finish()
    }
}

impl SignatureVerifier {
    pub fn new(secret: impl Into<String>) -> Self {
        Self { secret: secret.into() }
    }

    /// A blank secret fails closed: nothing can be signed or verified with it.
    fn mac_for(&self, gateway_order_id: &str, gateway_payment_id: &str) -> Result<HmacSha256> {
        if self.secret.trim().is_empty() {
            return Err(AppError::Configuration(config::ConfigError::Message(
                "Payment signing secret is not configured".to_string(),
            )));
        }
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Invalid signing key: {}", e)))?;
        mac.update(gateway_order_id.as_bytes());
        mac.update(b"|");
        mac.update(gateway_payment_id.as_bytes());
        Ok(mac)
    }

    /// Hex-encoded HMAC-SHA256 over `order_id|payment_id`.
    pub fn sign(&self, gateway_order_id: &str, gateway_payment_id: &str) -> Result<String> {
        let mac = self.mac_for(gateway_order_id, gateway_payment_id)?;
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Validates a callback. Never touches persisted state.
    pub fn verify(
        &self,
        gateway_order_id: Option<&str>,
        gateway_payment_id: Option<&str>,
        signature: Option<&str>,
    ) -> Result<VerifiedPayment> {
        let order_id = required(gateway_order_id, "gateway_order_id")?;
        let payment_id = required(gateway_payment_id, "gateway_payment_id")?;
        let signature = required(signature, "signature")?;

        let mac = self.mac_for(order_id, payment_id)?;
        let expected = hex::decode(signature).map_err(|_| AppError::InvalidSignature)?;

        // verify_slice compares in constant time
        mac.verify_slice(&expected).map_err(|_| AppError::InvalidSignature)?;

        Ok(VerifiedPayment {
            gateway_order_id: order_id.to_string(),
            gateway_payment_id: payment_id.to_string(),
            signature: signature.to_string(),
        })
    }
}

fn required<'a>(value: Option<&'a str>, field: &'static str) -> Result<&'a str> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(AppError::SignatureMissing(field)),
    }
}

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::time::Duration;
use tracing::{error, info, instrument};

use crate::errors::ServiceError;

type HmacSha256 = Hmac<Sha256>;

/// Provider-side order the customer pays against
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GatewayOrder {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    #[serde(default)]
    pub receipt: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Opens a gateway order for `amount_minor` (paise for INR).
    async fn create_order(
        &self,
        amount_minor: i64,
        currency: &str,
        receipt: &str,
    ) -> Result<GatewayOrder, ServiceError>;

    /// Publishable key handed to the checkout widget
    fn public_key(&self) -> &str;
}

/// Razorpay Orders API client
#[derive(Clone)]
pub struct RazorpayClient {
    client: reqwest::Client,
    api_base: String,
    key_id: String,
    key_secret: String,
}

#[derive(Serialize)]
struct CreateOrderBody<'a> {
    amount: i64,
    currency: &'a str,
    receipt: &'a str,
}

impl RazorpayClient {
    pub fn new(
        api_base: impl Into<String>,
        key_id: impl Into<String>,
        key_secret: impl Into<String>,
    ) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;
        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            key_id: key_id.into(),
            key_secret: key_secret.into(),
        })
    }
}

#[async_trait]
impl PaymentGateway for RazorpayClient {
    #[instrument(skip(self))]
    async fn create_order(
        &self,
        amount_minor: i64,
        currency: &str,
        receipt: &str,
    ) -> Result<GatewayOrder, ServiceError> {
        let response = self
            .client
            .post(format!("{}/orders", self.api_base))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&CreateOrderBody {
                amount: amount_minor,
                currency,
                receipt,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!(%status, body = %body, "razorpay order creation failed");
            return Err(ServiceError::ExternalServiceError(format!(
                "payment gateway returned HTTP {}",
                status
            )));
        }

        let order: GatewayOrder = response.json().await?;
        info!(gateway_order_id = %order.id, amount = order.amount, "razorpay order created");
        Ok(order)
    }

    fn public_key(&self) -> &str {
        &self.key_id
    }
}

/// Checks the `razorpay_signature` returned to the browser after payment.
#[derive(Clone)]
pub struct PaymentSignatureVerifier {
    secret: String,
}

impl PaymentSignatureVerifier {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    fn mac_for(&self, order_id: &str, payment_id: &str) -> Result<HmacSha256, ServiceError> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|e| ServiceError::InternalError(e.to_string()))?;
        mac.update(order_id.as_bytes());
        mac.update(b"|");
        mac.update(payment_id.as_bytes());
        Ok(mac)
    }

    /// Hex HMAC-SHA256 of `order_id|payment_id`.
    pub fn sign(&self, order_id: &str, payment_id: &str) -> Result<String, ServiceError> {
        Ok(hex::encode(
            self.mac_for(order_id, payment_id)?.finalize().into_bytes(),
        ))
    }

    /// Constant-time comparison against the supplied hex signature.
    pub fn verify(&self, order_id: &str, payment_id: &str, signature: &str) -> bool {
        let Ok(expected) = hex::decode(signature.trim()) else {
            return false;
        };
        match self.mac_for(order_id, payment_id) {
            Ok(mac) => mac.verify_slice(&expected).is_ok(),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::{
        matchers::{basic_auth, body_json, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    const ORDER_ID: &str = "order_DBJOWzybf0sJbb";
    const PAYMENT_ID: &str = "pay_29QQoUBi66xm2f";
    const SIGNATURE: &str = "e01c80ebc10d148518d17c33f3656de8f09959eb48a06865956b88966c127401";

    #[test]
    fn signature_matches_reference_vector() {
        let verifier = PaymentSignatureVerifier::new("test_secret");
        assert_eq!(verifier.sign(ORDER_ID, PAYMENT_ID).unwrap(), SIGNATURE);
        assert!(verifier.verify(ORDER_ID, PAYMENT_ID, SIGNATURE));
    }

    #[test]
    fn tampered_inputs_fail_verification() {
        let verifier = PaymentSignatureVerifier::new("test_secret");
        assert!(!verifier.verify(ORDER_ID, "pay_tampered", SIGNATURE));
        assert!(!verifier.verify(ORDER_ID, PAYMENT_ID, "zz-not-hex"));
        assert!(!verifier.verify(ORDER_ID, PAYMENT_ID, ""));
        assert!(!PaymentSignatureVerifier::new("other").verify(ORDER_ID, PAYMENT_ID, SIGNATURE));
    }

    #[tokio::test]
    async fn create_order_posts_with_basic_auth() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/orders"))
            .and(basic_auth("rzp_test_key", "rzp_secret"))
            .and(body_json(json!({
                "amount": 185000,
                "currency": "INR",
                "receipt": "rcpt_1"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "order_abc",
                "entity": "order",
                "amount": 185000,
                "currency": "INR",
                "receipt": "rcpt_1",
                "status": "created"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = RazorpayClient::new(server.uri(), "rzp_test_key", "rzp_secret").unwrap();
        let order = client.create_order(185000, "INR", "rcpt_1").await.unwrap();
        assert_eq!(order.id, "order_abc");
        assert_eq!(order.amount, 185000);
        assert_eq!(client.public_key(), "rzp_test_key");
    }

    #[tokio::test]
    async fn gateway_rejection_is_external_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/orders"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .mount(&server)
            .await;

        let client = RazorpayClient::new(server.uri(), "k", "s").unwrap();
        let err = client.create_order(100, "INR", "r").await.unwrap_err();
        assert!(matches!(err, ServiceError::ExternalServiceError(_)));
    }
}

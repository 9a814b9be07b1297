use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{instrument, warn};

use crate::errors::ServiceError;

/// Verified claims of a Google ID token
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GoogleIdentity {
    pub subject: String,
    pub email: String,
    pub name: String,
}

#[async_trait]
pub trait GoogleIdentityVerifier: Send + Sync {
    async fn verify(&self, id_token: &str) -> Result<GoogleIdentity, ServiceError>;
}

/// Validates ID tokens against Google's tokeninfo endpoint.
#[derive(Clone)]
pub struct GoogleTokenInfoClient {
    client: reqwest::Client,
    endpoint: String,
    client_id: String,
}

impl GoogleTokenInfoClient {
    pub const DEFAULT_ENDPOINT: &'static str = "https://oauth2.googleapis.com/tokeninfo";

    pub fn new(
        endpoint: impl Into<String>,
        client_id: impl Into<String>,
    ) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            client_id: client_id.into(),
        })
    }
}

fn invalid_token() -> ServiceError {
    ServiceError::Unauthorized("Invalid Google credential".to_string())
}

/// tokeninfo reports booleans as strings
fn truthy(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
        _ => false,
    }
}

pub(crate) fn identity_from_claims(
    claims: &Value,
    expected_audience: &str,
) -> Result<GoogleIdentity, ServiceError> {
    let field = |name: &str| claims.get(name).and_then(Value::as_str);

    if field("aud") != Some(expected_audience) {
        warn!("google token issued for a different client");
        return Err(invalid_token());
    }
    if !truthy(claims.get("email_verified")) {
        return Err(ServiceError::Unauthorized(
            "Google account email is not verified".to_string(),
        ));
    }

    let email = field("email").ok_or_else(invalid_token)?.to_lowercase();
    let subject = field("sub").ok_or_else(invalid_token)?.to_string();
    let name = field("name")
        .map(str::to_string)
        .unwrap_or_else(|| email.split('@').next().unwrap_or_default().to_string());

    Ok(GoogleIdentity {
        subject,
        email,
        name,
    })
}

#[async_trait]
impl GoogleIdentityVerifier for GoogleTokenInfoClient {
    #[instrument(skip(self, id_token))]
    async fn verify(&self, id_token: &str) -> Result<GoogleIdentity, ServiceError> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("id_token", id_token)])
            .send()
            .await?;

        if response.status().is_client_error() {
            return Err(invalid_token());
        }
        if !response.status().is_success() {
            return Err(ServiceError::ExternalServiceError(format!(
                "Google tokeninfo returned HTTP {}",
                response.status()
            )));
        }

        let claims: Value = response.json().await?;
        identity_from_claims(&claims, &self.client_id)
    }
}

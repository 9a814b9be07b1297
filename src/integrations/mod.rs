//! Clients for the third-party services the storefront calls out to.
//!
//! Each collaborator sits behind an `async_trait` so it can be swapped for a
//! fake in tests; the concrete clients are built once in `main`.

pub mod asset_store;
pub mod google;
pub mod mailer;
pub mod payment_gateway;

pub use asset_store::{AssetStore, CloudinaryClient, ImageUpload};
pub use google::{GoogleIdentity, GoogleIdentityVerifier, GoogleTokenInfoClient};
pub use mailer::{LogMailer, Mailer, SmtpMailer};
pub use payment_gateway::{GatewayOrder, PaymentGateway, PaymentSignatureVerifier, RazorpayClient};

use std::sync::Arc;

/// The external collaborators the services are built with
#[derive(Clone)]
pub struct Integrations {
    pub gateway: Arc<dyn PaymentGateway>,
    pub signatures: PaymentSignatureVerifier,
    pub mailer: Arc<dyn Mailer>,
    pub assets: Arc<dyn AssetStore>,
    pub google: Arc<dyn GoogleIdentityVerifier>,
}

impl Integrations {
    /// Real clients from configuration. Without an SMTP host outside
    /// production, OTPs are written to the log instead of mailed.
    pub fn from_config(cfg: &crate::config::AppConfig) -> Result<Self, crate::errors::ServiceError> {
        let mailer: Arc<dyn Mailer> = if cfg.smtp_host.trim().is_empty() {
            tracing::warn!("smtp_host not set, using the log mailer");
            Arc::new(LogMailer)
        } else {
            Arc::new(SmtpMailer::new(cfg)?)
        };

        Ok(Self {
            gateway: Arc::new(RazorpayClient::new(
                cfg.razorpay_api_base.clone(),
                cfg.razorpay_key_id.clone(),
                cfg.razorpay_key_secret.clone(),
            )?),
            signatures: PaymentSignatureVerifier::new(cfg.razorpay_key_secret.clone()),
            mailer,
            assets: Arc::new(CloudinaryClient::new(
                CloudinaryClient::DEFAULT_API_BASE,
                cfg.cloudinary_cloud_name.clone(),
                cfg.cloudinary_api_key.clone(),
                cfg.cloudinary_api_secret.clone(),
                cfg.cloudinary_folder.clone(),
            )?),
            google: Arc::new(GoogleTokenInfoClient::new(
                GoogleTokenInfoClient::DEFAULT_ENDPOINT,
                cfg.google_client_id.clone(),
            )?),
        })
    }
}

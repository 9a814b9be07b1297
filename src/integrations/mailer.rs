//! Transactional email used for OTP delivery.

use async_trait::async_trait;
use lettre::{
    message::header::ContentType, transport::smtp::authentication::Credentials, AsyncSmtpTransport,
    AsyncTransport, Message, Tokio1Executor,
};
use tracing::{error, info, instrument, warn};

use crate::{config::AppConfig, entities::otp_record::OtpPurpose, errors::ServiceError};

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_otp(
        &self,
        to: &str,
        code: &str,
        purpose: OtpPurpose,
        valid_for_secs: i64,
    ) -> Result<(), ServiceError>;
}

pub(crate) fn otp_subject(purpose: OtpPurpose) -> &'static str {
    match purpose {
        OtpPurpose::Signup => "Verify your email address",
        OtpPurpose::PasswordReset => "Reset your password",
    }
}

pub(crate) fn otp_body(code: &str, purpose: OtpPurpose, valid_for_secs: i64) -> String {
    let action = match purpose {
        OtpPurpose::Signup => "complete your registration",
        OtpPurpose::PasswordReset => "reset your password",
    };
    let minutes = (valid_for_secs + 59) / 60;
    format!(
        "Your one-time code is {code}.\n\nUse it to {action}. It expires in {minutes} minute{}.\n\nIf you did not request this, you can ignore this email.",
        if minutes == 1 { "" } else { "s" }
    )
}

/// SMTP delivery over STARTTLS
#[derive(Clone)]
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from_address: String,
}

impl SmtpMailer {
    pub fn new(cfg: &AppConfig) -> Result<Self, ServiceError> {
        let credentials = Credentials::new(cfg.smtp_username.clone(), cfg.smtp_password.clone());
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&cfg.smtp_host)
            .map_err(|e| ServiceError::InternalError(format!("invalid SMTP relay: {}", e)))?
            .port(cfg.smtp_port)
            .credentials(credentials)
            .build();

        Ok(Self {
            transport,
            from_address: cfg.mail_from.clone(),
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    #[instrument(skip(self, code))]
    async fn send_otp(
        &self,
        to: &str,
        code: &str,
        purpose: OtpPurpose,
        valid_for_secs: i64,
    ) -> Result<(), ServiceError> {
        let message = Message::builder()
            .from(
                self.from_address
                    .parse()
                    .map_err(|_| ServiceError::InternalError("invalid sender address".into()))?,
            )
            .to(to
                .parse()
                .map_err(|_| ServiceError::ValidationError(format!("Invalid email address: {}", to)))?)
            .subject(otp_subject(purpose))
            .header(ContentType::TEXT_PLAIN)
            .body(otp_body(code, purpose, valid_for_secs))
            .map_err(|e| ServiceError::InternalError(format!("failed to build message: {}", e)))?;

        self.transport.send(message).await.map_err(|e| {
            error!(error = %e, "smtp delivery failed");
            ServiceError::ExternalServiceError("Failed to send email".into())
        })?;

        info!(?purpose, "otp email sent");
        Ok(())
    }
}

/// Used in development when no SMTP relay is configured; writes the code to the log.
#[derive(Clone, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_otp(
        &self,
        to: &str,
        code: &str,
        purpose: OtpPurpose,
        valid_for_secs: i64,
    ) -> Result<(), ServiceError> {
        warn!(to, code, ?purpose, valid_for_secs, "SMTP not configured, OTP logged instead of mailed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_mentions_code_and_expiry() {
        let body = otp_body("482913", OtpPurpose::Signup, 300);
        assert!(body.contains("482913"));
        assert!(body.contains("5 minutes"));
        assert!(otp_body("1", OtpPurpose::PasswordReset, 60).contains("1 minute."));
        assert_eq!(otp_subject(OtpPurpose::PasswordReset), "Reset your password");
    }
}

//! Account lifecycle: OTP-verified signup, password and Google logins,
//! admin login and the password-reset flow.
//!
//! OTP records are keyed by email. A record moves
//! `created → verified | expired | exhausted | superseded` and is treated as
//! absent once `record_expires_at` passes; the purge worker deletes such rows.

use chrono::{DateTime, Duration, Utc};
use lazy_static::lazy_static;
use rand::Rng;
use regex::Regex;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::{
        otp::{generate_otp, hash_otp, otp_matches},
        password::{hash_password, validate_password_strength, verify_password},
        AuthService, AuthUser, IssuedSession, Role, SessionKind, SessionSubject,
    },
    config::AppConfig,
    entities::{
        admin,
        otp_record::{self, OtpPurpose},
        user::{self, AuthProvider},
    },
    errors::ServiceError,
    integrations::{GoogleIdentityVerifier, Mailer},
    services::users::{validate_full_name, validate_phone},
};

lazy_static! {
    static ref USERNAME_RE: Regex = Regex::new(r"^[A-Za-z0-9_]{4,20}$").expect("valid regex");
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[derive(Debug, Clone, Copy)]
pub struct OtpSettings {
    pub signup_ttl: Duration,
    pub resend_ttl: Duration,
    pub record_ttl: Duration,
    pub max_attempts: i32,
}

impl From<&AppConfig> for OtpSettings {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            signup_ttl: Duration::seconds(cfg.signup_otp_seconds),
            resend_ttl: Duration::seconds(cfg.resend_otp_seconds),
            record_ttl: Duration::seconds(cfg.otp_record_seconds),
            max_attempts: cfg.otp_max_attempts,
        }
    }
}

impl Default for OtpSettings {
    fn default() -> Self {
        Self {
            signup_ttl: Duration::seconds(300),
            resend_ttl: Duration::seconds(120),
            record_ttl: Duration::seconds(360),
            max_attempts: 3,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct SignupRequest {
    #[validate(length(min = 2, max = 60), custom = "validate_full_name")]
    pub full_name: String,
    #[validate(regex(
        path = "USERNAME_RE",
        message = "Username must be 4-20 letters, digits or underscores"
    ))]
    pub username: String,
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    #[validate(custom = "validate_phone")]
    pub phone: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct VerifyOtpRequest {
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    #[validate(length(equal = 6, message = "OTP must be 6 digits"))]
    pub otp: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct EmailRequest {
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct ResetPasswordRequest {
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GoogleCredential {
    pub credential: String,
}

/// Signup payload parked on the OTP record until the code is verified
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PendingSignup {
    full_name: String,
    username: String,
    email: String,
    phone: String,
    password_hash: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct OtpIssued {
    pub email: String,
    pub expires_in: i64,
}

#[derive(Debug, Clone)]
pub struct LoginOutcome<T> {
    pub account: T,
    pub session: IssuedSession,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub id: Uuid,
    pub role: Role,
    pub email: String,
    pub full_name: String,
    pub is_active: bool,
}

#[derive(Clone)]
pub struct IdentityService {
    db: Arc<DatabaseConnection>,
    auth: Arc<AuthService>,
    mailer: Arc<dyn Mailer>,
    google: Arc<dyn GoogleIdentityVerifier>,
    otp: OtpSettings,
}

impl IdentityService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        auth: Arc<AuthService>,
        mailer: Arc<dyn Mailer>,
        google: Arc<dyn GoogleIdentityVerifier>,
        otp: OtpSettings,
    ) -> Self {
        Self {
            db,
            auth,
            mailer,
            google,
            otp,
        }
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<user::Model>, ServiceError> {
        Ok(user::Entity::find()
            .filter(user::Column::Email.eq(email))
            .one(&*self.db)
            .await?)
    }

    async fn username_taken(&self, username: &str) -> Result<bool, ServiceError> {
        Ok(user::Entity::find()
            .filter(user::Column::Username.eq(username))
            .one(&*self.db)
            .await?
            .is_some())
    }

    /// The unexpired OTP record for `email` and `purpose`, if any.
    async fn live_record(
        &self,
        email: &str,
        purpose: OtpPurpose,
        now: DateTime<Utc>,
    ) -> Result<otp_record::Model, ServiceError> {
        let record = otp_record::Entity::find()
            .filter(otp_record::Column::Email.eq(email))
            .one(&*self.db)
            .await?;
        match record {
            Some(r) if r.record_expires_at <= now => {
                otp_record::Entity::delete_by_id(r.id).exec(&*self.db).await?;
                Err(ServiceError::NotFound("No OTP found".into()))
            }
            Some(r) if r.purpose == purpose => Ok(r),
            _ => Err(ServiceError::NotFound("No OTP found".into())),
        }
    }

    /// Replaces any record for the email with a fresh one and mails the code.
    async fn issue_otp(
        &self,
        email: &str,
        purpose: OtpPurpose,
        pending_user: Option<serde_json::Value>,
    ) -> Result<OtpIssued, ServiceError> {
        let code = generate_otp();
        let now = Utc::now();
        let ttl = self.otp.signup_ttl;

        otp_record::Entity::delete_many()
            .filter(otp_record::Column::Email.eq(email))
            .exec(&*self.db)
            .await?;
        let record = otp_record::ActiveModel {
            id: Set(Uuid::new_v4()),
            email: Set(email.to_string()),
            purpose: Set(purpose),
            otp_hash: Set(Some(hash_otp(email, &code))),
            attempts: Set(0),
            otp_expires_at: Set(now + ttl),
            record_expires_at: Set(now + self.otp.record_ttl.max(ttl)),
            verified: Set(false),
            pending_user: Set(pending_user),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await?;

        if let Err(e) = self
            .mailer
            .send_otp(email, &code, purpose, ttl.num_seconds())
            .await
        {
            error!(email, error = %e, "failed to deliver OTP");
            otp_record::Entity::delete_by_id(record.id)
                .exec(&*self.db)
                .await?;
            return Err(e);
        }

        info!(email, ?purpose, "OTP issued");
        Ok(OtpIssued {
            email: email.to_string(),
            expires_in: ttl.num_seconds(),
        })
    }

    /// Checks `code` against the record. Expiry is reported before attempts
    /// and does not consume one; the last allowed miss deletes the record.
    async fn check_code(
        &self,
        record: &otp_record::Model,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<(), ServiceError> {
        let Some(stored) = record.otp_hash.as_deref() else {
            return Err(ServiceError::BadRequest("OTP has already been used".into()));
        };
        if now > record.otp_expires_at {
            return Err(ServiceError::BadRequest(
                "OTP has expired. Please request a new one".into(),
            ));
        }
        if record.attempts >= self.otp.max_attempts {
            otp_record::Entity::delete_by_id(record.id)
                .exec(&*self.db)
                .await?;
            return Err(ServiceError::BadRequest(
                "Maximum attempts reached. Please sign up again".into(),
            ));
        }
        if otp_matches(&record.email, code, stored) {
            return Ok(());
        }

        let attempts = record.attempts + 1;
        if attempts >= self.otp.max_attempts {
            otp_record::Entity::delete_by_id(record.id)
                .exec(&*self.db)
                .await?;
            warn!(email = %record.email, "OTP attempts exhausted");
            return Err(ServiceError::BadRequest(
                "Too many incorrect attempts. Please request a new OTP".into(),
            ));
        }
        let mut model: otp_record::ActiveModel = record.clone().into();
        model.attempts = Set(attempts);
        model.updated_at = Set(now);
        model.update(&*self.db).await?;
        debug!(email = %record.email, attempts, "wrong OTP submitted");
        Err(ServiceError::BadRequest(format!(
            "Invalid OTP. {} attempt(s) remaining",
            self.otp.max_attempts - attempts
        )))
    }

    /// Validates the signup, parks it on an OTP record and emails the code.
    /// No user row exists until `verify_otp` succeeds.
    #[instrument(skip(self, request), fields(email = %request.email))]
    pub async fn signup(&self, request: SignupRequest) -> Result<OtpIssued, ServiceError> {
        request.validate()?;
        validate_password_strength(&request.password)?;
        let email = normalize_email(&request.email);

        if let Some(existing) = self.user_by_email(&email).await? {
            return Err(ServiceError::Conflict(match existing.auth_provider {
                AuthProvider::Google => {
                    "This email is registered with Google. Please continue with Google".into()
                }
                AuthProvider::Local => "Email is already registered".into(),
            }));
        }
        if self.username_taken(&request.username).await? {
            return Err(ServiceError::Conflict("Username is already taken".into()));
        }

        let pending = PendingSignup {
            full_name: request.full_name.trim().to_string(),
            username: request.username,
            email: email.clone(),
            phone: request.phone,
            password_hash: hash_password(&request.password)?,
        };
        let payload = serde_json::to_value(&pending)
            .map_err(|e| ServiceError::InternalError(e.to_string()))?;
        self.issue_otp(&email, OtpPurpose::Signup, Some(payload)).await
    }

    /// Materializes the pending signup once the code matches.
    #[instrument(skip(self, request), fields(email = %request.email))]
    pub async fn verify_otp(&self, request: VerifyOtpRequest) -> Result<user::Model, ServiceError> {
        request.validate()?;
        let email = normalize_email(&request.email);
        let now = Utc::now();
        let record = self.live_record(&email, OtpPurpose::Signup, now).await?;
        self.check_code(&record, &request.otp, now).await?;

        let pending: PendingSignup = record
            .pending_user
            .clone()
            .and_then(|v| serde_json::from_value(v).ok())
            .ok_or_else(|| ServiceError::InternalError("OTP record has no signup payload".into()))?;

        let txn = self.db.begin().await?;
        let clash = user::Entity::find()
            .filter(
                sea_orm::Condition::any()
                    .add(user::Column::Email.eq(pending.email.as_str()))
                    .add(user::Column::Username.eq(pending.username.as_str())),
            )
            .one(&txn)
            .await?;
        if clash.is_some() {
            otp_record::Entity::delete_by_id(record.id).exec(&txn).await?;
            txn.commit().await?;
            return Err(ServiceError::Conflict(
                "Email or username was registered in the meantime".into(),
            ));
        }

        let created = user::ActiveModel {
            id: Set(Uuid::new_v4()),
            full_name: Set(pending.full_name),
            username: Set(pending.username),
            email: Set(pending.email),
            phone: Set(Some(pending.phone)),
            password_hash: Set(Some(pending.password_hash)),
            auth_provider: Set(AuthProvider::Local),
            google_subject: Set(None),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;
        otp_record::Entity::delete_by_id(record.id).exec(&txn).await?;
        txn.commit().await?;

        metrics::counter!("storefront.auth.signups", 1);
        info!(user_id = %created.id, "account created");
        Ok(created)
    }

    /// Sends a new code once the current one has expired.
    #[instrument(skip(self, request), fields(email = %request.email))]
    pub async fn resend_otp(&self, request: EmailRequest) -> Result<OtpIssued, ServiceError> {
        request.validate()?;
        let email = normalize_email(&request.email);
        let now = Utc::now();
        let record = otp_record::Entity::find()
            .filter(otp_record::Column::Email.eq(email.as_str()))
            .filter(otp_record::Column::RecordExpiresAt.gt(now))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("No OTP found".into()))?;

        if record.verified {
            return Err(ServiceError::BadRequest("OTP has already been verified".into()));
        }
        if record.otp_hash.is_some() && now < record.otp_expires_at {
            let remaining = (record.otp_expires_at - now).num_seconds().max(1);
            return Err(ServiceError::BadRequest(format!(
                "Please wait {} seconds before requesting a new OTP",
                remaining
            )));
        }

        let code = generate_otp();
        let ttl = self.otp.resend_ttl;
        let purpose = record.purpose;
        let mut model: otp_record::ActiveModel = record.into();
        model.otp_hash = Set(Some(hash_otp(&email, &code)));
        model.attempts = Set(0);
        model.otp_expires_at = Set(now + ttl);
        model.record_expires_at = Set(now + self.otp.record_ttl.max(ttl));
        model.updated_at = Set(now);
        model.update(&*self.db).await?;

        self.mailer
            .send_otp(&email, &code, purpose, ttl.num_seconds())
            .await?;
        info!(email, "OTP resent");
        Ok(OtpIssued {
            email,
            expires_in: ttl.num_seconds(),
        })
    }

    #[instrument(skip(self, request), fields(email = %request.email))]
    pub async fn login(&self, request: LoginRequest) -> Result<LoginOutcome<user::Model>, ServiceError> {
        request.validate()?;
        let email = normalize_email(&request.email);
        let invalid = || ServiceError::Unauthorized("Invalid email or password".into());

        let account = self.user_by_email(&email).await?.ok_or_else(invalid)?;
        let Some(hash) = account.password_hash.as_deref() else {
            return Err(ServiceError::Unauthorized(
                "This account uses Google sign-in".into(),
            ));
        };
        if !verify_password(&request.password, hash)? {
            warn!(email, "password mismatch");
            return Err(invalid());
        }
        if !account.is_active {
            return Err(ServiceError::Forbidden("Account is blocked".into()));
        }

        let session = self
            .auth
            .issue_session(&SessionSubject::from(&account), SessionKind::Local)?;
        metrics::counter!("storefront.auth.logins", 1);
        info!(user_id = %account.id, "user logged in");
        Ok(LoginOutcome { account, session })
    }

    /// Derives a free username from the email's local part.
    async fn google_username(&self, email: &str) -> Result<String, ServiceError> {
        let mut base: String = email
            .split('@')
            .next()
            .unwrap_or_default()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
            .take(14)
            .collect();
        if base.len() < 4 {
            base.push_str("user");
        }
        if !self.username_taken(&base).await? {
            return Ok(base);
        }
        for _ in 0..5 {
            let candidate = format!("{}_{:05}", base, rand::thread_rng().gen_range(0..100_000));
            if !self.username_taken(&candidate).await? {
                return Ok(candidate);
            }
        }
        Err(ServiceError::Conflict(
            "Could not allocate a username, please sign up with email".into(),
        ))
    }

    #[instrument(skip(self, credential))]
    pub async fn google_signup(
        &self,
        credential: GoogleCredential,
    ) -> Result<LoginOutcome<user::Model>, ServiceError> {
        let identity = self.google.verify(&credential.credential).await?;
        let email = normalize_email(&identity.email);
        if self.user_by_email(&email).await?.is_some() {
            return Err(ServiceError::Conflict(
                "An account with this email already exists. Please log in".into(),
            ));
        }

        let now = Utc::now();
        let account = user::ActiveModel {
            id: Set(Uuid::new_v4()),
            full_name: Set(identity.name.clone()),
            username: Set(self.google_username(&email).await?),
            email: Set(email),
            phone: Set(None),
            password_hash: Set(None),
            auth_provider: Set(AuthProvider::Google),
            google_subject: Set(Some(identity.subject)),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await?;

        let session = self
            .auth
            .issue_session(&SessionSubject::from(&account), SessionKind::Google)?;
        metrics::counter!("storefront.auth.signups", 1);
        info!(user_id = %account.id, "google account created");
        Ok(LoginOutcome { account, session })
    }

    #[instrument(skip(self, credential))]
    pub async fn google_login(
        &self,
        credential: GoogleCredential,
    ) -> Result<LoginOutcome<user::Model>, ServiceError> {
        let identity = self.google.verify(&credential.credential).await?;
        let email = normalize_email(&identity.email);
        let account = self
            .user_by_email(&email)
            .await?
            .filter(|u| u.auth_provider == AuthProvider::Google)
            .ok_or_else(|| {
                ServiceError::Unauthorized(
                    "No Google account found for this email. Please sign up first".into(),
                )
            })?;
        if !account.is_active {
            return Err(ServiceError::Forbidden("Account is blocked".into()));
        }

        let session = self
            .auth
            .issue_session(&SessionSubject::from(&account), SessionKind::Google)?;
        metrics::counter!("storefront.auth.logins", 1);
        info!(user_id = %account.id, "google login");
        Ok(LoginOutcome { account, session })
    }

    #[instrument(skip(self, request), fields(email = %request.email))]
    pub async fn admin_login(&self, request: LoginRequest) -> Result<LoginOutcome<admin::Model>, ServiceError> {
        request.validate()?;
        let email = normalize_email(&request.email);
        let invalid = || ServiceError::Unauthorized("Invalid email or password".into());

        let account = admin::Entity::find()
            .filter(admin::Column::Email.eq(email.as_str()))
            .one(&*self.db)
            .await?
            .ok_or_else(invalid)?;
        if !verify_password(&request.password, &account.password_hash)? {
            warn!(email, "admin password mismatch");
            return Err(invalid());
        }
        if !account.is_active {
            return Err(ServiceError::Forbidden("Account is blocked".into()));
        }

        let session = self
            .auth
            .issue_session(&SessionSubject::from(&account), SessionKind::Admin)?;
        info!(admin_id = %account.id, "admin logged in");
        Ok(LoginOutcome { account, session })
    }

    #[instrument(skip(self, request), fields(email = %request.email))]
    pub async fn forgot_password(&self, request: EmailRequest) -> Result<OtpIssued, ServiceError> {
        request.validate()?;
        let email = normalize_email(&request.email);
        let account = self
            .user_by_email(&email)
            .await?
            .ok_or_else(|| ServiceError::NotFound("No account found with this email".into()))?;
        if account.auth_provider == AuthProvider::Google {
            return Err(ServiceError::BadRequest(
                "This account uses Google sign-in and has no password".into(),
            ));
        }
        self.issue_otp(&email, OtpPurpose::PasswordReset, None).await
    }

    /// Marks the reset record verified; the password itself changes in
    /// `reset_password`.
    #[instrument(skip(self, request), fields(email = %request.email))]
    pub async fn verify_forgot_password_otp(&self, request: VerifyOtpRequest) -> Result<(), ServiceError> {
        request.validate()?;
        let email = normalize_email(&request.email);
        let now = Utc::now();
        let record = self.live_record(&email, OtpPurpose::PasswordReset, now).await?;
        if record.verified {
            return Ok(());
        }
        self.check_code(&record, &request.otp, now).await?;

        let mut model: otp_record::ActiveModel = record.into();
        model.verified = Set(true);
        model.otp_hash = Set(None);
        model.updated_at = Set(now);
        model.update(&*self.db).await?;
        info!(email, "password reset OTP verified");
        Ok(())
    }

    #[instrument(skip(self, request), fields(email = %request.email))]
    pub async fn reset_password(&self, request: ResetPasswordRequest) -> Result<(), ServiceError> {
        request.validate()?;
        validate_password_strength(&request.password)?;
        let email = normalize_email(&request.email);
        let record = self
            .live_record(&email, OtpPurpose::PasswordReset, Utc::now())
            .await?;
        if !record.verified {
            return Err(ServiceError::BadRequest(
                "Verify the OTP before resetting the password".into(),
            ));
        }
        let account = self
            .user_by_email(&email)
            .await?
            .ok_or_else(|| ServiceError::NotFound("No account found with this email".into()))?;

        let password_hash = hash_password(&request.password)?;
        let txn = self.db.begin().await?;
        let mut model: user::ActiveModel = account.into();
        model.password_hash = Set(Some(password_hash));
        model.updated_at = Set(Utc::now());
        let updated = model.update(&txn).await?;
        otp_record::Entity::delete_by_id(record.id).exec(&txn).await?;
        txn.commit().await?;

        info!(user_id = %updated.id, "password reset");
        Ok(())
    }

    /// Current session owner with live account status.
    pub async fn me(&self, auth: &AuthUser) -> Result<SessionInfo, ServiceError> {
        let (full_name, email, is_active) = match auth.role {
            Role::User => {
                let account = user::Entity::find_by_id(auth.user_id)
                    .one(&*self.db)
                    .await?
                    .ok_or_else(|| ServiceError::Unauthorized("Account no longer exists".into()))?;
                (account.full_name, account.email, account.is_active)
            }
            Role::Admin => {
                let account = admin::Entity::find_by_id(auth.user_id)
                    .one(&*self.db)
                    .await?
                    .ok_or_else(|| ServiceError::Unauthorized("Account no longer exists".into()))?;
                (account.full_name, account.email, account.is_active)
            }
        };
        Ok(SessionInfo {
            id: auth.user_id,
            role: auth.role,
            email,
            full_name,
            is_active,
        })
    }

    /// Creates the configured admin account if no admin has that email.
    #[instrument(skip(self, password))]
    pub async fn bootstrap_admin(&self, email: &str, password: &str) -> Result<bool, ServiceError> {
        let email = normalize_email(email);
        let existing = admin::Entity::find()
            .filter(admin::Column::Email.eq(email.as_str()))
            .one(&*self.db)
            .await?;
        if existing.is_some() {
            return Ok(false);
        }
        admin::ActiveModel {
            id: Set(Uuid::new_v4()),
            email: Set(email.clone()),
            full_name: Set("Administrator".to_string()),
            password_hash: Set(hash_password(password)?),
            is_active: Set(true),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await?;
        info!(email, "bootstrap admin created");
        Ok(true)
    }

    pub async fn purge_expired_otps(&self) -> Result<u64, ServiceError> {
        let result = otp_record::Entity::delete_many()
            .filter(otp_record::Column::RecordExpiresAt.lte(Utc::now()))
            .exec(&*self.db)
            .await?;
        if result.rows_affected > 0 {
            debug!(purged = result.rows_affected, "expired OTP records purged");
        }
        Ok(result.rows_affected)
    }

    /// Runs `purge_expired_otps` every `every` until the runtime shuts down.
    pub fn spawn_otp_purger(self: Arc<Self>, every: std::time::Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                if let Err(e) = self.purge_expired_otps().await {
                    error!(error = %e, "OTP purge failed");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signup() -> SignupRequest {
        SignupRequest {
            full_name: "Asha Rao".into(),
            username: "asha_rao".into(),
            email: "asha@example.com".into(),
            phone: "9876543210".into(),
            password: "Secret#123".into(),
        }
    }

    #[test]
    fn signup_field_rules() {
        assert!(signup().validate().is_ok());
        assert!(SignupRequest { username: "abc".into(), ..signup() }.validate().is_err());
        assert!(SignupRequest { username: "has space".into(), ..signup() }.validate().is_err());
        assert!(SignupRequest { username: "a".repeat(21), ..signup() }.validate().is_err());
        assert!(SignupRequest { email: "not-an-email".into(), ..signup() }.validate().is_err());
        assert!(SignupRequest { phone: "1234567890".into(), ..signup() }.validate().is_err());
        assert!(SignupRequest { full_name: "R2D2".into(), ..signup() }.validate().is_err());
    }

    #[test]
    fn emails_are_case_folded() {
        assert_eq!(normalize_email("  Asha@Example.COM "), "asha@example.com");
    }

    #[test]
    fn default_otp_windows() {
        let settings = OtpSettings::default();
        assert_eq!(settings.signup_ttl.num_seconds(), 300);
        assert_eq!(settings.resend_ttl.num_seconds(), 120);
        assert_eq!(settings.record_ttl.num_seconds(), 360);
        assert_eq!(settings.max_attempts, 3);
    }
}

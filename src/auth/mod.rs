/*!
 * # Authentication and Authorization
 *
 * Session tokens are HS256 JWTs carried in an httpOnly cookie (a
 * `Authorization: Bearer` header is accepted as well). Two roles exist:
 * storefront customers (`user`) and back-office staff (`admin`).
 *
 * `auth_middleware` resolves the caller and stores an [`AuthUser`] in the
 * request extensions; `role_middleware` gates a router on a [`Role`].
 */

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use sea_orm::{DatabaseConnection, EntityTrait};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    config::AppConfig,
    entities::{admin, user},
    errors::ServiceError,
};

pub mod cookie;
pub mod otp;
pub mod password;

pub use cookie::SessionCookie;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

/// Which login flow minted the session; each has its own lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    Local,
    Google,
    Admin,
}

/// Claim structure for session tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: Role,
    pub email: String,
    pub full_name: String,
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
}

/// Authenticated caller, inserted into request extensions by `auth_middleware`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub role: Role,
    pub email: String,
    pub full_name: String,
    pub token_id: String,
}

impl AuthUser {
    pub fn has_role(&self, role: Role) -> bool {
        self.role == role
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(Role::Admin)
    }
}

impl TryFrom<Claims> for AuthUser {
    type Error = ServiceError;

    fn try_from(claims: Claims) -> Result<Self, Self::Error> {
        let user_id = Uuid::parse_str(&claims.sub)
            .map_err(|_| ServiceError::Unauthorized("Invalid session token".to_string()))?;
        Ok(Self {
            user_id,
            role: claims.role,
            email: claims.email,
            full_name: claims.full_name,
            token_id: claims.jti,
        })
    }
}

/// Who a new session is for
#[derive(Debug, Clone)]
pub struct SessionSubject {
    pub id: Uuid,
    pub role: Role,
    pub email: String,
    pub full_name: String,
}

impl From<&user::Model> for SessionSubject {
    fn from(model: &user::Model) -> Self {
        Self {
            id: model.id,
            role: Role::User,
            email: model.email.clone(),
            full_name: model.full_name.clone(),
        }
    }
}

impl From<&admin::Model> for SessionSubject {
    fn from(model: &admin::Model) -> Self {
        Self {
            id: model.id,
            role: Role::Admin,
            email: model.email.clone(),
            full_name: model.full_name.clone(),
        }
    }
}

/// A signed token plus the matching `Set-Cookie` value
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub token: String,
    pub expires_in: i64,
    pub set_cookie: String,
}

/// Authentication configuration
#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub local_session: Duration,
    pub google_session: Duration,
    pub admin_session: Duration,
    pub cookie: SessionCookie,
}

impl From<&AppConfig> for AuthConfig {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            jwt_secret: cfg.jwt_secret.clone(),
            local_session: Duration::minutes(cfg.local_session_minutes),
            google_session: Duration::minutes(cfg.google_session_minutes),
            admin_session: Duration::minutes(cfg.admin_session_minutes),
            cookie: SessionCookie::new(cfg.session_cookie_name.clone(), cfg.cookie_secure),
        }
    }
}

impl AuthConfig {
    pub fn session_lifetime(&self, kind: SessionKind) -> Duration {
        match kind {
            SessionKind::Local => self.local_session,
            SessionKind::Google => self.google_session,
            SessionKind::Admin => self.admin_session,
        }
    }
}

/// Issues and validates session tokens
#[derive(Debug, Clone)]
pub struct AuthService {
    pub config: AuthConfig,
    pub db: Arc<DatabaseConnection>,
}

impl AuthService {
    pub fn new(config: AuthConfig, db: Arc<DatabaseConnection>) -> Self {
        Self { config, db }
    }

    pub fn cookie(&self) -> &SessionCookie {
        &self.config.cookie
    }

    /// Signs a token for `subject` with the lifetime of the login flow `kind`.
    pub fn issue_session(
        &self,
        subject: &SessionSubject,
        kind: SessionKind,
    ) -> Result<IssuedSession, ServiceError> {
        let lifetime = self.config.session_lifetime(kind);
        let now = Utc::now();
        let claims = Claims {
            sub: subject.id.to_string(),
            role: subject.role,
            email: subject.email.clone(),
            full_name: subject.full_name.clone(),
            jti: Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            exp: (now + lifetime).timestamp(),
        };

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.config.jwt_secret.as_bytes()),
        )
        .map_err(|e| ServiceError::JwtError(e.to_string()))?;

        let expires_in = lifetime.num_seconds();
        let set_cookie = self.config.cookie.build_set_cookie(&token, expires_in);
        Ok(IssuedSession {
            token,
            expires_in,
            set_cookie,
        })
    }

    /// Validate a token and extract the claims
    pub fn validate_token(&self, token: &str) -> Result<Claims, ServiceError> {
        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.config.jwt_secret.as_bytes()),
            &Validation::new(Algorithm::HS256),
        )
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                ServiceError::Unauthorized("Session expired".to_string())
            }
            _ => ServiceError::Unauthorized("Invalid session token".to_string()),
        })
    }

    /// Resolves the caller from the session cookie or a bearer header.
    pub fn authenticate(&self, headers: &HeaderMap) -> Result<AuthUser, ServiceError> {
        let token = self
            .config
            .cookie
            .extract(headers)
            .or_else(|| bearer_token(headers))
            .ok_or_else(|| ServiceError::Unauthorized("Authentication required".to_string()))?;
        AuthUser::try_from(self.validate_token(&token)?)
    }

    /// Whether the account behind the session still exists and is active.
    pub async fn is_account_active(&self, auth: &AuthUser) -> Result<bool, ServiceError> {
        let active = match auth.role {
            Role::User => user::Entity::find_by_id(auth.user_id)
                .one(&*self.db)
                .await?
                .map(|u| u.is_active),
            Role::Admin => admin::Entity::find_by_id(auth.user_id)
                .one(&*self.db)
                .await?
                .map(|a| a.is_active),
        };
        Ok(active.unwrap_or(false))
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Authentication middleware. Blocked or deleted accounts are turned away
/// even while their token is still valid.
pub async fn auth_middleware(mut request: Request, next: Next) -> Response {
    let auth_service = match request.extensions().get::<Arc<AuthService>>() {
        Some(service) => service.clone(),
        None => {
            return ServiceError::InternalError("Authentication service not available".into())
                .into_response()
        }
    };

    let user = match auth_service.authenticate(request.headers()) {
        Ok(user) => user,
        Err(e) => {
            debug!(error = %e, "rejected unauthenticated request");
            return e.into_response();
        }
    };

    match auth_service.is_account_active(&user).await {
        Ok(true) => {}
        Ok(false) => {
            warn!(user_id = %user.user_id, role = %user.role, "inactive account presented a session");
            return ServiceError::Forbidden("Account is blocked".into()).into_response();
        }
        Err(e) => return e.into_response(),
    }

    request.extensions_mut().insert(user);
    next.run(request).await
}

/// Role middleware to check if a user has the required role
pub async fn role_middleware(
    State(required_role): State<Role>,
    request: Request,
    next: Next,
) -> Result<Response, ServiceError> {
    let user = request
        .extensions()
        .get::<AuthUser>()
        .ok_or_else(|| ServiceError::Unauthorized("Authentication required".to_string()))?;

    if !user.has_role(required_role) {
        return Err(ServiceError::Forbidden("Insufficient permissions".to_string()));
    }

    Ok(next.run(request).await)
}

/// Extension methods for Router to add auth middleware
pub trait AuthRouterExt {
    fn with_auth(self) -> Self;
    fn with_role(self, role: Role) -> Self;
}

impl<S> AuthRouterExt for axum::Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn with_auth(self) -> Self {
        self.layer(axum::middleware::from_fn(auth_middleware))
    }

    fn with_role(self, role: Role) -> Self {
        self.layer(axum::middleware::from_fn_with_state(role, role_middleware))
            .with_auth()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn service() -> AuthService {
        let cfg = AppConfig::new(
            "sqlite::memory:".into(),
            "0123456789abcdef0123456789abcdef".into(),
            "127.0.0.1".into(),
            0,
            "test".into(),
        );
        AuthService::new(
            AuthConfig::from(&cfg),
            Arc::new(DatabaseConnection::Disconnected),
        )
    }

    fn subject(role: Role) -> SessionSubject {
        SessionSubject {
            id: Uuid::new_v4(),
            role,
            email: "asha@example.com".into(),
            full_name: "Asha Rao".into(),
        }
    }

    #[test]
    fn session_lifetimes_follow_login_flow() {
        let svc = service();
        let s = subject(Role::User);
        assert_eq!(svc.issue_session(&s, SessionKind::Local).unwrap().expires_in, 30 * 60);
        assert_eq!(svc.issue_session(&s, SessionKind::Google).unwrap().expires_in, 60 * 60);
        assert_eq!(
            svc.issue_session(&subject(Role::Admin), SessionKind::Admin)
                .unwrap()
                .expires_in,
            60 * 60
        );
    }

    #[test]
    fn issued_token_round_trips_through_cookie() {
        let svc = service();
        let s = subject(Role::Admin);
        let session = svc.issue_session(&s, SessionKind::Admin).unwrap();
        assert!(session.set_cookie.contains("HttpOnly"));

        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_str(&format!("access_token={}", session.token)).unwrap(),
        );
        let user = svc.authenticate(&headers).unwrap();
        assert_eq!(user.user_id, s.id);
        assert!(user.is_admin());
        assert_eq!(user.full_name, "Asha Rao");
    }

    #[test]
    fn bearer_header_is_accepted() {
        let svc = service();
        let session = svc.issue_session(&subject(Role::User), SessionKind::Local).unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", session.token)).unwrap(),
        );
        assert_eq!(svc.authenticate(&headers).unwrap().role, Role::User);
    }

    #[test]
    fn missing_or_forged_tokens_are_unauthorized() {
        let svc = service();
        assert!(matches!(
            svc.authenticate(&HeaderMap::new()),
            Err(ServiceError::Unauthorized(_))
        ));
        assert!(matches!(
            svc.validate_token("not.a.jwt"),
            Err(ServiceError::Unauthorized(_))
        ));
    }

    #[test]
    fn expired_token_is_rejected() {
        let svc = service();
        let claims = Claims {
            sub: Uuid::new_v4().to_string(),
            role: Role::User,
            email: "x@example.com".into(),
            full_name: "X".into(),
            jti: "j".into(),
            iat: Utc::now().timestamp() - 7200,
            exp: Utc::now().timestamp() - 3600,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(svc.config.jwt_secret.as_bytes()),
        )
        .unwrap();
        match svc.validate_token(&token) {
            Err(ServiceError::Unauthorized(msg)) => assert_eq!(msg, "Session expired"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn role_display_is_lowercase() {
        assert_eq!(Role::Admin.to_string(), "admin");
        assert_eq!("user".parse::<Role>().unwrap(), Role::User);
    }
}

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{AppendHeaders, IntoResponse, Json},
    routing::{get, post},
    Extension, Router,
};
use serde::Serialize;

use crate::{
    auth::{AuthRouterExt, AuthUser, IssuedSession, Role},
    errors::ServiceError,
    handlers::common::{created_response, message_response, success_response},
    services::identity::{
        EmailRequest, GoogleCredential, LoginOutcome, LoginRequest, ResetPasswordRequest,
        SignupRequest, VerifyOtpRequest,
    },
    ApiResponse, AppState,
};

/// Body returned by every login flow; the token itself travels in the cookie.
#[derive(Debug, Serialize)]
pub struct SessionResponse<T> {
    pub account: T,
    pub role: Role,
    pub expires_in: i64,
}

#[derive(Debug, Serialize)]
pub struct TokenStatus {
    pub authenticated: bool,
    pub role: Role,
    pub is_active: bool,
}

pub fn routes() -> Router<AppState> {
    let public = Router::new()
        .route("/signup", post(signup))
        .route("/verifyOtp", post(verify_otp))
        .route("/resendOtp", post(resend_otp))
        .route("/login", post(login))
        .route("/googleSignup", post(google_signup))
        .route("/googleLogin", post(google_login))
        .route("/adminLogin", post(admin_login))
        .route("/forgotPassword", post(forgot_password))
        .route("/verifyForgotPasswordOTP", post(verify_forgot_password_otp))
        .route("/resetPassword", post(reset_password))
        .route("/logout", post(logout));

    let session = Router::new()
        .route("/verify", get(verify))
        .route("/me", get(me))
        .with_auth();

    public.merge(session)
}

fn with_session<T: Serialize>(
    message: &str,
    role: Role,
    outcome: LoginOutcome<T>,
) -> impl IntoResponse {
    let LoginOutcome { account, session } = outcome;
    let IssuedSession {
        expires_in,
        set_cookie,
        ..
    } = session;
    (
        AppendHeaders([(header::SET_COOKIE, set_cookie)]),
        message_response(
            message,
            SessionResponse {
                account,
                role,
                expires_in,
            },
        ),
    )
}

/// Starts registration: stores the pending account and mails an OTP.
async fn signup(
    State(state): State<AppState>,
    Json(payload): Json<SignupRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let issued = state.services.identity.signup(payload).await?;
    Ok(created_response("OTP sent to your email", issued))
}

async fn verify_otp(
    State(state): State<AppState>,
    Json(payload): Json<VerifyOtpRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let user = state.services.identity.verify_otp(payload).await?;
    Ok(created_response("Account verified successfully", user))
}

async fn resend_otp(
    State(state): State<AppState>,
    Json(payload): Json<EmailRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let issued = state.services.identity.resend_otp(payload).await?;
    Ok(message_response("A new OTP has been sent", issued))
}

async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let outcome = state.services.identity.login(payload).await?;
    Ok(with_session("Login successful", Role::User, outcome))
}

async fn google_signup(
    State(state): State<AppState>,
    Json(payload): Json<GoogleCredential>,
) -> Result<impl IntoResponse, ServiceError> {
    let outcome = state.services.identity.google_signup(payload).await?;
    Ok((
        StatusCode::CREATED,
        with_session("Signup successful", Role::User, outcome),
    ))
}

async fn google_login(
    State(state): State<AppState>,
    Json(payload): Json<GoogleCredential>,
) -> Result<impl IntoResponse, ServiceError> {
    let outcome = state.services.identity.google_login(payload).await?;
    Ok(with_session("Login successful", Role::User, outcome))
}

async fn admin_login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let outcome = state.services.identity.admin_login(payload).await?;
    Ok(with_session("Admin login successful", Role::Admin, outcome))
}

async fn forgot_password(
    State(state): State<AppState>,
    Json(payload): Json<EmailRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let issued = state.services.identity.forgot_password(payload).await?;
    Ok(message_response("OTP sent to your email", issued))
}

async fn verify_forgot_password_otp(
    State(state): State<AppState>,
    Json(payload): Json<VerifyOtpRequest>,
) -> Result<Json<ApiResponse<()>>, ServiceError> {
    state
        .services
        .identity
        .verify_forgot_password_otp(payload)
        .await?;
    Ok(Json(ApiResponse::message("OTP verified")))
}

async fn reset_password(
    State(state): State<AppState>,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<Json<ApiResponse<()>>, ServiceError> {
    state.services.identity.reset_password(payload).await?;
    Ok(Json(ApiResponse::message("Password reset successfully")))
}

async fn logout(State(state): State<AppState>) -> impl IntoResponse {
    (
        AppendHeaders([(header::SET_COOKIE, state.auth.cookie().build_clear_cookie())]),
        Json(ApiResponse::message("Logged out")),
    )
}

/// Token introspection; reaching the handler means the session is valid and
/// the account active.
async fn verify(Extension(user): Extension<AuthUser>) -> impl IntoResponse {
    success_response(TokenStatus {
        authenticated: true,
        role: user.role,
        is_active: true,
    })
}

async fn me(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, ServiceError> {
    let info = state.services.identity.me(&user).await?;
    Ok(success_response(info))
}

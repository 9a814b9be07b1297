#![allow(dead_code)]

use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    response::Response,
    Router,
};
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use serde_json::Value;
use storefront_api::{
    auth::{password::hash_password, SessionKind, SessionSubject},
    config::AppConfig,
    db,
    entities::{
        admin, brand,
        coupon::{self, DiscountType},
        otp_record::OtpPurpose,
        product, series,
        user::{self, AuthProvider},
        ImageAsset,
    },
    errors::ServiceError,
    integrations::{
        AssetStore, GatewayOrder, GoogleIdentity, GoogleIdentityVerifier, ImageUpload,
        Integrations, Mailer, PaymentGateway, PaymentSignatureVerifier,
    },
    AppState,
};
use tower::ServiceExt;
use uuid::Uuid;

pub const RAZORPAY_SECRET: &str = "test_razorpay_secret";
pub const USER_PASSWORD: &str = "Secret#123";

/// Gateway that hands out sequential order ids and remembers the amounts.
#[derive(Default)]
pub struct FakeGateway {
    next: AtomicU64,
    pub amounts: Mutex<Vec<i64>>,
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_order(
        &self,
        amount_minor: i64,
        currency: &str,
        receipt: &str,
    ) -> Result<GatewayOrder, ServiceError> {
        let n = self.next.fetch_add(1, Ordering::SeqCst) + 1;
        self.amounts.lock().unwrap().push(amount_minor);
        Ok(GatewayOrder {
            id: format!("order_test_{n}"),
            amount: amount_minor,
            currency: currency.to_string(),
            receipt: Some(receipt.to_string()),
            status: Some("created".to_string()),
        })
    }

    fn public_key(&self) -> &str {
        "rzp_test_key"
    }
}

/// Keeps every code it is asked to send.
#[derive(Default)]
pub struct CapturingMailer {
    pub sent: Mutex<Vec<(String, String, OtpPurpose)>>,
}

impl CapturingMailer {
    pub fn last_code_for(&self, email: &str) -> Option<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(to, _, _)| to == email)
            .map(|(_, code, _)| code.clone())
    }
}

#[async_trait]
impl Mailer for CapturingMailer {
    async fn send_otp(
        &self,
        to: &str,
        code: &str,
        purpose: OtpPurpose,
        _valid_for_secs: i64,
    ) -> Result<(), ServiceError> {
        self.sent
            .lock()
            .unwrap()
            .push((to.to_string(), code.to_string(), purpose));
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeAssetStore {
    next: AtomicU64,
    pub uploaded: Mutex<Vec<String>>,
    pub destroyed: Mutex<Vec<String>>,
}

#[async_trait]
impl AssetStore for FakeAssetStore {
    async fn upload(&self, image: ImageUpload) -> Result<ImageAsset, ServiceError> {
        let n = self.next.fetch_add(1, Ordering::SeqCst) + 1;
        let public_id = format!("storefront/{}_{n}", image.field);
        self.uploaded.lock().unwrap().push(public_id.clone());
        Ok(ImageAsset {
            url: format!("https://assets.test/{public_id}.jpg"),
            public_id,
        })
    }

    async fn destroy(&self, public_id: &str) -> Result<(), ServiceError> {
        self.destroyed.lock().unwrap().push(public_id.to_string());
        Ok(())
    }
}

/// Accepts only the tokens registered with `allow`.
#[derive(Default)]
pub struct FakeGoogle {
    tokens: Mutex<Vec<(String, GoogleIdentity)>>,
}

impl FakeGoogle {
    pub fn allow(&self, token: &str, identity: GoogleIdentity) {
        self.tokens
            .lock()
            .unwrap()
            .push((token.to_string(), identity));
    }
}

#[async_trait]
impl GoogleIdentityVerifier for FakeGoogle {
    async fn verify(&self, id_token: &str) -> Result<GoogleIdentity, ServiceError> {
        self.tokens
            .lock()
            .unwrap()
            .iter()
            .find(|(t, _)| t == id_token)
            .map(|(_, identity)| identity.clone())
            .ok_or_else(|| ServiceError::Unauthorized("Invalid Google credential".into()))
    }
}

/// A seeded customer with a ready session token
pub struct SeededUser {
    pub model: user::Model,
    pub token: String,
}

/// Application wired over a private in-memory SQLite database with fake
/// third-party collaborators.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub gateway: Arc<FakeGateway>,
    pub mailer: Arc<CapturingMailer>,
    pub assets: Arc<FakeAssetStore>,
    pub google: Arc<FakeGoogle>,
    pub signatures: PaymentSignatureVerifier,
}

impl TestApp {
    pub async fn new() -> Self {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            "test_secret_key_for_testing_purposes_only_32chars".to_string(),
            "127.0.0.1".to_string(),
            0,
            "test".to_string(),
        );
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        cfg.razorpay_key_id = "rzp_test_key".to_string();
        cfg.razorpay_key_secret = RAZORPAY_SECRET.to_string();

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let gateway = Arc::new(FakeGateway::default());
        let mailer = Arc::new(CapturingMailer::default());
        let assets = Arc::new(FakeAssetStore::default());
        let google = Arc::new(FakeGoogle::default());
        let signatures = PaymentSignatureVerifier::new(RAZORPAY_SECRET);

        let integrations = Integrations {
            gateway: gateway.clone(),
            signatures: signatures.clone(),
            mailer: mailer.clone(),
            assets: assets.clone(),
            google: google.clone(),
        };
        let state = AppState::build(pool, cfg, integrations);
        let router = storefront_api::app_router(state.clone());

        Self {
            router,
            state,
            gateway,
            mailer,
            assets,
            google,
            signatures,
        }
    }

    pub fn db(&self) -> &sea_orm::DatabaseConnection {
        &self.state.db
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// JSON request with an optional bearer token.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(tok) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {tok}"));
        }
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(serde_json::to_vec(&json).expect("serialize request body"))
            }
            None => Body::empty(),
        };
        self.send(builder.body(body).expect("failed to build request"))
            .await
    }

    /// Same as `request`, authenticating with the session cookie instead.
    pub async fn request_with_cookie(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        cookie: &str,
    ) -> Response {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::COOKIE, cookie);
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(serde_json::to_vec(&json).expect("serialize request body"))
            }
            None => Body::empty(),
        };
        self.send(builder.body(body).expect("failed to build request"))
            .await
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> Response {
        self.request(Method::GET, uri, None, token).await
    }

    pub async fn post(&self, uri: &str, body: Value, token: Option<&str>) -> Response {
        self.request(Method::POST, uri, Some(body), token).await
    }

    pub async fn patch(&self, uri: &str, body: Option<Value>, token: Option<&str>) -> Response {
        self.request(Method::PATCH, uri, body, token).await
    }

    // Seeding

    pub async fn seed_user(&self, username: &str) -> SeededUser {
        let now = Utc::now();
        let model = user::ActiveModel {
            id: Set(Uuid::new_v4()),
            full_name: Set("Asha Rao".to_string()),
            username: Set(username.to_string()),
            email: Set(format!("{username}@example.com")),
            phone: Set(Some("9876543210".to_string())),
            password_hash: Set(Some(hash_password(USER_PASSWORD).expect("hash password"))),
            auth_provider: Set(AuthProvider::Local),
            google_subject: Set(None),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(self.db())
        .await
        .expect("seed user");
        let token = self
            .state
            .auth
            .issue_session(&SessionSubject::from(&model), SessionKind::Local)
            .expect("issue session")
            .token;
        SeededUser { model, token }
    }

    /// Returns an admin session token.
    pub async fn seed_admin(&self) -> String {
        let model = admin::ActiveModel {
            id: Set(Uuid::new_v4()),
            email: Set("admin@example.com".to_string()),
            full_name: Set("Store Admin".to_string()),
            password_hash: Set(hash_password("Admin#1234").expect("hash password")),
            is_active: Set(true),
            created_at: Set(Utc::now()),
        }
        .insert(self.db())
        .await
        .expect("seed admin");
        self.state
            .auth
            .issue_session(&SessionSubject::from(&model), SessionKind::Admin)
            .expect("issue session")
            .token
    }

    pub async fn seed_brand(&self, name: &str) -> brand::Model {
        let now = Utc::now();
        brand::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.to_string()),
            name_key: Set(name.trim().to_lowercase()),
            description: Set(String::new()),
            offer: Set(0),
            is_active: Set(true),
            logo: Set(None),
            banner: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(self.db())
        .await
        .expect("seed brand")
    }

    pub async fn seed_series(&self, brand_id: Uuid, name: &str) -> series::Model {
        let now = Utc::now();
        series::ActiveModel {
            id: Set(Uuid::new_v4()),
            brand_id: Set(brand_id),
            name: Set(name.to_string()),
            name_key: Set(name.trim().to_lowercase()),
            description: Set(String::new()),
            offer: Set(0),
            is_active: Set(true),
            card_image: Set(None),
            banner: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(self.db())
        .await
        .expect("seed series")
    }

    /// Active product under a fresh brand and series.
    pub async fn seed_product(&self, name: &str, price: i64, stock: i32) -> product::Model {
        let brand = self.seed_brand(&format!("{name} Brand")).await;
        let series = self.seed_series(brand.id, &format!("{name} Series")).await;
        self.seed_product_in(&brand, &series, name, price, stock)
            .await
    }

    pub async fn seed_product_in(
        &self,
        brand: &brand::Model,
        series: &series::Model,
        name: &str,
        price: i64,
        stock: i32,
    ) -> product::Model {
        let now = Utc::now();
        product::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.to_string()),
            description: Set(format!("{name} description")),
            price: Set(Decimal::from(price)),
            stock: Set(stock),
            offer: Set(0),
            brand_id: Set(brand.id),
            series_id: Set(series.id),
            is_active: Set(true),
            is_featured: Set(false),
            images: Set(ImageAsset::list_to_json(&[ImageAsset {
                url: "https://assets.test/p.jpg".to_string(),
                public_id: format!("storefront/{name}"),
            }])),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(self.db())
        .await
        .expect("seed product")
    }

    /// Percentage coupon valid from yesterday for thirty days.
    pub async fn seed_percentage_coupon(
        &self,
        code: &str,
        percent: i64,
        max_redeemable: i64,
        min_amount: i64,
        user_limit: i32,
    ) -> coupon::Model {
        let now = Utc::now();
        coupon::ActiveModel {
            id: Set(Uuid::new_v4()),
            code: Set(code.to_uppercase()),
            description: Set(format!("{percent}% off")),
            discount_type: Set(DiscountType::Percentage),
            discount: Set(Decimal::from(percent)),
            start_date: Set(now - Duration::days(1)),
            expiry_date: Set(now + Duration::days(30)),
            min_amount: Set(Decimal::from(min_amount)),
            max_redeemable_amount: Set(Decimal::from(max_redeemable)),
            usage_limit: Set(0),
            used_count: Set(0),
            user_limit: Set(user_limit),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(self.db())
        .await
        .expect("seed coupon")
    }

    pub async fn product(&self, id: Uuid) -> product::Model {
        product::Entity::find_by_id(id)
            .one(self.db())
            .await
            .expect("load product")
            .expect("product exists")
    }

    pub async fn user_by_email(&self, email: &str) -> Option<user::Model> {
        user::Entity::find()
            .filter(user::Column::Email.eq(email))
            .one(self.db())
            .await
            .expect("load user")
    }

    /// Valid Razorpay-style signature for the pair.
    pub fn sign(&self, order_id: &str, payment_id: &str) -> String {
        self.signatures
            .sign(order_id, payment_id)
            .expect("sign payment")
    }
}

pub fn address_json() -> Value {
    serde_json::json!({
        "full_name": "Asha Rao",
        "phone": "9876543210",
        "line1": "12 MG Road",
        "city": "Bengaluru",
        "state": "Karnataka",
        "pincode": "560001"
    })
}

pub async fn body_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read response body");
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(&bytes).expect("response body is JSON")
}

/// Asserts the status and returns the parsed body.
pub async fn expect_status(response: Response, status: StatusCode) -> Value {
    let actual = response.status();
    let body = body_json(response).await;
    assert_eq!(actual, status, "unexpected status, body: {body}");
    body
}

/// Decimals serialize as strings; accept numbers too.
pub fn money(value: &Value) -> Decimal {
    match value {
        Value::String(s) => Decimal::from_str(s).expect("decimal string"),
        Value::Number(n) => Decimal::from_str(&n.to_string()).expect("decimal number"),
        other => panic!("not a money value: {other}"),
    }
}

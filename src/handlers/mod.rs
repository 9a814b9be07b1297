pub mod admin;
pub mod auth;
pub mod common;
pub mod health;
pub mod shop;
pub mod uploads;
pub mod user;

use std::sync::Arc;

use crate::{
    auth::AuthService,
    config::AppConfig,
    db::DbPool,
    integrations::Integrations,
    services::{
        cart::CartService, catalog::CatalogService, coupons::CouponService,
        identity::{IdentityService, OtpSettings},
        orders::OrderService,
        reports::ReportService,
        users::UserService,
        wallet::WalletService,
        wishlist::WishlistService,
    },
};

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub catalog: Arc<CatalogService>,
    pub cart: Arc<CartService>,
    pub wishlist: Arc<WishlistService>,
    pub coupons: Arc<CouponService>,
    pub orders: Arc<OrderService>,
    pub wallet: Arc<WalletService>,
    pub users: Arc<UserService>,
    pub identity: Arc<IdentityService>,
    pub reports: Arc<ReportService>,
}

impl AppServices {
    pub fn new(
        db: Arc<DbPool>,
        config: &AppConfig,
        auth: Arc<AuthService>,
        integrations: Integrations,
    ) -> Self {
        Self {
            catalog: Arc::new(CatalogService::new(db.clone(), integrations.assets)),
            cart: Arc::new(CartService::new(db.clone())),
            wishlist: Arc::new(WishlistService::new(db.clone())),
            coupons: Arc::new(CouponService::new(db.clone())),
            orders: Arc::new(OrderService::new(
                db.clone(),
                integrations.gateway,
                integrations.signatures,
                config.currency.clone(),
            )),
            wallet: Arc::new(WalletService::new(db.clone())),
            users: Arc::new(UserService::new(db.clone())),
            identity: Arc::new(IdentityService::new(
                db.clone(),
                auth,
                integrations.mailer,
                integrations.google,
                OtpSettings::from(config),
            )),
            reports: Arc::new(ReportService::new(db)),
        }
    }
}

impl AppState {
    /// Wires services over `db`; used by `main` and the integration tests.
    pub fn build(db: DbPool, config: AppConfig, integrations: Integrations) -> Self {
        let db = Arc::new(db);
        let auth = Arc::new(AuthService::new((&config).into(), db.clone()));
        let services = AppServices::new(db.clone(), &config, auth.clone(), integrations);
        Self {
            db,
            config: Arc::new(config),
            auth,
            services,
        }
    }
}

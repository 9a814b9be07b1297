//! Routes for signed-in shoppers: profile, addresses, cart, wishlist,
//! coupons, orders, Razorpay payments and the wallet.

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::{delete, get, patch, post},
    Extension, Json, Router,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    auth::{AuthRouterExt, AuthUser, Role},
    errors::ServiceError,
    handlers::common::{created_response, message_response, success_response, PaginationParams},
    services::{
        cart::{AddToCartRequest, UpdateCartItemRequest},
        orders::{
            FailedPaymentRequest, PlaceOrderRequest, RazorpayOrderRequest, RetryVerifyRequest,
            VerifyPaymentRequest,
        },
        users::{CreateAddressRequest, UpdateAddressRequest, UpdateProfileRequest},
    },
    ApiResponse, AppState,
};

#[derive(Debug, Deserialize)]
pub struct WishlistToggleRequest {
    pub product_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct ApplyCouponRequest {
    pub code: String,
    #[serde(alias = "cartAmount")]
    pub cart_amount: Decimal,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/userDetails", get(get_profile).patch(update_profile))
        .route("/addresses", get(list_addresses).post(add_address))
        .route(
            "/addresses/:id",
            patch(update_address).delete(delete_address),
        )
        .route("/cart", get(get_cart).post(add_to_cart).delete(clear_cart))
        .route(
            "/cart/:product_id",
            patch(update_cart_item).delete(remove_cart_item),
        )
        .route("/wishlist", get(get_wishlist).post(toggle_wishlist))
        .route("/wishlist/:product_id", delete(remove_wishlist_item))
        .route("/coupons", get(available_coupons))
        .route("/coupons/apply", post(apply_coupon))
        .route("/orders", get(list_orders).post(place_order))
        .route("/orders/:id", get(get_order))
        .route("/orders/:id/cancel", patch(cancel_order))
        .route("/orders/:id/return", patch(request_return))
        .route("/orders/:id/retry-payment", post(retry_payment))
        .route("/orders/:id/retry-payment/verify", post(verify_retry_payment))
        .route("/payments/razorpay/order", post(create_razorpay_order))
        .route("/payments/razorpay/verify", post(verify_razorpay_payment))
        .route("/payments/razorpay/failed", post(record_failed_payment))
        .route("/wallet", get(get_wallet))
        .with_role(Role::User)
}

// Profile and addresses

async fn get_profile(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, ServiceError> {
    Ok(success_response(
        state.services.users.get_profile(user.user_id).await?,
    ))
}

async fn update_profile(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<UpdateProfileRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let updated = state
        .services
        .users
        .update_profile(user.user_id, payload)
        .await?;
    Ok(message_response("Profile updated", updated))
}

async fn list_addresses(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, ServiceError> {
    Ok(success_response(
        state.services.users.list_addresses(user.user_id).await?,
    ))
}

async fn add_address(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<CreateAddressRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let address = state
        .services
        .users
        .add_address(user.user_id, payload)
        .await?;
    Ok(created_response("Address added", address))
}

async fn update_address(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateAddressRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let address = state
        .services
        .users
        .update_address(user.user_id, id, payload)
        .await?;
    Ok(message_response("Address updated", address))
}

async fn delete_address(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<()>>, ServiceError> {
    state.services.users.delete_address(user.user_id, id).await?;
    Ok(Json(ApiResponse::message("Address deleted")))
}

// Cart

async fn get_cart(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, ServiceError> {
    Ok(success_response(state.services.cart.get_cart(user.user_id).await?))
}

async fn add_to_cart(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<AddToCartRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let cart = state.services.cart.add_item(user.user_id, payload).await?;
    Ok(message_response("Added to cart", cart))
}

async fn update_cart_item(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(product_id): Path<Uuid>,
    Json(payload): Json<UpdateCartItemRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let cart = state
        .services
        .cart
        .update_quantity(user.user_id, product_id, payload)
        .await?;
    Ok(message_response("Cart updated", cart))
}

async fn remove_cart_item(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(product_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let cart = state
        .services
        .cart
        .remove_item(user.user_id, product_id)
        .await?;
    Ok(message_response("Removed from cart", cart))
}

async fn clear_cart(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, ServiceError> {
    let cart = state.services.cart.clear_cart(user.user_id).await?;
    Ok(message_response("Cart cleared", cart))
}

// Wishlist

async fn get_wishlist(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, ServiceError> {
    Ok(success_response(
        state.services.wishlist.get_wishlist(user.user_id).await?,
    ))
}

async fn toggle_wishlist(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<WishlistToggleRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let outcome = state
        .services
        .wishlist
        .toggle(user.user_id, payload.product_id)
        .await?;
    let message = if outcome.added {
        "Added to wishlist"
    } else {
        "Removed from wishlist"
    };
    Ok(message_response(message, outcome))
}

async fn remove_wishlist_item(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(product_id): Path<Uuid>,
) -> Result<Json<ApiResponse<()>>, ServiceError> {
    state
        .services
        .wishlist
        .remove(user.user_id, product_id)
        .await?;
    Ok(Json(ApiResponse::message("Removed from wishlist")))
}

// Coupons

async fn available_coupons(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, ServiceError> {
    Ok(success_response(
        state.services.coupons.available_coupons(user.user_id).await?,
    ))
}

async fn apply_coupon(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<ApplyCouponRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let preview = state
        .services
        .coupons
        .apply_coupon(user.user_id, &payload.code, payload.cart_amount)
        .await?;
    Ok(message_response("Coupon applied", preview))
}

// Orders

async fn place_order(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<PlaceOrderRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state
        .services
        .orders
        .place_cod_order(user.user_id, payload)
        .await?;
    Ok(created_response("Order placed successfully", order))
}

async fn list_orders(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(pagination): Query<PaginationParams>,
) -> Result<impl IntoResponse, ServiceError> {
    let (page, limit) = pagination.normalized();
    let orders = state
        .services
        .orders
        .list_user_orders(user.user_id, page, limit)
        .await?;
    Ok(success_response(orders))
}

async fn get_order(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    Ok(success_response(
        state.services.orders.get_user_order(user.user_id, id).await?,
    ))
}

async fn cancel_order(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state.services.orders.cancel_order(user.user_id, id).await?;
    Ok(message_response("Order cancelled", order))
}

async fn request_return(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state
        .services
        .orders
        .request_return(user.user_id, id)
        .await?;
    Ok(message_response("Return requested", order))
}

async fn retry_payment(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let checkout = state
        .services
        .orders
        .create_retry_payment(user.user_id, id)
        .await?;
    Ok(success_response(checkout))
}

async fn verify_retry_payment(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(payload): Json<RetryVerifyRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state
        .services
        .orders
        .verify_retry_payment(user.user_id, id, payload)
        .await?;
    Ok(message_response("Payment verified", order))
}

// Razorpay checkout

async fn create_razorpay_order(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<RazorpayOrderRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let checkout = state
        .services
        .orders
        .create_razorpay_order(user.user_id, payload)
        .await?;
    Ok(created_response("Payment order created", checkout))
}

async fn verify_razorpay_payment(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<VerifyPaymentRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state
        .services
        .orders
        .verify_razorpay_payment(user.user_id, payload)
        .await?;
    Ok(created_response("Payment verified and order placed", order))
}

async fn record_failed_payment(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<FailedPaymentRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state
        .services
        .orders
        .record_failed_payment(user.user_id, payload)
        .await?;
    Ok(created_response("Order saved with failed payment", order))
}

// Wallet

async fn get_wallet(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, ServiceError> {
    Ok(success_response(
        state.services.wallet.get_wallet(user.user_id).await?,
    ))
}

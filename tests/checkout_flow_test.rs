mod common;

use axum::http::StatusCode;
use common::{address_json, expect_status, money, TestApp};
use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};
use serde_json::{json, Value};
use storefront_api::entities::{order, product, user_coupon};

async fn add_to_cart(app: &TestApp, token: &str, product_id: uuid::Uuid, quantity: i32) -> Value {
    let res = app
        .post(
            "/api/user/cart",
            json!({ "product_id": product_id, "quantity": quantity }),
            Some(token),
        )
        .await;
    expect_status(res, StatusCode::OK).await
}

async fn open_checkout(app: &TestApp, token: &str, coupon: Option<&str>) -> Value {
    let res = app
        .post(
            "/api/user/payments/razorpay/order",
            json!({ "shipping_address": address_json(), "coupon_code": coupon }),
            Some(token),
        )
        .await;
    expect_status(res, StatusCode::CREATED).await["data"].clone()
}

async fn place_cod(
    app: &TestApp,
    token: &str,
    product_id: uuid::Uuid,
    coupon: &str,
) -> axum::response::Response {
    app.post(
        "/api/user/orders",
        json!({
            "items": [{ "product_id": product_id, "quantity": 1 }],
            "shipping_address": address_json(),
            "payment_method": "cod",
            "coupon_code": coupon,
        }),
        Some(token),
    )
    .await
}

async fn order_count(app: &TestApp) -> u64 {
    order::Entity::find().count(app.db()).await.unwrap()
}

#[tokio::test]
async fn razorpay_checkout_with_coupon_commits_everything_once() {
    let app = TestApp::new().await;
    let user = app.seed_user("shopper").await;
    let product = app.seed_product("Phone", 1000, 10).await;
    let coupon = app.seed_percentage_coupon("SAVE10", 10, 150, 500, 1).await;

    add_to_cart(&app, &user.token, product.id, 1).await;
    let cart = add_to_cart(&app, &user.token, product.id, 1).await;
    let line = &cart["data"]["items"][0];
    assert_eq!(line["quantity"], 2);
    assert_eq!(money(&line["line_total"]), Decimal::from(2000));

    let res = app
        .post(
            "/api/user/coupons/apply",
            json!({ "code": "save10", "cartAmount": 2000 }),
            Some(&user.token),
        )
        .await;
    let preview = expect_status(res, StatusCode::OK).await;
    assert_eq!(money(&preview["data"]["discount"]), Decimal::from(150));
    assert_eq!(money(&preview["data"]["final_amount"]), Decimal::from(1850));

    let checkout = open_checkout(&app, &user.token, Some("SAVE10")).await;
    assert_eq!(checkout["key_id"], "rzp_test_key");
    assert_eq!(checkout["gateway_order"]["amount"], 185000);
    assert_eq!(*app.gateway.amounts.lock().unwrap(), vec![185000]);
    assert_eq!(money(&checkout["order_details"]["total_amount"]), Decimal::from(1850));
    // Nothing is taken before the payment is verified.
    assert_eq!(app.product(product.id).await.stock, 10);

    let gateway_order_id = checkout["gateway_order"]["id"].as_str().unwrap().to_string();
    let signature = app.sign(&gateway_order_id, "pay_001");
    let res = app
        .post(
            "/api/user/payments/razorpay/verify",
            json!({
                "razorpay_order_id": gateway_order_id,
                "razorpay_payment_id": "pay_001",
                "razorpay_signature": signature,
                "order_details": checkout["order_details"],
            }),
            Some(&user.token),
        )
        .await;
    let placed = expect_status(res, StatusCode::CREATED).await["data"].clone();
    assert_eq!(money(&placed["subtotal_after_offer"]), Decimal::from(2000));
    assert_eq!(money(&placed["coupon_discount"]), Decimal::from(150));
    assert_eq!(money(&placed["total_amount"]), Decimal::from(1850));
    assert_eq!(placed["payment_status"], "paid");
    assert_eq!(placed["order_status"], "confirmed");
    assert_eq!(placed["coupon_code"], "SAVE10");
    assert!(placed["order_number"].as_str().unwrap().starts_with("ORD-"));
    assert_eq!(placed["items"].as_array().unwrap().len(), 1);

    assert_eq!(app.product(product.id).await.stock, 8);
    let res = app.get("/api/user/cart", Some(&user.token)).await;
    let cart = expect_status(res, StatusCode::OK).await;
    assert!(cart["data"]["items"].as_array().unwrap().is_empty());

    let redemption = user_coupon::Entity::find()
        .filter(user_coupon::Column::UserId.eq(user.model.id))
        .filter(user_coupon::Column::CouponId.eq(coupon.id))
        .one(app.db())
        .await
        .unwrap()
        .expect("redemption recorded");
    assert_eq!(redemption.count, 1);

    // Replaying the same payment is refused.
    let res = app
        .post(
            "/api/user/payments/razorpay/verify",
            json!({
                "razorpay_order_id": gateway_order_id,
                "razorpay_payment_id": "pay_001",
                "razorpay_signature": app.sign(&gateway_order_id, "pay_001"),
                "order_details": checkout["order_details"],
            }),
            Some(&user.token),
        )
        .await;
    expect_status(res, StatusCode::CONFLICT).await;
    assert_eq!(order_count(&app).await, 1);
}

#[tokio::test]
async fn tampered_payment_leaves_no_trace() {
    let app = TestApp::new().await;
    let user = app.seed_user("tamperer").await;
    let product = app.seed_product("Tablet", 1000, 5).await;
    add_to_cart(&app, &user.token, product.id, 2).await;
    let checkout = open_checkout(&app, &user.token, None).await;
    let gateway_order_id = checkout["gateway_order"]["id"].as_str().unwrap().to_string();
    let signature = app.sign(&gateway_order_id, "pay_real");

    // Signature computed for another payment id.
    let res = app
        .post(
            "/api/user/payments/razorpay/verify",
            json!({
                "razorpay_order_id": gateway_order_id,
                "razorpay_payment_id": "pay_forged",
                "razorpay_signature": signature,
                "order_details": checkout["order_details"],
            }),
            Some(&user.token),
        )
        .await;
    let body = expect_status(res, StatusCode::BAD_REQUEST).await;
    assert_eq!(body["message"], "Invalid payment signature");

    // Valid signature, but the echoed totals were edited.
    let mut edited = checkout["order_details"].clone();
    edited["total_amount"] = json!("1");
    let res = app
        .post(
            "/api/user/payments/razorpay/verify",
            json!({
                "razorpay_order_id": gateway_order_id,
                "razorpay_payment_id": "pay_real",
                "razorpay_signature": signature,
                "order_details": edited,
            }),
            Some(&user.token),
        )
        .await;
    expect_status(res, StatusCode::BAD_REQUEST).await;

    assert_eq!(app.product(product.id).await.stock, 5);
    assert_eq!(order_count(&app).await, 0);
    let res = app.get("/api/user/cart", Some(&user.token)).await;
    let cart = expect_status(res, StatusCode::OK).await;
    assert_eq!(cart["data"]["items"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn another_users_checkout_cannot_be_claimed() {
    let app = TestApp::new().await;
    let owner = app.seed_user("owner_one").await;
    let thief = app.seed_user("thief_one").await;
    let product = app.seed_product("Camera", 1000, 5).await;
    add_to_cart(&app, &owner.token, product.id, 1).await;
    let checkout = open_checkout(&app, &owner.token, None).await;
    let gateway_order_id = checkout["gateway_order"]["id"].as_str().unwrap().to_string();

    let res = app
        .post(
            "/api/user/payments/razorpay/verify",
            json!({
                "razorpay_order_id": gateway_order_id,
                "razorpay_payment_id": "pay_x",
                "razorpay_signature": app.sign(&gateway_order_id, "pay_x"),
                "order_details": checkout["order_details"],
            }),
            Some(&thief.token),
        )
        .await;
    expect_status(res, StatusCode::FORBIDDEN).await;
    assert_eq!(order_count(&app).await, 0);
}

#[tokio::test]
async fn checkout_beyond_stock_is_rejected() {
    let app = TestApp::new().await;
    let user = app.seed_user("greedy").await;
    let product = app.seed_product("Watch", 1000, 3).await;

    let res = app
        .post(
            "/api/user/cart",
            json!({ "product_id": product.id, "quantity": 4 }),
            Some(&user.token),
        )
        .await;
    let body = expect_status(res, StatusCode::BAD_REQUEST).await;
    assert_eq!(body["message"], "Only 3 left in stock");

    let res = app
        .post(
            "/api/user/orders",
            json!({
                "items": [{ "product_id": product.id, "quantity": 4 }],
                "shipping_address": address_json(),
                "payment_method": "cod",
            }),
            Some(&user.token),
        )
        .await;
    let body = expect_status(res, StatusCode::BAD_REQUEST).await;
    assert!(body["message"]
        .as_str()
        .unwrap()
        .starts_with("Insufficient stock for Watch"));
    assert_eq!(app.product(product.id).await.stock, 3);
    assert_eq!(order_count(&app).await, 0);
}

#[tokio::test]
async fn cod_order_with_stale_total_is_rejected() {
    let app = TestApp::new().await;
    let user = app.seed_user("stale_total").await;
    let product = app.seed_product("Speaker", 1000, 3).await;
    add_to_cart(&app, &user.token, product.id, 1).await;

    let res = app
        .post(
            "/api/user/orders",
            json!({
                "shipping_address": address_json(),
                "payment_method": "cod",
                "total_amount": 900,
            }),
            Some(&user.token),
        )
        .await;
    expect_status(res, StatusCode::BAD_REQUEST).await;

    let res = app
        .post(
            "/api/user/orders",
            json!({
                "shipping_address": address_json(),
                "payment_method": "cod",
                "total_amount": 1000,
            }),
            Some(&user.token),
        )
        .await;
    let placed = expect_status(res, StatusCode::CREATED).await;
    assert_eq!(placed["data"]["payment_status"], "pending");
    assert_eq!(app.product(product.id).await.stock, 2);
}

#[tokio::test]
async fn coupon_stops_at_the_per_user_limit() {
    let app = TestApp::new().await;
    let user = app.seed_user("loyal").await;
    let product = app.seed_product("Earbuds", 1000, 10).await;
    app.seed_percentage_coupon("ONCE", 10, 150, 500, 1).await;

    let res = place_cod(&app, &user.token, product.id, "ONCE").await;
    let first = expect_status(res, StatusCode::CREATED).await;
    assert_eq!(money(&first["data"]["coupon_discount"]), Decimal::from(100));
    assert_eq!(money(&first["data"]["total_amount"]), Decimal::from(900));

    let res = place_cod(&app, &user.token, product.id, "ONCE").await;
    let second = expect_status(res, StatusCode::BAD_REQUEST).await;
    assert_eq!(
        second["message"],
        "You have already used this coupon the maximum number of times"
    );

    let res = app
        .post(
            "/api/user/coupons/apply",
            json!({ "code": "ONCE", "cart_amount": 1000 }),
            Some(&user.token),
        )
        .await;
    expect_status(res, StatusCode::BAD_REQUEST).await;
}

#[tokio::test]
async fn coupon_without_per_user_limit_can_be_reused() {
    let app = TestApp::new().await;
    let user = app.seed_user("regular").await;
    let product = app.seed_product("Charger", 1000, 10).await;
    let coupon = app.seed_percentage_coupon("ALWAYS", 10, 150, 500, 0).await;

    for _ in 0..2 {
        let res = place_cod(&app, &user.token, product.id, "ALWAYS").await;
        let placed = expect_status(res, StatusCode::CREATED).await;
        assert_eq!(money(&placed["data"]["total_amount"]), Decimal::from(900));
    }

    // A paid online checkout commits the third redemption.
    add_to_cart(&app, &user.token, product.id, 1).await;
    let checkout = open_checkout(&app, &user.token, Some("ALWAYS")).await;
    let gateway_order_id = checkout["gateway_order"]["id"].as_str().unwrap().to_string();
    let res = app
        .post(
            "/api/user/payments/razorpay/verify",
            json!({
                "razorpay_order_id": gateway_order_id,
                "razorpay_payment_id": "pay_again",
                "razorpay_signature": app.sign(&gateway_order_id, "pay_again"),
                "order_details": checkout["order_details"],
            }),
            Some(&user.token),
        )
        .await;
    expect_status(res, StatusCode::CREATED).await;

    let redemption = user_coupon::Entity::find()
        .filter(user_coupon::Column::UserId.eq(user.model.id))
        .filter(user_coupon::Column::CouponId.eq(coupon.id))
        .one(app.db())
        .await
        .unwrap()
        .expect("redemption recorded");
    assert_eq!(redemption.count, 3);
    assert_eq!(order_count(&app).await, 3);
    assert_eq!(app.product(product.id).await.stock, 7);
}

#[tokio::test]
async fn failed_payment_can_be_retried() {
    let app = TestApp::new().await;
    let user = app.seed_user("retrier").await;
    let product = app.seed_product("Laptop", 1000, 4).await;
    add_to_cart(&app, &user.token, product.id, 2).await;
    let checkout = open_checkout(&app, &user.token, None).await;
    let gateway_order_id = checkout["gateway_order"]["id"].as_str().unwrap().to_string();

    let res = app
        .post(
            "/api/user/payments/razorpay/failed",
            json!({ "razorpay_order_id": gateway_order_id }),
            Some(&user.token),
        )
        .await;
    let failed = expect_status(res, StatusCode::CREATED).await["data"].clone();
    assert_eq!(failed["payment_status"], "failed");
    assert_eq!(failed["order_status"], "pending");
    assert_eq!(app.product(product.id).await.stock, 4);
    let order_id = failed["id"].as_str().unwrap().to_string();

    let res = app
        .post(
            &format!("/api/user/orders/{order_id}/retry-payment"),
            json!({}),
            Some(&user.token),
        )
        .await;
    let retry = expect_status(res, StatusCode::OK).await["data"].clone();
    assert_eq!(retry["gateway_order"]["amount"], 200000);
    let retry_gateway_id = retry["gateway_order"]["id"].as_str().unwrap().to_string();
    assert_ne!(retry_gateway_id, gateway_order_id);

    let res = app
        .post(
            &format!("/api/user/orders/{order_id}/retry-payment/verify"),
            json!({
                "razorpay_order_id": retry_gateway_id,
                "razorpay_payment_id": "pay_retry",
                "razorpay_signature": app.sign(&retry_gateway_id, "pay_retry"),
            }),
            Some(&user.token),
        )
        .await;
    let paid = expect_status(res, StatusCode::OK).await["data"].clone();
    assert_eq!(paid["payment_status"], "paid");
    assert_eq!(paid["order_status"], "confirmed");
    assert_eq!(app.product(product.id).await.stock, 2);

    let res = app
        .post(
            &format!("/api/user/orders/{order_id}/retry-payment"),
            json!({}),
            Some(&user.token),
        )
        .await;
    let body = expect_status(res, StatusCode::BAD_REQUEST).await;
    assert_eq!(body["message"], "Order is already paid");
    assert_eq!(order_count(&app).await, 1);
}

#[tokio::test]
async fn retry_reports_products_that_disappeared() {
    let app = TestApp::new().await;
    let user = app.seed_user("late_payer").await;
    let product = app.seed_product("Camera", 1000, 4).await;
    add_to_cart(&app, &user.token, product.id, 1).await;
    let checkout = open_checkout(&app, &user.token, None).await;
    let gateway_order_id = checkout["gateway_order"]["id"].as_str().unwrap().to_string();
    let res = app
        .post(
            "/api/user/payments/razorpay/failed",
            json!({ "razorpay_order_id": gateway_order_id }),
            Some(&user.token),
        )
        .await;
    let failed = expect_status(res, StatusCode::CREATED).await["data"].clone();
    let order_id = failed["id"].as_str().unwrap().to_string();

    product::Entity::delete_by_id(product.id)
        .exec(app.db())
        .await
        .unwrap();

    let res = app
        .post(
            &format!("/api/user/orders/{order_id}/retry-payment"),
            json!({}),
            Some(&user.token),
        )
        .await;
    let body = expect_status(res, StatusCode::NOT_FOUND).await;
    assert_eq!(body["message"], "Camera is no longer available");
    assert_eq!(app.gateway.amounts.lock().unwrap().len(), 1);
}

mod common;

use axum::http::StatusCode;
use common::{address_json, expect_status, money, TestApp};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use uuid::Uuid;

/// Places a cash-on-delivery order for `quantity` units and returns it.
async fn place_cod(app: &TestApp, token: &str, product_id: Uuid, quantity: i32) -> Value {
    let res = app
        .post(
            "/api/user/orders",
            json!({
                "items": [{ "product_id": product_id, "quantity": quantity }],
                "shipping_address": address_json(),
                "payment_method": "cod",
            }),
            Some(token),
        )
        .await;
    expect_status(res, StatusCode::CREATED).await["data"].clone()
}

async fn set_status(
    app: &TestApp,
    admin: &str,
    order_id: &str,
    status: &str,
) -> axum::response::Response {
    app.patch(
        &format!("/api/admin/orders/{order_id}/status"),
        Some(json!({ "status": status })),
        Some(admin),
    )
    .await
}

#[tokio::test]
async fn delivering_cod_order_marks_it_paid() {
    let app = TestApp::new().await;
    let admin = app.seed_admin().await;
    let user = app.seed_user("cod_buyer").await;
    let product = app.seed_product("Kettle", 1000, 5).await;

    let order = place_cod(&app, &user.token, product.id, 1).await;
    assert_eq!(order["order_status"], "pending");
    assert_eq!(order["payment_status"], "pending");
    let id = order["id"].as_str().unwrap();

    let res = set_status(&app, &admin, id, "Shipped").await;
    let shipped = expect_status(res, StatusCode::OK).await;
    assert_eq!(shipped["data"]["order_status"], "shipped");
    assert_eq!(shipped["data"]["payment_status"], "pending");

    let res = set_status(&app, &admin, id, "delivered").await;
    let delivered = expect_status(res, StatusCode::OK).await;
    assert_eq!(delivered["data"]["order_status"], "delivered");
    assert_eq!(delivered["data"]["payment_status"], "paid");

    let res = app.get("/api/admin/sales-report", Some(&admin)).await;
    let report = expect_status(res, StatusCode::OK).await;
    assert_eq!(report["data"]["order_count"], 1);
    assert_eq!(money(&report["data"]["net"]), Decimal::from(1000));
}

#[tokio::test]
async fn approved_return_refunds_wallet_and_restocks() {
    let app = TestApp::new().await;
    let admin = app.seed_admin().await;
    let user = app.seed_user("returner").await;
    let product = app.seed_product("Blender", 1000, 5).await;

    let order = place_cod(&app, &user.token, product.id, 2).await;
    let id = order["id"].as_str().unwrap().to_string();
    assert_eq!(app.product(product.id).await.stock, 3);

    // Returns are only possible once delivered.
    let res = app
        .patch(&format!("/api/user/orders/{id}/return"), None, Some(&user.token))
        .await;
    expect_status(res, StatusCode::BAD_REQUEST).await;

    expect_status(set_status(&app, &admin, &id, "delivered").await, StatusCode::OK).await;
    let res = app
        .patch(&format!("/api/user/orders/{id}/return"), None, Some(&user.token))
        .await;
    let requested = expect_status(res, StatusCode::OK).await;
    assert_eq!(requested["data"]["order_status"], "return_requested");

    let res = set_status(&app, &admin, &id, "returned").await;
    let returned = expect_status(res, StatusCode::OK).await;
    assert_eq!(returned["data"]["order_status"], "returned");
    assert_eq!(app.product(product.id).await.stock, 5);

    let res = app.get("/api/user/wallet", Some(&user.token)).await;
    let wallet = expect_status(res, StatusCode::OK).await["data"].clone();
    assert_eq!(money(&wallet["balance"]), Decimal::from(2000));
    let transactions = wallet["transactions"].as_array().unwrap();
    assert_eq!(transactions.len(), 1);
    assert_eq!(transactions[0]["transaction_type"], "refund");
    assert_eq!(transactions[0]["order_id"], id.as_str());
    assert_eq!(money(&transactions[0]["amount"]), Decimal::from(2000));

    // A returned order is final.
    let res = set_status(&app, &admin, &id, "returned").await;
    expect_status(res, StatusCode::BAD_REQUEST).await;
    let res = app.get("/api/user/wallet", Some(&user.token)).await;
    let wallet = expect_status(res, StatusCode::OK).await["data"].clone();
    assert_eq!(wallet["transactions"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn cancelling_unpaid_order_restocks_without_refund() {
    let app = TestApp::new().await;
    let user = app.seed_user("canceller").await;
    let product = app.seed_product("Toaster", 1000, 4).await;

    let order = place_cod(&app, &user.token, product.id, 3).await;
    let id = order["id"].as_str().unwrap().to_string();
    assert_eq!(app.product(product.id).await.stock, 1);

    let res = app
        .patch(&format!("/api/user/orders/{id}/cancel"), None, Some(&user.token))
        .await;
    let cancelled = expect_status(res, StatusCode::OK).await;
    assert_eq!(cancelled["data"]["order_status"], "cancelled");
    assert_eq!(app.product(product.id).await.stock, 4);

    let res = app.get("/api/user/wallet", Some(&user.token)).await;
    let wallet = expect_status(res, StatusCode::OK).await["data"].clone();
    assert_eq!(money(&wallet["balance"]), Decimal::ZERO);
    assert!(wallet["transactions"].as_array().unwrap().is_empty());

    let res = app
        .patch(&format!("/api/user/orders/{id}/cancel"), None, Some(&user.token))
        .await;
    expect_status(res, StatusCode::BAD_REQUEST).await;
    assert_eq!(app.product(product.id).await.stock, 4);
}

#[tokio::test]
async fn cancelling_paid_online_order_refunds_to_wallet() {
    let app = TestApp::new().await;
    let user = app.seed_user("online_cancel").await;
    let product = app.seed_product("Mixer", 1000, 4).await;

    let res = app
        .post(
            "/api/user/payments/razorpay/order",
            json!({
                "items": [{ "product_id": product.id, "quantity": 1 }],
                "shipping_address": address_json(),
            }),
            Some(&user.token),
        )
        .await;
    let checkout = expect_status(res, StatusCode::CREATED).await["data"].clone();
    let gateway_order_id = checkout["gateway_order"]["id"].as_str().unwrap().to_string();
    let res = app
        .post(
            "/api/user/payments/razorpay/verify",
            json!({
                "razorpay_order_id": gateway_order_id,
                "razorpay_payment_id": "pay_c1",
                "razorpay_signature": app.sign(&gateway_order_id, "pay_c1"),
                "order_details": checkout["order_details"],
            }),
            Some(&user.token),
        )
        .await;
    let order = expect_status(res, StatusCode::CREATED).await["data"].clone();
    let id = order["id"].as_str().unwrap().to_string();
    assert_eq!(app.product(product.id).await.stock, 3);

    let res = app
        .patch(&format!("/api/user/orders/{id}/cancel"), None, Some(&user.token))
        .await;
    expect_status(res, StatusCode::OK).await;
    assert_eq!(app.product(product.id).await.stock, 4);

    let res = app.get("/api/user/wallet", Some(&user.token)).await;
    let wallet = expect_status(res, StatusCode::OK).await["data"].clone();
    assert_eq!(money(&wallet["balance"]), Decimal::from(1000));
}

#[tokio::test]
async fn unpaid_online_order_is_never_fulfilled_or_refunded() {
    let app = TestApp::new().await;
    let admin = app.seed_admin().await;
    let user = app.seed_user("unpaid_buyer").await;
    let product = app.seed_product("Heater", 1000, 10).await;

    let res = app
        .post(
            "/api/user/payments/razorpay/order",
            json!({
                "items": [{ "product_id": product.id, "quantity": 1 }],
                "shipping_address": address_json(),
            }),
            Some(&user.token),
        )
        .await;
    let checkout = expect_status(res, StatusCode::CREATED).await["data"].clone();
    let gateway_order_id = checkout["gateway_order"]["id"].as_str().unwrap().to_string();
    let res = app
        .post(
            "/api/user/payments/razorpay/failed",
            json!({ "razorpay_order_id": gateway_order_id }),
            Some(&user.token),
        )
        .await;
    let order = expect_status(res, StatusCode::CREATED).await["data"].clone();
    let id = order["id"].as_str().unwrap().to_string();

    for target in ["confirmed", "shipped", "delivered"] {
        let res = set_status(&app, &admin, &id, target).await;
        expect_status(res, StatusCode::BAD_REQUEST).await;
    }
    let res = app
        .patch(&format!("/api/user/orders/{id}/return"), None, Some(&user.token))
        .await;
    expect_status(res, StatusCode::BAD_REQUEST).await;

    let res = set_status(&app, &admin, &id, "cancelled").await;
    let cancelled = expect_status(res, StatusCode::OK).await;
    assert_eq!(cancelled["data"]["order_status"], "cancelled");
    assert_eq!(cancelled["data"]["payment_status"], "failed");
    assert_eq!(app.product(product.id).await.stock, 10);

    let res = app.get("/api/user/wallet", Some(&user.token)).await;
    let wallet = expect_status(res, StatusCode::OK).await["data"].clone();
    assert_eq!(money(&wallet["balance"]), Decimal::ZERO);
    assert!(wallet["transactions"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn illegal_transitions_are_rejected() {
    let app = TestApp::new().await;
    let admin = app.seed_admin().await;
    let user = app.seed_user("strict").await;
    let product = app.seed_product("Iron", 1000, 4).await;
    let order = place_cod(&app, &user.token, product.id, 1).await;
    let id = order["id"].as_str().unwrap().to_string();

    expect_status(set_status(&app, &admin, &id, "shipped").await, StatusCode::OK).await;

    for target in ["pending", "confirmed", "cancelled", "returned", "return_requested"] {
        let res = set_status(&app, &admin, &id, target).await;
        expect_status(res, StatusCode::BAD_REQUEST).await;
    }
    let res = set_status(&app, &admin, &id, "lost").await;
    let body = expect_status(res, StatusCode::BAD_REQUEST).await;
    assert_eq!(body["message"], "Invalid order status 'lost'");

    let res = app
        .patch(&format!("/api/user/orders/{id}/cancel"), None, Some(&user.token))
        .await;
    expect_status(res, StatusCode::BAD_REQUEST).await;

    let res = app.get(&format!("/api/admin/orders/{id}"), Some(&admin)).await;
    let current = expect_status(res, StatusCode::OK).await;
    assert_eq!(current["data"]["order_status"], "shipped");
}

#[tokio::test]
async fn orders_are_private_to_their_owner() {
    let app = TestApp::new().await;
    let owner = app.seed_user("order_owner").await;
    let other = app.seed_user("nosy_user").await;
    let product = app.seed_product("Lamp", 1000, 4).await;
    let order = place_cod(&app, &owner.token, product.id, 1).await;
    let id = order["id"].as_str().unwrap();
    assert!(order["order_number"].as_str().unwrap().ends_with("-001"));

    let res = app
        .get(&format!("/api/user/orders/{id}"), Some(&other.token))
        .await;
    expect_status(res, StatusCode::FORBIDDEN).await;

    let res = app.get("/api/user/orders", Some(&owner.token)).await;
    let list = expect_status(res, StatusCode::OK).await;
    assert_eq!(list["data"]["total"], 1);
    let res = app.get("/api/user/orders", Some(&other.token)).await;
    let list = expect_status(res, StatusCode::OK).await;
    assert_eq!(list["data"]["total"], 0);
}

//! Checkout, payment verification and order lifecycle.
//!
//! Every path that moves money or stock runs in one database transaction:
//! the order row, its items, the conditional stock decrement, the coupon
//! counters, the cart clear and any wallet refund commit or roll back
//! together. Payment signatures are checked before the transaction opens.

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection,
    DatabaseTransaction, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set, SqlErr,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, sync::Arc};
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::{
    entities::{
        cart, cart_item, order,
        order::{OrderStatus, PaymentMethod, PaymentStatus, StatusActor},
        order_item,
        pending_checkout::{self, CheckoutPurpose, CheckoutStatus},
        product,
    },
    errors::ServiceError,
    integrations::{GatewayOrder, PaymentGateway, PaymentSignatureVerifier},
    services::{
        cart::clear_cart_for,
        coupons::{calculate_discount, check_eligibility, commit_usage, find_by_code, user_redemptions},
        pricing::{load_with_parents, subtotals, to_minor_units, PricedLine},
        users::{owned_address, AddressInput},
        wallet::credit_refund,
    },
    PaginatedResponse,
};

const MAX_ORDER_NUMBER_ATTEMPTS: u64 = 5;

/// `ORD-YYYYMMDD-NNN`, the sequence padded to at least three digits.
pub fn format_order_number(date: NaiveDate, sequence: u64) -> String {
    format!("ORD-{}-{:03}", date.format("%Y%m%d"), sequence)
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct CheckoutItem {
    pub product_id: Uuid,
    #[validate(range(min = 1, max = 100, message = "Quantity must be between 1 and 100"))]
    pub quantity: i32,
}

/// Either a saved address id or an inline address
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ShippingChoice {
    pub address_id: Option<Uuid>,
    pub shipping_address: Option<AddressInput>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PlaceOrderRequest {
    /// Empty means "check out the cart"
    #[serde(default)]
    pub items: Vec<CheckoutItem>,
    #[serde(flatten)]
    pub shipping: ShippingChoice,
    pub payment_method: PaymentMethod,
    /// Client-side total; rejected when it disagrees with the server price
    pub total_amount: Option<Decimal>,
    pub coupon_code: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RazorpayOrderRequest {
    #[serde(default)]
    pub items: Vec<CheckoutItem>,
    #[serde(flatten)]
    pub shipping: ShippingChoice,
    pub coupon_code: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct VerifyPaymentRequest {
    pub razorpay_order_id: Option<String>,
    pub razorpay_payment_id: Option<String>,
    pub razorpay_signature: Option<String>,
    pub order_details: Option<CheckoutSnapshot>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RetryVerifyRequest {
    pub razorpay_order_id: Option<String>,
    pub razorpay_payment_id: Option<String>,
    pub razorpay_signature: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FailedPaymentRequest {
    pub razorpay_order_id: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UpdateOrderStatusRequest {
    pub status: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderListQuery {
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct AppliedCoupon {
    pub coupon_id: Uuid,
    pub code: String,
}

/// Priced checkout frozen before payment and stored with the gateway order
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CheckoutSnapshot {
    pub items: Vec<PricedLine>,
    pub shipping_address: AddressInput,
    pub subtotal_before_offer: Decimal,
    pub subtotal_after_offer: Decimal,
    pub coupon: Option<AppliedCoupon>,
    pub coupon_discount: Decimal,
    pub total_amount: Decimal,
}

impl CheckoutSnapshot {
    /// Same items, quantities and amounts; the address is not compared.
    fn agrees_with(&self, other: &CheckoutSnapshot) -> bool {
        let key = |lines: &[PricedLine]| -> Vec<(Uuid, i32, Decimal)> {
            let mut v: Vec<_> = lines
                .iter()
                .map(|l| (l.product_id, l.quantity, l.line_total))
                .collect();
            v.sort_by_key(|(id, _, _)| *id);
            v
        };
        self.subtotal_before_offer == other.subtotal_before_offer
            && self.subtotal_after_offer == other.subtotal_after_offer
            && self.coupon_discount == other.coupon_discount
            && self.total_amount == other.total_amount
            && self.coupon.as_ref().map(|c| c.coupon_id) == other.coupon.as_ref().map(|c| c.coupon_id)
            && key(&self.items) == key(&other.items)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RazorpayCheckout {
    pub key_id: String,
    pub gateway_order: GatewayOrder,
    pub order_details: CheckoutSnapshot,
}

#[derive(Debug, Clone, Serialize)]
pub struct RetryCheckout {
    pub key_id: String,
    pub order_id: Uuid,
    pub gateway_order: GatewayOrder,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: order::Model,
    pub items: Vec<order_item::Model>,
}

fn parse_status(value: &str) -> Result<OrderStatus, ServiceError> {
    serde_json::from_value(serde_json::Value::String(value.trim().to_lowercase()))
        .map_err(|_| ServiceError::BadRequest(format!("Invalid order status '{}'", value)))
}

/// Razorpay orders reach stock only once paid.
fn stock_committed(order: &order::Model) -> bool {
    order.payment_method != PaymentMethod::Razorpay || order.payment_status == PaymentStatus::Paid
}

/// Folds duplicate lines into one per product.
fn merge_items(items: Vec<CheckoutItem>) -> Result<Vec<CheckoutItem>, ServiceError> {
    let mut merged: BTreeMap<Uuid, i32> = BTreeMap::new();
    for item in items {
        item.validate()?;
        *merged.entry(item.product_id).or_insert(0) += item.quantity;
    }
    Ok(merged
        .into_iter()
        .map(|(product_id, quantity)| CheckoutItem {
            product_id,
            quantity,
        })
        .collect())
}

async fn cart_items<C: ConnectionTrait>(conn: &C, user_id: Uuid) -> Result<Vec<CheckoutItem>, ServiceError> {
    let Some(cart) = cart::Entity::find()
        .filter(cart::Column::UserId.eq(user_id))
        .one(conn)
        .await?
    else {
        return Ok(Vec::new());
    };
    Ok(cart_item::Entity::find()
        .filter(cart_item::Column::CartId.eq(cart.id))
        .all(conn)
        .await?
        .into_iter()
        .map(|line| CheckoutItem {
            product_id: line.product_id,
            quantity: line.quantity,
        })
        .collect())
}

async fn resolve_address<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
    choice: ShippingChoice,
) -> Result<AddressInput, ServiceError> {
    match (choice.address_id, choice.shipping_address) {
        (Some(id), _) => Ok(AddressInput::from(&owned_address(conn, user_id, id).await?)),
        (None, Some(inline)) => {
            inline.validate()?;
            Ok(inline)
        }
        (None, None) => Err(ServiceError::ValidationError(
            "Shipping address is required".into(),
        )),
    }
}

/// Prices `items` against current products and offers, then applies the
/// coupon. Stock is checked here so the user-facing error is precise; the
/// authoritative check is the conditional decrement.
async fn price_checkout<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
    items: Vec<CheckoutItem>,
    coupon_code: Option<&str>,
    shipping_address: AddressInput,
) -> Result<CheckoutSnapshot, ServiceError> {
    let items = if items.is_empty() {
        cart_items(conn, user_id).await?
    } else {
        items
    };
    let items = merge_items(items)?;
    if items.is_empty() {
        return Err(ServiceError::BadRequest("Your cart is empty".into()));
    }

    let ids: Vec<Uuid> = items.iter().map(|i| i.product_id).collect();
    let products = load_with_parents(conn, &ids).await?;
    let mut lines = Vec::with_capacity(items.len());
    for item in &items {
        let entry = products
            .get(&item.product_id)
            .ok_or_else(|| ServiceError::NotFound("Product not found".into()))?;
        if !entry.is_purchasable() {
            return Err(ServiceError::BadRequest(format!(
                "{} is currently unavailable",
                entry.product.name
            )));
        }
        if entry.product.stock < item.quantity {
            return Err(ServiceError::BadRequest(format!(
                "Insufficient stock for {}. Only {} left",
                entry.product.name, entry.product.stock
            )));
        }
        lines.push(PricedLine::new(entry, item.quantity));
    }
    let totals = subtotals(&lines);

    let (coupon, coupon_discount) = match coupon_code.map(str::trim).filter(|c| !c.is_empty()) {
        Some(code) => {
            let found = find_by_code(conn, code).await?;
            let used = user_redemptions(conn, user_id, found.id)
                .await?
                .map(|r| r.count)
                .unwrap_or(0);
            check_eligibility(&found, Utc::now(), totals.after_offer, used)?;
            let discount = calculate_discount(&found, totals.after_offer);
            (
                Some(AppliedCoupon {
                    coupon_id: found.id,
                    code: found.code,
                }),
                discount,
            )
        }
        None => (None, Decimal::ZERO),
    };

    Ok(CheckoutSnapshot {
        items: lines,
        shipping_address,
        subtotal_before_offer: totals.before_offer,
        subtotal_after_offer: totals.after_offer,
        coupon,
        coupon_discount,
        total_amount: totals.after_offer - coupon_discount,
    })
}

/// `stock -= quantity` for each line, only where enough stock remains.
pub async fn decrement_stock<C: ConnectionTrait>(
    conn: &C,
    lines: &[(Uuid, String, i32)],
) -> Result<(), ServiceError> {
    for (product_id, name, quantity) in lines {
        let result = product::Entity::update_many()
            .col_expr(
                product::Column::Stock,
                Expr::col(product::Column::Stock).sub(*quantity),
            )
            .col_expr(product::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(product::Column::Id.eq(*product_id))
            .filter(product::Column::Stock.gte(*quantity))
            .exec(conn)
            .await?;
        if result.rows_affected == 0 {
            metrics::counter!("storefront.stock.conflicts", 1);
            warn!(%product_id, quantity, "stock decrement rejected");
            return Err(ServiceError::BadRequest(format!(
                "Insufficient stock for {}",
                name
            )));
        }
    }
    Ok(())
}

pub async fn restock<C: ConnectionTrait>(
    conn: &C,
    items: &[order_item::Model],
) -> Result<(), ServiceError> {
    for item in items {
        product::Entity::update_many()
            .col_expr(
                product::Column::Stock,
                Expr::col(product::Column::Stock).add(item.quantity),
            )
            .col_expr(product::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(product::Column::Id.eq(item.product_id))
            .exec(conn)
            .await?;
    }
    Ok(())
}

fn snapshot_lines(snapshot: &CheckoutSnapshot) -> Vec<(Uuid, String, i32)> {
    snapshot
        .items
        .iter()
        .map(|l| (l.product_id, l.product_name.clone(), l.quantity))
        .collect()
}

fn item_lines(items: &[order_item::Model]) -> Vec<(Uuid, String, i32)> {
    items
        .iter()
        .map(|i| (i.product_id, i.product_name.clone(), i.quantity))
        .collect()
}

struct NewOrder<'a> {
    user_id: Uuid,
    snapshot: &'a CheckoutSnapshot,
    payment_method: PaymentMethod,
    payment_status: PaymentStatus,
    order_status: OrderStatus,
    gateway_order_id: Option<String>,
    gateway_payment_id: Option<String>,
}

/// Inserts the order and its items. The order number is count-based; a
/// collision on the unique index retries with the next suffix inside a
/// savepoint.
async fn insert_order(
    txn: &DatabaseTransaction,
    new: NewOrder<'_>,
) -> Result<(order::Model, Vec<order_item::Model>), ServiceError> {
    let now = Utc::now();
    let existing = order::Entity::find().count(txn).await?;
    let address = serde_json::to_value(&new.snapshot.shipping_address)?;

    let mut created = None;
    for attempt in 0..MAX_ORDER_NUMBER_ATTEMPTS {
        let number = format_order_number(now.date_naive(), existing + 1 + attempt);
        let model = order::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_number: Set(number.clone()),
            user_id: Set(new.user_id),
            shipping_address: Set(address.clone()),
            payment_method: Set(new.payment_method),
            payment_status: Set(new.payment_status),
            order_status: Set(new.order_status),
            subtotal_before_offer: Set(new.snapshot.subtotal_before_offer),
            subtotal_after_offer: Set(new.snapshot.subtotal_after_offer),
            coupon_id: Set(new.snapshot.coupon.as_ref().map(|c| c.coupon_id)),
            coupon_code: Set(new.snapshot.coupon.as_ref().map(|c| c.code.clone())),
            coupon_discount: Set(new.snapshot.coupon_discount),
            total_amount: Set(new.snapshot.total_amount),
            gateway_order_id: Set(new.gateway_order_id.clone()),
            gateway_payment_id: Set(new.gateway_payment_id.clone()),
            order_date: Set(now),
            updated_at: Set(now),
        };

        let savepoint = txn.begin().await?;
        match model.insert(&savepoint).await {
            Ok(order) => {
                savepoint.commit().await?;
                created = Some(order);
                break;
            }
            Err(e) if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
                savepoint.rollback().await?;
                warn!(order_number = %number, "order number taken, retrying");
            }
            Err(e) => return Err(e.into()),
        }
    }
    let order = created.ok_or_else(|| {
        ServiceError::ServiceUnavailable("Could not allocate an order number, please retry".into())
    })?;

    let mut items = Vec::with_capacity(new.snapshot.items.len());
    for line in &new.snapshot.items {
        let item = order_item::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order.id),
            product_id: Set(line.product_id),
            product_name: Set(line.product_name.clone()),
            quantity: Set(line.quantity),
            unit_price: Set(line.unit_price),
            offer_price: Set(line.offer_price),
            offer_percent: Set(line.offer_percent),
            line_total: Set(line.line_total),
        }
        .insert(txn)
        .await?;
        items.push(item);
    }

    metrics::counter!("storefront.orders.created", 1);
    Ok((order, items))
}

/// Moves a pending checkout out of `open`; zero rows means it was already used.
async fn close_checkout<C: ConnectionTrait>(
    conn: &C,
    checkout_id: Uuid,
    status: CheckoutStatus,
) -> Result<(), ServiceError> {
    let result = pending_checkout::Entity::update_many()
        .col_expr(pending_checkout::Column::Status, Expr::value(status))
        .col_expr(pending_checkout::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(pending_checkout::Column::Id.eq(checkout_id))
        .filter(pending_checkout::Column::Status.eq(CheckoutStatus::Open))
        .exec(conn)
        .await?;
    if result.rows_affected == 0 {
        return Err(ServiceError::Conflict(
            "This payment has already been processed".into(),
        ));
    }
    Ok(())
}

fn required(value: Option<String>) -> Result<String, ServiceError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ServiceError::BadRequest("Missing payment verification details".into()))
}

#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    gateway: Arc<dyn PaymentGateway>,
    verifier: PaymentSignatureVerifier,
    currency: String,
}

impl OrderService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        gateway: Arc<dyn PaymentGateway>,
        verifier: PaymentSignatureVerifier,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            db,
            gateway,
            verifier,
            currency: currency.into(),
        }
    }

    fn check_signature(&self, order_id: &str, payment_id: &str, signature: &str) -> Result<(), ServiceError> {
        if self.verifier.verify(order_id, payment_id, signature) {
            return Ok(());
        }
        metrics::counter!("storefront.payments.signature_rejected", 1);
        warn!(gateway_order_id = order_id, "payment signature mismatch");
        Err(ServiceError::BadRequest("Invalid payment signature".into()))
    }

    async fn owned_checkout(
        &self,
        user_id: Uuid,
        gateway_order_id: &str,
        purpose: CheckoutPurpose,
    ) -> Result<pending_checkout::Model, ServiceError> {
        let checkout = pending_checkout::Entity::find()
            .filter(pending_checkout::Column::GatewayOrderId.eq(gateway_order_id))
            .one(&*self.db)
            .await?
            .filter(|c| c.purpose == purpose)
            .ok_or_else(|| ServiceError::NotFound("Checkout not found".into()))?;
        if checkout.user_id != user_id {
            return Err(ServiceError::Forbidden(
                "Checkout belongs to another account".into(),
            ));
        }
        if checkout.status != CheckoutStatus::Open {
            return Err(ServiceError::Conflict(
                "This payment has already been processed".into(),
            ));
        }
        Ok(checkout)
    }

    async fn owned_order<C: ConnectionTrait>(
        &self,
        conn: &C,
        user_id: Uuid,
        order_id: Uuid,
    ) -> Result<order::Model, ServiceError> {
        let found = order::Entity::find_by_id(order_id)
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Order not found".into()))?;
        if found.user_id != user_id {
            return Err(ServiceError::Forbidden("Order belongs to another account".into()));
        }
        Ok(found)
    }

    async fn items_of<C: ConnectionTrait>(conn: &C, order_id: Uuid) -> Result<Vec<order_item::Model>, ServiceError> {
        Ok(order_item::Entity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(conn)
            .await?)
    }

    /// Cash-on-delivery (or card/UPI collected offline) checkout. Stock is
    /// taken and the cart cleared immediately.
    #[instrument(skip(self, request), fields(%user_id))]
    pub async fn place_cod_order(
        &self,
        user_id: Uuid,
        request: PlaceOrderRequest,
    ) -> Result<OrderDetail, ServiceError> {
        if request.payment_method == PaymentMethod::Razorpay {
            return Err(ServiceError::BadRequest(
                "Use the Razorpay checkout for online payments".into(),
            ));
        }

        let txn = self.db.begin().await?;
        let address = resolve_address(&txn, user_id, request.shipping).await?;
        let snapshot = price_checkout(
            &txn,
            user_id,
            request.items,
            request.coupon_code.as_deref(),
            address,
        )
        .await?;
        if let Some(claimed) = request.total_amount {
            if claimed != snapshot.total_amount {
                warn!(%claimed, actual = %snapshot.total_amount, "client total disagrees with server price");
                return Err(ServiceError::BadRequest(
                    "Order total has changed. Please review your cart".into(),
                ));
            }
        }

        let (order, items) = insert_order(
            &txn,
            NewOrder {
                user_id,
                snapshot: &snapshot,
                payment_method: request.payment_method,
                payment_status: PaymentStatus::Pending,
                order_status: OrderStatus::Pending,
                gateway_order_id: None,
                gateway_payment_id: None,
            },
        )
        .await?;
        decrement_stock(&txn, &snapshot_lines(&snapshot)).await?;
        if let Some(coupon) = &snapshot.coupon {
            commit_usage(&txn, coupon.coupon_id, user_id).await?;
        }
        clear_cart_for(&txn, user_id).await?;
        txn.commit().await?;

        info!(order_id = %order.id, order_number = %order.order_number, total = %order.total_amount, "order placed");
        Ok(OrderDetail { order, items })
    }

    /// Prices the checkout, opens a gateway order for it and stores the
    /// snapshot server-side. Nothing is reserved yet.
    #[instrument(skip(self, request), fields(%user_id))]
    pub async fn create_razorpay_order(
        &self,
        user_id: Uuid,
        request: RazorpayOrderRequest,
    ) -> Result<RazorpayCheckout, ServiceError> {
        let address = resolve_address(&*self.db, user_id, request.shipping).await?;
        let snapshot = price_checkout(
            &*self.db,
            user_id,
            request.items,
            request.coupon_code.as_deref(),
            address,
        )
        .await?;
        let amount_minor = to_minor_units(snapshot.total_amount)?;
        if amount_minor <= 0 {
            return Err(ServiceError::BadRequest(
                "Order total must be greater than zero".into(),
            ));
        }

        let receipt = format!("rcpt_{}", &Uuid::new_v4().simple().to_string()[..12]);
        let gateway_order = self
            .gateway
            .create_order(amount_minor, &self.currency, &receipt)
            .await?;

        let now = Utc::now();
        pending_checkout::ActiveModel {
            id: Set(Uuid::new_v4()),
            gateway_order_id: Set(gateway_order.id.clone()),
            user_id: Set(user_id),
            purpose: Set(CheckoutPurpose::Checkout),
            order_id: Set(None),
            snapshot: Set(serde_json::to_value(&snapshot)?),
            amount_minor: Set(amount_minor),
            status: Set(CheckoutStatus::Open),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await?;

        info!(gateway_order_id = %gateway_order.id, amount_minor, "razorpay order created");
        Ok(RazorpayCheckout {
            key_id: self.gateway.public_key().to_string(),
            gateway_order,
            order_details: snapshot,
        })
    }

    /// Verifies the gateway signature, then commits the stored snapshot as a
    /// paid, confirmed order.
    #[instrument(skip(self, request), fields(%user_id))]
    pub async fn verify_razorpay_payment(
        &self,
        user_id: Uuid,
        request: VerifyPaymentRequest,
    ) -> Result<OrderDetail, ServiceError> {
        let gateway_order_id = required(request.razorpay_order_id)?;
        let payment_id = required(request.razorpay_payment_id)?;
        let signature = required(request.razorpay_signature)?;
        let echoed = request
            .order_details
            .ok_or_else(|| ServiceError::BadRequest("Missing order details".into()))?;

        self.check_signature(&gateway_order_id, &payment_id, &signature)?;

        let checkout = self
            .owned_checkout(user_id, &gateway_order_id, CheckoutPurpose::Checkout)
            .await?;
        let snapshot: CheckoutSnapshot = serde_json::from_value(checkout.snapshot.clone())?;
        if !snapshot.agrees_with(&echoed) {
            warn!(%gateway_order_id, "echoed order details differ from stored checkout");
            return Err(ServiceError::BadRequest(
                "Order details do not match the checkout".into(),
            ));
        }

        let txn = self.db.begin().await?;
        close_checkout(&txn, checkout.id, CheckoutStatus::Paid).await?;
        if let Some(coupon) = &snapshot.coupon {
            commit_usage(&txn, coupon.coupon_id, user_id).await?;
        }
        let (order, items) = insert_order(
            &txn,
            NewOrder {
                user_id,
                snapshot: &snapshot,
                payment_method: PaymentMethod::Razorpay,
                payment_status: PaymentStatus::Paid,
                order_status: OrderStatus::Confirmed,
                gateway_order_id: Some(gateway_order_id),
                gateway_payment_id: Some(payment_id),
            },
        )
        .await?;
        decrement_stock(&txn, &snapshot_lines(&snapshot)).await?;
        clear_cart_for(&txn, user_id).await?;
        txn.commit().await?;

        metrics::counter!("storefront.payments.verified", 1);
        info!(order_id = %order.id, order_number = %order.order_number, "razorpay payment verified");
        Ok(OrderDetail { order, items })
    }

    /// Records an order for a checkout whose payment failed so it can be
    /// retried later. Stock and coupon counters are untouched.
    #[instrument(skip(self, request), fields(%user_id))]
    pub async fn record_failed_payment(
        &self,
        user_id: Uuid,
        request: FailedPaymentRequest,
    ) -> Result<OrderDetail, ServiceError> {
        let checkout = self
            .owned_checkout(user_id, request.razorpay_order_id.trim(), CheckoutPurpose::Checkout)
            .await?;
        let snapshot: CheckoutSnapshot = serde_json::from_value(checkout.snapshot.clone())?;

        let txn = self.db.begin().await?;
        close_checkout(&txn, checkout.id, CheckoutStatus::Failed).await?;
        let (order, items) = insert_order(
            &txn,
            NewOrder {
                user_id,
                snapshot: &snapshot,
                payment_method: PaymentMethod::Razorpay,
                payment_status: PaymentStatus::Failed,
                order_status: OrderStatus::Pending,
                gateway_order_id: Some(checkout.gateway_order_id.clone()),
                gateway_payment_id: None,
            },
        )
        .await?;
        txn.commit().await?;

        info!(order_id = %order.id, "failed payment recorded");
        Ok(OrderDetail { order, items })
    }

    /// Opens a fresh gateway order for an unpaid order's stored total.
    #[instrument(skip(self), fields(%user_id, %order_id))]
    pub async fn create_retry_payment(
        &self,
        user_id: Uuid,
        order_id: Uuid,
    ) -> Result<RetryCheckout, ServiceError> {
        let order = self.owned_order(&*self.db, user_id, order_id).await?;
        if order.payment_status == PaymentStatus::Paid {
            return Err(ServiceError::BadRequest("Order is already paid".into()));
        }
        if order.payment_method != PaymentMethod::Razorpay || order.order_status != OrderStatus::Pending {
            return Err(ServiceError::BadRequest(
                "Only pending online orders can be paid again".into(),
            ));
        }

        let items = Self::items_of(&*self.db, order.id).await?;
        let ids: Vec<Uuid> = items.iter().map(|i| i.product_id).collect();
        let products = load_with_parents(&*self.db, &ids).await?;
        for item in &items {
            let stock = products
                .get(&item.product_id)
                .map(|p| p.product.stock)
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("{} is no longer available", item.product_name))
                })?;
            if stock < item.quantity {
                return Err(ServiceError::BadRequest(format!(
                    "Insufficient stock for {}. Only {} left",
                    item.product_name, stock
                )));
            }
        }

        let amount_minor = to_minor_units(order.total_amount)?;
        let receipt = format!("retry_{}", &order.order_number);
        let gateway_order = self
            .gateway
            .create_order(amount_minor, &self.currency, &receipt)
            .await?;

        let now = Utc::now();
        pending_checkout::ActiveModel {
            id: Set(Uuid::new_v4()),
            gateway_order_id: Set(gateway_order.id.clone()),
            user_id: Set(user_id),
            purpose: Set(CheckoutPurpose::Retry),
            order_id: Set(Some(order.id)),
            snapshot: Set(serde_json::json!({
                "order_id": order.id,
                "order_number": order.order_number,
                "total_amount": order.total_amount,
            })),
            amount_minor: Set(amount_minor),
            status: Set(CheckoutStatus::Open),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await?;

        info!(gateway_order_id = %gateway_order.id, "retry payment opened");
        Ok(RetryCheckout {
            key_id: self.gateway.public_key().to_string(),
            order_id: order.id,
            gateway_order,
        })
    }

    /// Marks the order paid and confirmed, takes stock and commits the
    /// order's coupon.
    #[instrument(skip(self, request), fields(%user_id, %order_id))]
    pub async fn verify_retry_payment(
        &self,
        user_id: Uuid,
        order_id: Uuid,
        request: RetryVerifyRequest,
    ) -> Result<OrderDetail, ServiceError> {
        let gateway_order_id = required(request.razorpay_order_id)?;
        let payment_id = required(request.razorpay_payment_id)?;
        let signature = required(request.razorpay_signature)?;
        self.check_signature(&gateway_order_id, &payment_id, &signature)?;

        let checkout = self
            .owned_checkout(user_id, &gateway_order_id, CheckoutPurpose::Retry)
            .await?;
        if checkout.order_id != Some(order_id) {
            return Err(ServiceError::BadRequest(
                "Payment does not belong to this order".into(),
            ));
        }

        let txn = self.db.begin().await?;
        let order = self.owned_order(&txn, user_id, order_id).await?;
        if order.payment_status == PaymentStatus::Paid {
            return Err(ServiceError::BadRequest("Order is already paid".into()));
        }
        close_checkout(&txn, checkout.id, CheckoutStatus::Paid).await?;

        let now = Utc::now();
        let updated = order::Entity::update_many()
            .col_expr(order::Column::PaymentStatus, Expr::value(PaymentStatus::Paid))
            .col_expr(order::Column::OrderStatus, Expr::value(OrderStatus::Confirmed))
            .col_expr(order::Column::GatewayOrderId, Expr::value(gateway_order_id))
            .col_expr(order::Column::GatewayPaymentId, Expr::value(payment_id))
            .col_expr(order::Column::UpdatedAt, Expr::value(now))
            .filter(order::Column::Id.eq(order.id))
            .filter(order::Column::PaymentStatus.ne(PaymentStatus::Paid))
            .filter(order::Column::OrderStatus.eq(OrderStatus::Pending))
            .exec(&txn)
            .await?;
        if updated.rows_affected == 0 {
            return Err(ServiceError::Conflict("Order changed, please reload".into()));
        }

        let items = Self::items_of(&txn, order.id).await?;
        decrement_stock(&txn, &item_lines(&items)).await?;
        if let Some(coupon_id) = order.coupon_id {
            commit_usage(&txn, coupon_id, user_id).await?;
        }
        let order = order::Entity::find_by_id(order.id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Order not found".into()))?;
        txn.commit().await?;

        metrics::counter!("storefront.payments.verified", 1);
        info!(order_id = %order.id, "retry payment verified");
        Ok(OrderDetail { order, items })
    }

    #[instrument(skip(self))]
    pub async fn list_user_orders(
        &self,
        user_id: Uuid,
        page: u64,
        limit: u64,
    ) -> Result<PaginatedResponse<order::Model>, ServiceError> {
        let paginator = order::Entity::find()
            .filter(order::Column::UserId.eq(user_id))
            .order_by_desc(order::Column::OrderDate)
            .paginate(&*self.db, limit);
        let total = paginator.num_items().await?;
        let items = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok(PaginatedResponse::new(items, total, page, limit))
    }

    pub async fn get_user_order(&self, user_id: Uuid, order_id: Uuid) -> Result<OrderDetail, ServiceError> {
        let order = self.owned_order(&*self.db, user_id, order_id).await?;
        let items = Self::items_of(&*self.db, order.id).await?;
        Ok(OrderDetail { order, items })
    }

    /// Applies a status change and its side effects on `txn`:
    /// cancelling or returning restocks what the order took and refunds a
    /// paid order to the wallet; delivering a COD order marks it paid.
    /// Unpaid Razorpay orders stay pending until a retry succeeds.
    async fn apply_transition(
        txn: &DatabaseTransaction,
        current: order::Model,
        next: OrderStatus,
        actor: StatusActor,
    ) -> Result<order::Model, ServiceError> {
        if !current.order_status.can_transition_to(next, actor) {
            return Err(ServiceError::BadRequest(format!(
                "Cannot change order status from {} to {}",
                current.order_status.as_str(),
                next.as_str()
            )));
        }
        let awaiting_payment = current.payment_method == PaymentMethod::Razorpay
            && current.payment_status != PaymentStatus::Paid;
        if awaiting_payment && next.is_fulfilment_step() {
            return Err(ServiceError::BadRequest(
                "Order cannot be fulfilled until its payment succeeds".into(),
            ));
        }

        let now = Utc::now();
        let mut update = order::Entity::update_many()
            .col_expr(order::Column::OrderStatus, Expr::value(next))
            .col_expr(order::Column::UpdatedAt, Expr::value(now))
            .filter(order::Column::Id.eq(current.id))
            .filter(order::Column::OrderStatus.eq(current.order_status));
        if next == OrderStatus::Delivered && current.payment_method == PaymentMethod::Cod {
            update = update.col_expr(order::Column::PaymentStatus, Expr::value(PaymentStatus::Paid));
        }
        if update.exec(txn).await?.rows_affected == 0 {
            return Err(ServiceError::Conflict(
                "Order status changed concurrently, please reload".into(),
            ));
        }

        match next {
            OrderStatus::Cancelled | OrderStatus::Returned => {
                if stock_committed(&current) {
                    let items = Self::items_of(txn, current.id).await?;
                    restock(txn, &items).await?;
                }
                let refundable = current.payment_status == PaymentStatus::Paid;
                if refundable && current.total_amount > Decimal::ZERO {
                    let reason = if next == OrderStatus::Returned { "returned" } else { "cancelled" };
                    credit_refund(
                        txn,
                        current.user_id,
                        current.id,
                        current.total_amount,
                        format!("Refund for {} order {}", reason, current.order_number),
                    )
                    .await?;
                }
            }
            _ => {}
        }

        order::Entity::find_by_id(current.id)
            .one(txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Order not found".into()))
    }

    #[instrument(skip(self))]
    pub async fn cancel_order(&self, user_id: Uuid, order_id: Uuid) -> Result<order::Model, ServiceError> {
        let txn = self.db.begin().await?;
        let current = self.owned_order(&txn, user_id, order_id).await?;
        let updated =
            Self::apply_transition(&txn, current, OrderStatus::Cancelled, StatusActor::Customer).await?;
        txn.commit().await?;
        info!(%order_id, "order cancelled by customer");
        Ok(updated)
    }

    #[instrument(skip(self))]
    pub async fn request_return(&self, user_id: Uuid, order_id: Uuid) -> Result<order::Model, ServiceError> {
        let txn = self.db.begin().await?;
        let current = self.owned_order(&txn, user_id, order_id).await?;
        let updated = Self::apply_transition(
            &txn,
            current,
            OrderStatus::ReturnRequested,
            StatusActor::Customer,
        )
        .await?;
        txn.commit().await?;
        info!(%order_id, "return requested");
        Ok(updated)
    }

    #[instrument(skip(self))]
    pub async fn list_orders(
        &self,
        query: OrderListQuery,
        page: u64,
        limit: u64,
    ) -> Result<PaginatedResponse<order::Model>, ServiceError> {
        let mut select = order::Entity::find().order_by_desc(order::Column::OrderDate);
        if let Some(status) = query.status.as_deref().filter(|s| !s.trim().is_empty()) {
            select = select.filter(order::Column::OrderStatus.eq(parse_status(status)?));
        }
        let paginator = select.paginate(&*self.db, limit);
        let total = paginator.num_items().await?;
        let items = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok(PaginatedResponse::new(items, total, page, limit))
    }

    pub async fn get_order(&self, order_id: Uuid) -> Result<OrderDetail, ServiceError> {
        let order = order::Entity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Order not found".into()))?;
        let items = Self::items_of(&*self.db, order.id).await?;
        Ok(OrderDetail { order, items })
    }

    #[instrument(skip(self, request), fields(status = %request.status))]
    pub async fn update_order_status(
        &self,
        order_id: Uuid,
        request: UpdateOrderStatusRequest,
    ) -> Result<order::Model, ServiceError> {
        let next = parse_status(&request.status)?;
        let txn = self.db.begin().await?;
        let current = order::Entity::find_by_id(order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Order not found".into()))?;
        let previous = current.order_status;
        let updated = Self::apply_transition(&txn, current, next, StatusActor::Admin).await?;
        txn.commit().await?;
        info!(%order_id, from = previous.as_str(), to = next.as_str(), "order status updated");
        Ok(updated)
    }
}

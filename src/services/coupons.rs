use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection,
    EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, sync::Arc};
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::{
    entities::{
        coupon::{self, DiscountType},
        user_coupon,
    },
    errors::ServiceError,
    services::pricing::round_money,
    PaginatedResponse,
};

/// Eligibility of `coupon` for a cart. Checks run in a fixed order and the
/// first failure is reported: active and date window, global limit, minimum
/// amount, then the caller's own redemptions.
pub fn check_eligibility(
    coupon: &coupon::Model,
    now: DateTime<Utc>,
    cart_amount: Decimal,
    user_redemptions: i32,
) -> Result<(), ServiceError> {
    if !coupon.is_active {
        return Err(ServiceError::BadRequest("Coupon is not active".into()));
    }
    if now < coupon.start_date {
        return Err(ServiceError::BadRequest("Coupon is not yet valid".into()));
    }
    if now > coupon.expiry_date {
        return Err(ServiceError::BadRequest("Coupon has expired".into()));
    }
    if coupon.usage_limit > 0 && coupon.used_count >= coupon.usage_limit {
        return Err(ServiceError::BadRequest("Coupon usage limit reached".into()));
    }
    if cart_amount < coupon.min_amount {
        return Err(ServiceError::BadRequest(format!(
            "Minimum order amount of {} required for this coupon",
            coupon.min_amount.normalize()
        )));
    }
    if coupon.user_limit > 0 && user_redemptions >= coupon.user_limit {
        return Err(ServiceError::BadRequest(
            "You have already used this coupon the maximum number of times".into(),
        ));
    }
    Ok(())
}

/// Percentage or flat discount, capped by `max_redeemable_amount` and by the
/// cart amount itself.
pub fn calculate_discount(coupon: &coupon::Model, cart_amount: Decimal) -> Decimal {
    if cart_amount <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    let raw = match coupon.discount_type {
        DiscountType::Percentage => cart_amount * coupon.discount / Decimal::ONE_HUNDRED,
        DiscountType::Amount => coupon.discount,
    };
    round_money(
        raw.min(coupon.max_redeemable_amount)
            .min(cart_amount)
            .max(Decimal::ZERO),
    )
}

pub async fn find_by_code<C: ConnectionTrait>(
    conn: &C,
    code: &str,
) -> Result<coupon::Model, ServiceError> {
    coupon::Entity::find()
        .filter(coupon::Column::Code.eq(normalize_code(code)))
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound("Coupon not found".into()))
}

pub async fn user_redemptions<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
    coupon_id: Uuid,
) -> Result<Option<user_coupon::Model>, ServiceError> {
    Ok(user_coupon::Entity::find()
        .filter(user_coupon::Column::UserId.eq(user_id))
        .filter(user_coupon::Column::CouponId.eq(coupon_id))
        .one(conn)
        .await?)
}

/// Records one redemption of `coupon_id` by `user_id`: the global counter and
/// the per-user row move together on `conn` (callers pass their transaction).
///
/// The per-user guard rejects when `user_limit < existing count` (a zero
/// limit is unlimited); the conditional updates keep both counters within their limits under
/// concurrent checkouts.
pub async fn commit_usage<C: ConnectionTrait>(
    conn: &C,
    coupon_id: Uuid,
    user_id: Uuid,
) -> Result<(), ServiceError> {
    let current = coupon::Entity::find_by_id(coupon_id)
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound("Coupon not found".into()))?;
    let existing = user_redemptions(conn, user_id, coupon_id).await?;
    let existing_count = existing.as_ref().map(|r| r.count).unwrap_or(0);

    if current.user_limit > 0 && current.user_limit < existing_count {
        return Err(ServiceError::BadRequest(
            "Coupon usage limit exceeded for this user".into(),
        ));
    }

    let global = coupon::Entity::update_many()
        .col_expr(
            coupon::Column::UsedCount,
            Expr::col(coupon::Column::UsedCount).add(1),
        )
        .col_expr(coupon::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(coupon::Column::Id.eq(coupon_id))
        .filter(
            Condition::any()
                .add(coupon::Column::UsageLimit.lte(0))
                .add(Expr::col(coupon::Column::UsedCount).lt(Expr::col(coupon::Column::UsageLimit))),
        )
        .exec(conn)
        .await?;
    if global.rows_affected == 0 {
        warn!(%coupon_id, "coupon global limit reached during commit");
        return Err(ServiceError::BadRequest("Coupon usage limit reached".into()));
    }

    let now = Utc::now();
    match existing {
        Some(row) => {
            let mut update = user_coupon::Entity::update_many()
                .col_expr(
                    user_coupon::Column::Count,
                    Expr::col(user_coupon::Column::Count).add(1),
                )
                .col_expr(user_coupon::Column::UpdatedAt, Expr::value(now))
                .filter(user_coupon::Column::Id.eq(row.id))
                .filter(user_coupon::Column::Count.eq(row.count));
            if current.user_limit > 0 {
                update = update.filter(user_coupon::Column::Count.lt(current.user_limit));
            }
            if update.exec(conn).await?.rows_affected == 0 {
                return Err(ServiceError::BadRequest(
                    "Coupon usage limit exceeded for this user".into(),
                ));
            }
        }
        None => {
            user_coupon::ActiveModel {
                id: Set(Uuid::new_v4()),
                user_id: Set(user_id),
                coupon_id: Set(coupon_id),
                count: Set(1),
                created_at: Set(now),
                updated_at: Set(now),
            }
            .insert(conn)
            .await?;
        }
    }

    info!(%coupon_id, %user_id, "coupon redemption recorded");
    Ok(())
}

pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct CreateCouponRequest {
    #[validate(length(min = 3, max = 20, message = "Code must be 3-20 characters"))]
    pub code: String,
    #[serde(default)]
    #[validate(length(max = 500))]
    pub description: String,
    pub discount_type: DiscountType,
    pub discount: Decimal,
    pub start_date: DateTime<Utc>,
    pub expiry_date: DateTime<Utc>,
    #[serde(default)]
    pub min_amount: Decimal,
    pub max_redeemable_amount: Decimal,
    #[serde(default)]
    #[validate(range(min = 0, message = "Usage limit cannot be negative"))]
    pub usage_limit: i32,
    #[serde(default = "default_user_limit")]
    #[validate(range(min = 0, message = "User limit cannot be negative"))]
    pub user_limit: i32,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_user_limit() -> i32 {
    1
}

fn default_true() -> bool {
    true
}

/// Partial coupon update; absent fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate)]
pub struct UpdateCouponRequest {
    #[validate(length(min = 3, max = 20, message = "Code must be 3-20 characters"))]
    pub code: Option<String>,
    #[validate(length(max = 500))]
    pub description: Option<String>,
    pub discount_type: Option<DiscountType>,
    pub discount: Option<Decimal>,
    pub start_date: Option<DateTime<Utc>>,
    pub expiry_date: Option<DateTime<Utc>>,
    pub min_amount: Option<Decimal>,
    pub max_redeemable_amount: Option<Decimal>,
    #[validate(range(min = 0))]
    pub usage_limit: Option<i32>,
    #[validate(range(min = 0))]
    pub user_limit: Option<i32>,
    pub is_active: Option<bool>,
}

/// Rules that span fields and cannot be expressed as derive attributes.
fn check_coupon_terms(
    discount_type: DiscountType,
    discount: Decimal,
    start_date: DateTime<Utc>,
    expiry_date: DateTime<Utc>,
    min_amount: Decimal,
    max_redeemable_amount: Decimal,
) -> Result<(), ServiceError> {
    if discount <= Decimal::ZERO {
        return Err(ServiceError::ValidationError("Discount must be positive".into()));
    }
    if discount_type == DiscountType::Percentage && discount > Decimal::ONE_HUNDRED {
        return Err(ServiceError::ValidationError(
            "Percentage discount cannot exceed 100".into(),
        ));
    }
    if expiry_date <= start_date {
        return Err(ServiceError::ValidationError(
            "Expiry date must be after start date".into(),
        ));
    }
    if min_amount < Decimal::ZERO {
        return Err(ServiceError::ValidationError(
            "Minimum amount cannot be negative".into(),
        ));
    }
    if max_redeemable_amount <= Decimal::ZERO {
        return Err(ServiceError::ValidationError(
            "Max redeemable amount must be positive".into(),
        ));
    }
    Ok(())
}

/// Coupon as listed to a shopper, with their own usage
#[derive(Debug, Clone, Serialize)]
pub struct AvailableCoupon {
    #[serde(flatten)]
    pub coupon: coupon::Model,
    pub times_used: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouponPreview {
    pub coupon_id: Uuid,
    pub code: String,
    pub cart_amount: Decimal,
    pub discount: Decimal,
    pub final_amount: Decimal,
}

#[derive(Clone)]
pub struct CouponService {
    db: Arc<DatabaseConnection>,
}

impl CouponService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[instrument(skip(self))]
    pub async fn list_coupons(
        &self,
        page: u64,
        limit: u64,
    ) -> Result<PaginatedResponse<coupon::Model>, ServiceError> {
        let paginator = coupon::Entity::find()
            .order_by_desc(coupon::Column::CreatedAt)
            .paginate(&*self.db, limit);
        let total = paginator.num_items().await?;
        let items = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok(PaginatedResponse::new(items, total, page, limit))
    }

    pub async fn get_coupon(&self, id: Uuid) -> Result<coupon::Model, ServiceError> {
        coupon::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Coupon {} not found", id)))
    }

    #[instrument(skip(self, request), fields(code = %request.code))]
    pub async fn create_coupon(
        &self,
        request: CreateCouponRequest,
    ) -> Result<coupon::Model, ServiceError> {
        request.validate()?;
        check_coupon_terms(
            request.discount_type,
            request.discount,
            request.start_date,
            request.expiry_date,
            request.min_amount,
            request.max_redeemable_amount,
        )?;

        let code = normalize_code(&request.code);
        if coupon::Entity::find()
            .filter(coupon::Column::Code.eq(code.clone()))
            .one(&*self.db)
            .await?
            .is_some()
        {
            return Err(ServiceError::Conflict(format!(
                "Coupon code {} already exists",
                code
            )));
        }

        let now = Utc::now();
        let model = coupon::ActiveModel {
            id: Set(Uuid::new_v4()),
            code: Set(code),
            description: Set(request.description),
            discount_type: Set(request.discount_type),
            discount: Set(request.discount),
            start_date: Set(request.start_date),
            expiry_date: Set(request.expiry_date),
            min_amount: Set(request.min_amount),
            max_redeemable_amount: Set(request.max_redeemable_amount),
            usage_limit: Set(request.usage_limit),
            used_count: Set(0),
            user_limit: Set(request.user_limit),
            is_active: Set(request.is_active),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await?;

        info!(coupon_id = %model.id, code = %model.code, "coupon created");
        Ok(model)
    }

    #[instrument(skip(self, patch))]
    pub async fn update_coupon(
        &self,
        id: Uuid,
        patch: UpdateCouponRequest,
    ) -> Result<coupon::Model, ServiceError> {
        patch.validate()?;
        let existing = self.get_coupon(id).await?;

        check_coupon_terms(
            patch.discount_type.unwrap_or(existing.discount_type),
            patch.discount.unwrap_or(existing.discount),
            patch.start_date.unwrap_or(existing.start_date),
            patch.expiry_date.unwrap_or(existing.expiry_date),
            patch.min_amount.unwrap_or(existing.min_amount),
            patch
                .max_redeemable_amount
                .unwrap_or(existing.max_redeemable_amount),
        )?;

        let mut model: coupon::ActiveModel = existing.clone().into();
        if let Some(code) = patch.code {
            let code = normalize_code(&code);
            if code != existing.code {
                let taken = coupon::Entity::find()
                    .filter(coupon::Column::Code.eq(code.clone()))
                    .one(&*self.db)
                    .await?
                    .is_some();
                if taken {
                    return Err(ServiceError::Conflict(format!(
                        "Coupon code {} already exists",
                        code
                    )));
                }
                model.code = Set(code);
            }
        }
        if let Some(description) = patch.description {
            model.description = Set(description);
        }
        if let Some(discount_type) = patch.discount_type {
            model.discount_type = Set(discount_type);
        }
        if let Some(discount) = patch.discount {
            model.discount = Set(discount);
        }
        if let Some(start_date) = patch.start_date {
            model.start_date = Set(start_date);
        }
        if let Some(expiry_date) = patch.expiry_date {
            model.expiry_date = Set(expiry_date);
        }
        if let Some(min_amount) = patch.min_amount {
            model.min_amount = Set(min_amount);
        }
        if let Some(max) = patch.max_redeemable_amount {
            model.max_redeemable_amount = Set(max);
        }
        if let Some(usage_limit) = patch.usage_limit {
            model.usage_limit = Set(usage_limit);
        }
        if let Some(user_limit) = patch.user_limit {
            model.user_limit = Set(user_limit);
        }
        if let Some(is_active) = patch.is_active {
            model.is_active = Set(is_active);
        }
        model.updated_at = Set(Utc::now());

        let updated = model.update(&*self.db).await?;
        info!(coupon_id = %id, "coupon updated");
        Ok(updated)
    }

    #[instrument(skip(self))]
    pub async fn toggle_coupon(&self, id: Uuid) -> Result<coupon::Model, ServiceError> {
        let existing = self.get_coupon(id).await?;
        let next = !existing.is_active;
        let mut model: coupon::ActiveModel = existing.into();
        model.is_active = Set(next);
        model.updated_at = Set(Utc::now());
        let updated = model.update(&*self.db).await?;
        info!(coupon_id = %id, is_active = next, "coupon status toggled");
        Ok(updated)
    }

    #[instrument(skip(self))]
    pub async fn delete_coupon(&self, id: Uuid) -> Result<(), ServiceError> {
        let result = coupon::Entity::delete_by_id(id).exec(&*self.db).await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound(format!("Coupon {} not found", id)));
        }
        user_coupon::Entity::delete_many()
            .filter(user_coupon::Column::CouponId.eq(id))
            .exec(&*self.db)
            .await?;
        info!(coupon_id = %id, "coupon deleted");
        Ok(())
    }

    /// Coupons the user could apply right now.
    #[instrument(skip(self))]
    pub async fn available_coupons(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<AvailableCoupon>, ServiceError> {
        let now = Utc::now();
        let coupons = coupon::Entity::find()
            .filter(coupon::Column::IsActive.eq(true))
            .filter(coupon::Column::StartDate.lte(now))
            .filter(coupon::Column::ExpiryDate.gte(now))
            .order_by_asc(coupon::Column::ExpiryDate)
            .all(&*self.db)
            .await?;

        let usage: HashMap<Uuid, i32> = user_coupon::Entity::find()
            .filter(user_coupon::Column::UserId.eq(user_id))
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|row| (row.coupon_id, row.count))
            .collect();

        Ok(coupons
            .into_iter()
            .filter(|c| c.usage_limit <= 0 || c.used_count < c.usage_limit)
            .map(|c| {
                let times_used = usage.get(&c.id).copied().unwrap_or(0);
                AvailableCoupon {
                    coupon: c,
                    times_used,
                }
            })
            .filter(|c| c.coupon.user_limit <= 0 || c.times_used < c.coupon.user_limit)
            .collect())
    }

    /// Discount preview for a cart amount; nothing is recorded.
    #[instrument(skip(self))]
    pub async fn apply_coupon(
        &self,
        user_id: Uuid,
        code: &str,
        cart_amount: Decimal,
    ) -> Result<CouponPreview, ServiceError> {
        let coupon = find_by_code(&*self.db, code).await?;
        let used = user_redemptions(&*self.db, user_id, coupon.id)
            .await?
            .map(|r| r.count)
            .unwrap_or(0);
        check_eligibility(&coupon, Utc::now(), cart_amount, used)?;

        let discount = calculate_discount(&coupon, cart_amount);
        Ok(CouponPreview {
            coupon_id: coupon.id,
            code: coupon.code,
            cart_amount,
            discount,
            final_amount: cart_amount - discount,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn save10() -> coupon::Model {
        let now = Utc::now();
        coupon::Model {
            id: Uuid::new_v4(),
            code: "SAVE10".into(),
            description: String::new(),
            discount_type: DiscountType::Percentage,
            discount: dec!(10),
            start_date: now - Duration::days(1),
            expiry_date: now + Duration::days(1),
            min_amount: dec!(500),
            max_redeemable_amount: dec!(150),
            usage_limit: 10,
            used_count: 0,
            user_limit: 1,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    fn message(result: Result<(), ServiceError>) -> String {
        match result {
            Err(ServiceError::BadRequest(msg)) => msg,
            other => panic!("expected BadRequest, got {:?}", other),
        }
    }

    #[test]
    fn percentage_discount_is_capped() {
        let coupon = save10();
        assert_eq!(calculate_discount(&coupon, dec!(2000)), dec!(150));
        assert_eq!(calculate_discount(&coupon, dec!(1000)), dec!(100));
    }

    #[test]
    fn flat_discount_is_capped_too() {
        let mut coupon = save10();
        coupon.discount_type = DiscountType::Amount;
        coupon.discount = dec!(300);
        assert_eq!(calculate_discount(&coupon, dec!(2000)), dec!(150));
        coupon.max_redeemable_amount = dec!(1000);
        assert_eq!(calculate_discount(&coupon, dec!(200)), dec!(200));
    }

    #[test]
    fn eligibility_checks_run_in_order() {
        let now = Utc::now();
        let mut coupon = save10();
        assert!(check_eligibility(&coupon, now, dec!(2000), 0).is_ok());

        // Global limit is reported before the minimum amount.
        coupon.used_count = 10;
        assert_eq!(
            message(check_eligibility(&coupon, now, dec!(100), 5)),
            "Coupon usage limit reached"
        );

        coupon.used_count = 0;
        assert!(message(check_eligibility(&coupon, now, dec!(100), 5)).starts_with("Minimum order"));
        assert_eq!(
            message(check_eligibility(&coupon, now, dec!(600), 1)),
            "You have already used this coupon the maximum number of times"
        );

        coupon.is_active = false;
        assert_eq!(
            message(check_eligibility(&coupon, now, dec!(2000), 0)),
            "Coupon is not active"
        );
    }

    #[test]
    fn date_window_is_inclusive_of_now() {
        let coupon = save10();
        assert_eq!(
            message(check_eligibility(&coupon, coupon.expiry_date + Duration::seconds(1), dec!(600), 0)),
            "Coupon has expired"
        );
        assert_eq!(
            message(check_eligibility(&coupon, coupon.start_date - Duration::seconds(1), dec!(600), 0)),
            "Coupon is not yet valid"
        );
    }

    #[test]
    fn zero_limits_mean_unlimited() {
        let mut coupon = save10();
        coupon.usage_limit = 0;
        coupon.user_limit = 0;
        coupon.used_count = 1_000;
        assert!(check_eligibility(&coupon, Utc::now(), dec!(600), 99).is_ok());
    }

    #[test]
    fn coupon_terms_are_checked() {
        let now = Utc::now();
        assert!(check_coupon_terms(DiscountType::Percentage, dec!(101), now, now + Duration::days(1), dec!(0), dec!(10)).is_err());
        assert!(check_coupon_terms(DiscountType::Amount, dec!(50), now, now, dec!(0), dec!(10)).is_err());
        assert!(check_coupon_terms(DiscountType::Amount, dec!(50), now, now + Duration::days(1), dec!(0), dec!(0)).is_err());
        assert!(check_coupon_terms(DiscountType::Amount, dec!(50), now, now + Duration::days(1), dec!(0), dec!(50)).is_ok());
    }

    proptest! {
        #[test]
        fn discount_never_exceeds_cap(
            cents in 0i64..100_000_000,
            discount in 1i64..200,
            cap in 1i64..10_000,
            percentage in any::<bool>(),
        ) {
            let mut coupon = save10();
            coupon.discount_type = if percentage { DiscountType::Percentage } else { DiscountType::Amount };
            coupon.discount = Decimal::from(discount);
            coupon.max_redeemable_amount = Decimal::from(cap);
            let amount = Decimal::new(cents, 2);

            let d = calculate_discount(&coupon, amount);
            prop_assert!(d <= coupon.max_redeemable_amount);
            prop_assert!(d <= amount);
            prop_assert!(d >= Decimal::ZERO);
        }
    }
}

use chrono::{Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, sync::Arc};
use tracing::instrument;

use crate::{
    entities::order::{self, OrderStatus, PaymentStatus},
    errors::ServiceError,
};

const DEFAULT_WINDOW_DAYS: i64 = 30;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SalesReportQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DailySales {
    pub date: NaiveDate,
    pub orders: u64,
    pub gross: Decimal,
    pub offer_discount: Decimal,
    pub coupon_discount: Decimal,
    pub net: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SalesReport {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub order_count: u64,
    /// Listed prices before any offer
    pub gross: Decimal,
    pub offer_discount: Decimal,
    pub coupon_discount: Decimal,
    pub net: Decimal,
    pub days: Vec<DailySales>,
}

/// Folds paid orders into totals and a per-day breakdown.
pub fn summarize(from: NaiveDate, to: NaiveDate, orders: &[order::Model]) -> SalesReport {
    let mut days: BTreeMap<NaiveDate, DailySales> = BTreeMap::new();
    for o in orders {
        let date = o.order_date.date_naive();
        let day = days.entry(date).or_insert_with(|| DailySales {
            date,
            ..DailySales::default()
        });
        day.orders += 1;
        day.gross += o.subtotal_before_offer;
        day.offer_discount += o.subtotal_before_offer - o.subtotal_after_offer;
        day.coupon_discount += o.coupon_discount;
        day.net += o.total_amount;
    }

    let days: Vec<DailySales> = days.into_values().collect();
    SalesReport {
        from,
        to,
        order_count: days.iter().map(|d| d.orders).sum(),
        gross: days.iter().map(|d| d.gross).sum(),
        offer_discount: days.iter().map(|d| d.offer_discount).sum(),
        coupon_discount: days.iter().map(|d| d.coupon_discount).sum(),
        net: days.iter().map(|d| d.net).sum(),
        days,
    }
}

#[derive(Clone)]
pub struct ReportService {
    db: Arc<DatabaseConnection>,
}

impl ReportService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Paid orders placed between `from` and `to` inclusive, excluding
    /// cancelled and returned ones. Defaults to the last 30 days.
    #[instrument(skip(self))]
    pub async fn sales_report(&self, query: SalesReportQuery) -> Result<SalesReport, ServiceError> {
        let today = Utc::now().date_naive();
        let to = query.to.unwrap_or(today);
        let from = query
            .from
            .unwrap_or_else(|| to - Duration::days(DEFAULT_WINDOW_DAYS - 1));
        if from > to {
            return Err(ServiceError::BadRequest(
                "'from' must not be after 'to'".into(),
            ));
        }

        let start = Utc.from_utc_datetime(&from.and_time(NaiveTime::MIN));
        let end = Utc.from_utc_datetime(&(to + Duration::days(1)).and_time(NaiveTime::MIN));
        let orders = order::Entity::find()
            .filter(order::Column::PaymentStatus.eq(PaymentStatus::Paid))
            .filter(
                order::Column::OrderStatus
                    .is_not_in([OrderStatus::Cancelled, OrderStatus::Returned]),
            )
            .filter(order::Column::OrderDate.gte(start))
            .filter(order::Column::OrderDate.lt(end))
            .order_by_asc(order::Column::OrderDate)
            .all(&*self.db)
            .await?;

        Ok(summarize(from, to, &orders))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::order::PaymentMethod;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn paid(day: u32, before: Decimal, after: Decimal, coupon: Decimal) -> order::Model {
        let at = Utc.with_ymd_and_hms(2024, 5, day, 10, 0, 0).unwrap();
        order::Model {
            id: Uuid::new_v4(),
            order_number: format!("ORD-202405{:02}-001", day),
            user_id: Uuid::new_v4(),
            shipping_address: serde_json::json!({}),
            payment_method: PaymentMethod::Razorpay,
            payment_status: PaymentStatus::Paid,
            order_status: OrderStatus::Confirmed,
            subtotal_before_offer: before,
            subtotal_after_offer: after,
            coupon_id: None,
            coupon_code: None,
            coupon_discount: coupon,
            total_amount: after - coupon,
            gateway_order_id: None,
            gateway_payment_id: None,
            order_date: at,
            updated_at: at,
        }
    }

    #[test]
    fn totals_and_daily_breakdown() {
        let from = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let to = NaiveDate::from_ymd_opt(2024, 5, 31).unwrap();
        let orders = vec![
            paid(3, dec!(2000), dec!(2000), dec!(150)),
            paid(3, dec!(1000), dec!(900), dec!(0)),
            paid(7, dec!(500), dec!(450), dec!(50)),
        ];
        let report = summarize(from, to, &orders);

        assert_eq!(report.order_count, 3);
        assert_eq!(report.gross, dec!(3500));
        assert_eq!(report.offer_discount, dec!(150));
        assert_eq!(report.coupon_discount, dec!(200));
        assert_eq!(report.net, dec!(3150));
        assert_eq!(report.days.len(), 2);
        assert_eq!(report.days[0].orders, 2);
        assert_eq!(report.days[0].net, dec!(2750));
        assert_eq!(report.days[1].date, NaiveDate::from_ymd_opt(2024, 5, 7).unwrap());
    }

    #[test]
    fn empty_range_is_all_zero() {
        let day = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let report = summarize(day, day, &[]);
        assert_eq!(report.order_count, 0);
        assert_eq!(report.net, Decimal::ZERO);
        assert!(report.days.is_empty());
    }
}

//! Offer resolution and money arithmetic shared by cart, checkout and orders.

use rust_decimal::{prelude::ToPrimitive, Decimal, RoundingStrategy};
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::{
    entities::{brand, product, series},
    errors::ServiceError,
};

/// Best of the product, brand and series offers. Offers never stack.
pub fn best_offer(product_offer: i32, brand_offer: i32, series_offer: i32) -> i32 {
    product_offer
        .max(brand_offer)
        .max(series_offer)
        .clamp(0, 100)
}

pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Unit price after an offer percentage.
pub fn apply_offer(price: Decimal, offer_percent: i32) -> Decimal {
    let offer = Decimal::from(offer_percent.clamp(0, 100));
    round_money(price - price * offer / Decimal::ONE_HUNDRED)
}

/// `round(amount * 100)` for the gateway.
pub fn to_minor_units(amount: Decimal) -> Result<i64, ServiceError> {
    (amount * Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .ok_or_else(|| ServiceError::BadRequest("Amount out of range".to_string()))
}

/// A product together with the parents whose offers compete with its own
#[derive(Debug, Clone)]
pub struct ProductWithParents {
    pub product: product::Model,
    pub brand: Option<brand::Model>,
    pub series: Option<series::Model>,
}

impl ProductWithParents {
    pub fn offer_percent(&self) -> i32 {
        best_offer(
            self.product.offer,
            self.brand.as_ref().map(|b| b.offer).unwrap_or(0),
            self.series.as_ref().map(|s| s.offer).unwrap_or(0),
        )
    }

    /// Visible on the storefront: the product and both parents are active.
    pub fn is_purchasable(&self) -> bool {
        self.product.is_active
            && self.brand.as_ref().map_or(false, |b| b.is_active)
            && self.series.as_ref().map_or(false, |s| s.is_active)
    }
}

/// Loads products by id along with their brand and series, keyed by product id.
pub async fn load_with_parents<C: ConnectionTrait>(
    conn: &C,
    product_ids: &[Uuid],
) -> Result<HashMap<Uuid, ProductWithParents>, ServiceError> {
    if product_ids.is_empty() {
        return Ok(HashMap::new());
    }
    let products = product::Entity::find()
        .filter(product::Column::Id.is_in(product_ids.to_vec()))
        .all(conn)
        .await?;

    let brand_ids: Vec<Uuid> = products.iter().map(|p| p.brand_id).collect();
    let series_ids: Vec<Uuid> = products.iter().map(|p| p.series_id).collect();
    let brands: HashMap<Uuid, brand::Model> = brand::Entity::find()
        .filter(brand::Column::Id.is_in(brand_ids))
        .all(conn)
        .await?
        .into_iter()
        .map(|b| (b.id, b))
        .collect();
    let series: HashMap<Uuid, series::Model> = series::Entity::find()
        .filter(series::Column::Id.is_in(series_ids))
        .all(conn)
        .await?
        .into_iter()
        .map(|s| (s.id, s))
        .collect();

    Ok(products
        .into_iter()
        .map(|product| {
            let entry = ProductWithParents {
                brand: brands.get(&product.brand_id).cloned(),
                series: series.get(&product.series_id).cloned(),
                product,
            };
            (entry.product.id, entry)
        })
        .collect())
}

/// One priced checkout line
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PricedLine {
    pub product_id: Uuid,
    pub product_name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub offer_percent: i32,
    pub offer_price: Decimal,
    pub line_total_before_offer: Decimal,
    pub line_total: Decimal,
}

impl PricedLine {
    pub fn new(item: &ProductWithParents, quantity: i32) -> Self {
        let unit_price = item.product.price;
        let offer_percent = item.offer_percent();
        let offer_price = apply_offer(unit_price, offer_percent);
        let qty = Decimal::from(quantity);
        Self {
            product_id: item.product.id,
            product_name: item.product.name.clone(),
            quantity,
            unit_price,
            offer_percent,
            offer_price,
            line_total_before_offer: round_money(unit_price * qty),
            line_total: round_money(offer_price * qty),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Subtotals {
    pub before_offer: Decimal,
    pub after_offer: Decimal,
}

pub fn subtotals(lines: &[PricedLine]) -> Subtotals {
    lines.iter().fold(Subtotals::default(), |acc, line| Subtotals {
        before_offer: acc.before_offer + line.line_total_before_offer,
        after_offer: acc.after_offer + line.line_total,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    #[test]
    fn largest_offer_wins() {
        assert_eq!(best_offer(10, 25, 5), 25);
        assert_eq!(best_offer(0, 0, 0), 0);
        assert_eq!(best_offer(40, 10, 30), 40);
        assert_eq!(best_offer(-5, 150, 0), 100);
    }

    #[test]
    fn offer_prices_round_to_paise() {
        assert_eq!(apply_offer(dec!(1000), 0), dec!(1000));
        assert_eq!(apply_offer(dec!(999), 15), dec!(849.15));
        assert_eq!(apply_offer(dec!(10.01), 50), dec!(5.01));
    }

    #[test]
    fn minor_units_round_half_up() {
        assert_eq!(to_minor_units(dec!(1850)).unwrap(), 185000);
        assert_eq!(to_minor_units(dec!(10.005)).unwrap(), 1001);
        assert_eq!(to_minor_units(dec!(0.1)).unwrap(), 10);
    }

    proptest! {
        #[test]
        fn best_offer_is_one_of_the_inputs(p in 0i32..=100, b in 0i32..=100, s in 0i32..=100) {
            let best = best_offer(p, b, s);
            prop_assert!(best >= p && best >= b && best >= s);
            prop_assert!(best == p || best == b || best == s);
        }

        #[test]
        fn offer_never_raises_price(cents in 0i64..10_000_000, offer in 0i32..=100) {
            let price = Decimal::new(cents, 2);
            let discounted = apply_offer(price, offer);
            prop_assert!(discounted <= price);
            prop_assert!(discounted >= Decimal::ZERO);
        }
    }
}

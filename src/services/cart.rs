use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::{
    entities::{cart, cart_item, product, ImageAsset},
    errors::ServiceError,
    services::pricing::{apply_offer, load_with_parents, round_money},
};

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct AddToCartRequest {
    pub product_id: Uuid,
    #[serde(default = "default_quantity")]
    #[validate(range(min = 1, max = 100, message = "Quantity must be between 1 and 100"))]
    pub quantity: i32,
}

fn default_quantity() -> i32 {
    1
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct UpdateCartItemRequest {
    #[validate(range(min = 1, max = 100, message = "Quantity must be between 1 and 100"))]
    pub quantity: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct CartLine {
    pub product_id: Uuid,
    pub product_name: String,
    pub image: Option<ImageAsset>,
    pub quantity: i32,
    /// Listed price captured when the product was added
    pub unit_price: Decimal,
    pub offer_percent: i32,
    pub offer_price: Decimal,
    pub line_total: Decimal,
    pub stock: i32,
    pub available: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CartView {
    pub items: Vec<CartLine>,
    pub item_count: i32,
    pub subtotal_before_offer: Decimal,
    pub subtotal_after_offer: Decimal,
}

/// Returns the user's cart, creating it on first use.
pub async fn ensure_cart<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
) -> Result<cart::Model, ServiceError> {
    if let Some(existing) = cart::Entity::find()
        .filter(cart::Column::UserId.eq(user_id))
        .one(conn)
        .await?
    {
        return Ok(existing);
    }
    let now = Utc::now();
    Ok(cart::ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(user_id),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(conn)
    .await?)
}

/// Empties the user's cart on `conn`; a missing cart is already empty.
pub async fn clear_cart_for<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
) -> Result<(), ServiceError> {
    if let Some(existing) = cart::Entity::find()
        .filter(cart::Column::UserId.eq(user_id))
        .one(conn)
        .await?
    {
        cart_item::Entity::delete_many()
            .filter(cart_item::Column::CartId.eq(existing.id))
            .exec(conn)
            .await?;
    }
    Ok(())
}

#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
}

impl CartService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[instrument(skip(self))]
    pub async fn get_cart(&self, user_id: Uuid) -> Result<CartView, ServiceError> {
        let cart = ensure_cart(&*self.db, user_id).await?;
        let lines = cart_item::Entity::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .order_by_asc(cart_item::Column::CreatedAt)
            .all(&*self.db)
            .await?;

        let ids: Vec<Uuid> = lines.iter().map(|l| l.product_id).collect();
        let products = load_with_parents(&*self.db, &ids).await?;

        let mut items = Vec::with_capacity(lines.len());
        let mut before = Decimal::ZERO;
        let mut after = Decimal::ZERO;
        let mut count = 0;
        for line in lines {
            let Some(entry) = products.get(&line.product_id) else {
                continue;
            };
            let offer_percent = entry.offer_percent();
            let offer_price = apply_offer(line.unit_price, offer_percent);
            let qty = Decimal::from(line.quantity);
            let line_total = round_money(offer_price * qty);
            let available = entry.is_purchasable() && entry.product.stock >= line.quantity;

            before += round_money(line.unit_price * qty);
            after += line_total;
            count += line.quantity;
            items.push(CartLine {
                product_id: line.product_id,
                product_name: entry.product.name.clone(),
                image: ImageAsset::list_from_json(&entry.product.images)
                    .into_iter()
                    .next(),
                quantity: line.quantity,
                unit_price: line.unit_price,
                offer_percent,
                offer_price,
                line_total,
                stock: entry.product.stock,
                available,
            });
        }

        Ok(CartView {
            items,
            item_count: count,
            subtotal_before_offer: before,
            subtotal_after_offer: after,
        })
    }

    async fn purchasable_product(&self, product_id: Uuid) -> Result<product::Model, ServiceError> {
        let mut found = load_with_parents(&*self.db, &[product_id]).await?;
        let entry = found
            .remove(&product_id)
            .ok_or_else(|| ServiceError::NotFound("Product not found".into()))?;
        if !entry.is_purchasable() {
            return Err(ServiceError::BadRequest(
                "Product is currently unavailable".into(),
            ));
        }
        Ok(entry.product)
    }

    #[instrument(skip(self, request), fields(product_id = %request.product_id, quantity = request.quantity))]
    pub async fn add_item(
        &self,
        user_id: Uuid,
        request: AddToCartRequest,
    ) -> Result<CartView, ServiceError> {
        request.validate()?;
        let product = self.purchasable_product(request.product_id).await?;
        let cart = ensure_cart(&*self.db, user_id).await?;

        let existing = cart_item::Entity::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .filter(cart_item::Column::ProductId.eq(product.id))
            .one(&*self.db)
            .await?;
        let wanted = existing.as_ref().map(|l| l.quantity).unwrap_or(0) + request.quantity;
        if wanted > product.stock {
            return Err(ServiceError::BadRequest(format!(
                "Only {} left in stock",
                product.stock
            )));
        }

        let now = Utc::now();
        match existing {
            Some(line) => {
                let mut model: cart_item::ActiveModel = line.into();
                model.quantity = Set(wanted);
                model.updated_at = Set(now);
                model.update(&*self.db).await?;
            }
            None => {
                cart_item::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    cart_id: Set(cart.id),
                    product_id: Set(product.id),
                    quantity: Set(request.quantity),
                    unit_price: Set(product.price),
                    created_at: Set(now),
                    updated_at: Set(now),
                }
                .insert(&*self.db)
                .await?;
            }
        }

        info!(%user_id, product_id = %product.id, quantity = wanted, "cart updated");
        self.get_cart(user_id).await
    }

    #[instrument(skip(self, request))]
    pub async fn update_quantity(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        request: UpdateCartItemRequest,
    ) -> Result<CartView, ServiceError> {
        request.validate()?;
        let cart = ensure_cart(&*self.db, user_id).await?;
        let line = cart_item::Entity::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .filter(cart_item::Column::ProductId.eq(product_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Product is not in the cart".into()))?;

        let product = self.purchasable_product(product_id).await?;
        if request.quantity > product.stock {
            return Err(ServiceError::BadRequest(format!(
                "Only {} left in stock",
                product.stock
            )));
        }

        let mut model: cart_item::ActiveModel = line.into();
        model.quantity = Set(request.quantity);
        model.updated_at = Set(Utc::now());
        model.update(&*self.db).await?;
        self.get_cart(user_id).await
    }

    #[instrument(skip(self))]
    pub async fn remove_item(
        &self,
        user_id: Uuid,
        product_id: Uuid,
    ) -> Result<CartView, ServiceError> {
        let cart = ensure_cart(&*self.db, user_id).await?;
        let result = cart_item::Entity::delete_many()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .filter(cart_item::Column::ProductId.eq(product_id))
            .exec(&*self.db)
            .await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound("Product is not in the cart".into()));
        }
        self.get_cart(user_id).await
    }

    #[instrument(skip(self))]
    pub async fn clear_cart(&self, user_id: Uuid) -> Result<CartView, ServiceError> {
        clear_cart_for(&*self.db, user_id).await?;
        self.get_cart(user_id).await
    }
}

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    entities::{product, wishlist, wishlist_item},
    errors::ServiceError,
    services::pricing::{apply_offer, load_with_parents},
};

#[derive(Debug, Clone, Serialize)]
pub struct WishlistEntry {
    pub product: product::Model,
    pub offer_percent: i32,
    pub offer_price: rust_decimal::Decimal,
    pub available: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToggleOutcome {
    pub product_id: Uuid,
    /// `false` when the toggle removed the product
    pub added: bool,
}

#[derive(Clone)]
pub struct WishlistService {
    db: Arc<DatabaseConnection>,
}

impl WishlistService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    async fn ensure_wishlist(&self, user_id: Uuid) -> Result<wishlist::Model, ServiceError> {
        if let Some(existing) = wishlist::Entity::find()
            .filter(wishlist::Column::UserId.eq(user_id))
            .one(&*self.db)
            .await?
        {
            return Ok(existing);
        }
        Ok(wishlist::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await?)
    }

    #[instrument(skip(self))]
    pub async fn get_wishlist(&self, user_id: Uuid) -> Result<Vec<WishlistEntry>, ServiceError> {
        let list = self.ensure_wishlist(user_id).await?;
        let items = wishlist_item::Entity::find()
            .filter(wishlist_item::Column::WishlistId.eq(list.id))
            .order_by_desc(wishlist_item::Column::CreatedAt)
            .all(&*self.db)
            .await?;
        let ids: Vec<Uuid> = items.iter().map(|i| i.product_id).collect();
        let mut products = load_with_parents(&*self.db, &ids).await?;

        Ok(ids
            .iter()
            .filter_map(|id| products.remove(id))
            .map(|entry| {
                let offer_percent = entry.offer_percent();
                WishlistEntry {
                    offer_price: apply_offer(entry.product.price, offer_percent),
                    available: entry.is_purchasable() && entry.product.stock > 0,
                    offer_percent,
                    product: entry.product,
                }
            })
            .collect())
    }

    /// Adds the product, or removes it when it is already present.
    #[instrument(skip(self))]
    pub async fn toggle(&self, user_id: Uuid, product_id: Uuid) -> Result<ToggleOutcome, ServiceError> {
        let list = self.ensure_wishlist(user_id).await?;
        let existing = wishlist_item::Entity::find()
            .filter(wishlist_item::Column::WishlistId.eq(list.id))
            .filter(wishlist_item::Column::ProductId.eq(product_id))
            .one(&*self.db)
            .await?;

        if let Some(item) = existing {
            wishlist_item::Entity::delete_by_id(item.id)
                .exec(&*self.db)
                .await?;
            info!(%user_id, %product_id, "removed from wishlist");
            return Ok(ToggleOutcome {
                product_id,
                added: false,
            });
        }

        product::Entity::find_by_id(product_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Product not found".into()))?;

        wishlist_item::ActiveModel {
            id: Set(Uuid::new_v4()),
            wishlist_id: Set(list.id),
            product_id: Set(product_id),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await?;
        info!(%user_id, %product_id, "added to wishlist");
        Ok(ToggleOutcome {
            product_id,
            added: true,
        })
    }

    #[instrument(skip(self))]
    pub async fn remove(&self, user_id: Uuid, product_id: Uuid) -> Result<(), ServiceError> {
        let list = self.ensure_wishlist(user_id).await?;
        let result = wishlist_item::Entity::delete_many()
            .filter(wishlist_item::Column::WishlistId.eq(list.id))
            .filter(wishlist_item::Column::ProductId.eq(product_id))
            .exec(&*self.db)
            .await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound(
                "Product is not in the wishlist".into(),
            ));
        }
        Ok(())
    }
}

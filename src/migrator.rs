use sea_orm::{EntityTrait, Schema};
use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240601_000001_create_identity_tables::Migration),
            Box::new(m20240601_000002_create_catalog_tables::Migration),
            Box::new(m20240601_000003_create_shopping_tables::Migration),
            Box::new(m20240601_000004_create_order_tables::Migration),
            Box::new(m20240601_000005_create_wallet_tables::Migration),
        ]
    }
}

/// Creates the table for `entity` exactly as its model declares it.
async fn create_entity_table<E>(manager: &SchemaManager<'_>, entity: E) -> Result<(), DbErr>
where
    E: EntityTrait,
{
    let schema = Schema::new(manager.get_database_backend());
    manager
        .create_table(schema.create_table_from_entity(entity).if_not_exists().to_owned())
        .await
}

async fn drop_entity_table<E>(manager: &SchemaManager<'_>, entity: E) -> Result<(), DbErr>
where
    E: EntityTrait,
{
    manager
        .drop_table(Table::drop().table(entity).if_exists().to_owned())
        .await
}

mod m20240601_000001_create_identity_tables {
    use super::{create_entity_table, drop_entity_table};
    use crate::entities::{admin, otp_record, user};
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000001_create_identity_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            create_entity_table(manager, user::Entity).await?;
            create_entity_table(manager, admin::Entity).await?;
            create_entity_table(manager, otp_record::Entity).await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_otp_records_record_expires_at")
                        .table(otp_record::Entity)
                        .col(otp_record::Column::RecordExpiresAt)
                        .if_not_exists()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            drop_entity_table(manager, otp_record::Entity).await?;
            drop_entity_table(manager, admin::Entity).await?;
            drop_entity_table(manager, user::Entity).await
        }
    }
}

mod m20240601_000002_create_catalog_tables {
    use super::{create_entity_table, drop_entity_table};
    use crate::entities::{brand, product, series};
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000002_create_catalog_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            create_entity_table(manager, brand::Entity).await?;
            create_entity_table(manager, series::Entity).await?;
            create_entity_table(manager, product::Entity).await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_series_brand_name_key")
                        .table(series::Entity)
                        .col(series::Column::BrandId)
                        .col(series::Column::NameKey)
                        .unique()
                        .if_not_exists()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_products_series_id")
                        .table(product::Entity)
                        .col(product::Column::SeriesId)
                        .if_not_exists()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_products_brand_id")
                        .table(product::Entity)
                        .col(product::Column::BrandId)
                        .if_not_exists()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            drop_entity_table(manager, product::Entity).await?;
            drop_entity_table(manager, series::Entity).await?;
            drop_entity_table(manager, brand::Entity).await
        }
    }
}

mod m20240601_000003_create_shopping_tables {
    use super::{create_entity_table, drop_entity_table};
    use crate::entities::{
        address, cart, cart_item, coupon, user_coupon, wishlist, wishlist_item,
    };
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000003_create_shopping_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            create_entity_table(manager, address::Entity).await?;
            create_entity_table(manager, cart::Entity).await?;
            create_entity_table(manager, cart_item::Entity).await?;
            create_entity_table(manager, wishlist::Entity).await?;
            create_entity_table(manager, wishlist_item::Entity).await?;
            create_entity_table(manager, coupon::Entity).await?;
            create_entity_table(manager, user_coupon::Entity).await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_cart_items_cart_product")
                        .table(cart_item::Entity)
                        .col(cart_item::Column::CartId)
                        .col(cart_item::Column::ProductId)
                        .unique()
                        .if_not_exists()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_wishlist_items_wishlist_product")
                        .table(wishlist_item::Entity)
                        .col(wishlist_item::Column::WishlistId)
                        .col(wishlist_item::Column::ProductId)
                        .unique()
                        .if_not_exists()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_user_coupons_user_coupon")
                        .table(user_coupon::Entity)
                        .col(user_coupon::Column::UserId)
                        .col(user_coupon::Column::CouponId)
                        .unique()
                        .if_not_exists()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            drop_entity_table(manager, user_coupon::Entity).await?;
            drop_entity_table(manager, coupon::Entity).await?;
            drop_entity_table(manager, wishlist_item::Entity).await?;
            drop_entity_table(manager, wishlist::Entity).await?;
            drop_entity_table(manager, cart_item::Entity).await?;
            drop_entity_table(manager, cart::Entity).await?;
            drop_entity_table(manager, address::Entity).await
        }
    }
}

mod m20240601_000004_create_order_tables {
    use super::{create_entity_table, drop_entity_table};
    use crate::entities::{order, order_item, pending_checkout};
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000004_create_order_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            create_entity_table(manager, order::Entity).await?;
            create_entity_table(manager, order_item::Entity).await?;
            create_entity_table(manager, pending_checkout::Entity).await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_orders_user_id")
                        .table(order::Entity)
                        .col(order::Column::UserId)
                        .if_not_exists()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_order_items_order_id")
                        .table(order_item::Entity)
                        .col(order_item::Column::OrderId)
                        .if_not_exists()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            drop_entity_table(manager, pending_checkout::Entity).await?;
            drop_entity_table(manager, order_item::Entity).await?;
            drop_entity_table(manager, order::Entity).await
        }
    }
}

mod m20240601_000005_create_wallet_tables {
    use super::{create_entity_table, drop_entity_table};
    use crate::entities::{wallet, wallet_transaction};
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000005_create_wallet_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            create_entity_table(manager, wallet::Entity).await?;
            create_entity_table(manager, wallet_transaction::Entity).await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_wallet_transactions_wallet_id")
                        .table(wallet_transaction::Entity)
                        .col(wallet_transaction::Column::WalletId)
                        .if_not_exists()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            drop_entity_table(manager, wallet_transaction::Entity).await?;
            drop_entity_table(manager, wallet::Entity).await
        }
    }
}

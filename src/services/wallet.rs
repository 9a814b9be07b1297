use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    entities::{
        wallet,
        wallet_transaction::{self, TransactionStatus, TransactionType},
    },
    errors::ServiceError,
};

#[derive(Debug, Clone, Serialize)]
pub struct WalletView {
    pub wallet_id: Uuid,
    pub balance: Decimal,
    /// Newest first
    pub transactions: Vec<wallet_transaction::Model>,
}

/// Returns the user's wallet, creating an empty one on first use.
pub async fn ensure_wallet<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
) -> Result<wallet::Model, ServiceError> {
    if let Some(existing) = wallet::Entity::find()
        .filter(wallet::Column::UserId.eq(user_id))
        .one(conn)
        .await?
    {
        return Ok(existing);
    }

    let now = Utc::now();
    let created = wallet::ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(user_id),
        balance: Set(Decimal::ZERO),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(conn)
    .await?;
    info!(%user_id, wallet_id = %created.id, "wallet created");
    Ok(created)
}

/// Appends a successful refund entry and raises the balance by `amount`.
/// Both writes go through `conn`, which callers make their order transaction.
pub async fn credit_refund<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
    order_id: Uuid,
    amount: Decimal,
    description: String,
) -> Result<wallet_transaction::Model, ServiceError> {
    if amount <= Decimal::ZERO {
        return Err(ServiceError::BadRequest(
            "Refund amount must be positive".into(),
        ));
    }
    let wallet = ensure_wallet(conn, user_id).await?;
    let now = Utc::now();

    let entry = wallet_transaction::ActiveModel {
        id: Set(Uuid::new_v4()),
        wallet_id: Set(wallet.id),
        user_id: Set(user_id),
        order_id: Set(Some(order_id)),
        amount: Set(amount),
        transaction_type: Set(TransactionType::Refund),
        status: Set(TransactionStatus::Success),
        description: Set(description),
        created_at: Set(now),
    }
    .insert(conn)
    .await?;

    wallet::Entity::update_many()
        .col_expr(
            wallet::Column::Balance,
            Expr::col(wallet::Column::Balance).add(amount),
        )
        .col_expr(wallet::Column::UpdatedAt, Expr::value(now))
        .filter(wallet::Column::Id.eq(wallet.id))
        .exec(conn)
        .await?;

    metrics::counter!("storefront.wallet.credits", 1);
    info!(%user_id, %order_id, %amount, "wallet credited with refund");
    Ok(entry)
}

#[derive(Clone)]
pub struct WalletService {
    db: Arc<DatabaseConnection>,
}

impl WalletService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[instrument(skip(self))]
    pub async fn get_wallet(&self, user_id: Uuid) -> Result<WalletView, ServiceError> {
        let wallet = ensure_wallet(&*self.db, user_id).await?;
        let transactions = wallet_transaction::Entity::find()
            .filter(wallet_transaction::Column::WalletId.eq(wallet.id))
            .order_by_desc(wallet_transaction::Column::CreatedAt)
            .all(&*self.db)
            .await?;

        Ok(WalletView {
            wallet_id: wallet.id,
            balance: wallet.balance,
            transactions,
        })
    }
}

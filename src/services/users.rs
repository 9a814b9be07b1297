use chrono::Utc;
use lazy_static::lazy_static;
use regex::Regex;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait,
    DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::{
    entities::{address, user},
    errors::ServiceError,
    PaginatedResponse,
};

lazy_static! {
    pub static ref NAME_RE: Regex = Regex::new(r"^[A-Za-z][A-Za-z ]*$").expect("valid regex");
    pub static ref PHONE_RE: Regex = Regex::new(r"^[6-9]\d{9}$").expect("valid regex");
    static ref PINCODE_RE: Regex = Regex::new(r"^\d{6}$").expect("valid regex");
}

pub fn validate_full_name(value: &str) -> Result<(), ValidationError> {
    if NAME_RE.is_match(value.trim()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("full_name");
        err.message = Some("Name may contain only letters and spaces".into());
        Err(err)
    }
}

pub fn validate_phone(value: &str) -> Result<(), ValidationError> {
    if PHONE_RE.is_match(value) {
        Ok(())
    } else {
        let mut err = ValidationError::new("phone");
        err.message = Some("Phone must be 10 digits starting with 6-9".into());
        Err(err)
    }
}

fn validate_pincode(value: &str) -> Result<(), ValidationError> {
    if PINCODE_RE.is_match(value) {
        Ok(())
    } else {
        let mut err = ValidationError::new("pincode");
        err.message = Some("Pincode must be 6 digits".into());
        Err(err)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct UpdateProfileRequest {
    #[validate(length(min = 2, max = 60), custom = "validate_full_name")]
    pub full_name: Option<String>,
    #[validate(custom = "validate_phone")]
    pub phone: Option<String>,
}

/// Address payload; also the frozen shipping snapshot stored on orders
#[derive(Debug, Clone, Deserialize, Serialize, Validate, PartialEq, Eq)]
pub struct AddressInput {
    #[validate(length(min = 2, max = 60), custom = "validate_full_name")]
    pub full_name: String,
    #[validate(custom = "validate_phone")]
    pub phone: String,
    #[validate(length(min = 3, max = 200))]
    pub line1: String,
    #[serde(default)]
    #[validate(length(max = 200))]
    pub line2: Option<String>,
    #[validate(length(min = 2, max = 80))]
    pub city: String,
    #[validate(length(min = 2, max = 80))]
    pub state: String,
    #[validate(custom = "validate_pincode")]
    pub pincode: String,
    #[serde(default = "default_country")]
    pub country: String,
}

fn default_country() -> String {
    "India".to_string()
}

impl From<&address::Model> for AddressInput {
    fn from(model: &address::Model) -> Self {
        Self {
            full_name: model.full_name.clone(),
            phone: model.phone.clone(),
            line1: model.line1.clone(),
            line2: model.line2.clone(),
            city: model.city.clone(),
            state: model.state.clone(),
            pincode: model.pincode.clone(),
            country: model.country.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct CreateAddressRequest {
    #[serde(flatten)]
    #[validate]
    pub address: AddressInput,
    #[serde(default)]
    pub is_default: bool,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate)]
pub struct UpdateAddressRequest {
    #[validate(length(min = 2, max = 60), custom = "validate_full_name")]
    pub full_name: Option<String>,
    #[validate(custom = "validate_phone")]
    pub phone: Option<String>,
    #[validate(length(min = 3, max = 200))]
    pub line1: Option<String>,
    #[validate(length(max = 200))]
    pub line2: Option<String>,
    #[validate(length(min = 2, max = 80))]
    pub city: Option<String>,
    #[validate(length(min = 2, max = 80))]
    pub state: Option<String>,
    #[validate(custom = "validate_pincode")]
    pub pincode: Option<String>,
    pub country: Option<String>,
    pub is_default: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserListQuery {
    pub search: Option<String>,
}

async fn clear_default_address<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
) -> Result<(), ServiceError> {
    address::Entity::update_many()
        .col_expr(address::Column::IsDefault, Expr::value(false))
        .filter(address::Column::UserId.eq(user_id))
        .filter(address::Column::IsDefault.eq(true))
        .exec(conn)
        .await?;
    Ok(())
}

/// Loads an address owned by `user_id`.
pub async fn owned_address<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
    address_id: Uuid,
) -> Result<address::Model, ServiceError> {
    let found = address::Entity::find_by_id(address_id)
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound("Address not found".into()))?;
    if found.user_id != user_id {
        return Err(ServiceError::Forbidden(
            "Address belongs to another account".into(),
        ));
    }
    Ok(found)
}

#[derive(Clone)]
pub struct UserService {
    db: Arc<DatabaseConnection>,
}

impl UserService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn get_profile(&self, user_id: Uuid) -> Result<user::Model, ServiceError> {
        user::Entity::find_by_id(user_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("User not found".into()))
    }

    #[instrument(skip(self, request))]
    pub async fn update_profile(
        &self,
        user_id: Uuid,
        request: UpdateProfileRequest,
    ) -> Result<user::Model, ServiceError> {
        request.validate()?;
        let existing = self.get_profile(user_id).await?;
        let mut model: user::ActiveModel = existing.into();
        if let Some(full_name) = request.full_name {
            model.full_name = Set(full_name.trim().to_string());
        }
        if let Some(phone) = request.phone {
            model.phone = Set(Some(phone));
        }
        model.updated_at = Set(Utc::now());
        let updated = model.update(&*self.db).await?;
        info!(%user_id, "profile updated");
        Ok(updated)
    }

    pub async fn list_addresses(&self, user_id: Uuid) -> Result<Vec<address::Model>, ServiceError> {
        Ok(address::Entity::find()
            .filter(address::Column::UserId.eq(user_id))
            .order_by_desc(address::Column::IsDefault)
            .order_by_desc(address::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }

    /// The first address a user saves becomes the default.
    #[instrument(skip(self, request))]
    pub async fn add_address(
        &self,
        user_id: Uuid,
        request: CreateAddressRequest,
    ) -> Result<address::Model, ServiceError> {
        request.validate()?;
        let txn = self.db.begin().await?;

        let has_any = address::Entity::find()
            .filter(address::Column::UserId.eq(user_id))
            .count(&txn)
            .await?
            > 0;
        let is_default = request.is_default || !has_any;
        if is_default {
            clear_default_address(&txn, user_id).await?;
        }

        let now = Utc::now();
        let input = request.address;
        let created = address::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            full_name: Set(input.full_name.trim().to_string()),
            phone: Set(input.phone),
            line1: Set(input.line1),
            line2: Set(input.line2),
            city: Set(input.city),
            state: Set(input.state),
            pincode: Set(input.pincode),
            country: Set(input.country),
            is_default: Set(is_default),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        txn.commit().await?;
        info!(%user_id, address_id = %created.id, "address added");
        Ok(created)
    }

    #[instrument(skip(self, patch))]
    pub async fn update_address(
        &self,
        user_id: Uuid,
        address_id: Uuid,
        patch: UpdateAddressRequest,
    ) -> Result<address::Model, ServiceError> {
        patch.validate()?;
        let txn = self.db.begin().await?;
        let existing = owned_address(&txn, user_id, address_id).await?;

        if patch.is_default == Some(true) && !existing.is_default {
            clear_default_address(&txn, user_id).await?;
        }

        let mut model: address::ActiveModel = existing.into();
        if let Some(v) = patch.full_name {
            model.full_name = Set(v.trim().to_string());
        }
        if let Some(v) = patch.phone {
            model.phone = Set(v);
        }
        if let Some(v) = patch.line1 {
            model.line1 = Set(v);
        }
        if let Some(v) = patch.line2 {
            model.line2 = Set(Some(v));
        }
        if let Some(v) = patch.city {
            model.city = Set(v);
        }
        if let Some(v) = patch.state {
            model.state = Set(v);
        }
        if let Some(v) = patch.pincode {
            model.pincode = Set(v);
        }
        if let Some(v) = patch.country {
            model.country = Set(v);
        }
        if let Some(v) = patch.is_default {
            model.is_default = Set(v);
        }
        model.updated_at = Set(Utc::now());

        let updated = model.update(&txn).await?;
        txn.commit().await?;
        Ok(updated)
    }

    #[instrument(skip(self))]
    pub async fn delete_address(&self, user_id: Uuid, address_id: Uuid) -> Result<(), ServiceError> {
        let existing = owned_address(&*self.db, user_id, address_id).await?;
        address::Entity::delete_by_id(existing.id)
            .exec(&*self.db)
            .await?;
        info!(%user_id, %address_id, "address deleted");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn list_users(
        &self,
        query: UserListQuery,
        page: u64,
        limit: u64,
    ) -> Result<PaginatedResponse<user::Model>, ServiceError> {
        let mut select = user::Entity::find().order_by_desc(user::Column::CreatedAt);
        if let Some(term) = query.search.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            select = select.filter(
                Condition::any()
                    .add(user::Column::FullName.contains(term))
                    .add(user::Column::Email.contains(term))
                    .add(user::Column::Username.contains(term)),
            );
        }
        let paginator = select.paginate(&*self.db, limit);
        let total = paginator.num_items().await?;
        let items = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok(PaginatedResponse::new(items, total, page, limit))
    }

    /// Block (`false`) or unblock (`true`) a customer account.
    #[instrument(skip(self))]
    pub async fn set_user_active(&self, user_id: Uuid, active: bool) -> Result<user::Model, ServiceError> {
        let existing = self.get_profile(user_id).await?;
        let mut model: user::ActiveModel = existing.into();
        model.is_active = Set(active);
        model.updated_at = Set(Utc::now());
        let updated = model.update(&*self.db).await?;
        info!(%user_id, is_active = active, "user status changed");
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_and_phone_rules() {
        assert!(validate_full_name("Asha Rao").is_ok());
        assert!(validate_full_name("Asha R4o").is_err());
        assert!(validate_full_name(" ").is_err());
        assert!(validate_phone("9876543210").is_ok());
        assert!(validate_phone("5876543210").is_err());
        assert!(validate_phone("98765").is_err());
    }

    #[test]
    fn address_validation() {
        let good = AddressInput {
            full_name: "Asha Rao".into(),
            phone: "9876543210".into(),
            line1: "12 MG Road".into(),
            line2: None,
            city: "Bengaluru".into(),
            state: "Karnataka".into(),
            pincode: "560001".into(),
            country: "India".into(),
        };
        assert!(good.validate().is_ok());
        let bad = AddressInput {
            pincode: "5600".into(),
            ..good
        };
        assert!(bad.validate().is_err());
    }
}

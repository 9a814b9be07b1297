use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One live OTP per email. `otp_hash` is cleared once the code is consumed;
/// rows past `record_expires_at` are treated as absent and purged.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "otp_records")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub email: String,
    pub purpose: OtpPurpose,
    #[sea_orm(nullable)]
    pub otp_hash: Option<String>,
    pub attempts: i32,
    pub otp_expires_at: DateTime<Utc>,
    pub record_expires_at: DateTime<Utc>,
    /// Password-reset codes stay on file, verified, until the new password lands
    pub verified: bool,
    /// Signup payload materialized into a user after verification
    #[sea_orm(column_type = "Json", nullable)]
    pub pending_user: Option<Json>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
pub enum OtpPurpose {
    #[sea_orm(string_value = "signup")]
    Signup,
    #[sea_orm(string_value = "password_reset")]
    PasswordReset,
}

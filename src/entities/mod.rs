//! sea-orm entities for the storefront schema.

pub mod address;
pub mod admin;
pub mod brand;
pub mod cart;
pub mod cart_item;
pub mod coupon;
pub mod order;
pub mod order_item;
pub mod otp_record;
pub mod pending_checkout;
pub mod product;
pub mod series;
pub mod user;
pub mod user_coupon;
pub mod wallet;
pub mod wallet_transaction;
pub mod wishlist;
pub mod wishlist_item;

use serde::{Deserialize, Serialize};

/// Reference to an uploaded image held by the asset store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageAsset {
    pub url: String,
    pub public_id: String,
}

impl ImageAsset {
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({ "url": self.url, "public_id": self.public_id })
    }

    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }

    /// Reads a JSON array column, skipping malformed entries.
    pub fn list_from_json(value: &serde_json::Value) -> Vec<Self> {
        value
            .as_array()
            .map(|items| items.iter().filter_map(Self::from_json).collect())
            .unwrap_or_default()
    }

    pub fn list_to_json(assets: &[ImageAsset]) -> serde_json::Value {
        serde_json::Value::Array(assets.iter().map(ImageAsset::to_json).collect())
    }
}

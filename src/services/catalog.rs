//! Brands, series and products: admin CRUD plus the public shop queries.
//!
//! Image handling follows one ordering everywhere:
//! 1. validate the request and check uniqueness (reads only),
//! 2. upload the new assets,
//! 3. write the row; if the write fails the fresh uploads are destroyed,
//! 4. after the write succeeds, destroy the assets it replaced. Failures here
//!    are logged and never undo the committed row.

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::{
    entities::{brand, product, series, ImageAsset},
    errors::ServiceError,
    integrations::{AssetStore, ImageUpload},
    services::pricing::{apply_offer, load_with_parents, ProductWithParents},
    PaginatedResponse,
};

pub const MAX_PRODUCT_IMAGES: usize = 5;

fn name_key(name: &str) -> String {
    name.trim().to_lowercase()
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct CreateBrandRequest {
    #[validate(length(min = 2, max = 80, message = "Name must be 2-80 characters"))]
    pub name: String,
    #[serde(default)]
    #[validate(length(max = 2000))]
    pub description: String,
    #[serde(default)]
    #[validate(range(min = 0, max = 100, message = "Offer must be between 0 and 100"))]
    pub offer: i32,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate)]
pub struct UpdateBrandRequest {
    #[validate(length(min = 2, max = 80, message = "Name must be 2-80 characters"))]
    pub name: Option<String>,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    #[validate(range(min = 0, max = 100, message = "Offer must be between 0 and 100"))]
    pub offer: Option<i32>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Default)]
pub struct BrandImages {
    pub logo: Option<ImageUpload>,
    pub banner: Option<ImageUpload>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct CreateSeriesRequest {
    pub brand_id: Uuid,
    #[validate(length(min = 2, max = 80, message = "Name must be 2-80 characters"))]
    pub name: String,
    #[serde(default)]
    #[validate(length(max = 2000))]
    pub description: String,
    #[serde(default)]
    #[validate(range(min = 0, max = 100, message = "Offer must be between 0 and 100"))]
    pub offer: i32,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate)]
pub struct UpdateSeriesRequest {
    #[validate(length(min = 2, max = 80, message = "Name must be 2-80 characters"))]
    pub name: Option<String>,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    #[validate(range(min = 0, max = 100, message = "Offer must be between 0 and 100"))]
    pub offer: Option<i32>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Default)]
pub struct SeriesImages {
    pub card_image: Option<ImageUpload>,
    pub banner: Option<ImageUpload>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct CreateProductRequest {
    #[validate(length(min = 2, max = 120, message = "Name must be 2-120 characters"))]
    pub name: String,
    #[serde(default)]
    #[validate(length(max = 5000))]
    pub description: String,
    pub price: Decimal,
    #[validate(range(min = 0, message = "Stock cannot be negative"))]
    pub stock: i32,
    #[serde(default)]
    #[validate(range(min = 0, max = 100, message = "Offer must be between 0 and 100"))]
    pub offer: i32,
    pub brand_id: Uuid,
    pub series_id: Uuid,
    #[serde(default)]
    pub is_featured: bool,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate)]
pub struct UpdateProductRequest {
    #[validate(length(min = 2, max = 120, message = "Name must be 2-120 characters"))]
    pub name: Option<String>,
    #[validate(length(max = 5000))]
    pub description: Option<String>,
    pub price: Option<Decimal>,
    #[validate(range(min = 0, message = "Stock cannot be negative"))]
    pub stock: Option<i32>,
    #[validate(range(min = 0, max = 100, message = "Offer must be between 0 and 100"))]
    pub offer: Option<i32>,
    pub brand_id: Option<Uuid>,
    pub series_id: Option<Uuid>,
    pub is_active: Option<bool>,
    pub is_featured: Option<bool>,
    /// `public_id`s of current images to drop
    #[serde(default)]
    pub remove_images: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductSort {
    #[default]
    Newest,
    PriceAsc,
    PriceDesc,
    NameAsc,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ShopQuery {
    pub brand: Option<Uuid>,
    pub series: Option<Uuid>,
    pub featured: Option<bool>,
    pub search: Option<String>,
    #[serde(default)]
    pub sort: ProductSort,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AdminCatalogQuery {
    pub search: Option<String>,
    pub brand: Option<Uuid>,
    pub series: Option<Uuid>,
}

/// Product as shown to shoppers, with its effective offer applied
#[derive(Debug, Clone, Serialize)]
pub struct ShopProduct {
    #[serde(flatten)]
    pub product: product::Model,
    pub brand_name: Option<String>,
    pub series_name: Option<String>,
    pub offer_percent: i32,
    pub offer_price: Decimal,
    pub in_stock: bool,
}

impl From<ProductWithParents> for ShopProduct {
    fn from(entry: ProductWithParents) -> Self {
        let offer_percent = entry.offer_percent();
        Self {
            brand_name: entry.brand.map(|b| b.name),
            series_name: entry.series.map(|s| s.name),
            offer_price: apply_offer(entry.product.price, offer_percent),
            in_stock: entry.product.stock > 0,
            offer_percent,
            product: entry.product,
        }
    }
}

fn non_empty(term: &Option<String>) -> Option<&str> {
    term.as_deref().map(str::trim).filter(|t| !t.is_empty())
}

#[derive(Clone)]
pub struct CatalogService {
    db: Arc<DatabaseConnection>,
    assets: Arc<dyn AssetStore>,
}

impl CatalogService {
    pub fn new(db: Arc<DatabaseConnection>, assets: Arc<dyn AssetStore>) -> Self {
        Self { db, assets }
    }

    /// Uploads every image or none: a failure destroys what was already stored.
    async fn upload_all(&self, uploads: Vec<ImageUpload>) -> Result<Vec<ImageAsset>, ServiceError> {
        let mut stored = Vec::with_capacity(uploads.len());
        for upload in uploads {
            match self.assets.upload(upload).await {
                Ok(asset) => stored.push(asset),
                Err(e) => {
                    error!(error = %e, "image upload failed");
                    self.discard(&stored).await;
                    return Err(e);
                }
            }
        }
        Ok(stored)
    }

    async fn upload_optional(
        &self,
        upload: Option<ImageUpload>,
    ) -> Result<Option<ImageAsset>, ServiceError> {
        match upload {
            Some(image) => Ok(self.upload_all(vec![image]).await?.pop()),
            None => Ok(None),
        }
    }

    /// Best-effort removal from the asset store.
    async fn discard(&self, assets: &[ImageAsset]) {
        for asset in assets {
            if let Err(e) = self.assets.destroy(&asset.public_id).await {
                warn!(public_id = %asset.public_id, error = %e, "failed to delete image asset");
            }
        }
    }

    // ---- brands ----

    async fn ensure_brand_name_free(&self, key: &str, except: Option<Uuid>) -> Result<(), ServiceError> {
        let mut query = brand::Entity::find().filter(brand::Column::NameKey.eq(key));
        if let Some(id) = except {
            query = query.filter(brand::Column::Id.ne(id));
        }
        if query.one(&*self.db).await?.is_some() {
            return Err(ServiceError::Conflict("Brand name already exists".into()));
        }
        Ok(())
    }

    pub async fn get_brand(&self, id: Uuid) -> Result<brand::Model, ServiceError> {
        brand::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Brand not found".into()))
    }

    #[instrument(skip(self))]
    pub async fn list_brands(
        &self,
        query: AdminCatalogQuery,
        page: u64,
        limit: u64,
    ) -> Result<PaginatedResponse<brand::Model>, ServiceError> {
        let mut select = brand::Entity::find().order_by_desc(brand::Column::CreatedAt);
        if let Some(term) = non_empty(&query.search) {
            select = select.filter(brand::Column::NameKey.contains(term.to_lowercase()));
        }
        let paginator = select.paginate(&*self.db, limit);
        let total = paginator.num_items().await?;
        let items = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok(PaginatedResponse::new(items, total, page, limit))
    }

    #[instrument(skip(self, request, images), fields(name = %request.name))]
    pub async fn create_brand(
        &self,
        request: CreateBrandRequest,
        images: BrandImages,
    ) -> Result<brand::Model, ServiceError> {
        request.validate()?;
        let key = name_key(&request.name);
        self.ensure_brand_name_free(&key, None).await?;
        let Some(logo_upload) = images.logo else {
            return Err(ServiceError::ValidationError("Brand logo is required".into()));
        };

        let logo = self.upload_optional(Some(logo_upload)).await?;
        let banner = match self.upload_optional(images.banner).await {
            Ok(banner) => banner,
            Err(e) => {
                self.discard(logo.as_slice()).await;
                return Err(e);
            }
        };

        let now = Utc::now();
        let model = brand::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(request.name.trim().to_string()),
            name_key: Set(key),
            description: Set(request.description),
            offer: Set(request.offer),
            is_active: Set(true),
            logo: Set(logo.as_ref().map(ImageAsset::to_json)),
            banner: Set(banner.as_ref().map(ImageAsset::to_json)),
            created_at: Set(now),
            updated_at: Set(now),
        };
        match model.insert(&*self.db).await {
            Ok(created) => {
                info!(brand_id = %created.id, "brand created");
                Ok(created)
            }
            Err(e) => {
                let fresh: Vec<ImageAsset> = logo.into_iter().chain(banner).collect();
                self.discard(&fresh).await;
                Err(e.into())
            }
        }
    }

    #[instrument(skip(self, patch, images))]
    pub async fn update_brand(
        &self,
        id: Uuid,
        patch: UpdateBrandRequest,
        images: BrandImages,
    ) -> Result<brand::Model, ServiceError> {
        patch.validate()?;
        let existing = self.get_brand(id).await?;
        let new_key = patch.name.as_deref().map(name_key);
        if let Some(key) = new_key.as_deref() {
            self.ensure_brand_name_free(key, Some(id)).await?;
        }

        let logo = self.upload_optional(images.logo).await?;
        let banner = match self.upload_optional(images.banner).await {
            Ok(banner) => banner,
            Err(e) => {
                self.discard(logo.as_slice()).await;
                return Err(e);
            }
        };

        let mut replaced = Vec::new();
        let mut model: brand::ActiveModel = existing.clone().into();
        if let (Some(name), Some(key)) = (patch.name, new_key) {
            model.name = Set(name.trim().to_string());
            model.name_key = Set(key);
        }
        if let Some(description) = patch.description {
            model.description = Set(description);
        }
        if let Some(offer) = patch.offer {
            model.offer = Set(offer);
        }
        if let Some(active) = patch.is_active {
            model.is_active = Set(active);
        }
        if let Some(asset) = &logo {
            model.logo = Set(Some(asset.to_json()));
            replaced.extend(existing.logo.as_ref().and_then(ImageAsset::from_json));
        }
        if let Some(asset) = &banner {
            model.banner = Set(Some(asset.to_json()));
            replaced.extend(existing.banner.as_ref().and_then(ImageAsset::from_json));
        }
        model.updated_at = Set(Utc::now());

        match model.update(&*self.db).await {
            Ok(updated) => {
                self.discard(&replaced).await;
                info!(brand_id = %id, "brand updated");
                Ok(updated)
            }
            Err(e) => {
                let fresh: Vec<ImageAsset> = logo.into_iter().chain(banner).collect();
                self.discard(&fresh).await;
                Err(e.into())
            }
        }
    }

    #[instrument(skip(self))]
    pub async fn toggle_brand(&self, id: Uuid) -> Result<brand::Model, ServiceError> {
        let existing = self.get_brand(id).await?;
        let next = !existing.is_active;
        let mut model: brand::ActiveModel = existing.into();
        model.is_active = Set(next);
        model.updated_at = Set(Utc::now());
        let updated = model.update(&*self.db).await?;
        info!(brand_id = %id, is_active = next, "brand status toggled");
        Ok(updated)
    }

    // ---- series ----

    async fn ensure_series_name_free(
        &self,
        brand_id: Uuid,
        key: &str,
        except: Option<Uuid>,
    ) -> Result<(), ServiceError> {
        let mut query = series::Entity::find()
            .filter(series::Column::BrandId.eq(brand_id))
            .filter(series::Column::NameKey.eq(key));
        if let Some(id) = except {
            query = query.filter(series::Column::Id.ne(id));
        }
        if query.one(&*self.db).await?.is_some() {
            return Err(ServiceError::Conflict(
                "Series name already exists for this brand".into(),
            ));
        }
        Ok(())
    }

    pub async fn get_series(&self, id: Uuid) -> Result<series::Model, ServiceError> {
        series::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Series not found".into()))
    }

    #[instrument(skip(self))]
    pub async fn list_series(
        &self,
        query: AdminCatalogQuery,
        page: u64,
        limit: u64,
    ) -> Result<PaginatedResponse<series::Model>, ServiceError> {
        let mut select = series::Entity::find().order_by_desc(series::Column::CreatedAt);
        if let Some(brand_id) = query.brand {
            select = select.filter(series::Column::BrandId.eq(brand_id));
        }
        if let Some(term) = non_empty(&query.search) {
            select = select.filter(series::Column::NameKey.contains(term.to_lowercase()));
        }
        let paginator = select.paginate(&*self.db, limit);
        let total = paginator.num_items().await?;
        let items = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok(PaginatedResponse::new(items, total, page, limit))
    }

    #[instrument(skip(self, request, images), fields(name = %request.name))]
    pub async fn create_series(
        &self,
        request: CreateSeriesRequest,
        images: SeriesImages,
    ) -> Result<series::Model, ServiceError> {
        request.validate()?;
        self.get_brand(request.brand_id).await?;
        let key = name_key(&request.name);
        self.ensure_series_name_free(request.brand_id, &key, None).await?;
        let Some(card_upload) = images.card_image else {
            return Err(ServiceError::ValidationError(
                "Series card image is required".into(),
            ));
        };

        let card_image = self.upload_optional(Some(card_upload)).await?;
        let banner = match self.upload_optional(images.banner).await {
            Ok(banner) => banner,
            Err(e) => {
                self.discard(card_image.as_slice()).await;
                return Err(e);
            }
        };

        let now = Utc::now();
        let model = series::ActiveModel {
            id: Set(Uuid::new_v4()),
            brand_id: Set(request.brand_id),
            name: Set(request.name.trim().to_string()),
            name_key: Set(key),
            description: Set(request.description),
            offer: Set(request.offer),
            is_active: Set(true),
            card_image: Set(card_image.as_ref().map(ImageAsset::to_json)),
            banner: Set(banner.as_ref().map(ImageAsset::to_json)),
            created_at: Set(now),
            updated_at: Set(now),
        };
        match model.insert(&*self.db).await {
            Ok(created) => {
                info!(series_id = %created.id, brand_id = %created.brand_id, "series created");
                Ok(created)
            }
            Err(e) => {
                let fresh: Vec<ImageAsset> = card_image.into_iter().chain(banner).collect();
                self.discard(&fresh).await;
                Err(e.into())
            }
        }
    }

    #[instrument(skip(self, patch, images))]
    pub async fn update_series(
        &self,
        id: Uuid,
        patch: UpdateSeriesRequest,
        images: SeriesImages,
    ) -> Result<series::Model, ServiceError> {
        patch.validate()?;
        let existing = self.get_series(id).await?;
        let new_key = patch.name.as_deref().map(name_key);
        if let Some(key) = new_key.as_deref() {
            self.ensure_series_name_free(existing.brand_id, key, Some(id))
                .await?;
        }

        let card_image = self.upload_optional(images.card_image).await?;
        let banner = match self.upload_optional(images.banner).await {
            Ok(banner) => banner,
            Err(e) => {
                self.discard(card_image.as_slice()).await;
                return Err(e);
            }
        };

        let mut replaced = Vec::new();
        let mut model: series::ActiveModel = existing.clone().into();
        if let (Some(name), Some(key)) = (patch.name, new_key) {
            model.name = Set(name.trim().to_string());
            model.name_key = Set(key);
        }
        if let Some(description) = patch.description {
            model.description = Set(description);
        }
        if let Some(offer) = patch.offer {
            model.offer = Set(offer);
        }
        if let Some(active) = patch.is_active {
            model.is_active = Set(active);
        }
        if let Some(asset) = &card_image {
            model.card_image = Set(Some(asset.to_json()));
            replaced.extend(existing.card_image.as_ref().and_then(ImageAsset::from_json));
        }
        if let Some(asset) = &banner {
            model.banner = Set(Some(asset.to_json()));
            replaced.extend(existing.banner.as_ref().and_then(ImageAsset::from_json));
        }
        model.updated_at = Set(Utc::now());

        match model.update(&*self.db).await {
            Ok(updated) => {
                self.discard(&replaced).await;
                info!(series_id = %id, "series updated");
                Ok(updated)
            }
            Err(e) => {
                let fresh: Vec<ImageAsset> = card_image.into_iter().chain(banner).collect();
                self.discard(&fresh).await;
                Err(e.into())
            }
        }
    }

    #[instrument(skip(self))]
    pub async fn toggle_series(&self, id: Uuid) -> Result<series::Model, ServiceError> {
        let existing = self.get_series(id).await?;
        let next = !existing.is_active;
        let mut model: series::ActiveModel = existing.into();
        model.is_active = Set(next);
        model.updated_at = Set(Utc::now());
        let updated = model.update(&*self.db).await?;
        info!(series_id = %id, is_active = next, "series status toggled");
        Ok(updated)
    }

    // ---- products ----

    /// The series must exist and belong to the brand.
    async fn check_parents(&self, brand_id: Uuid, series_id: Uuid) -> Result<(), ServiceError> {
        self.get_brand(brand_id).await?;
        let series = self.get_series(series_id).await?;
        if series.brand_id != brand_id {
            return Err(ServiceError::BadRequest(
                "Series does not belong to the selected brand".into(),
            ));
        }
        Ok(())
    }

    pub async fn get_product(&self, id: Uuid) -> Result<product::Model, ServiceError> {
        product::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Product not found".into()))
    }

    #[instrument(skip(self))]
    pub async fn list_products(
        &self,
        query: AdminCatalogQuery,
        page: u64,
        limit: u64,
    ) -> Result<PaginatedResponse<product::Model>, ServiceError> {
        let mut select = product::Entity::find().order_by_desc(product::Column::CreatedAt);
        if let Some(brand_id) = query.brand {
            select = select.filter(product::Column::BrandId.eq(brand_id));
        }
        if let Some(series_id) = query.series {
            select = select.filter(product::Column::SeriesId.eq(series_id));
        }
        if let Some(term) = non_empty(&query.search) {
            select = select.filter(product::Column::Name.contains(term));
        }
        let paginator = select.paginate(&*self.db, limit);
        let total = paginator.num_items().await?;
        let items = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok(PaginatedResponse::new(items, total, page, limit))
    }

    #[instrument(skip(self, request, images), fields(name = %request.name))]
    pub async fn create_product(
        &self,
        request: CreateProductRequest,
        images: Vec<ImageUpload>,
    ) -> Result<product::Model, ServiceError> {
        request.validate()?;
        if request.price <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Price must be greater than zero".into(),
            ));
        }
        if images.is_empty() {
            return Err(ServiceError::ValidationError(
                "At least one product image is required".into(),
            ));
        }
        if images.len() > MAX_PRODUCT_IMAGES {
            return Err(ServiceError::ValidationError(format!(
                "A product can have at most {} images",
                MAX_PRODUCT_IMAGES
            )));
        }
        self.check_parents(request.brand_id, request.series_id).await?;

        let stored = self.upload_all(images).await?;
        let now = Utc::now();
        let model = product::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(request.name.trim().to_string()),
            description: Set(request.description),
            price: Set(request.price),
            stock: Set(request.stock),
            offer: Set(request.offer),
            brand_id: Set(request.brand_id),
            series_id: Set(request.series_id),
            is_active: Set(true),
            is_featured: Set(request.is_featured),
            images: Set(ImageAsset::list_to_json(&stored)),
            created_at: Set(now),
            updated_at: Set(now),
        };
        match model.insert(&*self.db).await {
            Ok(created) => {
                info!(product_id = %created.id, "product created");
                Ok(created)
            }
            Err(e) => {
                self.discard(&stored).await;
                Err(e.into())
            }
        }
    }

    #[instrument(skip(self, patch, images))]
    pub async fn update_product(
        &self,
        id: Uuid,
        patch: UpdateProductRequest,
        images: Vec<ImageUpload>,
    ) -> Result<product::Model, ServiceError> {
        patch.validate()?;
        if matches!(patch.price, Some(p) if p <= Decimal::ZERO) {
            return Err(ServiceError::ValidationError(
                "Price must be greater than zero".into(),
            ));
        }
        let existing = self.get_product(id).await?;
        let brand_id = patch.brand_id.unwrap_or(existing.brand_id);
        let series_id = patch.series_id.unwrap_or(existing.series_id);
        if brand_id != existing.brand_id || series_id != existing.series_id {
            self.check_parents(brand_id, series_id).await?;
        }

        let current = ImageAsset::list_from_json(&existing.images);
        let (removed, kept): (Vec<_>, Vec<_>) = current
            .into_iter()
            .partition(|asset| patch.remove_images.contains(&asset.public_id));
        let final_count = kept.len() + images.len();
        if final_count == 0 {
            return Err(ServiceError::ValidationError(
                "A product must keep at least one image".into(),
            ));
        }
        if final_count > MAX_PRODUCT_IMAGES {
            return Err(ServiceError::ValidationError(format!(
                "A product can have at most {} images",
                MAX_PRODUCT_IMAGES
            )));
        }

        let fresh = self.upload_all(images).await?;
        let all_images: Vec<ImageAsset> = kept.into_iter().chain(fresh.iter().cloned()).collect();

        let mut model: product::ActiveModel = existing.into();
        if let Some(name) = patch.name {
            model.name = Set(name.trim().to_string());
        }
        if let Some(description) = patch.description {
            model.description = Set(description);
        }
        if let Some(price) = patch.price {
            model.price = Set(price);
        }
        if let Some(stock) = patch.stock {
            model.stock = Set(stock);
        }
        if let Some(offer) = patch.offer {
            model.offer = Set(offer);
        }
        if let Some(active) = patch.is_active {
            model.is_active = Set(active);
        }
        if let Some(featured) = patch.is_featured {
            model.is_featured = Set(featured);
        }
        model.brand_id = Set(brand_id);
        model.series_id = Set(series_id);
        model.images = Set(ImageAsset::list_to_json(&all_images));
        model.updated_at = Set(Utc::now());

        match model.update(&*self.db).await {
            Ok(updated) => {
                self.discard(&removed).await;
                info!(product_id = %id, "product updated");
                Ok(updated)
            }
            Err(e) => {
                self.discard(&fresh).await;
                Err(e.into())
            }
        }
    }

    #[instrument(skip(self))]
    pub async fn toggle_product(&self, id: Uuid) -> Result<product::Model, ServiceError> {
        let existing = self.get_product(id).await?;
        let next = !existing.is_active;
        let mut model: product::ActiveModel = existing.into();
        model.is_active = Set(next);
        model.updated_at = Set(Utc::now());
        let updated = model.update(&*self.db).await?;
        info!(product_id = %id, is_active = next, "product status toggled");
        Ok(updated)
    }

    // ---- shop ----

    /// Active products whose brand and series are active too.
    fn visible_products() -> sea_orm::Select<product::Entity> {
        product::Entity::find()
            .inner_join(brand::Entity)
            .inner_join(series::Entity)
            .filter(product::Column::IsActive.eq(true))
            .filter(brand::Column::IsActive.eq(true))
            .filter(series::Column::IsActive.eq(true))
    }

    async fn decorate(&self, products: Vec<product::Model>) -> Result<Vec<ShopProduct>, ServiceError> {
        let ids: Vec<Uuid> = products.iter().map(|p| p.id).collect();
        let mut loaded = load_with_parents(&*self.db, &ids).await?;
        Ok(ids
            .iter()
            .filter_map(|id| loaded.remove(id))
            .map(ShopProduct::from)
            .collect())
    }

    #[instrument(skip(self))]
    pub async fn shop_products(
        &self,
        query: ShopQuery,
        page: u64,
        limit: u64,
    ) -> Result<PaginatedResponse<ShopProduct>, ServiceError> {
        let mut select = Self::visible_products();
        if let Some(brand_id) = query.brand {
            select = select.filter(product::Column::BrandId.eq(brand_id));
        }
        if let Some(series_id) = query.series {
            select = select.filter(product::Column::SeriesId.eq(series_id));
        }
        if let Some(featured) = query.featured {
            select = select.filter(product::Column::IsFeatured.eq(featured));
        }
        if let Some(term) = non_empty(&query.search) {
            select = select.filter(
                Condition::any()
                    .add(product::Column::Name.contains(term))
                    .add(brand::Column::Name.contains(term))
                    .add(series::Column::Name.contains(term)),
            );
        }
        select = match query.sort {
            ProductSort::Newest => select.order_by_desc(product::Column::CreatedAt),
            ProductSort::PriceAsc => select.order_by_asc(product::Column::Price),
            ProductSort::PriceDesc => select.order_by_desc(product::Column::Price),
            ProductSort::NameAsc => select.order_by_asc(product::Column::Name),
        };

        let paginator = select.paginate(&*self.db, limit);
        let total = paginator.num_items().await?;
        let products = paginator.fetch_page(page.saturating_sub(1)).await?;
        let items = self.decorate(products).await?;
        Ok(PaginatedResponse::new(items, total, page, limit))
    }

    pub async fn shop_product(&self, id: Uuid) -> Result<ShopProduct, ServiceError> {
        let found = Self::visible_products()
            .filter(product::Column::Id.eq(id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Product not found".into()))?;
        self.decorate(vec![found])
            .await?
            .pop()
            .ok_or_else(|| ServiceError::NotFound("Product not found".into()))
    }

    /// Visible products from the same series or brand, excluding `id`.
    #[instrument(skip(self))]
    pub async fn related_products(&self, id: Uuid, limit: u64) -> Result<Vec<ShopProduct>, ServiceError> {
        let current = self.get_product(id).await?;
        let related = Self::visible_products()
            .filter(product::Column::Id.ne(id))
            .filter(
                Condition::any()
                    .add(product::Column::SeriesId.eq(current.series_id))
                    .add(product::Column::BrandId.eq(current.brand_id)),
            )
            .order_by_desc(product::Column::IsFeatured)
            .order_by_desc(product::Column::CreatedAt)
            .limit(limit)
            .all(&*self.db)
            .await?;
        self.decorate(related).await
    }

    pub async fn shop_brands(&self) -> Result<Vec<brand::Model>, ServiceError> {
        Ok(brand::Entity::find()
            .filter(brand::Column::IsActive.eq(true))
            .order_by_asc(brand::Column::Name)
            .all(&*self.db)
            .await?)
    }

    pub async fn shop_series(&self, brand_id: Option<Uuid>) -> Result<Vec<series::Model>, ServiceError> {
        let mut select = series::Entity::find()
            .inner_join(brand::Entity)
            .filter(series::Column::IsActive.eq(true))
            .filter(brand::Column::IsActive.eq(true))
            .order_by_asc(series::Column::Name);
        if let Some(brand_id) = brand_id {
            select = select.filter(series::Column::BrandId.eq(brand_id));
        }
        Ok(select.all(&*self.db).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_keys_ignore_case_and_padding() {
        assert_eq!(name_key("  Apple "), "apple");
        assert_eq!(name_key("APPLE"), name_key("apple"));
    }

    #[test]
    fn product_request_bounds() {
        let request = CreateProductRequest {
            name: "Phone".into(),
            description: String::new(),
            price: Decimal::from(1000),
            stock: 5,
            offer: 101,
            brand_id: Uuid::new_v4(),
            series_id: Uuid::new_v4(),
            is_featured: false,
        };
        assert!(request.validate().is_err());
        let ok = CreateProductRequest { offer: 20, ..request };
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn sort_parses_from_query_values() {
        let sort: ProductSort = serde_json::from_str("\"price_desc\"").unwrap();
        assert_eq!(sort, ProductSort::PriceDesc);
        assert_eq!(ProductSort::default(), ProductSort::Newest);
    }
}

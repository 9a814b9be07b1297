//! Back-office routes. Every route requires an admin session.
//!
//! Catalog writes take `multipart/form-data` so images can travel with the
//! fields; everything else is JSON.

use axum::{
    extract::{Multipart, Path, Query, State},
    response::IntoResponse,
    routing::{get, patch},
    Json, Router,
};
use uuid::Uuid;

use crate::{
    auth::{AuthRouterExt, Role},
    errors::ServiceError,
    handlers::{
        common::{created_response, message_response, success_response, PaginationParams},
        uploads::UploadForm,
    },
    services::{
        catalog::{
            AdminCatalogQuery, BrandImages, CreateBrandRequest, CreateProductRequest,
            CreateSeriesRequest, SeriesImages, UpdateBrandRequest, UpdateProductRequest,
            UpdateSeriesRequest,
        },
        coupons::{CreateCouponRequest, UpdateCouponRequest},
        orders::{OrderListQuery, UpdateOrderStatusRequest},
        reports::SalesReportQuery,
        users::UserListQuery,
    },
    ApiResponse, AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/brands", get(list_brands).post(create_brand))
        .route("/brands/:id", get(get_brand).patch(update_brand))
        .route("/brands/:id/toggle", patch(toggle_brand))
        .route("/series", get(list_series).post(create_series))
        .route("/series/:id", get(get_series).patch(update_series))
        .route("/series/:id/toggle", patch(toggle_series))
        .route("/products", get(list_products).post(create_product))
        .route("/products/:id", get(get_product).patch(update_product))
        .route("/products/:id/toggle", patch(toggle_product))
        .route("/users", get(list_users))
        .route("/users/:id/block", patch(block_user))
        .route("/users/:id/unblock", patch(unblock_user))
        .route("/coupons", get(list_coupons).post(create_coupon))
        .route(
            "/coupons/:id",
            get(get_coupon).patch(update_coupon).delete(delete_coupon),
        )
        .route("/coupons/:id/toggle", patch(toggle_coupon))
        .route("/orders", get(list_orders))
        .route("/orders/:id", get(get_order))
        .route("/orders/:id/status", patch(update_order_status))
        .route("/sales-report", get(sales_report))
        .with_role(Role::Admin)
}

async fn read_form(state: &AppState, multipart: Multipart) -> Result<UploadForm, ServiceError> {
    UploadForm::read(multipart, state.config.max_upload_bytes).await
}

// Brands

async fn list_brands(
    State(state): State<AppState>,
    Query(query): Query<AdminCatalogQuery>,
    Query(pagination): Query<PaginationParams>,
) -> Result<impl IntoResponse, ServiceError> {
    let (page, limit) = pagination.normalized();
    Ok(success_response(
        state.services.catalog.list_brands(query, page, limit).await?,
    ))
}

async fn get_brand(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    Ok(success_response(state.services.catalog.get_brand(id).await?))
}

async fn create_brand(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<impl IntoResponse, ServiceError> {
    let mut form = read_form(&state, multipart).await?;
    let request = CreateBrandRequest {
        name: form.required("name")?,
        description: form.opt("description")?.unwrap_or_default(),
        offer: form.opt("offer")?.unwrap_or_default(),
    };
    let images = BrandImages {
        logo: form.take_file("logo"),
        banner: form.take_file("banner"),
    };
    let brand = state.services.catalog.create_brand(request, images).await?;
    Ok(created_response("Brand created", brand))
}

async fn update_brand(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    multipart: Multipart,
) -> Result<impl IntoResponse, ServiceError> {
    let mut form = read_form(&state, multipart).await?;
    let patch = UpdateBrandRequest {
        name: form.opt("name")?,
        description: form.opt("description")?,
        offer: form.opt("offer")?,
        is_active: form.opt("is_active")?,
    };
    let images = BrandImages {
        logo: form.take_file("logo"),
        banner: form.take_file("banner"),
    };
    let brand = state
        .services
        .catalog
        .update_brand(id, patch, images)
        .await?;
    Ok(message_response("Brand updated", brand))
}

async fn toggle_brand(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let brand = state.services.catalog.toggle_brand(id).await?;
    Ok(message_response("Brand status updated", brand))
}

// Series

async fn list_series(
    State(state): State<AppState>,
    Query(query): Query<AdminCatalogQuery>,
    Query(pagination): Query<PaginationParams>,
) -> Result<impl IntoResponse, ServiceError> {
    let (page, limit) = pagination.normalized();
    Ok(success_response(
        state.services.catalog.list_series(query, page, limit).await?,
    ))
}

async fn get_series(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    Ok(success_response(state.services.catalog.get_series(id).await?))
}

async fn create_series(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<impl IntoResponse, ServiceError> {
    let mut form = read_form(&state, multipart).await?;
    let request = CreateSeriesRequest {
        brand_id: form.required("brand_id")?,
        name: form.required("name")?,
        description: form.opt("description")?.unwrap_or_default(),
        offer: form.opt("offer")?.unwrap_or_default(),
    };
    let images = SeriesImages {
        card_image: form.take_file("card_image"),
        banner: form.take_file("banner"),
    };
    let series = state.services.catalog.create_series(request, images).await?;
    Ok(created_response("Series created", series))
}

async fn update_series(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    multipart: Multipart,
) -> Result<impl IntoResponse, ServiceError> {
    let mut form = read_form(&state, multipart).await?;
    let patch = UpdateSeriesRequest {
        name: form.opt("name")?,
        description: form.opt("description")?,
        offer: form.opt("offer")?,
        is_active: form.opt("is_active")?,
    };
    let images = SeriesImages {
        card_image: form.take_file("card_image"),
        banner: form.take_file("banner"),
    };
    let series = state
        .services
        .catalog
        .update_series(id, patch, images)
        .await?;
    Ok(message_response("Series updated", series))
}

async fn toggle_series(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let series = state.services.catalog.toggle_series(id).await?;
    Ok(message_response("Series status updated", series))
}

// Products

async fn list_products(
    State(state): State<AppState>,
    Query(query): Query<AdminCatalogQuery>,
    Query(pagination): Query<PaginationParams>,
) -> Result<impl IntoResponse, ServiceError> {
    let (page, limit) = pagination.normalized();
    Ok(success_response(
        state
            .services
            .catalog
            .list_products(query, page, limit)
            .await?,
    ))
}

async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    Ok(success_response(state.services.catalog.get_product(id).await?))
}

async fn create_product(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<impl IntoResponse, ServiceError> {
    let mut form = read_form(&state, multipart).await?;
    let request = CreateProductRequest {
        name: form.required("name")?,
        description: form.opt("description")?.unwrap_or_default(),
        price: form.required("price")?,
        stock: form.required("stock")?,
        offer: form.opt("offer")?.unwrap_or_default(),
        brand_id: form.required("brand_id")?,
        series_id: form.required("series_id")?,
        is_featured: form.opt("is_featured")?.unwrap_or_default(),
    };
    let images = form.take_files("images");
    let product = state
        .services
        .catalog
        .create_product(request, images)
        .await?;
    Ok(created_response("Product created", product))
}

async fn update_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    multipart: Multipart,
) -> Result<impl IntoResponse, ServiceError> {
    let mut form = read_form(&state, multipart).await?;
    let patch = UpdateProductRequest {
        name: form.opt("name")?,
        description: form.opt("description")?,
        price: form.opt("price")?,
        stock: form.opt("stock")?,
        offer: form.opt("offer")?,
        brand_id: form.opt("brand_id")?,
        series_id: form.opt("series_id")?,
        is_active: form.opt("is_active")?,
        is_featured: form.opt("is_featured")?,
        remove_images: form.list("remove_images"),
    };
    let images = form.take_files("images");
    let product = state
        .services
        .catalog
        .update_product(id, patch, images)
        .await?;
    Ok(message_response("Product updated", product))
}

async fn toggle_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let product = state.services.catalog.toggle_product(id).await?;
    Ok(message_response("Product status updated", product))
}

// Users

async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<UserListQuery>,
    Query(pagination): Query<PaginationParams>,
) -> Result<impl IntoResponse, ServiceError> {
    let (page, limit) = pagination.normalized();
    Ok(success_response(
        state.services.users.list_users(query, page, limit).await?,
    ))
}

async fn block_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let user = state.services.users.set_user_active(id, false).await?;
    Ok(message_response("User blocked", user))
}

async fn unblock_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let user = state.services.users.set_user_active(id, true).await?;
    Ok(message_response("User unblocked", user))
}

// Coupons

async fn list_coupons(
    State(state): State<AppState>,
    Query(pagination): Query<PaginationParams>,
) -> Result<impl IntoResponse, ServiceError> {
    let (page, limit) = pagination.normalized();
    Ok(success_response(
        state.services.coupons.list_coupons(page, limit).await?,
    ))
}

async fn get_coupon(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    Ok(success_response(state.services.coupons.get_coupon(id).await?))
}

async fn create_coupon(
    State(state): State<AppState>,
    Json(payload): Json<CreateCouponRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let coupon = state.services.coupons.create_coupon(payload).await?;
    Ok(created_response("Coupon created", coupon))
}

async fn update_coupon(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateCouponRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let coupon = state.services.coupons.update_coupon(id, payload).await?;
    Ok(message_response("Coupon updated", coupon))
}

async fn toggle_coupon(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let coupon = state.services.coupons.toggle_coupon(id).await?;
    Ok(message_response("Coupon status updated", coupon))
}

async fn delete_coupon(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<()>>, ServiceError> {
    state.services.coupons.delete_coupon(id).await?;
    Ok(Json(ApiResponse::message("Coupon deleted")))
}

// Orders and reporting

async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<OrderListQuery>,
    Query(pagination): Query<PaginationParams>,
) -> Result<impl IntoResponse, ServiceError> {
    let (page, limit) = pagination.normalized();
    Ok(success_response(
        state.services.orders.list_orders(query, page, limit).await?,
    ))
}

async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    Ok(success_response(state.services.orders.get_order(id).await?))
}

async fn update_order_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateOrderStatusRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state
        .services
        .orders
        .update_order_status(id, payload)
        .await?;
    Ok(message_response("Order status updated", order))
}

async fn sales_report(
    State(state): State<AppState>,
    Query(query): Query<SalesReportQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    Ok(success_response(
        state.services.reports.sales_report(query).await?,
    ))
}

//! Public storefront browsing. Only active products whose brand and series
//! are active are visible here.

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::get,
    Router,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    errors::ServiceError,
    handlers::common::{success_response, PaginationParams},
    services::catalog::ShopQuery,
    AppState,
};

const RELATED_LIMIT: u64 = 8;

#[derive(Debug, Default, Deserialize)]
pub struct SeriesFilter {
    pub brand: Option<Uuid>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/products", get(list_products))
        .route("/products/:id", get(get_product))
        .route("/products/:id/related", get(related_products))
        .route("/brands", get(list_brands))
        .route("/series", get(list_series))
}

async fn list_products(
    State(state): State<AppState>,
    Query(query): Query<ShopQuery>,
    Query(pagination): Query<PaginationParams>,
) -> Result<impl IntoResponse, ServiceError> {
    let (page, limit) = pagination.normalized();
    let products = state
        .services
        .catalog
        .shop_products(query, page, limit)
        .await?;
    Ok(success_response(products))
}

async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    Ok(success_response(state.services.catalog.shop_product(id).await?))
}

async fn related_products(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let related = state
        .services
        .catalog
        .related_products(id, RELATED_LIMIT)
        .await?;
    Ok(success_response(related))
}

async fn list_brands(State(state): State<AppState>) -> Result<impl IntoResponse, ServiceError> {
    Ok(success_response(state.services.catalog.shop_brands().await?))
}

async fn list_series(
    State(state): State<AppState>,
    Query(filter): Query<SeriesFilter>,
) -> Result<impl IntoResponse, ServiceError> {
    Ok(success_response(
        state.services.catalog.shop_series(filter.brand).await?,
    ))
}

//! Read-only HTTP surface over the catalog service.
//!
//! The storefront views own loading, retry, and error UI; this layer just
//! maps catalog results onto status codes. Live product views are exposed as
//! server-sent events bridging the subscription channel.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use futures::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::catalog::{
    CatalogService, Cursor, ProductPage, DEFAULT_CATEGORY_LIMIT, DEFAULT_RELATED_LIMIT,
    DEFAULT_SEARCH_LIMIT, DEFAULT_SHELF_LIMIT,
};
use crate::error::CatalogError;
use crate::model::{Product, Review, ReviewSummary};

const MAX_LIMIT: usize = 100;

#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<CatalogService>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/products", get(list_products))
        .route("/api/v1/products/featured", get(featured_products))
        .route("/api/v1/products/popular", get(popular_products))
        .route("/api/v1/products/sale", get(sale_products))
        .route("/api/v1/products/search", get(search_products))
        .route("/api/v1/products/:id", get(get_product))
        .route("/api/v1/products/:id/related", get(related_products))
        .route("/api/v1/products/:id/reviews", get(product_reviews))
        .route("/api/v1/products/:id/live", get(live_product))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("missing required query parameter `{0}`")]
    MissingParam(&'static str),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = match &self {
            ApiError::Catalog(CatalogError::StoreUnavailable(_)) => {
                (StatusCode::SERVICE_UNAVAILABLE, "Service Unavailable")
            }
            ApiError::Catalog(CatalogError::Validation(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
            }
            ApiError::Catalog(CatalogError::InvalidCursor) => {
                (StatusCode::BAD_REQUEST, "Bad Request")
            }
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "Not Found"),
            ApiError::MissingParam(_) => (StatusCode::BAD_REQUEST, "Bad Request"),
        };
        let body = Json(json!({ "error": error, "message": self.to_string() }));
        (status, body).into_response()
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "healthy", "service": "giftcart-catalog" }))
}

#[derive(Debug, Deserialize)]
struct ListParams {
    category: Option<String>,
    limit: Option<usize>,
    cursor: Option<String>,
}

async fn list_products(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<ProductPage>, ApiError> {
    let category = params
        .category
        .as_deref()
        .ok_or(ApiError::MissingParam("category"))?;
    let limit = params.limit.unwrap_or(DEFAULT_CATEGORY_LIMIT).min(MAX_LIMIT);
    let cursor = params.cursor.map(Cursor::new);
    let page = state
        .catalog
        .next_products_batch(category, cursor.as_ref(), limit)
        .await?;
    Ok(Json(page))
}

#[derive(Debug, Deserialize)]
struct ShelfParams {
    limit: Option<usize>,
}

async fn featured_products(
    State(state): State<AppState>,
    Query(params): Query<ShelfParams>,
) -> Result<Json<Vec<Product>>, ApiError> {
    let limit = params.limit.unwrap_or(DEFAULT_SHELF_LIMIT).min(MAX_LIMIT);
    Ok(Json(state.catalog.featured_products(limit).await?))
}

async fn popular_products(
    State(state): State<AppState>,
    Query(params): Query<ShelfParams>,
) -> Result<Json<Vec<Product>>, ApiError> {
    let limit = params.limit.unwrap_or(DEFAULT_SHELF_LIMIT).min(MAX_LIMIT);
    Ok(Json(state.catalog.popular_products(limit).await?))
}

async fn sale_products(
    State(state): State<AppState>,
    Query(params): Query<ShelfParams>,
) -> Result<Json<Vec<Product>>, ApiError> {
    let limit = params.limit.unwrap_or(DEFAULT_SHELF_LIMIT).min(MAX_LIMIT);
    Ok(Json(state.catalog.sale_products(limit).await?))
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    q: Option<String>,
    limit: Option<usize>,
}

async fn search_products(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<Product>>, ApiError> {
    let term = params.q.as_deref().ok_or(ApiError::MissingParam("q"))?;
    let limit = params.limit.unwrap_or(DEFAULT_SEARCH_LIMIT).min(MAX_LIMIT);
    Ok(Json(state.catalog.search_products(term, limit).await?))
}

async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Product>, ApiError> {
    state
        .catalog
        .get_product(&id)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound("product"))
}

async fn related_products(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<ShelfParams>,
) -> Result<Json<Vec<Product>>, ApiError> {
    let product = state
        .catalog
        .get_product(&id)
        .await?
        .ok_or(ApiError::NotFound("product"))?;
    let limit = params.limit.unwrap_or(DEFAULT_RELATED_LIMIT).min(MAX_LIMIT);
    Ok(Json(
        state
            .catalog
            .related_products(&id, &product.category, limit)
            .await?,
    ))
}

#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct ReviewsResponse {
    reviews: Vec<Review>,
    summary: Option<ReviewSummary>,
}

async fn product_reviews(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ReviewsResponse>, ApiError> {
    let reviews = state.catalog.product_reviews(&id).await?;
    let summary = ReviewSummary::from_reviews(&reviews);
    Ok(Json(ReviewsResponse { reviews, summary }))
}

async fn live_product(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, ApiError> {
    let subscription = state.catalog.subscribe_to_product(&id).await?;
    let stream = subscription
        .into_stream()
        .map(|product| Event::default().event("product").json_data(&product));
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

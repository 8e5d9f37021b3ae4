use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use mongodb::bson::doc;
use serde::Deserialize;
use serde_json::json;
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

use crate::dtos::{CreateProductRequest, ProductResponse};
use crate::models::Product;
use crate::services::database::PosDb;
use crate::startup::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductListParams {
    pub page: Option<u64>,
    pub page_size: Option<u64>,
    /// Case-insensitive substring match on the name.
    pub search: Option<String>,
}

#[tracing::instrument(skip(state, request))]
pub async fn create_product(
    State(state): State<AppState>,
    Json(request): Json<CreateProductRequest>,
) -> Result<(StatusCode, Json<ProductResponse>), AppError> {
    request.validate()?;

    let product = Product::new(
        request.name,
        request.sku,
        request.barcode,
        request.price,
        request.cost,
        request.stock,
    );

    state.db.insert_product(&product).await.map_err(|e| {
        if PosDb::is_duplicate_key(&e) {
            AppError::Conflict(anyhow::anyhow!("SKU ou código de barras já cadastrado"))
        } else {
            AppError::from(e)
        }
    })?;

    tracing::info!(product_id = %product.id, name = %product.name, "Product created");
    Ok((StatusCode::CREATED, Json(ProductResponse::from(product))))
}

#[tracing::instrument(skip(state))]
pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ProductResponse>, AppError> {
    let product = state
        .db
        .get_product(id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Produto não encontrado")))?;
    Ok(Json(ProductResponse::from(product)))
}

#[tracing::instrument(skip(state, params))]
pub async fn list_products(
    State(state): State<AppState>,
    Query(params): Query<ProductListParams>,
) -> Result<Json<serde_json::Value>, AppError> {
    let page = params.page.unwrap_or(1).max(1);
    let page_size = params.page_size.unwrap_or(20).clamp(1, 100);

    let mut filter = doc! {};
    if let Some(search) = params.search {
        filter.insert("name", doc! { "$regex": search, "$options": "i" });
    }

    let (products, total) = state.db.list_products(filter, page, page_size).await?;
    Ok(Json(json!({
        "products": products.into_iter().map(ProductResponse::from).collect::<Vec<_>>(),
        "total": total,
        "page": page,
        "pageSize": page_size,
    })))
}

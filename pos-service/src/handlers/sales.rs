use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use mongodb::bson::doc;
use serde_json::json;
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

use crate::dtos::{CreateSaleRequest, SaleListParams, SaleResponse};
use crate::models::{Sale, SaleItem, SaleStatus};
use crate::startup::AppState;

const DEFAULT_PAGE_SIZE: u64 = 20;
const MAX_PAGE_SIZE: u64 = 100;

/// Create a sale: snapshot product names and prices, decrement stock per
/// item with a conditional update, and compensate already-taken stock when a
/// later item fails.
#[tracing::instrument(skip(state, request))]
pub async fn create_sale(
    State(state): State<AppState>,
    Json(request): Json<CreateSaleRequest>,
) -> Result<(StatusCode, Json<SaleResponse>), AppError> {
    if request.items.is_empty() {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Venda deve conter ao menos um item"
        )));
    }
    request.validate()?;
    if let Some(customer_id) = request.customer_id {
        if state.db.get_customer(customer_id).await?.is_none() {
            return Err(AppError::NotFound(anyhow::anyhow!("Cliente não encontrado")));
        }
    }

    let mut items = Vec::with_capacity(request.items.len());
    let mut decremented: Vec<(Uuid, i64)> = Vec::new();

    for line in &request.items {
        let result = async {
            if line.quantity <= 0 {
                return Err(AppError::BadRequest(anyhow::anyhow!(
                    "Quantidade deve ser maior que zero"
                )));
            }
            let product = state
                .db
                .get_product(line.product_id)
                .await?
                .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Produto não encontrado")))?;

            if !state
                .db
                .try_decrement_stock(product.id, line.quantity)
                .await?
            {
                return Err(AppError::BadRequest(anyhow::anyhow!(
                    "Estoque insuficiente para o produto {}",
                    product.name
                )));
            }
            Ok(product)
        }
        .await;

        match result {
            Ok(product) => {
                decremented.push((product.id, line.quantity));
                items.push(SaleItem::new(
                    product.id,
                    product.name,
                    line.quantity,
                    line.unit_price.unwrap_or(product.price),
                    line.discount,
                ));
            }
            Err(e) => {
                restore_decremented(&state, &decremented).await;
                return Err(e);
            }
        }
    }

    let sale = Sale::new(
        items,
        request.discount,
        request.tax,
        request.customer_id,
        request.seller_id,
    );

    if let Err(e) = state.db.insert_sale(&sale).await {
        restore_decremented(&state, &decremented).await;
        return Err(e);
    }

    tracing::info!(sale_id = %sale.id, total = sale.total, "Sale created");
    Ok((StatusCode::CREATED, Json(SaleResponse::from(sale))))
}

#[tracing::instrument(skip(state))]
pub async fn get_sale(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SaleResponse>, AppError> {
    let sale = state
        .db
        .get_sale(id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Venda não encontrada")))?;
    Ok(Json(SaleResponse::from(sale)))
}

#[tracing::instrument(skip(state, params))]
pub async fn list_sales(
    State(state): State<AppState>,
    Query(params): Query<SaleListParams>,
) -> Result<Json<serde_json::Value>, AppError> {
    let page = params.page.unwrap_or(1).max(1);
    let page_size = params
        .page_size
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);

    let mut filter = doc! {};
    if let Some(status) = params.status {
        filter.insert("status", status.as_str());
    }

    let (sales, total) = state.db.list_sales(filter, page, page_size).await?;
    Ok(Json(json!({
        "sales": sales.into_iter().map(SaleResponse::from).collect::<Vec<_>>(),
        "total": total,
        "page": page,
        "pageSize": page_size,
    })))
}

/// Cancel a sale and restore the stock its items took.
#[tracing::instrument(skip(state))]
pub async fn cancel_sale(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SaleResponse>, AppError> {
    let mut sale = state
        .db
        .get_sale(id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Venda não encontrada")))?;
    if sale.status == SaleStatus::Cancelled {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Venda já está cancelada"
        )));
    }

    for item in &sale.items {
        if let Err(e) = state.db.restore_stock(item.product_id, item.quantity).await {
            tracing::error!(
                sale_id = %sale.id,
                product_id = %item.product_id,
                "Failed to restore stock: {}",
                e
            );
        }
    }

    state.db.update_sale_status(sale.id, SaleStatus::Cancelled).await?;
    sale.status = SaleStatus::Cancelled;

    tracing::info!(sale_id = %sale.id, "Sale cancelled");
    Ok(Json(SaleResponse::from(sale)))
}

async fn restore_decremented(state: &AppState, decremented: &[(Uuid, i64)]) {
    for (product_id, quantity) in decremented {
        if let Err(e) = state.db.restore_stock(*product_id, *quantity).await {
            tracing::error!(
                product_id = %product_id,
                "Failed to restore stock after aborted sale: {}",
                e
            );
        }
    }
}

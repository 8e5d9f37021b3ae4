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

use crate::dtos::{CreateCustomerRequest, CustomerResponse, PurchaseHistoryResponse, SaleResponse};
use crate::models::Customer;
use crate::services::database::PosDb;
use crate::startup::AppState;

const RECENT_SALES_LIMIT: i64 = 10;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerListParams {
    pub page: Option<u64>,
    pub page_size: Option<u64>,
    pub search: Option<String>,
}

#[tracing::instrument(skip(state, request))]
pub async fn create_customer(
    State(state): State<AppState>,
    Json(request): Json<CreateCustomerRequest>,
) -> Result<(StatusCode, Json<CustomerResponse>), AppError> {
    request.validate()?;

    let customer = Customer::new(
        request.name,
        request.email,
        request.phone,
        request.document,
    );

    state.db.insert_customer(&customer).await.map_err(|e| {
        if PosDb::is_duplicate_key(&e) {
            AppError::Conflict(anyhow::anyhow!("E-mail ou documento já cadastrado"))
        } else {
            AppError::from(e)
        }
    })?;

    tracing::info!(customer_id = %customer.id, "Customer created");
    Ok((StatusCode::CREATED, Json(CustomerResponse::from(customer))))
}

#[tracing::instrument(skip(state))]
pub async fn get_customer(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<CustomerResponse>, AppError> {
    let customer = state
        .db
        .get_customer(id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Cliente não encontrado")))?;
    Ok(Json(CustomerResponse::from(customer)))
}

#[tracing::instrument(skip(state, params))]
pub async fn list_customers(
    State(state): State<AppState>,
    Query(params): Query<CustomerListParams>,
) -> Result<Json<serde_json::Value>, AppError> {
    let page = params.page.unwrap_or(1).max(1);
    let page_size = params.page_size.unwrap_or(20).clamp(1, 100);

    let mut filter = doc! {};
    if let Some(search) = params.search {
        filter.insert("name", doc! { "$regex": search, "$options": "i" });
    }

    let (customers, total) = state.db.list_customers(filter, page, page_size).await?;
    Ok(Json(json!({
        "customers": customers.into_iter().map(CustomerResponse::from).collect::<Vec<_>>(),
        "total": total,
        "page": page,
        "pageSize": page_size,
    })))
}

/// Purchase aggregation: count and sum over non-cancelled sales plus the
/// most recent sales.
#[tracing::instrument(skip(state))]
pub async fn customer_purchases(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<PurchaseHistoryResponse>, AppError> {
    let customer = state
        .db
        .get_customer(id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Cliente não encontrado")))?;

    let (total_purchases, total_spent) = state.db.customer_purchase_stats(customer.id).await?;
    let recent = state
        .db
        .recent_sales_for_customer(customer.id, RECENT_SALES_LIMIT)
        .await?;

    Ok(Json(PurchaseHistoryResponse {
        customer_id: customer.id,
        total_purchases,
        total_spent,
        recent_sales: recent.into_iter().map(SaleResponse::from).collect(),
    }))
}

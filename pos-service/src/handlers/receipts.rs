use axum::{
    extract::{Path, Query, State},
    response::Response,
    Json,
};
use chrono::{NaiveTime, TimeZone, Utc};
use mongodb::bson::{self, doc};
use service_core::error::AppError;

use crate::dtos::{
    ReceiptListParams, ReceiptListResponse, ReceiptResponse, ReceiptStatsResponse,
    SaleItemResponse, VerificationPayment, VerificationResponse, VerificationSale,
};
use crate::handlers::payments::pdf_response;
use crate::startup::AppState;

const DEFAULT_PAGE_SIZE: u64 = 20;
const MAX_PAGE_SIZE: u64 = 100;

/// Paginated receipt listing with date-range and email-status filters.
#[tracing::instrument(skip(state, params))]
pub async fn list_receipts(
    State(state): State<AppState>,
    Query(params): Query<ReceiptListParams>,
) -> Result<Json<ReceiptListResponse>, AppError> {
    let page = params.page.unwrap_or(1).max(1);
    let page_size = params
        .page_size
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);

    let mut filter = doc! {};
    let mut range = doc! {};
    if let Some(start) = params.start_date {
        let from = Utc.from_utc_datetime(&start.and_time(NaiveTime::MIN));
        range.insert("$gte", bson::DateTime::from_chrono(from));
    }
    if let Some(end) = params.end_date {
        // End of day: exclusive bound at the next midnight.
        let to = Utc.from_utc_datetime(&end.succ_opt().unwrap_or(end).and_time(NaiveTime::MIN));
        range.insert("$lt", bson::DateTime::from_chrono(to));
    }
    if !range.is_empty() {
        filter.insert("generated_at", range);
    }
    if let Some(status) = params.email_status {
        filter.insert("email_status", status.to_string());
    }
    if let Some(email) = params.email {
        filter.insert("email_sent_to", email);
    }

    let (receipts, total) = state.db.list_receipts(filter, page, page_size).await?;
    let total_pages = (total + page_size - 1) / page_size;

    Ok(Json(ReceiptListResponse {
        receipts: receipts.into_iter().map(ReceiptResponse::from).collect(),
        total,
        page,
        page_size,
        total_pages,
    }))
}

#[tracing::instrument(skip(state))]
pub async fn get_receipt(
    State(state): State<AppState>,
    Path(receipt_number): Path<String>,
) -> Result<Json<ReceiptResponse>, AppError> {
    let receipt = state
        .db
        .get_receipt_by_number(&receipt_number)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Recibo não encontrado")))?;
    Ok(Json(ReceiptResponse::from(receipt)))
}

/// Public verification endpoint behind the QR code. Returns the sale and
/// payment snapshot plus, when a signing key is configured and the artifact
/// is still on disk, whether the stored signature checks out.
#[tracing::instrument(skip(state))]
pub async fn verify_receipt(
    State(state): State<AppState>,
    Path(receipt_number): Path<String>,
) -> Result<Json<VerificationResponse>, AppError> {
    let history = state
        .db
        .get_receipt_by_number(&receipt_number)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Recibo não encontrado")))?;
    let payment = state
        .db
        .get_payment(history.payment_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Pagamento não encontrado")))?;
    let sale = state
        .db
        .get_sale(history.sale_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Venda não encontrada")))?;

    let signature_valid = match (state.receipts.signer(), &history.signature) {
        (Some(signer), Some(block)) => state
            .receipts
            .storage()
            .load(&history.receipt_number)
            .await?
            .map(|bytes| signer.verify_for(&bytes, &history.receipt_number, block)),
        _ => None,
    };

    Ok(Json(VerificationResponse {
        valid: true,
        receipt_number: history.receipt_number,
        generated_at: history.generated_at,
        sale: VerificationSale {
            items: sale.items.into_iter().map(SaleItemResponse::from).collect(),
            subtotal: sale.subtotal,
            discount: sale.discount,
            tax: sale.tax,
            total: sale.total,
        },
        payment: VerificationPayment {
            amount: payment.amount,
            method: payment.method,
            method_label: payment.method.label().to_string(),
            date: payment.created_at,
            processed_by: payment.processed_by,
        },
        qr_code_data: history.qr_code_data,
        verification_url: history.verification_url,
        signature_valid,
    }))
}

/// Binary PDF download; the artifact is regenerated when the cached file is
/// gone.
#[tracing::instrument(skip(state))]
pub async fn download_receipt(
    State(state): State<AppState>,
    Path(receipt_number): Path<String>,
) -> Result<Response, AppError> {
    let history = state
        .db
        .get_receipt_by_number(&receipt_number)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Recibo não encontrado")))?;
    let (pdf, _) = state.receipts.pdf_for_history(&state.db, &history).await?;
    Ok(pdf_response(&history.receipt_number, pdf))
}

#[tracing::instrument(skip(state))]
pub async fn receipt_stats(
    State(state): State<AppState>,
) -> Result<Json<ReceiptStatsResponse>, AppError> {
    Ok(Json(state.db.receipt_stats().await?))
}

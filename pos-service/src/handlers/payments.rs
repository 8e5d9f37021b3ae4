use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use validator::Validate;
use service_core::error::AppError;
use uuid::Uuid;

use crate::dtos::{CreatePaymentRequest, QueuedReceiptResponse, ReceiptDeliveryParams};
use crate::models::{
    Customer, Payment, PaymentStatus, ReceiptHistory, ReceiptJob, Sale, SaleStatus,
};
use crate::services::receipts::ReceiptData;
use crate::startup::AppState;

/// Record a payment and return the receipt PDF.
///
/// The payment, the derived sale status and the receipt outbox job commit in
/// one transaction; receipt generation happens after the commit. When the
/// inline generation fails the payment stands, the job stays pending for the
/// worker, and the response is a `202` announcing the queued receipt.
#[tracing::instrument(skip(state, request), fields(sale_id = %request.sale_id))]
pub async fn create_payment(
    State(state): State<AppState>,
    Json(request): Json<CreatePaymentRequest>,
) -> Result<Response, AppError> {
    if request.amount <= 0.0 {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Valor do pagamento deve ser maior que zero"
        )));
    }
    request.validate()?;

    let sale = state
        .db
        .get_sale(request.sale_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Venda não encontrada")))?;
    if sale.status == SaleStatus::Cancelled {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Não é possível registrar pagamento em venda cancelada"
        )));
    }

    let customer = match sale.customer_id {
        Some(id) => state.db.get_customer(id).await?,
        None => None,
    };
    let recipient = customer.as_ref().and_then(|c| c.email.clone());

    let payment = Payment::new(
        request.sale_id,
        request.amount,
        request.method,
        request.reference,
        request.notes,
        None,
    );
    let job = ReceiptJob::new(payment.id, sale.id, request.send_email, recipient.clone());

    let sale_status = state.db.record_payment(&payment, sale.id, &job).await?;

    match state
        .receipts
        .generate_for_payment(&state.db, &payment, &sale, customer.as_ref())
        .await
    {
        Ok((mut history, pdf)) => {
            if let Err(e) = state.db.complete_jobs_for_payment(payment.id).await {
                tracing::warn!(payment_id = %payment.id, "Failed to settle outbox job: {}", e);
            }

            if request.send_email {
                if let Some(ref recipient) = recipient {
                    let data = state.receipts.build_data(
                        history.receipt_number.clone(),
                        &payment,
                        &sale,
                        customer.as_ref(),
                    )?;
                    deliver_email(&state, &mut history, &data, &pdf, recipient).await;
                }
            }

            Ok(pdf_response(&history.receipt_number, pdf))
        }
        Err(e) => {
            tracing::error!(
                payment_id = %payment.id,
                "Inline receipt generation failed, leaving job for the worker: {}",
                e
            );
            Ok((
                StatusCode::ACCEPTED,
                Json(QueuedReceiptResponse {
                    success: true,
                    payment_id: payment.id,
                    sale_status,
                    receipt_status: "queued".to_string(),
                    message: "Pagamento registrado; o recibo será gerado em instantes".to_string(),
                }),
            )
                .into_response())
        }
    }
}

/// Serve the receipt PDF for a payment, regenerating it when needed.
/// `?sendEmail=true` also re-sends the receipt email.
#[tracing::instrument(skip(state), fields(payment_id = %id))]
pub async fn get_payment_receipt(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(params): Query<ReceiptDeliveryParams>,
) -> Result<Response, AppError> {
    let payment = state
        .db
        .get_payment(id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Pagamento não encontrado")))?;

    let (mut history, pdf) = match state.db.get_receipt_by_payment(payment.id).await? {
        Some(history) => {
            let (pdf, _) = state.receipts.pdf_for_history(&state.db, &history).await?;
            (history, pdf)
        }
        None => {
            // The outbox job never ran; generate on demand.
            let (sale, customer) = load_sale_graph(&state, &payment).await?;
            let (history, pdf) = state
                .receipts
                .generate_for_payment(&state.db, &payment, &sale, customer.as_ref())
                .await?;
            if let Err(e) = state.db.complete_jobs_for_payment(payment.id).await {
                tracing::warn!(payment_id = %payment.id, "Failed to settle outbox job: {}", e);
            }
            (history, pdf)
        }
    };

    if params.send_email {
        let recipient = resolve_recipient(&state, &payment, &history).await?;
        let data = state.receipts.data_for_history(&state.db, &history).await?;
        deliver_email(&state, &mut history, &data, &pdf, &recipient).await;
    }

    Ok(pdf_response(&history.receipt_number, pdf))
}

/// `paid -> cancelled` only; the sale status is recomputed from what remains
/// paid, inside a transaction.
#[tracing::instrument(skip(state), fields(payment_id = %id))]
pub async fn cancel_payment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, AppError> {
    let payment = state
        .db
        .get_payment(id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Pagamento não encontrado")))?;
    if payment.status == PaymentStatus::Cancelled {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Pagamento já está cancelado"
        )));
    }

    let sale = state
        .db
        .get_sale(payment.sale_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Venda não encontrada")))?;

    let sale_status = state.db.cancel_payment(&payment, &sale).await?;

    Ok(Json(json!({
        "success": true,
        "paymentId": payment.id,
        "saleStatus": sale_status,
    })))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResendReceiptRequest {
    /// Overrides the stored recipient.
    pub email: Option<String>,
}

/// Re-send the receipt email and update the delivery fields in place.
#[tracing::instrument(skip(state, request), fields(payment_id = %id))]
pub async fn resend_receipt(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    request: Option<Json<ResendReceiptRequest>>,
) -> Result<Json<serde_json::Value>, AppError> {
    let payment = state
        .db
        .get_payment(id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Pagamento não encontrado")))?;
    let mut history = state
        .db
        .get_receipt_by_payment(payment.id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Recibo não encontrado")))?;

    let recipient = match request.and_then(|Json(r)| r.email) {
        Some(email) => email,
        None => resolve_recipient(&state, &payment, &history).await?,
    };

    let (pdf, _) = state.receipts.pdf_for_history(&state.db, &history).await?;
    let data = state.receipts.data_for_history(&state.db, &history).await?;
    deliver_email(&state, &mut history, &data, &pdf, &recipient).await;

    Ok(Json(json!({
        "success": true,
        "receiptNumber": history.receipt_number,
        "emailSentTo": history.email_sent_to,
        "emailStatus": history.email_status,
        "emailError": history.email_error,
    })))
}

async fn load_sale_graph(
    state: &AppState,
    payment: &Payment,
) -> Result<(Sale, Option<Customer>), AppError> {
    let sale = state
        .db
        .get_sale(payment.sale_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Venda não encontrada")))?;
    let customer = match sale.customer_id {
        Some(id) => state.db.get_customer(id).await?,
        None => None,
    };
    Ok((sale, customer))
}

/// Stored recipient first, then the sale's customer email.
async fn resolve_recipient(
    state: &AppState,
    payment: &Payment,
    history: &ReceiptHistory,
) -> Result<String, AppError> {
    if let Some(ref email) = history.email_sent_to {
        return Ok(email.clone());
    }
    let (_, customer) = load_sale_graph(state, payment).await?;
    customer
        .and_then(|c| c.email)
        .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("Cliente não possui e-mail cadastrado")))
}

/// Send the email and persist the outcome on the receipt record. Delivery
/// failures are recorded, never propagated.
pub(crate) async fn deliver_email(
    state: &AppState,
    history: &mut ReceiptHistory,
    data: &ReceiptData,
    pdf: &[u8],
    recipient: &str,
) {
    match state.mailer.send_receipt(recipient, data, pdf).await {
        Ok(()) => {
            history.mark_email_sent(recipient);
            tracing::info!(
                receipt_number = %history.receipt_number,
                recipient = %recipient,
                "Receipt email sent"
            );
        }
        Err(e) => {
            tracing::warn!(
                receipt_number = %history.receipt_number,
                recipient = %recipient,
                "Receipt email failed: {}",
                e
            );
            history.mark_email_failed(recipient, e.to_string());
        }
    }
    if let Err(e) = state.db.update_receipt_email(history).await {
        tracing::error!(
            receipt_number = %history.receipt_number,
            "Failed to persist email status: {}",
            e
        );
    }
}

pub(crate) fn pdf_response(receipt_number: &str, pdf: Vec<u8>) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}.pdf\"", receipt_number),
            ),
        ],
        pdf,
    )
        .into_response()
}

//! Wire types for the HTTP surface.
//!
//! Field names follow the public API contract (camelCase), while models keep
//! the database's snake_case. `From` impls do the mapping.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::{
    Customer, EmailStatus, PaymentMethod, Product, ReceiptHistory, Sale, SaleItem, SaleStatus,
};

// ---------------------------------------------------------------------------
// Payments
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentRequest {
    pub sale_id: Uuid,
    #[validate(range(min = 0.01))]
    pub amount: f64,
    pub method: PaymentMethod,
    pub reference: Option<String>,
    pub notes: Option<String>,
    #[serde(default)]
    pub send_email: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptDeliveryParams {
    #[serde(default)]
    pub send_email: bool,
}

/// Returned with `202 Accepted` when the payment committed but the inline
/// receipt generation failed; the outbox worker will retry it.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedReceiptResponse {
    pub success: bool,
    pub payment_id: Uuid,
    pub sale_status: SaleStatus,
    pub receipt_status: String,
    pub message: String,
}

// ---------------------------------------------------------------------------
// Sales
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SaleItemRequest {
    pub product_id: Uuid,
    pub quantity: i64,
    /// Overrides the catalog price when present.
    #[validate(range(min = 0.0))]
    pub unit_price: Option<f64>,
    #[validate(range(min = 0.0))]
    #[serde(default)]
    pub discount: f64,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateSaleRequest {
    #[validate(nested)]
    pub items: Vec<SaleItemRequest>,
    #[validate(range(min = 0.0))]
    #[serde(default)]
    pub discount: f64,
    #[validate(range(min = 0.0))]
    #[serde(default)]
    pub tax: f64,
    pub customer_id: Option<Uuid>,
    pub seller_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleItemResponse {
    pub product_id: Uuid,
    pub product_name: String,
    pub quantity: i64,
    pub unit_price: f64,
    pub discount: f64,
    pub total: f64,
}

impl From<SaleItem> for SaleItemResponse {
    fn from(i: SaleItem) -> Self {
        Self {
            product_id: i.product_id,
            product_name: i.product_name,
            quantity: i.quantity,
            unit_price: i.unit_price,
            discount: i.discount,
            total: i.total,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleResponse {
    pub id: Uuid,
    pub items: Vec<SaleItemResponse>,
    pub subtotal: f64,
    pub discount: f64,
    pub tax: f64,
    pub total: f64,
    pub status: SaleStatus,
    pub customer_id: Option<Uuid>,
    pub seller_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<Sale> for SaleResponse {
    fn from(s: Sale) -> Self {
        Self {
            id: s.id,
            items: s.items.into_iter().map(SaleItemResponse::from).collect(),
            subtotal: s.subtotal,
            discount: s.discount,
            tax: s.tax,
            total: s.total,
            status: s.status,
            customer_id: s.customer_id,
            seller_id: s.seller_id,
            created_at: s.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleListParams {
    pub page: Option<u64>,
    pub page_size: Option<u64>,
    pub status: Option<SaleStatus>,
}

// ---------------------------------------------------------------------------
// Catalog & customers
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateProductRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    pub sku: Option<String>,
    pub barcode: Option<String>,
    #[validate(range(min = 0.0))]
    pub price: f64,
    #[validate(range(min = 0.0))]
    #[serde(default)]
    pub cost: f64,
    #[validate(range(min = 0))]
    #[serde(default)]
    pub stock: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductResponse {
    pub id: Uuid,
    pub name: String,
    pub sku: Option<String>,
    pub barcode: Option<String>,
    pub price: f64,
    pub cost: f64,
    pub stock: i64,
}

impl From<Product> for ProductResponse {
    fn from(p: Product) -> Self {
        Self {
            id: p.id,
            name: p.name,
            sku: p.sku,
            barcode: p.barcode,
            price: p.price,
            cost: p.cost,
            stock: p.stock,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateCustomerRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(email)]
    pub email: Option<String>,
    pub phone: Option<String>,
    pub document: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerResponse {
    pub id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub document: Option<String>,
}

impl From<Customer> for CustomerResponse {
    fn from(c: Customer) -> Self {
        Self {
            id: c.id,
            name: c.name,
            email: c.email,
            phone: c.phone,
            document: c.document,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseHistoryResponse {
    pub customer_id: Uuid,
    pub total_purchases: u64,
    pub total_spent: f64,
    pub recent_sales: Vec<SaleResponse>,
}

// ---------------------------------------------------------------------------
// Receipts (read side)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptListParams {
    pub page: Option<u64>,
    pub page_size: Option<u64>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub email_status: Option<EmailStatus>,
    /// Filter by the address a receipt was mailed to.
    pub email: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptResponse {
    pub receipt_number: String,
    pub payment_id: Uuid,
    pub sale_id: Uuid,
    pub amount: f64,
    pub verification_url: String,
    pub file_path: Option<String>,
    pub email_sent_to: Option<String>,
    pub email_status: Option<EmailStatus>,
    pub email_error: Option<String>,
    pub generated_at: DateTime<Utc>,
}

impl From<ReceiptHistory> for ReceiptResponse {
    fn from(r: ReceiptHistory) -> Self {
        Self {
            receipt_number: r.receipt_number,
            payment_id: r.payment_id,
            sale_id: r.sale_id,
            amount: r.amount,
            verification_url: r.verification_url,
            file_path: r.file_path,
            email_sent_to: r.email_sent_to,
            email_status: r.email_status,
            email_error: r.email_error,
            generated_at: r.generated_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptListResponse {
    pub receipts: Vec<ReceiptResponse>,
    pub total: u64,
    pub page: u64,
    pub page_size: u64,
    pub total_pages: u64,
}

/// Public verification DTO returned by `GET /api/receipts/verify/:number`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResponse {
    pub valid: bool,
    pub receipt_number: String,
    pub generated_at: DateTime<Utc>,
    pub sale: VerificationSale,
    pub payment: VerificationPayment,
    pub qr_code_data: String,
    pub verification_url: String,
    /// Present only when the service holds a signing key and the artifact is
    /// still on disk to check against.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature_valid: Option<bool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationSale {
    pub items: Vec<SaleItemResponse>,
    pub subtotal: f64,
    pub discount: f64,
    pub tax: f64,
    pub total: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationPayment {
    pub amount: f64,
    pub method: PaymentMethod,
    pub method_label: String,
    pub date: DateTime<Utc>,
    pub processed_by: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptStatsResponse {
    pub total_receipts: u64,
    pub by_email_status: EmailStatusCounts,
    /// Receipts generated per day over the last 30 days.
    pub daily: Vec<DailyCount>,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailStatusCounts {
    pub sent: u64,
    pub failed: u64,
    pub pending: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyCount {
    pub date: String,
    pub count: u64,
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::opt_chrono_datetime_as_bson_datetime;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmailStatus {
    Sent,
    Failed,
    Pending,
}

impl std::fmt::Display for EmailStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmailStatus::Sent => write!(f, "sent"),
            EmailStatus::Failed => write!(f, "failed"),
            EmailStatus::Pending => write!(f, "pending"),
        }
    }
}

/// Detached Ed25519 signature over `pdf_bytes || canonical JSON(metadata)`.
/// Stored alongside the artifact, never embedded in it, so byte-level
/// post-processing of the PDF cannot silently corrupt verifiability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignatureBlock {
    /// Base64-encoded signature.
    pub signature: String,
    pub algorithm: String,
    pub issuer: String,
    pub serial_number: String,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub issued_at: DateTime<Utc>,
}

/// Immutable audit record tying a payment to a generated receipt artifact.
/// Email delivery fields are updated in place on resend; rows are never
/// deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiptHistory {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub receipt_number: String,
    pub payment_id: Uuid,
    pub sale_id: Uuid,
    pub amount: f64,
    /// PNG data-URL of the QR code embedded in the PDF.
    pub qr_code_data: String,
    pub verification_url: String,
    pub file_path: Option<String>,
    pub signature: Option<SignatureBlock>,
    pub email_sent_to: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "opt_chrono_datetime_as_bson_datetime"
    )]
    pub email_sent_at: Option<DateTime<Utc>>,
    pub email_status: Option<EmailStatus>,
    pub email_error: Option<String>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub generated_at: DateTime<Utc>,
    pub generated_by: Option<String>,
}

impl ReceiptHistory {
    pub fn mark_email_sent(&mut self, recipient: &str) {
        self.email_sent_to = Some(recipient.to_string());
        self.email_sent_at = Some(Utc::now());
        self.email_status = Some(EmailStatus::Sent);
        self.email_error = None;
    }

    pub fn mark_email_failed(&mut self, recipient: &str, error: String) {
        self.email_sent_to = Some(recipient.to_string());
        self.email_status = Some(EmailStatus::Failed);
        self.email_error = Some(error);
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Processing => write!(f, "processing"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Outbox row written inside the payment transaction. The receipt worker
/// drains pending jobs, so a receipt is generated at least once even when the
/// inline attempt in the request path fails.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiptJob {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub payment_id: Uuid,
    pub sale_id: Uuid,
    pub send_email: bool,
    pub recipient: Option<String>,
    pub status: JobStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl ReceiptJob {
    pub fn new(payment_id: Uuid, sale_id: Uuid, send_email: bool, recipient: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            payment_id,
            sale_id,
            send_email,
            recipient,
            status: JobStatus::Pending,
            attempts: 0,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }
}

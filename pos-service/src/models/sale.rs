use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Tolerance for comparing monetary sums held as f64.
const CENT_TOLERANCE: f64 = 0.005;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SaleStatus {
    Pending,
    PartiallyPaid,
    Paid,
    Cancelled,
}

impl SaleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SaleStatus::Pending => "pending",
            SaleStatus::PartiallyPaid => "partially_paid",
            SaleStatus::Paid => "paid",
            SaleStatus::Cancelled => "cancelled",
        }
    }

    /// Derive the sale status from the sum of paid payments.
    ///
    /// `paid >= total` wins over everything else; a positive partial sum moves
    /// the sale to `partially_paid`; otherwise the current status stands.
    /// Cancelled sales are never revived by this derivation.
    pub fn derive(paid: f64, total: f64, current: SaleStatus) -> SaleStatus {
        if current == SaleStatus::Cancelled {
            return SaleStatus::Cancelled;
        }
        if paid + CENT_TOLERANCE >= total {
            SaleStatus::Paid
        } else if paid > CENT_TOLERANCE {
            SaleStatus::PartiallyPaid
        } else {
            current
        }
    }

    /// Recomputation after a payment is cancelled. Unlike
    /// [`derive`](Self::derive), a paid sum back at zero returns the sale to
    /// `pending` instead of keeping the current status.
    pub fn recompute(paid: f64, total: f64, current: SaleStatus) -> SaleStatus {
        if current == SaleStatus::Cancelled {
            return SaleStatus::Cancelled;
        }
        if paid + CENT_TOLERANCE >= total {
            SaleStatus::Paid
        } else if paid > CENT_TOLERANCE {
            SaleStatus::PartiallyPaid
        } else {
            SaleStatus::Pending
        }
    }
}

impl std::fmt::Display for SaleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One line of a sale. Product name and unit price are snapshots taken at
/// checkout so later catalog edits do not rewrite history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaleItem {
    pub product_id: Uuid,
    pub product_name: String,
    pub quantity: i64,
    pub unit_price: f64,
    pub discount: f64,
    pub total: f64,
}

impl SaleItem {
    pub fn new(
        product_id: Uuid,
        product_name: String,
        quantity: i64,
        unit_price: f64,
        discount: f64,
    ) -> Self {
        let total = quantity as f64 * unit_price - discount;
        Self {
            product_id,
            product_name,
            quantity,
            unit_price,
            discount,
            total,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sale {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub items: Vec<SaleItem>,
    pub subtotal: f64,
    pub discount: f64,
    pub tax: f64,
    pub total: f64,
    pub status: SaleStatus,
    pub customer_id: Option<Uuid>,
    pub seller_id: Option<String>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl Sale {
    pub fn new(
        items: Vec<SaleItem>,
        discount: f64,
        tax: f64,
        customer_id: Option<Uuid>,
        seller_id: Option<String>,
    ) -> Self {
        let now = Utc::now();
        let mut sale = Self {
            id: Uuid::new_v4(),
            items,
            subtotal: 0.0,
            discount,
            tax,
            total: 0.0,
            status: SaleStatus::Pending,
            customer_id,
            seller_id,
            created_at: now,
            updated_at: now,
        };
        sale.recompute_totals();
        sale
    }

    /// Invariant: `total = subtotal - discount + tax`. Must be called whenever
    /// the item list changes.
    pub fn recompute_totals(&mut self) {
        self.subtotal = self.items.iter().map(|i| i.total).sum();
        self.total = self.subtotal - self.discount + self.tax;
        self.updated_at = Utc::now();
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Catalog entry. Stock is mutated atomically by sale creation and restored
/// on cancellation; the invariant `stock >= 0` is enforced by conditional
/// updates, never by read-modify-write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub name: String,
    pub sku: Option<String>,
    pub barcode: Option<String>,
    pub price: f64,
    pub cost: f64,
    pub stock: i64,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl Product {
    pub fn new(
        name: String,
        sku: Option<String>,
        barcode: Option<String>,
        price: f64,
        cost: f64,
        stock: i64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name,
            sku,
            barcode,
            price,
            cost,
            stock,
            created_at: now,
            updated_at: now,
        }
    }
}

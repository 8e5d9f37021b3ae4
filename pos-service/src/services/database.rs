use chrono::{Duration, Utc};
use futures::TryStreamExt;
use mongodb::{
    bson::{self, doc, Document},
    error::{ErrorKind, WriteFailure},
    options::{FindOneAndUpdateOptions, FindOneOptions, FindOptions, IndexOptions, ReturnDocument},
    Client as MongoClient, ClientSession, Collection, Database, IndexModel,
};
use service_core::error::AppError;
use uuid::Uuid;

use crate::dtos::{DailyCount, EmailStatusCounts, ReceiptStatsResponse};
use crate::models::{
    Customer, JobStatus, Payment, PaymentStatus, Product, ReceiptHistory, ReceiptJob, Sale,
    SaleStatus, SignatureBlock,
};

/// How long a claimed outbox job may sit in `processing` before another
/// worker may re-claim it.
const CLAIM_LEASE_MINUTES: i64 = 5;

/// MongoDB access for the POS service. Collections are typed; ids are stored
/// as stringified UUIDs under `_id`.
#[derive(Clone)]
pub struct PosDb {
    client: MongoClient,
    db: Database,
}

impl PosDb {
    pub async fn connect(uri: &str, database: &str) -> Result<Self, AppError> {
        tracing::info!(database = %database, "Connecting to MongoDB");
        let client = MongoClient::with_uri_str(uri).await.map_err(|e| {
            tracing::error!("Failed to connect to MongoDB: {}", e);
            AppError::from(e)
        })?;
        let db = client.database(database);
        tracing::info!(database = %database, "Connected to MongoDB");
        Ok(Self { client, db })
    }

    pub async fn initialize_indexes(&self) -> Result<(), AppError> {
        tracing::info!("Creating MongoDB indexes");

        let unique = |name: &str| {
            IndexOptions::builder()
                .unique(true)
                .name(name.to_string())
                .build()
        };
        let sparse_unique = |name: &str| {
            IndexOptions::builder()
                .unique(true)
                .sparse(true)
                .name(name.to_string())
                .build()
        };
        let named = |name: &str| IndexOptions::builder().name(name.to_string()).build();

        self.receipts()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "receipt_number": 1 })
                    .options(unique("receipt_number_unique"))
                    .build(),
                None,
            )
            .await?;
        self.receipts()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "payment_id": 1 })
                    .options(named("receipt_payment_lookup"))
                    .build(),
                None,
            )
            .await?;
        self.receipts()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "generated_at": -1 })
                    .options(named("receipt_generated_at"))
                    .build(),
                None,
            )
            .await?;

        self.payments()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "sale_id": 1 })
                    .options(named("payment_sale_lookup"))
                    .build(),
                None,
            )
            .await?;

        self.sales()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "customer_id": 1, "created_at": -1 })
                    .options(named("sale_customer_lookup"))
                    .build(),
                None,
            )
            .await?;

        self.products()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "sku": 1 })
                    .options(sparse_unique("product_sku_unique"))
                    .build(),
                None,
            )
            .await?;
        self.products()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "barcode": 1 })
                    .options(sparse_unique("product_barcode_unique"))
                    .build(),
                None,
            )
            .await?;

        self.customers()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "email": 1 })
                    .options(sparse_unique("customer_email_unique"))
                    .build(),
                None,
            )
            .await?;
        self.customers()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "document": 1 })
                    .options(sparse_unique("customer_document_unique"))
                    .build(),
                None,
            )
            .await?;

        self.receipt_jobs()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "status": 1, "created_at": 1 })
                    .options(named("job_claim_order"))
                    .build(),
                None,
            )
            .await?;

        tracing::info!("MongoDB indexes ready");
        Ok(())
    }

    pub async fn health_check(&self) -> Result<(), AppError> {
        self.client
            .database("admin")
            .run_command(doc! { "ping": 1 }, None)
            .await
            .map_err(|e| {
                tracing::error!("MongoDB health check failed: {}", e);
                AppError::from(e)
            })?;
        Ok(())
    }

    fn sales(&self) -> Collection<Sale> {
        self.db.collection("sales")
    }

    fn payments(&self) -> Collection<Payment> {
        self.db.collection("payments")
    }

    fn products(&self) -> Collection<Product> {
        self.db.collection("products")
    }

    fn customers(&self) -> Collection<Customer> {
        self.db.collection("customers")
    }

    fn receipts(&self) -> Collection<ReceiptHistory> {
        self.db.collection("receipt_history")
    }

    pub fn receipt_jobs(&self) -> Collection<ReceiptJob> {
        self.db.collection("receipt_jobs")
    }

    /// True when the error is a unique-index violation (code 11000).
    pub fn is_duplicate_key(e: &mongodb::error::Error) -> bool {
        match e.kind.as_ref() {
            ErrorKind::Write(WriteFailure::WriteError(we)) => we.code == 11000,
            ErrorKind::Command(ce) => ce.code == 11000,
            ErrorKind::BulkWrite(bwe) => bwe
                .write_errors
                .as_ref()
                .map(|errs| errs.iter().any(|we| we.code == 11000))
                .unwrap_or(false),
            _ => false,
        }
    }

    // =========================================================================
    // Payments
    // =========================================================================

    /// Atomically: insert the payment, re-derive the sale status from the sum
    /// of paid payments, update the sale, and enqueue the receipt outbox job.
    /// All or nothing.
    pub async fn record_payment(
        &self,
        payment: &Payment,
        sale_id: Uuid,
        job: &ReceiptJob,
    ) -> Result<SaleStatus, AppError> {
        let mut session = self.client.start_session(None).await?;
        session.start_transaction(None).await?;

        let result = self
            .record_payment_in(&mut session, payment, sale_id, job)
            .await;
        match result {
            Ok(status) => {
                session.commit_transaction().await?;
                tracing::info!(
                    payment_id = %payment.id,
                    sale_id = %sale_id,
                    sale_status = %status,
                    "Payment recorded"
                );
                Ok(status)
            }
            Err(e) => {
                session.abort_transaction().await.ok();
                Err(e)
            }
        }
    }

    async fn record_payment_in(
        &self,
        session: &mut ClientSession,
        payment: &Payment,
        sale_id: Uuid,
        job: &ReceiptJob,
    ) -> Result<SaleStatus, AppError> {
        // The handler's pre-checks ran outside the transaction; the sale is
        // re-read under the session so a concurrent cancellation cannot be
        // overwritten by this payment.
        let sale = self
            .sales()
            .find_one_with_session(doc! { "_id": sale_id.to_string() }, None, session)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Venda não encontrada")))?;
        if sale.status == SaleStatus::Cancelled {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Não é possível registrar pagamento em venda cancelada"
            )));
        }

        self.payments()
            .insert_one_with_session(payment, None, session)
            .await?;

        let paid = self.sum_paid_in(session, sale.id).await?;
        let status = SaleStatus::derive(paid, sale.total, sale.status);

        self.sales()
            .update_one_with_session(
                doc! { "_id": sale.id.to_string() },
                doc! { "$set": { "status": status.as_str(), "updated_at": bson::DateTime::now() } },
                None,
                session,
            )
            .await?;

        self.receipt_jobs()
            .insert_one_with_session(job, None, session)
            .await?;

        Ok(status)
    }

    /// Atomically cancel a payment and downgrade the sale status from the
    /// remaining paid sum.
    pub async fn cancel_payment(
        &self,
        payment: &Payment,
        sale: &Sale,
    ) -> Result<SaleStatus, AppError> {
        let mut session = self.client.start_session(None).await?;
        session.start_transaction(None).await?;

        let result = self.cancel_payment_in(&mut session, payment, sale).await;
        match result {
            Ok(status) => {
                session.commit_transaction().await?;
                tracing::info!(
                    payment_id = %payment.id,
                    sale_id = %sale.id,
                    sale_status = %status,
                    "Payment cancelled"
                );
                Ok(status)
            }
            Err(e) => {
                session.abort_transaction().await.ok();
                Err(e)
            }
        }
    }

    async fn cancel_payment_in(
        &self,
        session: &mut ClientSession,
        payment: &Payment,
        sale: &Sale,
    ) -> Result<SaleStatus, AppError> {
        self.payments()
            .update_one_with_session(
                doc! { "_id": payment.id.to_string() },
                doc! { "$set": {
                    "status": PaymentStatus::Cancelled.to_string(),
                    "updated_at": bson::DateTime::now(),
                } },
                None,
                session,
            )
            .await?;

        let paid = self.sum_paid_in(session, sale.id).await?;
        let status = SaleStatus::recompute(paid, sale.total, sale.status);

        self.sales()
            .update_one_with_session(
                doc! { "_id": sale.id.to_string() },
                doc! { "$set": { "status": status.as_str(), "updated_at": bson::DateTime::now() } },
                None,
                session,
            )
            .await?;

        Ok(status)
    }

    async fn sum_paid_in(
        &self,
        session: &mut ClientSession,
        sale_id: Uuid,
    ) -> Result<f64, AppError> {
        let pipeline = vec![
            doc! { "$match": {
                "sale_id": sale_id.to_string(),
                "status": PaymentStatus::Paid.to_string(),
            } },
            doc! { "$group": { "_id": null, "total": { "$sum": "$amount" } } },
        ];

        let mut cursor = self
            .payments()
            .aggregate_with_session(pipeline, None, session)
            .await?;
        if let Some(doc) = cursor.next(&mut *session).await.transpose()? {
            Ok(doc.get_f64("total").unwrap_or(0.0))
        } else {
            Ok(0.0)
        }
    }

    /// Sum of `paid` payments for a sale, outside any transaction.
    pub async fn sum_paid(&self, sale_id: Uuid) -> Result<f64, AppError> {
        let pipeline = vec![
            doc! { "$match": {
                "sale_id": sale_id.to_string(),
                "status": PaymentStatus::Paid.to_string(),
            } },
            doc! { "$group": { "_id": null, "total": { "$sum": "$amount" } } },
        ];

        let mut cursor = self.payments().aggregate(pipeline, None).await?;
        if let Some(doc) = cursor.try_next().await? {
            Ok(doc.get_f64("total").unwrap_or(0.0))
        } else {
            Ok(0.0)
        }
    }

    pub async fn get_payment(&self, id: Uuid) -> Result<Option<Payment>, AppError> {
        Ok(self
            .payments()
            .find_one(doc! { "_id": id.to_string() }, None)
            .await?)
    }

    pub async fn list_payments_for_sale(&self, sale_id: Uuid) -> Result<Vec<Payment>, AppError> {
        let options = FindOptions::builder().sort(doc! { "created_at": 1 }).build();
        let cursor = self
            .payments()
            .find(doc! { "sale_id": sale_id.to_string() }, options)
            .await?;
        Ok(cursor.try_collect().await?)
    }

    // =========================================================================
    // Sales
    // =========================================================================

    pub async fn insert_sale(&self, sale: &Sale) -> Result<(), AppError> {
        self.sales().insert_one(sale, None).await?;
        Ok(())
    }

    pub async fn get_sale(&self, id: Uuid) -> Result<Option<Sale>, AppError> {
        Ok(self
            .sales()
            .find_one(doc! { "_id": id.to_string() }, None)
            .await?)
    }

    pub async fn update_sale_status(&self, id: Uuid, status: SaleStatus) -> Result<(), AppError> {
        self.sales()
            .update_one(
                doc! { "_id": id.to_string() },
                doc! { "$set": { "status": status.as_str(), "updated_at": bson::DateTime::now() } },
                None,
            )
            .await?;
        Ok(())
    }

    pub async fn list_sales(
        &self,
        filter: Document,
        page: u64,
        page_size: u64,
    ) -> Result<(Vec<Sale>, u64), AppError> {
        let total = self.sales().count_documents(filter.clone(), None).await?;
        let options = FindOptions::builder()
            .sort(doc! { "created_at": -1 })
            .skip((page.saturating_sub(1)) * page_size)
            .limit(page_size as i64)
            .build();
        let cursor = self.sales().find(filter, options).await?;
        Ok((cursor.try_collect().await?, total))
    }

    // =========================================================================
    // Stock
    // =========================================================================

    /// Conditional decrement; returns false when the product is missing or
    /// understocked. The `$gte` guard keeps `stock >= 0` without a
    /// read-modify-write race.
    pub async fn try_decrement_stock(
        &self,
        product_id: Uuid,
        quantity: i64,
    ) -> Result<bool, AppError> {
        let result = self
            .products()
            .update_one(
                doc! { "_id": product_id.to_string(), "stock": { "$gte": quantity } },
                doc! {
                    "$inc": { "stock": -quantity },
                    "$set": { "updated_at": bson::DateTime::now() },
                },
                None,
            )
            .await?;
        Ok(result.matched_count == 1)
    }

    pub async fn restore_stock(&self, product_id: Uuid, quantity: i64) -> Result<(), AppError> {
        self.products()
            .update_one(
                doc! { "_id": product_id.to_string() },
                doc! {
                    "$inc": { "stock": quantity },
                    "$set": { "updated_at": bson::DateTime::now() },
                },
                None,
            )
            .await?;
        Ok(())
    }

    // =========================================================================
    // Products / Customers
    // =========================================================================

    /// Raw error so callers can map unique-index violations to 409.
    pub async fn insert_product(&self, product: &Product) -> Result<(), mongodb::error::Error> {
        self.products().insert_one(product, None).await?;
        Ok(())
    }

    pub async fn get_product(&self, id: Uuid) -> Result<Option<Product>, AppError> {
        Ok(self
            .products()
            .find_one(doc! { "_id": id.to_string() }, None)
            .await?)
    }

    pub async fn list_products(
        &self,
        filter: Document,
        page: u64,
        page_size: u64,
    ) -> Result<(Vec<Product>, u64), AppError> {
        let total = self.products().count_documents(filter.clone(), None).await?;
        let options = FindOptions::builder()
            .sort(doc! { "name": 1 })
            .skip((page.saturating_sub(1)) * page_size)
            .limit(page_size as i64)
            .build();
        let cursor = self.products().find(filter, options).await?;
        Ok((cursor.try_collect().await?, total))
    }

    /// Raw error so callers can map unique-index violations to 409.
    pub async fn insert_customer(&self, customer: &Customer) -> Result<(), mongodb::error::Error> {
        self.customers().insert_one(customer, None).await?;
        Ok(())
    }

    pub async fn get_customer(&self, id: Uuid) -> Result<Option<Customer>, AppError> {
        Ok(self
            .customers()
            .find_one(doc! { "_id": id.to_string() }, None)
            .await?)
    }

    pub async fn list_customers(
        &self,
        filter: Document,
        page: u64,
        page_size: u64,
    ) -> Result<(Vec<Customer>, u64), AppError> {
        let total = self
            .customers()
            .count_documents(filter.clone(), None)
            .await?;
        let options = FindOptions::builder()
            .sort(doc! { "name": 1 })
            .skip((page.saturating_sub(1)) * page_size)
            .limit(page_size as i64)
            .build();
        let cursor = self.customers().find(filter, options).await?;
        Ok((cursor.try_collect().await?, total))
    }

    /// `(purchase count, total spent)` over non-cancelled sales.
    pub async fn customer_purchase_stats(
        &self,
        customer_id: Uuid,
    ) -> Result<(u64, f64), AppError> {
        let pipeline = vec![
            doc! { "$match": {
                "customer_id": customer_id.to_string(),
                "status": { "$ne": SaleStatus::Cancelled.as_str() },
            } },
            doc! { "$group": {
                "_id": null,
                "count": { "$sum": 1 },
                "total": { "$sum": "$total" },
            } },
        ];

        let mut cursor = self.sales().aggregate(pipeline, None).await?;
        if let Some(doc) = cursor.try_next().await? {
            Ok((count_field(&doc, "count"), doc.get_f64("total").unwrap_or(0.0)))
        } else {
            Ok((0, 0.0))
        }
    }

    pub async fn recent_sales_for_customer(
        &self,
        customer_id: Uuid,
        limit: i64,
    ) -> Result<Vec<Sale>, AppError> {
        let options = FindOptions::builder()
            .sort(doc! { "created_at": -1 })
            .limit(limit)
            .build();
        let cursor = self
            .sales()
            .find(doc! { "customer_id": customer_id.to_string() }, options)
            .await?;
        Ok(cursor.try_collect().await?)
    }

    // =========================================================================
    // Receipts
    // =========================================================================

    /// Raw error so the caller can detect receipt-number collisions and retry.
    pub async fn insert_receipt(
        &self,
        receipt: &ReceiptHistory,
    ) -> Result<(), mongodb::error::Error> {
        self.receipts().insert_one(receipt, None).await?;
        Ok(())
    }

    pub async fn get_receipt_by_number(
        &self,
        receipt_number: &str,
    ) -> Result<Option<ReceiptHistory>, AppError> {
        Ok(self
            .receipts()
            .find_one(doc! { "receipt_number": receipt_number }, None)
            .await?)
    }

    /// Latest receipt issued for a payment.
    pub async fn get_receipt_by_payment(
        &self,
        payment_id: Uuid,
    ) -> Result<Option<ReceiptHistory>, AppError> {
        let options = FindOneOptions::builder()
            .sort(doc! { "generated_at": -1 })
            .build();
        Ok(self
            .receipts()
            .find_one(doc! { "payment_id": payment_id.to_string() }, options)
            .await?)
    }

    pub async fn list_receipts(
        &self,
        filter: Document,
        page: u64,
        page_size: u64,
    ) -> Result<(Vec<ReceiptHistory>, u64), AppError> {
        let total = self.receipts().count_documents(filter.clone(), None).await?;
        let options = FindOptions::builder()
            .sort(doc! { "generated_at": -1 })
            .skip((page.saturating_sub(1)) * page_size)
            .limit(page_size as i64)
            .build();
        let cursor = self.receipts().find(filter, options).await?;
        Ok((cursor.try_collect().await?, total))
    }

    /// Persist the email-delivery fields after a send attempt.
    pub async fn update_receipt_email(&self, receipt: &ReceiptHistory) -> Result<(), AppError> {
        self.receipts()
            .update_one(
                doc! { "receipt_number": &receipt.receipt_number },
                doc! { "$set": {
                    "email_sent_to": receipt.email_sent_to.clone(),
                    "email_sent_at": receipt.email_sent_at.map(bson::DateTime::from_chrono),
                    "email_status": receipt.email_status.map(|s| s.to_string()),
                    "email_error": receipt.email_error.clone(),
                } },
                None,
            )
            .await?;
        Ok(())
    }

    pub async fn update_receipt_signature(
        &self,
        receipt_number: &str,
        signature: &SignatureBlock,
    ) -> Result<(), AppError> {
        let sig = bson::to_bson(signature)
            .map_err(|e| AppError::InternalError(anyhow::anyhow!("Signature encoding: {}", e)))?;
        self.receipts()
            .update_one(
                doc! { "receipt_number": receipt_number },
                doc! { "$set": { "signature": sig } },
                None,
            )
            .await?;
        Ok(())
    }

    /// Single-pass `$facet` aggregation: overall count, counts per email
    /// status, and a 30-day daily series.
    pub async fn receipt_stats(&self) -> Result<ReceiptStatsResponse, AppError> {
        let since = Utc::now() - Duration::days(30);
        let pipeline = vec![doc! { "$facet": {
            "total": [ { "$count": "count" } ],
            "byEmailStatus": [
                { "$group": { "_id": "$email_status", "count": { "$sum": 1 } } },
            ],
            "daily": [
                { "$match": { "generated_at": { "$gte": bson::DateTime::from_chrono(since) } } },
                { "$group": {
                    "_id": { "$dateToString": { "format": "%Y-%m-%d", "date": "$generated_at" } },
                    "count": { "$sum": 1 },
                } },
                { "$sort": { "_id": 1 } },
            ],
        } }];

        let mut cursor = self.receipts().aggregate(pipeline, None).await?;
        let facets = cursor
            .try_next()
            .await?
            .ok_or_else(|| AppError::DatabaseError(anyhow::anyhow!("Empty $facet result")))?;

        let total_receipts = facets
            .get_array("total")
            .ok()
            .and_then(|arr| arr.first())
            .and_then(|b| b.as_document())
            .map(|d| count_field(d, "count"))
            .unwrap_or(0);

        let mut by_email_status = EmailStatusCounts::default();
        if let Ok(groups) = facets.get_array("byEmailStatus") {
            for group in groups.iter().filter_map(|b| b.as_document()) {
                let count = count_field(group, "count");
                match group.get_str("_id") {
                    Ok("sent") => by_email_status.sent = count,
                    Ok("failed") => by_email_status.failed = count,
                    Ok("pending") => by_email_status.pending = count,
                    _ => {}
                }
            }
        }

        let daily = facets
            .get_array("daily")
            .map(|arr| {
                arr.iter()
                    .filter_map(|b| b.as_document())
                    .map(|d| DailyCount {
                        date: d.get_str("_id").unwrap_or_default().to_string(),
                        count: count_field(d, "count"),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(ReceiptStatsResponse {
            total_receipts,
            by_email_status,
            daily,
        })
    }

    // =========================================================================
    // Receipt jobs (outbox)
    // =========================================================================

    /// Claim the oldest pending job below the attempt cap, flipping it to
    /// `processing` and bumping the attempt counter in one atomic step.
    pub async fn claim_pending_job(
        &self,
        max_attempts: u32,
    ) -> Result<Option<ReceiptJob>, AppError> {
        // A `processing` row whose lease has expired belongs to a worker
        // that died between claim and settle; it is claimable again.
        let lease_expired =
            bson::DateTime::from_chrono(Utc::now() - Duration::minutes(CLAIM_LEASE_MINUTES));
        let options = FindOneAndUpdateOptions::builder()
            .sort(doc! { "created_at": 1 })
            .return_document(ReturnDocument::After)
            .build();
        Ok(self
            .receipt_jobs()
            .find_one_and_update(
                doc! {
                    "attempts": { "$lt": max_attempts as i64 },
                    "$or": [
                        { "status": JobStatus::Pending.to_string() },
                        {
                            "status": JobStatus::Processing.to_string(),
                            "updated_at": { "$lt": lease_expired },
                        },
                    ],
                },
                doc! {
                    "$set": {
                        "status": JobStatus::Processing.to_string(),
                        "updated_at": bson::DateTime::now(),
                    },
                    "$inc": { "attempts": 1 },
                },
                options,
            )
            .await?)
    }

    pub async fn complete_job(&self, id: Uuid) -> Result<(), AppError> {
        self.receipt_jobs()
            .update_one(
                doc! { "_id": id.to_string() },
                doc! { "$set": {
                    "status": JobStatus::Completed.to_string(),
                    "last_error": null,
                    "updated_at": bson::DateTime::now(),
                } },
                None,
            )
            .await?;
        Ok(())
    }

    /// Put a claimed job back. Below the attempt cap it returns to `pending`
    /// for another try; at the cap it is parked as `failed`.
    pub async fn release_job(
        &self,
        job: &ReceiptJob,
        error: &str,
        max_attempts: u32,
    ) -> Result<(), AppError> {
        let status = if job.attempts >= max_attempts {
            JobStatus::Failed
        } else {
            JobStatus::Pending
        };
        self.receipt_jobs()
            .update_one(
                doc! { "_id": job.id.to_string() },
                doc! { "$set": {
                    "status": status.to_string(),
                    "last_error": error,
                    "updated_at": bson::DateTime::now(),
                } },
                None,
            )
            .await?;
        Ok(())
    }

    /// Marks the outbox jobs of a payment completed after a successful inline
    /// generation, so the worker does not produce a second receipt.
    pub async fn complete_jobs_for_payment(&self, payment_id: Uuid) -> Result<(), AppError> {
        self.receipt_jobs()
            .update_many(
                doc! {
                    "payment_id": payment_id.to_string(),
                    "status": JobStatus::Pending.to_string(),
                },
                doc! { "$set": {
                    "status": JobStatus::Completed.to_string(),
                    "updated_at": bson::DateTime::now(),
                } },
                None,
            )
            .await?;
        Ok(())
    }
}

/// `$sum`/`$count` produce Int32 or Int64 depending on the server.
fn count_field(doc: &Document, key: &str) -> u64 {
    doc.get_i64(key)
        .ok()
        .or_else(|| doc.get_i32(key).ok().map(i64::from))
        .unwrap_or(0)
        .max(0) as u64
}

use std::sync::Arc;
use std::time::Duration;

use service_core::error::AppError;
use tokio_util::sync::CancellationToken;

use crate::config::WorkerConfig;
use crate::models::ReceiptJob;
use crate::services::database::PosDb;
use crate::services::email::Mailer;
use crate::services::receipts::ReceiptService;

/// Drains the receipt outbox. Jobs are written in the payment transaction;
/// when the request path fails to generate the receipt inline, this worker
/// picks the pending job up and retries until the attempt cap.
pub struct ReceiptOutboxWorker {
    config: WorkerConfig,
    db: PosDb,
    receipts: Arc<ReceiptService>,
    mailer: Arc<dyn Mailer>,
    shutdown_token: CancellationToken,
}

impl ReceiptOutboxWorker {
    pub fn new(
        config: WorkerConfig,
        db: PosDb,
        receipts: Arc<ReceiptService>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        Self {
            config,
            db,
            receipts,
            mailer,
            shutdown_token: CancellationToken::new(),
        }
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    pub async fn run(self) {
        if !self.config.enabled {
            tracing::info!("Receipt outbox worker disabled by configuration");
            return;
        }

        let poll_interval = Duration::from_secs(self.config.poll_interval_secs);
        tracing::info!(
            poll_interval_secs = self.config.poll_interval_secs,
            max_attempts = self.config.max_attempts,
            "Receipt outbox worker started"
        );

        loop {
            tokio::select! {
                _ = self.shutdown_token.cancelled() => {
                    tracing::info!("Receipt outbox worker shutting down");
                    break;
                }
                _ = tokio::time::sleep(poll_interval) => {
                    self.drain_pending().await;
                }
            }
        }
    }

    /// Claims and processes pending jobs until the queue is empty or the
    /// shutdown token fires.
    async fn drain_pending(&self) {
        loop {
            if self.shutdown_token.is_cancelled() {
                return;
            }

            let job = match self.db.claim_pending_job(self.config.max_attempts).await {
                Ok(Some(job)) => job,
                Ok(None) => return,
                Err(e) => {
                    tracing::error!("Failed to claim receipt job: {}", e);
                    return;
                }
            };

            tracing::info!(
                job_id = %job.id,
                payment_id = %job.payment_id,
                attempt = job.attempts,
                "Processing receipt job"
            );

            match self.process_job(&job).await {
                Ok(receipt_number) => {
                    if let Err(e) = self.db.complete_job(job.id).await {
                        tracing::error!(job_id = %job.id, "Failed to complete job: {}", e);
                    } else {
                        tracing::info!(
                            job_id = %job.id,
                            receipt_number = %receipt_number,
                            "Receipt job completed"
                        );
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        job_id = %job.id,
                        attempt = job.attempts,
                        "Receipt job failed: {}",
                        e
                    );
                    if let Err(release_err) = self
                        .db
                        .release_job(&job, &e.to_string(), self.config.max_attempts)
                        .await
                    {
                        tracing::error!(job_id = %job.id, "Failed to release job: {}", release_err);
                    }
                }
            }
        }
    }

    async fn process_job(&self, job: &ReceiptJob) -> Result<String, AppError> {
        let payment = self
            .db
            .get_payment(job.payment_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Pagamento não encontrado")))?;
        let sale = self
            .db
            .get_sale(job.sale_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Venda não encontrada")))?;
        let customer = match sale.customer_id {
            Some(id) => self.db.get_customer(id).await?,
            None => None,
        };

        // A receipt may already exist when the inline path generated one but
        // the job settlement raced a crash.
        let (mut history, pdf) = match self.db.get_receipt_by_payment(payment.id).await? {
            Some(history) => {
                let (pdf, _) = self.receipts.pdf_for_history(&self.db, &history).await?;
                (history, pdf)
            }
            None => {
                self.receipts
                    .generate_for_payment(&self.db, &payment, &sale, customer.as_ref())
                    .await?
            }
        };

        if job.send_email {
            let recipient = job
                .recipient
                .clone()
                .or_else(|| customer.as_ref().and_then(|c| c.email.clone()));
            if let Some(recipient) = recipient {
                let data = self.receipts.build_data(
                    history.receipt_number.clone(),
                    &payment,
                    &sale,
                    customer.as_ref(),
                )?;
                match self.mailer.send_receipt(&recipient, &data, &pdf).await {
                    Ok(()) => history.mark_email_sent(&recipient),
                    Err(e) => {
                        tracing::warn!(
                            receipt_number = %history.receipt_number,
                            "Receipt email failed in worker: {}",
                            e
                        );
                        history.mark_email_failed(&recipient, e.to_string());
                    }
                }
                self.db.update_receipt_email(&history).await?;
            }
        }

        Ok(history.receipt_number)
    }
}

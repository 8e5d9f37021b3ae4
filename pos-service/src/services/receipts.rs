use base64::{engine::general_purpose, Engine as _};
use chrono::{Datelike, SecondsFormat, Utc};
use image::{DynamicImage, Luma};
use qrcode::QrCode;
use rand::Rng;
use serde::Serialize;
use service_core::error::AppError;
use std::io::Cursor;
use uuid::Uuid;

use crate::config::ReceiptConfig;
use crate::models::{Customer, Payment, ReceiptHistory, Sale, SignatureBlock};
use crate::services::database::PosDb;
use crate::services::pdf::{PdfRenderer, QrRaster};
use crate::services::signature::ReceiptSigner;
use crate::services::storage::ReceiptStorage;

/// Quiet zone around the QR code, in modules.
const QR_QUIET_ZONE: usize = 4;
/// Attempts before giving up on a non-colliding receipt number.
const MAX_COLLISION_RETRIES: usize = 5;

#[derive(Debug, Clone)]
pub struct CompanyInfo {
    pub name: String,
    pub document: String,
    pub address: String,
}

/// Everything the renderers (PDF and email) need about one receipt:
/// snapshots of the sale and payment plus the derived artifacts.
#[derive(Debug, Clone)]
pub struct ReceiptData {
    pub receipt_number: String,
    pub verification_url: String,
    /// JSON string encoded into the QR code.
    pub qr_payload: String,
    pub company: CompanyInfo,
    pub sale: Sale,
    pub payment: Payment,
    pub customer_name: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QrPayload<'a> {
    receipt_number: &'a str,
    payment_id: Uuid,
    sale_id: Uuid,
    amount: f64,
    date: String,
    verification_url: &'a str,
}

/// Receipt generation: numbers, QR payloads, PDF artifacts and their audit
/// records. Explicitly constructed and injected; holds no process-wide state.
pub struct ReceiptService {
    config: ReceiptConfig,
    renderer: PdfRenderer,
    storage: ReceiptStorage,
    signer: Option<ReceiptSigner>,
}

impl ReceiptService {
    pub fn new(
        config: ReceiptConfig,
        renderer: PdfRenderer,
        storage: ReceiptStorage,
        signer: Option<ReceiptSigner>,
    ) -> Self {
        Self {
            config,
            renderer,
            storage,
            signer,
        }
    }

    pub fn signer(&self) -> Option<&ReceiptSigner> {
        self.signer.as_ref()
    }

    pub fn storage(&self) -> &ReceiptStorage {
        &self.storage
    }

    /// `REC{year}{month}{4 random digits}`. Not globally unique on its own;
    /// the unique index on `receipt_number` plus the insert-retry loop in
    /// [`generate_for_payment`](Self::generate_for_payment) make it so.
    pub fn generate_number() -> String {
        let now = Utc::now();
        format!(
            "REC{}{:02}{:04}",
            now.year(),
            now.month(),
            rand::thread_rng().gen_range(0..10_000)
        )
    }

    pub fn verification_url(&self, receipt_number: &str) -> String {
        format!(
            "{}/api/receipts/verify/{}",
            self.config.public_base_url.trim_end_matches('/'),
            receipt_number
        )
    }

    pub fn build_data(
        &self,
        receipt_number: String,
        payment: &Payment,
        sale: &Sale,
        customer: Option<&Customer>,
    ) -> Result<ReceiptData, AppError> {
        let verification_url = self.verification_url(&receipt_number);
        let payload = QrPayload {
            receipt_number: &receipt_number,
            payment_id: payment.id,
            sale_id: sale.id,
            amount: payment.amount,
            date: payment
                .created_at
                .to_rfc3339_opts(SecondsFormat::Secs, true),
            verification_url: &verification_url,
        };
        let qr_payload = serde_json::to_string(&payload)
            .map_err(|e| AppError::InternalError(anyhow::anyhow!("QR payload: {}", e)))?;

        Ok(ReceiptData {
            receipt_number,
            verification_url,
            qr_payload,
            company: CompanyInfo {
                name: self.config.company_name.clone(),
                document: self.config.company_document.clone(),
                address: self.config.company_address.clone(),
            },
            sale: sale.clone(),
            payment: payment.clone(),
            customer_name: customer.map(|c| c.name.clone()),
        })
    }

    /// Greyscale raster for PDF embedding.
    pub fn qr_raster(&self, payload: &str) -> Result<QrRaster, AppError> {
        let code = QrCode::new(payload.as_bytes())
            .map_err(|e| AppError::InternalError(anyhow::anyhow!("QR encoding: {}", e)))?;
        let module_px = self.renderer.quality().qr_module_px();
        let modules = code.width();
        let width = (modules + 2 * QR_QUIET_ZONE) * module_px;

        let colors = code.to_colors();
        let mut pixels = vec![255u8; width * width];
        for my in 0..modules {
            for mx in 0..modules {
                if colors[my * modules + mx] == qrcode::Color::Dark {
                    let base_x = (mx + QR_QUIET_ZONE) * module_px;
                    let base_y = (my + QR_QUIET_ZONE) * module_px;
                    for dy in 0..module_px {
                        let row = (base_y + dy) * width;
                        for dx in 0..module_px {
                            pixels[row + base_x + dx] = 0;
                        }
                    }
                }
            }
        }

        Ok(QrRaster { width, pixels })
    }

    /// PNG data-URL, persisted on `ReceiptHistory.qr_code_data` and returned
    /// by the verification endpoint.
    pub fn qr_data_url(&self, payload: &str) -> Result<String, AppError> {
        let code = QrCode::new(payload.as_bytes())
            .map_err(|e| AppError::InternalError(anyhow::anyhow!("QR encoding: {}", e)))?;
        let image = code.render::<Luma<u8>>().build();

        let dynamic_image = DynamicImage::ImageLuma8(image);
        let mut buffer = Cursor::new(Vec::new());
        dynamic_image
            .write_to(&mut buffer, image::ImageOutputFormat::Png)
            .map_err(|e| AppError::InternalError(anyhow::anyhow!("QR PNG: {}", e)))?;

        Ok(format!(
            "data:image/png;base64,{}",
            general_purpose::STANDARD.encode(buffer.get_ref())
        ))
    }

    /// Full generation pipeline for one payment: number, QR, PDF, file,
    /// signature, audit record. Collisions on the unique `receipt_number`
    /// index regenerate the number and try again instead of surfacing the
    /// constraint error.
    pub async fn generate_for_payment(
        &self,
        db: &PosDb,
        payment: &Payment,
        sale: &Sale,
        customer: Option<&Customer>,
    ) -> Result<(ReceiptHistory, Vec<u8>), AppError> {
        for attempt in 0..MAX_COLLISION_RETRIES {
            let number = Self::generate_number();
            let data = self.build_data(number.clone(), payment, sale, customer)?;
            let raster = self.qr_raster(&data.qr_payload)?;
            let pdf = self.renderer.render(&data, &raster)?;
            let signature = self.signer.as_ref().map(|s| s.sign(&pdf, &number));

            self.storage.save(&number, &pdf).await?;

            let history = ReceiptHistory {
                id: Uuid::new_v4(),
                receipt_number: number.clone(),
                payment_id: payment.id,
                sale_id: sale.id,
                amount: payment.amount,
                qr_code_data: self.qr_data_url(&data.qr_payload)?,
                verification_url: data.verification_url.clone(),
                file_path: Some(self.storage.relative_path(&number)),
                signature,
                email_sent_to: None,
                email_sent_at: None,
                email_status: None,
                email_error: None,
                generated_at: Utc::now(),
                generated_by: payment.processed_by.clone(),
            };

            match db.insert_receipt(&history).await {
                Ok(()) => {
                    tracing::info!(
                        receipt_number = %number,
                        payment_id = %payment.id,
                        "Receipt generated"
                    );
                    return Ok((history, pdf));
                }
                Err(e) if PosDb::is_duplicate_key(&e) && attempt + 1 < MAX_COLLISION_RETRIES => {
                    tracing::warn!(
                        receipt_number = %number,
                        attempt = attempt,
                        "Receipt number collision, regenerating"
                    );
                    self.storage.delete(&number).await.ok();
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(AppError::InternalError(anyhow::anyhow!(
            "Could not allocate a unique receipt number after {} attempts",
            MAX_COLLISION_RETRIES
        )))
    }

    /// Rebuild the renderable data of an already-issued receipt from the
    /// persisted graph.
    pub async fn data_for_history(
        &self,
        db: &PosDb,
        history: &ReceiptHistory,
    ) -> Result<ReceiptData, AppError> {
        let payment = db
            .get_payment(history.payment_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Pagamento não encontrado")))?;
        let sale = db
            .get_sale(payment.sale_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Venda não encontrada")))?;
        let customer = match sale.customer_id {
            Some(id) => db.get_customer(id).await?,
            None => None,
        };
        self.build_data(
            history.receipt_number.clone(),
            &payment,
            &sale,
            customer.as_ref(),
        )
    }

    /// Serve the cached artifact, or regenerate it when the file is gone.
    /// Regeneration produces fresh bytes, so the receipt is re-signed and the
    /// stored signature replaced; the returned block always matches the
    /// returned bytes.
    pub async fn pdf_for_history(
        &self,
        db: &PosDb,
        history: &ReceiptHistory,
    ) -> Result<(Vec<u8>, Option<SignatureBlock>), AppError> {
        if let Some(bytes) = self.storage.load(&history.receipt_number).await? {
            return Ok((bytes, history.signature.clone()));
        }

        tracing::info!(
            receipt_number = %history.receipt_number,
            "Cached receipt file missing, regenerating"
        );

        let data = self.data_for_history(db, history).await?;
        let raster = self.qr_raster(&data.qr_payload)?;
        let pdf = self.renderer.render(&data, &raster)?;
        let signature = self
            .signer
            .as_ref()
            .map(|s| s.sign(&pdf, &history.receipt_number));

        self.storage.save(&history.receipt_number, &pdf).await?;
        if let Some(ref sig) = signature {
            db.update_receipt_signature(&history.receipt_number, sig)
                .await?;
        }

        Ok((pdf, signature))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReceiptConfig;
    use crate::models::{PaymentMethod, SaleItem};
    use crate::services::pdf::PdfQuality;

    async fn service() -> ReceiptService {
        let config = ReceiptConfig {
            storage_dir: std::env::temp_dir()
                .join(format!("receipts-{}", Uuid::new_v4()))
                .to_string_lossy()
                .into_owned(),
            public_base_url: "https://loja.example.com/".to_string(),
            company_name: "Minha Loja".to_string(),
            company_document: "12.345.678/0001-90".to_string(),
            company_address: "Rua das Flores, 100".to_string(),
            pdf_quality: "high".to_string(),
        };
        let storage = ReceiptStorage::new(&config.storage_dir)
            .await
            .expect("storage init");
        ReceiptService::new(
            config,
            PdfRenderer::new(PdfQuality::High),
            storage,
            None,
        )
    }

    fn sample_sale() -> Sale {
        Sale::new(
            vec![SaleItem::new(
                Uuid::new_v4(),
                "Café".to_string(),
                1,
                100.0,
                0.0,
            )],
            0.0,
            0.0,
            None,
            None,
        )
    }

    #[test]
    fn receipt_number_has_the_documented_format() {
        let number = ReceiptService::generate_number();
        assert!(number.starts_with("REC"));
        assert_eq!(number.len(), "REC".len() + 4 + 2 + 4);
        assert!(number["REC".len()..].chars().all(|c| c.is_ascii_digit()));
    }

    #[tokio::test]
    async fn verification_url_normalizes_trailing_slash() {
        let svc = service().await;
        assert_eq!(
            svc.verification_url("REC2025080001"),
            "https://loja.example.com/api/receipts/verify/REC2025080001"
        );
    }

    #[tokio::test]
    async fn qr_payload_round_trips_as_json() {
        let svc = service().await;
        let sale = sample_sale();
        let payment = Payment::new(sale.id, 100.0, PaymentMethod::Cash, None, None, None);
        let data = svc
            .build_data("REC2025080001".to_string(), &payment, &sale, None)
            .unwrap();

        let parsed: serde_json::Value = serde_json::from_str(&data.qr_payload).unwrap();
        assert_eq!(parsed["receiptNumber"], "REC2025080001");
        assert_eq!(parsed["amount"], 100.0);
        assert_eq!(
            parsed["verificationUrl"],
            "https://loja.example.com/api/receipts/verify/REC2025080001"
        );
        assert_eq!(parsed["paymentId"], payment.id.to_string());
        assert_eq!(parsed["saleId"], sale.id.to_string());
    }

    #[tokio::test]
    async fn qr_raster_has_quiet_zone_and_dark_modules() {
        let svc = service().await;
        let raster = svc.qr_raster("hello").unwrap();
        assert_eq!(raster.pixels.len(), raster.width * raster.width);
        // Quiet zone: the first rows are all white.
        assert!(raster.pixels[..raster.width].iter().all(|&p| p == 255));
        // Somewhere there must be dark modules.
        assert!(raster.pixels.iter().any(|&p| p == 0));
    }

    #[tokio::test]
    async fn qr_data_url_is_a_png_data_url() {
        let svc = service().await;
        let url = svc.qr_data_url("hello").unwrap();
        assert!(url.starts_with("data:image/png;base64,"));
        let b64 = &url["data:image/png;base64,".len()..];
        let bytes = general_purpose::STANDARD.decode(b64).unwrap();
        assert_eq!(&bytes[1..4], b"PNG");
    }
}

//! Receipt artifact pipeline exercised without MongoDB or SMTP: QR payload,
//! PDF rendering, detached signature, disk storage and the email body.

use base64::{engine::general_purpose, Engine as _};
use uuid::Uuid;

use pos_service::config::ReceiptConfig;
use pos_service::models::{Payment, PaymentMethod, Sale, SaleItem};
use pos_service::services::email::render_receipt_html;
use pos_service::services::{
    MockMailer, PdfQuality, PdfRenderer, ReceiptService, ReceiptSigner, ReceiptStorage,
};

fn receipt_config(storage_dir: &str) -> ReceiptConfig {
    ReceiptConfig {
        storage_dir: storage_dir.to_string(),
        public_base_url: "https://loja.example.com".to_string(),
        company_name: "Minha Loja".to_string(),
        company_document: "12.345.678/0001-90".to_string(),
        company_address: "Rua das Flores, 100 - São Paulo".to_string(),
        pdf_quality: "high".to_string(),
    }
}

fn sample_sale() -> Sale {
    Sale::new(
        vec![
            SaleItem::new(Uuid::new_v4(), "Café torrado 500g".to_string(), 2, 25.0, 0.0),
            SaleItem::new(Uuid::new_v4(), "Filtro de papel".to_string(), 1, 10.0, 2.0),
        ],
        0.0,
        0.0,
        None,
        None,
    )
}

#[tokio::test]
async fn pipeline_produces_signed_verifiable_artifact() {
    let dir = std::env::temp_dir().join(format!("pipeline-{}", Uuid::new_v4()));
    let storage = ReceiptStorage::new(&dir).await.unwrap();

    let seed: [u8; 32] = rand::random();
    let seed_b64 = general_purpose::STANDARD.encode(seed);
    let signer = ReceiptSigner::from_base64_seed(&seed_b64, "pos-test".to_string()).unwrap();
    let verifier = ReceiptSigner::from_base64_seed(&seed_b64, "pos-test".to_string()).unwrap();

    let service = ReceiptService::new(
        receipt_config(&dir.to_string_lossy()),
        PdfRenderer::new(PdfQuality::High),
        storage,
        Some(signer),
    );

    let sale = sample_sale();
    let payment = Payment::new(sale.id, sale.total, PaymentMethod::Pix, None, None, None);
    let number = ReceiptService::generate_number();

    let data = service
        .build_data(number.clone(), &payment, &sale, None)
        .unwrap();
    let raster = service.qr_raster(&data.qr_payload).unwrap();
    let pdf = PdfRenderer::new(PdfQuality::High)
        .render(&data, &raster)
        .unwrap();
    assert!(pdf.starts_with(b"%PDF"));

    // Detached signature over the exact bytes verifies; any tampering breaks it.
    let block = verifier.sign(&pdf, &number);
    assert!(verifier.verify_for(&pdf, &number, &block));
    let mut tampered = pdf.clone();
    tampered[100] ^= 0xff;
    assert!(!verifier.verify_for(&tampered, &number, &block));

    // Storage round trip keeps the artifact byte-identical.
    let storage = ReceiptStorage::new(&dir).await.unwrap();
    storage.save(&number, &pdf).await.unwrap();
    assert_eq!(storage.load(&number).await.unwrap(), Some(pdf));

    tokio::fs::remove_dir_all(dir).await.ok();
}

#[tokio::test]
async fn email_body_references_the_receipt() {
    let dir = std::env::temp_dir().join(format!("mailbody-{}", Uuid::new_v4()));
    let storage = ReceiptStorage::new(&dir).await.unwrap();
    let service = ReceiptService::new(
        receipt_config(&dir.to_string_lossy()),
        PdfRenderer::new(PdfQuality::Medium),
        storage,
        None,
    );

    let sale = sample_sale();
    let payment = Payment::new(sale.id, sale.total, PaymentMethod::CreditCard, None, None, None);
    let data = service
        .build_data("REC2025080042".to_string(), &payment, &sale, None)
        .unwrap();

    let html = render_receipt_html(&data);
    assert!(html.contains("REC2025080042"));
    assert!(html.contains("Café torrado 500g"));
    assert!(html.contains("Minha Loja"));
    assert!(html.contains(&data.verification_url));

    tokio::fs::remove_dir_all(dir).await.ok();
}

#[tokio::test]
async fn mock_mailer_counts_deliveries() {
    let dir = std::env::temp_dir().join(format!("mockmail-{}", Uuid::new_v4()));
    let storage = ReceiptStorage::new(&dir).await.unwrap();
    let service = ReceiptService::new(
        receipt_config(&dir.to_string_lossy()),
        PdfRenderer::new(PdfQuality::Low),
        storage,
        None,
    );

    let sale = sample_sale();
    let payment = Payment::new(sale.id, sale.total, PaymentMethod::Cash, None, None, None);
    let data = service
        .build_data("REC2025080001".to_string(), &payment, &sale, None)
        .unwrap();

    use pos_service::services::Mailer;
    let mailer = MockMailer::new();
    mailer
        .send_receipt("ana@example.com", &data, b"%PDF-fake")
        .await
        .unwrap();
    assert_eq!(mailer.send_count(), 1);

    tokio::fs::remove_dir_all(dir).await.ok();
}

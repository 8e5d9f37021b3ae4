//! End-to-end payment and receipt flow against a real MongoDB.
//!
//! All tests here are ignored by default because the payment path runs
//! multi-document transactions, which require a replica-set MongoDB.
//! Run with `cargo test -- --ignored` after pointing `MONGODB_URI` at one.

mod common;

use common::spawn_app;
use serde_json::json;

#[tokio::test]
#[ignore = "Requires a replica-set MongoDB (MONGODB_URI)"]
async fn full_payment_returns_pdf_and_marks_sale_paid() {
    let app = spawn_app().await;
    let product_id = app.create_product("Café torrado 500g", 25.0, 10).await;
    let sale_id = app.create_sale(product_id, 2).await;

    let response = app
        .post_json(
            "/api/payments",
            &json!({ "saleId": sale_id, "amount": 50.0, "method": "cash" }),
        )
        .await;

    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers()["content-type"].to_str().unwrap(),
        "application/pdf"
    );
    let disposition = response.headers()["content-disposition"]
        .to_str()
        .unwrap()
        .to_string();
    assert!(disposition.contains("REC"));

    let body = response.bytes().await.unwrap();
    assert!(body.starts_with(b"%PDF"));

    assert_eq!(app.sale_status(sale_id).await, "paid");
}

#[tokio::test]
#[ignore = "Requires a replica-set MongoDB (MONGODB_URI)"]
async fn partial_payments_accumulate_to_paid() {
    let app = spawn_app().await;
    let product_id = app.create_product("Filtro de papel", 10.0, 100).await;
    let sale_id = app.create_sale(product_id, 10).await; // total 100.0

    let first = app
        .post_json(
            "/api/payments",
            &json!({ "saleId": sale_id, "amount": 40.0, "method": "pix" }),
        )
        .await;
    assert_eq!(first.status(), 200);
    assert_eq!(app.sale_status(sale_id).await, "partially_paid");

    let second = app
        .post_json(
            "/api/payments",
            &json!({ "saleId": sale_id, "amount": 60.0, "method": "credit_card" }),
        )
        .await;
    assert_eq!(second.status(), 200);
    assert_eq!(app.sale_status(sale_id).await, "paid");
}

#[tokio::test]
#[ignore = "Requires a replica-set MongoDB (MONGODB_URI)"]
async fn overpayment_is_accepted() {
    // Current behavior: there is no cap on the paid sum. A payment beyond the
    // sale total is recorded and the sale stays paid.
    let app = spawn_app().await;
    let product_id = app.create_product("Caneca", 30.0, 5).await;
    let sale_id = app.create_sale(product_id, 1).await;

    let full = app
        .post_json(
            "/api/payments",
            &json!({ "saleId": sale_id, "amount": 30.0, "method": "cash" }),
        )
        .await;
    assert_eq!(full.status(), 200);

    let extra = app
        .post_json(
            "/api/payments",
            &json!({ "saleId": sale_id, "amount": 10.0, "method": "cash" }),
        )
        .await;
    assert_eq!(extra.status(), 200);
    assert_eq!(app.sale_status(sale_id).await, "paid");
}

#[tokio::test]
#[ignore = "Requires a replica-set MongoDB (MONGODB_URI)"]
async fn zero_amount_payment_is_rejected() {
    let app = spawn_app().await;
    let product_id = app.create_product("Chaveiro", 5.0, 5).await;
    let sale_id = app.create_sale(product_id, 1).await;

    let response = app
        .post_json(
            "/api/payments",
            &json!({ "saleId": sale_id, "amount": 0.0, "method": "cash" }),
        )
        .await;

    assert_eq!(response.status(), 400);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Valor do pagamento deve ser maior que zero");
}

#[tokio::test]
#[ignore = "Requires a replica-set MongoDB (MONGODB_URI)"]
async fn payment_against_unknown_sale_is_404() {
    let app = spawn_app().await;

    let response = app
        .post_json(
            "/api/payments",
            &json!({
                "saleId": uuid::Uuid::new_v4(),
                "amount": 10.0,
                "method": "cash",
            }),
        )
        .await;

    assert_eq!(response.status(), 404);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Venda não encontrada");
}

#[tokio::test]
#[ignore = "Requires a replica-set MongoDB (MONGODB_URI)"]
async fn cancelling_a_payment_twice_is_rejected() {
    let app = spawn_app().await;
    let product_id = app.create_product("Garrafa térmica", 80.0, 3).await;
    let sale_id = app.create_sale(product_id, 1).await;

    app.post_json(
        "/api/payments",
        &json!({ "saleId": sale_id, "amount": 80.0, "method": "debit_card" }),
    )
    .await;

    // Find the payment through the receipt listing.
    let receipts: serde_json::Value = app.get("/api/receipts").await.json().await.unwrap();
    let payment_id = receipts["receipts"][0]["paymentId"].as_str().unwrap().to_string();

    let first = app.patch(&format!("/api/payments/{}/cancel", payment_id)).await;
    assert_eq!(first.status(), 200);
    assert_eq!(app.sale_status(sale_id).await, "pending");

    let second = app.patch(&format!("/api/payments/{}/cancel", payment_id)).await;
    assert_eq!(second.status(), 400);
    let body: serde_json::Value = second.json().await.unwrap();
    assert_eq!(body["error"], "Pagamento já está cancelado");
}

#[tokio::test]
#[ignore = "Requires a replica-set MongoDB (MONGODB_URI)"]
async fn sale_with_insufficient_stock_is_rejected_and_compensated() {
    let app = spawn_app().await;
    let plenty = app.create_product("Açúcar", 8.0, 50).await;
    let scarce = app.create_product("Coador raro", 120.0, 1).await;

    let response = app
        .post_json(
            "/api/sales",
            &json!({
                "items": [
                    { "productId": plenty, "quantity": 2 },
                    { "productId": scarce, "quantity": 5 },
                ],
            }),
        )
        .await;

    assert_eq!(response.status(), 400);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Estoque insuficiente para o produto Coador raro");

    // The first item's decrement must have been rolled back.
    let product: serde_json::Value = app
        .get(&format!("/api/products/{}", plenty))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(product["stock"], 50);
}

#[tokio::test]
#[ignore = "Requires a replica-set MongoDB (MONGODB_URI)"]
async fn receipt_can_be_verified_and_downloaded() {
    let app = spawn_app().await;
    let product_id = app.create_product("Moedor manual", 150.0, 2).await;
    let sale_id = app.create_sale(product_id, 1).await;

    let payment = app
        .post_json(
            "/api/payments",
            &json!({ "saleId": sale_id, "amount": 150.0, "method": "pix" }),
        )
        .await;
    assert_eq!(payment.status(), 200);

    let receipts: serde_json::Value = app.get("/api/receipts").await.json().await.unwrap();
    let number = receipts["receipts"][0]["receiptNumber"].as_str().unwrap().to_string();
    assert!(number.starts_with("REC"));

    let verification: serde_json::Value = app
        .get(&format!("/api/receipts/verify/{}", number))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(verification["valid"], true);
    assert_eq!(verification["payment"]["amount"], 150.0);
    assert_eq!(verification["payment"]["methodLabel"], "Pix");
    // The test app holds a signing key, so validity must be reported.
    assert_eq!(verification["signatureValid"], true);
    assert!(verification["qrCodeData"]
        .as_str()
        .unwrap()
        .starts_with("data:image/png;base64,"));

    let download = app
        .get(&format!("/api/receipts/{}/download", number))
        .await;
    assert_eq!(download.status(), 200);
    assert!(download.bytes().await.unwrap().starts_with(b"%PDF"));
}

#[tokio::test]
#[ignore = "Requires a replica-set MongoDB (MONGODB_URI)"]
async fn receipt_stats_have_the_expected_shape() {
    let app = spawn_app().await;
    let product_id = app.create_product("Xícara", 18.0, 10).await;
    let sale_id = app.create_sale(product_id, 1).await;
    app.post_json(
        "/api/payments",
        &json!({ "saleId": sale_id, "amount": 18.0, "method": "cash" }),
    )
    .await;

    let stats: serde_json::Value = app.get("/api/receipts/stats").await.json().await.unwrap();
    assert_eq!(stats["totalReceipts"], 1);
    assert!(stats["byEmailStatus"].is_object());
    assert_eq!(stats["daily"].as_array().unwrap().len(), 1);
}

#[tokio::test]
#[ignore = "Requires a replica-set MongoDB (MONGODB_URI)"]
async fn customer_purchase_history_aggregates_sales() {
    let app = spawn_app().await;

    let customer = app
        .post_json(
            "/api/customers",
            &json!({ "name": "Ana Souza", "email": "ana@example.com" }),
        )
        .await;
    assert_eq!(customer.status(), 201);
    let customer_id = customer.json::<serde_json::Value>().await.unwrap()["id"]
        .as_str()
        .unwrap()
        .to_string();

    let product_id = app.create_product("Prensa francesa", 90.0, 10).await;
    for _ in 0..2 {
        let sale = app
            .post_json(
                "/api/sales",
                &json!({
                    "items": [{ "productId": product_id, "quantity": 1 }],
                    "customerId": customer_id,
                }),
            )
            .await;
        assert_eq!(sale.status(), 201);
    }

    let purchases: serde_json::Value = app
        .get(&format!("/api/customers/{}/purchases", customer_id))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(purchases["totalPurchases"], 2);
    assert_eq!(purchases["totalSpent"], 180.0);
    assert_eq!(purchases["recentSales"].as_array().unwrap().len(), 2);
}

#[tokio::test]
#[ignore = "Requires a replica-set MongoDB (MONGODB_URI)"]
async fn health_endpoints_respond() {
    let app = spawn_app().await;

    let health = app.get("/health").await;
    assert_eq!(health.status(), 200);
    let body: serde_json::Value = health.json().await.unwrap();
    assert_eq!(body["service"], "pos-service");

    assert_eq!(app.get("/ready").await.status(), 200);
}

#[tokio::test]
#[ignore = "Requires a replica-set MongoDB (MONGODB_URI)"]
async fn failed_inline_generation_answers_202_and_the_worker_catches_up() {
    use std::os::unix::fs::PermissionsExt;

    let app = common::spawn_app_with_worker(true).await;
    let product_id = app.create_product("Filtro de papel", 12.0, 10).await;
    let sale_id = app.create_sale(product_id, 1).await;

    // An unwritable receipts dir makes the inline generation fail after the
    // payment commits.
    std::fs::set_permissions(&app.storage_dir, std::fs::Permissions::from_mode(0o555)).unwrap();

    let response = app
        .post_json(
            "/api/payments",
            &json!({ "saleId": sale_id, "amount": 12.0, "method": "pix" }),
        )
        .await;
    assert_eq!(response.status(), 202);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["receiptStatus"], "queued");
    assert_eq!(body["saleStatus"], "paid");
    let payment_id: uuid::Uuid = body["paymentId"]
        .as_str()
        .and_then(|s| s.parse().ok())
        .expect("paymentId");

    // The payment stood even though the receipt did not.
    assert_eq!(app.sale_status(sale_id).await, "paid");

    std::fs::set_permissions(&app.storage_dir, std::fs::Permissions::from_mode(0o755)).unwrap();

    // The worker polls every second; give it a few cycles.
    let mut receipt = None;
    for _ in 0..30 {
        if let Some(found) = app.db.get_receipt_by_payment(payment_id).await.unwrap() {
            receipt = Some(found);
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(500)).await;
    }
    let receipt = receipt.expect("worker never generated the receipt");
    assert!(receipt.receipt_number.starts_with("REC"));

    let response = app
        .get(&format!("/api/payments/{}/receipt", payment_id))
        .await;
    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers()["content-type"].to_str().unwrap(),
        "application/pdf"
    );
    assert!(response.bytes().await.unwrap().starts_with(b"%PDF"));
}

#[tokio::test]
#[ignore = "Requires a replica-set MongoDB (MONGODB_URI)"]
async fn stale_processing_jobs_are_reclaimed() {
    use chrono::{Duration, Utc};
    use pos_service::models::{JobStatus, ReceiptJob};

    let app = spawn_app().await;

    // A job stuck in `processing` by a worker that died mid-flight.
    let mut stale = ReceiptJob::new(uuid::Uuid::new_v4(), uuid::Uuid::new_v4(), false, None);
    stale.status = JobStatus::Processing;
    stale.updated_at = Utc::now() - Duration::minutes(10);

    // A job another worker is legitimately holding right now.
    let mut held = ReceiptJob::new(uuid::Uuid::new_v4(), uuid::Uuid::new_v4(), false, None);
    held.status = JobStatus::Processing;

    app.db.receipt_jobs().insert_one(&stale, None).await.unwrap();
    app.db.receipt_jobs().insert_one(&held, None).await.unwrap();

    let claimed = app
        .db
        .claim_pending_job(3)
        .await
        .unwrap()
        .expect("expired claim should be retaken");
    assert_eq!(claimed.id, stale.id);
    assert_eq!(claimed.attempts, 1);

    assert!(app.db.claim_pending_job(3).await.unwrap().is_none());
}

#[tokio::test]
#[ignore = "Requires a replica-set MongoDB (MONGODB_URI)"]
async fn payment_racing_a_cancelled_sale_is_rejected_in_the_transaction() {
    use pos_service::models::{Payment, PaymentMethod, ReceiptJob};

    let app = spawn_app().await;
    let product_id = app.create_product("Caneca esmaltada", 30.0, 5).await;
    let sale_id = app.create_sale(product_id, 1).await;

    let response = app.patch(&format!("/api/sales/{}/cancel", sale_id)).await;
    assert_eq!(response.status(), 200);

    // Write path directly, as if the handler's pre-check had read the sale
    // before the cancellation landed.
    let payment = Payment::new(sale_id, 30.0, PaymentMethod::Cash, None, None, None);
    let job = ReceiptJob::new(payment.id, sale_id, false, None);
    let err = app
        .db
        .record_payment(&payment, sale_id, &job)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("venda cancelada"));

    assert_eq!(app.sale_status(sale_id).await, "cancelled");
}

#[tokio::test]
#[ignore = "Requires a replica-set MongoDB (MONGODB_URI)"]
async fn resend_receipt_records_the_overridden_recipient() {
    let app = spawn_app().await;
    let product_id = app.create_product("Moedor manual", 80.0, 3).await;
    let sale_id = app.create_sale(product_id, 1).await;

    let response = app
        .post_json(
            "/api/payments",
            &json!({ "saleId": sale_id, "amount": 80.0, "method": "cash" }),
        )
        .await;
    assert_eq!(response.status(), 200);
    response.bytes().await.unwrap();

    let list: serde_json::Value = app.get("/api/receipts").await.json().await.unwrap();
    let payment_id = list["receipts"][0]["paymentId"].as_str().unwrap().to_string();
    let number = list["receipts"][0]["receiptNumber"]
        .as_str()
        .unwrap()
        .to_string();

    let response = app
        .post_json(
            &format!("/api/payments/{}/resend-receipt", payment_id),
            &json!({ "email": "cliente@example.com" }),
        )
        .await;
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["emailSentTo"], "cliente@example.com");
    assert_eq!(body["emailStatus"], "sent");

    let stored: serde_json::Value = app
        .get(&format!("/api/receipts/{}", number))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(stored["emailSentTo"], "cliente@example.com");
    assert_eq!(stored["emailStatus"], "sent");
}

#[tokio::test]
#[ignore = "Requires a replica-set MongoDB (MONGODB_URI)"]
async fn negative_unit_price_override_is_rejected() {
    let app = spawn_app().await;
    let product_id = app.create_product("Açúcar mascavo", 18.0, 10).await;

    let response = app
        .post_json(
            "/api/sales",
            &json!({
                "items": [{ "productId": product_id, "quantity": 1, "unitPrice": -5.0 }],
            }),
        )
        .await;
    assert_eq!(response.status(), 422);
}

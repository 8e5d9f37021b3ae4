//! Shared harness for the HTTP integration tests.
//!
//! Spawns the full application on a random port against a throwaway MongoDB
//! database. The payment flow uses multi-document transactions, so these
//! tests need a replica-set MongoDB (`MONGODB_URI`, default localhost).

use base64::{engine::general_purpose, Engine as _};
use secrecy::Secret;
use std::path::PathBuf;
use uuid::Uuid;

use pos_service::config::{
    MongoConfig, PosConfig, ReceiptConfig, SigningConfig, SmtpConfig, WorkerConfig,
};
use pos_service::services::PosDb;
use pos_service::Application;

pub struct TestApp {
    pub address: String,
    pub client: reqwest::Client,
    pub db: PosDb,
    /// Where the spawned app writes receipt PDFs.
    pub storage_dir: PathBuf,
}

pub async fn spawn_app() -> TestApp {
    spawn_app_with_worker(false).await
}

pub async fn spawn_app_with_worker(worker_enabled: bool) -> TestApp {
    let uri = std::env::var("MONGODB_URI")
        .unwrap_or_else(|_| "mongodb://localhost:27017/?replicaSet=rs0".to_string());
    let seed: [u8; 32] = rand::random();
    let storage_dir = std::env::temp_dir().join(format!("pos-receipts-{}", Uuid::new_v4()));

    let config = PosConfig {
        common: service_core::config::Config { port: 0 },
        mongodb: MongoConfig {
            uri: Secret::new(uri),
            database: format!("pos_test_{}", Uuid::new_v4().simple()),
        },
        smtp: SmtpConfig {
            host: "localhost".to_string(),
            port: 587,
            user: String::new(),
            password: Secret::new(String::new()),
            from_email: "noreply@test.local".to_string(),
            from_name: "Loja Teste".to_string(),
            enabled: false,
        },
        receipts: ReceiptConfig {
            storage_dir: storage_dir.to_string_lossy().into_owned(),
            public_base_url: "http://localhost:8080".to_string(),
            company_name: "Minha Loja".to_string(),
            company_document: "12.345.678/0001-90".to_string(),
            company_address: "Rua das Flores, 100 - São Paulo".to_string(),
            pdf_quality: "low".to_string(),
        },
        signing: SigningConfig {
            enabled: true,
            key: Some(Secret::new(general_purpose::STANDARD.encode(seed))),
            issuer: "pos-test".to_string(),
        },
        worker: WorkerConfig {
            enabled: worker_enabled,
            poll_interval_secs: 1,
            max_attempts: 3,
        },
    };

    let application = Application::build(config)
        .await
        .expect("Failed to build application - is MongoDB running?");
    let port = application.port();
    let db = application.db().clone();

    tokio::spawn(application.run_until_stopped());

    TestApp {
        address: format!("http://127.0.0.1:{}", port),
        client: reqwest::Client::new(),
        db,
        storage_dir,
    }
}

impl TestApp {
    pub async fn post_json(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> reqwest::Response {
        self.client
            .post(format!("{}{}", self.address, path))
            .json(body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(format!("{}{}", self.address, path))
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn patch(&self, path: &str) -> reqwest::Response {
        self.client
            .patch(format!("{}{}", self.address, path))
            .send()
            .await
            .expect("Failed to execute request")
    }

    /// Create a product, returning its id.
    pub async fn create_product(&self, name: &str, price: f64, stock: i64) -> Uuid {
        let response = self
            .post_json(
                "/api/products",
                &serde_json::json!({ "name": name, "price": price, "stock": stock }),
            )
            .await;
        assert_eq!(response.status(), 201);
        let body: serde_json::Value = response.json().await.expect("Invalid product response");
        body["id"].as_str().and_then(|s| s.parse().ok()).expect("id")
    }

    /// Create a single-item sale, returning its id.
    pub async fn create_sale(&self, product_id: Uuid, quantity: i64) -> Uuid {
        let response = self
            .post_json(
                "/api/sales",
                &serde_json::json!({
                    "items": [{ "productId": product_id, "quantity": quantity }],
                }),
            )
            .await;
        assert_eq!(response.status(), 201);
        let body: serde_json::Value = response.json().await.expect("Invalid sale response");
        body["id"].as_str().and_then(|s| s.parse().ok()).expect("id")
    }

    pub async fn sale_status(&self, sale_id: Uuid) -> String {
        let response = self.get(&format!("/api/sales/{}", sale_id)).await;
        assert_eq!(response.status(), 200);
        let body: serde_json::Value = response.json().await.expect("Invalid sale response");
        body["status"].as_str().expect("status").to_string()
    }
}

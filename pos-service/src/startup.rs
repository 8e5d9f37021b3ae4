use axum::{
    routing::{get, patch, post},
    Router,
};
use secrecy::ExposeSecret;
use service_core::error::AppError;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::config::PosConfig;
use crate::handlers::{customers, health, payments, products, receipts, sales};
use crate::services::{
    Mailer, MockMailer, PdfQuality, PdfRenderer, PosDb, ReceiptService, ReceiptSigner,
    ReceiptStorage, SmtpMailer,
};
use crate::workers::ReceiptOutboxWorker;

/// Shared application state; every dependency is constructed in
/// [`Application::build`] and injected here.
#[derive(Clone)]
pub struct AppState {
    pub config: PosConfig,
    pub db: PosDb,
    pub receipts: Arc<ReceiptService>,
    pub mailer: Arc<dyn Mailer>,
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
}

impl Application {
    pub async fn build(config: PosConfig) -> Result<Self, AppError> {
        let db = PosDb::connect(config.mongodb.uri.expose_secret(), &config.mongodb.database)
            .await
            .map_err(|e| {
                tracing::error!("Failed to connect to MongoDB: {}", e);
                e
            })?;

        db.initialize_indexes().await.map_err(|e| {
            tracing::error!("Failed to initialize database indexes: {}", e);
            e
        })?;

        let storage = ReceiptStorage::new(&config.receipts.storage_dir).await?;

        let signer = if config.signing.enabled {
            let key = config.signing.key.as_ref().ok_or_else(|| {
                AppError::ConfigError(anyhow::anyhow!(
                    "RECEIPT_SIGNING_KEY is required when signing is enabled"
                ))
            })?;
            let signer =
                ReceiptSigner::from_base64_seed(key.expose_secret(), config.signing.issuer.clone())?;
            tracing::info!(
                issuer = %config.signing.issuer,
                verifying_key = %signer.verifying_key_base64(),
                "Receipt signing enabled"
            );
            Some(signer)
        } else {
            tracing::info!("Receipt signing disabled");
            None
        };

        let quality = PdfQuality::from_str_or_default(&config.receipts.pdf_quality);
        let receipt_service = Arc::new(ReceiptService::new(
            config.receipts.clone(),
            PdfRenderer::new(quality),
            storage,
            signer,
        ));

        let mailer: Arc<dyn Mailer> = if config.smtp.enabled {
            match SmtpMailer::new(config.smtp.clone()) {
                Ok(mailer) => {
                    tracing::info!("SMTP mailer initialized");
                    Arc::new(mailer)
                }
                Err(e) => {
                    tracing::warn!("Failed to initialize SMTP mailer: {}. Using mock.", e);
                    Arc::new(MockMailer::new())
                }
            }
        } else {
            tracing::info!("SMTP disabled, using mock mailer");
            Arc::new(MockMailer::new())
        };

        let state = AppState {
            config: config.clone(),
            db,
            receipts: receipt_service,
            mailer,
        };

        // Port 0 = random port for testing.
        let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!("POS service listening on port {}", port);

        Ok(Self {
            port,
            listener,
            state,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn db(&self) -> &PosDb {
        &self.state.db
    }

    /// Run the HTTP server and the receipt outbox worker until shutdown.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let worker = ReceiptOutboxWorker::new(
            self.state.config.worker.clone(),
            self.state.db.clone(),
            self.state.receipts.clone(),
            self.state.mailer.clone(),
        );
        let shutdown_token = worker.shutdown_token();
        let worker_handle = tokio::spawn(worker.run());

        let router = build_router(self.state);
        let result = axum::serve(self.listener, router).await;

        shutdown_token.cancel();
        worker_handle.await.ok();

        result
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        .route("/api/payments", post(payments::create_payment))
        .route(
            "/api/payments/:id/receipt",
            get(payments::get_payment_receipt),
        )
        .route("/api/payments/:id/cancel", patch(payments::cancel_payment))
        .route(
            "/api/payments/:id/resend-receipt",
            post(payments::resend_receipt),
        )
        .route("/api/receipts", get(receipts::list_receipts))
        .route("/api/receipts/stats", get(receipts::receipt_stats))
        .route(
            "/api/receipts/verify/:receipt_number",
            get(receipts::verify_receipt),
        )
        .route(
            "/api/receipts/:receipt_number/download",
            get(receipts::download_receipt),
        )
        .route("/api/receipts/:receipt_number", get(receipts::get_receipt))
        .route("/api/sales", post(sales::create_sale).get(sales::list_sales))
        .route("/api/sales/:id", get(sales::get_sale))
        .route("/api/sales/:id/cancel", patch(sales::cancel_sale))
        .route(
            "/api/products",
            post(products::create_product).get(products::list_products),
        )
        .route("/api/products/:id", get(products::get_product))
        .route(
            "/api/customers",
            post(customers::create_customer).get(customers::list_customers),
        )
        .route("/api/customers/:id", get(customers::get_customer))
        .route(
            "/api/customers/:id/purchases",
            get(customers::customer_purchases),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

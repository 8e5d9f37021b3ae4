use secrecy::Secret;
use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct PosConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub mongodb: MongoConfig,
    pub smtp: SmtpConfig,
    pub receipts: ReceiptConfig,
    pub signing: SigningConfig,
    pub worker: WorkerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MongoConfig {
    pub uri: Secret<String>,
    pub database: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Secret<String>,
    pub from_email: String,
    pub from_name: String,
    pub enabled: bool,
}

/// Receipt artifact settings: where PDFs land on disk, how verification URLs
/// are built and what the printed header says.
#[derive(Debug, Clone, Deserialize)]
pub struct ReceiptConfig {
    pub storage_dir: String,
    /// Public base URL used in QR payloads and email links,
    /// e.g. `https://loja.example.com`.
    pub public_base_url: String,
    pub company_name: String,
    pub company_document: String,
    pub company_address: String,
    /// PDF quality preset: `high`, `medium` or `low`.
    pub pdf_quality: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SigningConfig {
    pub enabled: bool,
    /// Base64-encoded 32-byte Ed25519 seed. Required when `enabled`.
    pub key: Option<Secret<String>>,
    pub issuer: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    pub enabled: bool,
    pub poll_interval_secs: u64,
    pub max_attempts: u32,
}

impl PosConfig {
    pub fn load() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();
        let common = core_config::Config::load()?;
        let is_prod = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string()) == "prod";

        Ok(PosConfig {
            common,
            mongodb: MongoConfig {
                uri: Secret::new(get_env("MONGODB_URI", Some("mongodb://localhost:27017"), is_prod)?),
                database: get_env("MONGODB_DATABASE", Some("pos_db"), is_prod)?,
            },
            smtp: SmtpConfig {
                host: get_env("SMTP_HOST", Some("smtp.gmail.com"), is_prod)?,
                port: get_env("SMTP_PORT", Some("587"), is_prod)?
                    .parse()
                    .unwrap_or(587),
                user: get_env("SMTP_USER", Some(""), is_prod)?,
                password: Secret::new(get_env("SMTP_PASSWORD", Some(""), is_prod)?),
                from_email: get_env("SMTP_FROM_EMAIL", Some("noreply@example.com"), is_prod)?,
                from_name: get_env("SMTP_FROM_NAME", Some("Loja"), is_prod)?,
                enabled: env::var("SMTP_ENABLED")
                    .unwrap_or_else(|_| "false".to_string())
                    .parse()
                    .unwrap_or(false),
            },
            receipts: ReceiptConfig {
                storage_dir: get_env("RECEIPT_STORAGE_DIR", Some("receipts"), is_prod)?,
                public_base_url: get_env(
                    "RECEIPT_PUBLIC_BASE_URL",
                    Some("http://localhost:8080"),
                    is_prod,
                )?,
                company_name: get_env("COMPANY_NAME", Some("Minha Loja"), is_prod)?,
                company_document: get_env("COMPANY_DOCUMENT", Some(""), is_prod)?,
                company_address: get_env("COMPANY_ADDRESS", Some(""), is_prod)?,
                pdf_quality: get_env("RECEIPT_PDF_QUALITY", Some("high"), is_prod)?,
            },
            signing: SigningConfig {
                enabled: env::var("RECEIPT_SIGNING_ENABLED")
                    .unwrap_or_else(|_| "false".to_string())
                    .parse()
                    .unwrap_or(false),
                key: env::var("RECEIPT_SIGNING_KEY").ok().map(Secret::new),
                issuer: get_env("RECEIPT_SIGNING_ISSUER", Some("pos-service"), is_prod)?,
            },
            worker: WorkerConfig {
                enabled: env::var("RECEIPT_WORKER_ENABLED")
                    .unwrap_or_else(|_| "true".to_string())
                    .parse()
                    .unwrap_or(true),
                poll_interval_secs: env::var("RECEIPT_WORKER_POLL_SECS")
                    .unwrap_or_else(|_| "15".to_string())
                    .parse()
                    .unwrap_or(15),
                max_attempts: env::var("RECEIPT_WORKER_MAX_ATTEMPTS")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()
                    .unwrap_or(5),
            },
        })
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required in production but not set",
                    key
                )))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required but not set",
                    key
                )))
            }
        }
    }
}

use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier};
use serde::Serialize;
use service_core::error::AppError;
use uuid::Uuid;

use crate::models::SignatureBlock;

const ALGORITHM: &str = "Ed25519";

/// Detached receipt signing.
///
/// The signature covers `pdf_bytes || canonical JSON(metadata)` and is stored
/// on the `ReceiptHistory` row next to the artifact. Nothing is appended to
/// the PDF itself, so downstream byte-level processing of the file cannot
/// break verifiability of the stored pair.
pub struct ReceiptSigner {
    signing_key: SigningKey,
    issuer: String,
}

/// Canonical metadata layout signed together with the PDF bytes. Field order
/// is fixed by the struct definition.
#[derive(Serialize)]
struct SignedMetadata<'a> {
    receipt_number: &'a str,
    issued_at: String,
    issuer: &'a str,
    serial_number: &'a str,
    algorithm: &'a str,
}

impl ReceiptSigner {
    /// Build a signer from a base64-encoded 32-byte Ed25519 seed.
    pub fn from_base64_seed(seed_b64: &str, issuer: String) -> Result<Self, AppError> {
        let bytes = general_purpose::STANDARD
            .decode(seed_b64.trim())
            .map_err(|e| AppError::ConfigError(anyhow::anyhow!("Invalid signing key: {}", e)))?;
        let seed: [u8; 32] = bytes.try_into().map_err(|_| {
            AppError::ConfigError(anyhow::anyhow!("Signing key must be a 32-byte Ed25519 seed"))
        })?;
        Ok(Self {
            signing_key: SigningKey::from_bytes(&seed),
            issuer,
        })
    }

    /// Random key, for tests and development setups without a provisioned key.
    pub fn generate(issuer: String) -> Self {
        let seed: [u8; 32] = rand::random();
        Self {
            signing_key: SigningKey::from_bytes(&seed),
            issuer,
        }
    }

    /// Base64 public key, for distributing to verifiers.
    pub fn verifying_key_base64(&self) -> String {
        general_purpose::STANDARD.encode(self.signing_key.verifying_key().as_bytes())
    }

    pub fn sign(&self, pdf: &[u8], receipt_number: &str) -> SignatureBlock {
        // Truncate to millisecond precision up front: BSON datetimes carry
        // millis, and verification re-derives the metadata from the stored
        // timestamp.
        let now = Utc::now();
        let issued_at = Utc
            .timestamp_millis_opt(now.timestamp_millis())
            .single()
            .unwrap_or(now);
        let serial_number = Uuid::new_v4().to_string();

        let message = Self::message(pdf, receipt_number, issued_at, &self.issuer, &serial_number);
        let signature = self.signing_key.sign(&message);

        SignatureBlock {
            signature: general_purpose::STANDARD.encode(signature.to_bytes()),
            algorithm: ALGORITHM.to_string(),
            issuer: self.issuer.clone(),
            serial_number,
            issued_at,
        }
    }

    /// Recompute the signature over the presented bytes and the receipt
    /// number the block was issued for, and check it against the stored
    /// block. Any mismatch -- tampered bytes, foreign metadata, malformed
    /// base64 -- yields `false`, never an error.
    pub fn verify_for(&self, pdf: &[u8], receipt_number: &str, block: &SignatureBlock) -> bool {
        let Ok(sig_bytes) = general_purpose::STANDARD.decode(&block.signature) else {
            return false;
        };
        let Ok(signature) = Signature::from_slice(&sig_bytes) else {
            return false;
        };

        let message = Self::message(
            pdf,
            receipt_number,
            block.issued_at,
            &block.issuer,
            &block.serial_number,
        );
        self.signing_key
            .verifying_key()
            .verify(&message, &signature)
            .is_ok()
    }

    fn message(
        pdf: &[u8],
        receipt_number: &str,
        issued_at: DateTime<Utc>,
        issuer: &str,
        serial_number: &str,
    ) -> Vec<u8> {
        let metadata = SignedMetadata {
            receipt_number,
            issued_at: issued_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            issuer,
            serial_number,
            algorithm: ALGORITHM,
        };
        // Serializing a struct cannot fail here; the fallback keeps the
        // signature path panic-free regardless.
        let json = serde_json::to_string(&metadata).unwrap_or_default();

        let mut message = Vec::with_capacity(pdf.len() + json.len());
        message.extend_from_slice(pdf);
        message.extend_from_slice(json.as_bytes());
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_then_verify_round_trips() {
        let signer = ReceiptSigner::generate("pos-service".to_string());
        let pdf = b"%PDF-1.3 conteudo do recibo";

        let block = signer.sign(pdf, "REC2025080001");
        assert_eq!(block.algorithm, "Ed25519");
        assert!(signer.verify_for(pdf, "REC2025080001", &block));
    }

    #[test]
    fn verify_returns_false_for_tampered_bytes() {
        let signer = ReceiptSigner::generate("pos-service".to_string());
        let block = signer.sign(b"original bytes", "REC2025080002");

        assert!(!signer.verify_for(b"tampered bytes", "REC2025080002", &block));
    }

    #[test]
    fn verify_returns_false_for_wrong_receipt_number() {
        let signer = ReceiptSigner::generate("pos-service".to_string());
        let block = signer.sign(b"bytes", "REC2025080003");

        assert!(!signer.verify_for(b"bytes", "REC2025080004", &block));
    }

    #[test]
    fn verify_returns_false_for_garbage_signature() {
        let signer = ReceiptSigner::generate("pos-service".to_string());
        let mut block = signer.sign(b"bytes", "REC2025080005");
        block.signature = "not base64!!!".to_string();

        assert!(!signer.verify_for(b"bytes", "REC2025080005", &block));
    }

    #[test]
    fn verify_returns_false_for_foreign_key() {
        let signer_a = ReceiptSigner::generate("pos-service".to_string());
        let signer_b = ReceiptSigner::generate("pos-service".to_string());
        let block = signer_a.sign(b"bytes", "REC2025080006");

        assert!(!signer_b.verify_for(b"bytes", "REC2025080006", &block));
    }

    #[test]
    fn seed_round_trip_produces_same_key() {
        let seed: [u8; 32] = rand::random();
        let seed_b64 = base64::engine::general_purpose::STANDARD.encode(seed);

        let a = ReceiptSigner::from_base64_seed(&seed_b64, "pos".to_string()).unwrap();
        let b = ReceiptSigner::from_base64_seed(&seed_b64, "pos".to_string()).unwrap();
        assert_eq!(a.verifying_key_base64(), b.verifying_key_base64());
    }

    #[test]
    fn invalid_seed_is_a_config_error() {
        assert!(ReceiptSigner::from_base64_seed("dG9vLXNob3J0", "pos".to_string()).is_err());
    }
}

use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Attachment, Mailbox, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use secrecy::ExposeSecret;
use service_core::error::AppError;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::config::SmtpConfig;
use crate::services::receipts::ReceiptData;

/// Outgoing receipt mail. One send attempt per call; retries are the
/// caller's (or the outbox worker's) concern.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_receipt(
        &self,
        recipient: &str,
        data: &ReceiptData,
        pdf: &[u8],
    ) -> Result<(), AppError>;
}

pub struct SmtpMailer {
    config: SmtpConfig,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    pub fn new(config: SmtpConfig) -> Result<Self, AppError> {
        let creds = Credentials::new(
            config.user.clone(),
            config.password.expose_secret().clone(),
        );

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .map_err(|e| AppError::EmailError(format!("Failed to create SMTP relay: {}", e)))?
            .port(config.port)
            .credentials(creds)
            .build();

        Ok(Self { config, transport })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send_receipt(
        &self,
        recipient: &str,
        data: &ReceiptData,
        pdf: &[u8],
    ) -> Result<(), AppError> {
        let from_mailbox: Mailbox =
            format!("{} <{}>", self.config.from_name, self.config.from_email)
                .parse()
                .map_err(|e| AppError::EmailError(format!("Invalid from address: {}", e)))?;

        let to_mailbox: Mailbox = recipient
            .parse()
            .map_err(|e| AppError::EmailError(format!("Invalid recipient: {}", e)))?;

        let html = render_receipt_html(data);

        let pdf_content_type = ContentType::parse("application/pdf")
            .map_err(|e| AppError::EmailError(format!("Invalid content type: {}", e)))?;
        let attachment = Attachment::new(format!("{}.pdf", data.receipt_number))
            .body(pdf.to_vec(), pdf_content_type);

        let message = Message::builder()
            .from(from_mailbox)
            .to(to_mailbox)
            .subject(format!("Recibo de pagamento {}", data.receipt_number))
            .multipart(
                MultiPart::mixed()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html),
                    )
                    .singlepart(attachment),
            )
            .map_err(|e| AppError::EmailError(format!("Failed to build message: {}", e)))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| AppError::EmailError(format!("Failed to send email: {}", e)))?;

        tracing::info!(
            to = %recipient,
            receipt_number = %data.receipt_number,
            "Receipt email sent"
        );

        Ok(())
    }
}

/// Mock mailer for tests and for deployments without SMTP configured.
pub struct MockMailer {
    send_count: AtomicU64,
}

impl MockMailer {
    pub fn new() -> Self {
        Self {
            send_count: AtomicU64::new(0),
        }
    }

    pub fn send_count(&self) -> u64 {
        self.send_count.load(Ordering::SeqCst)
    }
}

impl Default for MockMailer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Mailer for MockMailer {
    async fn send_receipt(
        &self,
        recipient: &str,
        data: &ReceiptData,
        _pdf: &[u8],
    ) -> Result<(), AppError> {
        self.send_count.fetch_add(1, Ordering::SeqCst);
        tracing::info!(
            to = %recipient,
            receipt_number = %data.receipt_number,
            "[MOCK] Receipt email would be sent"
        );
        Ok(())
    }
}

/// Self-contained HTML body: header, itemized table, payment summary and the
/// verification link. Inline styles only; email clients strip everything
/// else.
pub fn render_receipt_html(data: &ReceiptData) -> String {
    let mut rows = String::new();
    for item in &data.sale.items {
        rows.push_str(&format!(
            "<tr>\
             <td style=\"padding:6px 8px;border-bottom:1px solid #eee;\">{}</td>\
             <td style=\"padding:6px 8px;border-bottom:1px solid #eee;text-align:right;\">{}</td>\
             <td style=\"padding:6px 8px;border-bottom:1px solid #eee;text-align:right;\">R$ {:.2}</td>\
             <td style=\"padding:6px 8px;border-bottom:1px solid #eee;text-align:right;\">R$ {:.2}</td>\
             </tr>",
            html_escape(&item.product_name),
            item.quantity,
            item.unit_price,
            item.total,
        ));
    }

    let greeting = match &data.customer_name {
        Some(name) => format!("Olá, {}!", html_escape(name)),
        None => "Olá!".to_string(),
    };

    format!(
        "<!DOCTYPE html>\
         <html><body style=\"margin:0;font-family:Arial,Helvetica,sans-serif;background:#f5f5f5;\">\
         <div style=\"max-width:600px;margin:0 auto;background:#ffffff;\">\
         <div style=\"background:#2c3e50;color:#ffffff;padding:20px;\">\
         <h1 style=\"margin:0;font-size:20px;\">{company}</h1>\
         <p style=\"margin:4px 0 0;font-size:13px;\">Recibo de pagamento {number}</p>\
         </div>\
         <div style=\"padding:20px;\">\
         <p>{greeting}</p>\
         <p>Segue o recibo do seu pagamento. O PDF está anexado a este e-mail.</p>\
         <table style=\"width:100%;border-collapse:collapse;font-size:13px;\">\
         <tr style=\"background:#f0f0f0;\">\
         <th style=\"padding:6px 8px;text-align:left;\">Item</th>\
         <th style=\"padding:6px 8px;text-align:right;\">Qtd</th>\
         <th style=\"padding:6px 8px;text-align:right;\">Unit.</th>\
         <th style=\"padding:6px 8px;text-align:right;\">Total</th>\
         </tr>{rows}</table>\
         <table style=\"width:100%;font-size:13px;margin-top:12px;\">\
         <tr><td>Subtotal</td><td style=\"text-align:right;\">R$ {subtotal:.2}</td></tr>\
         <tr><td>Desconto</td><td style=\"text-align:right;\">R$ {discount:.2}</td></tr>\
         <tr><td>Impostos</td><td style=\"text-align:right;\">R$ {tax:.2}</td></tr>\
         <tr><td><strong>Total</strong></td><td style=\"text-align:right;\"><strong>R$ {total:.2}</strong></td></tr>\
         </table>\
         <p style=\"margin-top:16px;font-size:13px;\">\
         Pagamento: <strong>{method}</strong> — R$ {amount:.2}</p>\
         <p style=\"font-size:13px;\">\
         Verifique a autenticidade deste recibo em:<br>\
         <a href=\"{url}\">{url}</a></p>\
         </div>\
         <div style=\"background:#f0f0f0;padding:12px 20px;font-size:11px;color:#777;\">\
         Este é um e-mail automático; não responda.\
         </div>\
         </div></body></html>",
        company = html_escape(&data.company.name),
        number = data.receipt_number,
        greeting = greeting,
        rows = rows,
        subtotal = data.sale.subtotal,
        discount = data.sale.discount,
        tax = data.sale.tax,
        total = data.sale.total,
        method = data.payment.method.label(),
        amount = data.payment.amount,
        url = data.verification_url,
    )
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

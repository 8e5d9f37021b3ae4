pub mod database;
pub mod email;
pub mod pdf;
pub mod receipts;
pub mod signature;
pub mod storage;

pub use database::PosDb;
pub use email::{Mailer, MockMailer, SmtpMailer};
pub use pdf::{PdfQuality, PdfRenderer};
pub use receipts::{ReceiptData, ReceiptService};
pub use signature::ReceiptSigner;
pub use storage::ReceiptStorage;

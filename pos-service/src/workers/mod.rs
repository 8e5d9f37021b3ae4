pub mod outbox;

pub use outbox::ReceiptOutboxWorker;

//! service-core: Shared infrastructure for the POS services.
pub mod config;
pub mod error;

pub use axum;
pub use serde;
pub use serde_json;
pub use tracing;
pub use validator;

//! Error types returned to HTTP clients

mod types;

pub use types::{ApiError, ErrorResponse};

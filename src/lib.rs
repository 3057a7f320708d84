//! Quiz generation gateway
//!
//! Authenticated HTTP service that turns study content into quiz text,
//! spreading upstream calls across a pool of Gemini API keys.

// Public modules
pub mod api;
pub mod config;
pub mod error;
pub mod logging;
pub mod middleware;
pub mod schemas;
pub mod server;
pub mod services;
pub mod utils;

#[cfg(test)]
pub mod test_support;

// Re-export commonly used types
pub use config::Settings;
pub use error::ApiError;
pub use server::App;

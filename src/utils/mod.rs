//! Utility modules
//!
//! Helpers for keeping secrets and oversized upstream payloads out of logs.

pub mod redact;

pub use redact::{clip, mask_secret};

//! Schema module
//!
//! Wire types for the upstream generation API.

pub mod gemini;

//! Credential type
//!
//! A credential is an opaque Gemini API key. Its identity is its position in
//! the configured key list; the secret itself is never printed.

use std::fmt;

/// A single provider API key with its position in the pool
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    /// Zero-based position in the configured key list
    index: usize,
    /// Human readable name used in logs (gemini_key_1, gemini_key_2, ...)
    name: String,
    /// The API key
    api_key: String,
}

impl Credential {
    /// Create a credential at the given pool position
    pub fn new(index: usize, api_key: impl Into<String>) -> Self {
        Self {
            index,
            name: format!("gemini_key_{}", index + 1),
            api_key: api_key.into(),
        }
    }

    /// Position of this credential in the pool
    pub fn index(&self) -> usize {
        self.index
    }

    /// Log-safe name of this credential
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The secret API key
    pub fn api_key(&self) -> &str {
        &self.api_key
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("index", &self.index)
            .field("name", &self.name)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

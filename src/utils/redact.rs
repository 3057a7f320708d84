//! Log redaction helpers

/// Number of leading characters of a secret that may be shown
pub const SECRET_PREVIEW_CHARS: usize = 6;

/// Clip `s` to at most `max_chars` characters, marking the cut with `...`
///
/// The cut always falls on a character boundary.
pub fn clip(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

/// Render a token or API key as a short, non-reversible preview
///
/// Short secrets are fully masked so the preview never reveals most of one.
pub fn mask_secret(secret: &str) -> String {
    let total = secret.chars().count();
    if total <= SECRET_PREVIEW_CHARS * 2 {
        return "*".repeat(total.min(SECRET_PREVIEW_CHARS));
    }
    let head: String = secret.chars().take(SECRET_PREVIEW_CHARS).collect();
    format!("{}...({} chars)", head, total)
}

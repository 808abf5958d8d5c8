//! Token estimation utilities.
//!
//! Uses a character-based heuristic: ~4 characters per token. Only
//! stability matters to the tracker (unchanged text must always estimate the
//! same), so the approximation is fine for tier sizing and layout stats.

/// Estimate the token count for a string.
///
/// Heuristic: 1 token ≈ 4 characters. Rounds up.
pub fn estimate_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    text.len().div_ceil(4)
}

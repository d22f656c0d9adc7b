//! Command tokenization and shared argument validation.
//!
//! Commands are ASCII text split on single spaces, exactly as the wire
//! grammar specifies: consecutive spaces produce empty tokens, which then
//! fail the per-command exact token-count checks. No trimming, no
//! whitespace classes.

use crate::error::{Error, Result};

/// Split `text` into its space-separated words.
pub fn split_words(text: &str) -> Vec<&str> {
    text.split(' ').collect()
}

/// Parse a flag index token as a non-negative integer.
pub fn parse_flag_index(token: &str) -> Result<usize> {
    token.parse::<usize>().map_err(|_| Error::InvalidArgument)
}

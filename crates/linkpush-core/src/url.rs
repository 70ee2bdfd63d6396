//! URL syntax validation.
//!
//! Accepts an optional `http`/`https` scheme, a dotted domain with an
//! alphabetic TLD of two or more letters (or a dotted IPv4 address), an
//! optional port, path, query string and fragment. Case-insensitive.

use std::sync::LazyLock;

use regex::Regex;

use crate::errors::LinkError;

static URL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?i)^(https?://)?",
        r"((([a-z\d]([a-z\d-]*[a-z\d])*)\.)+[a-z]{2,}|",
        r"((\d{1,3}\.){3}\d{1,3}))",
        r"(:\d+)?(/[-a-z\d%_.~+]*)*",
        r"(\?[;&a-z\d%_.~+=-]*)?",
        r"(#[-a-z\d_]*)?$",
    ))
    .expect("URL pattern is a valid regex")
});

/// Whether `url` is syntactically acceptable for shortening.
pub fn is_valid_url(url: &str) -> bool {
    URL_PATTERN.is_match(url)
}

/// Validate `url`, returning [`LinkError::InvalidUrl`] on failure.
pub fn validate_url(url: &str) -> Result<(), LinkError> {
    if is_valid_url(url) {
        Ok(())
    } else {
        Err(LinkError::InvalidUrl)
    }
}

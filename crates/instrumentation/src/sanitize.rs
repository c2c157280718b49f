// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Endpoint sanitization for logs and metrics
//!
//! Provider URLs routinely embed API keys and wallet addresses in their paths. Both
//! leak secrets and explode metric cardinality, so every endpoint is reduced to its
//! path with such segments replaced by placeholders before it is recorded.

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

const API_KEY_PLACEHOLDER: &str = "{apiKey}";
const ADDRESS_PLACEHOLDER: &str = "{address}";

static EVM_ADDRESS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^0x[0-9a-fA-F]{40}$").expect("EVM address pattern is valid")
});

static LONG_HEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9a-fA-F]{32,}$").expect("hex pattern is valid"));

static BASE64_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9+_-]{32,}={0,2}$").expect("base64 token pattern is valid")
});

static PLACEHOLDER_BASE: LazyLock<Option<Url>> =
    LazyLock::new(|| Url::parse("http://placeholder.invalid/").ok());

/// Reduce a URL or path to a secret-free pathname
///
/// The query string and fragment are dropped. Path segments that look like
/// `0x`-prefixed EVM addresses become `{address}`; segments of 32+ hex characters or
/// long base64-like tokens become `{apiKey}`. Input that cannot be interpreted as a
/// URL or path is returned as-is, prefixed with `/`.
///
/// # Examples
///
/// ```rust
/// use instrumentation::sanitize_endpoint;
///
/// assert_eq!(
///     sanitize_endpoint("https://x.com/api/v1/users?key=secret"),
///     "/api/v1/users"
/// );
/// assert_eq!(
///     sanitize_endpoint("/api/v1/0a1b2c3d4e5f6a7b8c9d0e1f2a3b4c5d/data"),
///     "/api/v1/{apiKey}/data"
/// );
/// ```
pub fn sanitize_endpoint(input: &str) -> String {
    let parsed = Url::parse(input).or_else(|error| match PLACEHOLDER_BASE.as_ref() {
        Some(base) => base.join(input),
        None => Err(error),
    });

    match parsed {
        Ok(url) => sanitize_path(url.path()),
        Err(_) if input.starts_with('/') => input.to_string(),
        Err(_) => format!("/{input}"),
    }
}

fn sanitize_path(path: &str) -> String {
    path.split('/')
        .map(sanitize_segment)
        .collect::<Vec<_>>()
        .join("/")
}

fn sanitize_segment(segment: &str) -> &str {
    if EVM_ADDRESS.is_match(segment) {
        ADDRESS_PLACEHOLDER
    } else if LONG_HEX.is_match(segment) || is_base64_token(segment) {
        API_KEY_PLACEHOLDER
    } else {
        segment
    }
}

// Long mixed-case alphanumerics only; plain words and lowercase slugs stay readable.
fn is_base64_token(segment: &str) -> bool {
    BASE64_TOKEN.is_match(segment)
        && segment.chars().any(|c| c.is_ascii_uppercase())
        && segment.chars().any(|c| c.is_ascii_lowercase())
        && segment.chars().any(|c| c.is_ascii_digit())
}

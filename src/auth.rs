//! API key validation.
//!
//! Protected routes expect the key in the `X-API-Key` header. Comparison is
//! constant-time.

pub const API_KEY_HEADER: &str = "x-api-key";

/// Compares an API key with the configured one in time independent of where
/// they differ. Empty keys never match.
pub fn keys_match(provided: &str, expected: &str) -> bool {
    if provided.is_empty() || expected.is_empty() {
        return false;
    }

    let length_differs = u8::from(provided.len() != expected.len());
    provided
        .bytes()
        .zip(expected.bytes())
        .fold(length_differs, |diff, (a, b)| diff | (a ^ b))
        == 0
}

/// Whether a request carrying `provided` in the key header is allowed.
///
/// With no key configured every request is allowed.
pub fn is_authorized(provided: Option<&str>, expected: Option<&str>) -> bool {
    match expected {
        None => true,
        Some(expected) => provided
            .map(|provided| keys_match(provided.trim(), expected))
            .unwrap_or(false),
    }
}

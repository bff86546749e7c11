//! Shared-secret checks for the webhook header and the admin bearer token.

use axum::http::{header, HeaderMap};
use sha2::{Digest, Sha256};

/// Compare secrets without an early exit on the first differing byte.
///
/// Both sides are hashed first so the comparison length is fixed and does not leak the secret's length.
pub fn secrets_match(provided: Option<&str>, expected: &str) -> bool {
    let Some(provided) = provided else {
        return false;
    };
    let a = Sha256::digest(provided.as_bytes());
    let b = Sha256::digest(expected.as_bytes());
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Value of a header as UTF-8, if present.
pub fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Token from `Authorization: Bearer <token>`.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn exact_match_only() {
        assert!(secrets_match(Some("s3cret"), "s3cret"));
        assert!(!secrets_match(Some("s3cret "), "s3cret"));
        assert!(!secrets_match(Some("S3CRET"), "s3cret"));
        assert!(!secrets_match(Some(""), "s3cret"));
        assert!(!secrets_match(None, "s3cret"));
    }

    #[test]
    fn reads_bearer_and_custom_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        headers.insert("x-webhook-secret", HeaderValue::from_static("xyz"));
        assert_eq!(bearer_token(&headers), Some("abc"));
        assert_eq!(header_value(&headers, "x-webhook-secret").as_deref(), Some("xyz"));
        assert_eq!(header_value(&headers, "x-other"), None);
    }
}

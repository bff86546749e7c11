//! Phone normalization shared by every place that compares numbers.
//!
//! Provider chat ids look like `972501234567@c.us`; leads store local numbers like `0501234567`.

/// Chat-id suffix the provider uses for one-to-one chats.
pub const DIRECT_CHAT_SUFFIX: &str = "@c.us";
/// Chat-id suffix the provider uses for group chats.
pub const GROUP_CHAT_SUFFIX: &str = "@g.us";

/// Default international prefix (Israel).
pub const DEFAULT_COUNTRY_CODE: &str = "972";

/// Normalize a provider chat id or raw number to local leading-zero form.
///
/// Strips everything from the first `@`, drops non-digits (`+`, spaces, dashes), then rewrites a
/// leading `country_code` to `0`. Already-local numbers pass through unchanged.
pub fn normalize_with(raw: &str, country_code: &str) -> String {
    let bare = raw.split('@').next().unwrap_or("");
    let digits: String = bare.chars().filter(|c| c.is_ascii_digit()).collect();
    match digits.strip_prefix(country_code) {
        Some(rest) if !country_code.is_empty() && !rest.is_empty() => format!("0{}", rest),
        _ => digits,
    }
}

/// [`normalize_with`] using [`DEFAULT_COUNTRY_CODE`].
pub fn normalize(raw: &str) -> String {
    normalize_with(raw, DEFAULT_COUNTRY_CODE)
}

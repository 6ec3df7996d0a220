//! Log sanitization utilities
//!
//! Keeps response bodies (DKIM keys, SPF records) and API tokens from being
//! fully exposed in debug/error logs.

/// Maximum number of characters to include in truncated log output.
const TRUNCATE_LIMIT: usize = 256;

/// Number of leading characters of a secret that stay visible.
const SECRET_VISIBLE_PREFIX: usize = 4;

/// MSRV-compatible replacement for `str::floor_char_boundary` (stable since 1.91.0).
fn floor_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        s.len()
    } else {
        let mut i = index;
        while i > 0 && !s.is_char_boundary(i) {
            i -= 1;
        }
        i
    }
}

/// Truncate a string for safe logging.
///
/// Returns the original string if it's within the limit,
/// otherwise returns the first `TRUNCATE_LIMIT` characters with a suffix
/// indicating the total length.
pub fn truncate_for_log(s: &str) -> String {
    if s.len() <= TRUNCATE_LIMIT {
        s.to_string()
    } else {
        format!(
            "{}... [truncated, total {} bytes]",
            &s[..floor_char_boundary(s, TRUNCATE_LIMIT)],
            s.len()
        )
    }
}

/// Mask a bearer token or other secret, keeping only a short prefix.
///
/// Secrets shorter than twice the visible prefix are masked entirely.
pub fn mask_secret(secret: &str) -> String {
    if secret.len() < SECRET_VISIBLE_PREFIX * 2 {
        return "****".to_string();
    }
    let visible = &secret[..floor_char_boundary(secret, SECRET_VISIBLE_PREFIX)];
    format!("{visible}****")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_string_unchanged() {
        let s = "v=spf1 -all";
        assert_eq!(truncate_for_log(s), s);
    }

    #[test]
    fn over_limit_truncated() {
        let s = "p".repeat(TRUNCATE_LIMIT + 100);
        let result = truncate_for_log(&s);
        assert!(result.contains("... [truncated, total"));
        assert!(result.contains(&format!("{} bytes]", TRUNCATE_LIMIT + 100)));
        assert!(result.len() < s.len());
    }

    #[test]
    fn multibyte_chars_safe() {
        let s = "é".repeat(300);
        let result = truncate_for_log(&s);
        assert!(result.contains("... [truncated, total"));
    }

    #[test]
    fn secrets_keep_only_prefix() {
        assert_eq!(mask_secret("abcd1234efgh5678"), "abcd****");
        assert_eq!(mask_secret("short"), "****");
        assert!(!mask_secret("abcd1234efgh5678").contains("5678"));
    }
}

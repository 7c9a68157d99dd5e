// Input validation for handles supplied by clients
use once_cell::sync::Lazy;
use regex::Regex;

static EMAIL_RE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").ok());

/// Maximum accepted handle length
pub const MAX_HANDLE_LEN: usize = 254;

/// Check that a handle looks like an email address
#[must_use]
pub fn is_valid_email(handle: &str) -> bool {
    if handle.is_empty() || handle.len() > MAX_HANDLE_LEN {
        return false;
    }
    EMAIL_RE
        .as_ref()
        .is_some_and(|re| re.is_match(handle))
}

/// Normalise a handle for lookups (trimmed, lowercase)
#[must_use]
pub fn normalize_handle(handle: &str) -> String {
    handle.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_emails() {
        assert!(is_valid_email("a@example.com"));
        assert!(is_valid_email("first.last+tag@sub.example.org"));
    }

    #[test]
    fn test_invalid_emails() {
        assert!(!is_valid_email(""));
        assert!(!is_valid_email("invalid-email"));
        assert!(!is_valid_email("a@b"));
        assert!(!is_valid_email("a b@example.com"));
        assert!(!is_valid_email(&format!("{}@example.com", "a".repeat(260))));
    }

    #[test]
    fn test_normalize_handle() {
        assert_eq!(normalize_handle("  A@Example.COM "), "a@example.com");
    }
}

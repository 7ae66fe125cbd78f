//! Build-version extraction from the login landing page.

use std::sync::LazyLock;

use regex::Regex;

/// Pattern for the build-version token embedded in the landing-page HTML.
#[allow(clippy::expect_used)]
static VERSION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"v=(\d+\.\d+\.\d+)").expect("version regex is valid") // Static pattern, safe to panic
});

/// Extracts the build-version token from landing-page HTML.
///
/// Returns `None` when the page carries no version token; the login flow
/// treats that as fatal because every subsequent form post requires the
/// version.
#[must_use]
pub fn extract_version(html: &str) -> Option<String> {
    VERSION_PATTERN
        .captures(html)
        .and_then(|captures| captures.get(1))
        .map(|token| token.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_version_from_script_tag() {
        let html = r#"<html><script src="/static/login.js?v=2.41.7"></script></html>"#;
        assert_eq!(extract_version(html), Some("2.41.7".to_string()));
    }

    #[test]
    fn test_first_match_wins() {
        let html = "v=1.2.3 and later v=9.9.9";
        assert_eq!(extract_version(html), Some("1.2.3".to_string()));
    }

    #[test]
    fn test_missing_version_returns_none() {
        assert_eq!(extract_version("<html><body>maintenance</body></html>"), None);
        assert_eq!(extract_version("v=not.a.version"), None);
        assert_eq!(extract_version(""), None);
    }

    #[test]
    fn test_partial_version_is_rejected() {
        assert_eq!(extract_version("v=1.2"), None);
    }
}

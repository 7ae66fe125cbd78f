//! Session cookie store for one login attempt.
//!
//! Accumulates cookies from `Set-Cookie` response headers across every hop
//! of the login flow and produces `Cookie:` request headers by domain/path
//! matching. The store lives for a single short login attempt, so records
//! are append-only: no deduplication, no expiry handling.

use std::fmt;
use std::sync::RwLock;

use tracing::{debug, warn};
use url::Url;

/// A single cookie captured from a `Set-Cookie` response header.
///
/// The value field is intentionally redacted in Debug output to prevent
/// accidental logging of session tokens.
#[derive(Clone)]
pub struct CookieRecord {
    /// The domain the cookie belongs to (e.g., `.example.com`).
    pub domain: String,
    /// The URL path scope for the cookie.
    pub path: String,
    /// Cookie name.
    pub name: String,
    /// Cookie value (sensitive — never log).
    value: String,
}

impl CookieRecord {
    /// Returns the cookie value.
    ///
    /// Cookie values are sensitive — avoid logging the return value.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }
}

// Custom Debug impl that redacts the cookie value.
impl fmt::Debug for CookieRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CookieRecord")
            .field("domain", &self.domain)
            .field("path", &self.path)
            .field("name", &self.name)
            .field("value", &"[REDACTED]")
            .finish()
    }
}

/// Per-attempt cookie accumulator.
///
/// Internally synchronized so the worker and its single in-flight step task
/// can share one store behind an `Arc`; at most one writer exists at any
/// moment by construction of the login flow.
#[derive(Default)]
pub struct CookieStore {
    records: RwLock<Vec<CookieRecord>>,
}

impl CookieStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ingests one `Set-Cookie` header value received from `source_url`.
    ///
    /// The domain defaults to the source host and the path to `/` when the
    /// corresponding attributes are absent. Malformed values are skipped
    /// with a warning rather than failing the attempt.
    pub fn store(&self, source_url: &Url, set_cookie: &str) {
        let mut segments = set_cookie.split(';');
        let Some(pair) = segments.next() else {
            return;
        };
        let Some((name, value)) = pair.split_once('=') else {
            warn!(source = %source_url, "skipping Set-Cookie value without a name=value pair");
            return;
        };
        let name = name.trim();
        if name.is_empty() {
            warn!(source = %source_url, "skipping Set-Cookie value with an empty name");
            return;
        }

        let mut domain = None;
        let mut path = None;
        for attribute in segments {
            let attribute = attribute.trim();
            let (key, attr_value) = attribute
                .split_once('=')
                .map_or((attribute, ""), |(k, v)| (k.trim(), v.trim()));
            if key.eq_ignore_ascii_case("domain") && !attr_value.is_empty() {
                domain = Some(attr_value.to_string());
            } else if key.eq_ignore_ascii_case("path") && !attr_value.is_empty() {
                path = Some(attr_value.to_string());
            }
        }

        let record = CookieRecord {
            domain: domain
                .unwrap_or_else(|| source_url.host_str().unwrap_or_default().to_string()),
            path: path.unwrap_or_else(|| "/".to_string()),
            name: name.to_string(),
            value: value.trim().to_string(),
        };
        debug!(domain = %record.domain, path = %record.path, name = %record.name, "captured cookie");

        if let Ok(mut records) = self.records.write() {
            records.push(record);
        }
    }

    /// Builds a `Cookie:` header value for a request to `target`.
    ///
    /// Includes every stored cookie whose domain matches the target host
    /// (exact, or suffix match after stripping one leading dot) and whose
    /// path is a prefix of the target path. Returns an empty string when
    /// nothing matches.
    #[must_use]
    pub fn cookie_header(&self, target: &Url) -> String {
        let host = target.host_str().unwrap_or_default();
        let target_path = target.path();
        self.records
            .read()
            .map(|records| {
                records
                    .iter()
                    .filter(|record| {
                        domain_matches(&record.domain, host)
                            && target_path.starts_with(record.path.as_str())
                    })
                    .map(|record| format!("{}={}", record.name, record.value))
                    .collect::<Vec<_>>()
                    .join("; ")
            })
            .unwrap_or_default()
    }

    /// Returns every cookie accumulated so far, in capture order.
    #[must_use]
    pub fn export(&self) -> Vec<CookieRecord> {
        self.records
            .read()
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    /// Number of stored cookie records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().map(|records| records.len()).unwrap_or(0)
    }

    /// Whether the store holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for CookieStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CookieStore")
            .field("records", &self.len())
            .finish()
    }
}

/// Matches a cookie domain against a request host: exact match, or suffix
/// match after stripping one leading dot.
fn domain_matches(cookie_domain: &str, host: &str) -> bool {
    let domain = cookie_domain.strip_prefix('.').unwrap_or(cookie_domain);
    host == domain || host.ends_with(&format!(".{domain}"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        s.parse().unwrap()
    }

    #[test]
    fn test_store_defaults_domain_and_path() {
        let store = CookieStore::new();
        store.store(&url("https://id.example.com/account/login"), "sid=abc123");

        let exported = store.export();
        assert_eq!(exported.len(), 1);
        assert_eq!(exported[0].domain, "id.example.com");
        assert_eq!(exported[0].path, "/");
        assert_eq!(exported[0].name, "sid");
        assert_eq!(exported[0].value(), "abc123");
    }

    #[test]
    fn test_store_honors_domain_and_path_attributes() {
        let store = CookieStore::new();
        store.store(
            &url("https://id.example.com/account/login"),
            "token=xyz; Domain=.example.com; Path=/account; HttpOnly; Secure",
        );

        let exported = store.export();
        assert_eq!(exported[0].domain, ".example.com");
        assert_eq!(exported[0].path, "/account");
    }

    #[test]
    fn test_store_skips_malformed_values() {
        let store = CookieStore::new();
        store.store(&url("https://id.example.com/"), "no-pair-here");
        store.store(&url("https://id.example.com/"), "=orphan-value");
        assert!(store.is_empty());
    }

    #[test]
    fn test_store_appends_without_dedup() {
        let store = CookieStore::new();
        let source = url("https://id.example.com/");
        store.store(&source, "sid=first");
        store.store(&source, "sid=second");
        assert_eq!(store.len(), 2, "short-lived store never deduplicates");
    }

    #[test]
    fn test_cookie_header_exact_domain_match() {
        let store = CookieStore::new();
        store.store(&url("https://id.example.com/"), "sid=abc");
        assert_eq!(
            store.cookie_header(&url("https://id.example.com/account/qr")),
            "sid=abc"
        );
    }

    #[test]
    fn test_cookie_header_subdomain_match_with_leading_dot() {
        let store = CookieStore::new();
        store.store(&url("https://id.example.com/"), "sid=abc; Domain=.example.com");
        assert_eq!(
            store.cookie_header(&url("https://chat.example.com/api")),
            "sid=abc"
        );
    }

    #[test]
    fn test_cookie_header_no_cross_domain() {
        let store = CookieStore::new();
        store.store(&url("https://id.example.com/"), "sid=abc");
        assert_eq!(store.cookie_header(&url("https://other.com/")), "");
        // A suffix of the host label, not of the domain: must not match.
        assert_eq!(store.cookie_header(&url("https://evilexample.com/")), "");
    }

    #[test]
    fn test_cookie_header_path_prefix() {
        let store = CookieStore::new();
        store.store(
            &url("https://id.example.com/account/login"),
            "scoped=1; Path=/account",
        );
        assert_eq!(
            store.cookie_header(&url("https://id.example.com/account/qr/generate")),
            "scoped=1"
        );
        assert_eq!(store.cookie_header(&url("https://id.example.com/other")), "");
    }

    #[test]
    fn test_cookie_header_joins_multiple_matches() {
        let store = CookieStore::new();
        let source = url("https://id.example.com/");
        store.store(&source, "a=1");
        store.store(&source, "b=2");
        assert_eq!(store.cookie_header(&url("https://id.example.com/x")), "a=1; b=2");
    }

    #[test]
    fn test_export_preserves_capture_order() {
        let store = CookieStore::new();
        let source = url("https://id.example.com/");
        store.store(&source, "first=1");
        store.store(&source, "second=2");
        let names: Vec<_> = store.export().into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["first", "second"]);
    }

    #[test]
    fn test_debug_redacts_value() {
        let store = CookieStore::new();
        store.store(&url("https://id.example.com/"), "sid=super_secret_token");
        let debug_str = format!("{:?}", store.export()[0]);
        assert!(debug_str.contains("[REDACTED]"));
        assert!(!debug_str.contains("super_secret_token"));
    }
}

//! Domain normalization
//!
//! Domains are compared as lower-case hostnames with any leading `www.` removed.
//! Comparison is always exact after normalization, never substring.

use url::Url;

/// Normalize a domain, hostname or URL into a bare lower-case domain
///
/// Returns None for input that does not contain a plausible hostname.
pub fn normalize_domain(input: &str) -> Option<String> {
    let trimmed = input.trim().trim_matches(|c| c == '"' || c == '\'' || c == '`');
    if trimmed.is_empty() {
        return None;
    }

    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };

    let host = Url::parse(&with_scheme).ok()?.host_str()?.to_ascii_lowercase();
    let host = host.trim_end_matches('.');
    let host = host.strip_prefix("www.").unwrap_or(host);

    if !host.contains('.') || host.starts_with('.') || host.ends_with('.') {
        return None;
    }
    if host.chars().any(|c| !(c.is_ascii_alphanumeric() || c == '-' || c == '.')) {
        return None;
    }
    let tld = host.rsplit('.').next().unwrap_or("");
    if tld.len() < 2 || !tld.starts_with(|c: char| c.is_ascii_alphabetic()) {
        return None;
    }

    Some(host.to_string())
}

/// True when both inputs normalize to the same domain
pub fn same_domain(a: &str, b: &str) -> bool {
    match (normalize_domain(a), normalize_domain(b)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

/// First label of a domain ("acme" for "acme.co.uk"), used as a brand guess
pub fn domain_stem(domain: &str) -> String {
    domain.split('.').next().unwrap_or(domain).to_string()
}

/// Normalize a user-supplied website into an absolute https URL
pub fn normalize_website_url(input: &str) -> Option<String> {
    let trimmed = input.trim();
    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };
    let url = Url::parse(&with_scheme).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    normalize_domain(url.host_str()?)?;
    Some(url.to_string().trim_end_matches('/').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_scheme_www_and_case() {
        assert_eq!(normalize_domain("https://WWW.Example.com/path?q=1").as_deref(), Some("example.com"));
        assert_eq!(normalize_domain("www.example.com").as_deref(), Some("example.com"));
        assert_eq!(normalize_domain("example.com.").as_deref(), Some("example.com"));
        assert_eq!(normalize_domain("shop.example.com").as_deref(), Some("shop.example.com"));
    }

    #[test]
    fn test_normalize_rejects_non_domains() {
        assert_eq!(normalize_domain(""), None);
        assert_eq!(normalize_domain("localhost"), None);
        assert_eq!(normalize_domain("not a domain"), None);
        assert_eq!(normalize_domain("e.g."), None);
        assert_eq!(normalize_domain("10.0.0.1"), None);
    }

    #[test]
    fn test_same_domain_is_exact_not_substring() {
        assert!(same_domain("www.example.com", "example.com"));
        assert!(same_domain("https://example.com", "EXAMPLE.COM"));
        assert!(!same_domain("notexample.com", "example.com"));
        assert!(!same_domain("shop.example.com", "example.com"));
    }

    #[test]
    fn test_domain_stem() {
        assert_eq!(domain_stem("acme.co.uk"), "acme");
    }

    #[test]
    fn test_normalize_website_url() {
        assert_eq!(normalize_website_url("example.com").as_deref(), Some("https://example.com"));
        assert_eq!(
            normalize_website_url("http://example.com/about/").as_deref(),
            Some("http://example.com/about")
        );
        assert_eq!(normalize_website_url("ftp://example.com"), None);
        assert_eq!(normalize_website_url("   "), None);
    }
}

//! Public Suffix List (PSL) utilities for registrable-domain extraction
//!
//! A full list can be installed once at startup with
//! [`install_public_suffix_list`]. Without it a heuristic is used: the last
//! two labels, or three for well-known two-part suffixes.
//!
//! # Examples
//!
//! ```
//! use lg_core::psl::get_etld1;
//!
//! assert_eq!(get_etld1("sub.example.com"), "example.com");
//! assert_eq!(get_etld1("sub.example.co.uk"), "example.co.uk");
//! ```

use std::net::IpAddr;
use std::sync::OnceLock;

use publicsuffix::{List, Psl};

/// Error type for PSL installation.
#[derive(Debug, thiserror::Error)]
pub enum PslError {
    #[error("Invalid public suffix list: {0}")]
    Invalid(String),
    #[error("A public suffix list is already installed")]
    AlreadyInstalled,
}

// =============================================================================
// Global PSL State
// =============================================================================

static PSL: OnceLock<List> = OnceLock::new();

/// Install the process-wide Public Suffix List from its text form.
pub fn install_public_suffix_list(text: &str) -> Result<(), PslError> {
    let list: List = text
        .parse()
        .map_err(|e: publicsuffix::Error| PslError::Invalid(e.to_string()))?;
    PSL.set(list).map_err(|_| PslError::AlreadyInstalled)?;
    log::info!("Public suffix list installed");
    Ok(())
}

/// Check if a full PSL is installed.
pub fn is_psl_installed() -> bool {
    PSL.get().is_some()
}

// =============================================================================
// eTLD+1 Extraction
// =============================================================================

/// Common two-part TLDs for fallback.
const COMMON_TWO_PART_TLDS: &[&str] = &[
    "co.uk", "co.jp", "co.nz", "co.za", "co.in", "co.kr",
    "com.au", "com.br", "com.cn", "com.mx", "com.tw", "com.hk",
    "net.au", "net.nz",
    "org.uk", "org.au",
    "gov.uk", "gov.au",
    "ac.uk", "ac.jp",
    "ne.jp", "or.jp",
];

/// Get the eTLD+1 (registrable domain) for a hostname.
///
/// IP literals and single-label hosts are returned as they are.
pub fn get_etld1(host: &str) -> String {
    let host = host.trim_end_matches('.').to_ascii_lowercase();

    if host.starts_with('[') || host.parse::<IpAddr>().is_ok() {
        return host;
    }

    if let Some(list) = PSL.get() {
        if let Some(domain) = list.domain(host.as_bytes()) {
            if let Ok(domain) = std::str::from_utf8(domain.as_bytes()) {
                return domain.to_string();
            }
        }
    }

    let labels: Vec<&str> = host.split('.').collect();
    fallback_etld1(&labels)
}

/// Fallback eTLD+1 heuristic.
fn fallback_etld1(labels: &[&str]) -> String {
    let n = labels.len();
    if n <= 2 {
        return labels.join(".");
    }

    // Check for common two-part TLDs
    let last_two = format!("{}.{}", labels[n - 2], labels[n - 1]);
    if COMMON_TWO_PART_TLDS.contains(&last_two.as_str()) {
        return labels[n - 3..].join(".");
    }

    // Default: last 2 labels
    labels[n - 2..].join(".")
}

/// Check if a request is third-party.
pub fn is_third_party(site_host: &str, req_host: &str) -> bool {
    get_etld1(site_host) != get_etld1(req_host)
}

// =============================================================================
// Suffix Walking
// =============================================================================

/// Get the parent domain (strip leftmost label).
pub fn get_parent_domain(host: &str) -> Option<&str> {
    match host.find('.') {
        Some(idx) if idx < host.len() - 1 => Some(&host[idx + 1..]),
        _ => None,
    }
}

/// Iterator for suffix-walking a host from the full name down to its last label.
pub struct HostSuffixIter<'a> {
    current: Option<&'a str>,
}

impl<'a> Iterator for HostSuffixIter<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        let result = self.current?;
        self.current = get_parent_domain(result);
        Some(result)
    }
}

/// Walk host suffixes from most specific to least specific.
///
/// `a.b.example.com` yields `a.b.example.com`, `b.example.com`,
/// `example.com`, `com`.
pub fn walk_host_suffixes(host: &str) -> HostSuffixIter<'_> {
    let host = host.trim_end_matches('.');
    HostSuffixIter {
        current: (!host.is_empty()).then_some(host),
    }
}

/// True when `host` equals `domain` or is one of its subdomains.
pub fn is_same_or_subdomain(host: &str, domain: &str) -> bool {
    walk_host_suffixes(host).any(|suffix| suffix == domain)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_etld1_simple() {
        assert_eq!(fallback_etld1(&["example", "com"]), "example.com");
        assert_eq!(fallback_etld1(&["sub", "example", "com"]), "example.com");
    }

    #[test]
    fn test_fallback_etld1_two_part() {
        assert_eq!(fallback_etld1(&["sub", "example", "co", "uk"]), "example.co.uk");
        assert_eq!(fallback_etld1(&["example", "co", "uk"]), "example.co.uk");
    }

    #[test]
    fn test_get_etld1_ip_literal() {
        assert_eq!(get_etld1("192.168.1.10"), "192.168.1.10");
        assert_eq!(get_etld1("[::1]"), "[::1]");
    }

    #[test]
    fn test_is_third_party() {
        assert!(is_third_party("site.test", "ads.example.com"));
        assert!(!is_third_party("www.example.com", "static.example.com"));
    }

    #[test]
    fn test_get_parent_domain() {
        assert_eq!(get_parent_domain("sub.example.com"), Some("example.com"));
        assert_eq!(get_parent_domain("example.com"), Some("com"));
        assert_eq!(get_parent_domain("com"), None);
        assert_eq!(get_parent_domain(""), None);
    }

    #[test]
    fn test_walk_host_suffixes() {
        let suffixes: Vec<&str> = walk_host_suffixes("a.b.example.com").collect();
        assert_eq!(suffixes, vec!["a.b.example.com", "b.example.com", "example.com", "com"]);
        assert_eq!(walk_host_suffixes("").count(), 0);
    }

    #[test]
    fn test_is_same_or_subdomain() {
        assert!(is_same_or_subdomain("site.test", "site.test"));
        assert!(is_same_or_subdomain("www.site.test", "site.test"));
        assert!(!is_same_or_subdomain("othersite.test", "site.test"));
    }
}

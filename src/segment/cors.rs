//! Cross-domain policy
//!
//! Cross-origin access is blocked until an allow-list is configured. Once
//! configured, `Access-Control-Allow-Origin` is added only when the request's
//! `Origin` header equals an allow-list entry byte for byte; a mismatch just
//! omits the header and leaves enforcement to the browser. A `*` entry
//! allows every origin.
//!
//! The same list drives the Flash-era `crossdomain.xml` document.

use std::sync::RwLock;

use bytes::Bytes;

use crate::http::HttpResponse;

/// Wildcard allow-list entry
pub const ANY_ORIGIN: &str = "*";

/// Header echoed back to allowed origins
pub const ALLOW_ORIGIN_HEADER: &str = "Access-Control-Allow-Origin";

#[derive(Debug)]
struct CorsState {
    block: bool,
    origins: Vec<String>,
    crossdomain_xml: Bytes,
}

impl Default for CorsState {
    fn default() -> Self {
        Self {
            block: true,
            origins: Vec::new(),
            crossdomain_xml: build_crossdomain_xml(&[]),
        }
    }
}

/// Process-wide allow-list; read on every request, written on configuration
#[derive(Debug, Default)]
pub struct CrossDomainPolicy {
    state: RwLock<CorsState>,
}

impl CrossDomainPolicy {
    /// Blocking policy with an empty allow-list
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the allow-list and stop blocking cross-domain responses.
    ///
    /// An empty list still unblocks, but then no origin matches.
    /// Duplicates are dropped, first occurrence wins the ordering.
    pub fn set_cross_domain<S: AsRef<str>>(&self, urls: &[S]) {
        let mut origins: Vec<String> = Vec::with_capacity(urls.len());
        for url in urls {
            let url = url.as_ref();
            if url.is_empty() || url_exist_check(&origins, url) {
                continue;
            }
            origins.push(url.to_string());
        }

        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state.crossdomain_xml = build_crossdomain_xml(&origins);
        state.origins = origins;
        state.block = false;

        tracing::info!(origins = ?state.origins, "Cross-domain allow-list updated");
    }

    /// Turn cross-domain blocking on or off without touching the list
    pub fn set_crossdomain_block(&self, block: bool) {
        self.state.write().unwrap_or_else(|e| e.into_inner()).block = block;
    }

    pub fn is_crossdomain_block(&self) -> bool {
        self.state.read().unwrap_or_else(|e| e.into_inner()).block
    }

    /// Current allow-list
    pub fn origins(&self) -> Vec<String> {
        self.state
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .origins
            .clone()
    }

    /// Value for `Access-Control-Allow-Origin`, if the origin is allowed
    pub fn allow_origin_for(&self, origin: Option<&str>) -> Option<String> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        if state.block {
            return None;
        }

        if url_exist_check(&state.origins, ANY_ORIGIN) {
            return Some(ANY_ORIGIN.to_string());
        }

        let origin = origin?;
        if url_exist_check(&state.origins, origin) {
            Some(origin.to_string())
        } else {
            None
        }
    }

    /// Add the allow header to `response` when `origin` is allowed.
    ///
    /// Returns whether the header was set.
    pub fn set_allow_origin(&self, origin: Option<&str>, response: &mut HttpResponse) -> bool {
        match self.allow_origin_for(origin) {
            Some(value) => {
                if value != ANY_ORIGIN {
                    response.set_header("Vary", "Origin");
                }
                response.set_header(ALLOW_ORIGIN_HEADER, value);
                true
            }
            None => false,
        }
    }

    /// `crossdomain.xml` body for the current allow-list
    pub fn crossdomain_xml(&self) -> Bytes {
        self.state
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .crossdomain_xml
            .clone()
    }

    /// Back to the initial blocking, empty state
    pub fn clear(&self) {
        *self.state.write().unwrap_or_else(|e| e.into_inner()) = CorsState::default();
    }
}

/// Exact, case-sensitive membership test
pub fn url_exist_check<S: AsRef<str>>(url_list: &[S], check_url: &str) -> bool {
    url_list.iter().any(|url| url.as_ref() == check_url)
}

fn build_crossdomain_xml(origins: &[String]) -> Bytes {
    let mut xml = String::from("<?xml version=\"1.0\"?>\r\n<cross-domain-policy>\r\n");

    for origin in origins {
        // Flash matches on the host part only
        let domain = origin
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(origin)
            .trim_end_matches('/');
        xml.push_str(&format!(
            "\t<allow-access-from domain=\"{}\"/>\r\n",
            escape_xml_attr(domain)
        ));
    }

    xml.push_str("</cross-domain-policy>");
    Bytes::from(xml)
}

fn escape_xml_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocked_by_default() {
        let policy = CrossDomainPolicy::new();
        assert!(policy.is_crossdomain_block());
        assert_eq!(policy.allow_origin_for(Some("https://x.com")), None);

        let mut response = HttpResponse::ok();
        assert!(!policy.set_allow_origin(Some("https://x.com"), &mut response));
        assert_eq!(response.header(ALLOW_ORIGIN_HEADER), None);
    }

    #[test]
    fn test_exact_match() {
        let policy = CrossDomainPolicy::new();
        policy.set_cross_domain(&["https://a.com"]);
        assert!(!policy.is_crossdomain_block());

        assert_eq!(
            policy.allow_origin_for(Some("https://a.com")),
            Some("https://a.com".to_string())
        );
        assert_eq!(policy.allow_origin_for(Some("https://a.com/")), None);
        assert_eq!(policy.allow_origin_for(Some("http://a.com")), None);
        assert_eq!(policy.allow_origin_for(Some("https://A.com")), None);
        assert_eq!(policy.allow_origin_for(None), None);
    }

    #[test]
    fn test_set_allow_origin_header() {
        let policy = CrossDomainPolicy::new();
        policy.set_cross_domain(&["https://x.com".to_string()]);

        let mut response = HttpResponse::ok();
        assert!(policy.set_allow_origin(Some("https://x.com"), &mut response));
        assert_eq!(response.header(ALLOW_ORIGIN_HEADER), Some("https://x.com"));
        assert_eq!(response.header("Vary"), Some("Origin"));
    }

    #[test]
    fn test_wildcard() {
        let policy = CrossDomainPolicy::new();
        policy.set_cross_domain(&["*"]);

        assert_eq!(policy.allow_origin_for(Some("https://any.com")), Some("*".to_string()));
        assert_eq!(policy.allow_origin_for(None), Some("*".to_string()));
    }

    #[test]
    fn test_empty_list_unblocks_without_allowing() {
        let policy = CrossDomainPolicy::new();
        let empty: [&str; 0] = [];
        policy.set_cross_domain(&empty);

        assert!(!policy.is_crossdomain_block());
        assert!(policy.origins().is_empty());
        assert_eq!(policy.allow_origin_for(Some("https://x.com")), None);
    }

    #[test]
    fn test_duplicates_dropped() {
        let policy = CrossDomainPolicy::new();
        policy.set_cross_domain(&["https://a.com", "https://b.com", "https://a.com", ""]);
        assert_eq!(policy.origins(), vec!["https://a.com", "https://b.com"]);
    }

    #[test]
    fn test_block_flag_overrides_list() {
        let policy = CrossDomainPolicy::new();
        policy.set_cross_domain(&["https://a.com"]);
        policy.set_crossdomain_block(true);
        assert_eq!(policy.allow_origin_for(Some("https://a.com")), None);
    }

    #[test]
    fn test_clear() {
        let policy = CrossDomainPolicy::new();
        policy.set_cross_domain(&["https://a.com"]);
        policy.clear();

        assert!(policy.is_crossdomain_block());
        assert!(policy.origins().is_empty());
    }

    #[test]
    fn test_crossdomain_xml() {
        let policy = CrossDomainPolicy::new();
        let empty = policy.crossdomain_xml();
        assert!(!std::str::from_utf8(&empty).unwrap().contains("allow-access-from"));

        policy.set_cross_domain(&["https://a.com/", "*"]);
        let xml = policy.crossdomain_xml();
        let xml = std::str::from_utf8(&xml).unwrap();
        assert!(xml.contains("<allow-access-from domain=\"a.com\"/>"));
        assert!(xml.contains("<allow-access-from domain=\"*\"/>"));
        assert!(xml.ends_with("</cross-domain-policy>"));
    }

    #[test]
    fn test_url_exist_check() {
        let list = vec!["https://a.com".to_string()];
        assert!(url_exist_check(&list, "https://a.com"));
        assert!(!url_exist_check(&list, "https://a.co"));
    }
}

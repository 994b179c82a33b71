//! Endpoint classification and URL derivation.
//!
//! Scheme detection is a case-sensitive prefix match at offset 0: `HTTPS://x`
//! has no recognised scheme and is treated as a bare host.

use std::net::IpAddr;

use serde::Deserialize;

/// Reserved suffix of the vendor's own endpoints.
pub const VENDOR_DOMAIN_SUFFIX: &str = ".aliyuncs.com";

const HTTP_PREFIX: &str = "http://";
const HTTPS_PREFIX: &str = "https://";

const DEFAULT_REGION: &str = "us-east-1";

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    Http,
    #[default]
    Https,
}

impl Scheme {
    pub fn prefix(&self) -> &'static str {
        match self {
            Scheme::Http => HTTP_PREFIX,
            Scheme::Https => HTTPS_PREFIX,
        }
    }
}

pub fn has_scheme(endpoint: &str) -> bool {
    endpoint.starts_with(HTTP_PREFIX) || endpoint.starts_with(HTTPS_PREFIX)
}

/// Strips a leading `http://` or `https://`, leaving port and path untouched.
pub fn domain_of(endpoint: &str) -> &str {
    endpoint
        .strip_prefix(HTTP_PREFIX)
        .or_else(|| endpoint.strip_prefix(HTTPS_PREFIX))
        .unwrap_or(endpoint)
}

/// Bare host of an endpoint: no scheme, path or port.
pub fn host_of(endpoint: &str) -> &str {
    let domain = domain_of(endpoint);
    let authority = domain.split('/').next().unwrap_or(domain);

    if authority.parse::<IpAddr>().is_ok() {
        return authority;
    }

    if let Some(rest) = authority.strip_prefix('[') {
        return rest.split(']').next().unwrap_or(rest);
    }

    match authority.rsplit_once(':') {
        Some((host, port)) if port.chars().all(|c| c.is_ascii_digit()) => host,
        _ => authority,
    }
}

pub fn is_ip_address(host: &str) -> bool {
    host.parse::<IpAddr>().is_ok()
}

/// A custom (CNAME) domain is any host that is neither under the vendor's
/// reserved suffix nor an IP literal.
pub fn is_cname_domain(endpoint: &str) -> bool {
    let host = host_of(endpoint);

    !host.ends_with(VENDOR_DOMAIN_SUFFIX) && !is_ip_address(host)
}

/// Base URL of the endpoint, defaulting to `https` when no scheme is given.
pub fn base_url_of(endpoint: &str) -> String {
    base_url_with_scheme(endpoint, Scheme::default())
}

pub fn base_url_with_scheme(endpoint: &str, scheme: Scheme) -> String {
    if has_scheme(endpoint) {
        endpoint.to_string()
    } else {
        format!("{}{}", scheme.prefix(), endpoint)
    }
}

/// Base URL the store uses for virtual-hosted addressing of `bucket`.
pub fn virtual_host_base_url(endpoint: &str, bucket: &str) -> String {
    let scheme = if endpoint.starts_with(HTTP_PREFIX) {
        HTTP_PREFIX
    } else {
        HTTPS_PREFIX
    };

    format!(
        "{}{}.{}",
        scheme,
        bucket,
        domain_of(endpoint).trim_end_matches('/')
    )
}

/// Signing region for the endpoint.
///
/// `oss-cn-hangzhou.aliyuncs.com` and `oss-cn-hangzhou-internal.aliyuncs.com`
/// both sign as `oss-cn-hangzhou`; anything else falls back to `us-east-1`.
pub fn region_of(endpoint: &str) -> String {
    let host = host_of(endpoint);
    if !host.ends_with(VENDOR_DOMAIN_SUFFIX) {
        return DEFAULT_REGION.to_string();
    }

    match host.split('.').next() {
        Some(label) if label.starts_with("oss-") => {
            label.trim_end_matches("-internal").to_string()
        }
        _ => DEFAULT_REGION.to_string(),
    }
}

/// Replaces the endpoint-derived base of `url` with `cdn_base_url`.
///
/// Both the path-style base (`base_url`) and the virtual-hosted base of
/// `bucket` are recognised. A URL with neither prefix is returned unchanged.
pub fn rewrite_base_url(url: &str, base_url: &str, bucket: &str, cdn_base_url: &str) -> String {
    let candidates = [
        virtual_host_base_url(base_url, bucket),
        base_url.trim_end_matches('/').to_string(),
    ];

    for candidate in candidates.iter() {
        if let Some(rest) = url.strip_prefix(candidate.as_str()) {
            if rest.is_empty() || rest.starts_with('/') || rest.starts_with('?') {
                return format!("{}{}", cdn_base_url, rest);
            }
        }
    }

    url.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_cname_domain() {
        let cases = vec![
            ("oss-cn-hangzhou.aliyuncs.com", false),
            ("https://oss-cn-hangzhou.aliyuncs.com", false),
            ("http://oss-cn-shanghai-internal.aliyuncs.com", false),
            ("oss-cn-hangzhou.aliyuncs.com:443", false),
            ("127.0.0.1", false),
            ("http://10.0.0.7:9000", false),
            ("[::1]:9000", false),
            ("static.example.com", true),
            ("https://cdn.example.com", true),
            ("aliyuncs.com.example.org", true),
        ];

        for (endpoint, expected) in cases {
            assert_eq!(is_cname_domain(endpoint), expected, "failed for case: {}", endpoint);
        }
    }

    #[test]
    fn test_domain_of() {
        let cases = vec![
            ("https://example.com", "example.com"),
            ("http://example.com:8080/base", "example.com:8080/base"),
            ("example.com", "example.com"),
            ("HTTPS://example.com", "HTTPS://example.com"),
            ("ftp://example.com", "ftp://example.com"),
        ];

        for (endpoint, expected) in cases {
            assert_eq!(domain_of(endpoint), expected, "failed for case: {}", endpoint);
        }
    }

    #[test]
    fn test_host_of() {
        let cases = vec![
            ("https://example.com:8080/base", "example.com"),
            ("10.0.0.1:9000", "10.0.0.1"),
            ("::1", "::1"),
            ("[fe80::1]:80", "fe80::1"),
        ];

        for (endpoint, expected) in cases {
            assert_eq!(host_of(endpoint), expected, "failed for case: {}", endpoint);
        }
    }

    #[test]
    fn test_base_url_of() {
        let cases = vec![
            ("example.com", "https://example.com"),
            ("http://example.com", "http://example.com"),
            ("https://example.com", "https://example.com"),
            ("oss-cn-hangzhou.aliyuncs.com", "https://oss-cn-hangzhou.aliyuncs.com"),
        ];

        for (endpoint, expected) in cases {
            assert_eq!(base_url_of(endpoint), expected, "failed for case: {}", endpoint);
        }

        assert_eq!(
            base_url_with_scheme("example.com", Scheme::Http),
            "http://example.com"
        );
        assert_eq!(
            base_url_with_scheme("https://example.com", Scheme::Http),
            "https://example.com"
        );
    }

    #[test]
    fn test_region_of() {
        let cases = vec![
            ("oss-cn-hangzhou.aliyuncs.com", "oss-cn-hangzhou"),
            ("https://oss-cn-beijing-internal.aliyuncs.com", "oss-cn-beijing"),
            ("https://static.example.com", "us-east-1"),
            ("127.0.0.1:9000", "us-east-1"),
        ];

        for (endpoint, expected) in cases {
            assert_eq!(region_of(endpoint), expected, "failed for case: {}", endpoint);
        }
    }

    #[test]
    fn test_rewrite_base_url() {
        let base = "https://oss-cn-hangzhou.aliyuncs.com";
        let cdn = "https://cdn.example.com";

        let cases = vec![
            (
                "https://b.oss-cn-hangzhou.aliyuncs.com/a.txt?Expires=1",
                "https://cdn.example.com/a.txt?Expires=1",
            ),
            (
                "https://oss-cn-hangzhou.aliyuncs.com/b/a.txt?Expires=1",
                "https://cdn.example.com/b/a.txt?Expires=1",
            ),
            (
                "https://other.example.com/a.txt",
                "https://other.example.com/a.txt",
            ),
        ];

        for (url, expected) in cases {
            assert_eq!(rewrite_base_url(url, base, "b", cdn), expected, "failed for case: {}", url);
        }
    }
}

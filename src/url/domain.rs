use url::Url;

/// Extracts the domain from a URL
///
/// This function retrieves the host portion of a URL and converts it to lowercase.
/// If the URL has no host (which shouldn't happen for valid HTTP(S) URLs), it returns None.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use nova_crawler::url::extract_domain;
///
/// let url = Url::parse("https://EXAMPLE.COM/path").unwrap();
/// assert_eq!(extract_domain(&url), Some("example.com".to_string()));
/// ```
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Returns the key under which per-domain state is tracked
///
/// This is the lowercase host plus the port when the URL carries a
/// non-default one, so two servers on the same host but different ports get
/// separate robots.txt records and politeness slots.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use nova_crawler::url::domain_key;
///
/// let url = Url::parse("http://127.0.0.1:8080/page").unwrap();
/// assert_eq!(domain_key(&url), Some("127.0.0.1:8080".to_string()));
///
/// let url = Url::parse("https://example.com:443/page").unwrap();
/// assert_eq!(domain_key(&url), Some("example.com".to_string()));
/// ```
pub fn domain_key(url: &Url) -> Option<String> {
    let host = extract_domain(url)?;
    match url.port() {
        Some(port) => Some(format!("{}:{}", host, port)),
        None => Some(host),
    }
}

/// Returns `{scheme}://{host}[:port]` for a URL
pub fn origin_of(url: &Url) -> Option<String> {
    let key = domain_key(url)?;
    Some(format!("{}://{}", url.scheme(), key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_simple_domain() {
        let url = Url::parse("https://example.com/").unwrap();
        assert_eq!(extract_domain(&url), Some("example.com".to_string()));
    }

    #[test]
    fn test_extract_subdomain() {
        let url = Url::parse("https://blog.example.com/post").unwrap();
        assert_eq!(extract_domain(&url), Some("blog.example.com".to_string()));
    }

    #[test]
    fn test_extract_with_port() {
        let url = Url::parse("https://example.com:8080/").unwrap();
        assert_eq!(extract_domain(&url), Some("example.com".to_string()));
    }

    #[test]
    fn test_extract_mixed_case() {
        let url = Url::parse("https://Example.COM/").unwrap();
        assert_eq!(extract_domain(&url), Some("example.com".to_string()));
    }

    #[test]
    fn test_domain_key_without_port() {
        let url = Url::parse("https://news.example.com/a/b").unwrap();
        assert_eq!(domain_key(&url), Some("news.example.com".to_string()));
    }

    #[test]
    fn test_domain_key_with_port() {
        let url = Url::parse("http://localhost:3000/").unwrap();
        assert_eq!(domain_key(&url), Some("localhost:3000".to_string()));
    }

    #[test]
    fn test_domain_key_default_port_dropped() {
        let url = Url::parse("http://example.com:80/").unwrap();
        assert_eq!(domain_key(&url), Some("example.com".to_string()));
    }

    #[test]
    fn test_origin_of() {
        let url = Url::parse("http://127.0.0.1:9000/deep/path?q=1").unwrap();
        assert_eq!(origin_of(&url), Some("http://127.0.0.1:9000".to_string()));
    }
}

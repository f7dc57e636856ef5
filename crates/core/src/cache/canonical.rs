//! URL canonicalization so equal pages map to equal cache keys.
//!
//! - Trim whitespace, ensure scheme (default: `https`)
//! - Lowercase host, remove fragments
//! - Preserve query string

use url::Url;

use crate::Error;

/// Error type for URL canonicalization failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UrlError {
    #[error("empty URL")]
    Empty,

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("invalid URL: {0}")]
    Malformed(String),
}

impl From<UrlError> for Error {
    fn from(err: UrlError) -> Self {
        Error::InvalidUrl(err.to_string())
    }
}

/// Canonicalize a URL string before fingerprinting.
///
/// Only `http` and `https` pages can be cached offline.
pub fn canonicalize(input: &str) -> Result<Url, UrlError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }

    let with_scheme = if trimmed.contains("://") { trimmed.to_string() } else { format!("https://{trimmed}") };
    let mut parsed = Url::parse(&with_scheme).map_err(|e| UrlError::Malformed(e.to_string()))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(UrlError::UnsupportedScheme(parsed.scheme().to_string()));
    }

    if let Some(host) = parsed.host_str().map(str::to_lowercase) {
        parsed.set_host(Some(&host)).map_err(|e| UrlError::Malformed(e.to_string()))?;
    }
    parsed.set_fragment(None);

    Ok(parsed)
}

/// Canonicalize an already-parsed URL (drops the fragment).
pub fn canonicalize_url(url: &Url) -> Url {
    let mut url = url.clone();
    url.set_fragment(None);
    url
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::hash::key_for;

    #[test]
    fn test_canonicalize_defaults_to_https() {
        let url = canonicalize("example.com/page").unwrap();
        assert_eq!(url.as_str(), "https://example.com/page");
    }

    #[test]
    fn test_canonicalize_lowercases_host_and_drops_fragment() {
        let url = canonicalize("  HTTPS://Example.COM/Path#section ").unwrap();
        assert_eq!(url.as_str(), "https://example.com/Path");
    }

    #[test]
    fn test_canonicalize_keeps_query_order() {
        let url = canonicalize("https://example.com/?b=2&a=1").unwrap();
        assert_eq!(url.query(), Some("b=2&a=1"));
    }

    #[test]
    fn test_canonicalize_rejects_other_schemes() {
        assert_eq!(canonicalize("file:///etc/passwd"), Err(UrlError::UnsupportedScheme("file".into())));
    }

    #[test]
    fn test_canonicalize_rejects_blank() {
        assert_eq!(canonicalize(""), Err(UrlError::Empty));
        assert_eq!(canonicalize(" \t"), Err(UrlError::Empty));
    }

    #[test]
    fn test_canonicalize_url_drops_fragment() {
        let url = Url::parse("https://example.com/a#b").unwrap();
        assert_eq!(canonicalize_url(&url).as_str(), "https://example.com/a");
    }

    #[test]
    fn test_canonical_spellings_share_a_key() {
        let a = canonicalize("HTTPS://Example.com/page#top").unwrap();
        let b = canonicalize("https://example.com/page").unwrap();
        assert_eq!(key_for(a.as_str()).unwrap(), key_for(b.as_str()).unwrap());
    }

    #[test]
    fn test_url_error_maps_to_invalid_url() {
        let err: Error = UrlError::Empty.into();
        assert!(matches!(err, Error::InvalidUrl(_)));
    }
}

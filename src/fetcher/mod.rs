pub mod http_fetcher;
pub mod memory;
pub mod parallel;

use async_trait::async_trait;

use crate::app::Result;

/// Raw bytes of one feed as delivered by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedFeed {
    pub body: Vec<u8>,
    /// Charset declared by the transport, e.g. from `Content-Type`.
    pub charset: Option<String>,
}

impl FetchedFeed {
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        Self {
            body: body.into(),
            charset: None,
        }
    }
}

#[async_trait]
pub trait Fetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedFeed>;
}

/// Extract the `charset` parameter of a `Content-Type` value.
pub fn charset_from_content_type(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let (name, value) = param.split_once('=')?;
        name.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| value.trim().trim_matches('"').to_string())
            .filter(|v| !v.is_empty())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_charset_from_content_type() {
        assert_eq!(
            charset_from_content_type("application/rss+xml; charset=ISO-8859-1"),
            Some("ISO-8859-1".into())
        );
        assert_eq!(
            charset_from_content_type("text/xml;Charset=\"utf-8\""),
            Some("utf-8".into())
        );
        assert_eq!(charset_from_content_type("text/xml"), None);
        assert_eq!(charset_from_content_type("text/xml; charset="), None);
    }
}

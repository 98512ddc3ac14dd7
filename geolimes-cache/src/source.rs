//! The remote side of the cache: a paginated query endpoint.

use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;

/// Payload encoding announced by the endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContentEncoding {
    #[default]
    Identity,
    Gzip,
}

impl ContentEncoding {
    /// Parse a `Content-Encoding` header value. Unknown codings are treated as
    /// identity.
    pub fn from_header(value: &str) -> Self {
        if value
            .split(',')
            .any(|token| matches!(token.trim().to_ascii_lowercase().as_str(), "gzip" | "x-gzip"))
        {
            ContentEncoding::Gzip
        } else {
            ContentEncoding::Identity
        }
    }
}

/// Out-of-band information returned with a page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerHints {
    /// Server-imposed cap on rows per response.
    pub max_server_rows: Option<usize>,
    pub content_encoding: ContentEncoding,
}

/// One raw page as returned by the endpoint.
#[derive(Debug, Clone, Default)]
pub struct FetchResult {
    pub body: Bytes,
    pub hints: ServerHints,
}

/// One decoded `(uri, shape)` row. Offsets are assigned by the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRow {
    pub uri: String,
    pub shape: String,
}

impl SourceRow {
    pub fn new(uri: impl Into<String>, shape: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            shape: shape.into(),
        }
    }
}

/// A paginated endpoint that enumerates rows in a stable order.
///
/// `fetch` returns at most `limit` rows starting at `offset`; fewer rows than
/// requested means the end of the stream was reached (or the server capped the
/// page, which it reports via [`ServerHints::max_server_rows`]).
#[async_trait]
pub trait RemoteQuerySource: Send + Sync {
    /// Fetch one raw page.
    async fn fetch(&self, offset: u64, limit: usize) -> Result<FetchResult>;

    /// Decode an (already decompressed) page body into rows, in server order.
    fn decode_rows(&self, body: &[u8]) -> Result<Vec<SourceRow>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_encoding_header() {
        assert_eq!(ContentEncoding::from_header("gzip"), ContentEncoding::Gzip);
        assert_eq!(ContentEncoding::from_header(" GZIP "), ContentEncoding::Gzip);
        assert_eq!(ContentEncoding::from_header("identity"), ContentEncoding::Identity);
        assert_eq!(ContentEncoding::from_header("br, gzip"), ContentEncoding::Gzip);
    }
}

//! HTTP implementation of [`RemoteQuerySource`] for SPARQL endpoints.

use crate::error::{Result, SparqlError};
use crate::query::SelectQuery;
use crate::results::{self, SPARQL_RESULTS_JSON};
use async_trait::async_trait;
use geolimes_cache::{
    CacheError, ContentEncoding, FetchResult, RemoteQuerySource, ServerHints, SourceRow,
};
use reqwest::header::{ACCEPT, ACCEPT_ENCODING, CONTENT_ENCODING};
use reqwest::{Client, StatusCode};
use std::fmt;
use std::time::Duration;

/// Response header carrying the server's row cap per page.
pub const MAX_ROWS_HEADER: &str = "x-sparql-maxrows";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const ERROR_BODY_PREVIEW: usize = 200;

/// Pages through a SPARQL endpoint with `GET ?query=...`.
///
/// Responses are requested as SPARQL JSON results with gzip transfer
/// compression; decompression is left to the cache.
pub struct HttpQuerySource {
    client: Client,
    endpoint: String,
    query: SelectQuery,
}

impl HttpQuerySource {
    pub fn new(endpoint: impl Into<String>, query: SelectQuery) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .user_agent(concat!("geolimes/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SparqlError::Client(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            query,
        })
    }

    /// Set an overall per-request timeout. None by default.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(timeout)
            .user_agent(concat!("geolimes/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SparqlError::Client(e.to_string()))?;
        Ok(self)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn query(&self) -> &SelectQuery {
        &self.query
    }
}

impl fmt::Debug for HttpQuerySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpQuerySource")
            .field("endpoint", &self.endpoint)
            .field("fingerprint", &self.query.fingerprint())
            .finish()
    }
}

#[async_trait]
impl RemoteQuerySource for HttpQuerySource {
    async fn fetch(&self, offset: u64, limit: usize) -> geolimes_cache::Result<FetchResult> {
        let query = self.query.build(offset, Some(limit));
        tracing::debug!(endpoint = %self.endpoint, offset, limit, "querying endpoint");

        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("query", query.as_str())])
            .header(ACCEPT, SPARQL_RESULTS_JSON)
            .header(ACCEPT_ENCODING, "gzip")
            .send()
            .await
            .map_err(|e| {
                let transient = e.is_timeout() || e.is_connect() || e.is_request();
                let message = if e.is_timeout() {
                    format!("request timed out: {e}")
                } else if e.is_connect() {
                    format!("failed to connect to {}: {e}", self.endpoint)
                } else {
                    format!("request failed: {e}")
                };
                CacheError::remote(offset, message, transient)
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let preview: String = body.chars().take(ERROR_BODY_PREVIEW).collect();
            let (reason, transient) = classify_status(status);
            return Err(CacheError::remote(
                offset,
                format!("{reason} ({status}): {preview}"),
                transient,
            ));
        }

        let headers = response.headers();
        let hints = ServerHints {
            max_server_rows: headers
                .get(MAX_ROWS_HEADER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<usize>().ok()),
            content_encoding: headers
                .get(CONTENT_ENCODING)
                .and_then(|v| v.to_str().ok())
                .map(ContentEncoding::from_header)
                .unwrap_or_default(),
        };

        let body = response
            .bytes()
            .await
            .map_err(|e| CacheError::remote(offset, format!("reading response body: {e}"), true))?;

        Ok(FetchResult { body, hints })
    }

    fn decode_rows(&self, body: &[u8]) -> geolimes_cache::Result<Vec<SourceRow>> {
        results::decode_rows(body, self.query.uri_var(), self.query.shape_var())
            .map_err(|e| CacheError::Decode(e.to_string()))
    }
}

/// Human-readable reason and retry eligibility for an error status.
fn classify_status(status: StatusCode) -> (&'static str, bool) {
    match status.as_u16() {
        401 | 403 => ("unauthorized", false),
        404 => ("endpoint not found", false),
        408 | 429 => ("endpoint busy", true),
        500..=599 => ("endpoint internal error", true),
        _ => ("request rejected", false),
    }
}

//! HTTP front-end: `POST /limes` runs the posted link configuration and
//! answers with the results in the format the `Accept` header asks for.

use crate::config::{ConfigError, LinkConfig, OutputFormat};
use crate::output;
use crate::run::{Pipeline, RunError};
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Empty request body")]
    EmptyBody,

    #[error("Requested response format not supported: {0}")]
    NotAcceptable(String),

    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Run(#[from] RunError),

    #[error("Output encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

impl ServerError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServerError::EmptyBody | ServerError::Config(_) => StatusCode::BAD_REQUEST,
            ServerError::NotAcceptable(_) => StatusCode::NOT_ACCEPTABLE,
            ServerError::Run(RunError::Config(_)) => StatusCode::BAD_REQUEST,
            ServerError::Run(e) if e.is_remote() => StatusCode::BAD_GATEWAY,
            ServerError::Run(_) | ServerError::Encode(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    status: u16,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "link run failed");
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "request rejected");
        }
        let body = ErrorResponse {
            error: self.to_string(),
            status: status.as_u16(),
        };
        let json = serde_json::to_string(&body).unwrap_or_else(|_| {
            format!(r#"{{"error":"{}","status":{}}}"#, self, status.as_u16())
        });
        (status, [(header::CONTENT_TYPE, "application/json")], json).into_response()
    }
}

struct ServerState {
    pipeline: Pipeline,
    // Runs that share a fingerprint must not materialise concurrently.
    running: Mutex<()>,
}

pub fn router(pipeline: Pipeline) -> Router {
    let state = Arc::new(ServerState {
        pipeline,
        running: Mutex::new(()),
    });
    Router::new().route("/limes", post(limes)).with_state(state)
}

pub async fn serve(addr: SocketAddr, pipeline: Pipeline) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "geolimes server starting");
    axum::serve(listener, router(pipeline)).await
}

async fn limes(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    body: String,
) -> Result<Response, ServerError> {
    let accept = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok());
    let format = negotiate(accept)?;
    if body.trim().is_empty() {
        return Err(ServerError::EmptyBody);
    }

    let mut task = LinkConfig::from_json(&body)?.validate()?;
    task.output = format;

    let report = {
        let _running = state.running.lock().await;
        state.pipeline.execute(&task).await?
    };
    tracing::info!(
        results = report.outcome.results.len(),
        errors = report.outcome.errors.len(),
        format = ?format,
        "link run served"
    );

    let body = output::render(&report.outcome, format)?;
    Ok(([(header::CONTENT_TYPE, format.content_type())], body).into_response())
}

/// Pick the output format from an `Accept` header. The first listed media
/// type geolimes can produce wins; parameters such as `q=` are ignored.
pub fn negotiate(accept: Option<&str>) -> Result<OutputFormat, ServerError> {
    let Some(accept) = accept.filter(|a| !a.trim().is_empty()) else {
        return Ok(OutputFormat::Delimited);
    };
    accept
        .split(',')
        .filter_map(|entry| {
            let media = entry.split(';').next().unwrap_or("").trim();
            match media.to_ascii_lowercase().as_str() {
                "*/*" | "text/csv" => Some(OutputFormat::Delimited),
                "text/turtle" | "application/n-triples" => Some(OutputFormat::TripleText),
                "application/json" => Some(OutputFormat::StructuredDocument),
                _ => None,
            }
        })
        .next()
        .ok_or_else(|| ServerError::NotAcceptable(accept.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run::{RunOptions, Workspace};

    #[test]
    fn test_negotiate() {
        assert_eq!(negotiate(None).unwrap(), OutputFormat::Delimited);
        assert_eq!(negotiate(Some("*/*")).unwrap(), OutputFormat::Delimited);
        assert_eq!(negotiate(Some("text/csv")).unwrap(), OutputFormat::Delimited);
        assert_eq!(negotiate(Some("text/turtle")).unwrap(), OutputFormat::TripleText);
        assert_eq!(
            negotiate(Some("application/n-triples; charset=utf-8")).unwrap(),
            OutputFormat::TripleText
        );
        assert_eq!(
            negotiate(Some("text/html, application/json;q=0.9")).unwrap(),
            OutputFormat::StructuredDocument
        );
        assert!(matches!(
            negotiate(Some("text/html")),
            Err(ServerError::NotAcceptable(_))
        ));
    }

    async fn spawn(dir: &std::path::Path) -> String {
        let pipeline = Pipeline::new(Workspace::new(dir), RunOptions::default());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(pipeline)).await.unwrap();
        });
        format!("http://{addr}/limes")
    }

    fn unreachable_config() -> String {
        let side = serde_json::json!({
            "endpoint": "http://127.0.0.1:1/sparql",
            "graph": "http://example.org/g",
            "property": "?s <http://example.org/wkt> ?shape",
            "var": {"uri": "s", "shape": "shape"}
        });
        serde_json::json!({
            "source": side,
            "target": side,
            "measure": {"relation": "intersects"}
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_status_mapping() {
        let tmp = tempfile::tempdir().unwrap();
        let url = spawn(tmp.path()).await;
        let client = reqwest::Client::new();

        let resp = client
            .post(&url)
            .header("accept", "text/html")
            .body(unreachable_config())
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 406);

        let resp = client.post(&url).body("").send().await.unwrap();
        assert_eq!(resp.status().as_u16(), 400);

        let resp = client
            .post(&url)
            .body(r#"{"source": {}}"#)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 400);
        let text = resp.text().await.unwrap();
        assert!(text.contains("Config is missing source endpoint"), "{text}");

        let resp = client
            .post(&url)
            .body(unreachable_config())
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 502);
    }
}

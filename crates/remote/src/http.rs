//! REST client for the remote automation engine.
//!
//! Endpoints used:
//!
//! ```text
//! POST {base}/api/v1/workflows/{job_id}/run        -> {"executionId": ...}
//! GET  {base}/api/v1/executions/{id}               -> {"status", "output", "error"}
//! POST {base}/api/v1/workflows/{job_id}/activate
//! POST {base}/api/v1/workflows/{job_id}/deactivate
//! ```

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::RemoteConfig;
use crate::dispatcher::{RemoteDispatcher, RemoteState, RemoteStatus};
use crate::error::RemoteError;

/// Header carrying the API key.
const API_KEY_HEADER: &str = "X-API-KEY";

/// HTTP client for a single remote engine instance.
pub struct HttpDispatcher {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

/// Body returned by the run endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitResponse {
    /// String or number depending on the engine version.
    #[serde(alias = "id")]
    execution_id: serde_json::Value,
}

/// Body returned by the execution status endpoint.
#[derive(Debug, Deserialize)]
struct StatusResponse {
    status: String,
    #[serde(default)]
    output: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

impl HttpDispatcher {
    /// Build a client from config. Fails only if the TLS backend cannot
    /// be initialised.
    pub fn new(config: &RemoteConfig) -> Result<Self, RemoteError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self::with_client(client, config))
    }

    /// Reuse an existing [`reqwest::Client`] (connection pooling).
    pub fn with_client(client: reqwest::Client, config: &RemoteConfig) -> Self {
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        }
    }

    fn workflow_url(&self, job_id: &str, action: &str) -> String {
        format!("{}/api/v1/workflows/{job_id}/{action}", self.base_url)
    }

    fn execution_url(&self, remote_execution_id: &str) -> String {
        format!("{}/api/v1/executions/{remote_execution_id}", self.base_url)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.header(API_KEY_HEADER, key),
            None => request,
        }
    }

    // ---- private helpers ----

    /// Ensure the response has a success status code, otherwise turn it
    /// into [`RemoteError::Api`] with the body text.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, RemoteError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(RemoteError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, RemoteError> {
        let response = Self::ensure_success(response).await?;
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| RemoteError::InvalidResponse(e.to_string()))
    }
}

fn id_to_string(value: serde_json::Value) -> Result<String, RemoteError> {
    match value {
        serde_json::Value::String(s) if !s.is_empty() => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(RemoteError::InvalidResponse(format!(
            "unusable execution id: {other}"
        ))),
    }
}

fn into_status(body: StatusResponse) -> RemoteStatus {
    let error = body.error.and_then(|e| match e {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s),
        other => Some(other.to_string()),
    });
    RemoteStatus {
        state: RemoteState::parse(&body.status),
        output: body.output,
        error,
    }
}

#[async_trait]
impl RemoteDispatcher for HttpDispatcher {
    async fn submit(&self, job_id: &str, input: &serde_json::Value) -> Result<String, RemoteError> {
        let body = serde_json::json!({ "data": input });
        let response = self
            .authorize(self.client.post(self.workflow_url(job_id, "run")))
            .json(&body)
            .send()
            .await?;

        let parsed: SubmitResponse = Self::parse_response(response).await?;
        let remote_id = id_to_string(parsed.execution_id)?;
        tracing::debug!(job_id, remote_execution_id = %remote_id, "Job submitted to remote engine");
        Ok(remote_id)
    }

    async fn fetch_status(&self, remote_execution_id: &str) -> Result<RemoteStatus, RemoteError> {
        let response = self
            .authorize(self.client.get(self.execution_url(remote_execution_id)))
            .send()
            .await?;

        let parsed: StatusResponse = Self::parse_response(response).await?;
        Ok(into_status(parsed))
    }

    async fn enable(&self, job_id: &str) -> Result<(), RemoteError> {
        let response = self
            .authorize(self.client.post(self.workflow_url(job_id, "activate")))
            .send()
            .await?;
        Self::ensure_success(response).await?;
        Ok(())
    }

    async fn disable(&self, job_id: &str) -> Result<(), RemoteError> {
        let response = self
            .authorize(self.client.post(self.workflow_url(job_id, "deactivate")))
            .send()
            .await?;
        Self::ensure_success(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    use super::*;

    /// Serve exactly one HTTP response on a random local port and hand
    /// back the raw request text once it has been answered.
    async fn serve_once(status_line: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut raw = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                raw.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&raw);
                if let Some(header_end) = text.find("\r\n\r\n") {
                    let content_length = text[..header_end]
                        .lines()
                        .find_map(|l| {
                            let lower = l.to_ascii_lowercase();
                            lower
                                .strip_prefix("content-length:")
                                .map(|v| v.trim().parse::<usize>().unwrap_or(0))
                        })
                        .unwrap_or(0);
                    if raw.len() >= header_end + 4 + content_length {
                        break;
                    }
                }
            }

            let response = format!(
                "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            String::from_utf8_lossy(&raw).into_owned()
        });

        (format!("http://{addr}"), handle)
    }

    fn dispatcher(base_url: String, api_key: Option<&str>) -> HttpDispatcher {
        HttpDispatcher::new(&RemoteConfig {
            base_url,
            api_key: api_key.map(str::to_string),
            ..Default::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn submit_posts_input_and_returns_execution_id() {
        let (url, server) = serve_once("200 OK", r#"{"executionId":"abc-1"}"#).await;
        let remote = dispatcher(url, Some("secret"));

        let id = remote.submit("job1", &json!({"x": 1})).await.unwrap();
        assert_eq!(id, "abc-1");

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /api/v1/workflows/job1/run"));
        assert!(request.to_ascii_lowercase().contains("x-api-key: secret"));
        assert!(request.contains(r#"{"data":{"x":1}}"#));
    }

    #[tokio::test]
    async fn submit_accepts_numeric_id() {
        let (url, _server) = serve_once("200 OK", r#"{"id":1234}"#).await;
        let id = dispatcher(url, None).submit("job1", &json!({})).await.unwrap();
        assert_eq!(id, "1234");
    }

    #[tokio::test]
    async fn non_success_status_is_api_error() {
        let (url, _server) = serve_once("503 Service Unavailable", r#"{"message":"busy"}"#).await;
        let result = dispatcher(url, None).submit("job1", &json!({})).await;
        assert_matches!(result, Err(RemoteError::Api { status: 503, ref body }) if body.contains("busy"));
    }

    #[tokio::test]
    async fn malformed_body_is_invalid_response() {
        let (url, _server) = serve_once("200 OK", r#"{"unexpected":true}"#).await;
        let result = dispatcher(url, None).fetch_status("r-1").await;
        assert_matches!(result, Err(RemoteError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn fetch_status_maps_success_output() {
        let (url, server) =
            serve_once("200 OK", r#"{"status":"success","output":{"result":42}}"#).await;
        let status = dispatcher(url, None).fetch_status("r-1").await.unwrap();

        assert_eq!(status.state, RemoteState::Success);
        assert_eq!(status.output, Some(json!({"result": 42})));
        assert!(status.error.is_none());
        assert!(server.await.unwrap().starts_with("GET /api/v1/executions/r-1"));
    }

    #[tokio::test]
    async fn fetch_status_flattens_structured_error() {
        let (url, _server) =
            serve_once("200 OK", r#"{"status":"error","error":{"node":"HTTP","code":500}}"#).await;
        let status = dispatcher(url, None).fetch_status("r-1").await.unwrap();

        assert_eq!(status.state, RemoteState::Error);
        assert!(status.error.unwrap().contains("HTTP"));
    }

    #[tokio::test]
    async fn disable_hits_deactivate_endpoint() {
        let (url, server) = serve_once("200 OK", "{}").await;
        dispatcher(url, None).disable("job7").await.unwrap();
        assert!(server
            .await
            .unwrap()
            .starts_with("POST /api/v1/workflows/job7/deactivate"));
    }

    #[tokio::test]
    async fn unreachable_host_is_request_error() {
        // Bind then drop to get a port with nothing listening on it.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = dispatcher(format!("http://{addr}"), None).enable("job1").await;
        assert_matches!(result, Err(RemoteError::Request(_)));
    }
}

use std::time::Duration;

use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};

use super::keys::canonical_key;
use super::Executor;
use crate::detector::Screenshot;
use crate::error::ExecutorError;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum ActionRequest<'a> {
    Click { x: i32, y: i32, button: &'a str },
    Key { key: &'a str },
}

/// Whatever the agent reports on `GET /status`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SutStatus {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// HTTP client for the agent running on the SUT.
pub struct SutClient {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl SutClient {
    pub fn new(ip: &str, port: u16, timeout: Duration) -> Result<Self, ExecutorError> {
        Self::with_base_url(format!("http://{ip}:{port}"), timeout)
    }

    /// Points the client at an explicit base URL.
    pub fn with_base_url(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ExecutorError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(timeout)
            .build()
            .map_err(|e| ExecutorError::Unreachable(e.to_string()))?;
        let base_url: String = base_url.into();
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn status(&self) -> Result<SutStatus, ExecutorError> {
        let response = self
            .client
            .get(format!("{}/status", self.base_url))
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        let status = match ensure_success(response).await?.json::<SutStatus>().await {
            Ok(status) => status,
            Err(e) => {
                tracing::warn!(url = %self.base_url, error = %e, "unexpected status body from SUT agent");
                SutStatus::default()
            }
        };
        Ok(status)
    }

    async fn action(&self, request: &ActionRequest<'_>) -> Result<(), ExecutorError> {
        let response = self
            .client
            .post(format!("{}/action", self.base_url))
            .json(request)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        ensure_success(response).await?;
        Ok(())
    }

    fn transport_error(&self, err: reqwest::Error) -> ExecutorError {
        if err.is_timeout() {
            ExecutorError::Timeout(self.timeout)
        } else {
            ExecutorError::Unreachable(err.to_string())
        }
    }
}

async fn ensure_success(response: Response) -> Result<Response, ExecutorError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response
        .text()
        .await
        .unwrap_or_else(|_| "unknown error".to_string());
    Err(ExecutorError::Rejected {
        status: status.as_u16(),
        message,
    })
}

impl Executor for SutClient {
    async fn click(&self, x: i32, y: i32) -> Result<(), ExecutorError> {
        tracing::debug!(x, y, "click");
        self.action(&ActionRequest::Click {
            x,
            y,
            button: "left",
        })
        .await
    }

    async fn key(&self, name: &str) -> Result<(), ExecutorError> {
        let key = canonical_key(name);
        tracing::debug!(%key, "key press");
        self.action(&ActionRequest::Key { key: &key }).await
    }

    async fn capture(&self) -> Result<Screenshot, ExecutorError> {
        let response = self
            .client
            .get(format!("{}/screenshot", self.base_url))
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        let bytes = ensure_success(response)
            .await?
            .bytes()
            .await
            .map_err(|e| self.transport_error(e))?;
        Ok(Screenshot::new(bytes.to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> SutClient {
        SutClient::with_base_url(server.uri(), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn click_posts_left_button_action() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/action"))
            .and(body_json(serde_json::json!({
                "type": "click", "x": 640, "y": 360, "button": "left"
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        client(&server).click(640, 360).await.unwrap();
    }

    #[tokio::test]
    async fn key_is_canonicalised() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/action"))
            .and(body_json(serde_json::json!({"type": "key", "key": "Escape"})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        client(&server).key("esc").await.unwrap();
    }

    #[tokio::test]
    async fn non_success_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/action"))
            .respond_with(ResponseTemplate::new(500).set_body_string("no display"))
            .mount(&server)
            .await;

        let err = client(&server).click(1, 1).await.unwrap_err();
        assert!(matches!(
            err,
            ExecutorError::Rejected { status: 500, ref message } if message == "no display"
        ));
    }

    #[tokio::test]
    async fn slow_agent_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/screenshot"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let client = SutClient::with_base_url(server.uri(), Duration::from_millis(100)).unwrap();
        let err = client.capture().await.unwrap_err();
        assert!(matches!(err, ExecutorError::Timeout(d) if d == Duration::from_millis(100)));
    }

    #[tokio::test]
    async fn capture_returns_png_bytes() {
        let server = MockServer::start().await;
        let png = vec![0x89, b'P', b'N', b'G'];
        Mock::given(method("GET"))
            .and(path("/screenshot"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(png.clone()))
            .mount(&server)
            .await;

        let shot = client(&server).capture().await.unwrap();
        assert_eq!(shot.bytes, png);
    }

    #[tokio::test]
    async fn status_reads_agent_report() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/status"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"status": "ok", "version": "1.2"})),
            )
            .mount(&server)
            .await;

        let status = client(&server).status().await.unwrap();
        assert_eq!(status.status.as_deref(), Some("ok"));
        assert_eq!(status.extra["version"], "1.2");
    }

    #[tokio::test]
    async fn malformed_status_body_still_counts_as_reachable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/status"))
            .respond_with(ResponseTemplate::new(200).set_body_string("agent up"))
            .mount(&server)
            .await;

        let status = client(&server).status().await.unwrap();
        assert_eq!(status.status, None);
        assert!(status.extra.is_empty());
    }

    #[tokio::test]
    async fn closed_port_is_unreachable() {
        let client = SutClient::new("127.0.0.1", 1, Duration::from_secs(2)).unwrap();
        let err = client.status().await.unwrap_err();
        assert!(matches!(err, ExecutorError::Unreachable(_)));
    }
}

//! HTTP transport for request/response calls

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;
use url::Url;

use super::types::{HttpRequest, HttpResponse, RequestError};
use crate::error::Result;

/// Executes one HTTP exchange. Implemented over reqwest; tests substitute
/// their own.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn execute(&self, request: HttpRequest) -> std::result::Result<HttpResponse, RequestError>;
}

/// reqwest-backed transport
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
    base_url: Url,
}

impl ReqwestTransport {
    /// Create a transport for the given API base URL.
    ///
    /// Request paths are resolved relative to the base, so
    /// `http://gw:8080/api` + `vehicle/speed` → `http://gw:8080/api/vehicle/speed`.
    pub fn new(base_url: &str, timeout: Duration, connect_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(connect_timeout)
            .build()?;

        let mut base_url = Url::parse(base_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url_for(&self, path: &str) -> std::result::Result<Url, RequestError> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| RequestError::InvalidRequest(format!("path '{}': {}", path, e)))
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(&self, request: HttpRequest) -> std::result::Result<HttpResponse, RequestError> {
        let url = self.url_for(&request.path)?;
        debug!(method = %request.method, %url, "Sending request");

        let mut builder = self.client.request(request.method.into(), url);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(map_reqwest_error)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(map_reqwest_error)?;

        Ok(HttpResponse { status, body })
    }
}

fn map_reqwest_error(err: reqwest::Error) -> RequestError {
    if err.is_timeout() {
        RequestError::Timeout
    } else {
        RequestError::Network(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_gets_trailing_slash() {
        let transport = ReqwestTransport::new(
            "http://localhost:8080/api",
            Duration::from_secs(1),
            Duration::from_secs(1),
        )
        .unwrap();

        assert_eq!(transport.base_url().as_str(), "http://localhost:8080/api/");
        assert_eq!(
            transport.url_for("/vehicle/engine/speed").unwrap().as_str(),
            "http://localhost:8080/api/vehicle/engine/speed"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        let result = ReqwestTransport::new("not a url", Duration::from_secs(1), Duration::from_secs(1));
        assert!(matches!(result, Err(crate::ClientError::InvalidUrl(_))));
    }
}

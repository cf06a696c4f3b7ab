//! HTTP seam between the controller and the generation service.
//!
//! [`Transport`] returns the raw status, headers and body so that response
//! reconciliation stays a pure function over [`RawResponse`]. The production
//! implementation is [`HttpTransport`] on top of [`reqwest`].

use async_trait::async_trait;
use reqwest::Client;

use crate::error::{Result, StudioError};

pub const HEADER_SERVER_SECONDS: &str = "x-server-seconds";
pub const HEADER_USED_MODEL: &str = "x-used-model";
pub const HEADER_IMAGE_BYTES: &str = "x-image-bytes";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawResponse {
    pub status: u16,
    /// Header names are stored lowercased.
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            ..Default::default()
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_ascii_lowercase(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn json(status: u16, value: &serde_json::Value) -> Self {
        Self::new(status)
            .with_header("content-type", "application/json")
            .with_body(value.to_string())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    pub fn is_json(&self) -> bool {
        self.content_type()
            .map_or(false, |ct| ct.contains("application/json"))
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn parse_json<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, path: &str) -> Result<RawResponse>;

    async fn post_json(
        &self,
        path: &str,
        body: &serde_json::Value,
        accept: &str,
    ) -> Result<RawResponse>;
}

#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn collect(response: reqwest::Response) -> Result<RawResponse> {
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(|e| StudioError::NetworkError(format!("failed to read body: {}", e)))?
            .to_vec();

        Ok(RawResponse {
            status,
            headers,
            body,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, path: &str) -> Result<RawResponse> {
        let url = self.url(path);
        log::debug!("GET {}", url);

        let response = self.client.get(&url).send().await?;
        Self::collect(response).await
    }

    async fn post_json(
        &self,
        path: &str,
        body: &serde_json::Value,
        accept: &str,
    ) -> Result<RawResponse> {
        let url = self.url(path);
        log::debug!("POST {} (accept: {})", url, accept);

        let response = self
            .client
            .post(&url)
            .header(reqwest::header::ACCEPT, accept)
            .json(body)
            .send()
            .await?;
        Self::collect(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headers_are_case_insensitive() {
        let raw = RawResponse::new(200)
            .with_header("X-Server-Seconds", "2.5")
            .with_header("Content-Type", "application/json; charset=utf-8");
        assert_eq!(raw.header(HEADER_SERVER_SECONDS), Some("2.5"));
        assert!(raw.is_json());
        assert!(raw.is_success());
        assert!(!RawResponse::new(502).is_success());
    }

    #[test]
    fn test_url_joining() {
        let transport = HttpTransport::new("http://localhost:8787/");
        assert_eq!(transport.url("/api/models"), "http://localhost:8787/api/models");
        assert_eq!(transport.url("/"), "http://localhost:8787/");
    }
}

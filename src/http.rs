// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use crate::error::FetchError;

/// HTTP response with status and the full body
pub struct HttpResponse {
    /// HTTP status code
    pub status: u16,
    /// Response body
    pub body: Bytes,
}

/// HTTP client abstraction for testability
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Fetch a URL and return status and body
    async fn get(&self, url: &str) -> Result<HttpResponse, reqwest::Error>;
}

/// Default HTTP client implementation using reqwest
#[derive(Clone)]
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    /// Create a new ReqwestClient with default settings
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for ReqwestClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn get(&self, url: &str) -> Result<HttpResponse, reqwest::Error> {
        let response = self.client.get(url).send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?;

        Ok(HttpResponse { status, body })
    }
}

/// Fetch a markup document, treating HTTP error statuses as failures.
/// Invalid UTF-8 is replaced rather than rejected.
pub async fn fetch_document<C: HttpClient + ?Sized>(
    client: &C,
    url: &str,
) -> Result<String, FetchError> {
    let response = client
        .get(url)
        .await
        .map_err(|e| FetchError::RequestFailed {
            url: url.to_string(),
            source: e,
        })?;

    if response.status >= 400 {
        return Err(FetchError::HttpStatus {
            url: url.to_string(),
            status: response.status,
        });
    }

    debug!(%url, bytes = response.body.len(), "Fetched document");
    Ok(String::from_utf8_lossy(&response.body).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticClient {
        status: u16,
        body: &'static [u8],
    }

    #[async_trait]
    impl HttpClient for StaticClient {
        async fn get(&self, _url: &str) -> Result<HttpResponse, reqwest::Error> {
            Ok(HttpResponse {
                status: self.status,
                body: Bytes::from_static(self.body),
            })
        }
    }

    #[test]
    fn reqwest_client_can_be_created() {
        let _client = ReqwestClient::new();
        let _client_default = ReqwestClient::default();
    }

    #[test]
    fn reqwest_client_can_be_cloned() {
        let client = ReqwestClient::new();
        let _cloned = client.clone();
    }

    #[tokio::test]
    async fn fetch_document_returns_body() {
        let client = StaticClient {
            status: 200,
            body: "<html>čau</html>".as_bytes(),
        };

        let body = fetch_document(&client, "http://example.com").await.unwrap();
        assert_eq!(body, "<html>čau</html>");
    }

    #[tokio::test]
    async fn fetch_document_fails_on_http_error() {
        let client = StaticClient {
            status: 404,
            body: b"Not Found",
        };

        let result = fetch_document(&client, "http://example.com/missing").await;
        match result {
            Err(FetchError::HttpStatus { status, .. }) => assert_eq!(status, 404),
            _ => panic!("Expected HttpStatus error"),
        }
    }

    #[tokio::test]
    async fn fetch_document_replaces_invalid_utf8() {
        let client = StaticClient {
            status: 200,
            body: b"ok\xff",
        };

        let body = fetch_document(&client, "http://example.com").await.unwrap();
        assert!(body.starts_with("ok"));
    }
}

// HTTP search backend
//
// Thin reqwest wrapper over the two request/response endpoints. Query
// parameter encoding lives in `SearchQuery::to_params`; this file only
// joins URLs and maps failures onto `TransportError`.

use super::{SearchBackend, TransportError, SEARCH_PATH, SUGGESTIONS_PATH};
use crate::model::{SearchPage, Suggestions};
use crate::query::SearchQuery;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBackend {
    /// Create a backend rooted at `base_url` (e.g. `http://localhost:8000`)
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Network(format!("Failed to create HTTP client: {}", e)))?;

        tracing::info!("Search backend: {} (timeout {:?})", base_url, timeout);

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Send a prepared request and decode a 2xx JSON body
async fn fetch_json<T: DeserializeOwned>(request: reqwest::RequestBuilder) -> Result<T, TransportError> {
    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(TransportError::Status(status.as_u16()));
    }
    response
        .json::<T>()
        .await
        .map_err(|e| TransportError::Decode(e.to_string()))
}

impl SearchBackend for HttpBackend {
    fn search(
        &self,
        query: SearchQuery,
    ) -> impl Future<Output = Result<SearchPage, TransportError>> + Send {
        let request = self.client.get(self.url(SEARCH_PATH)).query(&query.to_params());
        tracing::debug!(page = query.page, term = %query.term, "GET {}", SEARCH_PATH);
        fetch_json(request)
    }

    fn suggested_filters(&self) -> impl Future<Output = Result<Suggestions, TransportError>> + Send {
        let request = self.client.get(self.url(SUGGESTIONS_PATH));
        tracing::debug!("GET {}", SUGGESTIONS_PATH);
        fetch_json(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joining_strips_trailing_slash() {
        let backend = HttpBackend::new("http://localhost:8000/", Duration::from_secs(5)).unwrap();
        assert_eq!(backend.url(SEARCH_PATH), "http://localhost:8000/v1/search");
        assert_eq!(
            backend.url(SUGGESTIONS_PATH),
            "http://localhost:8000/v1/aggregations/suggested_filters"
        );
    }

    /// Serve one canned HTTP response on a loopback port and return its base URL
    async fn serve_once(status_line: &'static str, body: &'static str) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = stream.read(&mut buf).await;
            let response = format!(
                "HTTP/1.1 {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                status_line,
                body.len(),
                body
            );
            let _ = stream.write_all(response.as_bytes()).await;
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_non_success_status_is_reported() {
        let url = serve_once("500 Internal Server Error", r#"{"error":"boom"}"#).await;
        let backend = HttpBackend::new(&url, Duration::from_secs(5)).unwrap();
        let result = backend
            .search(SearchQuery::new("disk", &[], 1, Default::default()))
            .await;
        assert_eq!(result, Err(TransportError::Status(500)));
    }

    #[tokio::test]
    async fn test_malformed_body_is_a_decode_error() {
        let url = serve_once("200 OK", "not json").await;
        let backend = HttpBackend::new(&url, Duration::from_secs(5)).unwrap();
        let result = backend.suggested_filters().await;
        assert!(
            matches!(result, Err(TransportError::Decode(_))),
            "got {:?}",
            result
        );
    }

    #[tokio::test]
    async fn test_search_page_is_decoded() {
        let url = serve_once(
            "200 OK",
            r#"{"results":[{"level":"error","message":"disk full","timestamp":"2024-01-15T10:00:00Z"}],"total":1}"#,
        )
        .await;
        let backend = HttpBackend::new(&url, Duration::from_secs(5)).unwrap();
        let page = backend
            .search(SearchQuery::new("", &[], 1, Default::default()))
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.results[0].message, "disk full");
    }
}

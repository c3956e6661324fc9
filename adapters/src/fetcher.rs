//! URL fetching capability.

use async_trait::async_trait;
use tracing::debug;

use crate::context::{OpContext, ProgressStage, ProgressStatus};
use crate::error::{AdapterError, Result};

/// Output of a fetch.
#[derive(Debug, Clone)]
pub struct Fetched {
    /// The raw response body.
    pub data: Vec<u8>,

    /// Content type reported by the server.
    pub content_type: Option<String>,

    /// Final URL after redirects.
    pub final_url: String,
}

/// Capability interface for fetching remote sources.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Short name used in error context.
    fn name(&self) -> &str;

    /// Fetch a URL into memory.
    async fn fetch(&self, url: &str, ctx: &OpContext) -> Result<Fetched>;
}

/// HTTP(S) fetcher backed by `reqwest`.
pub struct HttpFetcher {
    client: reqwest::Client,
    max_bytes: usize,
}

impl HttpFetcher {
    /// Create a fetcher with the default 32 MiB body cap.
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            max_bytes: 32 * 1024 * 1024,
        }
    }

    /// Override the maximum accepted body size.
    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    fn name(&self) -> &str {
        "http"
    }

    async fn fetch(&self, url: &str, ctx: &OpContext) -> Result<Fetched> {
        ctx.started(ProgressStage::Fetcher);
        ctx.checkpoint()?;

        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            ctx.errored(ProgressStage::Fetcher, &format!("HTTP {status}"));
            return Err(AdapterError::ApiRequest(format!(
                "fetch failed with HTTP {status}: {url}"
            )));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.split(';').next().unwrap_or(value).trim().to_string());
        let final_url = response.url().to_string();

        let data = response.bytes().await?;
        if data.len() > self.max_bytes {
            return Err(AdapterError::InvalidInput(format!(
                "response body too large: {} bytes, max {}",
                data.len(),
                self.max_bytes
            )));
        }

        debug!("fetched {url}: {} bytes", data.len());
        ctx.emit(
            ProgressStage::Fetcher,
            ProgressStatus::Progress,
            None,
            Some(format!("{} bytes", data.len())),
        );
        ctx.completed(ProgressStage::Fetcher);

        Ok(Fetched {
            data: data.to_vec(),
            content_type,
            final_url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_fetch_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("hello")
                    .insert_header("content-type", "text/plain; charset=utf-8"),
            )
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new();
        let fetched = fetcher
            .fetch(&format!("{}/page", server.uri()), &OpContext::new())
            .await
            .unwrap();

        assert_eq!(fetched.data, b"hello");
        assert_eq!(fetched.content_type.as_deref(), Some("text/plain"));
    }

    #[tokio::test]
    async fn test_fetch_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new();
        let result = fetcher
            .fetch(&format!("{}/missing", server.uri()), &OpContext::new())
            .await;

        assert!(matches!(result, Err(AdapterError::ApiRequest(_))));
    }

    #[tokio::test]
    async fn test_fetch_body_cap() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("0123456789"))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new().with_max_bytes(4);
        let result = fetcher.fetch(&server.uri(), &OpContext::new()).await;

        assert!(matches!(result, Err(AdapterError::InvalidInput(_))));
    }
}

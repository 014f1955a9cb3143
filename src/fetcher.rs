// Transport collaborator: fetch(url) -> document-or-error.
//
// Timeouts and retries live here and stay local to a single fetch call.

use crate::error::FetchError;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

// Retry configuration for a single fetch
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_backoff_ms: 500,
            max_backoff_ms: 5000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

impl RetryConfig {
    pub fn no_retries() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct FetcherConfig {
    pub timeout_ms: u64,
    pub user_agent: String,
    // Sent with every request, before per-call headers
    pub default_headers: Vec<(String, String)>,
    pub retry_config: RetryConfig,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            default_headers: vec![
                ("Accept-Language".to_string(), "en-US,en;q=0.9".to_string()),
                (
                    "Accept".to_string(),
                    "text/html,application/xhtml+xml".to_string(),
                ),
            ],
            retry_config: RetryConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchedDocument {
    pub body: String,
    pub status: u16,
}

#[async_trait]
pub trait Fetcher: Send + Sync + 'static {
    async fn fetch(
        &self,
        url: &str,
        headers: &[(String, String)],
    ) -> Result<FetchedDocument, FetchError>;
}

pub struct HttpFetcher {
    client: reqwest::Client,
    config: FetcherConfig,
}

impl HttpFetcher {
    pub fn new(config: FetcherConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| FetchError::ClientError(e.to_string()))?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &FetcherConfig {
        &self.config
    }

    // Exponential backoff with jitter
    pub fn calculate_backoff(retry_attempt: u32, config: &RetryConfig) -> Duration {
        let base_backoff_ms = (config.initial_backoff_ms as f64
            * config.backoff_multiplier.powf(retry_attempt as f64))
        .min(config.max_backoff_ms as f64);

        let jitter = rand::random::<f64>() * config.jitter_factor * base_backoff_ms;
        let backoff_ms = base_backoff_ms * (1.0 - config.jitter_factor / 2.0) + jitter;

        Duration::from_millis(backoff_ms as u64)
    }

    async fn fetch_once(
        &self,
        url: &str,
        headers: &[(String, String)],
    ) -> Result<FetchedDocument, FetchError> {
        let mut request = self.client.get(url);
        for (name, value) in self.config.default_headers.iter().chain(headers) {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request.send().await.map_err(|e| self.map_error(e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                status_code: status.as_u16(),
                url: url.to_string(),
            });
        }

        let body = response.text().await.map_err(|e| self.map_error(e))?;
        Ok(FetchedDocument {
            body,
            status: status.as_u16(),
        })
    }

    fn map_error(&self, err: reqwest::Error) -> FetchError {
        if err.is_timeout() {
            FetchError::Timeout(self.config.timeout_ms)
        } else if err.is_builder() {
            FetchError::ClientError(err.to_string())
        } else {
            FetchError::NetworkError(err.to_string())
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(
        &self,
        url: &str,
        headers: &[(String, String)],
    ) -> Result<FetchedDocument, FetchError> {
        let retry_config = &self.config.retry_config;
        let mut attempt = 0;

        loop {
            match self.fetch_once(url, headers).await {
                Ok(document) => {
                    debug!(url, attempt, bytes = document.body.len(), "fetched document");
                    return Ok(document);
                }
                Err(err) if err.is_retryable() && attempt < retry_config.max_retries => {
                    let backoff = Self::calculate_backoff(attempt, retry_config);
                    warn!(
                        url,
                        attempt,
                        error = %err,
                        backoff_ms = backoff.as_millis() as u64,
                        "fetch failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(err) => {
                    warn!(url, attempt, error = %err, "fetch failed");
                    return Err(err);
                }
            }
        }
    }
}

/// In-memory fetcher serving canned documents by exact URL. Used to replay
/// saved pages offline.
#[derive(Default)]
pub struct StaticFetcher {
    routes: DashMap<String, Result<String, FetchError>>,
    fallback: Option<Result<String, FetchError>>,
    requests: AtomicUsize,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    // Every URL fails with `error`
    pub fn failing(error: FetchError) -> Self {
        Self {
            fallback: Some(Err(error)),
            ..Self::default()
        }
    }

    pub fn with_document(self, url: impl Into<String>, body: impl Into<String>) -> Self {
        self.routes.insert(url.into(), Ok(body.into()));
        self
    }

    pub fn with_failure(self, url: impl Into<String>, error: FetchError) -> Self {
        self.routes.insert(url.into(), Err(error));
        self
    }

    pub fn with_fallback_document(mut self, body: impl Into<String>) -> Self {
        self.fallback = Some(Ok(body.into()));
        self
    }

    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for StaticFetcher {
    async fn fetch(
        &self,
        url: &str,
        _headers: &[(String, String)],
    ) -> Result<FetchedDocument, FetchError> {
        self.requests.fetch_add(1, Ordering::SeqCst);

        let route = self
            .routes
            .get(url)
            .map(|entry| entry.value().clone())
            .or_else(|| self.fallback.clone());

        match route {
            Some(Ok(body)) => Ok(FetchedDocument { body, status: 200 }),
            Some(Err(err)) => Err(err),
            None => Err(FetchError::HttpStatus {
                status_code: 404,
                url: url.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_grows_and_caps() {
        let config = RetryConfig {
            max_retries: 5,
            initial_backoff_ms: 100,
            max_backoff_ms: 1000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.0,
        };
        assert_eq!(
            HttpFetcher::calculate_backoff(0, &config),
            Duration::from_millis(100)
        );
        assert_eq!(
            HttpFetcher::calculate_backoff(2, &config),
            Duration::from_millis(400)
        );
        assert_eq!(
            HttpFetcher::calculate_backoff(8, &config),
            Duration::from_millis(1000)
        );
    }

    #[test]
    fn test_backoff_jitter_stays_in_band() {
        let config = RetryConfig {
            jitter_factor: 0.2,
            ..RetryConfig::default()
        };
        for _ in 0..50 {
            let backoff = HttpFetcher::calculate_backoff(1, &config).as_millis();
            // base 1000ms, band [900, 1100]
            assert!((900..=1100).contains(&backoff), "backoff {}", backoff);
        }
    }

    #[test]
    fn test_config_from_partial_json() {
        let config: FetcherConfig =
            serde_json::from_str(r#"{"timeout_ms": 2500, "retry_config": {"max_retries": 0}}"#)
                .unwrap();
        assert_eq!(config.timeout_ms, 2500);
        assert_eq!(config.retry_config.max_retries, 0);
        assert_eq!(config.retry_config.initial_backoff_ms, 500);
        assert_eq!(config.user_agent, DEFAULT_USER_AGENT);
    }

    #[tokio::test]
    async fn test_static_fetcher_routes() {
        let fetcher = StaticFetcher::new()
            .with_document("https://example.com/a", "<p>a</p>")
            .with_failure("https://example.com/b", FetchError::Timeout(10));

        let doc = fetcher.fetch("https://example.com/a", &[]).await.unwrap();
        assert_eq!(doc.body, "<p>a</p>");
        assert_eq!(doc.status, 200);
        assert_eq!(
            fetcher.fetch("https://example.com/b", &[]).await,
            Err(FetchError::Timeout(10))
        );
        assert!(matches!(
            fetcher.fetch("https://example.com/c", &[]).await,
            Err(FetchError::HttpStatus {
                status_code: 404,
                ..
            })
        ));
        assert_eq!(fetcher.request_count(), 3);
    }

    #[test]
    fn test_static_fetcher_failing_blocks_on() {
        let fetcher = StaticFetcher::failing(FetchError::NetworkError("dns".to_string()));
        let result = tokio_test::block_on(fetcher.fetch("https://anything", &[]));
        assert_eq!(result, Err(FetchError::NetworkError("dns".to_string())));
    }

    #[tokio::test]
    async fn test_http_fetcher_reports_unreachable_host() {
        let fetcher = HttpFetcher::new(FetcherConfig {
            timeout_ms: 500,
            retry_config: RetryConfig::no_retries(),
            ..FetcherConfig::default()
        })
        .unwrap();

        let result = fetcher.fetch("http://127.0.0.1:9/listings", &[]).await;
        assert!(result.is_err());
    }
}

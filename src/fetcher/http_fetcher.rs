use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use url::Url;

use crate::app::{FreshetError, Result};
use crate::config::Settings;
use crate::fetcher::{charset_from_content_type, FetchedFeed, Fetcher};

/// Fetches `http(s)://` feeds with reqwest and `file://` feeds from disk.
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        Self::from_settings(&Settings::default())
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Self::with_options(
            &settings.user_agent,
            Duration::from_secs(settings.fetch_timeout_secs),
        )
    }

    pub fn with_options(user_agent: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .gzip(true)
            .brotli(true)
            .user_agent(user_agent)
            .build()?;

        Ok(Self { client })
    }

    async fn fetch_file(&self, url: &str) -> Result<FetchedFeed> {
        let path = Url::parse(url)?
            .to_file_path()
            .map_err(|_| FreshetError::Fetch {
                url: url.to_string(),
                message: "not a local file path".into(),
            })?;
        let body = tokio::fs::read(&path)
            .await
            .map_err(|e| FreshetError::Fetch {
                url: url.to_string(),
                message: e.to_string(),
            })?;
        Ok(FetchedFeed::new(body))
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedFeed> {
        if url.starts_with("file:") {
            return self.fetch_file(url).await;
        }

        let response = self.client.get(url).send().await?;
        response.error_for_status_ref()?;

        let charset = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(charset_from_content_type);

        let body = response.bytes().await?.to_vec();
        tracing::debug!("Fetched {} bytes from {}", body.len(), url);

        Ok(FetchedFeed { body, charset })
    }
}

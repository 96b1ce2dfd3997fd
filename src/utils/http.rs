// src/utils/http.rs

//! HTTP client utilities.

use std::time::Duration;

use reqwest::header::{COOKIE, HeaderMap, HeaderValue};
use reqwest::{Client, StatusCode};
use scraper::Html;

use crate::error::{AppError, Result};
use crate::models::CrawlerConfig;

/// Create a configured asynchronous HTTP client carrying the identity and
/// session credential headers.
pub fn create_async_client(config: &CrawlerConfig) -> Result<Client> {
    let mut headers = HeaderMap::new();
    if !config.cookie.is_empty() {
        let cookie = HeaderValue::from_str(&config.cookie)
            .map_err(|e| AppError::config(format!("crawler.cookie is not a valid header: {e}")))?;
        headers.insert(COOKIE, cookie);
    }

    let mut builder = Client::builder()
        .user_agent(&config.user_agent)
        .default_headers(headers);
    if config.timeout_secs > 0 {
        builder = builder.timeout(Duration::from_secs(config.timeout_secs));
    }
    Ok(builder.build()?)
}

/// A successfully fetched page.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// Final URL, query string included
    pub url: String,
    pub status: u16,
    pub body: String,
}

impl FetchedPage {
    /// Parse the body as an HTML document.
    pub fn document(&self) -> Html {
        Html::parse_document(&self.body)
    }
}

/// GET client with a single same-URL retry on non-200 responses.
#[derive(Debug, Clone)]
pub struct FetchClient {
    client: Client,
}

impl FetchClient {
    /// Build a fetch client from the crawler settings.
    pub fn new(config: &CrawlerConfig) -> Result<Self> {
        Ok(Self {
            client: create_async_client(config)?,
        })
    }

    /// Wrap an already configured client.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// Fetch `url` with optional query parameters.
    ///
    /// A non-200 answer is retried exactly once against the same URL; if the
    /// retry also fails, `AppError::FetchFailed` carries the last status.
    pub async fn fetch(&self, url: &str, params: &[(&str, String)]) -> Result<FetchedPage> {
        let first = self.get_once(url, params).await?;
        if first.status == StatusCode::OK.as_u16() {
            return Ok(first);
        }

        log::info!("Rate limited ({}), retrying {}", first.status, first.url);
        let second = self.get_once(url, params).await?;
        if second.status == StatusCode::OK.as_u16() {
            return Ok(second);
        }

        log::warn!("Fail to get: {}, status: {}", second.url, second.status);
        Err(AppError::fetch_failed(second.url, second.status))
    }

    /// Fire-and-forget request whose outcome does not matter.
    pub async fn touch(&self, url: &str) {
        match self.client.get(url).send().await {
            Ok(response) => log::debug!("decoy: {}, status: {}", url, response.status().as_u16()),
            Err(e) => log::debug!("decoy {} failed: {}", url, e),
        }
    }

    async fn get_once(&self, url: &str, params: &[(&str, String)]) -> Result<FetchedPage> {
        let response = self.client.get(url).query(params).send().await?;
        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        log::info!("getting: {}, status: {}", final_url, status);
        let body = response.text().await?;
        Ok(FetchedPage {
            url: final_url,
            status,
            body,
        })
    }
}

//! Network fetching for remote image references.
//!
//! Not a browser: a single GET carrying the page's cookies, an optional
//! referrer token, and a hard timeout. No retries: a failed fetch drops the
//! candidate rather than stalling the pipeline.

use std::time::Duration;

use async_trait::async_trait;

use crate::types::{HarvestError, HarvestResult};

/// Header carrying the referrer-spoofing token to the privileged side.
pub const REFERRER_TOKEN_HEADER: &str = "X-Referrer-Token";

/// A single image GET.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub url: String,
    /// Cookie header of the hosting page ("credentials included").
    pub cookie: Option<String>,
    pub referrer_token: Option<String>,
    pub timeout: Duration,
}

impl FetchRequest {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            cookie: None,
            referrer_token: None,
            timeout,
        }
    }

    pub fn with_cookie(mut self, cookie: Option<&str>) -> Self {
        self.cookie = cookie.map(str::to_string);
        self
    }

    pub fn with_referrer_token(mut self, token: Option<String>) -> Self {
        self.referrer_token = token;
        self
    }
}

/// Anything that can turn a [`FetchRequest`] into response bytes.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &FetchRequest) -> HarvestResult<Vec<u8>>;
}

/// reqwest-backed fetcher.
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpFetcher {
    /// Create a fetcher with a standard browser user-agent.
    pub fn new() -> Self {
        let ua = "Mozilla/5.0 (X11; Linux x86_64) \
                  AppleWebKit/537.36 (KHTML, like Gecko) \
                  Chrome/131.0.0.0 Safari/537.36";

        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(10))
            .user_agent(ua)
            .build()
            .unwrap_or_default();

        Self { client }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &FetchRequest) -> HarvestResult<Vec<u8>> {
        let mut builder = self
            .client
            .get(&request.url)
            .timeout(request.timeout)
            .header(reqwest::header::ACCEPT, "image/*,*/*;q=0.8");

        if let Some(cookie) = &request.cookie {
            builder = builder.header(reqwest::header::COOKIE, cookie.as_str());
        }
        if let Some(token) = &request.referrer_token {
            builder = builder.header(REFERRER_TOKEN_HEADER, token.as_str());
        }

        let resp = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                HarvestError::Timeout(request.timeout.as_millis() as u64)
            } else {
                HarvestError::Fetch(e.to_string())
            }
        })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(HarvestError::Fetch(format!(
                "{} returned HTTP {}",
                request.url,
                status.as_u16()
            )));
        }

        let body = resp.bytes().await.map_err(|e| {
            if e.is_timeout() {
                HarvestError::Timeout(request.timeout.as_millis() as u64)
            } else {
                HarvestError::Fetch(e.to_string())
            }
        })?;
        if body.is_empty() {
            return Err(HarvestError::Fetch(format!("{} returned an empty body", request.url)));
        }

        Ok(body.to_vec())
    }
}

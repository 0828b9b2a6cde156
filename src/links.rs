//! Link extraction -- turns raw input text into an ordered list of descriptors.
//!
//! Input is either a subscription URL (fetched, base64-decoded, then extracted
//! again) or free text containing `vmess://`, `ssr://`, `ss://` and `trojan://`
//! descriptors.

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex::Regex;

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::types::ProxyLink;
use crate::utils::decode_base64_text;

static SUBSCRIPTION_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:https?://)(?:[^@/\n]+@)?(?:www\.)?([^:/\n]+)")
        .unwrap_or_else(|e| unreachable!("subscription URL pattern: {e}"))
});

static DESCRIPTOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i:(?:vmess|ssr)://[a-zA-Z0-9+_/=-]+)|(?i:(?:ss|trojan)://(.+?)@(.+?):([0-9]{2,5})([?#][^\s]+))",
    )
    .unwrap_or_else(|e| unreachable!("descriptor pattern: {e}"))
});

/// Whether `text` should be treated as a subscription endpoint
pub fn is_subscription_url(text: &str) -> bool {
    SUBSCRIPTION_URL.is_match(text.trim())
}

/// All descriptors in `text`, in order of appearance
///
/// # Examples
///
/// ```
/// use linkspeed::links::scan_descriptors;
///
/// let links = scan_descriptors("vmess://abc\ntrojan://pw@host:443#name");
/// assert_eq!(links.len(), 2);
/// assert_eq!(links[1].as_str(), "trojan://pw@host:443#name");
/// ```
pub fn scan_descriptors(text: &str) -> Vec<ProxyLink> {
    DESCRIPTOR
        .find_iter(text)
        .map(|m| ProxyLink::new(m.as_str()))
        .collect()
}

/// Abstraction over subscription fetching, enabling testability.
#[async_trait::async_trait]
pub trait SubscriptionFetcher: Send + Sync {
    /// Fetch the raw (still encoded) body of a subscription URL
    async fn fetch(&self, url: &str) -> Result<String>;
}

/// Production [`SubscriptionFetcher`] backed by reqwest.
pub struct HttpSubscriptionFetcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpSubscriptionFetcher {
    /// Build a fetcher whose requests give up after `timeout`
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Fetch(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client, timeout })
    }
}

#[async_trait::async_trait]
impl SubscriptionFetcher for HttpSubscriptionFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send().await.map_err(|e| {
            let message = if e.is_timeout() {
                format!(
                    "Timeout fetching subscription '{}' (exceeded {} seconds)",
                    url,
                    self.timeout.as_secs()
                )
            } else if e.is_connect() {
                format!("Connection failed for subscription '{}': {}", url, e)
            } else {
                format!("Failed to fetch subscription '{}': {}", url, e)
            };
            Error::Fetch(message)
        })?;

        if !response.status().is_success() {
            return Err(Error::Fetch(format!(
                "HTTP error fetching subscription: {} {}",
                response.status(),
                url
            )));
        }

        response.text().await.map_err(|e| {
            Error::Fetch(format!(
                "Failed to read subscription body from '{}': {}",
                url, e
            ))
        })
    }
}

/// Turns batch link text into descriptors, following subscription URLs
#[derive(Clone)]
pub struct LinkExtractor {
    fetcher: Arc<dyn SubscriptionFetcher>,
    max_depth: u32,
}

impl LinkExtractor {
    /// Create an extractor using `fetcher` for subscription URLs
    pub fn new(fetcher: Arc<dyn SubscriptionFetcher>, max_depth: u32) -> Self {
        Self { fetcher, max_depth }
    }

    /// Create an extractor with the reqwest fetcher configured by `config`
    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        let fetcher = HttpSubscriptionFetcher::new(config.subscription_timeout)?;
        Ok(Self::new(Arc::new(fetcher), config.max_subscription_depth))
    }

    /// Extract an ordered, non-empty list of descriptors from `text`
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidInput`] when no descriptor is found or subscriptions nest
    ///   deeper than the configured limit
    /// - [`Error::Fetch`] / [`Error::Decode`] when a subscription can't be read
    pub async fn extract(&self, text: &str) -> Result<Vec<ProxyLink>> {
        let mut current = text.trim().to_string();
        let mut depth = 0;

        while is_subscription_url(&current) {
            if depth >= self.max_depth {
                return Err(Error::invalid_input(format!(
                    "subscription nesting exceeds {} levels",
                    self.max_depth
                )));
            }
            depth += 1;

            tracing::debug!(url = %current, depth, "Fetching subscription");
            let body = self.fetcher.fetch(&current).await?;
            current = decode_base64_text(&body)?.trim().to_string();
        }

        let links = scan_descriptors(&current);
        if links.is_empty() {
            return Err(Error::invalid_input("no proxy links found"));
        }
        tracing::debug!(count = links.len(), depth, "Extracted links");
        Ok(links)
    }
}

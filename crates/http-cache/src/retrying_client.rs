//! Shared HTTP client used by every L3–L6 source: pooled connection, bounded
//! retry with backoff, and a per-source politeness rate limit (§5).

use domain::Error;
use governor::{Quota, RateLimiter};
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use nonzero_ext::nonzero;
use reqwest::{Client, Response};
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

pub struct RetryingClient {
    client: Client,
    max_retries: u32,
    limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
}

impl RetryingClient {
    pub fn new(timeout: Duration, max_retries: u32, requests_per_second: u32) -> Self {
        let client = Client::builder()
            .pool_max_idle_per_host(4)
            .timeout(timeout)
            .build()
            .expect("failed to build reqwest client");

        let quota = Quota::per_second(
            std::num::NonZeroU32::new(requests_per_second.max(1)).unwrap_or(nonzero!(1u32)),
        );

        Self {
            client,
            max_retries,
            limiter: RateLimiter::direct(quota),
        }
    }

    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// GETs `url`, retrying transient failures (timeout, 429, 5xx) with
    /// linear backoff, bounded by `max_retries` (§7 "Transport / HTTP
    /// transient").
    pub async fn get_with_retry(&self, url: &str) -> Result<Response, Error> {
        let mut attempt = 0u32;
        loop {
            self.limiter.until_ready().await;

            match self.client.get(url).send().await {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => {
                    let status = response.status();
                    if (status.as_u16() == 429 || status.is_server_error()) && attempt < self.max_retries {
                        attempt += 1;
                        warn!("transient HTTP {status} for {url}, retry {attempt}/{}", self.max_retries);
                        sleep(Duration::from_millis(150 * u64::from(attempt))).await;
                        continue;
                    }
                    let body = response.text().await.unwrap_or_default();
                    return Err(Error::OddsApi {
                        status: status.as_u16(),
                        message: body,
                    });
                }
                Err(e) => {
                    if attempt < self.max_retries {
                        attempt += 1;
                        sleep(Duration::from_millis(150 * u64::from(attempt))).await;
                        continue;
                    }
                    return Err(Error::Http(e.to_string()));
                }
            }
        }
    }
}

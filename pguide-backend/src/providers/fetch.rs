///! Shared HTTP client for provider pages with retry and user-agent rotation

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};
use reqwest::StatusCode;

use crate::error::AdapterError;

const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
];

const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);
/// Upper bound on configured attempts; keeps the backoff exponent small
pub const MAX_ATTEMPTS: u32 = 8;

pub struct PageFetcher {
    client: reqwest::Client,
    max_attempts: u32,
    base_delay: Duration,
    next_agent: AtomicUsize,
}

impl PageFetcher {
    pub fn new(timeout: Duration, max_attempts: u32) -> Result<Self, AdapterError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            max_attempts: max_attempts.clamp(1, MAX_ATTEMPTS),
            base_delay: DEFAULT_BASE_DELAY,
            next_agent: AtomicUsize::new(0),
        })
    }

    /// Backoff before attempt `n` is `base_delay * 2^(n-2)`.
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(2));
        self.base_delay.saturating_mul(factor)
    }

    fn user_agent(&self) -> &'static str {
        let index = self.next_agent.fetch_add(1, Ordering::Relaxed);
        USER_AGENTS[index % USER_AGENTS.len()]
    }

    /// GETs `url` and returns the body. Connection errors, timeouts, 429 and
    /// 5xx are retried; other non-success statuses fail immediately.
    pub async fn get_text(&self, url: &str) -> Result<String, AdapterError> {
        for attempt in 1..=self.max_attempts {
            if attempt > 1 {
                let delay = self.backoff(attempt);
                tracing::debug!(
                    "Retrying {} after {:?} (attempt {}/{})",
                    url,
                    delay,
                    attempt,
                    self.max_attempts
                );
                tokio::time::sleep(delay).await;
            }

            match self.fetch_attempt(url).await {
                Ok(body) => return Ok(body),
                Err(e) if attempt < self.max_attempts && is_transient(&e) => {
                    tracing::warn!(
                        "Attempt {}/{} failed for {}: {}",
                        attempt,
                        self.max_attempts,
                        url,
                        e
                    );
                }
                Err(e) => return Err(e),
            }
        }

        Err(AdapterError::Markup(format!(
            "no response from {} after {} attempts",
            url, self.max_attempts
        )))
    }

    async fn fetch_attempt(&self, url: &str) -> Result<String, AdapterError> {
        let response = self
            .client
            .get(url)
            .header(USER_AGENT, self.user_agent())
            .header(ACCEPT, "text/html,application/xhtml+xml,application/json;q=0.9,*/*;q=0.8")
            .header(ACCEPT_LANGUAGE, "en-US,en;q=0.9")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AdapterError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        Ok(response.text().await?)
    }
}

fn is_transient(err: &AdapterError) -> bool {
    match err {
        AdapterError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
        AdapterError::Status { status, .. } => {
            *status == StatusCode::TOO_MANY_REQUESTS.as_u16() || (500..600).contains(status)
        }
        _ => false,
    }
}

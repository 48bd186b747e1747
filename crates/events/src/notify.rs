//! Outbound notification API.
//!
//! Every job milestone is reported to the external API with a bare POST
//! under `API_URL`. Calls are fire-and-forget from the caller's point of
//! view: [`Notifier`] methods return `true` on a 2xx response and `false`
//! otherwise, never an error. Network failures are retried with backoff
//! (2 s, 4 s); an HTTP error status is final.

use std::time::Duration;

use async_trait::async_trait;
use tenmin_core::types::{JobId, ServerId};

/// Delays between attempts (three attempts in total).
const RETRY_DELAYS_SECS: [u64; 2] = [2, 4];

/// HTTP request timeout for a single attempt.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// The underlying HTTP request failed (network, DNS, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The API returned a non-2xx status code.
    #[error("Notification API returned HTTP {0}")]
    HttpStatus(u16),
}

impl NotifyError {
    fn is_transient(&self) -> bool {
        matches!(self, NotifyError::Request(_))
    }
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn start(&self, job_id: JobId) -> bool;

    async fn success(&self, job_id: JobId) -> bool;

    /// The job reached the hold point.
    async fn waiting(&self, job_id: JobId) -> bool;

    async fn otp(&self, job_id: JobId, code: &str) -> bool;

    async fn error(&self, job_id: JobId, category: &str, detail: &str) -> bool;

    async fn login(&self, server_id: ServerId) -> bool;

    async fn disconnect(&self, server_id: ServerId) -> bool;
}

// ---------------------------------------------------------------------------
// HTTP implementation
// ---------------------------------------------------------------------------

pub struct ApiNotifier {
    client: reqwest::Client,
    base_url: String,
}

impl ApiNotifier {
    pub fn new(base_url: impl Into<String>) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// POST with retry on transient failures. Returns whether the call
    /// eventually succeeded.
    async fn post(&self, path: &str, query: &[(&str, &str)]) -> bool {
        let url = self.url(path);

        for (attempt, delay_secs) in RETRY_DELAYS_SECS.iter().enumerate() {
            match self.try_send(&url, query).await {
                Ok(()) => return true,
                Err(e) if e.is_transient() => {
                    tracing::warn!(
                        attempt = attempt + 1,
                        url = %url,
                        error = %e,
                        "Notification attempt failed, retrying"
                    );
                    tokio::time::sleep(Duration::from_secs(*delay_secs)).await;
                }
                Err(e) => {
                    tracing::error!(url = %url, error = %e, "Notification rejected");
                    return false;
                }
            }
        }

        // Final attempt after the last backoff.
        match self.try_send(&url, query).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(url = %url, error = %e, "Notification failed after all retries");
                false
            }
        }
    }

    async fn try_send(&self, url: &str, query: &[(&str, &str)]) -> Result<(), NotifyError> {
        let response = self.client.post(url).query(query).send().await?;
        if !response.status().is_success() {
            return Err(NotifyError::HttpStatus(response.status().as_u16()));
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for ApiNotifier {
    async fn start(&self, job_id: JobId) -> bool {
        self.post(&format!("/start/{job_id}"), &[]).await
    }

    async fn success(&self, job_id: JobId) -> bool {
        self.post(&format!("/success/{job_id}"), &[]).await
    }

    async fn waiting(&self, job_id: JobId) -> bool {
        self.post(&format!("/waiting/{job_id}"), &[]).await
    }

    async fn otp(&self, job_id: JobId, code: &str) -> bool {
        self.post(&format!("/otp/{job_id}"), &[("otp", code)]).await
    }

    async fn error(&self, job_id: JobId, category: &str, detail: &str) -> bool {
        self.post(
            &format!("/error/{job_id}"),
            &[("reason", category), ("detail", detail)],
        )
        .await
    }

    async fn login(&self, server_id: ServerId) -> bool {
        let uuid = server_id.to_string();
        self.post("/login", &[("uuid", uuid.as_str())]).await
    }

    async fn disconnect(&self, server_id: ServerId) -> bool {
        self.post(&format!("/disconnection/{server_id}"), &[]).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let notifier = ApiNotifier::new("http://api.local/").unwrap();
        assert_eq!(notifier.url("/start/5"), "http://api.local/start/5");
    }

    #[test]
    fn notify_error_display_http_status() {
        let err = NotifyError::HttpStatus(502);
        assert_eq!(err.to_string(), "Notification API returned HTTP 502");
        assert!(!err.is_transient());
    }

    #[test]
    fn request_errors_are_transient() {
        let req_err = reqwest::Client::new().get("://bad").build().unwrap_err();
        let err = NotifyError::Request(req_err);
        assert!(err.is_transient());
        assert!(err.to_string().contains("HTTP request failed"));
    }

    #[tokio::test(start_paused = true)]
    async fn unreachable_api_degrades_to_false() {
        // Port 9 (discard) on localhost refuses connections.
        let notifier = ApiNotifier::new("http://127.0.0.1:9").unwrap();
        assert!(!notifier.start(1).await);
    }
}

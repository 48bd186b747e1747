//! OTP relay loop.
//!
//! The client shows a one-time code that the account owner must confirm.
//! The loop reads the code off the screen, relays it through the API, and
//! then watches the screen for the outcome until the pass flag is set or
//! the window runs out:
//!
//! - no code relayed yet this cycle: extract one (bounded sub-retries, each
//!   on a fresh capture) and relay it;
//! - code relayed: classify the frame. A wrong code clears the relayed code
//!   so a fresh one is extracted and rolls the window once; a pass sets the
//!   job's pass flag and ends the loop;
//! - once the renewal interval has elapsed the upstream code has rotated, so
//!   a fresh extraction is forced once.

use async_trait::async_trait;
use tenmin_core::error::JobError;
use tenmin_core::otp_window::OtpWindow;
use tenmin_vision::{Frame, TemplateKey, TemplateSet};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::OtpConfig;
use crate::driver::{ScreenDriver, DETECT_THRESHOLD};

/// Threshold for locating the code digits inside the OTP frame.
const OTP_TEXT_THRESHOLD: f32 = 0.6;

/// What the current frame says about the relayed code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtpSignal {
    /// Still waiting on the user.
    NoSignal,
    Pass,
    Wrong,
}

/// Where the loop reads and writes the job's OTP state.
#[async_trait]
pub trait OtpRelay: Send + Sync {
    /// Whether the job's pass flag is set.
    async fn passed(&self) -> Result<bool, JobError>;

    async fn mark_passed(&self) -> Result<(), JobError>;

    /// Relay a code to the account owner. Returns whether it was delivered.
    async fn send_code(&self, code: &str) -> bool;
}

pub struct OtpLoop<'a> {
    driver: &'a ScreenDriver,
    templates: &'a TemplateSet,
    relay: &'a dyn OtpRelay,
    config: &'a OtpConfig,
}

impl<'a> OtpLoop<'a> {
    pub fn new(
        driver: &'a ScreenDriver,
        templates: &'a TemplateSet,
        relay: &'a dyn OtpRelay,
        config: &'a OtpConfig,
    ) -> Self {
        Self {
            driver,
            templates,
            relay,
            config,
        }
    }

    /// Run until the OTP gate passes. Returns the last relayed code.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<Option<String>, JobError> {
        self.run_inner(cancel).await.map_err(wrap)
    }

    async fn run_inner(&self, cancel: &CancellationToken) -> Result<Option<String>, JobError> {
        let mut window = OtpWindow::new(Instant::now(), self.config.window, self.config.renewal);
        let mut relayed: Option<String> = None;
        let mut last_code: Option<String> = None;

        loop {
            if cancel.is_cancelled() {
                return Err(JobError::Cancelled);
            }
            if self.relay.passed().await? {
                tracing::info!("OTP pass flag set");
                return Ok(last_code);
            }
            if window.expired(Instant::now()) {
                tracing::warn!(window_secs = self.config.window.as_secs(), "OTP window exhausted");
                return Err(JobError::OtpTimeout);
            }

            if relayed.is_none() {
                let code = self.extract(cancel).await?;
                if self.relay.send_code(&code).await {
                    tracing::info!(code = %code, "OTP relayed");
                    last_code = Some(code.clone());
                    relayed = Some(code);
                } else {
                    tracing::warn!("OTP relay failed, extracting again next cycle");
                }
            }

            let now = Instant::now();
            if relayed.is_some() {
                let frame = self.driver.capture().await?;
                match self.classify(&frame)? {
                    OtpSignal::Pass => {
                        self.relay.mark_passed().await?;
                        tracing::info!("OTP accepted");
                        return Ok(last_code);
                    }
                    OtpSignal::NoSignal => tracing::debug!("Waiting for OTP input"),
                    OtpSignal::Wrong => {
                        relayed = None;
                        let rolled = window.on_wrong(now);
                        tracing::info!(rolled, "OTP rejected, extracting a fresh code");
                    }
                }
            }

            if window.renewal_due(now) {
                tracing::info!(elapsed_secs = window.elapsed(now).as_secs(), "OTP rotated upstream, extracting again");
                relayed = None;
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(JobError::Cancelled),
                _ = tokio::time::sleep(self.config.poll) => {}
            }
        }
    }

    /// Read the code, retrying on fresh captures.
    async fn extract(&self, cancel: &CancellationToken) -> Result<String, JobError> {
        let frame_template = self.templates.get(TemplateKey::OtpFrame)?;
        let number_template = self.templates.get(TemplateKey::OtpNumber)?;
        let attempts = self.config.extraction_attempts;

        for attempt in 1..=attempts {
            let frame = self.driver.capture().await?;
            match self.driver.find(&frame, frame_template, DETECT_THRESHOLD, None) {
                None => tracing::debug!(attempt, attempts, "OTP frame not found"),
                Some(region) => {
                    let text = self.driver.matcher.extract_text(
                        &frame,
                        number_template,
                        OTP_TEXT_THRESHOLD,
                        Some(region.rect),
                    );
                    match text {
                        Some(code) if !code.is_empty() => return Ok(code),
                        _ => tracing::debug!(attempt, attempts, "OTP digits not readable"),
                    }
                }
            }

            if attempt < attempts {
                tokio::select! {
                    _ = cancel.cancelled() => return Err(JobError::Cancelled),
                    _ = tokio::time::sleep(self.config.extraction_retry) => {}
                }
            }
        }

        Err(JobError::OtpOverDetectionLimit)
    }

    fn classify(&self, frame: &Frame) -> Result<OtpSignal, JobError> {
        let wrong = self.templates.get(TemplateKey::OtpWrong)?;
        if self.driver.visible(frame, wrong) {
            return Ok(OtpSignal::Wrong);
        }
        let otp_frame = self.templates.get(TemplateKey::OtpFrame)?;
        if self.driver.visible(frame, otp_frame) {
            return Ok(OtpSignal::NoSignal);
        }
        Ok(OtpSignal::Pass)
    }
}

/// Unclassified failures inside the loop become a generic OTP error.
fn wrap(err: JobError) -> JobError {
    match err {
        JobError::Controller(msg) => JobError::Otp(msg),
        other => other,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Timing and attempt-budget knobs for the screen and OTP loops.

use std::time::Duration;

/// Per-screen attempt budgets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Budgets {
    pub password: u32,
    pub notice: u32,
    pub team_select: u32,
    pub purchase_cancel: u32,
    pub top_class: u32,
    pub exit_team: u32,
    pub exit_modal: u32,
    /// OTP extraction sub-retries per cycle.
    pub otp_extraction: u32,
}

impl Default for Budgets {
    fn default() -> Self {
        Self {
            password: 20,
            notice: 20,
            team_select: 20,
            purchase_cancel: 5,
            top_class: 3,
            exit_team: 5,
            exit_modal: 5,
            otp_extraction: 5,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FsmConfig {
    /// Re-poll cadence when no handler acted on a frame.
    pub poll: Duration,
    /// Re-poll cadence of the teardown exit flow.
    pub exit_poll: Duration,
    pub budgets: Budgets,
    /// Walk the optional purchase-cancel and top-class screens.
    pub optional_screens: bool,
}

impl Default for FsmConfig {
    fn default() -> Self {
        Self {
            poll: Duration::from_millis(2000),
            exit_poll: Duration::from_secs(1),
            budgets: Budgets::default(),
            optional_screens: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OtpConfig {
    pub window: Duration,
    pub renewal: Duration,
    pub poll: Duration,
    /// Pause between extraction sub-retries.
    pub extraction_retry: Duration,
    pub extraction_attempts: u32,
}

impl Default for OtpConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(135),
            renewal: Duration::from_secs(65),
            poll: Duration::from_secs(3),
            extraction_retry: Duration::from_secs(3),
            extraction_attempts: Budgets::default().otp_extraction,
        }
    }
}

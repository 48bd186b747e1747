//! Job error taxonomy.
//!
//! Leaf components (screen handlers, the OTP loop, the timer service) return
//! [`JobError`]. The job controller matches on [`JobError::kind`] to decide
//! whether a failure is classified (mark the PC stopped, notify the API with
//! [`ErrorKind::category`] and [`JobError::detail`]) or unclassified
//! ([`ErrorKind::Controller`], returned to the caller).

use std::fmt;

use crate::screen::Screen;
use crate::types::{JobId, WorkerId};

/// The visual cause behind a duplicate-login detection.
///
/// Five distinct client dialogs all mean "someone else holds this account".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DuplicateLoginCause {
    /// "Same login" dialog shown on the press-any-key screen.
    SameLoginAnyKey,
    /// "Someone is already logged in" dialog.
    AlreadyLoggedIn,
    /// "Someone is connecting, try again" dialog.
    ConnectingElsewhere,
    /// "Same login" dialog shown on the password screen.
    SameLoginPassword,
    /// Another session passed the OTP gate first.
    OtpPassedElsewhere,
}

impl DuplicateLoginCause {
    pub const ALL: [DuplicateLoginCause; 5] = [
        DuplicateLoginCause::SameLoginAnyKey,
        DuplicateLoginCause::AlreadyLoggedIn,
        DuplicateLoginCause::ConnectingElsewhere,
        DuplicateLoginCause::SameLoginPassword,
        DuplicateLoginCause::OtpPassedElsewhere,
    ];

    /// Stable identifier used in notifications and template keys.
    pub fn as_str(self) -> &'static str {
        match self {
            DuplicateLoginCause::SameLoginAnyKey => "same_login_in_anykey_error",
            DuplicateLoginCause::AlreadyLoggedIn => "someone_already_login_error",
            DuplicateLoginCause::ConnectingElsewhere => "some_one_connecting_try_error",
            DuplicateLoginCause::SameLoginPassword => "same_login_in_password_error",
            DuplicateLoginCause::OtpPassedElsewhere => "some_one_otp_pass_error",
        }
    }
}

impl fmt::Display for DuplicateLoginCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of a single job.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum JobError {
    #[error("no RemotePC row for worker {worker_id}")]
    NoWorker { worker_id: WorkerId },

    #[error("no PC number mapped for worker {worker_id}")]
    CantFindPcNumber { worker_id: WorkerId },

    #[error("remote control program not found: {0}")]
    CantFindRemoteProgram(String),

    #[error("template unavailable: {0}")]
    TemplateEmpty(String),

    #[error("screen {screen} not detected after {attempts} attempts")]
    NoDetection { screen: Screen, attempts: u32 },

    #[error("password rejected by client")]
    WrongPassword,

    #[error("duplicate login detected: {0}")]
    DuplicateLogin(DuplicateLoginCause),

    #[error("OTP window elapsed without a pass")]
    OtpTimeout,

    #[error("OTP code could not be extracted within the detection limit")]
    OtpOverDetectionLimit,

    #[error("OTP detection failed: {0}")]
    Otp(String),

    #[error("no timer record for job {job_id}")]
    CantFindTimerData { job_id: JobId },

    #[error("teardown failed: {0}")]
    CheckTimer(String),

    #[error("controller error: {0}")]
    Controller(String),

    #[error("job cancelled")]
    Cancelled,
}

/// Tag of a [`JobError`] without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NoWorker,
    CantFindPcNumber,
    CantFindRemoteProgram,
    TemplateEmpty,
    NoDetection,
    WrongPassword,
    DuplicateLogin,
    OtpTimeout,
    OtpOverDetectionLimit,
    Otp,
    CantFindTimerData,
    CheckTimer,
    Controller,
    Cancelled,
}

impl ErrorKind {
    /// Notification category sent to the external API.
    ///
    /// Groups kinds the way operators triage them: infrastructure
    /// (`program`), account problems (`duplicate_login`, `password`),
    /// OTP problems (`otp`) and screen recognition (`detection`).
    pub fn category(self) -> &'static str {
        match self {
            ErrorKind::NoWorker
            | ErrorKind::CantFindPcNumber
            | ErrorKind::CantFindRemoteProgram
            | ErrorKind::TemplateEmpty
            | ErrorKind::CantFindTimerData
            | ErrorKind::CheckTimer
            | ErrorKind::Controller
            | ErrorKind::Cancelled => "program",
            ErrorKind::DuplicateLogin => "duplicate_login",
            ErrorKind::OtpTimeout | ErrorKind::OtpOverDetectionLimit | ErrorKind::Otp => "otp",
            ErrorKind::WrongPassword => "password",
            ErrorKind::NoDetection => "detection",
        }
    }

    /// Whether the controller handles this kind itself (stop + notify).
    ///
    /// `Controller` is returned to the caller; `Cancelled` is only logged.
    pub fn is_classified(self) -> bool {
        !matches!(self, ErrorKind::Controller | ErrorKind::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::NoWorker => "no_worker",
            ErrorKind::CantFindPcNumber => "cant_find_pc_number",
            ErrorKind::CantFindRemoteProgram => "cant_find_remote_program",
            ErrorKind::TemplateEmpty => "template_empty",
            ErrorKind::NoDetection => "no_detection",
            ErrorKind::WrongPassword => "wrong_password",
            ErrorKind::DuplicateLogin => "duplicate_login",
            ErrorKind::OtpTimeout => "otp_timeout",
            ErrorKind::OtpOverDetectionLimit => "otp_over_detection_limit",
            ErrorKind::Otp => "otp",
            ErrorKind::CantFindTimerData => "cant_find_timer_data",
            ErrorKind::CheckTimer => "check_timer",
            ErrorKind::Controller => "controller",
            ErrorKind::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl JobError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            JobError::NoWorker { .. } => ErrorKind::NoWorker,
            JobError::CantFindPcNumber { .. } => ErrorKind::CantFindPcNumber,
            JobError::CantFindRemoteProgram(_) => ErrorKind::CantFindRemoteProgram,
            JobError::TemplateEmpty(_) => ErrorKind::TemplateEmpty,
            JobError::NoDetection { .. } => ErrorKind::NoDetection,
            JobError::WrongPassword => ErrorKind::WrongPassword,
            JobError::DuplicateLogin(_) => ErrorKind::DuplicateLogin,
            JobError::OtpTimeout => ErrorKind::OtpTimeout,
            JobError::OtpOverDetectionLimit => ErrorKind::OtpOverDetectionLimit,
            JobError::Otp(_) => ErrorKind::Otp,
            JobError::CantFindTimerData { .. } => ErrorKind::CantFindTimerData,
            JobError::CheckTimer(_) => ErrorKind::CheckTimer,
            JobError::Controller(_) => ErrorKind::Controller,
            JobError::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Notification detail: the specific cause within the category.
    pub fn detail(&self) -> String {
        match self {
            JobError::DuplicateLogin(cause) => cause.as_str().to_string(),
            JobError::NoDetection { screen, .. } => format!("{}_not_detected", screen.as_str()),
            other => other.kind().as_str().to_string(),
        }
    }

    /// Wrap any error as an unclassified controller failure.
    pub fn controller(err: impl fmt::Display) -> Self {
        JobError::Controller(err.to_string())
    }

    /// Wrap a teardown failure, keeping classified kinds that already
    /// carry their own meaning.
    pub fn check_timer(err: JobError) -> Self {
        match err {
            JobError::CheckTimer(_) | JobError::Cancelled => err,
            other => JobError::CheckTimer(other.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

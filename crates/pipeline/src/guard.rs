//! Duplicate-login guard.
//!
//! Five client dialogs mean another session holds the account. The guard
//! runs on every captured frame before the handler chain and aborts the job
//! on the first match. It does not spend screen attempts.

use tenmin_core::error::{DuplicateLoginCause, JobError};
use tenmin_vision::{Frame, TemplateKey, TemplateSet};

use crate::driver::ScreenDriver;

const GUARD_THRESHOLD: f32 = 0.8;

/// Order in which the signatures are checked.
pub const GUARD_ORDER: [DuplicateLoginCause; 5] = [
    DuplicateLoginCause::OtpPassedElsewhere,
    DuplicateLoginCause::SameLoginAnyKey,
    DuplicateLoginCause::AlreadyLoggedIn,
    DuplicateLoginCause::ConnectingElsewhere,
    DuplicateLoginCause::SameLoginPassword,
];

pub fn check_duplicate_login(driver: &ScreenDriver, frame: &Frame, templates: &TemplateSet) -> Result<(), JobError> {
    for cause in GUARD_ORDER {
        let template = templates.get(TemplateKey::DuplicateLogin(cause))?;
        if driver.find(frame, template, GUARD_THRESHOLD, None).is_some() {
            tracing::warn!(cause = %cause, "Duplicate login detected");
            return Err(JobError::DuplicateLogin(cause));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

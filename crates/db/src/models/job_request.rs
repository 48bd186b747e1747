//! Job rows (`job_requests`).

use serde::Serialize;
use sqlx::FromRow;
use tenmin_core::types::{JobId, WorkerId};

/// Job-state code meaning "paid and ready to connect".
pub const JOB_STATE_READY: i32 = 2;

/// A row from the `job_requests` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct JobRequest {
    pub id: JobId,
    pub service: String,
    /// Password digits typed on the client's password panel.
    #[serde(skip_serializing)]
    pub secret: String,
    pub worker_id: Option<WorkerId>,
    pub coupon_count: i32,
    pub otp: i32,
    pub state: i32,
    pub otp_pass: i32,
}

impl JobRequest {
    pub fn requires_otp(&self) -> bool {
        self.otp == 1
    }

    pub fn otp_passed(&self) -> bool {
        self.otp_pass != 0
    }
}

//! TimerRecord rows (`timer_records`).

use serde::Serialize;
use sqlx::FromRow;
use tenmin_core::status::{TimerState, UnknownCode};
use tenmin_core::types::{JobId, PcNumber, ServerId, Timestamp};

/// A row from the `timer_records` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct TimerRecord {
    pub job_id: JobId,
    pub server_id: ServerId,
    pub pc_number: PcNumber,
    pub state: String,
    pub start_time: Timestamp,
    /// Set only when the record reaches `TERMINATED`.
    pub end_time: Option<Timestamp>,
}

impl TimerRecord {
    pub fn timer_state(&self) -> Result<TimerState, UnknownCode> {
        self.state.parse()
    }
}

//! RemotePC rows (`remote_pcs`).

use serde::Serialize;
use sqlx::FromRow;
use tenmin_core::status::{PcState, UnknownCode};
use tenmin_core::types::{ServerId, Timestamp, WorkerId};

/// A row from the `remote_pcs` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct RemotePc {
    pub id: i64,
    pub server_id: ServerId,
    pub service: String,
    pub worker_id: Option<WorkerId>,
    pub state: String,
    pub server_online_time: Timestamp,
}

impl RemotePc {
    pub fn pc_state(&self) -> Result<PcState, UnknownCode> {
        self.state.parse()
    }
}

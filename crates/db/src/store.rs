//! The persistence seam used by the orchestrator.
//!
//! [`Store`] bundles the queries the job controller, timer service and event
//! translator need. [`PgStore`] forwards to the repositories; the in-memory
//! store in [`crate::memory`] backs the behaviour tests.

use async_trait::async_trait;
use sqlx::PgPool;
use tenmin_core::status::{PcState, TimerState};
use tenmin_core::types::{JobId, PcNumber, ServerId, Timestamp};

use crate::models::job_request::JobRequest;
use crate::models::remote_pc::RemotePc;
use crate::models::timer_record::TimerRecord;
use crate::repositories::{JobRequestRepo, RemotePcRepo, TimerRecordRepo, WorkerPcRepo};

pub type StoreError = sqlx::Error;

#[async_trait]
pub trait Store: Send + Sync {
    // ── RemotePC ────────────────────────────────────────────────────────

    /// Advertise a server with one unclaimed RemotePC row.
    async fn register_server(&self, server_id: ServerId, service: &str) -> Result<(), StoreError>;

    /// Remove every RemotePC row of a server.
    async fn remove_server(&self, server_id: ServerId) -> Result<u64, StoreError>;

    async fn find_remote_pc(
        &self,
        server_id: ServerId,
        worker_id: &str,
    ) -> Result<Option<RemotePc>, StoreError>;

    /// Returns `false` when the worker has no row on this server.
    async fn set_pc_state(
        &self,
        server_id: ServerId,
        worker_id: &str,
        state: PcState,
    ) -> Result<bool, StoreError>;

    async fn working_count(&self, server_id: ServerId) -> Result<i64, StoreError>;

    async fn pc_number(&self, worker_id: &str) -> Result<Option<PcNumber>, StoreError>;

    // ── JobRequest ──────────────────────────────────────────────────────

    async fn find_job(&self, job_id: JobId) -> Result<Option<JobRequest>, StoreError>;

    async fn otp_pass(&self, job_id: JobId) -> Result<Option<bool>, StoreError>;

    async fn set_otp_pass(&self, job_id: JobId, passed: bool) -> Result<(), StoreError>;

    // ── TimerRecord ─────────────────────────────────────────────────────

    async fn insert_timer(
        &self,
        job_id: JobId,
        server_id: ServerId,
        pc_number: PcNumber,
        start_time: Timestamp,
    ) -> Result<TimerRecord, StoreError>;

    async fn find_timer(
        &self,
        job_id: JobId,
        server_id: ServerId,
    ) -> Result<Option<TimerRecord>, StoreError>;

    async fn set_timer_state(
        &self,
        job_id: JobId,
        server_id: ServerId,
        state: TimerState,
        end_time: Option<Timestamp>,
    ) -> Result<bool, StoreError>;

    /// Records in any of `states`, ordered by start time then job id.
    async fn timers_in_states(
        &self,
        server_id: Option<ServerId>,
        states: &[TimerState],
    ) -> Result<Vec<TimerRecord>, StoreError>;

    /// Transactionally move a `TIMEOUT` record to `WORKING` and its PC to
    /// `working`, unless another PC on the server is working.
    async fn claim_teardown(
        &self,
        job_id: JobId,
        server_id: ServerId,
        worker_id: &str,
    ) -> Result<bool, StoreError>;

    /// Transactionally set the PC `idle` and the record `TERMINATED`.
    async fn finish_teardown(
        &self,
        job_id: JobId,
        server_id: ServerId,
        worker_id: &str,
        end_time: Timestamp,
    ) -> Result<(), StoreError>;
}

// ---------------------------------------------------------------------------
// PostgreSQL
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Store for PgStore {
    async fn register_server(&self, server_id: ServerId, service: &str) -> Result<(), StoreError> {
        RemotePcRepo::insert_server(&self.pool, server_id, service).await?;
        Ok(())
    }

    async fn remove_server(&self, server_id: ServerId) -> Result<u64, StoreError> {
        RemotePcRepo::delete_by_server(&self.pool, server_id).await
    }

    async fn find_remote_pc(
        &self,
        server_id: ServerId,
        worker_id: &str,
    ) -> Result<Option<RemotePc>, StoreError> {
        RemotePcRepo::find(&self.pool, server_id, worker_id).await
    }

    async fn set_pc_state(
        &self,
        server_id: ServerId,
        worker_id: &str,
        state: PcState,
    ) -> Result<bool, StoreError> {
        RemotePcRepo::set_state(&self.pool, server_id, worker_id, state).await
    }

    async fn working_count(&self, server_id: ServerId) -> Result<i64, StoreError> {
        RemotePcRepo::working_count(&self.pool, server_id).await
    }

    async fn pc_number(&self, worker_id: &str) -> Result<Option<PcNumber>, StoreError> {
        WorkerPcRepo::pc_number(&self.pool, worker_id).await
    }

    async fn find_job(&self, job_id: JobId) -> Result<Option<JobRequest>, StoreError> {
        JobRequestRepo::find_by_id(&self.pool, job_id).await
    }

    async fn otp_pass(&self, job_id: JobId) -> Result<Option<bool>, StoreError> {
        JobRequestRepo::otp_pass(&self.pool, job_id).await
    }

    async fn set_otp_pass(&self, job_id: JobId, passed: bool) -> Result<(), StoreError> {
        JobRequestRepo::set_otp_pass(&self.pool, job_id, passed).await
    }

    async fn insert_timer(
        &self,
        job_id: JobId,
        server_id: ServerId,
        pc_number: PcNumber,
        start_time: Timestamp,
    ) -> Result<TimerRecord, StoreError> {
        TimerRecordRepo::insert_waiting(&self.pool, job_id, server_id, pc_number, start_time).await
    }

    async fn find_timer(
        &self,
        job_id: JobId,
        server_id: ServerId,
    ) -> Result<Option<TimerRecord>, StoreError> {
        TimerRecordRepo::find(&self.pool, job_id, server_id).await
    }

    async fn set_timer_state(
        &self,
        job_id: JobId,
        server_id: ServerId,
        state: TimerState,
        end_time: Option<Timestamp>,
    ) -> Result<bool, StoreError> {
        TimerRecordRepo::set_state(&self.pool, job_id, server_id, state, end_time).await
    }

    async fn timers_in_states(
        &self,
        server_id: Option<ServerId>,
        states: &[TimerState],
    ) -> Result<Vec<TimerRecord>, StoreError> {
        TimerRecordRepo::list_in_states(&self.pool, server_id, states).await
    }

    async fn claim_teardown(
        &self,
        job_id: JobId,
        server_id: ServerId,
        worker_id: &str,
    ) -> Result<bool, StoreError> {
        TimerRecordRepo::claim_teardown(&self.pool, job_id, server_id, worker_id).await
    }

    async fn finish_teardown(
        &self,
        job_id: JobId,
        server_id: ServerId,
        worker_id: &str,
        end_time: Timestamp,
    ) -> Result<(), StoreError> {
        TimerRecordRepo::finish_teardown(&self.pool, job_id, server_id, worker_id, end_time).await
    }
}

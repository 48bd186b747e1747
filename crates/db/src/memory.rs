//! In-memory [`Store`] for tests.
//!
//! Mirrors the PostgreSQL semantics the orchestrator relies on: FIFO
//! ordering of timer listings, `end_time` only on `TERMINATED`, and the
//! all-or-nothing teardown claim.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tenmin_core::status::{PcState, TimerState};
use tenmin_core::types::{JobId, PcNumber, ServerId, Timestamp};
use tokio::sync::Mutex;

use crate::models::job_request::JobRequest;
use crate::models::remote_pc::RemotePc;
use crate::models::timer_record::TimerRecord;
use crate::store::{Store, StoreError};

#[derive(Default)]
struct Inner {
    next_pc_id: i64,
    remote_pcs: Vec<RemotePc>,
    worker_pcs: HashMap<String, PcNumber>,
    jobs: HashMap<JobId, JobRequest>,
    timers: Vec<TimerRecord>,
    failing: bool,
}

impl Inner {
    fn check(&self) -> Result<(), StoreError> {
        if self.failing {
            return Err(sqlx::Error::PoolTimedOut);
        }
        Ok(())
    }

    fn pc_mut(&mut self, server_id: ServerId, worker_id: &str) -> Option<&mut RemotePc> {
        self.remote_pcs
            .iter_mut()
            .find(|pc| pc.server_id == server_id && pc.worker_id.as_deref() == Some(worker_id))
    }

    fn timer_mut(&mut self, job_id: JobId, server_id: ServerId) -> Option<&mut TimerRecord> {
        self.timers
            .iter_mut()
            .find(|t| t.job_id == job_id && t.server_id == server_id)
    }
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Seeding and inspection ──────────────────────────────────────────

    /// Insert a RemotePC row and return its id.
    pub async fn add_remote_pc(
        &self,
        server_id: ServerId,
        worker_id: Option<&str>,
        state: PcState,
    ) -> i64 {
        let mut inner = self.inner.lock().await;
        inner.next_pc_id += 1;
        let id = inner.next_pc_id;
        inner.remote_pcs.push(RemotePc {
            id,
            server_id,
            service: "10min".to_string(),
            worker_id: worker_id.map(str::to_string),
            state: state.as_str().to_string(),
            server_online_time: Utc::now(),
        });
        id
    }

    pub async fn assign_pc(&self, worker_id: &str, pc_number: PcNumber) {
        self.inner
            .lock()
            .await
            .worker_pcs
            .insert(worker_id.to_string(), pc_number);
    }

    pub async fn add_job(&self, job: JobRequest) {
        self.inner.lock().await.jobs.insert(job.id, job);
    }

    pub async fn pc_state(&self, server_id: ServerId, worker_id: &str) -> Option<PcState> {
        let mut inner = self.inner.lock().await;
        inner
            .pc_mut(server_id, worker_id)
            .and_then(|pc| pc.pc_state().ok())
    }

    pub async fn remote_pcs(&self) -> Vec<RemotePc> {
        self.inner.lock().await.remote_pcs.clone()
    }

    pub async fn timers(&self) -> Vec<TimerRecord> {
        self.inner.lock().await.timers.clone()
    }

    /// Overwrite a record's start time, e.g. to backdate a hold.
    pub async fn set_timer_start(&self, job_id: JobId, server_id: ServerId, start: Timestamp) {
        if let Some(t) = self.inner.lock().await.timer_mut(job_id, server_id) {
            t.start_time = start;
        }
    }

    /// Insert a timer record directly in the given state.
    pub async fn add_timer(
        &self,
        job_id: JobId,
        server_id: ServerId,
        pc_number: PcNumber,
        state: TimerState,
        start_time: Timestamp,
    ) {
        self.inner.lock().await.timers.push(TimerRecord {
            job_id,
            server_id,
            pc_number,
            state: state.as_str().to_string(),
            start_time,
            end_time: None,
        });
    }

    /// Make every subsequent call fail with a pool timeout.
    pub async fn set_failing(&self, failing: bool) {
        self.inner.lock().await.failing = failing;
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn register_server(&self, server_id: ServerId, service: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner.check()?;
        inner.next_pc_id += 1;
        let id = inner.next_pc_id;
        inner.remote_pcs.push(RemotePc {
            id,
            server_id,
            service: service.to_string(),
            worker_id: None,
            state: PcState::None.as_str().to_string(),
            server_online_time: Utc::now(),
        });
        Ok(())
    }

    async fn remove_server(&self, server_id: ServerId) -> Result<u64, StoreError> {
        let mut inner = self.inner.lock().await;
        inner.check()?;
        let before = inner.remote_pcs.len();
        inner.remote_pcs.retain(|pc| pc.server_id != server_id);
        Ok((before - inner.remote_pcs.len()) as u64)
    }

    async fn find_remote_pc(
        &self,
        server_id: ServerId,
        worker_id: &str,
    ) -> Result<Option<RemotePc>, StoreError> {
        let mut inner = self.inner.lock().await;
        inner.check()?;
        Ok(inner.pc_mut(server_id, worker_id).map(|pc| pc.clone()))
    }

    async fn set_pc_state(
        &self,
        server_id: ServerId,
        worker_id: &str,
        state: PcState,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        inner.check()?;
        match inner.pc_mut(server_id, worker_id) {
            Some(pc) => {
                pc.state = state.as_str().to_string();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn working_count(&self, server_id: ServerId) -> Result<i64, StoreError> {
        let inner = self.inner.lock().await;
        inner.check()?;
        let count = inner
            .remote_pcs
            .iter()
            .filter(|pc| pc.server_id == server_id && pc.state == PcState::Working.as_str())
            .count();
        Ok(count as i64)
    }

    async fn pc_number(&self, worker_id: &str) -> Result<Option<PcNumber>, StoreError> {
        let inner = self.inner.lock().await;
        inner.check()?;
        Ok(inner.worker_pcs.get(worker_id).copied())
    }

    async fn find_job(&self, job_id: JobId) -> Result<Option<JobRequest>, StoreError> {
        let inner = self.inner.lock().await;
        inner.check()?;
        Ok(inner.jobs.get(&job_id).cloned())
    }

    async fn otp_pass(&self, job_id: JobId) -> Result<Option<bool>, StoreError> {
        let inner = self.inner.lock().await;
        inner.check()?;
        Ok(inner.jobs.get(&job_id).map(JobRequest::otp_passed))
    }

    async fn set_otp_pass(&self, job_id: JobId, passed: bool) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner.check()?;
        if let Some(job) = inner.jobs.get_mut(&job_id) {
            job.otp_pass = i32::from(passed);
        }
        Ok(())
    }

    async fn insert_timer(
        &self,
        job_id: JobId,
        server_id: ServerId,
        pc_number: PcNumber,
        start_time: Timestamp,
    ) -> Result<TimerRecord, StoreError> {
        let mut inner = self.inner.lock().await;
        inner.check()?;
        inner
            .timers
            .retain(|t| !(t.job_id == job_id && t.server_id == server_id));
        let record = TimerRecord {
            job_id,
            server_id,
            pc_number,
            state: TimerState::Waiting.as_str().to_string(),
            start_time,
            end_time: None,
        };
        inner.timers.push(record.clone());
        Ok(record)
    }

    async fn find_timer(
        &self,
        job_id: JobId,
        server_id: ServerId,
    ) -> Result<Option<TimerRecord>, StoreError> {
        let mut inner = self.inner.lock().await;
        inner.check()?;
        Ok(inner.timer_mut(job_id, server_id).map(|t| t.clone()))
    }

    async fn set_timer_state(
        &self,
        job_id: JobId,
        server_id: ServerId,
        state: TimerState,
        end_time: Option<Timestamp>,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        inner.check()?;
        match inner.timer_mut(job_id, server_id) {
            Some(t) => {
                t.state = state.as_str().to_string();
                t.end_time = end_time.filter(|_| state == TimerState::Terminated);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn timers_in_states(
        &self,
        server_id: Option<ServerId>,
        states: &[TimerState],
    ) -> Result<Vec<TimerRecord>, StoreError> {
        let inner = self.inner.lock().await;
        inner.check()?;
        let mut records: Vec<TimerRecord> = inner
            .timers
            .iter()
            .filter(|t| server_id.is_none_or(|s| s == t.server_id))
            .filter(|t| states.iter().any(|s| s.as_str() == t.state))
            .cloned()
            .collect();
        records.sort_by_key(|t| (t.start_time, t.job_id));
        Ok(records)
    }

    async fn claim_teardown(
        &self,
        job_id: JobId,
        server_id: ServerId,
        worker_id: &str,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        inner.check()?;
        let busy = inner
            .remote_pcs
            .iter()
            .any(|pc| pc.server_id == server_id && pc.state == PcState::Working.as_str());
        if busy {
            return Ok(false);
        }
        match inner.timer_mut(job_id, server_id) {
            Some(t) if t.state == TimerState::Timeout.as_str() => {
                t.state = TimerState::Working.as_str().to_string();
            }
            _ => return Ok(false),
        }
        if let Some(pc) = inner.pc_mut(server_id, worker_id) {
            pc.state = PcState::Working.as_str().to_string();
        }
        Ok(true)
    }

    async fn finish_teardown(
        &self,
        job_id: JobId,
        server_id: ServerId,
        worker_id: &str,
        end_time: Timestamp,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner.check()?;
        if let Some(pc) = inner.pc_mut(server_id, worker_id) {
            pc.state = PcState::Idle.as_str().to_string();
        }
        if let Some(t) = inner.timer_mut(job_id, server_id) {
            t.state = TimerState::Terminated.as_str().to_string();
            t.end_time = Some(end_time);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

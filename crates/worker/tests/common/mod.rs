#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tenmin_core::hold::HoldPolicy;
use tenmin_core::status::{PcState, TimerState};
use tenmin_core::types::{JobId, PcNumber, ServerId};
use tenmin_db::memory::MemoryStore;
use tenmin_db::models::job_request::{JobRequest, JOB_STATE_READY};
use tenmin_db::models::timer_record::TimerRecord;
use tenmin_db::Store;
use tenmin_events::testing::{Notification, RecordingNotifier};
use tenmin_events::RowEvent;
use tenmin_pipeline::ScreenDriver;
use tenmin_vision::testing::{blank_templates, FakeCapture, FakeSession, RecordingInput, ScriptedMatcher, Visibility};
use tenmin_vision::TemplateKey;

use tenmin_worker::{Collaborators, JobConfig, Orchestrator};

pub const SERVER: ServerId = 4242;
pub const HOLD: Duration = Duration::from_secs(60);

/// Short waits everywhere so paused-clock tests stay quick.
pub fn test_config() -> JobConfig {
    JobConfig {
        hold: HoldPolicy::new(HOLD, Duration::from_secs(1)),
        timer_poll: Duration::from_secs(1),
        otp_grace: Duration::from_secs(1),
        connect_grace: Duration::from_secs(1),
        ..JobConfig::default()
    }
}

pub struct Harness {
    pub ctx: Arc<Orchestrator>,
    pub store: Arc<MemoryStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub matcher: Arc<ScriptedMatcher>,
    pub capture: Arc<FakeCapture>,
    pub input: Arc<RecordingInput>,
    pub session: Arc<FakeSession>,
}

pub fn harness() -> Harness {
    harness_with(test_config())
}

pub fn harness_with(config: JobConfig) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let notifier = Arc::new(RecordingNotifier::new());
    let matcher = Arc::new(ScriptedMatcher::new());
    let capture = Arc::new(FakeCapture::new());
    let input = Arc::new(RecordingInput::new());
    let session = Arc::new(FakeSession::new());

    let ctx = Orchestrator::new(
        SERVER,
        config,
        Collaborators {
            store: store.clone(),
            notifier: notifier.clone(),
            driver: ScreenDriver::new(capture.clone(), matcher.clone(), input.clone()),
            session: session.clone(),
            templates: Arc::new(blank_templates()),
        },
    );

    Harness {
        ctx,
        store,
        notifier,
        matcher,
        capture,
        input,
        session,
    }
}

impl Harness {
    /// A claimed, idle PC for `worker_id` mapped to `pc_number`.
    pub async fn idle_worker(&self, worker_id: &str, pc_number: PcNumber) {
        self.store.add_remote_pc(SERVER, Some(worker_id), PcState::Idle).await;
        self.store.assign_pc(worker_id, pc_number).await;
        self.ctx.registry.register(worker_id);
    }

    /// Script the connect screens (password digit 7) to pass on sight.
    pub fn script_connect(&self) {
        self.matcher
            .show(TemplateKey::PasswordScreen, Visibility::Always)
            .show(TemplateKey::Digit(7), Visibility::Always)
            .show(TemplateKey::PasswordConfirm, Visibility::Always)
            .show(TemplateKey::TeamSelectScreen, Visibility::Always)
            .show(TemplateKey::TeamSelectText, Visibility::Always);
    }

    pub fn script_exit(&self) {
        self.matcher
            .show(TemplateKey::ExitTeam, Visibility::Always)
            .show(TemplateKey::ExitTeamButton, Visibility::Always)
            .show(TemplateKey::ExitModal, Visibility::Always)
            .show(TemplateKey::ExitModalButton, Visibility::Always);
    }

    pub async fn timer(&self, job_id: JobId) -> Option<TimerRecord> {
        self.store.find_timer(job_id, SERVER).await.unwrap()
    }

    pub async fn job(&self, job_id: JobId) -> JobRequest {
        self.store.find_job(job_id).await.unwrap().unwrap()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.notifier.calls()
    }

    pub async fn wait_pc(&self, worker_id: &str, state: PcState) {
        for _ in 0..MAX_POLLS {
            if self.store.pc_state(SERVER, worker_id).await == Some(state) {
                return;
            }
            tokio::time::sleep(POLL).await;
        }
        panic!(
            "{worker_id} never reached {state}, last {:?}",
            self.store.pc_state(SERVER, worker_id).await
        );
    }

    pub async fn wait_timer(&self, job_id: JobId, state: TimerState) {
        for _ in 0..MAX_POLLS {
            let current = self.timer(job_id).await.and_then(|t| t.timer_state().ok());
            if current == Some(state) {
                return;
            }
            tokio::time::sleep(POLL).await;
        }
        panic!("timer {job_id} never reached {state}, last {:?}", self.timer(job_id).await);
    }

    /// Wait until every job and hold task has finished.
    pub async fn wait_quiet(&self) {
        for _ in 0..MAX_POLLS {
            if self.ctx.running_tasks() == 0 {
                return;
            }
            tokio::time::sleep(POLL).await;
        }
        panic!("{} tasks still running", self.ctx.running_tasks());
    }

    /// Make `job_id`'s hold look elapsed to the wall-clock sweep.
    pub async fn expire_hold(&self, job_id: JobId) {
        let start = chrono::Utc::now() - chrono::Duration::from_std(HOLD + Duration::from_secs(5)).unwrap();
        self.store.set_timer_start(job_id, SERVER, start).await;
    }
}

const POLL: Duration = Duration::from_millis(100);
const MAX_POLLS: usize = 20_000;

// ---------------------------------------------------------------------------
// Rows and events
// ---------------------------------------------------------------------------

pub fn job_row(id: JobId, worker_id: &str, otp: i32) -> JobRequest {
    JobRequest {
        id,
        service: "10min".into(),
        secret: "7".into(),
        worker_id: Some(worker_id.into()),
        coupon_count: 0,
        otp,
        state: JOB_STATE_READY,
        otp_pass: 0,
    }
}

fn event(table: &str, before: Vec<Value>, after: Vec<Value>) -> RowEvent {
    RowEvent {
        schema: "public".into(),
        table: table.into(),
        op: "UPDATE".into(),
        columns: Vec::new(),
        before,
        after,
    }
}

fn presence_values(server_id: ServerId, worker_id: Option<&str>, state: &str) -> Vec<Value> {
    vec![
        json!(1),
        json!(server_id),
        json!("10min"),
        json!(worker_id),
        json!(state),
        json!("2026-10-19T10:00:00Z"),
    ]
}

/// A PC claim ping: the worker id appears, the state does not change.
pub fn claim_event(server_id: ServerId, worker_id: &str) -> RowEvent {
    event(
        "remote_pcs",
        presence_values(server_id, None, "none"),
        presence_values(server_id, Some(worker_id), "none"),
    )
}

pub fn presence_event(
    server_id: ServerId,
    worker_id: &str,
    state_before: &str,
    state_after: &str,
) -> RowEvent {
    event(
        "remote_pcs",
        presence_values(server_id, Some(worker_id), state_before),
        presence_values(server_id, Some(worker_id), state_after),
    )
}

fn job_values(job: &JobRequest) -> Vec<Value> {
    vec![
        json!(job.id),
        json!(job.service),
        json!(job.secret),
        json!(job.worker_id),
        json!(job.coupon_count),
        json!(job.otp),
        json!(job.state),
        json!(job.otp_pass),
    ]
}

/// The job row turning paid: state moves to ready.
pub fn paid_event(job: &JobRequest) -> RowEvent {
    let before = JobRequest {
        state: 1,
        ..job.clone()
    };
    event("job_requests", job_values(&before), job_values(job))
}

/// Only the OTP pass flag flips.
pub fn otp_pass_event(job: &JobRequest) -> RowEvent {
    let after = JobRequest {
        otp_pass: 1,
        ..job.clone()
    };
    event("job_requests", job_values(job), job_values(&after))
}

//! Gated screen loop.
//!
//! The loop captures a frame, runs the duplicate-login guard, then offers
//! the frame to the first stage whose gate is open. A stage that finishes
//! is marked passed and the next frame is captured at once; otherwise the
//! loop sleeps for the poll interval. The run ends when every stage has
//! passed, on the first error, or on cancellation.

use std::time::Duration;

use tenmin_core::error::JobError;
use tenmin_core::screen::{AttemptBudget, Gate, Screen, ScreenState};
use tokio_util::sync::CancellationToken;

use crate::config::FsmConfig;
use crate::guard;
use crate::handlers::{self, HandlerContext};

/// One screen in a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stage {
    pub screen: Screen,
    pub prerequisite: Option<Screen>,
    pub budget: AttemptBudget,
}

impl Stage {
    fn new(screen: Screen, prerequisite: Option<Screen>, budget: AttemptBudget) -> Self {
        Self {
            screen,
            prerequisite,
            budget,
        }
    }
}

/// Password, notice, team select, then the optional screens when enabled.
pub fn connect_stages(config: &FsmConfig) -> Vec<Stage> {
    let b = &config.budgets;
    let mut stages = vec![
        Stage::new(Screen::Password, None, AttemptBudget::required(b.password)),
        Stage::new(Screen::Notice, Some(Screen::Password), AttemptBudget::required(b.notice)),
        Stage::new(Screen::TeamSelect, Some(Screen::Notice), AttemptBudget::required(b.team_select)),
    ];
    if config.optional_screens {
        stages.push(Stage::new(
            Screen::PurchaseCancel,
            Some(Screen::TeamSelect),
            AttemptBudget::optional(b.purchase_cancel),
        ));
        stages.push(Stage::new(
            Screen::TopClass,
            Some(Screen::PurchaseCancel),
            AttemptBudget::optional(b.top_class),
        ));
    }
    stages
}

/// Exit team, then the confirmation modal.
pub fn exit_stages(config: &FsmConfig) -> Vec<Stage> {
    let b = &config.budgets;
    vec![
        Stage::new(Screen::ExitTeam, None, AttemptBudget::required(b.exit_team)),
        Stage::new(Screen::ExitModal, Some(Screen::ExitTeam), AttemptBudget::required(b.exit_modal)),
    ]
}

pub struct ScreenFsm<'a> {
    cx: HandlerContext<'a>,
    stages: Vec<Stage>,
    poll: Duration,
    guard: bool,
    state: ScreenState,
}

impl<'a> ScreenFsm<'a> {
    /// The connect chain, guarded against duplicate logins.
    pub fn connect(cx: HandlerContext<'a>, config: &FsmConfig) -> Self {
        Self {
            cx,
            stages: connect_stages(config),
            poll: config.poll,
            guard: true,
            state: ScreenState::new(),
        }
    }

    /// The teardown exit chain. The guard is off: the session is ours.
    pub fn exit(cx: HandlerContext<'a>, config: &FsmConfig) -> Self {
        Self {
            cx,
            stages: exit_stages(config),
            poll: config.exit_poll,
            guard: false,
            state: ScreenState::new(),
        }
    }

    fn done(&self) -> bool {
        self.stages.iter().all(|s| self.state.is_passed(s.screen))
    }

    /// Drive the chain to completion.
    pub async fn run(mut self, cancel: &CancellationToken) -> Result<ScreenState, JobError> {
        loop {
            if cancel.is_cancelled() {
                return Err(JobError::Cancelled);
            }
            if self.done() {
                return Ok(self.state);
            }

            let frame = self.cx.driver.capture().await?;
            if self.guard {
                guard::check_duplicate_login(self.cx.driver, &frame, self.cx.templates)?;
            }

            if self.step(&frame).await? {
                continue;
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(JobError::Cancelled),
                _ = tokio::time::sleep(self.poll) => {}
            }
        }
    }

    /// Offer `frame` to the active stage. Returns whether a stage passed.
    async fn step(&mut self, frame: &tenmin_vision::Frame) -> Result<bool, JobError> {
        for stage in &self.stages {
            match self.state.begin_attempt(stage.screen, stage.prerequisite, stage.budget)? {
                Gate::Inactive => continue,
                Gate::Skipped => {
                    tracing::info!(screen = %stage.screen, "Optional screen not shown, skipping");
                    return Ok(true);
                }
                Gate::Attempt(attempt) => {
                    tracing::debug!(screen = %stage.screen, attempt, max = stage.budget.max, "Looking for screen");
                    let passed = handlers::handle(stage.screen, self.cx, frame).await?;
                    if passed {
                        self.state.mark_passed(stage.screen);
                    }
                    return Ok(passed);
                }
            }
        }
        Ok(false)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

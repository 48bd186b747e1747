//! Per-job screen gate bookkeeping.
//!
//! A connect job walks a chain of client screens. Each screen has a
//! "passed" flag and an attempt counter. A handler may only act when its
//! prerequisite screen has passed and it has not; every activation spends
//! one attempt from the screen's [`AttemptBudget`].

use std::collections::HashMap;
use std::fmt;

use crate::error::JobError;

/// A client screen recognised by the automation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Screen {
    Password,
    Notice,
    TeamSelect,
    PurchaseCancel,
    TopClass,
    ExitTeam,
    ExitModal,
}

impl Screen {
    pub fn as_str(self) -> &'static str {
        match self {
            Screen::Password => "password",
            Screen::Notice => "notice",
            Screen::TeamSelect => "team_select",
            Screen::PurchaseCancel => "purchase_cancel",
            Screen::TopClass => "top_class",
            Screen::ExitTeam => "exit_team",
            Screen::ExitModal => "exit_modal",
        }
    }
}

impl fmt::Display for Screen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How many activations a screen gets, and what exhausting them means.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptBudget {
    pub max: u32,
    /// Optional screens count as passed once the budget runs out.
    pub skippable: bool,
}

impl AttemptBudget {
    pub const fn required(max: u32) -> Self {
        Self {
            max,
            skippable: false,
        }
    }

    pub const fn optional(max: u32) -> Self {
        Self {
            max,
            skippable: true,
        }
    }
}

/// Outcome of asking a screen gate whether its handler should run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    /// Prerequisite not yet passed, or the screen already passed.
    Inactive,
    /// Handler should run; carries the 1-based attempt number.
    Attempt(u32),
    /// Optional screen exhausted its budget and was marked passed.
    Skipped,
}

/// Passed flags and attempt counters for one job.
#[derive(Debug, Clone, Default)]
pub struct ScreenState {
    passed: HashMap<Screen, bool>,
    attempts: HashMap<Screen, u32>,
}

impl ScreenState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_passed(&self, screen: Screen) -> bool {
        self.passed.get(&screen).copied().unwrap_or(false)
    }

    pub fn mark_passed(&mut self, screen: Screen) {
        self.passed.insert(screen, true);
    }

    pub fn attempts(&self, screen: Screen) -> u32 {
        self.attempts.get(&screen).copied().unwrap_or(0)
    }

    /// Check the gate for `screen` and spend one attempt if it is active.
    ///
    /// Exceeding `budget.max` marks an optional screen as passed
    /// ([`Gate::Skipped`]) and fails a required one with
    /// [`JobError::NoDetection`].
    pub fn begin_attempt(
        &mut self,
        screen: Screen,
        prerequisite: Option<Screen>,
        budget: AttemptBudget,
    ) -> Result<Gate, JobError> {
        if self.is_passed(screen) {
            return Ok(Gate::Inactive);
        }
        if let Some(prev) = prerequisite {
            if !self.is_passed(prev) {
                return Ok(Gate::Inactive);
            }
        }

        let count = self.attempts.entry(screen).or_insert(0);
        *count += 1;
        let attempt = *count;

        if attempt > budget.max {
            if budget.skippable {
                self.mark_passed(screen);
                return Ok(Gate::Skipped);
            }
            return Err(JobError::NoDetection {
                screen,
                attempts: budget.max,
            });
        }

        Ok(Gate::Attempt(attempt))
    }

    /// True once every screen in `chain` has passed.
    pub fn all_passed(&self, chain: &[Screen]) -> bool {
        chain.iter().all(|s| self.is_passed(*s))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

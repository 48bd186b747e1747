//! In-process stand-ins for the feed and the notification API.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use tenmin_core::types::{JobId, ServerId};

use crate::feed::{ChangeFeed, FeedError, RowEvent};
use crate::notify::Notifier;

/// A notification captured by [`RecordingNotifier`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Start(JobId),
    Success(JobId),
    Waiting(JobId),
    Otp(JobId, String),
    Error {
        job_id: JobId,
        category: String,
        detail: String,
    },
    Login(ServerId),
    Disconnect(ServerId),
}

/// Records every call and answers `true`.
#[derive(Default)]
pub struct RecordingNotifier {
    calls: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<Notification> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn record(&self, n: Notification) -> bool {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(n);
        }
        true
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn start(&self, job_id: JobId) -> bool {
        self.record(Notification::Start(job_id))
    }

    async fn success(&self, job_id: JobId) -> bool {
        self.record(Notification::Success(job_id))
    }

    async fn waiting(&self, job_id: JobId) -> bool {
        self.record(Notification::Waiting(job_id))
    }

    async fn otp(&self, job_id: JobId, code: &str) -> bool {
        self.record(Notification::Otp(job_id, code.to_string()))
    }

    async fn error(&self, job_id: JobId, category: &str, detail: &str) -> bool {
        self.record(Notification::Error {
            job_id,
            category: category.to_string(),
            detail: detail.to_string(),
        })
    }

    async fn login(&self, server_id: ServerId) -> bool {
        self.record(Notification::Login(server_id))
    }

    async fn disconnect(&self, server_id: ServerId) -> bool {
        self.record(Notification::Disconnect(server_id))
    }
}

/// One scripted poll result.
pub enum FeedStep {
    Event(RowEvent),
    Empty,
    Error,
}

/// Replays a script of poll results, then reports "no event" forever.
#[derive(Default)]
pub struct ScriptedFeed {
    steps: VecDeque<FeedStep>,
    closed: bool,
}

impl ScriptedFeed {
    pub fn new(steps: impl IntoIterator<Item = FeedStep>) -> Self {
        Self {
            steps: steps.into_iter().collect(),
            closed: false,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn remaining(&self) -> usize {
        self.steps.len()
    }
}

#[async_trait]
impl ChangeFeed for ScriptedFeed {
    async fn poll(&mut self) -> Result<Option<RowEvent>, FeedError> {
        if self.closed {
            return Err(FeedError::Closed);
        }
        match self.steps.pop_front() {
            Some(FeedStep::Event(event)) => Ok(Some(event)),
            Some(FeedStep::Error) => Err(FeedError::Disconnected),
            Some(FeedStep::Empty) | None => Ok(None),
        }
    }

    async fn close(&mut self) -> Result<(), FeedError> {
        self.closed = true;
        Ok(())
    }
}

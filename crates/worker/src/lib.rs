//! The ten-minute connect worker.
//!
//! One process per server. It registers a server id, watches row changes
//! for RemotePC claims and paid job requests, drives the remote client
//! through the connect (and OTP) screens, holds the session for the paid
//! duration and tears it down in FIFO order.
//!
//! - [`config`]: environment configuration.
//! - [`telemetry`]: tracing subscriber setup.
//! - [`lifecycle`]: server id registration and cleanup.
//! - [`context`]: the shared [`Orchestrator`].
//! - [`registry`], [`queue`], [`slot`]: claimed workers, deferred
//!   requests and the single session slot.
//! - [`translator`], [`watcher`]: change events into job requests.
//! - [`controller`]: connect and OTP job runs and the failure policy.
//! - [`timer`]: hold expiry and teardown admission.

pub mod config;
pub mod context;
pub mod controller;
pub mod lifecycle;
pub mod queue;
pub mod registry;
pub mod slot;
pub mod telemetry;
pub mod timer;
pub mod translator;
pub mod watcher;

pub use config::{ConfigError, JobConfig, WorkerConfig};
pub use context::{Collaborators, Orchestrator};
pub use controller::Submission;
pub use lifecycle::{LifecycleError, ServerLifecycle};
pub use queue::{JobTicket, Offer, PendingQueue, PendingRequest};
pub use timer::HoldProgress;
pub use translator::{Skip, TranslateError, Translation};

//! Domain vocabulary for the ten-minute connect worker.
//!
//! Everything in this crate is free of database and screen I/O so the
//! state machines can be exercised in isolation:
//!
//! - [`types`]: id and timestamp aliases shared by every crate.
//! - [`status`]: RemotePC, TimerRecord and request-kind enums.
//! - [`error`]: the job error taxonomy and its notification mapping.
//! - [`screen`]: per-job screen gate bookkeeping.
//! - [`otp_window`]: OTP window arithmetic.
//! - [`hold`]: hold-expiry sweep and FIFO teardown admission policy.
//! - [`identity`]: durable server identity file.

pub mod error;
pub mod hold;
pub mod identity;
pub mod otp_window;
pub mod screen;
pub mod status;
pub mod types;

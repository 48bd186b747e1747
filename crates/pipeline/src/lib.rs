//! Screen automation for connect and teardown jobs.
//!
//! - [`driver`]: capture, match and click helpers over the vision traits.
//! - [`handlers`]: one async handler per client screen.
//! - [`guard`]: duplicate-login check run on every frame.
//! - [`fsm`]: the gated screen loop and its connect / exit stage chains.
//! - [`otp`]: the bounded OTP relay loop.

pub mod config;
pub mod driver;
pub mod fsm;
pub mod guard;
pub mod handlers;
pub mod otp;

pub use config::{Budgets, FsmConfig, OtpConfig};
pub use driver::ScreenDriver;
pub use fsm::{ScreenFsm, Stage};
pub use otp::{OtpLoop, OtpRelay, OtpSignal};

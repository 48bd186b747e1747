//! Screen collaborators: what the automation sees and how it acts.
//!
//! - [`frame`] / [`geometry`]: grayscale frames and pixel rectangles.
//! - [`template`]: named template images, fetched over HTTP or from a
//!   directory, cached per process.
//! - [`matcher`]: multi-scale normalised cross-correlation matching and
//!   glyph-based text extraction.
//! - [`capture`], [`input`], [`session`]: command-driven screen capture,
//!   input injection and remote-control program driving.

pub mod capture;
mod command;
pub mod frame;
pub mod geometry;
pub mod input;
pub mod matcher;
pub mod session;
pub mod template;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use capture::{CommandCapture, ScreenCapture};
pub use frame::Frame;
pub use geometry::Rect;
pub use input::{CommandInput, InputDriver};
pub use matcher::{Detection, NccMatcher, TemplateMatcher};
pub use session::{KeyboardRemoteSession, RemoteSession};
pub use template::{Template, TemplateKey, TemplateSet, TemplateSource, TemplateStore};

/// Errors from capture and command execution.
#[derive(Debug, thiserror::Error)]
pub enum VisionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image decode failed: {0}")]
    Decode(#[from] image::ImageError),

    #[error("command {program} exited with status {status}")]
    Command { program: String, status: i32 },

    #[error("command {program} timed out")]
    Timeout { program: String },

    #[error("command line is empty")]
    EmptyCommand,
}

//! Screen capture.

use std::time::Duration;

use async_trait::async_trait;

use crate::command;
use crate::frame::Frame;
use crate::VisionError;

const CAPTURE_TIMEOUT: Duration = Duration::from_secs(10);

#[async_trait]
pub trait ScreenCapture: Send + Sync {
    /// Grab the current screen as a grayscale frame.
    async fn capture(&self) -> Result<Frame, VisionError>;
}

/// Runs an external screenshot command that writes an encoded image
/// (PNG or JPEG) to stdout, e.g. `import -window root png:-`.
pub struct CommandCapture {
    argv: Vec<String>,
    timeout: Duration,
}

impl CommandCapture {
    pub fn new(command_line: &str) -> Self {
        Self {
            argv: command::split(command_line),
            timeout: CAPTURE_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl ScreenCapture for CommandCapture {
    async fn capture(&self) -> Result<Frame, VisionError> {
        let bytes = command::run(&self.argv, self.timeout).await?;
        let frame = Frame::decode(&bytes)?;
        tracing::trace!(width = frame.width(), height = frame.height(), "Screen captured");
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[tokio::test]
    async fn undecodable_output_is_a_decode_error() {
        let capture = CommandCapture::new("echo not-an-image");
        assert_matches!(capture.capture().await, Err(VisionError::Decode(_)));
    }

    #[tokio::test]
    async fn slow_command_times_out() {
        let capture = CommandCapture::new("sleep 5").with_timeout(Duration::from_millis(50));
        assert_matches!(capture.capture().await, Err(VisionError::Timeout { .. }));
    }
}

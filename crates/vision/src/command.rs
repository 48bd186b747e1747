//! Shared subprocess execution for capture, input and window commands.

use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

use crate::VisionError;

/// Maximum stdout captured from one command (64 MiB, enough for a 4K PNG).
const MAX_OUTPUT_BYTES: u64 = 64 * 1024 * 1024;

/// Split a configured command line on whitespace.
pub(crate) fn split(line: &str) -> Vec<String> {
    line.split_whitespace().map(str::to_string).collect()
}

/// Run `argv` to completion and return its stdout.
///
/// A non-zero exit is an error. The child is killed when the timeout fires.
pub(crate) async fn run(argv: &[String], timeout: Duration) -> Result<Vec<u8>, VisionError> {
    let (program, args) = argv.split_first().ok_or(VisionError::EmptyCommand)?;

    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true);

    let mut child = cmd.spawn()?;
    let stdout = child.stdout.take();
    let reader = tokio::spawn(async move { read_stream(stdout).await });

    match tokio::time::timeout(timeout, child.wait()).await {
        Ok(Ok(status)) if status.success() => Ok(reader.await.unwrap_or_default()),
        Ok(Ok(status)) => Err(VisionError::Command {
            program: program.clone(),
            status: status.code().unwrap_or(-1),
        }),
        Ok(Err(e)) => Err(e.into()),
        Err(_elapsed) => Err(VisionError::Timeout {
            program: program.clone(),
        }),
    }
}

async fn read_stream<R: AsyncRead + Unpin>(handle: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut h) = handle {
        let _ = (&mut h).take(MAX_OUTPUT_BYTES).read_to_end(&mut buf).await;
    }
    buf
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn split_drops_extra_whitespace() {
        assert_eq!(split("  xdotool   key  Return "), vec!["xdotool", "key", "Return"]);
    }

    #[tokio::test]
    async fn empty_command_is_rejected() {
        assert_matches!(run(&[], Duration::from_secs(1)).await, Err(VisionError::EmptyCommand));
    }

    #[tokio::test]
    async fn captures_stdout() {
        let out = run(&split("echo hello"), Duration::from_secs(5)).await.unwrap();
        assert_eq!(out, b"hello\n");
    }

    #[tokio::test]
    async fn non_zero_exit_is_an_error() {
        assert_matches!(
            run(&split("false"), Duration::from_secs(5)).await,
            Err(VisionError::Command { status: 1, .. })
        );
    }
}

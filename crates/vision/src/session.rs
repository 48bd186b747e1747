//! Remote-control program driver.
//!
//! The multi-PC remote client lists the worker PCs left to right. A session
//! is opened by focusing the client window, walking the cursor to the
//! worker's PC and pressing the toggle key; pressing it again closes it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tenmin_core::error::JobError;
use tenmin_core::types::PcNumber;

use crate::command;
use crate::input::InputDriver;

/// Opens and closes a remote session.
pub const TOGGLE_KEY: &str = "`";

/// Leftward presses that park the cursor on the first PC.
const REWIND_PRESSES: usize = 4;

/// Client-side processes killed by [`RemoteSession::kill_remote_client`].
pub const REMOTE_CLIENT_PROCESSES: [&str; 3] = ["fczf.exe", "fclauncher.exe", "cefproczf.exe"];

const WINDOW_TIMEOUT: Duration = Duration::from_secs(10);

#[async_trait]
pub trait RemoteSession: Send + Sync {
    /// Focus the remote client window.
    async fn select_window(&self) -> Result<(), JobError>;

    /// Open a session to PC `pc_number` (1-based).
    async fn start_session(&self, pc_number: PcNumber) -> Result<(), JobError>;

    async fn exit_session(&self) -> Result<(), JobError>;

    /// Close the game client and kill its processes on the remote PC.
    async fn kill_remote_client(&self) -> Result<(), JobError>;
}

pub struct KeyboardRemoteSession {
    input: Arc<dyn InputDriver>,
    /// Command that finds and activates the client window; `{title}` is
    /// substituted. Exits non-zero when no window matches.
    window_command: String,
    title: String,
}

impl KeyboardRemoteSession {
    pub fn new(input: Arc<dyn InputDriver>, window_command: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            input,
            window_command: window_command.into(),
            title: title.into(),
        }
    }

    async fn press(&self, key: &str) {
        self.input.press_key(key).await;
    }
}

#[async_trait]
impl RemoteSession for KeyboardRemoteSession {
    async fn select_window(&self) -> Result<(), JobError> {
        let argv: Vec<String> = command::split(&self.window_command)
            .into_iter()
            .map(|arg| arg.replace("{title}", &self.title))
            .collect();

        command::run(&argv, WINDOW_TIMEOUT).await.map_err(|e| {
            tracing::warn!(title = %self.title, error = %e, "Remote client window not found");
            JobError::CantFindRemoteProgram(self.title.clone())
        })?;
        Ok(())
    }

    async fn start_session(&self, pc_number: PcNumber) -> Result<(), JobError> {
        if pc_number < 1 {
            return Err(JobError::controller(format!("invalid PC number {pc_number}")));
        }
        self.select_window().await?;

        // Wake the list, then rewind to the first PC.
        self.press("right").await;
        for _ in 0..REWIND_PRESSES {
            self.press("left").await;
        }

        if pc_number == 1 {
            self.press("right").await;
            self.press("left").await;
        } else {
            for _ in 0..pc_number - 1 {
                self.press("right").await;
            }
        }

        self.press(TOGGLE_KEY).await;
        tracing::info!(pc_number, "Remote session opened");
        Ok(())
    }

    async fn exit_session(&self) -> Result<(), JobError> {
        self.press(TOGGLE_KEY).await;
        tracing::info!("Remote session closed");
        Ok(())
    }

    async fn kill_remote_client(&self) -> Result<(), JobError> {
        self.input.hotkey(&["alt", "f4"]).await;
        tokio::time::sleep(Duration::from_secs(3)).await;

        self.press("win").await;
        tokio::time::sleep(Duration::from_secs(1)).await;
        self.press("win").await;
        tokio::time::sleep(Duration::from_secs(1)).await;

        self.input.hotkey(&["win", "r"]).await;
        tokio::time::sleep(Duration::from_secs(2)).await;
        self.input.type_text("cmd").await;
        self.press("enter").await;
        tokio::time::sleep(Duration::from_secs(3)).await;

        for process in REMOTE_CLIENT_PROCESSES {
            self.input.type_text(&format!("taskkill /IM {process} /F")).await;
            self.press("enter").await;
            tokio::time::sleep(Duration::from_secs(1)).await;
        }

        self.input.type_text("exit").await;
        self.press("enter").await;
        tracing::info!("Remote client processes killed");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::testing::{InputAction, RecordingInput};

    fn keys(actions: &[InputAction]) -> Vec<String> {
        actions
            .iter()
            .filter_map(|a| match a {
                InputAction::Key(k) => Some(k.clone()),
                _ => None,
            })
            .collect()
    }

    fn session(input: Arc<RecordingInput>) -> KeyboardRemoteSession {
        KeyboardRemoteSession::new(input, "true {title}", "Rimo")
    }

    #[tokio::test]
    async fn pc_one_nudges_right_then_left() {
        let input = Arc::new(RecordingInput::new());
        session(input.clone()).start_session(1).await.unwrap();
        assert_eq!(
            keys(&input.actions()),
            vec!["right", "left", "left", "left", "left", "right", "left", "`"]
        );
    }

    #[tokio::test]
    async fn pc_three_moves_right_twice() {
        let input = Arc::new(RecordingInput::new());
        session(input.clone()).start_session(3).await.unwrap();
        assert_eq!(
            keys(&input.actions()),
            vec!["right", "left", "left", "left", "left", "right", "right", "`"]
        );
    }

    #[tokio::test]
    async fn missing_window_is_cant_find_remote_program() {
        let input = Arc::new(RecordingInput::new());
        let s = KeyboardRemoteSession::new(input.clone(), "false", "Rimo");
        assert_matches!(s.start_session(2).await, Err(JobError::CantFindRemoteProgram(t)) if t == "Rimo");
        assert!(input.actions().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn kill_sequence_types_each_taskkill() {
        let input = Arc::new(RecordingInput::new());
        session(input.clone()).kill_remote_client().await.unwrap();
        let typed: Vec<String> = input
            .actions()
            .into_iter()
            .filter_map(|a| match a {
                InputAction::Text(t) => Some(t),
                _ => None,
            })
            .collect();
        assert_eq!(
            typed,
            vec![
                "cmd",
                "taskkill /IM fczf.exe /F",
                "taskkill /IM fclauncher.exe /F",
                "taskkill /IM cefproczf.exe /F",
                "exit",
            ]
        );
        assert_eq!(input.actions().first(), Some(&InputAction::Hotkey(vec!["alt".into(), "f4".into()])));
    }
}

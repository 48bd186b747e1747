//! Input injection.
//!
//! [`InputDriver`] actions report success as a bool and never fail the
//! caller: a dropped keystroke shows up as a screen that does not advance,
//! which the screen loop already handles. Each action is followed by a
//! short settle delay.

use std::time::Duration;

use async_trait::async_trait;

use crate::command;

/// Pause after every action.
pub const ACTION_DELAY: Duration = Duration::from_millis(100);

/// Per-character interval when typing.
pub const TYPE_INTERVAL: Duration = Duration::from_millis(50);

const INPUT_TIMEOUT: Duration = Duration::from_secs(10);

#[async_trait]
pub trait InputDriver: Send + Sync {
    async fn click(&self, x: u32, y: u32) -> bool;

    /// Press and release one named key (`esc`, `enter`, `left`, `` ` ``, ...).
    async fn press_key(&self, key: &str) -> bool;

    /// Press keys together, e.g. `["alt", "f4"]`.
    async fn hotkey(&self, keys: &[&str]) -> bool;

    async fn type_text(&self, text: &str) -> bool;
}

/// Drives an xdotool-compatible command.
pub struct CommandInput {
    program: Vec<String>,
    delay: Duration,
}

impl CommandInput {
    /// `command_line` is the program prefix, normally `xdotool`.
    pub fn new(command_line: &str) -> Self {
        Self {
            program: command::split(command_line),
            delay: ACTION_DELAY,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    async fn exec(&self, args: Vec<String>) -> bool {
        let mut argv = self.program.clone();
        argv.extend(args);
        let ok = match command::run(&argv, INPUT_TIMEOUT).await {
            Ok(_) => true,
            Err(e) => {
                tracing::error!(command = ?argv, error = %e, "Input action failed");
                false
            }
        };
        tokio::time::sleep(self.delay).await;
        ok
    }
}

/// Map a short key name to its X keysym.
pub fn keysym(key: &str) -> String {
    let mapped = match key.to_ascii_lowercase().as_str() {
        "esc" | "escape" => "Escape",
        "enter" | "return" => "Return",
        "win" | "super" => "super",
        "alt" => "alt",
        "ctrl" | "control" => "ctrl",
        "shift" => "shift",
        "tab" => "Tab",
        "space" => "space",
        "backspace" => "BackSpace",
        "left" => "Left",
        "right" => "Right",
        "up" => "Up",
        "down" => "Down",
        "`" => "grave",
        f if f.len() > 1 && f.starts_with('f') && f[1..].chars().all(|c| c.is_ascii_digit()) => {
            return f.to_ascii_uppercase();
        }
        _ => return key.to_string(),
    };
    mapped.to_string()
}

#[async_trait]
impl InputDriver for CommandInput {
    async fn click(&self, x: u32, y: u32) -> bool {
        self.exec(vec![
            "mousemove".into(),
            x.to_string(),
            y.to_string(),
            "click".into(),
            "1".into(),
        ])
        .await
    }

    async fn press_key(&self, key: &str) -> bool {
        self.exec(vec!["key".into(), keysym(key)]).await
    }

    async fn hotkey(&self, keys: &[&str]) -> bool {
        let combo = keys.iter().map(|k| keysym(k)).collect::<Vec<_>>().join("+");
        self.exec(vec!["key".into(), combo]).await
    }

    async fn type_text(&self, text: &str) -> bool {
        self.exec(vec![
            "type".into(),
            "--delay".into(),
            TYPE_INTERVAL.as_millis().to_string(),
            text.to_string(),
        ])
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keysyms() {
        assert_eq!(keysym("esc"), "Escape");
        assert_eq!(keysym("enter"), "Return");
        assert_eq!(keysym("`"), "grave");
        assert_eq!(keysym("f4"), "F4");
        assert_eq!(keysym("r"), "r");
    }

    #[tokio::test]
    async fn failed_action_reports_false() {
        let input = CommandInput::new("false").with_delay(Duration::ZERO);
        assert!(!input.press_key("enter").await);
    }

    #[tokio::test]
    async fn successful_action_reports_true() {
        let input = CommandInput::new("true").with_delay(Duration::ZERO);
        assert!(input.hotkey(&["alt", "f4"]).await);
    }
}

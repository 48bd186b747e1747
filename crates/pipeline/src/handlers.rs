//! Client screen handlers.
//!
//! Each handler looks at one frame and returns `Ok(true)` once its screen is
//! done, `Ok(false)` when the screen is not (yet) visible. Gate checks and
//! attempt accounting live in [`crate::fsm`]; handlers only act.

use std::time::Duration;

use tenmin_core::error::JobError;
use tenmin_core::screen::Screen;
use tenmin_vision::{Frame, TemplateKey, TemplateSet};

use crate::driver::{ScreenDriver, DETECT_THRESHOLD};

/// Pause between keypad digit clicks.
const DIGIT_INTERVAL: Duration = Duration::from_millis(500);

/// Wait after confirming the password before looking for the error dialog.
const CONFIRM_SETTLE: Duration = Duration::from_secs(3);

/// Frames checked for the wrong-password dialog, one per second.
const WRONG_PASSWORD_CHECKS: u32 = 3;

const NOTICE_SETTLE: Duration = Duration::from_secs(1);
const TEAM_SELECT_SETTLE: Duration = Duration::from_secs(5);
const DISMISS_SETTLE: Duration = Duration::from_secs(1);

/// Everything a handler needs for one job.
#[derive(Clone, Copy)]
pub struct HandlerContext<'a> {
    pub driver: &'a ScreenDriver,
    pub templates: &'a TemplateSet,
    /// Password digits, empty for flows that never see the keypad.
    pub secret: &'a str,
}

pub async fn handle(screen: Screen, cx: HandlerContext<'_>, frame: &Frame) -> Result<bool, JobError> {
    match screen {
        Screen::Password => password(cx, frame).await,
        Screen::Notice => notice(cx, frame).await,
        Screen::TeamSelect => team_select(cx, frame).await,
        Screen::PurchaseCancel => {
            dismiss(cx, frame, TemplateKey::PurchaseScreen, TemplateKey::PurchaseCancel).await
        }
        Screen::TopClass => dismiss(cx, frame, TemplateKey::TopClass, TemplateKey::TopClassClose).await,
        Screen::ExitTeam => dismiss(cx, frame, TemplateKey::ExitTeam, TemplateKey::ExitTeamButton).await,
        Screen::ExitModal => dismiss(cx, frame, TemplateKey::ExitModal, TemplateKey::ExitModalButton).await,
    }
}

/// Click the secret's digits on the keypad panel, confirm, and watch for
/// the wrong-password dialog.
async fn password(cx: HandlerContext<'_>, frame: &Frame) -> Result<bool, JobError> {
    let HandlerContext {
        driver,
        templates,
        secret,
    } = cx;

    driver.press("esc").await;

    let panel = templates.get(TemplateKey::PasswordScreen)?;
    let Some(panel) = driver.find(frame, panel, DETECT_THRESHOLD, None) else {
        return Ok(false);
    };
    let roi = Some(panel.rect);

    for c in secret.chars() {
        let digit = c
            .to_digit(10)
            .ok_or_else(|| JobError::TemplateEmpty(format!("no keypad template for {c:?}")))?;
        let template = templates.get(TemplateKey::Digit(digit as u8))?;
        if !driver.find_and_click(frame, template, roi).await {
            tracing::warn!(digit, "Keypad digit not found");
        }
        tokio::time::sleep(DIGIT_INTERVAL).await;
    }

    let confirm = templates.get(TemplateKey::PasswordConfirm)?;
    if !driver.find_and_click(frame, confirm, roi).await {
        return Ok(false);
    }
    tokio::time::sleep(CONFIRM_SETTLE).await;

    let wrong = templates.get(TemplateKey::WrongPassword)?;
    for _ in 0..WRONG_PASSWORD_CHECKS {
        let check = driver.capture().await?;
        tokio::time::sleep(Duration::from_secs(1)).await;
        if driver.find(&check, wrong, DETECT_THRESHOLD, roi).is_some() {
            return Err(JobError::WrongPassword);
        }
    }

    tracing::info!("Password entered");
    Ok(true)
}

/// Dismiss notices with Esc until the team select screen shows.
async fn notice(cx: HandlerContext<'_>, frame: &Frame) -> Result<bool, JobError> {
    cx.driver.press("esc").await;
    let team = cx.templates.get(TemplateKey::TeamSelectScreen)?;
    if cx.driver.visible(frame, team) {
        tracing::info!("Notices dismissed");
        tokio::time::sleep(NOTICE_SETTLE).await;
        return Ok(true);
    }
    Ok(false)
}

/// Pick the mode on the team select screen by clicking the entry below its
/// caption. The screen is only done once that click happened.
async fn team_select(cx: HandlerContext<'_>, frame: &Frame) -> Result<bool, JobError> {
    let screen = cx.templates.get(TemplateKey::TeamSelectScreen)?;
    if !cx.driver.visible(frame, screen) {
        return Ok(false);
    }

    let caption = cx.templates.get(TemplateKey::TeamSelectText)?;
    let Some(text) = cx.driver.find(frame, caption, DETECT_THRESHOLD, None) else {
        tracing::debug!("Team select shown without its mode caption");
        return Ok(false);
    };

    let (x, _) = text.rect.random_interior(0);
    let y = text.rect.y + text.rect.height * 5;
    cx.driver.input.click(x, y).await;
    tokio::time::sleep(TEAM_SELECT_SETTLE).await;

    tracing::info!("Team select done");
    Ok(true)
}

/// Find a dialog and click its button inside it.
async fn dismiss(cx: HandlerContext<'_>, frame: &Frame, dialog: TemplateKey, button: TemplateKey) -> Result<bool, JobError> {
    let dialog_template = cx.templates.get(dialog)?;
    let Some(found) = cx.driver.find(frame, dialog_template, DETECT_THRESHOLD, None) else {
        return Ok(false);
    };

    let button = cx.templates.get(button)?;
    if cx.driver.find_and_click(frame, button, Some(found.rect)).await {
        tracing::info!(dialog = %dialog, "Dialog dismissed");
        tokio::time::sleep(DISMISS_SETTLE).await;
        return Ok(true);
    }
    Ok(false)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use assert_matches::assert_matches;
    use tenmin_vision::testing::{all_keys, blank_templates, FakeCapture, InputAction, RecordingInput, ScriptedMatcher, Visibility};
    use tenmin_vision::Rect;

    use super::*;

    struct Rig {
        matcher: Arc<ScriptedMatcher>,
        input: Arc<RecordingInput>,
        driver: ScreenDriver,
        templates: TemplateSet,
    }

    async fn rig() -> Rig {
        let matcher = Arc::new(ScriptedMatcher::new());
        let input = Arc::new(RecordingInput::new());
        let driver = ScreenDriver::new(Arc::new(FakeCapture::new()), matcher.clone(), input.clone());
        let templates = blank_templates().load_set(&all_keys()).await.unwrap();
        Rig {
            matcher,
            input,
            driver,
            templates,
        }
    }

    impl Rig {
        fn cx<'a>(&'a self, secret: &'a str) -> HandlerContext<'a> {
            HandlerContext {
                driver: &self.driver,
                templates: &self.templates,
                secret,
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn password_clicks_each_digit_then_confirm() {
        let rig = rig().await;
        rig.matcher
            .show(TemplateKey::PasswordScreen, Visibility::Always)
            .place(TemplateKey::PasswordScreen, Rect::new(0, 0, 300, 200))
            .show(TemplateKey::Digit(4), Visibility::Always)
            .show(TemplateKey::Digit(2), Visibility::Always)
            .show(TemplateKey::PasswordConfirm, Visibility::Always);
        let frame = rig.driver.capture().await.unwrap();

        assert!(password(rig.cx("424"), &frame).await.unwrap());
        assert_eq!(rig.input.clicks().len(), 4);
        assert_eq!(rig.matcher.calls(TemplateKey::Digit(4)), 2);
        assert_eq!(rig.matcher.calls(TemplateKey::WrongPassword), 3);
        assert_eq!(rig.input.actions()[0], InputAction::Key("esc".into()));
    }

    #[tokio::test(start_paused = true)]
    async fn wrong_password_dialog_fails_the_job() {
        let rig = rig().await;
        rig.matcher
            .show(TemplateKey::PasswordScreen, Visibility::Always)
            .show(TemplateKey::PasswordConfirm, Visibility::Always)
            .show(TemplateKey::WrongPassword, Visibility::After(2));
        let frame = rig.driver.capture().await.unwrap();

        assert_matches!(password(rig.cx("1"), &frame).await, Err(JobError::WrongPassword));
    }

    #[tokio::test]
    async fn password_waits_for_panel() {
        let rig = rig().await;
        let frame = rig.driver.capture().await.unwrap();
        assert!(!password(rig.cx("1"), &frame).await.unwrap());
        assert!(rig.input.clicks().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn notice_passes_when_team_select_shows() {
        let rig = rig().await;
        rig.matcher.show(TemplateKey::TeamSelectScreen, Visibility::After(2));
        let frame = rig.driver.capture().await.unwrap();

        assert!(!notice(rig.cx(""), &frame).await.unwrap());
        assert!(notice(rig.cx(""), &frame).await.unwrap());
        assert_eq!(
            rig.input.actions(),
            vec![InputAction::Key("esc".into()), InputAction::Key("esc".into())]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn team_select_clicks_below_caption() {
        let rig = rig().await;
        rig.matcher
            .show(TemplateKey::TeamSelectScreen, Visibility::Always)
            .show(TemplateKey::TeamSelectText, Visibility::Always)
            .place(TemplateKey::TeamSelectText, Rect::new(400, 100, 80, 20));
        let frame = rig.driver.capture().await.unwrap();

        assert!(team_select(rig.cx(""), &frame).await.unwrap());
        let (x, y) = rig.input.clicks()[0];
        assert!((400..=480).contains(&x));
        assert_eq!(y, 200);
    }

    #[tokio::test]
    async fn team_select_without_caption_is_not_done() {
        let rig = rig().await;
        rig.matcher.show(TemplateKey::TeamSelectScreen, Visibility::Always);
        let frame = rig.driver.capture().await.unwrap();

        assert!(!team_select(rig.cx(""), &frame).await.unwrap());
        assert!(rig.input.clicks().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn dismiss_clicks_button_inside_dialog() {
        let rig = rig().await;
        rig.matcher
            .show(TemplateKey::ExitModal, Visibility::Always)
            .show(TemplateKey::ExitModalButton, Visibility::Always);
        let frame = rig.driver.capture().await.unwrap();

        assert!(handle(Screen::ExitModal, rig.cx(""), &frame).await.unwrap());
        assert_eq!(rig.input.clicks().len(), 1);
    }

    #[tokio::test]
    async fn dismiss_without_button_is_not_done() {
        let rig = rig().await;
        rig.matcher.show(TemplateKey::ExitTeam, Visibility::Always);
        let frame = rig.driver.capture().await.unwrap();

        assert!(!handle(Screen::ExitTeam, rig.cx(""), &frame).await.unwrap());
    }
}

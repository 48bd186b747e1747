//! Thin layer over the vision collaborators used by every handler.

use std::sync::Arc;

use tenmin_core::error::JobError;
use tenmin_vision::{Detection, Frame, InputDriver, Rect, ScreenCapture, Template, TemplateMatcher};

/// Default detection threshold.
pub const DETECT_THRESHOLD: f32 = 0.8;

/// Clicks land at least this far inside a detection.
const CLICK_MARGIN: u32 = 10;

#[derive(Clone)]
pub struct ScreenDriver {
    pub capture: Arc<dyn ScreenCapture>,
    pub matcher: Arc<dyn TemplateMatcher>,
    pub input: Arc<dyn InputDriver>,
}

impl ScreenDriver {
    pub fn new(
        capture: Arc<dyn ScreenCapture>,
        matcher: Arc<dyn TemplateMatcher>,
        input: Arc<dyn InputDriver>,
    ) -> Self {
        Self {
            capture,
            matcher,
            input,
        }
    }

    /// Capture a frame; capture failures are unclassified.
    pub async fn capture(&self) -> Result<Frame, JobError> {
        self.capture.capture().await.map_err(JobError::controller)
    }

    pub fn find(&self, frame: &Frame, template: &Template, threshold: f32, roi: Option<Rect>) -> Option<Detection> {
        self.matcher.detect(frame, template, threshold, roi)
    }

    pub fn visible(&self, frame: &Frame, template: &Template) -> bool {
        self.find(frame, template, DETECT_THRESHOLD, None).is_some()
    }

    /// Click a random point inside `detection`.
    pub async fn click(&self, detection: &Detection) -> bool {
        let (x, y) = detection.rect.random_interior(CLICK_MARGIN);
        self.input.click(x, y).await
    }

    /// Find `template` (inside `roi` when given) and click it.
    pub async fn find_and_click(&self, frame: &Frame, template: &Template, roi: Option<Rect>) -> bool {
        match self.find(frame, template, DETECT_THRESHOLD, roi) {
            Some(d) => self.click(&d).await,
            None => false,
        }
    }

    pub async fn press(&self, key: &str) -> bool {
        self.input.press_key(key).await
    }
}

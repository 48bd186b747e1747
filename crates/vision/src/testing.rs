//! Scripted stand-ins for the screen collaborators.
//!
//! [`ScriptedMatcher`] decides visibility per template from how many times
//! that template has been looked for, which makes screen sequences easy to
//! script without real images.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use image::GrayImage;
use tenmin_core::error::JobError;
use tenmin_core::types::PcNumber;

use crate::capture::ScreenCapture;
use crate::frame::Frame;
use crate::geometry::Rect;
use crate::input::InputDriver;
use crate::matcher::{Detection, TemplateMatcher};
use crate::session::RemoteSession;
use crate::template::{Template, TemplateKey, TemplateSource, TemplateStore};
use crate::VisionError;

// ---------------------------------------------------------------------------
// Templates
// ---------------------------------------------------------------------------

/// Every key the flows load, excluding OTP glyphs.
pub fn all_keys() -> Vec<TemplateKey> {
    TemplateKey::CONNECT
        .into_iter()
        .chain(TemplateKey::OPTIONAL)
        .chain(TemplateKey::OTP)
        .chain(TemplateKey::EXIT)
        .chain((0..10).map(TemplateKey::Digit))
        .collect()
}

/// A store that serves a 1x1 image for every key in [`all_keys`].
pub fn blank_templates() -> TemplateStore {
    let images = all_keys()
        .into_iter()
        .map(|k| (k, GrayImage::new(1, 1)))
        .collect::<HashMap<_, _>>();
    TemplateStore::new(TemplateSource::Memory(images))
}

// ---------------------------------------------------------------------------
// Matcher
// ---------------------------------------------------------------------------

/// When a scripted template is visible, by 1-based lookup count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Never,
    Always,
    /// Visible from the n-th lookup on.
    After(u32),
    /// Visible for the first n lookups.
    Until(u32),
    /// Visible for lookups `from..=until`.
    Window { from: u32, until: u32 },
}

impl Visibility {
    fn visible(self, call: u32) -> bool {
        match self {
            Visibility::Never => false,
            Visibility::Always => true,
            Visibility::After(n) => call >= n,
            Visibility::Until(n) => call <= n,
            Visibility::Window { from, until } => (from..=until).contains(&call),
        }
    }
}

pub const DEFAULT_HIT: Rect = Rect {
    x: 100,
    y: 100,
    width: 60,
    height: 20,
};

#[derive(Default)]
struct MatcherState {
    script: HashMap<TemplateKey, Visibility>,
    rects: HashMap<TemplateKey, Rect>,
    calls: HashMap<TemplateKey, u32>,
    texts: VecDeque<Option<String>>,
    text_calls: u32,
}

#[derive(Default)]
pub struct ScriptedMatcher {
    state: Mutex<MatcherState>,
}

impl ScriptedMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn show(&self, key: TemplateKey, visibility: Visibility) -> &Self {
        if let Ok(mut s) = self.state.lock() {
            s.script.insert(key, visibility);
        }
        self
    }

    pub fn place(&self, key: TemplateKey, rect: Rect) -> &Self {
        if let Ok(mut s) = self.state.lock() {
            s.rects.insert(key, rect);
        }
        self
    }

    /// Queue results for successive `extract_text` calls; `None` entries
    /// fail that call. An empty queue reads nothing.
    pub fn push_text(&self, text: Option<&str>) -> &Self {
        if let Ok(mut s) = self.state.lock() {
            s.texts.push_back(text.map(str::to_string));
        }
        self
    }

    pub fn calls(&self, key: TemplateKey) -> u32 {
        self.state
            .lock()
            .map(|s| s.calls.get(&key).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    pub fn text_calls(&self) -> u32 {
        self.state.lock().map(|s| s.text_calls).unwrap_or(0)
    }
}

impl TemplateMatcher for ScriptedMatcher {
    fn detect(&self, _frame: &Frame, template: &Template, _threshold: f32, _roi: Option<Rect>) -> Option<Detection> {
        let mut s = self.state.lock().ok()?;
        let call = {
            let c = s.calls.entry(template.key).or_insert(0);
            *c += 1;
            *c
        };
        let visibility = s.script.get(&template.key).copied().unwrap_or(Visibility::Never);
        visibility.visible(call).then(|| Detection {
            rect: s.rects.get(&template.key).copied().unwrap_or(DEFAULT_HIT),
            score: 0.95,
        })
    }

    fn extract_text(&self, _frame: &Frame, _region: &Template, _threshold: f32, _roi: Option<Rect>) -> Option<String> {
        let mut s = self.state.lock().ok()?;
        s.text_calls += 1;
        s.texts.pop_front().flatten()
    }
}

// ---------------------------------------------------------------------------
// Capture
// ---------------------------------------------------------------------------

pub struct FakeCapture {
    frame: Frame,
    failing: AtomicBool,
    count: AtomicU32,
}

impl Default for FakeCapture {
    fn default() -> Self {
        Self {
            frame: Frame::blank(320, 240),
            failing: AtomicBool::new(false),
            count: AtomicU32::new(0),
        }
    }
}

impl FakeCapture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn count(&self) -> u32 {
        self.count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ScreenCapture for FakeCapture {
    async fn capture(&self) -> Result<Frame, VisionError> {
        self.count.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(VisionError::EmptyCommand);
        }
        Ok(self.frame.clone())
    }
}

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputAction {
    Click(u32, u32),
    Key(String),
    Hotkey(Vec<String>),
    Text(String),
}

/// Records actions without delay.
#[derive(Default)]
pub struct RecordingInput {
    actions: Mutex<Vec<InputAction>>,
}

impl RecordingInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn actions(&self) -> Vec<InputAction> {
        self.actions.lock().map(|a| a.clone()).unwrap_or_default()
    }

    pub fn clicks(&self) -> Vec<(u32, u32)> {
        self.actions()
            .into_iter()
            .filter_map(|a| match a {
                InputAction::Click(x, y) => Some((x, y)),
                _ => None,
            })
            .collect()
    }

    fn record(&self, action: InputAction) -> bool {
        if let Ok(mut a) = self.actions.lock() {
            a.push(action);
        }
        true
    }
}

#[async_trait]
impl InputDriver for RecordingInput {
    async fn click(&self, x: u32, y: u32) -> bool {
        self.record(InputAction::Click(x, y))
    }

    async fn press_key(&self, key: &str) -> bool {
        self.record(InputAction::Key(key.to_string()))
    }

    async fn hotkey(&self, keys: &[&str]) -> bool {
        self.record(InputAction::Hotkey(keys.iter().map(|k| k.to_string()).collect()))
    }

    async fn type_text(&self, text: &str) -> bool {
        self.record(InputAction::Text(text.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCall {
    SelectWindow,
    Start(PcNumber),
    Exit,
    Kill,
}

#[derive(Default)]
pub struct FakeSession {
    calls: Mutex<Vec<SessionCall>>,
    window_missing: AtomicBool,
}

impl FakeSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_window_missing(&self, missing: bool) {
        self.window_missing.store(missing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<SessionCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn record(&self, call: SessionCall) {
        if let Ok(mut c) = self.calls.lock() {
            c.push(call);
        }
    }

    fn check_window(&self) -> Result<(), JobError> {
        if self.window_missing.load(Ordering::SeqCst) {
            return Err(JobError::CantFindRemoteProgram("fake".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteSession for FakeSession {
    async fn select_window(&self) -> Result<(), JobError> {
        self.record(SessionCall::SelectWindow);
        self.check_window()
    }

    async fn start_session(&self, pc_number: PcNumber) -> Result<(), JobError> {
        self.check_window()?;
        self.record(SessionCall::Start(pc_number));
        Ok(())
    }

    async fn exit_session(&self) -> Result<(), JobError> {
        self.record(SessionCall::Exit);
        Ok(())
    }

    async fn kill_remote_client(&self) -> Result<(), JobError> {
        self.record(SessionCall::Kill);
        Ok(())
    }
}

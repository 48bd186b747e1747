//! Named template images.
//!
//! Every screen the automation recognises has a template image published
//! under a base URL (or a local directory). Images are decoded to grayscale
//! once and cached for the life of the process. A missing file is retried
//! with the other `.png` / `.PNG` extension before giving up with
//! [`JobError::TemplateEmpty`].

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use image::GrayImage;
use tenmin_core::error::{DuplicateLoginCause, JobError};
use tokio::sync::RwLock;

/// HTTP timeout for a single template download.
const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// Keys
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemplateKey {
    OtpFrame,
    OtpNumber,
    OtpWrong,
    PasswordScreen,
    PasswordConfirm,
    WrongPassword,
    TeamSelectScreen,
    TeamSelectText,
    PurchaseScreen,
    PurchaseCancel,
    TopClass,
    TopClassClose,
    ExitTeam,
    ExitTeamButton,
    ExitModal,
    ExitModalButton,
    DuplicateLogin(DuplicateLoginCause),
    /// Password keypad digit.
    Digit(u8),
    /// OTP glyph used for text extraction.
    OtpDigit(u8),
}

impl TemplateKey {
    /// Templates the connect flow needs besides the password digits.
    pub const CONNECT: [TemplateKey; 10] = [
        TemplateKey::PasswordScreen,
        TemplateKey::PasswordConfirm,
        TemplateKey::WrongPassword,
        TemplateKey::TeamSelectScreen,
        TemplateKey::TeamSelectText,
        TemplateKey::DuplicateLogin(DuplicateLoginCause::SameLoginAnyKey),
        TemplateKey::DuplicateLogin(DuplicateLoginCause::AlreadyLoggedIn),
        TemplateKey::DuplicateLogin(DuplicateLoginCause::ConnectingElsewhere),
        TemplateKey::DuplicateLogin(DuplicateLoginCause::SameLoginPassword),
        TemplateKey::DuplicateLogin(DuplicateLoginCause::OtpPassedElsewhere),
    ];

    /// Templates of the optional purchase / top-class screens.
    pub const OPTIONAL: [TemplateKey; 4] = [
        TemplateKey::PurchaseScreen,
        TemplateKey::PurchaseCancel,
        TemplateKey::TopClass,
        TemplateKey::TopClassClose,
    ];

    pub const OTP: [TemplateKey; 3] = [
        TemplateKey::OtpFrame,
        TemplateKey::OtpNumber,
        TemplateKey::OtpWrong,
    ];

    pub const EXIT: [TemplateKey; 4] = [
        TemplateKey::ExitTeam,
        TemplateKey::ExitTeamButton,
        TemplateKey::ExitModal,
        TemplateKey::ExitModalButton,
    ];

    /// File name under the template base.
    pub fn file_name(&self) -> String {
        let name = match self {
            TemplateKey::OtpFrame => "otpFrame.PNG",
            TemplateKey::OtpNumber => "otpNumber.png",
            TemplateKey::OtpWrong => "otpWrong.PNG",
            TemplateKey::PasswordScreen => "passwordScreen.png",
            TemplateKey::PasswordConfirm => "loginConfirm.png",
            TemplateKey::WrongPassword => "wrongPassword.png",
            TemplateKey::TeamSelectScreen => "selectTeam.png",
            TemplateKey::TeamSelectText => "selectTeamText.png",
            TemplateKey::PurchaseScreen => "purchaseScreen.png",
            TemplateKey::PurchaseCancel => "purchaseCancelBtn.png",
            TemplateKey::TopClass => "topClassScreen.png",
            TemplateKey::TopClassClose => "topClassCancelBtn.png",
            TemplateKey::ExitTeam => "selectTeamIcon.png",
            TemplateKey::ExitTeamButton => "exitTeamBtn.png",
            TemplateKey::ExitModal => "exitModalScreen.png",
            TemplateKey::ExitModalButton => "exitModalBtn.png",
            TemplateKey::DuplicateLogin(cause) => match cause {
                DuplicateLoginCause::SameLoginAnyKey => {
                    "atThatSameTimeInAnyKeyAndBeforeAccountExpire.png"
                }
                DuplicateLoginCause::AlreadyLoggedIn => "duplicateConnection.png",
                DuplicateLoginCause::ConnectingElsewhere => "someOneConnect.png",
                DuplicateLoginCause::SameLoginPassword => {
                    "whenThroughPasswordButSomeOneInPassword.png"
                }
                DuplicateLoginCause::OtpPassedElsewhere => {
                    "whenFinishOTPpassButSomeOnePassOTPEither.png"
                }
            },
            TemplateKey::Digit(d) => return format!("{d}.png"),
            TemplateKey::OtpDigit(d) => return format!("otpDigit{d}.png"),
        };
        name.to_string()
    }
}

impl fmt::Display for TemplateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemplateKey::DuplicateLogin(cause) => write!(f, "{cause}"),
            TemplateKey::Digit(d) => write!(f, "digit_{d}"),
            TemplateKey::OtpDigit(d) => write!(f, "otp_digit_{d}"),
            other => write!(f, "{}", other.file_name()),
        }
    }
}

/// The other-case extension variant of a file name, if it has one.
fn alternate_extension(name: &str) -> Option<String> {
    let stem = name.strip_suffix(".png").or_else(|| name.strip_suffix(".PNG"))?;
    if name.ends_with(".png") {
        Some(format!("{stem}.PNG"))
    } else {
        Some(format!("{stem}.png"))
    }
}

// ---------------------------------------------------------------------------
// Template / TemplateSet
// ---------------------------------------------------------------------------

/// A decoded template image. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Template {
    pub key: TemplateKey,
    pub image: Arc<GrayImage>,
}

/// Templates loaded for one job.
#[derive(Debug, Clone, Default)]
pub struct TemplateSet {
    templates: HashMap<TemplateKey, Template>,
}

impl TemplateSet {
    pub fn get(&self, key: TemplateKey) -> Result<&Template, JobError> {
        self.templates
            .get(&key)
            .ok_or_else(|| JobError::TemplateEmpty(format!("{key} not loaded")))
    }

    pub fn contains(&self, key: TemplateKey) -> bool {
        self.templates.contains_key(&key)
    }

    pub fn insert(&mut self, template: Template) {
        self.templates.insert(template.key, template);
    }

    pub fn extend(&mut self, other: TemplateSet) {
        self.templates.extend(other.templates);
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

// ---------------------------------------------------------------------------
// TemplateStore
// ---------------------------------------------------------------------------

/// Where template images come from.
#[derive(Debug, Clone)]
pub enum TemplateSource {
    Http { base_url: String },
    Dir(PathBuf),
    /// Pre-decoded images; keys not present are missing.
    Memory(HashMap<TemplateKey, GrayImage>),
}

pub struct TemplateStore {
    source: TemplateSource,
    client: reqwest::Client,
    cache: RwLock<HashMap<TemplateKey, Template>>,
}

impl TemplateStore {
    pub fn new(source: TemplateSource) -> Self {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            source,
            client,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Load one template, from cache when possible.
    pub async fn load(&self, key: TemplateKey) -> Result<Template, JobError> {
        if let Some(t) = self.cache.read().await.get(&key) {
            return Ok(t.clone());
        }

        let image = self.fetch(key).await?;
        let template = Template {
            key,
            image: Arc::new(image),
        };
        self.cache.write().await.insert(key, template.clone());
        tracing::debug!(template = %key, "Template loaded");
        Ok(template)
    }

    /// Load several templates; the first failure aborts.
    pub async fn load_set(&self, keys: &[TemplateKey]) -> Result<TemplateSet, JobError> {
        let mut set = TemplateSet::default();
        for key in keys {
            set.insert(self.load(*key).await?);
        }
        Ok(set)
    }

    /// Load the keypad digits appearing in `secret`.
    pub async fn load_digits(&self, secret: &str) -> Result<TemplateSet, JobError> {
        let mut set = TemplateSet::default();
        for c in secret.chars() {
            let digit = c
                .to_digit(10)
                .ok_or_else(|| JobError::TemplateEmpty(format!("no keypad template for {c:?}")))?;
            set.insert(self.load(TemplateKey::Digit(digit as u8)).await?);
        }
        Ok(set)
    }

    /// Load whichever OTP glyphs are available.
    pub async fn load_otp_glyphs(&self) -> Vec<(char, Template)> {
        let mut glyphs = Vec::new();
        for d in 0..10u8 {
            if let Ok(t) = self.load(TemplateKey::OtpDigit(d)).await {
                glyphs.push((char::from(b'0' + d), t));
            }
        }
        glyphs
    }

    async fn fetch(&self, key: TemplateKey) -> Result<GrayImage, JobError> {
        let name = key.file_name();
        match &self.source {
            TemplateSource::Memory(images) => images
                .get(&key)
                .cloned()
                .ok_or_else(|| JobError::TemplateEmpty(format!("{name} not provided"))),
            TemplateSource::Dir(dir) => {
                let bytes = match tokio::fs::read(dir.join(&name)).await {
                    Ok(bytes) => bytes,
                    Err(first) => {
                        let alt = alternate_extension(&name).ok_or_else(|| {
                            JobError::TemplateEmpty(format!("{name}: {first}"))
                        })?;
                        tokio::fs::read(dir.join(&alt))
                            .await
                            .map_err(|e| JobError::TemplateEmpty(format!("{name}: {e}")))?
                    }
                };
                decode(&name, &bytes)
            }
            TemplateSource::Http { base_url } => {
                let base = base_url.trim_end_matches('/');
                let bytes = match self.download(&format!("{base}/{name}")).await {
                    Ok(bytes) => bytes,
                    Err(first) => {
                        tracing::warn!(template = %name, error = %first, "Template fetch failed, trying alternate extension");
                        let alt = alternate_extension(&name).ok_or_else(|| {
                            JobError::TemplateEmpty(format!("{name}: {first}"))
                        })?;
                        self.download(&format!("{base}/{alt}"))
                            .await
                            .map_err(|e| JobError::TemplateEmpty(format!("{name}: {e}")))?
                    }
                };
                decode(&name, &bytes)
            }
        }
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, reqwest::Error> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }
}

fn decode(name: &str, bytes: &[u8]) -> Result<GrayImage, JobError> {
    image::load_from_memory(bytes)
        .map(|img| img.to_luma8())
        .map_err(|e| JobError::TemplateEmpty(format!("{name}: {e}")))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

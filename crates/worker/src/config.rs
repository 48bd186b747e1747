use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tenmin_core::hold::HoldPolicy;
use tenmin_pipeline::{Budgets, FsmConfig, OtpConfig};
use tenmin_vision::TemplateSource;

use crate::telemetry::LogFormat;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{var} has an invalid value: {value:?}")]
    Invalid { var: &'static str, value: String },

    #[error("one of TEMPLATE_URL or TEMPLATE_DIR must be set")]
    NoTemplateSource,
}

/// Process configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub database_url: String,
    /// Base URL of the notification API.
    pub api_url: String,
    pub templates: TemplateSource,
    /// File holding this process's server id between start and stop.
    pub server_id_file: PathBuf,
    /// LISTEN channel the change-feed trigger publishes on.
    pub feed_channel: String,
    pub capture_command: String,
    pub input_command: String,
    /// Finds and focuses the remote client window; `{title}` is substituted.
    pub window_command: String,
    pub window_title: String,
    pub log_format: LogFormat,
    pub jobs: JobConfig,
}

/// Timing and behaviour of connect, OTP and teardown jobs.
#[derive(Debug, Clone)]
pub struct JobConfig {
    /// Service type this worker handles; other job rows are ignored.
    pub target_service: String,
    pub hold: HoldPolicy,
    /// Re-check cadence of a held job waiting for its teardown turn.
    pub timer_poll: Duration,
    /// Pause after "start" before reading the OTP.
    pub otp_grace: Duration,
    /// Pause after "start" before driving the connect screens.
    pub connect_grace: Duration,
    pub otp: OtpConfig,
    pub fsm: FsmConfig,
    /// Whether connect opens the remote session itself.
    pub engage_session: bool,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            target_service: "10min".into(),
            hold: HoldPolicy::new(Duration::from_secs(660), Duration::from_secs(1)),
            timer_poll: Duration::from_secs(5),
            otp_grace: Duration::from_secs(15),
            connect_grace: Duration::from_secs(5),
            otp: OtpConfig::default(),
            fsm: FsmConfig::default(),
            engage_session: true,
        }
    }
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                      | Default                               |
    /// |------------------------------|---------------------------------------|
    /// | `DATABASE_URL`               | required                              |
    /// | `API_URL`                    | required                              |
    /// | `TEMPLATE_URL`               | one of the two required               |
    /// | `TEMPLATE_DIR`               | (used when `TEMPLATE_URL` is unset)   |
    /// | `SERVER_ID_FILE`             | `server_id.txt`                       |
    /// | `TARGET_SERVICE`             | `10min`                               |
    /// | `CHANGE_FEED_CHANNEL`        | `row_changes`                         |
    /// | `HOLD_SECS`                  | `660`                                 |
    /// | `HOLD_TOLERANCE_SECS`        | `1`                                   |
    /// | `TIMER_POLL_SECS`            | `5`                                   |
    /// | `OTP_GRACE_SECS`             | `15`                                  |
    /// | `CONNECT_GRACE_SECS`         | `5`                                   |
    /// | `OTP_WINDOW_SECS`            | `135`                                 |
    /// | `OTP_RENEWAL_SECS`           | `65`                                  |
    /// | `OTP_POLL_SECS`              | `3`                                   |
    /// | `SCREEN_POLL_MS`             | `2000`                                |
    /// | `MAX_ATTEMPTS_PASSWORD`      | `20`                                  |
    /// | `MAX_ATTEMPTS_NOTICE`        | `20`                                  |
    /// | `MAX_ATTEMPTS_TEAM_SELECT`   | `20`                                  |
    /// | `MAX_ATTEMPTS_PURCHASE`      | `5`                                   |
    /// | `MAX_ATTEMPTS_TOP_CLASS`     | `3`                                   |
    /// | `MAX_ATTEMPTS_EXIT_TEAM`     | `5`                                   |
    /// | `MAX_ATTEMPTS_EXIT_MODAL`    | `5`                                   |
    /// | `MAX_ATTEMPTS_OTP`           | `5`                                   |
    /// | `OPTIONAL_SCREENS`           | `false`                               |
    /// | `ENGAGE_SESSION`             | `true`                                |
    /// | `CAPTURE_COMMAND`            | `import -window root png:-`           |
    /// | `INPUT_COMMAND`              | `xdotool`                             |
    /// | `WINDOW_COMMAND`             | `xdotool search --name {title} windowactivate` |
    /// | `WINDOW_TITLE`               | `Remote`                              |
    /// | `LOG_FORMAT`                 | `pretty`                              |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) over an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Env { lookup: &lookup };

        let templates = match (env.opt("TEMPLATE_URL"), env.opt("TEMPLATE_DIR")) {
            (Some(base_url), _) => TemplateSource::Http { base_url },
            (None, Some(dir)) => TemplateSource::Dir(PathBuf::from(dir)),
            (None, None) => return Err(ConfigError::NoTemplateSource),
        };

        let defaults = JobConfig::default();
        let budgets = Budgets {
            password: env.parse("MAX_ATTEMPTS_PASSWORD", defaults.fsm.budgets.password)?,
            notice: env.parse("MAX_ATTEMPTS_NOTICE", defaults.fsm.budgets.notice)?,
            team_select: env.parse("MAX_ATTEMPTS_TEAM_SELECT", defaults.fsm.budgets.team_select)?,
            purchase_cancel: env.parse("MAX_ATTEMPTS_PURCHASE", defaults.fsm.budgets.purchase_cancel)?,
            top_class: env.parse("MAX_ATTEMPTS_TOP_CLASS", defaults.fsm.budgets.top_class)?,
            exit_team: env.parse("MAX_ATTEMPTS_EXIT_TEAM", defaults.fsm.budgets.exit_team)?,
            exit_modal: env.parse("MAX_ATTEMPTS_EXIT_MODAL", defaults.fsm.budgets.exit_modal)?,
            otp_extraction: env.parse("MAX_ATTEMPTS_OTP", defaults.fsm.budgets.otp_extraction)?,
        };

        let otp_poll = env.secs("OTP_POLL_SECS", defaults.otp.poll)?;
        let otp = OtpConfig {
            window: env.secs("OTP_WINDOW_SECS", defaults.otp.window)?,
            renewal: env.secs("OTP_RENEWAL_SECS", defaults.otp.renewal)?,
            poll: otp_poll,
            extraction_retry: otp_poll,
            extraction_attempts: budgets.otp_extraction,
        };

        let fsm = FsmConfig {
            poll: Duration::from_millis(env.parse("SCREEN_POLL_MS", defaults.fsm.poll.as_millis() as u64)?),
            budgets,
            optional_screens: env.parse("OPTIONAL_SCREENS", defaults.fsm.optional_screens)?,
            ..defaults.fsm.clone()
        };

        let jobs = JobConfig {
            target_service: env.string("TARGET_SERVICE", &defaults.target_service),
            hold: HoldPolicy::new(
                env.secs("HOLD_SECS", defaults.hold.hold)?,
                env.secs("HOLD_TOLERANCE_SECS", defaults.hold.tolerance)?,
            ),
            timer_poll: env.secs("TIMER_POLL_SECS", defaults.timer_poll)?,
            otp_grace: env.secs("OTP_GRACE_SECS", defaults.otp_grace)?,
            connect_grace: env.secs("CONNECT_GRACE_SECS", defaults.connect_grace)?,
            otp,
            fsm,
            engage_session: env.parse("ENGAGE_SESSION", defaults.engage_session)?,
        };

        Ok(Self {
            database_url: env.required("DATABASE_URL")?,
            api_url: env.required("API_URL")?,
            templates,
            server_id_file: PathBuf::from(env.string("SERVER_ID_FILE", "server_id.txt")),
            feed_channel: env.string("CHANGE_FEED_CHANNEL", "row_changes"),
            capture_command: env.string("CAPTURE_COMMAND", "import -window root png:-"),
            input_command: env.string("INPUT_COMMAND", "xdotool"),
            window_command: env.string("WINDOW_COMMAND", "xdotool search --name {title} windowactivate"),
            window_title: env.string("WINDOW_TITLE", "Remote"),
            log_format: env.parse("LOG_FORMAT", LogFormat::Pretty)?,
            jobs,
        })
    }
}

struct Env<'a> {
    lookup: &'a dyn Fn(&str) -> Option<String>,
}

impl Env<'_> {
    fn opt(&self, var: &'static str) -> Option<String> {
        (self.lookup)(var).filter(|v| !v.trim().is_empty())
    }

    fn required(&self, var: &'static str) -> Result<String, ConfigError> {
        self.opt(var).ok_or(ConfigError::Missing(var))
    }

    fn string(&self, var: &'static str, default: &str) -> String {
        self.opt(var).unwrap_or_else(|| default.to_string())
    }

    fn parse<T: FromStr>(&self, var: &'static str, default: T) -> Result<T, ConfigError> {
        match self.opt(var) {
            None => Ok(default),
            Some(value) => value
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid { var, value }),
        }
    }

    fn secs(&self, var: &'static str, default: Duration) -> Result<Duration, ConfigError> {
        self.parse(var, default.as_secs()).map(Duration::from_secs)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Strongly-typed configuration primitives for the chorus automation client.
//!
//! Configuration values can be constructed from defaults, loaded from
//! environment variables (with optional `.env` support), or merged with
//! explicit overrides for ergonomic programmatic updates.  Every timing knob
//! the interaction strategies rely on lives here so integrations can tune
//! them without patching the strategy code.

use std::env;
use std::fmt;
use std::num::ParseIntError;
use std::sync::Arc;

use dotenvy::dotenv;
use serde::de::{Deserialize, Deserializer, Error as DeError};
use serde::ser::{Serialize, Serializer};
use serde::{Deserialize as DeriveDeserialize, Serialize as DeriveSerialize};

use crate::service::Service;

/// Shared logger callback signature used by the configuration.
pub type LoggerCallback = Arc<dyn Fn(&str) + Send + Sync + 'static>;

/// How the client obtains a browser to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, DeriveSerialize, DeriveDeserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BrowserMode {
    /// Spawn a local Chrome/Chromium process.
    Launch,
    /// Attach to an already-running browser over its DevTools websocket.
    Connect,
}

impl Default for BrowserMode {
    fn default() -> Self {
        BrowserMode::Launch
    }
}

impl BrowserMode {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "LAUNCH" => Some(BrowserMode::Launch),
            "CONNECT" => Some(BrowserMode::Connect),
            _ => None,
        }
    }
}

/// Verbosity level for chorus logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Minimal,
    Medium,
    Detailed,
}

impl Verbosity {
    fn as_u8(self) -> u8 {
        match self {
            Verbosity::Minimal => 0,
            Verbosity::Medium => 1,
            Verbosity::Detailed => 2,
        }
    }

    fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Verbosity::Minimal),
            1 => Some(Verbosity::Medium),
            2 => Some(Verbosity::Detailed),
            _ => None,
        }
    }
}

impl Default for Verbosity {
    fn default() -> Self {
        Verbosity::Medium
    }
}

impl Serialize for Verbosity {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u8(self.as_u8())
    }
}

impl<'de> Deserialize<'de> for Verbosity {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = u8::deserialize(deserializer)?;
        Verbosity::from_u8(value).ok_or_else(|| {
            DeError::custom(format!(
                "invalid verbosity value {value}; expected 0, 1, or 2"
            ))
        })
    }
}

/// Filters and formatting choices applied when exporting a conversation.
#[derive(Debug, Clone, PartialEq, Eq, DeriveSerialize, DeriveDeserialize)]
#[serde(default)]
pub struct ExportSettings {
    #[serde(alias = "includeUserMessages")]
    pub include_user_messages: bool,
    #[serde(alias = "includeAssistantMessages")]
    pub include_assistant_messages: bool,
    #[serde(alias = "includeTimestamp")]
    pub include_timestamp: bool,
    #[serde(alias = "fileNameTemplate")]
    pub file_name_template: String,
}

impl Default for ExportSettings {
    fn default() -> Self {
        ExportSettings {
            include_user_messages: true,
            include_assistant_messages: true,
            include_timestamp: true,
            file_name_template: "{service}_{title}_{timestamp}".to_string(),
        }
    }
}

/// Configuration values for the chorus client.
#[derive(DeriveSerialize, DeriveDeserialize, Clone)]
#[serde(default)]
pub struct ChorusConfig {
    pub browser: BrowserMode,
    /// DevTools websocket of an existing browser; required in connect mode.
    #[serde(alias = "websocketUrl")]
    pub websocket_url: Option<String>,
    #[serde(alias = "chromeExecutable")]
    pub chrome_executable: Option<String>,
    /// Profile directory, so sessions inherit the user's logins.
    #[serde(alias = "userDataDir")]
    pub user_data_dir: Option<String>,
    #[serde(alias = "browserArgs")]
    pub browser_args: Vec<String>,
    pub headless: bool,
    #[serde(skip_serializing, skip_deserializing)]
    pub logger: Option<LoggerCallback>,
    pub verbose: Verbosity,
    #[serde(alias = "useRichLogging")]
    pub use_rich_logging: bool,
    /// Services the client drives; `None` means the stock set (Grok opt-in).
    #[serde(alias = "enabledServices")]
    pub enabled_services: Option<Vec<Service>>,
    /// Overrides the per-service response deadline when set.
    #[serde(alias = "responseTimeoutMs")]
    pub response_timeout_ms: Option<u64>,
    /// Overrides the per-service post-stream settle delay when set.
    #[serde(alias = "settleDelayMs")]
    pub settle_delay_ms: Option<u64>,
    /// Pause between injecting text and triggering submission.
    #[serde(alias = "inputSettleMs")]
    pub input_settle_ms: u64,
    /// How long to wait for a send button to become enabled.
    #[serde(alias = "enableWaitMs")]
    pub enable_wait_ms: u64,
    /// Window for the optimistic post-click transmission check.
    #[serde(alias = "verifyWindowMs")]
    pub verify_window_ms: u64,
    /// Minimum injection-verification similarity score (0-100).
    #[serde(alias = "similarityThreshold")]
    pub similarity_threshold: u8,
    /// Pause between consecutive sends when broadcasting.
    #[serde(alias = "sendDelayMs")]
    pub send_delay_ms: u64,
    pub export: ExportSettings,
}

impl Default for ChorusConfig {
    fn default() -> Self {
        ChorusConfig {
            browser: BrowserMode::default(),
            websocket_url: None,
            chrome_executable: None,
            user_data_dir: None,
            browser_args: Vec::new(),
            headless: false,
            logger: None,
            verbose: Verbosity::default(),
            use_rich_logging: true,
            enabled_services: None,
            response_timeout_ms: None,
            settle_delay_ms: None,
            input_settle_ms: 1_000,
            enable_wait_ms: 5_000,
            verify_window_ms: 3_000,
            similarity_threshold: 70,
            send_delay_ms: 1_000,
            export: ExportSettings::default(),
        }
    }
}

impl ChorusConfig {
    /// Construct a configuration by reading relevant environment variables,
    /// after loading a `.env` file if present.
    pub fn from_env() -> Result<Self, ChorusConfigError> {
        let _ = dotenv();
        let mut config = ChorusConfig::default();

        if let Some(value) = env_var("CHORUS_BROWSER") {
            config.browser = BrowserMode::parse(&value)
                .ok_or_else(|| ChorusConfigError::invalid_enum("CHORUS_BROWSER", value.clone()))?;
        }

        if let Some(value) = env_var("CHORUS_WEBSOCKET_URL") {
            config.websocket_url = Some(value);
        }

        if let Some(value) = env_var("CHORUS_CHROME_EXECUTABLE") {
            config.chrome_executable = Some(value);
        }

        if let Some(value) = env_var("CHORUS_USER_DATA_DIR") {
            config.user_data_dir = Some(value);
        }

        if let Some(value) = env_var("CHORUS_BROWSER_ARGS") {
            config.browser_args = value.split_whitespace().map(str::to_string).collect();
        }

        if let Some(value) = env_var("CHORUS_HEADLESS") {
            config.headless = parse_bool("CHORUS_HEADLESS", &value)?;
        }

        if let Some(value) = env_var("CHORUS_VERBOSE") {
            let parsed = parse_u8("CHORUS_VERBOSE", &value)?;
            config.verbose = Verbosity::from_u8(parsed).ok_or_else(|| {
                ChorusConfigError::invalid_enum("CHORUS_VERBOSE", parsed.to_string())
            })?;
        }

        if let Some(value) = env_var("CHORUS_USE_RICH_LOGGING") {
            config.use_rich_logging = parse_bool("CHORUS_USE_RICH_LOGGING", &value)?;
        }

        if let Some(value) = env_var("CHORUS_ENABLED_SERVICES") {
            config.enabled_services = Some(parse_services("CHORUS_ENABLED_SERVICES", &value)?);
        }

        if let Some(value) = env_var("CHORUS_RESPONSE_TIMEOUT_MS") {
            config.response_timeout_ms = Some(parse_u64("CHORUS_RESPONSE_TIMEOUT_MS", &value)?);
        }

        if let Some(value) = env_var("CHORUS_SETTLE_DELAY_MS") {
            config.settle_delay_ms = Some(parse_u64("CHORUS_SETTLE_DELAY_MS", &value)?);
        }

        if let Some(value) = env_var("CHORUS_INPUT_SETTLE_MS") {
            config.input_settle_ms = parse_u64("CHORUS_INPUT_SETTLE_MS", &value)?;
        }

        if let Some(value) = env_var("CHORUS_ENABLE_WAIT_MS") {
            config.enable_wait_ms = parse_u64("CHORUS_ENABLE_WAIT_MS", &value)?;
        }

        if let Some(value) = env_var("CHORUS_VERIFY_WINDOW_MS") {
            config.verify_window_ms = parse_u64("CHORUS_VERIFY_WINDOW_MS", &value)?;
        }

        if let Some(value) = env_var("CHORUS_SIMILARITY_THRESHOLD") {
            let parsed = parse_u8("CHORUS_SIMILARITY_THRESHOLD", &value)?;
            if parsed > 100 {
                return Err(ChorusConfigError::invalid_enum(
                    "CHORUS_SIMILARITY_THRESHOLD",
                    parsed.to_string(),
                ));
            }
            config.similarity_threshold = parsed;
        }

        if let Some(value) = env_var("CHORUS_SEND_DELAY_MS") {
            config.send_delay_ms = parse_u64("CHORUS_SEND_DELAY_MS", &value)?;
        }

        if let Some(value) = env_var("CHORUS_INCLUDE_USER_MESSAGES") {
            config.export.include_user_messages =
                parse_bool("CHORUS_INCLUDE_USER_MESSAGES", &value)?;
        }

        if let Some(value) = env_var("CHORUS_INCLUDE_ASSISTANT_MESSAGES") {
            config.export.include_assistant_messages =
                parse_bool("CHORUS_INCLUDE_ASSISTANT_MESSAGES", &value)?;
        }

        if let Some(value) = env_var("CHORUS_INCLUDE_TIMESTAMP") {
            config.export.include_timestamp = parse_bool("CHORUS_INCLUDE_TIMESTAMP", &value)?;
        }

        if let Some(value) = env_var("CHORUS_FILE_NAME_TEMPLATE") {
            config.export.file_name_template = value;
        }

        Ok(config)
    }

    /// Services the client should drive by default.
    pub fn active_services(&self) -> Vec<Service> {
        match &self.enabled_services {
            Some(services) => services.clone(),
            None => Service::default_enabled(),
        }
    }

    /// Create a new configuration with explicit field overrides applied.
    pub fn with_overrides(&self, overrides: ChorusConfigOverrides) -> ChorusConfig {
        let mut next = self.clone();

        if let Some(value) = overrides.browser {
            next.browser = value;
        }
        if let Some(value) = overrides.websocket_url {
            next.websocket_url = value;
        }
        if let Some(value) = overrides.chrome_executable {
            next.chrome_executable = value;
        }
        if let Some(value) = overrides.user_data_dir {
            next.user_data_dir = value;
        }
        if let Some(value) = overrides.browser_args {
            next.browser_args = value;
        }
        if let Some(value) = overrides.headless {
            next.headless = value;
        }
        if let Some(value) = overrides.logger {
            next.logger = value;
        }
        if let Some(value) = overrides.verbose {
            next.verbose = value;
        }
        if let Some(value) = overrides.use_rich_logging {
            next.use_rich_logging = value;
        }
        if let Some(value) = overrides.enabled_services {
            next.enabled_services = value;
        }
        if let Some(value) = overrides.response_timeout_ms {
            next.response_timeout_ms = value;
        }
        if let Some(value) = overrides.settle_delay_ms {
            next.settle_delay_ms = value;
        }
        if let Some(value) = overrides.input_settle_ms {
            next.input_settle_ms = value;
        }
        if let Some(value) = overrides.enable_wait_ms {
            next.enable_wait_ms = value;
        }
        if let Some(value) = overrides.verify_window_ms {
            next.verify_window_ms = value;
        }
        if let Some(value) = overrides.similarity_threshold {
            next.similarity_threshold = value;
        }
        if let Some(value) = overrides.send_delay_ms {
            next.send_delay_ms = value;
        }
        if let Some(value) = overrides.export {
            next.export = value;
        }

        next
    }
}

/// Field-level overrides for [`ChorusConfig::with_overrides`].
#[derive(Default, Clone)]
pub struct ChorusConfigOverrides {
    pub browser: Option<BrowserMode>,
    pub websocket_url: Option<Option<String>>,
    pub chrome_executable: Option<Option<String>>,
    pub user_data_dir: Option<Option<String>>,
    pub browser_args: Option<Vec<String>>,
    pub headless: Option<bool>,
    pub logger: Option<Option<LoggerCallback>>,
    pub verbose: Option<Verbosity>,
    pub use_rich_logging: Option<bool>,
    pub enabled_services: Option<Option<Vec<Service>>>,
    pub response_timeout_ms: Option<Option<u64>>,
    pub settle_delay_ms: Option<Option<u64>>,
    pub input_settle_ms: Option<u64>,
    pub enable_wait_ms: Option<u64>,
    pub verify_window_ms: Option<u64>,
    pub similarity_threshold: Option<u8>,
    pub send_delay_ms: Option<u64>,
    pub export: Option<ExportSettings>,
}

impl ChorusConfigOverrides {
    /// Builder-style helper to set the `browser` override.
    pub fn browser(mut self, browser: BrowserMode) -> Self {
        self.browser = Some(browser);
        self
    }

    /// Builder-style helper to set the `websocket_url` override.
    pub fn websocket_url<T: Into<Option<String>>>(mut self, url: T) -> Self {
        self.websocket_url = Some(url.into());
        self
    }
}

impl fmt::Debug for ChorusConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChorusConfig")
            .field("browser", &self.browser)
            .field("websocket_url", &self.websocket_url)
            .field("chrome_executable", &self.chrome_executable)
            .field("user_data_dir", &self.user_data_dir)
            .field("browser_args", &self.browser_args)
            .field("headless", &self.headless)
            .field("verbose", &self.verbose)
            .field("use_rich_logging", &self.use_rich_logging)
            .field("enabled_services", &self.enabled_services)
            .field("response_timeout_ms", &self.response_timeout_ms)
            .field("settle_delay_ms", &self.settle_delay_ms)
            .field("input_settle_ms", &self.input_settle_ms)
            .field("enable_wait_ms", &self.enable_wait_ms)
            .field("verify_window_ms", &self.verify_window_ms)
            .field("similarity_threshold", &self.similarity_threshold)
            .field("send_delay_ms", &self.send_delay_ms)
            .field("export", &self.export)
            .field("logger_present", &self.logger.is_some())
            .finish()
    }
}

impl fmt::Debug for ChorusConfigOverrides {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChorusConfigOverrides")
            .field("browser", &self.browser)
            .field("websocket_url", &self.websocket_url)
            .field("chrome_executable", &self.chrome_executable)
            .field("user_data_dir", &self.user_data_dir)
            .field("browser_args", &self.browser_args)
            .field("headless", &self.headless)
            .field("logger", &self.logger.as_ref().map(|inner| inner.is_some()))
            .field("verbose", &self.verbose)
            .field("use_rich_logging", &self.use_rich_logging)
            .field("enabled_services", &self.enabled_services)
            .field("response_timeout_ms", &self.response_timeout_ms)
            .field("settle_delay_ms", &self.settle_delay_ms)
            .field("input_settle_ms", &self.input_settle_ms)
            .field("enable_wait_ms", &self.enable_wait_ms)
            .field("verify_window_ms", &self.verify_window_ms)
            .field("similarity_threshold", &self.similarity_threshold)
            .field("send_delay_ms", &self.send_delay_ms)
            .field("export", &self.export)
            .finish()
    }
}

/// Errors that can arise while constructing a [`ChorusConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ChorusConfigError {
    #[error("invalid value '{value}' for {field}")]
    InvalidEnumVariant { field: &'static str, value: String },
    #[error("invalid boolean '{value}' for {field}")]
    InvalidBool { field: &'static str, value: String },
    #[error("invalid number '{value}' for {field}: {source}")]
    InvalidNumber {
        field: &'static str,
        value: String,
        #[source]
        source: ParseIntError,
    },
    #[error("unknown service '{value}' in {field}")]
    UnknownService { field: &'static str, value: String },
}

impl ChorusConfigError {
    fn invalid_enum(field: &'static str, value: String) -> Self {
        ChorusConfigError::InvalidEnumVariant { field, value }
    }
}

fn env_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_bool(field: &'static str, value: &str) -> Result<bool, ChorusConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ChorusConfigError::InvalidBool {
            field,
            value: value.to_string(),
        }),
    }
}

fn parse_u8(field: &'static str, value: &str) -> Result<u8, ChorusConfigError> {
    value
        .trim()
        .parse::<u8>()
        .map_err(|source| ChorusConfigError::InvalidNumber {
            field,
            value: value.to_string(),
            source,
        })
}

fn parse_u64(field: &'static str, value: &str) -> Result<u64, ChorusConfigError> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|source| ChorusConfigError::InvalidNumber {
            field,
            value: value.to_string(),
            source,
        })
}

fn parse_services(field: &'static str, value: &str) -> Result<Vec<Service>, ChorusConfigError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            Service::parse(entry).ok_or_else(|| ChorusConfigError::UnknownService {
                field,
                value: entry.to_string(),
            })
        })
        .collect()
}

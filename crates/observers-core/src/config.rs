//! Store configuration.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Key the store uses when none is configured.
pub const DEFAULT_STATE_KEY: &str = "observations";

/// Directory the filesystem backend uses when none is configured.
pub const DEFAULT_STATE_DIR: &str = ".observers";

/// Where and under which key the observation store persists its document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub state_dir: PathBuf,
    pub state_key: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from(DEFAULT_STATE_DIR),
            state_key: DEFAULT_STATE_KEY.to_string(),
        }
    }
}

impl StoreConfig {
    /// Set custom state directory
    pub fn with_state_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.state_dir = dir.into();
        self
    }

    /// Set custom state key
    pub fn with_state_key(mut self, key: impl Into<String>) -> Self {
        self.state_key = key.into();
        self
    }

    /// Create from environment variables
    ///
    /// Reads:
    /// - OBSERVERS_STATE_DIR (optional, default: ".observers")
    /// - OBSERVERS_STATE_KEY (optional, default: "observations")
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let state_dir = lookup("OBSERVERS_STATE_DIR")
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .unwrap_or(defaults.state_dir);
        let state_key = lookup("OBSERVERS_STATE_KEY")
            .filter(|v| !v.is_empty())
            .unwrap_or(defaults.state_key);
        Self {
            state_dir,
            state_key,
        }
    }
}

/// How the display hook renders the observation list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DisplayStyle {
    #[default]
    Compact,
    Table,
    ProgressBar,
}

impl DisplayStyle {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Compact => "compact",
            Self::Table => "table",
            Self::ProgressBar => "progress_bar",
        }
    }
}

/// Unrecognized names fall back to `compact`.
impl From<String> for DisplayStyle {
    fn from(s: String) -> Self {
        match s.as_str() {
            "table" => Self::Table,
            "progress_bar" => Self::ProgressBar,
            _ => Self::Compact,
        }
    }
}

impl From<DisplayStyle> for String {
    fn from(style: DisplayStyle) -> Self {
        style.as_str().to_string()
    }
}

impl fmt::Display for DisplayStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Display hook settings, read from a module config value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub style: DisplayStyle,
    pub show_on_create: bool,
    pub show_on_resolve: bool,
    pub show_on_change: bool,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            style: DisplayStyle::default(),
            show_on_create: true,
            show_on_resolve: true,
            show_on_change: true,
        }
    }
}

impl DisplayConfig {
    /// Parse from a JSON config value; `null` yields the defaults.
    pub fn from_value(value: &serde_json::Value) -> serde_json::Result<Self> {
        if value.is_null() {
            return Ok(Self::default());
        }
        serde_json::from_value(value.clone())
    }

    pub fn with_style(mut self, style: DisplayStyle) -> Self {
        self.style = style;
        self
    }
}

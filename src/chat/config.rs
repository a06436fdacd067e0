//! Configuration types for the chat application.
//!
//! The configuration lives in a JSON file, `~/.config/ai-repl/config.json` by
//! default. Command-line arguments parsed via `arrrg` can point at another
//! file and override the history location.

use std::fs;
use std::path::{Path, PathBuf};

use arrrg_derive::CommandLine;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default model used when the config file does not name one.
pub const DEFAULT_MODEL: &str = "gpt-4-1106-preview";

/// Default sampling temperature.
pub const DEFAULT_TEMPERATURE: f64 = 0.7;

/// Default nucleus sampling mass.
pub const DEFAULT_TOP_P: f64 = 1.0;

const CONFIG_FILE_NAME: &str = "config.json";
const HISTORY_FILE_NAME: &str = "ai-repl-history";

/// Command-line arguments for the ai-repl tool.
#[derive(CommandLine, Debug, Default, PartialEq, Eq)]
pub struct ChatArgs {
    /// Path to the JSON configuration file.
    #[arrrg(
        optional,
        "Config file (default: ~/.config/ai-repl/config.json)",
        "PATH"
    )]
    pub config: Option<String>,

    /// Path to the line-history file.
    #[arrrg(optional, "History file (overrides historyPath in the config)", "PATH")]
    pub history: Option<String>,

    /// Disable ANSI colors and styles.
    #[arrrg(flag, "Disable ANSI colors/styles")]
    pub no_color: bool,

    /// Path biometrics readings are appended to.
    #[arrrg(optional, "Append biometrics readings to this file every 10s", "PATH")]
    pub metrics: Option<String>,
}

/// Directory holding the config and history files, `~/.config/ai-repl`.
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("~"))
        .join(".config")
        .join("ai-repl")
}

/// Default location of the config file.
pub fn default_config_path() -> PathBuf {
    config_dir().join(CONFIG_FILE_NAME)
}

/// Default location of the line-history file.
pub fn default_history_path() -> PathBuf {
    config_dir().join(HISTORY_FILE_NAME)
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_temperature() -> f64 {
    DEFAULT_TEMPERATURE
}

fn default_top_p() -> f64 {
    DEFAULT_TOP_P
}

/// User configuration.
///
/// Everything but `history_path` is fixed once loaded; `history_path` is
/// back-filled with [`default_history_path`] before the REPL starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// API key sent as a bearer token.
    pub api_key: String,

    /// Optional system prompt placed before every request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_context: Option<String>,

    /// Model identifier for completions and token counting.
    #[serde(default = "default_model")]
    pub model: String,

    /// Sampling temperature in `[0, 2]`.
    #[serde(default = "default_temperature")]
    pub temperature: f64,

    /// Nucleus sampling mass in `[0, 1]`.
    #[serde(default = "default_top_p", alias = "top_p")]
    pub top_p: f64,

    /// Location of the line-history file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history_path: Option<PathBuf>,

    /// Base URL of an OpenAI-compatible API.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

impl Config {
    /// Creates a config with defaults for everything but the API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            system_context: None,
            model: default_model(),
            temperature: DEFAULT_TEMPERATURE,
            top_p: DEFAULT_TOP_P,
            history_path: None,
            base_url: None,
        }
    }

    /// Sets the system prompt.
    pub fn with_system_context(mut self, context: impl Into<String>) -> Self {
        self.system_context = Some(context.into());
        self
    }

    /// Sets the model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Sets the sampling temperature.
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    /// Sets the top-p value.
    pub fn with_top_p(mut self, top_p: f64) -> Self {
        self.top_p = top_p;
        self
    }

    /// Sets the history file path.
    pub fn with_history_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.history_path = Some(path.into());
        self
    }

    /// Loads the config from the default location.
    pub fn load_default() -> Result<Self> {
        Self::load(default_config_path())
    }

    /// Loads and validates the config file at `path`.
    ///
    /// Unreadable files fail with [`Error::Io`]; malformed JSON, wrong types,
    /// a missing `apiKey` and out-of-range numbers fail with
    /// [`Error::Validation`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|err| {
            Error::io(
                format!("failed to read config file {}", path.display()),
                err,
            )
        })?;
        let config = Self::from_json(&contents)?;
        tracing::debug!(path = %path.display(), model = %config.model, "loaded config");
        Ok(config)
    }

    /// Parses and validates a config from JSON text.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(json)
            .map_err(|err| Error::validation(format!("invalid config: {err}"), None))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks every constraint on the config.
    pub fn validate(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            return Err(Error::validation(
                "apiKey must not be empty",
                Some("apiKey".to_string()),
            ));
        }
        if self.model.trim().is_empty() {
            return Err(Error::validation(
                "model must not be empty",
                Some("model".to_string()),
            ));
        }
        check_range("temperature", self.temperature, 0.0, 2.0)?;
        check_range("topP", self.top_p, 0.0, 1.0)?;
        Ok(())
    }

    /// Fills `history_path` with the default location if it is unset.
    pub fn resolve_history_path(&mut self) -> &Path {
        self.history_path.get_or_insert_with(default_history_path)
    }

    /// Human-readable listing with the API key masked.
    pub fn describe(&self) -> String {
        let mut out = String::new();
        out.push_str("Current Configuration:\n");
        out.push_str(&format!("  API key: {}\n", mask_key(&self.api_key)));
        out.push_str(&format!("  Model: {}\n", self.model));
        out.push_str(&format!("  Temperature: {:.2}\n", self.temperature));
        out.push_str(&format!("  Top-p: {:.2}\n", self.top_p));
        match self.system_context.as_deref() {
            Some(context) => out.push_str(&format!("  System context: {context}\n")),
            None => out.push_str("  System context: (none)\n"),
        }
        match self.history_path.as_deref() {
            Some(path) => out.push_str(&format!("  History file: {}\n", path.display())),
            None => out.push_str("  History file: (default)\n"),
        }
        if let Some(base_url) = self.base_url.as_deref() {
            out.push_str(&format!("  Base URL: {base_url}\n"));
        }
        out
    }
}

fn check_range(field: &str, value: f64, min: f64, max: f64) -> Result<()> {
    if value.is_finite() && value >= min && value <= max {
        Ok(())
    } else {
        Err(Error::validation(
            format!("{field} must be between {min} and {max}, got {value}"),
            Some(field.to_string()),
        ))
    }
}

fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..3].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}

//! Bot Configuration
//!
//! Environment-driven configuration for the quizcast bot. Every deployment
//! setting is read from the process environment once at startup; missing
//! required keys abort startup, which is the only fatal error in the system.

use std::path::PathBuf;

/// Errors raised while loading configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

/// Runtime configuration for the bot
#[derive(Debug, Clone)]
pub struct Config {
    /// Telegram bot token from BotFather
    pub bot_token: String,
    /// User id allowed to submit and schedule quizzes
    pub admin_id: i64,
    /// Group chat where quiz polls are posted
    pub quiz_group_id: i64,
    /// Group chat where finished quiz documents are archived
    pub storage_group_id: i64,
    /// Penalty applied for a wrong answer when a question carries no
    /// `Negative:` line
    pub default_negative: f64,
    /// Poll duration in seconds when a question carries no `Time:` line
    pub default_timer_secs: u64,
    /// Directory holding the score ledger
    pub data_dir: PathBuf,
}

impl Config {
    /// Load configuration from the environment.
    ///
    /// `BOT_TOKEN`, `ADMIN_ID`, `QUIZ_GROUP_ID` and `STORAGE_GROUP_ID` are
    /// required. `DEFAULT_NEGATIVE` (default 1/3), `DEFAULT_TIMER` (default
    /// 30 seconds) and `DATA_DIR` (default `data`) are optional.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            bot_token: require("BOT_TOKEN")?,
            admin_id: require_parsed("ADMIN_ID")?,
            quiz_group_id: require_parsed("QUIZ_GROUP_ID")?,
            storage_group_id: require_parsed("STORAGE_GROUP_ID")?,
            default_negative: optional_parsed("DEFAULT_NEGATIVE", 1.0 / 3.0)?,
            default_timer_secs: optional_parsed("DEFAULT_TIMER", 30)?,
            data_dir: std::env::var("DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("data")),
        })
    }

    /// Validate cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bot_token.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: "BOT_TOKEN",
                value: String::new(),
            });
        }
        if self.default_negative < 0.0 {
            return Err(ConfigError::Invalid {
                key: "DEFAULT_NEGATIVE",
                value: self.default_negative.to_string(),
            });
        }
        if self.default_timer_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "DEFAULT_TIMER",
                value: "0".to_string(),
            });
        }
        Ok(())
    }
}

fn require(key: &'static str) -> Result<String, ConfigError> {
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::Missing(key)),
    }
}

fn require_parsed<T: std::str::FromStr>(key: &'static str) -> Result<T, ConfigError> {
    let raw = require(key)?;
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::Invalid { key, value: raw })
}

fn optional_parsed<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
        _ => Ok(default),
    }
}

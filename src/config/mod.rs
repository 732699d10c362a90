//! Typed configuration from environment variables and an optional settings file.
//!
//! Loads once at startup, fails fast if required vars are missing.
//! Sensitive values wrapped in secrecy::SecretString to prevent log leaks.

pub mod secrets;
pub mod settings;

pub use settings::{AssignmentSettings, BulkSettings, SchedulerSettings, Settings};

use std::path::PathBuf;

use crate::error::{Error, Result};
use secrets::SecretString;

#[derive(Debug)]
pub struct Config {
    pub database_url: SecretString,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
    /// Path to a TOML settings file (`ROTA_SETTINGS`).
    pub settings_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database_url: SecretString::from(required_var("DATABASE_URL")?),
            otel_endpoint: optional_var("OTEL_ENDPOINT"),
            log_level: optional_var("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            settings_path: optional_var("ROTA_SETTINGS").map(PathBuf::from),
        })
    }

    /// Engine settings from `settings_path`, or defaults when unset.
    pub fn settings(&self) -> Result<Settings> {
        match self.settings_path {
            Some(ref path) => Settings::load(path),
            None => Ok(Settings::default()),
        }
    }
}

fn required_var(name: &str) -> Result<String> {
    optional_var(name)
        .ok_or_else(|| Error::Config(format!("required environment variable {name} is not set")))
}

/// Unset and empty are treated the same.
fn optional_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

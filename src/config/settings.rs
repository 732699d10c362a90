//! Engine tuning loaded from a TOML file.
//!
//! ```toml
//! [scoring]
//! skill = 0.4
//! availability = 0.3
//! workload = 0.2
//! location = 0.1
//!
//! [scheduler]
//! poll_interval_secs = 60
//!
//! [bulk]
//! max_items = 50
//!
//! [assignment]
//! max_candidates = 10
//! ```
//!
//! Every section and key is optional.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::scoring::ScoringWeights;

/// Hard ceiling on ranked candidates and bulk items per call.
pub const MAX_BATCH: usize = 50;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub scoring: ScoringWeights,
    pub scheduler: SchedulerSettings,
    pub bulk: BulkSettings,
    pub assignment: AssignmentSettings,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    pub poll_interval_secs: u64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: 60,
        }
    }
}

impl SchedulerSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BulkSettings {
    pub max_items: usize,
}

impl Default for BulkSettings {
    fn default() -> Self {
        Self {
            max_items: MAX_BATCH,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AssignmentSettings {
    /// Used when a caller does not pass its own cap.
    pub max_candidates: usize,
}

impl Default for AssignmentSettings {
    fn default() -> Self {
        Self { max_candidates: 10 }
    }
}

impl Settings {
    /// Read and validate a settings file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read settings {}: {e}", path.display()))
        })?;
        Self::parse(&content)
            .map_err(|e| Error::Config(format!("bad settings {}: {e}", path.display())))
    }

    /// Parse and validate settings from TOML text.
    pub fn parse(content: &str) -> Result<Self> {
        let settings: Settings =
            toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        self.scoring
            .validate()
            .map_err(|e| Error::Config(e.to_string()))?;
        if self.scheduler.poll_interval_secs == 0 {
            return Err(Error::Config(
                "scheduler.poll_interval_secs must be positive".to_string(),
            ));
        }
        if !(1..=MAX_BATCH).contains(&self.bulk.max_items) {
            return Err(Error::Config(format!(
                "bulk.max_items must be between 1 and {MAX_BATCH}"
            )));
        }
        if !(1..=MAX_BATCH).contains(&self.assignment.max_candidates) {
            return Err(Error::Config(format!(
                "assignment.max_candidates must be between 1 and {MAX_BATCH}"
            )));
        }
        Ok(())
    }
}

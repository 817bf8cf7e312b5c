use std::fmt;

use scandrop_core::IntakeError;
use thiserror::Error;

use crate::models::Config;

#[derive(Debug, Error)]
pub enum ConfigGuardRailError {
    #[error("invalid intake configuration: {0}")]
    Intake(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigWarning {
    pub message: String,
    pub hint: Option<String>,
}

impl fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.hint {
            Some(hint) => write!(f, "{} ({hint})", self.message),
            None => f.write_str(&self.message),
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct ConfigWarnings {
    pub items: Vec<ConfigWarning>,
}

impl ConfigWarnings {
    pub fn push<S: Into<String>>(&mut self, message: S) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: None,
        });
    }

    pub fn push_with_hint<S: Into<String>, H: Into<String>>(&mut self, message: S, hint: H) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: Some(hint.into()),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn extend(&mut self, other: ConfigWarnings) {
        self.items.extend(other.items);
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConfigWarning> {
        self.items.iter()
    }
}

/// Reject configurations the pipeline cannot run with and flag ones that
/// will run poorly.
pub fn apply_guard_rails(config: &Config) -> Result<ConfigWarnings, ConfigGuardRailError> {
    config.intake.validate().map_err(|err| match err {
        IntakeError::Config(reason) => ConfigGuardRailError::Intake(reason),
        other => ConfigGuardRailError::Intake(other.to_string()),
    })?;

    let mut warnings = ConfigWarnings::default();
    let intake = &config.intake;

    if intake.pool.queue_capacity < intake.pool.workers {
        warnings.push_with_hint(
            format!(
                "queue capacity {} is below the worker count {}; short bursts will be failed as queue_full",
                intake.pool.queue_capacity, intake.pool.workers
            ),
            "Raise WATCH_QUEUE_CAPACITY",
        );
    }

    let sampling_window = intake
        .stability
        .check_interval_ms
        .saturating_mul(u64::from(intake.stability.max_attempts));
    if sampling_window < intake.stability.min_idle_ms {
        warnings.push_with_hint(
            format!(
                "stability sampling gives up after {sampling_window} ms, before the {} ms idle window can elapse; every file will fail as unstable",
                intake.stability.min_idle_ms
            ),
            "Raise WATCH_STABILITY_MAX_ATTEMPTS or lower WATCH_STABILITY_MIN_IDLE_MS",
        );
    }

    if intake.identify.orientations.is_empty() {
        warnings.push("no orientation retries configured; only upright pages are decoded");
    }

    Ok(warnings)
}

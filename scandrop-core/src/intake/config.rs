use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{IntakeError, Result};
use crate::intake::identify::Orientation;

/// Extensions accepted from the drop directory when nothing else is configured.
pub const DEFAULT_ACCEPTED_EXTENSIONS: &[&str] = &["pdf"];

/// Leading characters that mark temporary or partial artifacts (editor locks,
/// hidden upload scratch files).
pub const DEFAULT_IGNORED_PREFIXES: &[&str] = &["~", "."];

/// Every knob the intake pipeline reads.
///
/// Built once at startup and shared immutably (`Arc<IntakeConfig>`) with the
/// watch loop, the pool and each task. All sections carry defaults so a
/// deployment only needs to override what it cares about.
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct IntakeConfig {
    /// The four directories files move through.
    pub directories: DirectoryConfig,
    /// Notification polling and candidate filtering.
    pub watch: WatchConfig,
    /// Settling detection for files still being written.
    pub stability: StabilityConfig,
    /// Worker count, queue depth and shutdown grace.
    pub pool: PoolConfig,
    /// Rendering resolution and orientation retries.
    pub identify: IdentifyConfig,
}

impl IntakeConfig {
    /// Guard rails that would otherwise surface as panics or busy loops deep
    /// inside the runtime.
    pub fn validate(&self) -> Result<()> {
        if self.pool.workers == 0 {
            return Err(IntakeError::Config("pool.workers must be at least 1".into()));
        }
        if self.pool.queue_capacity == 0 {
            return Err(IntakeError::Config(
                "pool.queue_capacity must be at least 1".into(),
            ));
        }
        if self.stability.max_attempts == 0 {
            return Err(IntakeError::Config(
                "stability.max_attempts must be at least 1".into(),
            ));
        }
        if self.stability.consecutive_matches == 0 {
            return Err(IntakeError::Config(
                "stability.consecutive_matches must be at least 1".into(),
            ));
        }
        if self.watch.poll_timeout_ms == 0 {
            return Err(IntakeError::Config(
                "watch.poll_timeout_ms must be greater than zero".into(),
            ));
        }
        if self.watch.sweep_interval_ms == Some(0) {
            return Err(IntakeError::Config(
                "watch.sweep_interval_ms must be greater than zero when set".into(),
            ));
        }
        if self.watch.accepted_extensions().is_empty() {
            return Err(IntakeError::Config(
                "watch.extensions must name at least one extension".into(),
            ));
        }
        if self.identify.render_dpi == 0 {
            return Err(IntakeError::Config(
                "identify.render_dpi must be greater than zero".into(),
            ));
        }
        self.identify.orientation_retries()?;
        Ok(())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DirectoryConfig {
    /// Drop zone watched for new files.
    pub incoming: PathBuf,
    /// Holding area while a task owns a file.
    pub processing: PathBuf,
    /// Successfully identified files, named after their code.
    pub finished: PathBuf,
    /// Files that could not be identified, tagged with the reason.
    pub failed: PathBuf,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            incoming: PathBuf::from("incoming"),
            processing: PathBuf::from("processing"),
            finished: PathBuf::from("finished"),
            failed: PathBuf::from("failed"),
        }
    }
}

/// Tuning for the notification loop.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WatchConfig {
    /// Upper bound on a single wait for notifications, in milliseconds.
    pub poll_timeout_ms: u64,
    /// Accepted file extensions, compared case-insensitively.
    pub extensions: Vec<String>,
    /// Filenames starting with any of these are treated as partial artifacts.
    pub ignored_prefixes: Vec<String>,
    /// When set, `incoming` is re-listed on this cadence to pick up files
    /// whose notifications were dropped.
    pub sweep_interval_ms: Option<u64>,
    /// Capacity of the channel between the notifier thread and the loop.
    pub event_buffer: usize,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            poll_timeout_ms: 1_000,
            extensions: DEFAULT_ACCEPTED_EXTENSIONS
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
            ignored_prefixes: DEFAULT_IGNORED_PREFIXES
                .iter()
                .map(|prefix| prefix.to_string())
                .collect(),
            sweep_interval_ms: None,
            event_buffer: 1_024,
        }
    }
}

impl WatchConfig {
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms.max(1))
    }

    pub fn sweep_interval(&self) -> Option<Duration> {
        self.sweep_interval_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }

    /// Normalised extension list: lower-case, no leading dot, no blanks.
    pub fn accepted_extensions(&self) -> Vec<String> {
        self.extensions
            .iter()
            .map(|ext| ext.trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect()
    }
}

/// Settling rules for files still being written by an external producer.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StabilityConfig {
    /// Delay between two size samples.
    pub check_interval_ms: u64,
    /// Minimum time the size must have stayed unchanged.
    pub min_idle_ms: u64,
    /// Samples taken before giving up.
    pub max_attempts: u32,
    /// Consecutive equal samples required.
    pub consecutive_matches: u32,
}

impl Default for StabilityConfig {
    fn default() -> Self {
        Self {
            check_interval_ms: 750,
            min_idle_ms: 2_000,
            max_attempts: 15,
            consecutive_matches: 2,
        }
    }
}

impl StabilityConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }

    pub fn min_idle(&self) -> Duration {
        Duration::from_millis(self.min_idle_ms)
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PoolConfig {
    /// Fixed number of workers draining the queue.
    pub workers: usize,
    /// Tasks that may wait for a worker before submissions are refused.
    pub queue_capacity: usize,
    /// How long shutdown waits for queued and in-flight tasks.
    pub shutdown_grace_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: Self::default_workers(),
            queue_capacity: 200,
            shutdown_grace_ms: 10_000,
        }
    }
}

impl PoolConfig {
    /// Half the available cores, never fewer than two.
    pub fn default_workers() -> usize {
        (num_cpus::get() / 2).max(2)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct IdentifyConfig {
    /// Resolution pages are rasterised at.
    pub render_dpi: u32,
    /// Clockwise rotations, in degrees, tried on a page whose upright
    /// rendering yielded no code. Tried in order.
    pub orientations: Vec<u16>,
}

impl Default for IdentifyConfig {
    fn default() -> Self {
        Self {
            render_dpi: 200,
            orientations: Orientation::RETRIES
                .iter()
                .map(|orientation| orientation.degrees())
                .collect(),
        }
    }
}

impl IdentifyConfig {
    pub fn orientation_retries(&self) -> Result<Vec<Orientation>> {
        self.orientations
            .iter()
            .map(|degrees| Orientation::try_from(*degrees))
            .collect()
    }
}

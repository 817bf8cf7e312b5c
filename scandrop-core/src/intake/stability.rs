//! Settling detection for files an external producer may still be writing.
//!
//! [`StabilityTracker`] is a pure state machine fed with size samples and the
//! instant they were taken; [`wait_until_stable`] drives it with
//! `tokio::time`, so tests can run it under a paused clock.

use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tokio::time::{Instant, sleep};
use tracing::trace;

use crate::intake::config::StabilityConfig;

/// One observation of a file on disk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileCandidate {
    pub path: PathBuf,
    pub size: u64,
    pub modified: Option<SystemTime>,
}

/// Source of file observations.
pub trait SizeSampler: Send + Sync {
    /// `Ok(None)` when the file does not exist (any more).
    fn sample(&self, path: &Path) -> io::Result<Option<FileCandidate>>;
}

/// Samples the real filesystem.
#[derive(Clone, Copy, Debug, Default)]
pub struct FsSampler;

impl SizeSampler for FsSampler {
    fn sample(&self, path: &Path) -> io::Result<Option<FileCandidate>> {
        match std::fs::metadata(path) {
            Ok(meta) => Ok(Some(FileCandidate {
                path: path.to_path_buf(),
                size: meta.len(),
                modified: meta.modified().ok(),
            })),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StabilityPhase {
    /// Not yet settled; sample again after the check interval.
    Sampling,
    /// Size unchanged for long enough.
    Stable,
    /// Sampling budget exhausted.
    GaveUp,
    /// The file disappeared while being sampled.
    Vanished,
}

impl StabilityPhase {
    pub fn is_terminal(self) -> bool {
        !matches!(self, StabilityPhase::Sampling)
    }
}

#[derive(Clone, Debug)]
pub struct StabilityTracker {
    config: StabilityConfig,
    last_size: Option<u64>,
    consecutive: u32,
    last_change: Instant,
    attempts: u32,
    phase: StabilityPhase,
}

impl StabilityTracker {
    pub fn new(config: StabilityConfig, now: Instant) -> Self {
        Self {
            config,
            last_size: None,
            consecutive: 0,
            last_change: now,
            attempts: 0,
            phase: StabilityPhase::Sampling,
        }
    }

    /// Feed one sample (`None` = file missing) taken at `now`.
    pub fn observe(&mut self, size: Option<u64>, now: Instant) -> StabilityPhase {
        if self.phase.is_terminal() {
            return self.phase;
        }

        let Some(size) = size else {
            self.phase = StabilityPhase::Vanished;
            return self.phase;
        };

        self.attempts += 1;

        if size > 0 && self.last_size == Some(size) {
            self.consecutive += 1;
            if self.consecutive >= self.config.consecutive_matches
                && now.saturating_duration_since(self.last_change) >= self.config.min_idle()
            {
                self.phase = StabilityPhase::Stable;
                return self.phase;
            }
        } else {
            self.consecutive = 0;
            self.last_change = now;
            self.last_size = Some(size);
        }

        if self.attempts >= self.config.max_attempts {
            self.phase = StabilityPhase::GaveUp;
        }
        self.phase
    }

    pub fn phase(&self) -> StabilityPhase {
        self.phase
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn last_size(&self) -> Option<u64> {
        self.last_size
    }

    /// Time since the size last changed.
    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_change)
    }
}

/// Result of waiting for a file to settle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StabilityOutcome {
    Stable { size: u64, attempts: u32 },
    Unstable { attempts: u32 },
    Vanished,
}

/// Sample `path` until it settles, disappears, or the attempt budget runs out.
pub async fn wait_until_stable(
    path: &Path,
    config: StabilityConfig,
    sampler: &dyn SizeSampler,
) -> io::Result<StabilityOutcome> {
    let mut tracker = StabilityTracker::new(config, Instant::now());

    loop {
        let sample = sampler.sample(path)?;
        let size = sample.as_ref().map(|candidate| candidate.size);
        let phase = tracker.observe(size, Instant::now());
        trace!(
            path = %path.display(),
            size = ?size,
            attempts = tracker.attempts(),
            phase = ?phase,
            "stability sample"
        );

        match phase {
            StabilityPhase::Stable => {
                return Ok(StabilityOutcome::Stable {
                    size: tracker.last_size().unwrap_or_default(),
                    attempts: tracker.attempts(),
                });
            }
            StabilityPhase::GaveUp => {
                return Ok(StabilityOutcome::Unstable {
                    attempts: tracker.attempts(),
                });
            }
            StabilityPhase::Vanished => return Ok(StabilityOutcome::Vanished),
            StabilityPhase::Sampling => sleep(config.check_interval()).await,
        }
    }
}

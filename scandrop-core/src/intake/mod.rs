//! Intake pipeline modules.
//!
//! Files flow one way: the watch loop hands candidates to the worker pool,
//! each worker runs an [`IntakeTask`] that settles, claims, identifies and
//! finally files the document. Nothing but the filesystem feeds back into the
//! watch loop.

pub mod collision;
pub mod config;
pub mod dispatcher;
pub mod identify;
pub mod layout;
pub mod naming;
pub mod stability;
pub mod task;

/// notify-backed watch loop
#[cfg(feature = "watch")]
#[cfg_attr(docsrs, doc(cfg(feature = "watch")))]
pub mod fs_watch;

/// Collaborators that shell out to poppler-utils and zbar
#[cfg(feature = "tool-adapters")]
#[cfg_attr(docsrs, doc(cfg(feature = "tool-adapters")))]
pub mod adapters;

// Re-export key surfaces so downstream code can write `crate::intake::*`.
pub use config::{
    DirectoryConfig, IdentifyConfig, IntakeConfig, PoolConfig, StabilityConfig, WatchConfig,
};
pub use dispatcher::{Dispatcher, DrainReport, SubmitOutcome, WorkerPool};
#[cfg(feature = "watch")]
pub use fs_watch::{CandidateFilter, WatchExit, WatchLoop};
pub use identify::{CodeHit, ContentIdentifier, Orientation, PageImage, PageRenderer, Pages};
pub use layout::IntakeLayout;
pub use naming::{FailureReason, IdentifyingCode};
pub use stability::{FileCandidate, FsSampler, SizeSampler, StabilityOutcome};
pub use task::{IntakeContext, IntakeTask, TaskOutcome};

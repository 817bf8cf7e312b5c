//! The per-file unit of work.
//!
//! A task settles the file, claims it by moving it into `processing`, asks
//! the collaborators for a code and files it under `finished` or `failed`.
//! Every error below the task boundary ends in a relocation, never a
//! deletion.

use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::error::{IntakeError, Result};
use crate::intake::collision;
use crate::intake::config::IntakeConfig;
use crate::intake::identify::{ContentIdentifier, Orientation, PageRenderer, scan_document};
use crate::intake::layout::IntakeLayout;
use crate::intake::naming::{
    FailureReason, IdentifyingCode, failure_base_name, file_extension, file_stem,
};
use crate::intake::stability::{FsSampler, SizeSampler, StabilityOutcome, wait_until_stable};

/// Everything a task needs, shared by every task of a pool.
pub struct IntakeContext {
    layout: IntakeLayout,
    config: Arc<IntakeConfig>,
    renderer: Arc<dyn PageRenderer>,
    identifier: Arc<dyn ContentIdentifier>,
    sampler: Arc<dyn SizeSampler>,
    orientations: Vec<Orientation>,
}

impl IntakeContext {
    /// Validates `config` and samples file sizes from the real filesystem.
    pub fn new(
        layout: IntakeLayout,
        config: Arc<IntakeConfig>,
        renderer: Arc<dyn PageRenderer>,
        identifier: Arc<dyn ContentIdentifier>,
    ) -> Result<Self> {
        config.validate()?;
        let orientations = config.identify.orientation_retries()?;
        Ok(Self {
            layout,
            config,
            renderer,
            identifier,
            sampler: Arc::new(FsSampler),
            orientations,
        })
    }

    pub fn with_sampler(mut self, sampler: Arc<dyn SizeSampler>) -> Self {
        self.sampler = sampler;
        self
    }

    pub fn layout(&self) -> &IntakeLayout {
        &self.layout
    }

    pub fn config(&self) -> &IntakeConfig {
        &self.config
    }
}

impl fmt::Debug for IntakeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntakeContext")
            .field("layout", &self.layout)
            .field("config", &self.config)
            .field("renderer", &std::any::type_name_of_val(self.renderer.as_ref()))
            .field(
                "identifier",
                &std::any::type_name_of_val(self.identifier.as_ref()),
            )
            .field("orientations", &self.orientations)
            .finish()
    }
}

/// How a task ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TaskOutcome {
    /// Filed under `finished`.
    Finished { code: IdentifyingCode, path: PathBuf },
    /// Filed under `failed`; `path` is `None` when the file could not be moved.
    Failed {
        reason: FailureReason,
        path: Option<PathBuf>,
    },
    /// The file disappeared before the task could claim it.
    Abandoned,
}

/// One detected file.
#[derive(Clone, Debug)]
pub struct IntakeTask {
    id: Uuid,
    source: PathBuf,
}

impl IntakeTask {
    pub fn new(source: PathBuf) -> Self {
        Self {
            id: Uuid::now_v7(),
            source,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Run to completion. Never fails: errors and panics are logged and the
    /// file, wherever it currently is, is routed to `failed` with
    /// [`FailureReason::Exception`].
    pub async fn run(self, ctx: Arc<IntakeContext>) -> TaskOutcome {
        let span = info_span!(
            "intake_task",
            task_id = %self.id,
            path = %self.source.display()
        );
        async move {
            let mut current = self.source.clone();
            let result = AssertUnwindSafe(self.process(&ctx, &mut current))
                .catch_unwind()
                .await;
            let outcome = match result {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(err)) => {
                    error!(path = %current.display(), error = %err, "intake failed");
                    route_to_failed(&ctx.layout, &current, &self.source, FailureReason::Exception)
                }
                Err(panic) => {
                    error!(
                        path = %current.display(),
                        panic = %panic_message(panic.as_ref()),
                        "intake panicked"
                    );
                    route_to_failed(&ctx.layout, &current, &self.source, FailureReason::Exception)
                }
            };
            log_outcome(&outcome);
            outcome
        }
        .instrument(span)
        .await
    }

    async fn process(&self, ctx: &Arc<IntakeContext>, current: &mut PathBuf) -> Result<TaskOutcome> {
        let stability =
            wait_until_stable(&self.source, ctx.config.stability, ctx.sampler.as_ref())
                .await
                .map_err(|err| IntakeError::at_path(&self.source, err))?;

        match stability {
            StabilityOutcome::Stable { size, attempts } => {
                debug!(size, attempts, "file settled");
            }
            StabilityOutcome::Unstable { attempts } => {
                warn!(attempts, "file never settled");
                return Ok(route_to_failed(
                    &ctx.layout,
                    &self.source,
                    &self.source,
                    FailureReason::Unstable,
                ));
            }
            StabilityOutcome::Vanished => {
                debug!("file vanished while settling");
                return Ok(TaskOutcome::Abandoned);
            }
        }

        let Some(claimed) = self.claim(&ctx.layout)? else {
            return Ok(TaskOutcome::Abandoned);
        };
        *current = claimed.clone();

        let started = Instant::now();
        let scan = {
            let ctx = Arc::clone(ctx);
            let document = claimed.clone();
            tokio::task::spawn_blocking(move || {
                scan_document(
                    ctx.renderer.as_ref(),
                    ctx.identifier.as_ref(),
                    &document,
                    ctx.config.identify.render_dpi,
                    &ctx.orientations,
                )
            })
            .await
            .map_err(|err| IntakeError::Internal(format!("identification aborted: {err}")))??
        };
        info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            found = scan.is_some(),
            "extraction finished"
        );

        let Some(hit) = scan else {
            return Ok(route_to_failed(
                &ctx.layout,
                &claimed,
                &self.source,
                FailureReason::NoBarcode,
            ));
        };

        let Some(code) = IdentifyingCode::sanitize(&hit.raw) else {
            warn!(raw = ?hit.raw, "code is empty after sanitizing");
            return Ok(route_to_failed(
                &ctx.layout,
                &claimed,
                &self.source,
                FailureReason::EmptyBarcode,
            ));
        };

        let extension = file_extension(&self.source);
        let path = collision::relocate(
            &claimed,
            ctx.layout.finished(),
            code.as_str(),
            &extension,
        )?;
        *current = path.clone();
        Ok(TaskOutcome::Finished { code, path })
    }

    /// Move the source into `processing`. `None` when another task (or the
    /// producer) got there first.
    fn claim(&self, layout: &IntakeLayout) -> Result<Option<PathBuf>> {
        if !self.source.exists() {
            debug!("file gone before claim");
            return Ok(None);
        }

        match collision::relocate(
            &self.source,
            layout.processing(),
            &file_stem(&self.source),
            &file_extension(&self.source),
        ) {
            Ok(claimed) => {
                debug!(processing = %claimed.display(), "file claimed");
                Ok(Some(claimed))
            }
            Err(err) if err.is_not_found() => {
                debug!("lost the claim race");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }
}

/// File `current` under `failed` as `<stem>_<reason>[_N].<ext>`, taking stem
/// and extension from `named_after`.
pub(crate) fn file_failure(
    layout: &IntakeLayout,
    current: &Path,
    named_after: &Path,
    reason: FailureReason,
) -> Option<PathBuf> {
    if !current.exists() {
        warn!(path = %current.display(), %reason, "file gone before it could be failed");
        return None;
    }

    match collision::relocate(
        current,
        layout.failed(),
        &failure_base_name(named_after, reason),
        &file_extension(named_after),
    ) {
        Ok(path) => Some(path),
        Err(err) => {
            error!(
                path = %current.display(),
                %reason,
                error = %err,
                "failed to move file into the failed directory"
            );
            None
        }
    }
}

fn route_to_failed(
    layout: &IntakeLayout,
    current: &Path,
    named_after: &Path,
    reason: FailureReason,
) -> TaskOutcome {
    TaskOutcome::Failed {
        reason,
        path: file_failure(layout, current, named_after, reason),
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

fn log_outcome(outcome: &TaskOutcome) {
    match outcome {
        TaskOutcome::Finished { code, path } => {
            info!(%code, destination = %path.display(), "file finished");
        }
        TaskOutcome::Failed {
            reason,
            path: Some(path),
        } => {
            warn!(%reason, destination = %path.display(), "file failed");
        }
        TaskOutcome::Failed { reason, path: None } => {
            warn!(%reason, "file failed and could not be moved");
        }
        TaskOutcome::Abandoned => debug!("task abandoned"),
    }
}

//! Notification loop over the `incoming` directory.
//!
//! `notify` delivers raw events on its own thread; they are forwarded into a
//! bounded channel and consumed here with a bounded wait, so the loop checks
//! for cancellation and for a vanished `incoming` at least once per poll
//! timeout. An optional periodic sweep re-lists `incoming` to pick up files
//! whose notifications were lost.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use notify::event::{CreateKind, EventKind, ModifyKind, RenameMode};
use notify::{Config as NotifyConfig, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::time::{Interval, MissedTickBehavior, interval, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::error::{IntakeError, Result};
use crate::intake::config::WatchConfig;
use crate::intake::dispatcher::{Dispatcher, SubmitOutcome};
use crate::intake::layout::IntakeLayout;

/// Why the loop returned.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WatchExit {
    /// The cancellation token fired.
    Cancelled,
    /// The watch on `incoming` is no longer valid.
    WatchLost(String),
}

/// Decides from the name alone whether a path is worth a task.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CandidateFilter {
    extensions: Vec<String>,
    ignored_prefixes: Vec<String>,
}

impl CandidateFilter {
    pub fn new(config: &WatchConfig) -> Self {
        Self {
            extensions: config.accepted_extensions(),
            ignored_prefixes: config
                .ignored_prefixes
                .iter()
                .filter(|prefix| !prefix.is_empty())
                .cloned()
                .collect(),
        }
    }

    pub fn accepts(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
            return false;
        };
        if self
            .ignored_prefixes
            .iter()
            .any(|prefix| name.starts_with(prefix.as_str()))
        {
            return false;
        }
        match name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => self
                .extensions
                .iter()
                .any(|accepted| accepted.eq_ignore_ascii_case(ext)),
            _ => false,
        }
    }
}

enum WatchMessage {
    Event(Event),
    Error(String),
}

impl fmt::Debug for WatchMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WatchMessage::Event(event) => f
                .debug_struct("WatchMessage::Event")
                .field("kind", &event.kind)
                .field("path_count", &event.paths.len())
                .finish(),
            WatchMessage::Error(message) => f
                .debug_struct("WatchMessage::Error")
                .field("message", message)
                .finish(),
        }
    }
}

/// What a single notification asks the loop to do.
#[derive(Debug, PartialEq, Eq)]
enum EventAction {
    Candidates(Vec<PathBuf>),
    Rescan,
    RootRemoved,
    Ignore,
}

fn classify_event(event: &Event, root: &Path) -> EventAction {
    if event.need_rescan() {
        return EventAction::Rescan;
    }

    match &event.kind {
        EventKind::Create(CreateKind::Folder) => EventAction::Ignore,
        EventKind::Create(_)
        | EventKind::Modify(ModifyKind::Name(RenameMode::To | RenameMode::Any)) => {
            EventAction::Candidates(event.paths.clone())
        }
        // Paths are `[from, to]`; only the destination is new.
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            EventAction::Candidates(event.paths.iter().skip(1).cloned().collect())
        }
        EventKind::Remove(_) if event.paths.iter().any(|path| path == root) => {
            EventAction::RootRemoved
        }
        EventKind::Other => EventAction::Rescan,
        _ => EventAction::Ignore,
    }
}

/// Smallest size the submitted set may reach before it is pruned outside of
/// idle ticks and sweeps.
const PRUNE_FLOOR: usize = 256;

/// Watches `incoming` and feeds accepted files to a [`Dispatcher`].
pub struct WatchLoop {
    incoming: PathBuf,
    config: WatchConfig,
    filter: CandidateFilter,
    dispatcher: Dispatcher,
    /// Paths handed to the pool that may still sit in `incoming`, with the
    /// modification time seen at submission. A later notification for the
    /// same unchanged file is a duplicate.
    submitted: HashMap<PathBuf, Option<SystemTime>>,
    prune_at: usize,
}

impl fmt::Debug for WatchLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchLoop")
            .field("incoming", &self.incoming)
            .field("filter", &self.filter)
            .field("poll_timeout", &self.config.poll_timeout())
            .field("sweep_interval", &self.config.sweep_interval())
            .field("submitted", &self.submitted.len())
            .finish()
    }
}

impl WatchLoop {
    pub fn new(layout: &IntakeLayout, config: WatchConfig, dispatcher: Dispatcher) -> Self {
        Self {
            incoming: layout.incoming().to_path_buf(),
            filter: CandidateFilter::new(&config),
            config,
            dispatcher,
            submitted: HashMap::new(),
            prune_at: PRUNE_FLOOR,
        }
    }

    /// Run until `cancel` fires or the watch is lost.
    ///
    /// Failing to register the watch at all is an error; losing it later is
    /// reported as [`WatchExit::WatchLost`].
    pub async fn run(mut self, cancel: CancellationToken) -> Result<WatchExit> {
        let (tx, mut rx) = mpsc::channel(self.config.event_buffer.max(16));
        let watcher = init_watcher(&self.incoming, tx)?;
        let poll_timeout = self.config.poll_timeout();
        let mut sweep = self.config.sweep_interval().map(|period| {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });

        info!(
            incoming = %self.incoming.display(),
            poll_timeout_ms = poll_timeout.as_millis() as u64,
            sweep = sweep.is_some(),
            "watching for new files"
        );

        let exit = loop {
            let wake = tokio::select! {
                biased;
                _ = cancel.cancelled() => Wake::Cancelled,
                _ = next_sweep(&mut sweep) => Wake::Sweep,
                received = timeout(poll_timeout, rx.recv()) => match received {
                    Ok(message) => Wake::Message(message),
                    Err(_) => Wake::Idle,
                },
            };

            match wake {
                Wake::Cancelled => {
                    info!("watch loop cancelled");
                    break WatchExit::Cancelled;
                }
                Wake::Sweep => self.sweep(),
                Wake::Idle => {
                    if let Some(exit) = self.on_idle() {
                        break exit;
                    }
                }
                Wake::Message(None) => break self.lost("notifier stopped"),
                Wake::Message(Some(WatchMessage::Error(message))) => {
                    warn!(error = %message, "watcher reported an error");
                    if !self.incoming.is_dir() {
                        break self.lost(&message);
                    }
                    self.on_overflow(sweep.is_some());
                }
                Wake::Message(Some(WatchMessage::Event(event))) => {
                    match classify_event(&event, &self.incoming) {
                        EventAction::Candidates(paths) => {
                            for path in paths {
                                self.consider(path);
                            }
                        }
                        EventAction::Rescan => self.on_overflow(sweep.is_some()),
                        EventAction::RootRemoved => {
                            break self.lost("incoming directory was removed");
                        }
                        EventAction::Ignore => trace!(kind = ?event.kind, "event ignored"),
                    }
                }
            }
        };

        drop(watcher);
        Ok(exit)
    }

    fn lost(&self, reason: &str) -> WatchExit {
        error!(incoming = %self.incoming.display(), reason, "watch lost");
        WatchExit::WatchLost(reason.to_string())
    }

    fn on_idle(&mut self) -> Option<WatchExit> {
        if !self.incoming.is_dir() {
            return Some(self.lost("incoming directory no longer exists"));
        }
        self.prune();
        None
    }

    /// Forget submissions whose file has left `incoming`.
    fn prune(&mut self) {
        let before = self.submitted.len();
        self.submitted.retain(|path, _| path.exists());
        let pruned = before - self.submitted.len();
        if pruned > 0 {
            trace!(pruned, pending = self.submitted.len(), "submitted set pruned");
        }
    }

    fn already_submitted(&self, path: &Path, modified: Option<SystemTime>) -> bool {
        self.submitted.get(path) == Some(&modified)
    }

    fn on_overflow(&mut self, sweep_enabled: bool) {
        if sweep_enabled {
            warn!("notifications overflowed; sweeping incoming now");
            self.sweep();
        } else {
            warn!("notifications overflowed; some files may need to be re-dropped");
        }
    }

    /// Submit a live notification unless the same unchanged file was already
    /// submitted (a rename is reported more than once on some platforms).
    fn consider(&mut self, path: PathBuf) {
        if path.parent() != Some(self.incoming.as_path()) {
            trace!(path = %path.display(), "outside incoming");
            return;
        }
        if !self.filter.accepts(&path) {
            trace!(path = %path.display(), "not a candidate");
            return;
        }
        let modified = match std::fs::metadata(&path) {
            Ok(meta) if meta.is_file() => meta.modified().ok(),
            Ok(_) => {
                trace!(path = %path.display(), "not a regular file");
                return;
            }
            Err(_) => {
                trace!(path = %path.display(), "gone before submission");
                return;
            }
        };
        if self.already_submitted(&path, modified) {
            debug!(path = %path.display(), "duplicate notification ignored");
            return;
        }
        self.submit(path, modified);
    }

    fn submit(&mut self, path: PathBuf, modified: Option<SystemTime>) {
        match self.dispatcher.submit(path.clone()) {
            SubmitOutcome::Accepted => {
                debug!(path = %path.display(), "file submitted");
                self.submitted.insert(path, modified);
                if self.submitted.len() >= self.prune_at {
                    self.prune();
                    self.prune_at = (self.submitted.len() * 2).max(PRUNE_FLOOR);
                }
            }
            SubmitOutcome::QueueFull(_) => {}
            SubmitOutcome::Closed => {
                warn!(path = %path.display(), "pool closed; file left in incoming");
            }
        }
    }

    /// Re-list `incoming` and submit accepted files this loop has not
    /// submitted yet.
    fn sweep(&mut self) {
        self.prune();

        let entries = match std::fs::read_dir(&self.incoming) {
            Ok(entries) => entries,
            Err(err) => {
                warn!(incoming = %self.incoming.display(), error = %err, "sweep failed");
                return;
            }
        };

        let mut found = 0usize;
        for entry in entries.flatten() {
            let path = entry.path();
            let Ok(meta) = entry.metadata() else {
                continue;
            };
            let modified = meta.modified().ok();
            if !meta.is_file()
                || !self.filter.accepts(&path)
                || self.already_submitted(&path, modified)
            {
                continue;
            }
            found += 1;
            self.submit(path, modified);
        }

        if found > 0 {
            info!(found, "sweep picked up unsubmitted files");
        } else {
            trace!("sweep found nothing new");
        }
    }
}

enum Wake {
    Cancelled,
    Sweep,
    Idle,
    Message(Option<WatchMessage>),
}

async fn next_sweep(sweep: &mut Option<Interval>) {
    match sweep {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

fn init_watcher(root: &Path, tx: mpsc::Sender<WatchMessage>) -> Result<RecommendedWatcher> {
    let root_display = root.to_path_buf();
    let mut watcher = RecommendedWatcher::new(
        move |res: std::result::Result<Event, notify::Error>| {
            let message = match res {
                Ok(event) => WatchMessage::Event(event),
                Err(err) => WatchMessage::Error(err.to_string()),
            };
            if let Err(err) = tx.blocking_send(message) {
                debug!(
                    root = %root_display.display(),
                    error = %err,
                    "watch channel closed; dropping notification"
                );
            }
        },
        NotifyConfig::default(),
    )
    .map_err(|err| IntakeError::Watch(format!("failed to create watcher: {err}")))?;

    watcher
        .watch(root, RecursiveMode::NonRecursive)
        .map_err(|err| IntakeError::Watch(format!("failed to watch {}: {err}", root.display())))?;

    Ok(watcher)
}

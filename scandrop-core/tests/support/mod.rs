//! Shared fixtures for intake integration tests.

#![allow(dead_code)]

pub mod fakes;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use scandrop_core::intake::{
    ContentIdentifier, DirectoryConfig, IntakeConfig, IntakeContext, IntakeLayout, PageRenderer,
    StabilityConfig,
};
use tempfile::TempDir;

/// Upper bound for any single pipeline wait in these tests.
pub const PIPELINE_TIMEOUT: Duration = Duration::from_secs(15);

/// Temp directory tree plus a context wired to fake collaborators.
pub struct Harness {
    _root: TempDir,
    pub config: IntakeConfig,
    pub layout: IntakeLayout,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    pub fn with_config(tweak: impl FnOnce(&mut IntakeConfig)) -> Self {
        let root = tempfile::tempdir().expect("temp root");
        let mut config = fast_config(root.path());
        tweak(&mut config);
        let layout = IntakeLayout::prepare(&config.directories).expect("layout");
        Self {
            _root: root,
            config,
            layout,
        }
    }

    pub fn context(
        &self,
        renderer: Arc<dyn PageRenderer>,
        identifier: Arc<dyn ContentIdentifier>,
    ) -> Arc<IntakeContext> {
        Arc::new(
            IntakeContext::new(
                self.layout.clone(),
                Arc::new(self.config.clone()),
                renderer,
                identifier,
            )
            .expect("context"),
        )
    }

    /// Write a small non-empty document into `incoming`.
    pub fn drop_file(&self, name: &str) -> PathBuf {
        let path = self.layout.incoming().join(name);
        std::fs::write(&path, b"%PDF-1.4\n% scandrop test document\n").expect("write drop");
        path
    }

    pub fn incoming(&self) -> Vec<String> {
        list(self.layout.incoming())
    }

    pub fn processing(&self) -> Vec<String> {
        list(self.layout.processing())
    }

    pub fn finished(&self) -> Vec<String> {
        list(self.layout.finished())
    }

    pub fn failed(&self) -> Vec<String> {
        list(self.layout.failed())
    }
}

/// Defaults with timings shrunk so a file settles in well under a second.
pub fn fast_config(root: &Path) -> IntakeConfig {
    let mut config = IntakeConfig::default();
    config.directories = DirectoryConfig {
        incoming: root.join("incoming"),
        processing: root.join("processing"),
        finished: root.join("finished"),
        failed: root.join("failed"),
    };
    config.stability = StabilityConfig {
        check_interval_ms: 20,
        min_idle_ms: 40,
        max_attempts: 50,
        consecutive_matches: 2,
    };
    config.watch.poll_timeout_ms = 100;
    config.pool.workers = 2;
    config.pool.queue_capacity = 16;
    config.pool.shutdown_grace_ms = 5_000;
    config
}

/// Sorted file names in `dir`.
pub fn list(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .expect("read dir")
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

/// Poll `condition` until it holds or [`PIPELINE_TIMEOUT`] elapses.
pub async fn wait_for(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + PIPELINE_TIMEOUT;
    while !condition() {
        if tokio::time::Instant::now() >= deadline {
            panic!("timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

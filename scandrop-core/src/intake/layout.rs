//! The four directories a file travels through.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use tracing::debug;

use crate::error::{IntakeError, Result};
use crate::intake::config::DirectoryConfig;

/// Resolved, existing and mutually disjoint intake directories.
///
/// Only constructed through [`IntakeLayout::prepare`], so holders can rely on
/// every path being absolute and present at startup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IntakeLayout {
    incoming: PathBuf,
    processing: PathBuf,
    finished: PathBuf,
    failed: PathBuf,
}

impl IntakeLayout {
    /// Resolve all four paths, reject layouts where two roles share (or nest
    /// inside) the same location, then create whatever is missing.
    ///
    /// Nothing is created when the layout is rejected.
    pub fn prepare(config: &DirectoryConfig) -> Result<Self> {
        let roles = [
            ("incoming", &config.incoming),
            ("processing", &config.processing),
            ("finished", &config.finished),
            ("failed", &config.failed),
        ];

        let mut resolved = Vec::with_capacity(roles.len());
        for (role, path) in roles {
            resolved.push((role, path.as_path(), resolve_target(path)?));
        }

        for (i, (role_a, _, a)) in resolved.iter().enumerate() {
            for (role_b, _, b) in resolved.iter().skip(i + 1) {
                if a == b {
                    return Err(IntakeError::Layout(format!(
                        "{role_a} and {role_b} both resolve to {}",
                        a.display()
                    )));
                }
                if a.starts_with(b) || b.starts_with(a) {
                    return Err(IntakeError::Layout(format!(
                        "{role_a} ({}) and {role_b} ({}) overlap",
                        a.display(),
                        b.display()
                    )));
                }
            }
        }

        let mut prepared = Vec::with_capacity(resolved.len());
        for (role, path, _) in resolved {
            fs::create_dir_all(path).map_err(|err| IntakeError::at_path(path, err))?;
            let canonical = fs::canonicalize(path).map_err(|err| IntakeError::at_path(path, err))?;
            if !canonical.is_dir() {
                return Err(IntakeError::Layout(format!(
                    "{role} directory {} is not a directory",
                    canonical.display()
                )));
            }
            debug!(role, path = %canonical.display(), "intake directory ready");
            prepared.push(canonical);
        }

        let mut paths = prepared.into_iter();
        match (paths.next(), paths.next(), paths.next(), paths.next()) {
            (Some(incoming), Some(processing), Some(finished), Some(failed)) => Ok(Self {
                incoming,
                processing,
                finished,
                failed,
            }),
            _ => Err(IntakeError::Internal(
                "directory layout resolution lost a role".into(),
            )),
        }
    }

    pub fn incoming(&self) -> &Path {
        &self.incoming
    }

    pub fn processing(&self) -> &Path {
        &self.processing
    }

    pub fn finished(&self) -> &Path {
        &self.finished
    }

    pub fn failed(&self) -> &Path {
        &self.failed
    }
}

/// Where `path` will live once created: the deepest existing ancestor is
/// canonicalized and the missing components are appended to it.
fn resolve_target(path: &Path) -> Result<PathBuf> {
    let absolute = lexically_normalize(
        &std::path::absolute(path).map_err(|err| IntakeError::at_path(path, err))?,
    );

    let mut existing = absolute.as_path();
    let mut missing = Vec::new();
    loop {
        match fs::canonicalize(existing) {
            Ok(mut resolved) => {
                resolved.extend(missing.iter().rev());
                return Ok(resolved);
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                match (existing.parent(), existing.file_name()) {
                    (Some(parent), Some(name)) => {
                        missing.push(name);
                        existing = parent;
                    }
                    _ => return Err(IntakeError::at_path(existing, err)),
                }
            }
            Err(err) => return Err(IntakeError::at_path(existing, err)),
        }
    }
}

/// Drop `.` and fold `..` without touching the filesystem.
fn lexically_normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other),
        }
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_in(root: &Path) -> DirectoryConfig {
        DirectoryConfig {
            incoming: root.join("in"),
            processing: root.join("work"),
            finished: root.join("done"),
            failed: root.join("failed"),
        }
    }

    #[test]
    fn prepare_creates_missing_directories() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = IntakeLayout::prepare(&config_in(tmp.path())).unwrap();

        for dir in [
            layout.incoming(),
            layout.processing(),
            layout.finished(),
            layout.failed(),
        ] {
            assert!(dir.is_dir(), "{} should exist", dir.display());
            assert!(dir.is_absolute());
        }
    }

    #[test]
    fn prepare_rejects_shared_directories() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = config_in(tmp.path());
        config.failed = tmp.path().join("done/../done");

        let err = IntakeLayout::prepare(&config).unwrap_err();
        assert!(matches!(err, IntakeError::Layout(_)), "got {err}");
    }

    #[test]
    fn prepare_rejects_nested_directories() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = config_in(tmp.path());
        config.processing = tmp.path().join("in/work");

        let err = IntakeLayout::prepare(&config).unwrap_err();
        assert!(matches!(err, IntakeError::Layout(_)), "got {err}");
    }

    #[test]
    fn rejected_layout_creates_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = config_in(tmp.path());
        config.failed = tmp.path().join("in/./failed");

        let err = IntakeLayout::prepare(&config).unwrap_err();
        assert!(matches!(err, IntakeError::Layout(_)), "got {err}");
        for dir in ["in", "work", "done", "failed"] {
            assert!(!tmp.path().join(dir).exists(), "{dir} was created");
        }
    }

    #[cfg(unix)]
    #[test]
    fn overlap_is_seen_through_symlinked_parents() {
        let tmp = tempfile::tempdir().unwrap();
        let real = tmp.path().join("real");
        fs::create_dir(&real).unwrap();
        let alias = tmp.path().join("alias");
        std::os::unix::fs::symlink(&real, &alias).unwrap();

        let config = DirectoryConfig {
            incoming: real.join("in"),
            processing: alias.join("in/work"),
            finished: real.join("done"),
            failed: real.join("failed"),
        };
        let err = IntakeLayout::prepare(&config).unwrap_err();
        assert!(matches!(err, IntakeError::Layout(_)), "got {err}");
        assert!(!real.join("in").exists());
    }
}

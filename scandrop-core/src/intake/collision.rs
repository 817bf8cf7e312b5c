//! Collision-free destination names.
//!
//! `resolve` is the plain "first unused name" lookup. Moves go through
//! [`reserve`] instead: the destination is claimed with an exclusive create
//! before the source is renamed over it, so two tasks racing for the same
//! code can never land on the same path.

use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{IntakeError, Result};

/// Suffixes tried before giving up on a base name.
pub const MAX_SUFFIX: u32 = 100_000;

/// `base.ext` for `n == 0`, `base_n.ext` otherwise.
pub fn candidate_name(base: &str, extension: &str, n: u32) -> String {
    match n {
        0 => format!("{base}.{extension}"),
        n => format!("{base}_{n}.{extension}"),
    }
}

/// First unused `base[_N].ext` in `dir`, without claiming it.
///
/// Another writer may take the name before the caller uses it; use
/// [`reserve`] when the result is about to be written.
pub fn resolve(dir: &Path, base: &str, extension: &str) -> Result<PathBuf> {
    for n in 0..=MAX_SUFFIX {
        let candidate = dir.join(candidate_name(base, extension, n));
        if !candidate.exists() {
            return Ok(candidate);
        }
    }
    Err(exhausted(dir, base, extension))
}

/// Claim the first unused `base[_N].ext` in `dir` by creating an empty
/// placeholder exclusively.
pub fn reserve(dir: &Path, base: &str, extension: &str) -> Result<Reservation> {
    for n in 0..=MAX_SUFFIX {
        let candidate = dir.join(candidate_name(base, extension, n));
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&candidate)
        {
            Ok(_) => {
                return Ok(Reservation {
                    path: candidate,
                    armed: true,
                });
            }
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(err) => return Err(IntakeError::at_path(candidate, err)),
        }
    }
    Err(exhausted(dir, base, extension))
}

/// Move `source` into `dir` under the first free `base[_N].ext`.
pub fn relocate(source: &Path, dir: &Path, base: &str, extension: &str) -> Result<PathBuf> {
    reserve(dir, base, extension)?.fill_from(source)
}

/// A destination claimed by an empty placeholder file. Dropping it unused
/// removes the placeholder.
#[derive(Debug)]
pub struct Reservation {
    path: PathBuf,
    armed: bool,
}

impl Reservation {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Move `source` onto the reserved path, replacing only the placeholder.
    pub fn fill_from(mut self, source: &Path) -> Result<PathBuf> {
        match fs::rename(source, &self.path) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::CrossesDevices => {
                debug!(
                    source = %source.display(),
                    target = %self.path.display(),
                    "rename crosses devices; copying instead"
                );
                fs::copy(source, &self.path).map_err(|err| IntakeError::at_path(source, err))?;
                if let Err(err) = fs::remove_file(source) {
                    // Keep a single copy: the source is still authoritative.
                    let _ = fs::remove_file(&self.path);
                    return Err(IntakeError::at_path(source, err));
                }
            }
            Err(err) => return Err(IntakeError::at_path(source, err)),
        }
        self.armed = false;
        Ok(std::mem::take(&mut self.path))
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if self.armed
            && let Err(err) = fs::remove_file(&self.path)
            && err.kind() != io::ErrorKind::NotFound
        {
            warn!(
                path = %self.path.display(),
                error = %err,
                "failed to release unused destination placeholder"
            );
        }
    }
}

fn exhausted(dir: &Path, base: &str, extension: &str) -> IntakeError {
    IntakeError::Internal(format!(
        "no free name for {base}.{extension} in {} after {MAX_SUFFIX} suffixes",
        dir.display()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::{Arc, Barrier};

    #[test]
    fn resolve_returns_bare_name_when_free() {
        let dir = tempfile::tempdir().unwrap();
        let path = resolve(dir.path(), "CODE", "pdf").unwrap();
        assert_eq!(path, dir.path().join("CODE.pdf"));
    }

    #[test]
    fn resolve_suffixes_monotonically() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("CODE.pdf"), b"a").unwrap();
        assert_eq!(
            resolve(dir.path(), "CODE", "pdf").unwrap(),
            dir.path().join("CODE_1.pdf")
        );

        fs::write(dir.path().join("CODE_1.pdf"), b"b").unwrap();
        assert_eq!(
            resolve(dir.path(), "CODE", "pdf").unwrap(),
            dir.path().join("CODE_2.pdf")
        );
    }

    #[test]
    fn relocate_never_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let target_dir = dir.path().join("finished");
        fs::create_dir(&target_dir).unwrap();
        fs::write(target_dir.join("CODE.pdf"), b"existing").unwrap();

        let source = dir.path().join("scan.pdf");
        fs::write(&source, b"incoming").unwrap();

        let moved = relocate(&source, &target_dir, "CODE", "pdf").unwrap();
        assert_eq!(moved, target_dir.join("CODE_1.pdf"));
        assert!(!source.exists());
        assert_eq!(fs::read(target_dir.join("CODE.pdf")).unwrap(), b"existing");
        assert_eq!(fs::read(&moved).unwrap(), b"incoming");
    }

    #[test]
    fn dropped_reservation_releases_the_name() {
        let dir = tempfile::tempdir().unwrap();
        let reservation = reserve(dir.path(), "CODE", "pdf").unwrap();
        assert!(reservation.path().exists());
        drop(reservation);
        assert!(!dir.path().join("CODE.pdf").exists());
    }

    #[test]
    fn failed_fill_keeps_source_and_releases_placeholder() {
        let dir = tempfile::tempdir().unwrap();
        let reservation = reserve(dir.path(), "CODE", "pdf").unwrap();
        let missing = dir.path().join("missing.pdf");

        let err = reservation.fill_from(&missing).unwrap_err();
        assert!(err.is_not_found());
        assert!(!dir.path().join("CODE.pdf").exists());
    }

    #[test]
    fn concurrent_reservations_get_distinct_names() {
        let dir = Arc::new(tempfile::tempdir().unwrap());
        let contenders = 8;
        let barrier = Arc::new(Barrier::new(contenders));

        let handles: Vec<_> = (0..contenders)
            .map(|_| {
                let dir = Arc::clone(&dir);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    let reservation = reserve(dir.path(), "CODE", "pdf").unwrap();
                    let path = reservation.path().to_path_buf();
                    std::mem::forget(reservation);
                    path
                })
            })
            .collect();

        let names: HashSet<PathBuf> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(names.len(), contenders);
        assert!(names.contains(&dir.path().join("CODE.pdf")));
    }
}

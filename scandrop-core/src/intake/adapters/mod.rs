//! Collaborators backed by external command-line tools.
//!
//! Rendering goes through poppler-utils (`pdfinfo`, `pdftoppm`) and decoding
//! through zbar (`zbarimg`). Both are found on `PATH` unless an explicit
//! binary path is configured.

mod poppler;
mod zbar;

pub use poppler::PopplerRenderer;
pub use zbar::{DEFAULT_SYMBOLOGIES, ZbarIdentifier};

use std::path::Path;
use std::process::{Command, Output, Stdio};

use crate::error::{IntakeError, Result};

/// Run `tool` with a harmless flag to confirm it is installed and starts.
fn check_tool(tool: &Path, flag: &str) -> Result<()> {
    let output = Command::new(tool)
        .arg(flag)
        .stdin(Stdio::null())
        .output()
        .map_err(|err| IntakeError::Config(format!("cannot run {}: {err}", tool.display())))?;

    if output.status.success() {
        Ok(())
    } else {
        Err(IntakeError::Config(format!(
            "{} {flag} exited with {}: {}",
            tool.display(),
            output.status,
            stderr_summary(&output)
        )))
    }
}

/// First line of stderr, for error messages.
fn stderr_summary(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr)
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("no diagnostic output")
        .to_string()
}

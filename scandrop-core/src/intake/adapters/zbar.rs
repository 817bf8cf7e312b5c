use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;

use image::ImageFormat;
use tracing::{trace, warn};

use super::{check_tool, stderr_summary};
use crate::error::{IntakeError, Result};
use crate::intake::identify::{ContentIdentifier, PageImage};

/// `zbarimg` exit status when the image was scanned but held no symbol.
const EXIT_NO_SYMBOL: i32 = 4;

/// Symbologies decoded unless configured otherwise. Everything else stays
/// disabled to keep stray printed patterns from being read as codes.
pub const DEFAULT_SYMBOLOGIES: &[&str] = &["qrcode", "code128", "ean13", "pdf417"];

/// Decodes barcodes with zbar's `zbarimg`.
#[derive(Clone, Debug)]
pub struct ZbarIdentifier {
    zbarimg: PathBuf,
    symbologies: Vec<String>,
}

impl Default for ZbarIdentifier {
    fn default() -> Self {
        Self::new("zbarimg")
    }
}

impl ZbarIdentifier {
    pub fn new(zbarimg: impl Into<PathBuf>) -> Self {
        Self {
            zbarimg: zbarimg.into(),
            symbologies: DEFAULT_SYMBOLOGIES.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Restrict decoding to these zbar symbology names (`qrcode`, `ean13`, ...).
    pub fn with_symbologies<I, S>(mut self, symbologies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.symbologies = symbologies.into_iter().map(Into::into).collect();
        self
    }

    /// Fails when `zbarimg` cannot be run.
    pub fn check(&self) -> Result<()> {
        check_tool(&self.zbarimg, "--version")
    }

    fn decode_args(&self, image: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["--raw".into(), "-q".into()];
        if !self.symbologies.is_empty() {
            args.push("-Sdisable".into());
            args.extend(
                self.symbologies
                    .iter()
                    .map(|symbology| OsString::from(format!("-S{symbology}.enable"))),
            );
        }
        args.push(image.as_os_str().to_owned());
        args
    }
}

impl ContentIdentifier for ZbarIdentifier {
    fn identify(&self, image: &PageImage) -> Result<Option<String>> {
        let scratch = tempfile::Builder::new()
            .prefix("scandrop-page-")
            .suffix(".png")
            .tempfile()?;
        image.save_with_format(scratch.path(), ImageFormat::Png)?;

        let output = Command::new(&self.zbarimg)
            .args(self.decode_args(scratch.path()))
            .output()
            .map_err(|err| {
                IntakeError::Render(format!(
                    "failed to run {}: {err}",
                    self.zbarimg.display()
                ))
            })?;

        match output.status.code() {
            Some(0) => Ok(first_symbol(&String::from_utf8_lossy(&output.stdout))),
            Some(EXIT_NO_SYMBOL) => {
                trace!("no symbol on page");
                Ok(None)
            }
            status => {
                warn!(
                    tool = %self.zbarimg.display(),
                    status = ?status,
                    "decoder failed"
                );
                Err(IntakeError::Render(format!(
                    "{} exited with {status:?}: {}",
                    self.zbarimg.display(),
                    stderr_summary(&output)
                )))
            }
        }
    }
}

/// `--raw` prints one symbol per line; the first one wins.
fn first_symbol(stdout: &str) -> Option<String> {
    stdout
        .lines()
        .next()
        .map(|line| line.trim_end_matches('\r').to_string())
        .filter(|line| !line.is_empty())
}

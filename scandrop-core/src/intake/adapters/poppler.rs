use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::TempDir;
use tracing::{debug, trace};

use super::{check_tool, stderr_summary};
use crate::error::{IntakeError, Result};
use crate::intake::identify::{PageImage, PageRenderer, Pages};

/// Renders PDF pages with poppler-utils.
///
/// The page count comes from `pdfinfo`; pages are then rasterised one at a
/// time with `pdftoppm` into a scratch directory that lives as long as the
/// page iterator, so a code on page one never pays for the rest.
#[derive(Clone, Debug)]
pub struct PopplerRenderer {
    pdftoppm: PathBuf,
    pdfinfo: PathBuf,
}

impl Default for PopplerRenderer {
    fn default() -> Self {
        Self::new("pdftoppm", "pdfinfo")
    }
}

impl PopplerRenderer {
    pub fn new(pdftoppm: impl Into<PathBuf>, pdfinfo: impl Into<PathBuf>) -> Self {
        Self {
            pdftoppm: pdftoppm.into(),
            pdfinfo: pdfinfo.into(),
        }
    }

    /// Fails when either `pdfinfo` or `pdftoppm` cannot be run.
    pub fn check(&self) -> Result<()> {
        check_tool(&self.pdfinfo, "-v")?;
        check_tool(&self.pdftoppm, "-v")
    }

    fn page_count(&self, document: &Path) -> Result<usize> {
        let output = Command::new(&self.pdfinfo)
            .arg(document)
            .output()
            .map_err(|err| {
                IntakeError::Render(format!(
                    "failed to run {}: {err}",
                    self.pdfinfo.display()
                ))
            })?;

        if !output.status.success() {
            return Err(IntakeError::Render(format!(
                "{} could not open {}: {}",
                self.pdfinfo.display(),
                document.display(),
                stderr_summary(&output)
            )));
        }

        let text = String::from_utf8_lossy(&output.stdout);
        parse_page_count(&text).ok_or_else(|| {
            IntakeError::Render(format!(
                "no page count reported for {}",
                document.display()
            ))
        })
    }

    fn render_page(
        &self,
        document: &Path,
        dpi: u32,
        page: usize,
        scratch: &Path,
    ) -> Result<PageImage> {
        let number = (page + 1).to_string();
        let root = scratch.join(format!("page-{number}"));

        let output = Command::new(&self.pdftoppm)
            .arg("-r")
            .arg(dpi.to_string())
            .args(["-f", &number, "-l", &number, "-png", "-singlefile"])
            .arg(document)
            .arg(&root)
            .output()
            .map_err(|err| {
                IntakeError::Render(format!(
                    "failed to run {}: {err}",
                    self.pdftoppm.display()
                ))
            })?;

        if !output.status.success() {
            return Err(IntakeError::Render(format!(
                "{} failed on page {number} of {}: {}",
                self.pdftoppm.display(),
                document.display(),
                stderr_summary(&output)
            )));
        }

        let png = root.with_extension("png");
        let image = image::open(&png)?;
        // Pages are large; free the scratch file as soon as it is decoded.
        let _ = std::fs::remove_file(&png);
        trace!(page, width = image.width(), height = image.height(), "page rendered");
        Ok(image)
    }
}

impl PageRenderer for PopplerRenderer {
    fn render<'a>(&'a self, document: &Path, dpi: u32) -> Result<Pages<'a>> {
        let pages = self.page_count(document)?;
        let scratch = tempfile::Builder::new().prefix("scandrop-").tempdir()?;
        debug!(document = %document.display(), pages, dpi, "rendering document");

        Ok(Box::new(PageIter {
            renderer: self,
            document: document.to_path_buf(),
            dpi,
            next: 0,
            pages,
            scratch,
        }))
    }
}

struct PageIter<'a> {
    renderer: &'a PopplerRenderer,
    document: PathBuf,
    dpi: u32,
    next: usize,
    pages: usize,
    scratch: TempDir,
}

impl Iterator for PageIter<'_> {
    type Item = Result<PageImage>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.pages {
            return None;
        }
        let page = self.next;
        self.next += 1;
        Some(
            self.renderer
                .render_page(&self.document, self.dpi, page, self.scratch.path()),
        )
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.pages.saturating_sub(self.next);
        (remaining, Some(remaining))
    }
}

/// Extract `Pages:` from `pdfinfo` output.
fn parse_page_count(text: &str) -> Option<usize> {
    text.lines()
        .filter_map(|line| line.strip_prefix("Pages:"))
        .find_map(|value| value.trim().parse().ok())
}

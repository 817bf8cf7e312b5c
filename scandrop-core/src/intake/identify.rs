//! Seam to the page renderer and the code decoder.
//!
//! Both collaborators are synchronous and CPU bound; the task runs
//! [`scan_document`] on the blocking pool.

use std::fmt;
use std::path::Path;

use image::DynamicImage;
use tracing::{debug, trace};

use crate::error::{IntakeError, Result};

/// A rasterised page.
pub type PageImage = DynamicImage;

/// Lazily rendered pages, in document order.
pub type Pages<'a> = Box<dyn Iterator<Item = Result<PageImage>> + 'a>;

/// Rasterises a document into an ordered, finite sequence of pages.
pub trait PageRenderer: Send + Sync {
    /// Fails when the document cannot be opened; individual pages may still
    /// fail while iterating.
    fn render<'a>(&'a self, document: &Path, dpi: u32) -> Result<Pages<'a>>;
}

/// Decodes an identifying code from a page image.
pub trait ContentIdentifier: Send + Sync {
    /// `Ok(None)` when no code is present. Errors are reserved for a decoder
    /// that could not run at all, never for a well-formed image.
    fn identify(&self, image: &PageImage) -> Result<Option<String>>;
}

/// Clockwise rotation applied to a page before asking for a code again.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Orientation {
    Upright,
    Rotate90,
    Rotate180,
    Rotate270,
}

impl Orientation {
    /// Alternate orientations tried, in order, when the upright page is codeless.
    pub const RETRIES: [Orientation; 3] = [
        Orientation::Rotate90,
        Orientation::Rotate180,
        Orientation::Rotate270,
    ];

    pub const fn degrees(self) -> u16 {
        match self {
            Orientation::Upright => 0,
            Orientation::Rotate90 => 90,
            Orientation::Rotate180 => 180,
            Orientation::Rotate270 => 270,
        }
    }

    pub fn apply(self, image: &PageImage) -> PageImage {
        match self {
            Orientation::Upright => image.clone(),
            Orientation::Rotate90 => image.rotate90(),
            Orientation::Rotate180 => image.rotate180(),
            Orientation::Rotate270 => image.rotate270(),
        }
    }
}

impl TryFrom<u16> for Orientation {
    type Error = IntakeError;

    fn try_from(degrees: u16) -> Result<Self> {
        match degrees % 360 {
            0 => Ok(Orientation::Upright),
            90 => Ok(Orientation::Rotate90),
            180 => Ok(Orientation::Rotate180),
            270 => Ok(Orientation::Rotate270),
            other => Err(IntakeError::Config(format!(
                "orientation {other} is not a multiple of 90 degrees"
            ))),
        }
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}°", self.degrees())
    }
}

/// Where and how the first code was found.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CodeHit {
    /// Zero-based page index.
    pub page: usize,
    pub orientation: Orientation,
    /// Decoder output, unsanitized.
    pub raw: String,
}

/// Walk the pages in order and return the first code found, trying the
/// upright page first and then each of `retries`.
///
/// `Ok(None)` means no page yielded a code in any orientation.
pub fn scan_document(
    renderer: &dyn PageRenderer,
    identifier: &dyn ContentIdentifier,
    document: &Path,
    dpi: u32,
    retries: &[Orientation],
) -> Result<Option<CodeHit>> {
    let pages = renderer.render(document, dpi)?;

    for (page, rendered) in pages.enumerate() {
        let image = rendered?;
        if let Some(hit) = identify_page(identifier, &image, page, retries)? {
            debug!(
                document = %document.display(),
                page,
                orientation = %hit.orientation,
                "code found"
            );
            return Ok(Some(hit));
        }
        trace!(document = %document.display(), page, "page yielded no code");
    }

    Ok(None)
}

fn identify_page(
    identifier: &dyn ContentIdentifier,
    image: &PageImage,
    page: usize,
    retries: &[Orientation],
) -> Result<Option<CodeHit>> {
    let attempts = std::iter::once(Orientation::Upright)
        .chain(retries.iter().copied().filter(|o| *o != Orientation::Upright));

    for orientation in attempts {
        let found = match orientation {
            Orientation::Upright => identifier.identify(image)?,
            rotated => identifier.identify(&rotated.apply(image))?,
        };
        if let Some(raw) = found.filter(|raw| !raw.is_empty()) {
            return Ok(Some(CodeHit {
                page,
                orientation,
                raw,
            }));
        }
    }
    Ok(None)
}

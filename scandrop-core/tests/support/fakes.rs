//! Scripted collaborators.
//!
//! Pages are plain images whose dimensions identify them. A quarter turn
//! swaps width and height, so an identifier keyed on dimensions only answers
//! for the orientation the test intends.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use image::DynamicImage;
use scandrop_core::intake::naming::file_stem;
use scandrop_core::intake::{ContentIdentifier, PageImage, PageRenderer, Pages};
use scandrop_core::{IntakeError, Result};

/// Renders each document as the page sizes registered for its stem.
/// Unknown stems render a single 1x1 page.
#[derive(Default)]
pub struct ScriptedRenderer {
    documents: HashMap<String, Vec<(u32, u32)>>,
}

impl ScriptedRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn document(mut self, stem: &str, pages: &[(u32, u32)]) -> Self {
        self.documents.insert(stem.to_string(), pages.to_vec());
        self
    }
}

impl PageRenderer for ScriptedRenderer {
    fn render<'a>(&'a self, document: &Path, _dpi: u32) -> Result<Pages<'a>> {
        if !document.exists() {
            return Err(IntakeError::Render(format!(
                "cannot open {}",
                document.display()
            )));
        }
        let pages = self
            .documents
            .get(&file_stem(document))
            .cloned()
            .unwrap_or_else(|| vec![(1, 1)]);
        Ok(Box::new(
            pages
                .into_iter()
                .map(|(width, height)| Ok(DynamicImage::new_luma8(width, height))),
        ))
    }
}

/// Answers with the code registered for a page's exact dimensions.
#[derive(Default)]
pub struct DimensionIdentifier {
    codes: HashMap<(u32, u32), String>,
}

impl DimensionIdentifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn code(mut self, dimensions: (u32, u32), code: &str) -> Self {
        self.codes.insert(dimensions, code.to_string());
        self
    }
}

impl ContentIdentifier for DimensionIdentifier {
    fn identify(&self, image: &PageImage) -> Result<Option<String>> {
        Ok(self.codes.get(&(image.width(), image.height())).cloned())
    }
}

/// Blocks every render until [`Gate::open`] is called.
pub struct GatedRenderer<R> {
    inner: R,
    gate: Arc<Gate>,
}

impl<R> GatedRenderer<R> {
    pub fn new(inner: R, gate: Arc<Gate>) -> Self {
        Self { inner, gate }
    }
}

impl<R: PageRenderer> PageRenderer for GatedRenderer<R> {
    fn render<'a>(&'a self, document: &Path, dpi: u32) -> Result<Pages<'a>> {
        self.gate.pass();
        self.inner.render(document, dpi)
    }
}

#[derive(Default)]
pub struct Gate {
    open: Mutex<bool>,
    opened: Condvar,
    waiting: AtomicUsize,
}

impl Gate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Renders currently blocked (or already through) the gate.
    pub fn arrivals(&self) -> usize {
        self.waiting.load(Ordering::SeqCst)
    }

    pub fn open(&self) {
        *self.open.lock().expect("gate lock") = true;
        self.opened.notify_all();
    }

    fn pass(&self) {
        self.waiting.fetch_add(1, Ordering::SeqCst);
        let mut open = self.open.lock().expect("gate lock");
        while !*open {
            open = self.opened.wait(open).expect("gate lock");
        }
    }
}

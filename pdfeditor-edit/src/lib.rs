//! `lopdf`-backed document engine: blank document creation, page growth, text drawing with the
//! standard-14 fonts and atomic in-place saves. Also provides a structure-only viewing surface
//! for environments without Pdfium.

use std::path::Path;

use lopdf::Document;
use pdfeditor_core::{AnnotationReport, EditorError, PdfEngine, Result, TextAnnotation};
use thiserror::Error;
use tracing::{debug, info, instrument};

mod annotate;
mod blank;
pub mod fonts;
pub mod pages;
mod persist;
mod surface;

pub use blank::blank_document;
pub use persist::save_atomically;
pub use surface::StructureLoader;

/// Problems found while walking a parsed document. Always reported as `DocumentLoad` to callers.
#[derive(Debug, Error)]
pub(crate) enum StructureError {
    #[error("malformed document: {0}")]
    Malformed(&'static str),

    #[error(transparent)]
    Lopdf(#[from] lopdf::Error),
}

impl StructureError {
    pub(crate) fn at(self, path: &Path) -> EditorError {
        EditorError::load(path, self)
    }
}

/// Parses `path`, rejecting missing files and encrypted documents.
pub(crate) fn open_document(path: &Path) -> Result<Document> {
    if !path.is_file() {
        return Err(EditorError::load(path, "file does not exist"));
    }
    let doc = Document::load(path).map_err(|err| EditorError::load(path, err))?;
    if doc.trailer.get(b"Encrypt").is_ok() {
        return Err(EditorError::load(
            path,
            "encrypted documents are not supported",
        ));
    }
    Ok(doc)
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfEngine;

impl LopdfEngine {
    pub fn new() -> Self {
        Self
    }

    /// Annotates `path` in memory and hands the result to `persist`. The file on disk is only
    /// touched by `persist`.
    fn annotate_with<F>(
        &self,
        path: &Path,
        annotation: &TextAnnotation,
        persist: F,
    ) -> Result<AnnotationReport>
    where
        F: FnOnce(&mut Document, &Path) -> Result<()>,
    {
        annotation.validate()?;
        let mut doc = open_document(path)?;
        let report = annotate::apply(&mut doc, annotation).map_err(|err| err.at(path))?;
        persist(&mut doc, path)?;
        Ok(report)
    }
}

impl PdfEngine for LopdfEngine {
    #[instrument(skip(self))]
    fn write_blank(&self, path: &Path, title: &str) -> Result<()> {
        let mut doc = blank_document(title);
        save_atomically(&mut doc, path)?;
        debug!("wrote blank document");
        Ok(())
    }

    fn page_count(&self, path: &Path) -> Result<usize> {
        let doc = open_document(path)?;
        Ok(doc.get_pages().len())
    }

    #[instrument(skip(self, annotation), fields(page = annotation.page))]
    fn annotate(&self, path: &Path, annotation: &TextAnnotation) -> Result<AnnotationReport> {
        let report = self.annotate_with(path, annotation, save_atomically)?;
        info!(
            pages = report.page_count,
            appended = report.pages_appended,
            "text annotation saved"
        );
        Ok(report)
    }
}

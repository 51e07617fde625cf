use std::path::Path;

use crate::annotation::{AnnotationReport, TextAnnotation};
use crate::error::Result;

/// Structural PDF operations the controller delegates to a PDF library.
pub trait PdfEngine {
    /// Writes a valid single-page document with the given Info title to `path`.
    fn write_blank(&self, path: &Path, title: &str) -> Result<()>;

    /// Parses `path` and returns its page count. Fails with `DocumentLoad` on missing or corrupt
    /// input.
    fn page_count(&self, path: &Path) -> Result<usize>;

    /// Draws `annotation` onto the document at `path`, growing it as needed, and persists the
    /// result in place. Either the whole edit lands on disk or the file is left untouched.
    fn annotate(&self, path: &Path, annotation: &TextAnnotation) -> Result<AnnotationReport>;
}

impl<E: PdfEngine + ?Sized> PdfEngine for &E {
    fn write_blank(&self, path: &Path, title: &str) -> Result<()> {
        (**self).write_blank(path, title)
    }

    fn page_count(&self, path: &Path) -> Result<usize> {
        (**self).page_count(path)
    }

    fn annotate(&self, path: &Path, annotation: &TextAnnotation) -> Result<AnnotationReport> {
        (**self).annotate(path, annotation)
    }
}

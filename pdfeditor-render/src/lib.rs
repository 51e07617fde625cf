//! Pdfium-backed viewing surface.
//!
//! Without the `pdf` feature the loader still exists but every bind attempt fails, so callers can
//! fall back to another [`DocumentLoader`].

#[cfg(feature = "pdf")]
mod pdfium;

#[cfg(feature = "pdf")]
pub use pdfium::PdfiumLoader;

#[cfg(not(feature = "pdf"))]
mod disabled {
    use std::path::Path;

    use pdfeditor_core::{DocumentLoader, EditorError, LoadedDocument, Result};

    pub struct PdfiumLoader;

    impl PdfiumLoader {
        pub fn new() -> anyhow::Result<Self> {
            anyhow::bail!("built without the `pdf` feature")
        }
    }

    impl DocumentLoader for PdfiumLoader {
        fn load(&self, path: &Path, _bytes: Vec<u8>) -> Result<Box<dyn LoadedDocument>> {
            Err(EditorError::load(path, "Pdfium support is not compiled in"))
        }
    }
}

#[cfg(not(feature = "pdf"))]
pub use disabled::PdfiumLoader;

pub use pdfeditor_core::DocumentLoader;

use std::convert::TryFrom;
use std::mem;
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Result as AnyResult};
use parking_lot::Mutex;
use pdfeditor_core::{
    DocumentInfo, DocumentLoader, EditorError, LoadedDocument, RenderImage, RenderRequest, Result,
};
use pdfium_render::prelude::*;
use tracing::{debug, instrument, warn};

/// Loads working copies into Pdfium from memory, so no file handle stays open on disk.
pub struct PdfiumLoader {
    pdfium: Arc<Pdfium>,
}

impl PdfiumLoader {
    pub fn new() -> AnyResult<Self> {
        let pdfium = match bind_pdfium_from_build_hint() {
            Some(pdfium) => pdfium,
            None => bind_pdfium_default()?,
        };
        Ok(Self {
            pdfium: Arc::new(pdfium),
        })
    }
}

impl DocumentLoader for PdfiumLoader {
    #[instrument(skip(self, bytes), fields(len = bytes.len()))]
    fn load(&self, path: &Path, bytes: Vec<u8>) -> Result<Box<dyn LoadedDocument>> {
        let document = self
            .pdfium
            .load_pdf_from_byte_vec(bytes, None)
            .map_err(|err| EditorError::load(path, err))?;
        // SAFETY: the document borrows the bindings owned by `pdfium`. `PdfiumDocument` declares
        // `document` before `pdfium`, so the document is dropped first and the Arc keeps the
        // bindings alive for as long as the document exists.
        let document = unsafe { mem::transmute::<PdfDocument<'_>, PdfDocument<'static>>(document) };

        let page_count = usize::try_from(document.pages().len()).unwrap_or_default();
        let title = document
            .metadata()
            .get(PdfDocumentMetadataTagType::Title)
            .map(|tag| tag.value().to_owned())
            .filter(|title| !title.is_empty());
        debug!(page_count, "pdfium loaded document");

        Ok(Box::new(PdfiumDocument {
            document,
            info: DocumentInfo {
                path: path.to_path_buf(),
                page_count,
                title,
            },
            cache: Mutex::new(None),
            pdfium: Arc::clone(&self.pdfium),
        }))
    }
}

struct PdfiumDocument {
    document: PdfDocument<'static>,
    info: DocumentInfo,
    cache: Mutex<Option<RenderCacheEntry>>,
    pdfium: Arc<Pdfium>,
}

struct RenderCacheEntry {
    page_index: usize,
    scale: f32,
    image: RenderImage,
}

impl PdfiumDocument {
    fn render_internal(&self, request: &RenderRequest) -> AnyResult<RenderImage> {
        let page_index = PdfPageIndex::try_from(request.page_index)
            .map_err(|_| anyhow!("page {} is out of supported range", request.page_index))?;
        let page = self
            .document
            .pages()
            .get(page_index)
            .map_err(|err| anyhow!("page {} out of range: {err}", request.page_index + 1))?;

        let config = PdfRenderConfig::new().scale_page_by_factor(request.scale.max(0.1));
        let bitmap = page
            .render_with_config(&config)
            .map_err(|err| anyhow!("failed to render page {}: {err}", request.page_index + 1))?;
        let pixels = bitmap.as_image().to_rgba8().into_raw();

        Ok(RenderImage {
            width: u32::try_from(bitmap.width()).unwrap_or_default(),
            height: u32::try_from(bitmap.height()).unwrap_or_default(),
            pixels,
        })
    }
}

impl LoadedDocument for PdfiumDocument {
    fn info(&self) -> &DocumentInfo {
        &self.info
    }

    #[instrument(skip(self))]
    fn render_page(&self, request: RenderRequest) -> Result<RenderImage> {
        {
            let cache = self.cache.lock();
            if let Some(entry) = cache.as_ref() {
                if entry.page_index == request.page_index
                    && (entry.scale - request.scale).abs() < f32::EPSILON
                {
                    return Ok(entry.image.clone());
                }
            }
        }

        let image = self
            .render_internal(&request)
            .map_err(|err| EditorError::Render(format!("{err:#}")))?;

        *self.cache.lock() = Some(RenderCacheEntry {
            page_index: request.page_index,
            scale: request.scale,
            image: image.clone(),
        });
        Ok(image)
    }
}

impl Drop for PdfiumDocument {
    fn drop(&mut self) {
        debug!(
            path = %self.info.path.display(),
            bindings = Arc::strong_count(&self.pdfium),
            "closing pdfium document"
        );
    }
}

fn bind_pdfium_from_build_hint() -> Option<Pdfium> {
    match option_env!("PDFEDITOR_PDFIUM_LIBRARY_PATH") {
        Some(path) if !path.is_empty() => match Pdfium::bind_to_library(path) {
            Ok(bindings) => Some(Pdfium::new(bindings)),
            Err(err) => {
                warn!(%path, %err, "failed to load Pdfium from build-provided path");
                None
            }
        },
        _ => None,
    }
}

fn bind_pdfium_default() -> AnyResult<Pdfium> {
    let local = Pdfium::pdfium_platform_library_name_at_path("./");
    let local_err = match Pdfium::bind_to_library(&local) {
        Ok(bindings) => return Ok(Pdfium::new(bindings)),
        Err(err) => err,
    };
    Pdfium::bind_to_system_library()
        .map(Pdfium::new)
        .map_err(|system_err| {
            anyhow!(
                "failed to bind to a Pdfium library ({}: {local_err}, system: {system_err})",
                local.display()
            )
        })
}

use std::path::Path;

use lopdf::Document;
use pdfeditor_core::{
    DocumentInfo, DocumentLoader, EditorError, LoadedDocument, RenderImage, RenderRequest, Result,
};
use tracing::debug;

use crate::blank::decode_text_string;
use crate::pages::media_box;

const MAX_EDGE: f32 = 4096.0;
const BORDER: [u8; 4] = [160, 160, 160, 255];
const PAPER: [u8; 4] = [255, 255, 255, 255];

/// Loads documents with `lopdf` only. Pages are shown as empty frames of the right size, which
/// keeps the editor usable where Pdfium is not available.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructureLoader;

struct StructureDocument {
    info: DocumentInfo,
    /// Width and height in points, in page order.
    page_sizes: Vec<(f32, f32)>,
}

impl DocumentLoader for StructureLoader {
    fn load(&self, path: &Path, bytes: Vec<u8>) -> Result<Box<dyn LoadedDocument>> {
        let doc = Document::load_mem(&bytes).map_err(|err| EditorError::load(path, err))?;
        if doc.trailer.get(b"Encrypt").is_ok() {
            return Err(EditorError::load(
                path,
                "encrypted documents are not supported",
            ));
        }
        let page_sizes: Vec<(f32, f32)> = doc
            .get_pages()
            .values()
            .map(|page_id| {
                let [llx, lly, urx, ury] = media_box(&doc, *page_id);
                (urx - llx, ury - lly)
            })
            .collect();
        let title = title_of(&doc);
        debug!(pages = page_sizes.len(), ?title, "parsed document structure");
        Ok(Box::new(StructureDocument {
            info: DocumentInfo {
                path: path.to_path_buf(),
                page_count: page_sizes.len(),
                title,
            },
            page_sizes,
        }))
    }
}

fn title_of(doc: &Document) -> Option<String> {
    let info = match doc.trailer.get(b"Info").ok()? {
        lopdf::Object::Reference(id) => doc.get_object(*id).ok()?,
        other => other,
    };
    let title = info.as_dict().ok()?.get(b"Title").ok()?.as_str().ok()?;
    Some(decode_text_string(title)).filter(|title| !title.is_empty())
}

impl LoadedDocument for StructureDocument {
    fn info(&self) -> &DocumentInfo {
        &self.info
    }

    fn render_page(&self, request: RenderRequest) -> Result<RenderImage> {
        let (width, height) = self.page_sizes.get(request.page_index).ok_or_else(|| {
            EditorError::Render(format!(
                "page {} out of range (document has {})",
                request.page_index + 1,
                self.page_sizes.len()
            ))
        })?;
        let width = (width * request.scale).round().clamp(1.0, MAX_EDGE) as u32;
        let height = (height * request.scale).round().clamp(1.0, MAX_EDGE) as u32;

        let mut pixels = Vec::with_capacity(width as usize * height as usize * 4);
        for row in 0..height {
            for col in 0..width {
                let edge = row == 0 || col == 0 || row + 1 == height || col + 1 == width;
                pixels.extend_from_slice(if edge { &BORDER } else { &PAPER });
            }
        }
        Ok(RenderImage {
            width,
            height,
            pixels,
        })
    }
}

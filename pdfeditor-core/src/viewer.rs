use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, instrument, warn};

use crate::error::{EditorError, Result};
use crate::{DocumentInfo, RenderImage, RenderRequest};

/// A document handle held by a viewing surface.
pub trait LoadedDocument {
    fn info(&self) -> &DocumentInfo;
    fn render_page(&self, request: RenderRequest) -> Result<RenderImage>;
}

/// Turns an in-memory PDF buffer into a displayable handle.
pub trait DocumentLoader {
    fn load(&self, path: &Path, bytes: Vec<u8>) -> Result<Box<dyn LoadedDocument>>;
}

impl<L: DocumentLoader + ?Sized> DocumentLoader for Box<L> {
    fn load(&self, path: &Path, bytes: Vec<u8>) -> Result<Box<dyn LoadedDocument>> {
        (**self).load(path, bytes)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ViewCommand {
    NextPage { count: usize },
    PrevPage { count: usize },
    GotoPage { page: usize },
    ScaleBy { factor: f32 },
    ResetScale,
}

const MIN_SCALE: f32 = 0.25;
const MAX_SCALE: f32 = 4.0;

/// Owns the loaded document handle and the view state for the working copy.
pub struct Viewer<L> {
    loader: L,
    current: Option<Box<dyn LoadedDocument>>,
    current_page: usize,
    scale: f32,
}

impl<L: DocumentLoader> Viewer<L> {
    pub fn new(loader: L) -> Self {
        Self {
            loader,
            current: None,
            current_page: 0,
            scale: 1.0,
        }
    }

    /// Replaces the displayed document with the contents of `path`.
    ///
    /// The previous handle is released before the file is read. On failure no handle is kept.
    #[instrument(skip(self))]
    pub fn load(&mut self, path: &Path) -> Result<&DocumentInfo> {
        self.release();
        let bytes = fs::read(path).map_err(|err| EditorError::load(path, err))?;
        let document = self.loader.load(path, bytes)?;
        let page_count = document.info().page_count;
        self.current_page = self.current_page.min(page_count.saturating_sub(1));
        debug!(pages = page_count, "document loaded into viewer");
        Ok(self.current.insert(document).info())
    }

    /// Drops the loaded handle, if any. Returns whether something was released.
    pub fn release(&mut self) -> bool {
        match self.current.take() {
            Some(document) => {
                debug!(path = %document.info().path.display(), "released viewer document");
                true
            }
            None => false,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.current.is_some()
    }

    pub fn info(&self) -> Option<&DocumentInfo> {
        self.current.as_ref().map(|doc| doc.info())
    }

    pub fn current_page(&self) -> usize {
        self.current_page
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    /// Releases the handle until the returned guard is finished or dropped, then reloads `path`.
    pub fn exclusive(&mut self, path: &Path) -> ExclusiveAccess<'_, L> {
        self.release();
        ExclusiveAccess {
            viewer: self,
            path: path.to_path_buf(),
            pending: true,
        }
    }

    /// Applies a view command. Returns `true` when the view changed.
    pub fn apply(&mut self, command: ViewCommand) -> bool {
        let page_count = self.info().map(|info| info.page_count).unwrap_or(0);
        let last_page = page_count.saturating_sub(1);
        match command {
            ViewCommand::NextPage { count } => {
                self.set_page(self.current_page.saturating_add(count).min(last_page))
            }
            ViewCommand::PrevPage { count } => {
                self.set_page(self.current_page.saturating_sub(count))
            }
            ViewCommand::GotoPage { page } => self.set_page(page.min(last_page)),
            ViewCommand::ScaleBy { factor } => {
                let scale = (self.scale * factor).clamp(MIN_SCALE, MAX_SCALE);
                self.set_scale(scale)
            }
            ViewCommand::ResetScale => self.set_scale(1.0),
        }
    }

    pub fn render(&self) -> Result<Option<RenderImage>> {
        self.render_with_scale(self.scale)
    }

    pub fn render_with_scale(&self, scale: f32) -> Result<Option<RenderImage>> {
        let Some(document) = self.current.as_ref() else {
            return Ok(None);
        };
        let request = RenderRequest {
            page_index: self.current_page,
            scale,
        };
        document.render_page(request).map(Some)
    }

    fn set_page(&mut self, page: usize) -> bool {
        if page != self.current_page {
            self.current_page = page;
            true
        } else {
            false
        }
    }

    fn set_scale(&mut self, scale: f32) -> bool {
        if (self.scale - scale).abs() > f32::EPSILON {
            self.scale = scale;
            true
        } else {
            false
        }
    }
}

impl<L> Drop for Viewer<L> {
    fn drop(&mut self) {
        if self.current.take().is_some() {
            debug!("viewer shut down with a loaded document; released");
        }
    }
}

/// Scoped exclusive access to a file the viewer displays.
pub struct ExclusiveAccess<'a, L: DocumentLoader> {
    viewer: &'a mut Viewer<L>,
    path: PathBuf,
    pending: bool,
}

impl<L: DocumentLoader> ExclusiveAccess<'_, L> {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reloads the file into the viewer and reports the outcome.
    pub fn finish(mut self) -> Result<()> {
        self.pending = false;
        self.viewer.load(&self.path).map(|_| ())
    }
}

impl<L: DocumentLoader> Drop for ExclusiveAccess<'_, L> {
    fn drop(&mut self) {
        if self.pending {
            if let Err(err) = self.viewer.load(&self.path) {
                warn!(?err, path = %self.path.display(), "failed to reload document after exclusive access");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use std::cell::RefCell;
    use std::rc::Rc;
    use tempfile::tempdir;

    struct FakeDocument {
        info: DocumentInfo,
        drops: Rc<RefCell<usize>>,
    }

    impl LoadedDocument for FakeDocument {
        fn info(&self) -> &DocumentInfo {
            &self.info
        }

        fn render_page(&self, request: RenderRequest) -> Result<RenderImage> {
            Ok(RenderImage {
                width: 1,
                height: 1,
                pixels: vec![request.page_index as u8, 0, 0, 255],
            })
        }
    }

    impl Drop for FakeDocument {
        fn drop(&mut self) {
            *self.drops.borrow_mut() += 1;
        }
    }

    /// Treats the file body as a decimal page count; anything else is corrupt.
    #[derive(Default)]
    struct FakeLoader {
        drops: Rc<RefCell<usize>>,
    }

    impl DocumentLoader for FakeLoader {
        fn load(&self, path: &Path, bytes: Vec<u8>) -> Result<Box<dyn LoadedDocument>> {
            let page_count = String::from_utf8(bytes)
                .ok()
                .and_then(|body| body.trim().parse::<usize>().ok())
                .ok_or_else(|| EditorError::load(path, "not a page count"))?;
            Ok(Box::new(FakeDocument {
                info: DocumentInfo {
                    path: path.to_path_buf(),
                    page_count,
                    title: None,
                },
                drops: Rc::clone(&self.drops),
            }))
        }
    }

    fn write(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn release_is_idempotent() {
        let dir = tempdir().unwrap();
        let path = write(dir.path(), "doc.pdf", "3");
        let loader = FakeLoader::default();
        let drops = Rc::clone(&loader.drops);
        let mut viewer = Viewer::new(loader);

        viewer.load(&path).unwrap();
        assert!(viewer.release());
        assert!(!viewer.release());
        assert_eq!(*drops.borrow(), 1);
        assert!(viewer.info().is_none());
    }

    #[test]
    fn reload_disposes_previous_handle_first() {
        let dir = tempdir().unwrap();
        let path = write(dir.path(), "doc.pdf", "2");
        let loader = FakeLoader::default();
        let drops = Rc::clone(&loader.drops);
        let mut viewer = Viewer::new(loader);

        viewer.load(&path).unwrap();
        viewer.load(&path).unwrap();
        assert_eq!(*drops.borrow(), 1);
        assert_eq!(viewer.info().unwrap().page_count, 2);
    }

    #[test]
    fn failed_load_keeps_no_handle() {
        let dir = tempdir().unwrap();
        let good = write(dir.path(), "good.pdf", "2");
        let bad = write(dir.path(), "bad.pdf", "garbage");
        let mut viewer = Viewer::new(FakeLoader::default());

        viewer.load(&good).unwrap();
        let err = viewer.load(&bad).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DocumentLoad);
        assert!(!viewer.is_loaded());

        let err = viewer.load(&dir.path().join("absent.pdf")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DocumentLoad);
    }

    #[test]
    fn exclusive_access_releases_and_reloads() {
        let dir = tempdir().unwrap();
        let path = write(dir.path(), "doc.pdf", "1");
        let mut viewer = Viewer::new(FakeLoader::default());
        viewer.load(&path).unwrap();

        let guard = viewer.exclusive(&path);
        fs::write(guard.path(), "4").unwrap();
        guard.finish().unwrap();

        assert_eq!(viewer.info().unwrap().page_count, 4);
    }

    #[test]
    fn exclusive_access_reloads_when_dropped_on_error_path() {
        let dir = tempdir().unwrap();
        let path = write(dir.path(), "doc.pdf", "5");
        let mut viewer = Viewer::new(FakeLoader::default());
        viewer.load(&path).unwrap();

        let failing = |viewer: &mut Viewer<FakeLoader>| -> Result<()> {
            let _guard = viewer.exclusive(&path);
            Err(EditorError::invalid("mutation failed"))
        };
        assert!(failing(&mut viewer).is_err());

        assert!(viewer.is_loaded());
        assert_eq!(viewer.info().unwrap().page_count, 5);
    }

    #[test]
    fn view_commands_stay_in_range() {
        let dir = tempdir().unwrap();
        let path = write(dir.path(), "doc.pdf", "10");
        let mut viewer = Viewer::new(FakeLoader::default());
        viewer.load(&path).unwrap();

        assert!(viewer.apply(ViewCommand::NextPage { count: 4 }));
        assert_eq!(viewer.current_page(), 4);
        assert!(viewer.apply(ViewCommand::NextPage { count: 40 }));
        assert_eq!(viewer.current_page(), 9);
        assert!(!viewer.apply(ViewCommand::GotoPage { page: usize::MAX }));
        assert!(viewer.apply(ViewCommand::PrevPage { count: 3 }));
        assert_eq!(viewer.current_page(), 6);

        assert!(viewer.apply(ViewCommand::ScaleBy { factor: 100.0 }));
        assert_eq!(viewer.scale(), 4.0);
        assert!(viewer.apply(ViewCommand::ResetScale));
        assert!(!viewer.apply(ViewCommand::ResetScale));
    }

    #[test]
    fn page_is_clamped_when_document_shrinks() {
        let dir = tempdir().unwrap();
        let path = write(dir.path(), "doc.pdf", "8");
        let mut viewer = Viewer::new(FakeLoader::default());
        viewer.load(&path).unwrap();
        viewer.apply(ViewCommand::GotoPage { page: 7 });

        fs::write(&path, "3").unwrap();
        viewer.load(&path).unwrap();
        assert_eq!(viewer.current_page(), 2);

        let image = viewer.render().unwrap().unwrap();
        assert_eq!(image.pixels[0], 2);
    }
}

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, instrument, warn};

use crate::annotation::AnnotationReport;
use crate::color::Rgba;
use crate::engine::PdfEngine;
use crate::error::{EditorError, ErrorKind, Result};
use crate::fields::FormFields;
use crate::viewer::{DocumentLoader, Viewer};
use crate::workspace::TempWorkspace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    New,
    Open,
    AddText,
    SaveAs,
    PickColor,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Action::New => "New",
            Action::Open => "Open",
            Action::AddText => "Add Text",
            Action::SaveAs => "Save As",
            Action::PickColor => "Pick Color",
        };
        f.write_str(label)
    }
}

/// User-visible messages raised by actions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    NothingToSave,
    Saved(PathBuf),
    Failed { action: Action, message: String },
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::NothingToSave => f.write_str("Nothing to save yet."),
            Notice::Saved(path) => write!(f, "Saved. ({})", path.display()),
            Notice::Failed { action, message } => write!(f, "{action} failed: {message}"),
        }
    }
}

/// Dialogs an action may need. Every prompt may be cancelled by returning `None`.
pub trait Prompter {
    fn open_path(&mut self) -> Option<PathBuf>;
    fn save_path(&mut self) -> Option<PathBuf>;
    fn color(&mut self, current: Rgba) -> Option<Rgba>;
    fn notify(&mut self, notice: Notice);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Cancelled,
    Failed(ErrorKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveStatus {
    Saved,
    NothingToSave,
}

/// Wires user actions to the workspace, the PDF engine and the viewer.
pub struct Controller<E, L> {
    engine: E,
    workspace: TempWorkspace,
    viewer: Viewer<L>,
    working_copy: Option<PathBuf>,
    source_path: Option<PathBuf>,
    color: Rgba,
    fields: FormFields,
}

impl<E: PdfEngine, L: DocumentLoader> Controller<E, L> {
    pub fn new(engine: E, workspace: TempWorkspace, loader: L) -> Self {
        Self {
            engine,
            workspace,
            viewer: Viewer::new(loader),
            working_copy: None,
            source_path: None,
            color: Rgba::BLACK,
            fields: FormFields::new(),
        }
    }

    pub fn working_copy(&self) -> Option<&Path> {
        self.working_copy.as_deref()
    }

    pub fn source_path(&self) -> Option<&Path> {
        self.source_path.as_deref()
    }

    pub fn color(&self) -> Rgba {
        self.color
    }

    pub fn fields(&self) -> &FormFields {
        &self.fields
    }

    pub fn fields_mut(&mut self) -> &mut FormFields {
        &mut self.fields
    }

    pub fn viewer(&self) -> &Viewer<L> {
        &self.viewer
    }

    pub fn viewer_mut(&mut self) -> &mut Viewer<L> {
        &mut self.viewer
    }

    pub fn has_working_copy(&self) -> bool {
        self.working_copy.as_deref().is_some_and(Path::is_file)
    }

    /// Runs one action to completion. Errors are reported to the prompter as notices.
    pub fn dispatch(&mut self, action: Action, prompter: &mut dyn Prompter) -> Outcome {
        let result = match action {
            Action::New => self.new_document().map(|_| Outcome::Completed),
            Action::Open => match prompter.open_path() {
                Some(source) => self.open(&source).map(|_| Outcome::Completed),
                None => Ok(Outcome::Cancelled),
            },
            Action::AddText => self.add_text().map(|_| Outcome::Completed),
            Action::SaveAs => self.save_as_with(prompter),
            Action::PickColor => match prompter.color(self.color) {
                Some(color) => {
                    self.set_color(color);
                    Ok(Outcome::Completed)
                }
                None => Ok(Outcome::Cancelled),
            },
        };

        match result {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(%action, ?err, "action failed");
                let kind = err.kind();
                prompter.notify(Notice::Failed {
                    action,
                    message: err.to_string(),
                });
                Outcome::Failed(kind)
            }
        }
    }

    /// Replaces the session with a fresh blank working copy.
    #[instrument(skip(self))]
    pub fn new_document(&mut self) -> Result<PathBuf> {
        self.source_path = None;
        let path = self.workspace.create_blank_document(&self.engine)?;
        self.display(path.clone())?;
        info!(path = %path.display(), "started new document");
        Ok(path)
    }

    /// Copies `source` into the workspace and displays the copy.
    ///
    /// A missing or corrupt source leaves the previous working copy and view untouched.
    #[instrument(skip(self))]
    pub fn open(&mut self, source: &Path) -> Result<PathBuf> {
        if !source.is_file() {
            return Err(EditorError::load(source, "file does not exist"));
        }
        let pages = self.engine.page_count(source)?;
        let copy = self.workspace.copy_to_temp(source)?;
        self.display(copy.clone())?;
        self.source_path = Some(source.to_path_buf());
        info!(pages, "opened document");
        Ok(copy)
    }

    /// Draws the text described by the form fields onto the working copy and redisplays it.
    #[instrument(skip(self))]
    pub fn add_text(&mut self) -> Result<AnnotationReport> {
        let path = match self.working_copy.clone().filter(|path| path.is_file()) {
            Some(path) => path,
            None => self.new_document()?,
        };
        let annotation = self.fields.annotation(self.color);

        let guard = self.viewer.exclusive(&path);
        let report = self.engine.annotate(&path, &annotation)?;
        guard.finish()?;

        info!(
            page = annotation.page,
            pages = report.page_count,
            appended = report.pages_appended,
            "added text"
        );
        Ok(report)
    }

    /// Copies the working copy to `destination`.
    #[instrument(skip(self))]
    pub fn save_as(&mut self, destination: &Path) -> Result<SaveStatus> {
        let Some(working_copy) = self.working_copy.as_deref().filter(|path| path.is_file()) else {
            return Ok(SaveStatus::NothingToSave);
        };
        let bytes = self.workspace.export(working_copy, destination)?;
        self.source_path = Some(destination.to_path_buf());
        info!(bytes, "saved working copy");
        Ok(SaveStatus::Saved)
    }

    fn save_as_with(&mut self, prompter: &mut dyn Prompter) -> Result<Outcome> {
        if !self.has_working_copy() {
            prompter.notify(Notice::NothingToSave);
            return Ok(Outcome::Cancelled);
        }
        let Some(destination) = prompter.save_path() else {
            return Ok(Outcome::Cancelled);
        };
        match self.save_as(&destination)? {
            SaveStatus::Saved => {
                prompter.notify(Notice::Saved(destination));
                Ok(Outcome::Completed)
            }
            SaveStatus::NothingToSave => {
                prompter.notify(Notice::NothingToSave);
                Ok(Outcome::Cancelled)
            }
        }
    }

    pub fn set_color(&mut self, color: Rgba) {
        self.color = color;
    }

    /// Releases the viewer's document ahead of exit.
    pub fn shutdown(&mut self) {
        self.viewer.release();
    }

    /// Loads `path` and makes it the working copy. If the viewer rejects it, the previous
    /// working copy is redisplayed and the new file is discarded.
    fn display(&mut self, path: PathBuf) -> Result<()> {
        if let Err(err) = self.viewer.load(&path) {
            if let Err(remove_err) = fs::remove_file(&path) {
                warn!(?remove_err, path = %path.display(), "failed to discard rejected copy");
            }
            if let Some(previous) = self.working_copy.as_deref() {
                if let Err(reload_err) = self.viewer.load(previous) {
                    warn!(?reload_err, "failed to restore previous document");
                }
            }
            return Err(err);
        }
        self.working_copy = Some(path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::TextAnnotation;
    use crate::fields::FieldKey;
    use crate::viewer::LoadedDocument;
    use crate::{DocumentInfo, RenderImage, RenderRequest};
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;
    use tempfile::{tempdir, TempDir};

    /// Documents are plain text: the first line is the page count, each further line an
    /// annotation. Anything without a numeric first line is corrupt.
    #[derive(Clone, Default)]
    struct TextEngine {
        annotations: Rc<RefCell<Vec<TextAnnotation>>>,
    }

    fn parse_pages(path: &Path) -> Result<(usize, Vec<String>)> {
        let body = fs::read_to_string(path).map_err(|err| EditorError::load(path, err))?;
        let mut lines = body.lines();
        let pages = lines
            .next()
            .and_then(|line| line.parse::<usize>().ok())
            .ok_or_else(|| EditorError::load(path, "corrupt"))?;
        Ok((pages, lines.map(str::to_owned).collect()))
    }

    impl PdfEngine for TextEngine {
        fn write_blank(&self, path: &Path, _title: &str) -> Result<()> {
            fs::write(path, "1\n").map_err(|err| EditorError::io(path, err))
        }

        fn page_count(&self, path: &Path) -> Result<usize> {
            parse_pages(path).map(|(pages, _)| pages)
        }

        fn annotate(&self, path: &Path, annotation: &TextAnnotation) -> Result<AnnotationReport> {
            annotation.validate()?;
            let (pages, mut lines) = parse_pages(path)?;
            let page_count = pages.max(annotation.page as usize);
            lines.push(format!("{}:{}", annotation.page, annotation.text));
            let body = format!("{page_count}\n{}\n", lines.join("\n"));
            fs::write(path, body).map_err(|err| EditorError::io(path, err))?;
            self.annotations.borrow_mut().push(annotation.clone());
            Ok(AnnotationReport {
                page_count,
                pages_appended: page_count - pages,
            })
        }
    }

    struct TextDocument {
        info: DocumentInfo,
    }

    impl LoadedDocument for TextDocument {
        fn info(&self) -> &DocumentInfo {
            &self.info
        }

        fn render_page(&self, _request: RenderRequest) -> Result<RenderImage> {
            Ok(RenderImage {
                width: 1,
                height: 1,
                pixels: vec![0; 4],
            })
        }
    }

    struct TextLoader;

    impl DocumentLoader for TextLoader {
        fn load(&self, path: &Path, _bytes: Vec<u8>) -> Result<Box<dyn LoadedDocument>> {
            let (page_count, _) = parse_pages(path)?;
            Ok(Box::new(TextDocument {
                info: DocumentInfo {
                    path: path.to_path_buf(),
                    page_count,
                    title: None,
                },
            }))
        }
    }

    #[derive(Default)]
    struct ScriptedPrompter {
        open_paths: VecDeque<PathBuf>,
        save_paths: VecDeque<PathBuf>,
        colors: VecDeque<Rgba>,
        notices: Vec<Notice>,
    }

    impl Prompter for ScriptedPrompter {
        fn open_path(&mut self) -> Option<PathBuf> {
            self.open_paths.pop_front()
        }

        fn save_path(&mut self) -> Option<PathBuf> {
            self.save_paths.pop_front()
        }

        fn color(&mut self, _current: Rgba) -> Option<Rgba> {
            self.colors.pop_front()
        }

        fn notify(&mut self, notice: Notice) {
            self.notices.push(notice);
        }
    }

    fn controller(dir: &TempDir) -> (Controller<TextEngine, TextLoader>, TextEngine) {
        let engine = TextEngine::default();
        let controller = Controller::new(
            engine.clone(),
            TempWorkspace::new(dir.path()),
            TextLoader,
        );
        (controller, engine)
    }

    #[test]
    fn save_as_before_any_document_only_notifies() {
        let dir = tempdir().unwrap();
        let (mut controller, _) = controller(&dir);
        let destination = dir.path().join("out.pdf");
        let mut prompter = ScriptedPrompter::default();
        prompter.save_paths.push_back(destination.clone());

        let outcome = controller.dispatch(Action::SaveAs, &mut prompter);

        assert_eq!(outcome, Outcome::Cancelled);
        assert_eq!(prompter.notices, vec![Notice::NothingToSave]);
        assert_eq!(prompter.save_paths.len(), 1, "no prompt expected");
        assert!(!destination.exists());
    }

    #[test]
    fn new_document_is_displayed_with_one_page() {
        let dir = tempdir().unwrap();
        let (mut controller, _) = controller(&dir);
        controller.new_document().unwrap();

        assert!(controller.has_working_copy());
        assert!(controller.source_path().is_none());
        assert_eq!(controller.viewer().info().unwrap().page_count, 1);
    }

    #[test]
    fn new_forgets_source_even_when_blank_copy_fails() {
        let dir = tempdir().unwrap();
        let scratch = dir.path().join("scratch");
        fs::create_dir_all(&scratch).unwrap();
        let source = dir.path().join("report.pdf");
        fs::write(&source, "2\n").unwrap();
        let mut controller = Controller::new(
            TextEngine::default(),
            TempWorkspace::new(&scratch),
            TextLoader,
        );
        controller.open(&source).unwrap();
        assert_eq!(controller.source_path(), Some(source.as_path()));

        fs::remove_dir_all(&scratch).unwrap();
        let err = controller.new_document().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
        assert!(controller.source_path().is_none());
    }

    #[test]
    fn add_text_creates_working_copy_when_missing() {
        let dir = tempdir().unwrap();
        let (mut controller, engine) = controller(&dir);

        let report = controller.add_text().unwrap();

        assert_eq!(report.page_count, 1);
        assert!(controller.has_working_copy());
        let recorded = engine.annotations.borrow();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].text, "Hello from PDFEditor!");
        assert_eq!(recorded[0].style.color, Rgba::BLACK);
    }

    #[test]
    fn add_text_uses_fields_and_color_then_reloads_viewer() {
        let dir = tempdir().unwrap();
        let (mut controller, engine) = controller(&dir);
        controller.new_document().unwrap();
        controller.fields_mut().set(FieldKey::Page, "3");
        controller.fields_mut().set(FieldKey::Text, "Hello");
        controller.set_color(Rgba::opaque(0, 0, 255));

        let report = controller.add_text().unwrap();

        assert_eq!(report.pages_appended, 2);
        assert_eq!(controller.viewer().info().unwrap().page_count, 3);
        let recorded = engine.annotations.borrow();
        assert_eq!(recorded[0].page, 3);
        assert_eq!(recorded[0].style.color, Rgba::opaque(0, 0, 255));
    }

    #[test]
    fn opening_missing_or_corrupt_file_keeps_previous_state() {
        let dir = tempdir().unwrap();
        let (mut controller, _) = controller(&dir);
        controller.new_document().unwrap();
        let previous = controller.working_copy().unwrap().to_path_buf();

        let corrupt = dir.path().join("corrupt.pdf");
        fs::write(&corrupt, "not a document").unwrap();
        let mut prompter = ScriptedPrompter::default();
        prompter.open_paths.push_back(dir.path().join("missing.pdf"));
        prompter.open_paths.push_back(corrupt);

        for _ in 0..2 {
            let outcome = controller.dispatch(Action::Open, &mut prompter);
            assert_eq!(outcome, Outcome::Failed(ErrorKind::DocumentLoad));
        }

        assert_eq!(prompter.notices.len(), 2);
        assert_eq!(controller.working_copy(), Some(previous.as_path()));
        assert_eq!(controller.viewer().info().unwrap().path, previous);
    }

    #[test]
    fn open_then_save_as_copies_working_copy() {
        let dir = tempdir().unwrap();
        let (mut controller, _) = controller(&dir);
        let source = dir.path().join("source.pdf");
        fs::write(&source, "2\n").unwrap();
        let destination = dir.path().join("exported.pdf");

        let mut prompter = ScriptedPrompter::default();
        prompter.open_paths.push_back(source.clone());
        prompter.save_paths.push_back(destination.clone());

        assert_eq!(controller.dispatch(Action::Open, &mut prompter), Outcome::Completed);
        assert_eq!(controller.source_path(), Some(source.as_path()));
        assert_ne!(controller.working_copy(), Some(source.as_path()));

        assert_eq!(controller.dispatch(Action::AddText, &mut prompter), Outcome::Completed);
        assert_eq!(controller.dispatch(Action::SaveAs, &mut prompter), Outcome::Completed);

        assert_eq!(prompter.notices, vec![Notice::Saved(destination.clone())]);
        assert_eq!(controller.source_path(), Some(destination.as_path()));
        assert_eq!(fs::read_to_string(&source).unwrap(), "2\n");
        let saved = fs::read_to_string(&destination).unwrap();
        assert!(saved.contains("1:Hello from PDFEditor!"));
    }

    #[test]
    fn cancelled_prompts_change_nothing() {
        let dir = tempdir().unwrap();
        let (mut controller, _) = controller(&dir);
        controller.new_document().unwrap();
        let mut prompter = ScriptedPrompter::default();

        assert_eq!(controller.dispatch(Action::Open, &mut prompter), Outcome::Cancelled);
        assert_eq!(controller.dispatch(Action::SaveAs, &mut prompter), Outcome::Cancelled);
        assert_eq!(controller.dispatch(Action::PickColor, &mut prompter), Outcome::Cancelled);
        assert_eq!(controller.color(), Rgba::BLACK);
        assert!(prompter.notices.is_empty());
    }

    #[test]
    fn pick_color_updates_active_color() {
        let dir = tempdir().unwrap();
        let (mut controller, _) = controller(&dir);
        let mut prompter = ScriptedPrompter::default();
        prompter.colors.push_back(Rgba::new(10, 20, 30, 40));

        assert_eq!(controller.dispatch(Action::PickColor, &mut prompter), Outcome::Completed);
        assert_eq!(controller.color(), Rgba::new(10, 20, 30, 40));
    }

    #[test]
    fn failed_annotation_surfaces_notice_and_leaves_file_untouched() {
        let dir = tempdir().unwrap();
        let (mut controller, _) = controller(&dir);
        controller.new_document().unwrap();
        let working = controller.working_copy().unwrap().to_path_buf();
        fs::write(&working, "broken").unwrap();
        let mut prompter = ScriptedPrompter::default();

        let outcome = controller.dispatch(Action::AddText, &mut prompter);

        assert_eq!(outcome, Outcome::Failed(ErrorKind::DocumentLoad));
        assert!(matches!(
            prompter.notices.as_slice(),
            [Notice::Failed { action: Action::AddText, .. }]
        ));
        assert_eq!(fs::read_to_string(&working).unwrap(), "broken");
    }

    #[test]
    fn add_text_recreates_vanished_working_copy() {
        let dir = tempdir().unwrap();
        let (mut controller, _) = controller(&dir);
        controller.new_document().unwrap();
        let first = controller.working_copy().unwrap().to_path_buf();
        fs::remove_file(&first).unwrap();

        controller.add_text().unwrap();

        assert_ne!(controller.working_copy(), Some(first.as_path()));
        assert!(controller.has_working_copy());
    }
}

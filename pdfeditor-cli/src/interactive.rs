use std::io::{self, Stdout};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use crossterm::cursor;
use crossterm::event::{self, Event};
use crossterm::terminal::{self, Clear, ClearType};
use pdfeditor_core::{
    Controller, DocumentLoader, Notice, Outcome, Prompter, RenderImage, Rgba, TempWorkspace,
};
use pdfeditor_edit::LopdfEngine;
use pdfeditor_tty::{
    compose_status, write_status_line, DrawParams, EventMapper, KittyRenderer, LineEdit,
    LineEditor, UiEvent,
};
use tracing::{info, warn};

use crate::{with_pdf_extension, StyleArgs};

type Session = Controller<LopdfEngine, Box<dyn DocumentLoader>>;

struct RawModeGuard;

impl RawModeGuard {
    fn new() -> Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
        let _ = crossterm::execute!(io::stdout(), cursor::Show);
    }
}

enum LoopAction {
    Continue,
    ContinueRedraw,
    Quit,
}

pub fn run(loader: Box<dyn DocumentLoader>, file: Option<&Path>, style: &StyleArgs) -> Result<()> {
    let mut session: Session = Controller::new(LopdfEngine, TempWorkspace::system(), loader);
    style.apply(session.fields_mut())?;
    if let Some(color) = style.color {
        session.set_color(color);
    }
    match file {
        Some(path) => {
            session
                .open(path)
                .with_context(|| format!("failed to open {path:?}"))?;
        }
        None => {
            session
                .new_document()
                .context("failed to create a blank document")?;
        }
    }

    let _raw = RawModeGuard::new()?;
    let mut stdout = io::stdout();
    crossterm::execute!(stdout, cursor::Hide)?;
    let mut renderer = KittyRenderer::new(stdout);
    let mut mapper = EventMapper::new();
    let mut prompter = TerminalPrompter::default();
    let mut dirty = true;

    loop {
        if dirty {
            redraw(&mut renderer, &session, &prompter, mapper.pending_input())?;
            dirty = false;
        }

        if !event::poll(Duration::from_millis(100))? {
            continue;
        }
        let ui_event = mapper.map_event(event::read()?);
        match handle_event(ui_event, &mut session, &mut prompter)? {
            LoopAction::ContinueRedraw => dirty = true,
            LoopAction::Continue => {
                draw_status_line(&mut renderer, &session, &prompter, mapper.pending_input())?;
            }
            LoopAction::Quit => break,
        }
    }

    session.shutdown();
    renderer.delete_images()?;
    renderer.clear_all()?;
    info!("session closed");
    Ok(())
}

fn handle_event(
    event: UiEvent,
    session: &mut Session,
    prompter: &mut TerminalPrompter,
) -> Result<LoopAction> {
    match event {
        UiEvent::Action(action) => {
            prompter.message = None;
            let outcome = session.dispatch(action, prompter);
            if outcome == Outcome::Completed && prompter.message.is_none() {
                prompter.message = Some(format!("{action} done"));
            }
            Ok(LoopAction::ContinueRedraw)
        }
        UiEvent::View(command) => {
            if session.viewer_mut().apply(command) {
                Ok(LoopAction::ContinueRedraw)
            } else {
                Ok(LoopAction::Continue)
            }
        }
        UiEvent::PromptSubmit { input } => {
            prompter.message = Some(match session.fields_mut().apply_assignment(&input) {
                Ok(key) => match session.fields().raw(key) {
                    Some(value) => format!("{key} = {value}"),
                    None => format!("{key} reset to default"),
                },
                Err(err) => err.to_string(),
            });
            Ok(LoopAction::Continue)
        }
        UiEvent::BeginPrompt | UiEvent::PromptChanged { .. } | UiEvent::PromptCancel => {
            Ok(LoopAction::Continue)
        }
        UiEvent::Quit => Ok(LoopAction::Quit),
        UiEvent::None => Ok(LoopAction::Continue),
    }
}

/// Collects answers on the status line. Notices stay visible until the next action.
#[derive(Default)]
struct TerminalPrompter {
    message: Option<String>,
}

impl TerminalPrompter {
    fn ask(&mut self, question: &str, initial: &str) -> Option<String> {
        let mut editor = LineEditor::with_text(initial);
        loop {
            if let Err(err) = self.draw_question(question, editor.text()) {
                warn!(%err, "failed to draw prompt");
                return None;
            }
            let event = match event::read() {
                Ok(event) => event,
                Err(err) => {
                    warn!(%err, "failed to read terminal input");
                    return None;
                }
            };
            match editor.handle(event) {
                LineEdit::Submit(answer) => {
                    let answer = answer.trim().to_owned();
                    return (!answer.is_empty()).then_some(answer);
                }
                LineEdit::Cancel => return None,
                LineEdit::Changed(_) | LineEdit::Ignored => {}
            }
        }
    }

    fn draw_question(&self, question: &str, answer: &str) -> io::Result<()> {
        let row = status_row()?;
        write_status_line(&mut io::stdout(), row, &format!("{question}: {answer}"), None)
    }
}

impl Prompter for TerminalPrompter {
    fn open_path(&mut self) -> Option<PathBuf> {
        self.ask("Open PDF", "").map(PathBuf::from)
    }

    fn save_path(&mut self) -> Option<PathBuf> {
        self.ask("Save as", "")
            .map(|answer| with_pdf_extension(Path::new(&answer)))
    }

    fn color(&mut self, current: Rgba) -> Option<Rgba> {
        let answer = self.ask("Color", &current.to_string())?;
        match answer.parse() {
            Ok(color) => Some(color),
            Err(err) => {
                self.message = Some(format!("{err}"));
                None
            }
        }
    }

    fn notify(&mut self, notice: Notice) {
        self.message = Some(notice.to_string());
    }
}

fn status_row() -> io::Result<u16> {
    let (_, rows) = terminal::size()?;
    Ok(rows.saturating_sub(1))
}

fn status_text(session: &Session, prompter: &TerminalPrompter, pending: Option<String>) -> String {
    let name = session
        .source_path()
        .and_then(|path| path.file_name())
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "untitled".to_owned());
    let viewer = session.viewer();
    let page = viewer
        .info()
        .map(|info| format!("page {}/{}", viewer.current_page() + 1, info.page_count));
    let zoom = format!("{:.0}%", viewer.scale() * 100.0);
    let color = session.color().to_string();
    compose_status([
        Some(name.as_str()),
        page.as_deref(),
        Some(zoom.as_str()),
        Some(color.as_str()),
        prompter.message.as_deref(),
        pending.as_deref(),
    ])
}

fn draw_status_line(
    renderer: &mut KittyRenderer<Stdout>,
    session: &Session,
    prompter: &TerminalPrompter,
    pending: Option<String>,
) -> Result<()> {
    let row = status_row()?;
    let text = status_text(session, prompter, pending);
    write_status_line(renderer.writer(), row, &text, Some(session.color()))?;
    Ok(())
}

fn redraw(
    renderer: &mut KittyRenderer<Stdout>,
    session: &Session,
    prompter: &TerminalPrompter,
    pending: Option<String>,
) -> Result<()> {
    let window = terminal::window_size()?;
    let total_cols = u32::from(window.columns).max(1);
    let total_rows = u32::from(window.rows).max(1);
    let pixel_width = u32::from(window.width);
    let pixel_height = u32::from(window.height);
    let image_rows = total_rows.saturating_sub(1).max(1);
    let available_cols = total_cols.saturating_sub(total_cols.min(2)).max(1);
    let available_rows = image_rows.saturating_sub(image_rows.min(2)).max(1);

    renderer.begin_sync_update()?;
    renderer.delete_images()?;
    renderer.clear_all()?;

    let viewer = session.viewer();
    let rendered = match viewer.render() {
        Ok(image) => image,
        Err(err) => {
            warn!(?err, page = viewer.current_page(), "failed to render page");
            None
        }
    };
    if let Some(mut image) = rendered {
        // Re-render sharper when the terminal has more pixels than the first pass produced.
        let ratio = upscale_ratio(
            &image,
            available_cols,
            available_rows,
            total_cols,
            total_rows,
            pixel_width,
            pixel_height,
        );
        if let Some(ratio) = ratio {
            let scale = (viewer.scale() * ratio).min(8.0);
            match viewer.render_with_scale(scale) {
                Ok(Some(sharper)) => image = sharper,
                Ok(None) => {}
                Err(err) => warn!(?err, scale, "sharper render failed"),
            }
        }

        let (draw_cols, draw_rows) = cells_for_image(
            &image,
            available_cols,
            available_rows,
            total_cols,
            total_rows,
            pixel_width,
            pixel_height,
        );
        let start_col = total_cols.saturating_sub(draw_cols) / 2;
        let start_row = image_rows.saturating_sub(draw_rows) / 2;
        crossterm::execute!(
            renderer.writer(),
            cursor::MoveTo(start_col as u16, start_row as u16)
        )?;
        renderer.draw(&image, DrawParams::clamped(draw_cols, draw_rows))?;
    } else {
        crossterm::execute!(
            renderer.writer(),
            cursor::MoveTo(0, 0),
            Clear(ClearType::CurrentLine)
        )?;
    }

    draw_status_line(renderer, session, prompter, pending)?;
    renderer.end_sync_update()?;
    Ok(())
}

fn cell_size(
    total_cols: u32,
    total_rows: u32,
    pixel_width: u32,
    pixel_height: u32,
) -> Option<(f32, f32)> {
    if pixel_width == 0 || pixel_height == 0 {
        return None;
    }
    Some((
        pixel_width as f32 / total_cols as f32,
        pixel_height as f32 / total_rows as f32,
    ))
}

fn upscale_ratio(
    image: &RenderImage,
    available_cols: u32,
    available_rows: u32,
    total_cols: u32,
    total_rows: u32,
    pixel_width: u32,
    pixel_height: u32,
) -> Option<f32> {
    let (cell_width, cell_height) = cell_size(total_cols, total_rows, pixel_width, pixel_height)?;
    if image.width == 0 || image.height == 0 {
        return None;
    }
    let width_ratio = cell_width * available_cols as f32 / image.width as f32;
    let height_ratio = cell_height * available_rows as f32 / image.height as f32;
    let ratio = width_ratio.min(height_ratio);
    (ratio > 1.05).then_some(ratio)
}

/// Terminal cells covered by `image`, keeping its aspect ratio inside the available area.
fn cells_for_image(
    image: &RenderImage,
    available_cols: u32,
    available_rows: u32,
    total_cols: u32,
    total_rows: u32,
    pixel_width: u32,
    pixel_height: u32,
) -> (u32, u32) {
    let available_cols = available_cols.max(1);
    let available_rows = available_rows.max(1);
    if image.width == 0 || image.height == 0 {
        return (available_cols, available_rows);
    }

    let (cols, rows) = match cell_size(total_cols, total_rows, pixel_width, pixel_height) {
        Some((cell_width, cell_height)) => {
            let cols = image.width as f32 / cell_width;
            let rows = image.height as f32 / cell_height;
            let shrink = (available_cols as f32 / cols)
                .min(available_rows as f32 / rows)
                .min(1.0);
            (cols * shrink, rows * shrink)
        }
        None => {
            // Cells are roughly twice as tall as they are wide.
            let ratio = image.width as f32 / image.height as f32 * 2.0;
            let mut cols = available_cols as f32;
            let mut rows = cols / ratio;
            if rows > available_rows as f32 {
                rows = available_rows as f32;
                cols = rows * ratio;
            }
            (cols, rows)
        }
    };

    (
        (cols.round() as u32).clamp(1, available_cols),
        (rows.round() as u32).clamp(1, available_rows),
    )
}

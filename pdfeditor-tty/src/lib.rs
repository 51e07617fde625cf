use std::io::{self, Write};

use anyhow::Result;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use crossterm::{
    cursor,
    event::{Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    style::{Attribute, Color, Print, ResetColor, SetAttribute, SetBackgroundColor},
    terminal::{Clear, ClearType},
};
use pdfeditor_core::{Action, RenderImage, Rgba, ViewCommand};
use png::{BitDepth, ColorType, Encoder};
use tracing::debug;

const CHUNK_SIZE: usize = 4096;

/// Writes page bitmaps with the kitty graphics protocol.
pub struct KittyRenderer<W: Write> {
    writer: W,
    image_id: u32,
    placement_id: u32,
}

pub struct DrawParams {
    pub columns: u32,
    pub rows: u32,
}

impl DrawParams {
    pub fn clamped(columns: u32, rows: u32) -> Self {
        Self {
            columns: columns.max(1),
            rows: rows.max(1),
        }
    }
}

impl<W: Write> KittyRenderer<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            image_id: 1,
            placement_id: 1,
        }
    }

    pub fn writer(&mut self) -> &mut W {
        &mut self.writer
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    /// Transmits `image` as PNG and places it at the cursor, replacing the previous placement.
    pub fn draw(&mut self, image: &RenderImage, params: DrawParams) -> Result<()> {
        let mut buffer = Vec::new();
        {
            let mut encoder = Encoder::new(&mut buffer, image.width, image.height);
            encoder.set_color(ColorType::Rgba);
            encoder.set_depth(BitDepth::Eight);
            let mut writer = encoder.write_header()?;
            writer.write_image_data(&image.pixels)?;
            writer.finish()?;
        }

        let encoded = BASE64.encode(&buffer);
        let mut chunks = encoded.as_bytes().chunks(CHUNK_SIZE).peekable();
        let mut first = true;
        while let Some(chunk) = chunks.next() {
            let more = u8::from(chunks.peek().is_some());
            if first {
                write!(
                    self.writer,
                    "\u{1b}_Ga=T,f=100,C=1,q=2,i={},p={},c={},r={},s={},v={},z=-1,m={more}",
                    self.image_id,
                    self.placement_id,
                    params.columns,
                    params.rows,
                    image.width,
                    image.height,
                )?;
                first = false;
            } else {
                write!(self.writer, "\u{1b}_Gm={more},q=2")?;
            }
            self.writer.write_all(b";")?;
            self.writer.write_all(chunk)?;
            self.writer.write_all(b"\x1b\\")?;
        }
        self.writer.flush()?;
        debug!(
            width = image.width,
            height = image.height,
            bytes = buffer.len(),
            "image transmitted"
        );
        Ok(())
    }

    /// Removes every image placement from the screen.
    pub fn delete_images(&mut self) -> Result<()> {
        write!(self.writer, "\u{1b}_Ga=d,d=A,q=2\u{1b}\\")?;
        Ok(())
    }

    pub fn begin_sync_update(&mut self) -> Result<()> {
        write!(self.writer, "\u{1b}[?2026h")?;
        Ok(())
    }

    /// The terminal renders all buffered changes at once.
    pub fn end_sync_update(&mut self) -> Result<()> {
        write!(self.writer, "\u{1b}[?2026l")?;
        self.writer.flush()?;
        Ok(())
    }

    pub fn clear_all(&mut self) -> Result<()> {
        crossterm::execute!(
            &mut self.writer,
            Clear(ClearType::All),
            cursor::MoveTo(0, 0)
        )?;
        Ok(())
    }
}

/// Outcome of feeding one key into a [`LineEditor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineEdit {
    Changed(String),
    Submit(String),
    Cancel,
    Ignored,
}

/// Single-line text input used by the `:` prompt and by modal path and color questions.
#[derive(Debug, Default, Clone)]
pub struct LineEditor {
    buffer: String,
}

impl LineEditor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_text(text: impl Into<String>) -> Self {
        Self {
            buffer: text.into(),
        }
    }

    pub fn text(&self) -> &str {
        &self.buffer
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    pub fn handle(&mut self, event: Event) -> LineEdit {
        let Event::Key(KeyEvent {
            code,
            modifiers,
            kind,
            ..
        }) = event
        else {
            return LineEdit::Ignored;
        };
        if kind == KeyEventKind::Release {
            return LineEdit::Ignored;
        }
        match (code, modifiers) {
            (KeyCode::Esc, _) => LineEdit::Cancel,
            (KeyCode::Char('c'), mods) if mods.contains(KeyModifiers::CONTROL) => LineEdit::Cancel,
            (KeyCode::Enter, _) => LineEdit::Submit(std::mem::take(&mut self.buffer)),
            (KeyCode::Backspace, _) => {
                self.buffer.pop();
                LineEdit::Changed(self.buffer.clone())
            }
            (KeyCode::Char('u'), mods) if mods.contains(KeyModifiers::CONTROL) => {
                self.buffer.clear();
                LineEdit::Changed(String::new())
            }
            (KeyCode::Char(c), mods) if mods.is_empty() || mods == KeyModifiers::SHIFT => {
                self.buffer.push(c);
                LineEdit::Changed(self.buffer.clone())
            }
            _ => LineEdit::Ignored,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    Action(Action),
    View(ViewCommand),
    BeginPrompt,
    PromptChanged { input: String },
    PromptSubmit { input: String },
    PromptCancel,
    Quit,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputMode {
    #[default]
    Normal,
    Prompt,
}

/// Turns terminal events into editor actions, view commands and prompt edits.
#[derive(Debug, Default)]
pub struct EventMapper {
    pending_count: Option<usize>,
    pending_digits: String,
    mode: InputMode,
    prompt: LineEditor,
}

impl EventMapper {
    pub const ZOOM_IN: f32 = 1.1;
    pub const ZOOM_OUT: f32 = 0.9;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_mode(&mut self, mode: InputMode) {
        if self.mode != mode {
            self.reset_count();
            self.prompt.clear();
            self.mode = mode;
        }
    }

    pub fn mode(&self) -> InputMode {
        self.mode
    }

    pub fn map_event(&mut self, event: Event) -> UiEvent {
        if let Event::Key(KeyEvent {
            kind: KeyEventKind::Release,
            ..
        }) = event
        {
            return UiEvent::None;
        }
        match self.mode {
            InputMode::Normal => self.map_event_normal(event),
            InputMode::Prompt => self.map_event_prompt(event),
        }
    }

    fn map_event_normal(&mut self, event: Event) -> UiEvent {
        let Event::Key(KeyEvent {
            code, modifiers, ..
        }) = event
        else {
            return UiEvent::None;
        };
        match (code, modifiers) {
            (KeyCode::Char(c), KeyModifiers::NONE) if c.is_ascii_digit() => {
                if let Some(digit) = c.to_digit(10) {
                    self.push_digit(digit as usize);
                }
                UiEvent::None
            }
            (KeyCode::Char('s'), mods) if mods.contains(KeyModifiers::CONTROL) => {
                self.action(Action::SaveAs)
            }
            (KeyCode::Char('c'), mods) if mods.contains(KeyModifiers::CONTROL) => {
                self.reset_count();
                UiEvent::Quit
            }
            (KeyCode::Char('n'), KeyModifiers::NONE) => self.action(Action::New),
            (KeyCode::Char('o'), KeyModifiers::NONE) => self.action(Action::Open),
            (KeyCode::Char('a'), KeyModifiers::NONE) => self.action(Action::AddText),
            (KeyCode::Char('s'), KeyModifiers::NONE) => self.action(Action::SaveAs),
            (KeyCode::Char('c'), KeyModifiers::NONE) => self.action(Action::PickColor),
            (KeyCode::Char(':'), _) => {
                self.set_mode(InputMode::Prompt);
                UiEvent::BeginPrompt
            }
            (KeyCode::Char('j'), KeyModifiers::NONE)
            | (KeyCode::Down, KeyModifiers::NONE)
            | (KeyCode::PageDown, _) => {
                let count = self.take_count();
                UiEvent::View(ViewCommand::NextPage { count })
            }
            (KeyCode::Char('k'), KeyModifiers::NONE)
            | (KeyCode::Up, KeyModifiers::NONE)
            | (KeyCode::PageUp, _) => {
                let count = self.take_count();
                UiEvent::View(ViewCommand::PrevPage { count })
            }
            (KeyCode::Char('g'), KeyModifiers::NONE) | (KeyCode::Home, _) => {
                // `5g` jumps to page 5
                let page = self.pending_count.take().unwrap_or(1).saturating_sub(1);
                self.reset_count();
                UiEvent::View(ViewCommand::GotoPage { page })
            }
            (KeyCode::Char('G'), _) | (KeyCode::End, _) => {
                self.reset_count();
                UiEvent::View(ViewCommand::GotoPage { page: usize::MAX })
            }
            (KeyCode::Char('+'), _) => {
                self.reset_count();
                UiEvent::View(ViewCommand::ScaleBy {
                    factor: Self::ZOOM_IN,
                })
            }
            (KeyCode::Char('-'), _) => {
                self.reset_count();
                UiEvent::View(ViewCommand::ScaleBy {
                    factor: Self::ZOOM_OUT,
                })
            }
            (KeyCode::Char('='), _) => {
                self.reset_count();
                UiEvent::View(ViewCommand::ResetScale)
            }
            (KeyCode::Char('q'), _) => {
                self.reset_count();
                UiEvent::Quit
            }
            _ => {
                self.reset_count();
                UiEvent::None
            }
        }
    }

    fn map_event_prompt(&mut self, event: Event) -> UiEvent {
        match self.prompt.handle(event) {
            LineEdit::Changed(input) => UiEvent::PromptChanged { input },
            LineEdit::Submit(input) => {
                self.set_mode(InputMode::Normal);
                UiEvent::PromptSubmit { input }
            }
            LineEdit::Cancel => {
                self.set_mode(InputMode::Normal);
                UiEvent::PromptCancel
            }
            LineEdit::Ignored => UiEvent::None,
        }
    }

    fn action(&mut self, action: Action) -> UiEvent {
        self.reset_count();
        UiEvent::Action(action)
    }

    fn push_digit(&mut self, digit: usize) {
        let current = self.pending_count.unwrap_or(0);
        self.pending_count = Some(current.saturating_mul(10).saturating_add(digit));
        if let Some(c) = char::from_digit(digit as u32, 10) {
            self.pending_digits.push(c);
        }
    }

    fn take_count(&mut self) -> usize {
        let count = self
            .pending_count
            .take()
            .filter(|&count| count > 0)
            .unwrap_or(1);
        self.pending_digits.clear();
        count
    }

    fn reset_count(&mut self) {
        self.pending_count = None;
        self.pending_digits.clear();
    }

    /// What the user has typed but not yet completed, for the status line.
    pub fn pending_input(&self) -> Option<String> {
        if self.mode == InputMode::Prompt {
            return Some(format!(":{}", self.prompt.text()));
        }
        if self.pending_digits.is_empty() {
            None
        } else {
            Some(self.pending_digits.clone())
        }
    }
}

/// Joins the non-empty status segments with ` | `.
pub fn compose_status<'a>(segments: impl IntoIterator<Item = Option<&'a str>>) -> String {
    segments
        .into_iter()
        .flatten()
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join(" | ")
}

/// Draws `label` in reverse video at `row`, prefixed by a two-cell swatch of `color`.
pub fn write_status_line<W: Write>(
    writer: &mut W,
    row: u16,
    label: &str,
    color: Option<Rgba>,
) -> io::Result<()> {
    crossterm::queue!(writer, cursor::MoveTo(0, row), Clear(ClearType::CurrentLine))?;
    if let Some(color) = color {
        crossterm::queue!(
            writer,
            SetBackgroundColor(Color::Rgb {
                r: color.r,
                g: color.g,
                b: color.b,
            }),
            Print("  "),
            ResetColor,
            Print(" ")
        )?;
    }
    crossterm::queue!(
        writer,
        SetAttribute(Attribute::Reverse),
        Print(label),
        SetAttribute(Attribute::Reset)
    )?;
    writer.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::KeyEventState;

    #[test]
    fn kitty_draw_emits_protocol() {
        let mut renderer = KittyRenderer::new(Vec::new());
        let image = RenderImage {
            width: 1,
            height: 1,
            pixels: vec![255, 0, 0, 255],
        };

        renderer.draw(&image, DrawParams::clamped(10, 5)).unwrap();
        let output = renderer.into_inner();
        assert!(output.starts_with(b"\x1b_Ga=T,f=100"));
        assert!(output.ends_with(b"\x1b\\"));
        let text = String::from_utf8_lossy(&output);
        assert!(text.contains("c=10,r=5,s=1,v=1"));
    }

    #[test]
    fn large_images_are_chunked() {
        let mut renderer = KittyRenderer::new(Vec::new());
        let mut state: u32 = 0x2545_f491;
        let pixels = (0..256 * 256 * 4)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                state as u8
            })
            .collect();
        let image = RenderImage {
            width: 256,
            height: 256,
            pixels,
        };
        renderer.draw(&image, DrawParams::clamped(0, 0)).unwrap();
        let text = String::from_utf8_lossy(&renderer.into_inner()).into_owned();
        assert!(text.contains("m=1"));
        assert!(text.contains("\u{1b}_Gm=0,q=2;"));
        assert!(text.contains("c=1,r=1"));
    }

    fn key_event(code: KeyCode) -> Event {
        key_event_with_modifiers(code, KeyModifiers::NONE)
    }

    fn key_event_with_modifiers(code: KeyCode, modifiers: KeyModifiers) -> Event {
        Event::Key(KeyEvent {
            code,
            modifiers,
            kind: KeyEventKind::Press,
            state: KeyEventState::NONE,
        })
    }

    #[test]
    fn event_mapper_maps_action_keys() {
        let mut mapper = EventMapper::new();
        let cases = [
            ('n', Action::New),
            ('o', Action::Open),
            ('a', Action::AddText),
            ('s', Action::SaveAs),
            ('c', Action::PickColor),
        ];
        for (key, action) in cases {
            assert_eq!(
                mapper.map_event(key_event(KeyCode::Char(key))),
                UiEvent::Action(action)
            );
        }
        assert_eq!(
            mapper.map_event(key_event_with_modifiers(
                KeyCode::Char('s'),
                KeyModifiers::CONTROL
            )),
            UiEvent::Action(Action::SaveAs)
        );
    }

    #[test]
    fn event_mapper_uses_numeric_prefix_for_next_page() {
        let mut mapper = EventMapper::new();
        assert_eq!(mapper.map_event(key_event(KeyCode::Char('1'))), UiEvent::None);
        assert_eq!(mapper.map_event(key_event(KeyCode::Char('2'))), UiEvent::None);
        assert_eq!(mapper.pending_input().as_deref(), Some("12"));

        assert_eq!(
            mapper.map_event(key_event(KeyCode::Char('j'))),
            UiEvent::View(ViewCommand::NextPage { count: 12 })
        );
        assert!(mapper.pending_input().is_none());
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Up)),
            UiEvent::View(ViewCommand::PrevPage { count: 1 })
        );
    }

    #[test]
    fn event_mapper_drops_prefix_on_other_key() {
        let mut mapper = EventMapper::new();
        mapper.map_event(key_event(KeyCode::Char('4')));
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Char('a'))),
            UiEvent::Action(Action::AddText)
        );
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Char('k'))),
            UiEvent::View(ViewCommand::PrevPage { count: 1 })
        );
    }

    #[test]
    fn event_mapper_goto_keys() {
        let mut mapper = EventMapper::new();
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Char('g'))),
            UiEvent::View(ViewCommand::GotoPage { page: 0 })
        );
        mapper.map_event(key_event(KeyCode::Char('5')));
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Char('g'))),
            UiEvent::View(ViewCommand::GotoPage { page: 4 })
        );
        assert_eq!(
            mapper.map_event(key_event_with_modifiers(
                KeyCode::Char('G'),
                KeyModifiers::SHIFT
            )),
            UiEvent::View(ViewCommand::GotoPage { page: usize::MAX })
        );
    }

    #[test]
    fn event_mapper_zoom_keys() {
        let mut mapper = EventMapper::new();
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Char('+'))),
            UiEvent::View(ViewCommand::ScaleBy {
                factor: EventMapper::ZOOM_IN
            })
        );
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Char('='))),
            UiEvent::View(ViewCommand::ResetScale)
        );
        assert_eq!(mapper.map_event(key_event(KeyCode::Char('q'))), UiEvent::Quit);
    }

    #[test]
    fn event_mapper_colon_collects_prompt_input() {
        let mut mapper = EventMapper::new();
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Char(':'))),
            UiEvent::BeginPrompt
        );
        assert_eq!(mapper.mode(), InputMode::Prompt);
        assert_eq!(mapper.pending_input().as_deref(), Some(":"));

        for c in "size=2".chars() {
            mapper.map_event(key_event(KeyCode::Char(c)));
        }
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Char('0'))),
            UiEvent::PromptChanged {
                input: "size=20".into()
            }
        );
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Backspace)),
            UiEvent::PromptChanged {
                input: "size=2".into()
            }
        );
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Enter)),
            UiEvent::PromptSubmit {
                input: "size=2".into()
            }
        );
        assert_eq!(mapper.mode(), InputMode::Normal);
        assert!(mapper.pending_input().is_none());
    }

    #[test]
    fn event_mapper_escape_cancels_prompt() {
        let mut mapper = EventMapper::new();
        mapper.map_event(key_event(KeyCode::Char(':')));
        mapper.map_event(key_event(KeyCode::Char('q')));
        assert_eq!(mapper.map_event(key_event(KeyCode::Esc)), UiEvent::PromptCancel);
        assert_eq!(mapper.mode(), InputMode::Normal);

        mapper.map_event(key_event(KeyCode::Char(':')));
        assert_eq!(mapper.pending_input().as_deref(), Some(":"));
    }

    #[test]
    fn line_editor_starts_from_initial_text() {
        let mut editor = LineEditor::with_text("#ff0000");
        editor.handle(key_event(KeyCode::Backspace));
        editor.handle(key_event(KeyCode::Backspace));
        assert_eq!(
            editor.handle(key_event(KeyCode::Char('8'))),
            LineEdit::Changed("#ff008".into())
        );
        assert_eq!(
            editor.handle(key_event_with_modifiers(
                KeyCode::Char('u'),
                KeyModifiers::CONTROL
            )),
            LineEdit::Changed(String::new())
        );
        assert_eq!(editor.handle(key_event(KeyCode::Left)), LineEdit::Ignored);
        assert_eq!(editor.handle(key_event(KeyCode::Enter)), LineEdit::Submit(String::new()));
    }

    #[test]
    fn status_segments_skip_empty_parts() {
        assert_eq!(
            compose_status([Some("doc.pdf"), None, Some(""), Some("page 1/2")]),
            "doc.pdf | page 1/2"
        );
    }

    #[test]
    fn status_line_draws_swatch_and_label() {
        let mut out = Vec::new();
        write_status_line(&mut out, 3, "page 1/1", Some(Rgba::opaque(255, 0, 0))).unwrap();
        let text = String::from_utf8_lossy(&out);
        assert!(text.contains("page 1/1"));
        assert!(text.contains("\u{1b}[4;1H"));
        assert!(text.contains("48;2;255;0;0"));
    }
}

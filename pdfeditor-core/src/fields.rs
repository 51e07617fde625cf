use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::annotation::{TextAnnotation, TextStyle};
use crate::color::Rgba;
use crate::error::{EditorError, Result};

pub const DEFAULT_TEXT: &str = "Hello from PDFEditor!";
pub const DEFAULT_PAGE: i64 = 1;
pub const DEFAULT_X: f64 = 36.0;
pub const DEFAULT_Y: f64 = 36.0;
pub const DEFAULT_SIZE: f64 = 16.0;
pub const DEFAULT_FONT: &str = "Arial";

/// Names of the recognized annotation options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FieldKey {
    Text,
    Page,
    X,
    Y,
    Size,
    Font,
    Bold,
    Italic,
}

impl FieldKey {
    pub const ALL: [FieldKey; 8] = [
        FieldKey::Text,
        FieldKey::Page,
        FieldKey::X,
        FieldKey::Y,
        FieldKey::Size,
        FieldKey::Font,
        FieldKey::Bold,
        FieldKey::Italic,
    ];

    pub fn name(self) -> &'static str {
        match self {
            FieldKey::Text => "text",
            FieldKey::Page => "page",
            FieldKey::X => "x",
            FieldKey::Y => "y",
            FieldKey::Size => "size",
            FieldKey::Font => "font",
            FieldKey::Bold => "bold",
            FieldKey::Italic => "italic",
        }
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FieldKey {
    type Err = EditorError;

    fn from_str(input: &str) -> Result<Self> {
        let lowered = input.trim().to_ascii_lowercase();
        FieldKey::ALL
            .into_iter()
            .find(|key| key.name() == lowered)
            .ok_or_else(|| EditorError::invalid(format!("unknown field {input:?}")))
    }
}

/// Raw option values keyed by field. Every typed read falls back to its own default when the
/// value is absent or does not parse, so a missing option never fails an action.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormFields {
    values: BTreeMap<FieldKey, String>,
}

#[derive(Debug, Deserialize)]
struct FieldFile {
    #[serde(flatten)]
    values: BTreeMap<String, toml::Value>,
}

impl FormFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: FieldKey, value: impl Into<String>) {
        self.values.insert(key, value.into());
    }

    pub fn unset(&mut self, key: FieldKey) -> Option<String> {
        self.values.remove(&key)
    }

    pub fn raw(&self, key: FieldKey) -> Option<&str> {
        self.values.get(&key).map(String::as_str)
    }

    /// Applies `key=value`, or `unset key`.
    pub fn apply_assignment(&mut self, input: &str) -> Result<FieldKey> {
        let trimmed = input.trim();
        if let Some(name) = trimmed.strip_prefix("unset ") {
            let key = name.parse::<FieldKey>()?;
            self.unset(key);
            return Ok(key);
        }
        let (name, value) = trimmed
            .split_once('=')
            .ok_or_else(|| EditorError::invalid(format!("expected KEY=VALUE, got {trimmed:?}")))?;
        let key = name.parse::<FieldKey>()?;
        self.set(key, value.trim());
        Ok(key)
    }

    /// Merges a TOML table of `field = value` pairs. Strings, numbers and booleans are accepted.
    pub fn merge_toml(&mut self, source: &str) -> Result<()> {
        let file: FieldFile = toml::from_str(source)
            .map_err(|err| EditorError::invalid(format!("malformed field file: {err}")))?;
        for (name, value) in file.values {
            let key = name.parse::<FieldKey>()?;
            let rendered = match value {
                toml::Value::String(s) => s,
                toml::Value::Integer(i) => i.to_string(),
                toml::Value::Float(f) => f.to_string(),
                toml::Value::Boolean(b) => b.to_string(),
                other => {
                    return Err(EditorError::invalid(format!(
                        "field {key} has unsupported value {other}"
                    )))
                }
            };
            self.set(key, rendered);
        }
        Ok(())
    }

    pub fn load_toml(&mut self, path: &Path) -> Result<()> {
        let source = std::fs::read_to_string(path).map_err(|err| EditorError::io(path, err))?;
        self.merge_toml(&source)
    }

    pub fn text(&self) -> String {
        match self.raw(FieldKey::Text) {
            Some(text) if !text.trim().is_empty() => text.to_owned(),
            _ => DEFAULT_TEXT.to_owned(),
        }
    }

    pub fn int(&self, key: FieldKey, fallback: i64, min: i64, max: i64) -> i64 {
        match self.raw(key).map(|raw| raw.trim().parse::<i64>()) {
            Some(Ok(value)) => value.clamp(min, max),
            Some(Err(_)) => {
                debug!(field = %key, "unparsable integer, using fallback");
                fallback
            }
            None => fallback,
        }
    }

    pub fn double(&self, key: FieldKey, fallback: f64) -> f64 {
        match self.raw(key).map(|raw| raw.trim().parse::<f64>()) {
            Some(Ok(value)) if value.is_finite() => value,
            Some(_) => {
                debug!(field = %key, "unparsable number, using fallback");
                fallback
            }
            None => fallback,
        }
    }

    pub fn flag(&self, key: FieldKey) -> bool {
        matches!(
            self.raw(key).map(|raw| raw.trim().to_ascii_lowercase()).as_deref(),
            Some("true" | "1" | "yes" | "on")
        )
    }

    pub fn page(&self) -> u32 {
        self.int(FieldKey::Page, DEFAULT_PAGE, 1, i64::from(u32::MAX)) as u32
    }

    pub fn size(&self) -> f64 {
        let size = self.double(FieldKey::Size, DEFAULT_SIZE);
        if size > 0.0 {
            size
        } else {
            warn!(size, "non-positive font size, using default");
            DEFAULT_SIZE
        }
    }

    pub fn font_name(&self) -> String {
        match self.raw(FieldKey::Font) {
            Some(font) if !font.trim().is_empty() => font.trim().to_owned(),
            _ => DEFAULT_FONT.to_owned(),
        }
    }

    pub fn annotation(&self, color: Rgba) -> TextAnnotation {
        TextAnnotation {
            page: self.page(),
            x: self.double(FieldKey::X, DEFAULT_X),
            y: self.double(FieldKey::Y, DEFAULT_Y),
            text: self.text(),
            style: TextStyle {
                font_family: self.font_name(),
                size: self.size(),
                bold: self.flag(FieldKey::Bold),
                italic: self.flag(FieldKey::Italic),
                color,
            },
        }
    }
}

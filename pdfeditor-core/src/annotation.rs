use crate::color::Rgba;
use crate::error::{EditorError, Result};
use crate::fields::{DEFAULT_FONT, DEFAULT_SIZE};

#[derive(Debug, Clone, PartialEq)]
pub struct TextStyle {
    pub font_family: String,
    /// Point size.
    pub size: f64,
    pub bold: bool,
    pub italic: bool,
    pub color: Rgba,
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            font_family: DEFAULT_FONT.to_owned(),
            size: DEFAULT_SIZE,
            bold: false,
            italic: false,
            color: Rgba::BLACK,
        }
    }
}

/// A text string to draw onto one page of the working copy.
///
/// `page` is 1-based. `x`/`y` are PDF points measured from the top-left corner of the page's
/// MediaBox, with `y` growing downward and addressing the text baseline.
#[derive(Debug, Clone, PartialEq)]
pub struct TextAnnotation {
    pub page: u32,
    pub x: f64,
    pub y: f64,
    pub text: String,
    pub style: TextStyle,
}

impl TextAnnotation {
    pub fn validate(&self) -> Result<()> {
        if self.page < 1 {
            return Err(EditorError::invalid("page number must be at least 1"));
        }
        if !self.style.size.is_finite() || self.style.size <= 0.0 {
            return Err(EditorError::invalid(format!(
                "font size must be positive, got {}",
                self.style.size
            )));
        }
        if !self.x.is_finite() || !self.y.is_finite() {
            return Err(EditorError::invalid(format!(
                "position ({}, {}) is not finite",
                self.x, self.y
            )));
        }
        if self.text.is_empty() {
            return Err(EditorError::invalid("annotation text is empty"));
        }
        if self.style.font_family.trim().is_empty() {
            return Err(EditorError::invalid("font family is empty"));
        }
        Ok(())
    }
}

/// What an annotation did to the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnnotationReport {
    pub page_count: usize,
    pub pages_appended: usize,
}

//! Session logic for the PDF editor: the working-copy workspace, the viewer adapter, annotation
//! requests built from form fields, and the controller that ties user actions to them.

use std::path::PathBuf;

pub mod annotation;
pub mod color;
pub mod controller;
pub mod engine;
pub mod error;
pub mod fields;
pub mod viewer;
pub mod workspace;

pub use annotation::{AnnotationReport, TextAnnotation, TextStyle};
pub use color::Rgba;
pub use controller::{Action, Controller, Notice, Outcome, Prompter, SaveStatus};
pub use engine::PdfEngine;
pub use error::{EditorError, ErrorKind, Result};
pub use fields::{FieldKey, FormFields};
pub use viewer::{DocumentLoader, ExclusiveAccess, LoadedDocument, ViewCommand, Viewer};
pub use workspace::{TempWorkspace, DEFAULT_TITLE, SCRATCH_PREFIX};

#[derive(Debug, Clone, PartialEq)]
pub struct DocumentInfo {
    pub path: PathBuf,
    pub page_count: usize,
    pub title: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct RenderRequest {
    pub page_index: usize,
    pub scale: f32,
}

impl Default for RenderRequest {
    fn default() -> Self {
        Self {
            page_index: 0,
            scale: 1.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RenderImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, instrument};
use uuid::Uuid;

use crate::engine::PdfEngine;
use crate::error::{EditorError, Result};

pub const SCRATCH_PREFIX: &str = "PDFEditor_";
pub const DEFAULT_TITLE: &str = "New Document";

/// Hands out uniquely named scratch files for working copies.
#[derive(Debug, Clone)]
pub struct TempWorkspace {
    root: PathBuf,
}

impl TempWorkspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Scratch files under the OS temp directory.
    pub fn system() -> Self {
        Self::new(std::env::temp_dir())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn scratch_path(&self) -> PathBuf {
        self.root
            .join(format!("{}{}.pdf", SCRATCH_PREFIX, Uuid::new_v4().simple()))
    }

    #[instrument(skip(self, engine))]
    pub fn create_blank_document<E: PdfEngine + ?Sized>(&self, engine: &E) -> Result<PathBuf> {
        let path = self.scratch_path();
        engine.write_blank(&path, DEFAULT_TITLE)?;
        debug!(path = %path.display(), "created blank working copy");
        Ok(path)
    }

    #[instrument(skip(self))]
    pub fn copy_to_temp(&self, source: &Path) -> Result<PathBuf> {
        let bytes = fs::read(source).map_err(|err| EditorError::io(source, err))?;
        let path = self.scratch_path();
        fs::write(&path, bytes).map_err(|err| EditorError::io(&path, err))?;
        debug!(source = %source.display(), path = %path.display(), "copied into workspace");
        Ok(path)
    }

    /// Copies the working copy to `destination`, replacing whatever is there.
    #[instrument(skip(self))]
    pub fn export(&self, working_copy: &Path, destination: &Path) -> Result<u64> {
        if working_copy == destination {
            return fs::metadata(working_copy)
                .map(|meta| meta.len())
                .map_err(|err| EditorError::io(working_copy, err));
        }
        fs::copy(working_copy, destination).map_err(|err| EditorError::io(destination, err))
    }
}

impl Default for TempWorkspace {
    fn default() -> Self {
        Self::system()
    }
}

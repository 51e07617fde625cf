use std::io::{BufWriter, Write};
use std::path::Path;

use lopdf::Document;
use pdfeditor_core::{EditorError, Result};
use tempfile::NamedTempFile;
use tracing::debug;

/// Serializes `doc` next to `path` and renames it into place, so readers never observe a
/// partially written file.
pub fn save_atomically(doc: &mut Document, path: &Path) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let staged = NamedTempFile::new_in(parent).map_err(|err| EditorError::io(parent, err))?;
    {
        let mut writer = BufWriter::new(staged.as_file());
        doc.save_to(&mut writer)
            .map_err(|err| EditorError::io(path, err))?;
        writer.flush().map_err(|err| EditorError::io(path, err))?;
    }
    staged
        .as_file()
        .sync_all()
        .map_err(|err| EditorError::io(path, err))?;
    staged
        .persist(path)
        .map_err(|err| EditorError::io(path, err.error))?;
    debug!(path = %path.display(), "document persisted");
    Ok(())
}

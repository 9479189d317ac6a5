//! Preview images written to a directory
//!
//! Each published preview becomes `page-<n>-<uuid>.png` inside the target
//! directory; releasing the handle deletes the file. Previews still held when
//! the import finishes stay on disk.

use std::fs;
use std::path::{Path, PathBuf};

use statement_core::{PreviewError, PreviewHandle, PreviewHost};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct DirectoryPreviewHost {
    dir: PathBuf,
}

impl DirectoryPreviewHost {
    /// Use `dir` for preview files, creating it if needed
    pub fn new(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl PreviewHost for DirectoryPreviewHost {
    fn publish(&self, page: u32, image: &[u8]) -> Result<PreviewHandle, PreviewError> {
        let path = self.dir.join(format!("page-{}-{}.png", page, Uuid::new_v4()));
        fs::write(&path, image)
            .map_err(|e| PreviewError(format!("{}: {}", path.display(), e)))?;

        debug!(page, path = %path.display(), "Wrote preview");
        Ok(PreviewHandle {
            page,
            locator: path.display().to_string(),
        })
    }

    fn release(&self, handle: &PreviewHandle) -> Result<(), PreviewError> {
        fs::remove_file(&handle.locator)
            .map_err(|e| PreviewError(format!("{}: {}", handle.locator, e)))
    }
}

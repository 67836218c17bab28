//! Atomic JSON output

use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use crate::error::{Error, Result};
use crate::types::QaPair;

/// Writes the final dataset next to its destination, then renames it into place
#[derive(Debug, Clone)]
pub struct OutputWriter {
    path: PathBuf,
    dir: PathBuf,
}

impl OutputWriter {
    /// Check that the destination is writable before any work starts
    pub fn prepare(path: &Path) -> Result<Self> {
        if path.is_dir() {
            return Err(Error::output(path, "path is a directory"));
        }

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        if !dir.is_dir() {
            return Err(Error::output(
                path,
                format!("directory '{}' does not exist", dir.display()),
            ));
        }

        // Probe with a throwaway temp file in the same directory
        NamedTempFile::new_in(&dir)
            .map_err(|e| Error::output(path, format!("directory is not writable: {}", e)))?;

        Ok(Self {
            path: path.to_path_buf(),
            dir,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Serialize pairs as a 2-space indented JSON array and move it into place
    pub fn write(&self, pairs: &[QaPair]) -> Result<()> {
        let mut file = NamedTempFile::new_in(&self.dir)
            .map_err(|e| Error::output(&self.path, e.to_string()))?;

        serde_json::to_writer_pretty(&mut file, pairs)?;
        file.write_all(b"\n")
            .and_then(|_| file.flush())
            .map_err(|e| Error::output(&self.path, e.to_string()))?;

        file.persist(&self.path)
            .map_err(|e| Error::output(&self.path, e.error.to_string()))?;

        tracing::info!("Wrote {} pairs to {}", pairs.len(), self.path.display());
        Ok(())
    }
}

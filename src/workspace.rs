use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::debug;

use crate::error::{OutputError, Result};

/// Scoped working directory for one run.
///
/// Extracted archives, the working copy of the source and staged outputs
/// all live here. The directory and everything in it is removed when the
/// workspace is dropped, on success and on error alike.
#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    pub fn new(base: Option<&Path>) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("rototiller-");
        let dir = match base {
            Some(base) => builder.tempdir_in(base),
            None => builder.tempdir(),
        }
        .map_err(|source| OutputError::Io {
            path: base.map_or_else(std::env::temp_dir, Path::to_path_buf),
            source,
        })?;
        debug!("Working directory: {}", dir.path().display());
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Directory archives are extracted into.
    pub fn input_dir(&self) -> PathBuf {
        self.dir.path().join("input")
    }

    /// Directory outputs are staged in before packaging.
    pub fn staging_dir(&self) -> PathBuf {
        self.dir.path().join("staging")
    }

    /// Path of a working document inside the workspace.
    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Removes the extracted input, once nothing reads from it any more.
    pub fn discard_input(&self) -> Result<()> {
        let dir = self.input_dir();
        if dir.exists() {
            fs::remove_dir_all(&dir).map_err(|source| OutputError::Io { path: dir, source })?;
        }
        Ok(())
    }
}

//! Directory-backed shared log store.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::trace;
use uuid::Uuid;

use super::SharedLog;
use crate::error::{LimiterError, Result};

/// Stores each document as `<dir>/<id>.json`.
///
/// Writes go to a uniquely named temporary file that is renamed over the
/// document, so a reader never sees a partially written document.
#[derive(Debug, Clone)]
pub struct FileSharedLog {
    dir: PathBuf,
}

impl FileSharedLog {
    /// Open a store rooted at `dir`, creating the directory if needed.
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// The directory documents are stored in.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &str) -> Result<PathBuf> {
        if id.is_empty() || id.contains(['/', '\\']) || id == "." || id == ".." {
            return Err(LimiterError::Store(format!("invalid document id '{}'", id)));
        }
        Ok(self.dir.join(format!("{}.json", id)))
    }
}

impl SharedLog for FileSharedLog {
    fn exists(&self, id: &str) -> Result<bool> {
        match fs::metadata(self.path_for(id)?) {
            Ok(metadata) => Ok(metadata.is_file()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn get(&self, id: &str) -> Result<Option<String>> {
        match fs::read_to_string(self.path_for(id)?) {
            Ok(document) => Ok(Some(document)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, id: &str, document: &str) -> Result<()> {
        let path = self.path_for(id)?;
        let tmp = self.dir.join(format!(".{}.{}.tmp", id, Uuid::new_v4()));

        fs::write(&tmp, document)?;
        if let Err(e) = fs::rename(&tmp, &path) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }

        trace!(path = %path.display(), bytes = document.len(), "Wrote shared log document");
        Ok(())
    }
}

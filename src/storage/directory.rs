//! JSON-document directory store.

use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use parking_lot::Mutex;

use super::{ModelStore, matches_pattern, model_location};
use crate::error::{Error, Result};
use crate::model::Model;

/// A store keeping one JSON document per model under a study directory.
///
/// Each model lives at `<root>/<name>/<name>.mcfg`. Writes go to a
/// temporary file that is renamed into place while holding an exclusive
/// lock; reads take a shared lock, so several processes can reconcile the
/// same directory.
///
/// # Examples
///
/// ```no_run
/// use simrun::storage::{DirectoryStore, ModelStore};
///
/// let store = DirectoryStore::new("/data/study");
/// let files = store.list("*.mcfg").unwrap();
/// ```
#[derive(Debug)]
pub struct DirectoryStore {
    root: PathBuf,
    /// Serialise in-process writes so we only hold the file lock briefly.
    write_lock: Mutex<()>,
}

impl DirectoryStore {
    /// Creates a store rooted at `root`. The directory is created on first write.
    #[must_use]
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    /// The study directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ModelStore for DirectoryStore {
    fn list(&self, pattern: &str) -> Result<Vec<PathBuf>> {
        if !self.root.is_dir() {
            return Err(Error::Storage(format!(
                "{} is not a directory",
                self.root.display()
            )));
        }
        let mut files = walk(&self.root)?;
        files.retain(|path| {
            path.file_name()
                .is_some_and(|n| matches_pattern(&n.to_string_lossy(), pattern))
        });
        files.sort();
        Ok(files)
    }

    fn load(&self, location: &Path) -> Result<Model> {
        let file = File::open(location).map_err(|e| storage_error(location, &e))?;
        file.lock_shared().map_err(|e| storage_error(location, &e))?;
        let parsed: serde_json::Result<Model> = serde_json::from_reader(BufReader::new(&file));
        file.unlock().map_err(|e| storage_error(location, &e))?;

        let mut model = parsed.map_err(|e| storage_error(location, &e))?;
        model.config_path = Some(location.to_path_buf());
        Ok(model)
    }

    fn persist(&self, model: &Model) -> Result<PathBuf> {
        let _guard = self.write_lock.lock();

        let location = self.root.join(model_location(&model.name));
        let parent = location.parent().unwrap_or(&self.root);
        fs::create_dir_all(parent).map_err(|e| storage_error(parent, &e))?;

        // Atomic write: temp file in the same directory, then rename.
        let tmp = parent.join(format!(".{}.mcfg.tmp", model.name));
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp)
            .map_err(|e| storage_error(&tmp, &e))?;
        file.lock_exclusive().map_err(|e| storage_error(&tmp, &e))?;
        {
            let mut writer = BufWriter::new(&file);
            serde_json::to_writer_pretty(&mut writer, model).map_err(|e| storage_error(&tmp, &e))?;
            writer.flush().map_err(|e| storage_error(&tmp, &e))?;
        }
        file.unlock().map_err(|e| storage_error(&tmp, &e))?;
        fs::rename(&tmp, &location).map_err(|e| storage_error(&location, &e))?;

        trace_debug!(model = %model.name, path = %location.display(), "model persisted");
        Ok(location)
    }
}

fn storage_error(path: &Path, err: &dyn core::fmt::Display) -> Error {
    Error::Storage(format!("{}: {err}", path.display()))
}

/// Every regular file below `dir`, recursively.
fn walk(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let entries = fs::read_dir(dir).map_err(|e| storage_error(dir, &e))?;
    for entry in entries {
        let path = entry.map_err(|e| storage_error(dir, &e))?.path();
        if path.is_dir() {
            files.extend(walk(&path)?);
        } else {
            files.push(path);
        }
    }
    Ok(files)
}

//! Model stores.
//!
//! A [`ModelStore`] is the backing store that owns model documents. The
//! [`ModelCache`](crate::ModelCache) only indexes what a store holds: it
//! lists entries matching a file-name pattern, loads them one by one and
//! keeps going when an individual entry cannot be read.
//!
//! # Available backends
//!
//! | Backend | Description | Feature flag |
//! |---------|-------------|-------------|
//! | [`MemoryStore`] | In-memory map behind a read-write lock | none |
//! | `DirectoryStore` | One JSON document per model under a study directory, `fs2` file locking | `directory` |
//!
//! # Implementing a custom backend
//!
//! Implement [`list`](ModelStore::list), [`load`](ModelStore::load) and
//! [`persist`](ModelStore::persist). Locations are opaque paths: the cache
//! passes back exactly what `list` returned.

#[cfg(feature = "directory")]
mod directory;

use std::path::{Path, PathBuf};

#[cfg(feature = "directory")]
pub use directory::DirectoryStore;

mod memory;
pub use memory::MemoryStore;

use crate::error::Result;
use crate::model::Model;

/// Default file-name pattern for model documents.
pub const MODEL_PATTERN: &str = "*.mcfg";

/// Trait for stores holding model documents.
///
/// Implementations must be `Send + Sync` so a study holding one can be
/// shared by reference with the optimizer closure.
pub trait ModelStore: Send + Sync {
    /// Return the locations of every entry whose file name matches `pattern`.
    ///
    /// `pattern` supports `*` (any run of characters) and `?` (one character).
    fn list(&self, pattern: &str) -> Result<Vec<PathBuf>>;

    /// Load the model stored at `location`.
    fn load(&self, location: &Path) -> Result<Model>;

    /// Write `model` to the store and return its location.
    fn persist(&self, model: &Model) -> Result<PathBuf>;
}

/// Matches a file name against a `*`/`?` wildcard pattern.
pub(crate) fn matches_pattern(name: &str, pattern: &str) -> bool {
    let name: Vec<char> = name.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();
    let (mut n, mut p) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while n < name.len() {
        match pattern.get(p) {
            Some('*') => {
                backtrack = Some((p, n));
                p += 1;
            }
            Some(&c) if c == '?' || c == name[n] => {
                n += 1;
                p += 1;
            }
            _ => match backtrack {
                Some((star, matched)) => {
                    p = star + 1;
                    n = matched + 1;
                    backtrack = Some((star, matched + 1));
                }
                None => return false,
            },
        }
    }
    pattern[p..].iter().all(|&c| c == '*')
}

/// The location a model document is written to, relative to a store root.
pub(crate) fn model_location(name: &str) -> PathBuf {
    Path::new(name).join(format!("{name}.mcfg"))
}

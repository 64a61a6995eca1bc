// files.rs -- file system abstraction for the renderer and asset pipeline

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

/// Timestamp reported for files that could not be opened. Callers doing
/// staleness checks treat this as "never loads".
pub const FILE_NOT_FOUND_TIMESTAMP: u64 = 0xFFFF_FFFF;

/// The file system context. All renderer I/O goes through here so the search
/// path layout stays in one place.
pub struct FsContext {
    pub basedir: PathBuf,
}

impl FsContext {
    pub fn new(basedir: impl Into<PathBuf>) -> Self {
        Self {
            basedir: basedir.into(),
        }
    }

    fn resolve(&self, name: &str) -> PathBuf {
        self.basedir.join(name)
    }

    fn mtime(path: &Path) -> u64 {
        fs::metadata(path)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs())
            .unwrap_or(FILE_NOT_FOUND_TIMESTAMP)
    }

    /// Loads a file into memory. Returns `None` if not found.
    pub fn load_file(&self, name: &str) -> Option<Vec<u8>> {
        fs::read(self.resolve(name)).ok()
    }

    /// Loads a file and its modification timestamp in one open.
    pub fn load_file_with_timestamp(&self, name: &str) -> Option<(Vec<u8>, u64)> {
        let path = self.resolve(name);
        let buf = fs::read(&path).ok()?;
        Some((buf, Self::mtime(&path)))
    }

    /// Returns the modification timestamp without reading the contents, or
    /// `FILE_NOT_FOUND_TIMESTAMP` when the file can't be opened.
    pub fn file_timestamp(&self, name: &str) -> u64 {
        let path = self.resolve(name);
        if !path.is_file() {
            return FILE_NOT_FOUND_TIMESTAMP;
        }
        Self::mtime(&path)
    }

    /// Writes a buffer to disk, creating parent directories as needed.
    pub fn write_file(&self, name: &str, data: &[u8]) -> std::io::Result<()> {
        let path = self.resolve(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut f = fs::File::create(path)?;
        f.write_all(data)
    }
}

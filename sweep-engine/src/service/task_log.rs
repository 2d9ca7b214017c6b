//! Task log service
//!
//! Every task writes a private plain-text log: a header, step markers, and
//! the raw stdout/stderr of every step. Step processes write straight into
//! the file through duplicated handles, so nothing is buffered in memory.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Mutex;
use tracing::warn;

use sweep_core::RepoTarget;

/// Creates task logs in a directory
#[derive(Debug, Clone)]
pub struct LogManager {
    dir: PathBuf,
}

impl LogManager {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Opens a new, uniquely named log for `repo`
    pub fn create(&self, repo: &RepoTarget, unique: &str) -> std::io::Result<TaskLog> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self
            .dir
            .join(format!("sweep-{}-{}.log", repo.slug(), unique));
        TaskLog::open(path)
    }
}

/// Append-only log file of one task
pub struct TaskLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl TaskLog {
    fn open(path: PathBuf) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one line
    ///
    /// Write failures are logged and otherwise ignored; a broken log never
    /// fails the task it describes.
    pub fn line(&self, message: impl AsRef<str>) {
        let mut file = self.file.lock().unwrap();
        if let Err(e) = writeln!(file, "{}", message.as_ref()) {
            warn!("Failed to write to {}: {}", self.path.display(), e);
        }
    }

    /// A handle suitable for a child's stdout or stderr
    pub fn stdio(&self) -> std::io::Result<Stdio> {
        let file = self.file.lock().unwrap();
        Ok(Stdio::from(file.try_clone()?))
    }

    /// Deletes the log file
    pub fn remove(self) {
        let path = self.path;
        drop(self.file);
        if let Err(e) = std::fs::remove_file(&path) {
            warn!("Failed to remove log {}: {}", path.display(), e);
        }
    }
}

//! File I/O manager
//!
//! Every artifact write goes through [`FileManager`]. Atomic writes land in
//! a temporary file in the destination directory and are renamed over the
//! destination, so readers see either the old complete file or the new one.

use crate::error::{Error, Result};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Suffix appended to a file name for its backup copy.
pub const BACKUP_SUFFIX: &str = "backup";

/// How a write should be performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOptions {
    /// Write to a sibling temp file, then rename over the destination
    pub atomic: bool,
    /// Copy an existing destination to `<name>.backup` first
    pub backup: bool,
    /// Unix mode bits applied to the new file
    pub permissions: Option<u32>,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            atomic: true,
            backup: false,
            permissions: None,
        }
    }
}

impl WriteOptions {
    pub fn with_backup(mut self) -> Self {
        self.backup = true;
        self
    }

    pub fn with_permissions(mut self, mode: u32) -> Self {
        self.permissions = Some(mode);
        self
    }
}

/// What a write did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOutcome {
    pub bytes_written: usize,
    pub backup_path: Option<PathBuf>,
}

/// Shared file operations for all persistence steps.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileManager;

impl FileManager {
    pub fn new() -> Self {
        Self
    }

    /// Create `dir` and its parents. Idempotent.
    pub fn ensure_dir(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir).map_err(|e| Error::file_op(dir, e))
    }

    /// Read a whole file as UTF-8.
    pub fn read(&self, path: &Path) -> Result<String> {
        fs::read_to_string(path).map_err(|e| Error::file_op(path, e))
    }

    /// Write `content` to `path`.
    pub fn write(&self, path: &Path, content: &str, options: WriteOptions) -> Result<WriteOutcome> {
        let backup_path = if options.backup && path.exists() {
            Some(self.backup(path)?)
        } else {
            None
        };

        if options.atomic {
            let mut staged = self.stage(path)?;
            staged.write_all(content.as_bytes())?;
            if let Some(mode) = options.permissions {
                staged.set_permissions(mode)?;
            }
            staged.commit()?;
        } else {
            if let Some(parent) = parent_dir(path) {
                self.ensure_dir(parent)?;
            }
            fs::write(path, content).map_err(|e| Error::file_op(path, e))?;
            if let Some(mode) = options.permissions {
                set_mode(path, mode)?;
            }
        }

        tracing::debug!(
            path = %path.display(),
            bytes = content.len(),
            atomic = options.atomic,
            backup = backup_path.is_some(),
            "Wrote file"
        );

        Ok(WriteOutcome {
            bytes_written: content.len(),
            backup_path,
        })
    }

    /// Begin an atomic write. Nothing is visible at `path` until
    /// [`StagedWrite::commit`]; dropping the stage discards it.
    pub fn stage(&self, path: &Path) -> Result<StagedWrite> {
        let parent = parent_dir(path).unwrap_or_else(|| Path::new("."));
        self.ensure_dir(parent)?;
        let temp = NamedTempFile::new_in(parent).map_err(|e| Error::file_op(parent, e))?;
        Ok(StagedWrite {
            temp,
            destination: path.to_path_buf(),
        })
    }

    /// Append one line to a file, creating it and its directory if needed.
    pub fn append_line(&self, path: &Path, line: &str) -> Result<()> {
        if let Some(parent) = parent_dir(path) {
            self.ensure_dir(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| Error::file_op(path, e))?;
        writeln!(file, "{line}").map_err(|e| Error::file_op(path, e))
    }

    /// Copy `path` to `<path>.backup`, replacing an older backup.
    pub fn backup(&self, path: &Path) -> Result<PathBuf> {
        let backup = backup_path(path);
        fs::copy(path, &backup).map_err(|e| Error::file_op(&backup, e))?;
        Ok(backup)
    }

    /// Move `path` into `archive_dir`, keeping its file name.
    pub fn archive(&self, path: &Path, archive_dir: &Path) -> Result<PathBuf> {
        self.ensure_dir(archive_dir)?;
        let name = path
            .file_name()
            .ok_or_else(|| Error::file_op(path, "path has no file name"))?;
        let target = archive_dir.join(name);
        fs::rename(path, &target).map_err(|e| Error::file_op(path, e))?;
        Ok(target)
    }

    /// Remove a file. A file that is already gone is not an error.
    pub fn remove(&self, path: &Path) -> Result<()> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::file_op(path, e)),
        }
    }
}

/// A write in progress. See [`FileManager::stage`].
pub struct StagedWrite {
    temp: NamedTempFile,
    destination: PathBuf,
}

impl StagedWrite {
    pub fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        self.temp
            .write_all(bytes)
            .map_err(|e| Error::file_op(self.temp.path(), e))
    }

    pub fn set_permissions(&self, mode: u32) -> Result<()> {
        set_mode(self.temp.path(), mode)
    }

    /// Flush, sync and rename over the destination.
    pub fn commit(mut self) -> Result<()> {
        self.temp
            .flush()
            .map_err(|e| Error::file_op(self.temp.path(), e))?;
        self.temp
            .as_file()
            .sync_all()
            .map_err(|e| Error::file_op(self.temp.path(), e))?;
        self.temp
            .persist(&self.destination)
            .map_err(|e| Error::file_op(&self.destination, e.error))?;
        Ok(())
    }
}

/// `<dir>/<name>.backup` for `<dir>/<name>`.
pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".");
    name.push(BACKUP_SUFFIX);
    path.with_file_name(name)
}

fn parent_dir(path: &Path) -> Option<&Path> {
    path.parent().filter(|p| !p.as_os_str().is_empty())
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode)).map_err(|e| Error::file_op(path, e))
}

#[cfg(not(unix))]
fn set_mode(path: &Path, _mode: u32) -> Result<()> {
    tracing::debug!(path = %path.display(), "Ignoring unix permissions on this platform");
    Ok(())
}

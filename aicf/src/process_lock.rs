//! Single-instance lock for the watcher daemon.
//!
//! One advisory OS file lock (flock) per watch directory, held for the
//! lifetime of the process. A second `aicf-watch` pointed at the same
//! directory fails fast instead of racing the first over checkpoints.

use anyhow::{Context, Result};
use std::collections::hash_map::DefaultHasher;
use std::fs::{self, File, OpenOptions};
use std::hash::{Hash, Hasher};
use std::io::{self, Seek, SeekFrom, Write};
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};

const WATCHER_LOCK_FILE: &str = "aicf-watch.lock";

/// Held by the running watcher; releases the lock on drop.
pub struct WatcherLock {
    file: File,
    path: PathBuf,
}

impl WatcherLock {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for WatcherLock {
    fn drop(&mut self) {
        let _ = unlock_file(&self.file);
        let _ = fs::remove_file(&self.path);
    }
}

/// Acquire the watcher lock for `watch_dir`.
///
/// Fails if another watcher already holds it.
pub fn acquire_watcher_lock(watch_dir: &Path) -> Result<WatcherLock> {
    let dir = lock_dir();
    fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create runtime lock directory: {}", dir.display()))?;

    let path = dir.join(scoped_lock_filename(WATCHER_LOCK_FILE, watch_dir));
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(&path)
        .with_context(|| format!("failed to open lock file: {}", path.display()))?;

    match lock_file_nonblocking(&file) {
        Ok(()) => {
            let _ = file.set_len(0);
            let _ = file.seek(SeekFrom::Start(0));
            let _ = writeln!(file, "pid={}", std::process::id());
            let _ = writeln!(file, "watch_dir={}", watch_dir.display());
            let _ = file.flush();

            Ok(WatcherLock { file, path })
        }
        Err(e) if is_lock_busy(&e) => anyhow::bail!(
            "another aicf-watch is already watching {}",
            watch_dir.display()
        ),
        Err(e) => Err(e).with_context(|| format!("failed to lock file: {}", path.display())),
    }
}

fn lock_dir() -> PathBuf {
    let mut dir = match std::env::var_os("XDG_RUNTIME_DIR") {
        Some(path) if !path.is_empty() => PathBuf::from(path),
        _ => std::env::temp_dir(),
    };
    dir.push("aicf");
    dir
}

fn scoped_lock_filename(base_filename: &str, watch_dir: &Path) -> String {
    let canonical = watch_dir
        .canonicalize()
        .unwrap_or_else(|_| watch_dir.to_path_buf());
    let mut hasher = DefaultHasher::new();
    canonical.to_string_lossy().hash(&mut hasher);
    format!("{base_filename}.{:016x}", hasher.finish())
}

fn is_lock_busy(error: &io::Error) -> bool {
    matches!(error.kind(), io::ErrorKind::WouldBlock)
        || matches!(error.raw_os_error(), Some(11) | Some(35))
}

#[cfg(unix)]
fn lock_file_nonblocking(file: &File) -> io::Result<()> {
    const LOCK_EX: i32 = 2;
    const LOCK_NB: i32 = 4;
    // SAFETY: flock is called with a valid file descriptor and constant flags.
    let rc = unsafe { flock(file.as_raw_fd(), LOCK_EX | LOCK_NB) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(unix)]
fn unlock_file(file: &File) -> io::Result<()> {
    const LOCK_UN: i32 = 8;
    // SAFETY: flock is called with a valid file descriptor and constant flags.
    let rc = unsafe { flock(file.as_raw_fd(), LOCK_UN) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(unix)]
extern "C" {
    fn flock(fd: i32, operation: i32) -> i32;
}

#[cfg(not(unix))]
compile_error!("aicf-watch process locks currently require Unix (macOS/Linux)");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_lock_on_same_dir_fails() {
        let dir = tempfile::TempDir::new().unwrap();
        let first = acquire_watcher_lock(dir.path()).unwrap();
        assert!(first.path().exists());

        let second = acquire_watcher_lock(dir.path());
        assert!(second.is_err());

        drop(first);
        assert!(acquire_watcher_lock(dir.path()).is_ok());
    }

    #[test]
    fn test_lock_is_scoped_per_directory() {
        let a = tempfile::TempDir::new().unwrap();
        let b = tempfile::TempDir::new().unwrap();
        let _first = acquire_watcher_lock(a.path()).unwrap();
        assert!(acquire_watcher_lock(b.path()).is_ok());
    }
}

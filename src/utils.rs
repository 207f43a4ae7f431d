use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use which::which;

use crate::error::{Error, Result};

/// Locate an executable either by explicit path or through `PATH`.
pub fn resolve_cmd(command: &str) -> Result<PathBuf> {
    if command.contains(['/', '\\']) {
        let path = PathBuf::from(command);
        if path.exists() {
            return Ok(path);
        }
        return Err(Error::KeytoolUnavailable(format!(
            "command not found at: {}",
            path.display()
        )));
    }
    which(command)
        .map_err(|e| Error::KeytoolUnavailable(format!("{command} not found in PATH: {e}")))
}

/// Exclusive advisory lock on a sidecar file, released on drop. The lock
/// file itself is left in place so later holders lock the same inode.
#[derive(Debug)]
pub struct FileLock {
    file: File,
    path: PathBuf,
}

impl FileLock {
    /// Block until the lock at `path` is held. Parent directories are created.
    pub fn acquire(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)
            .map_err(|e| Error::io(path, e))?;
        file.lock().map_err(|e| Error::io(path, e))?;
        tracing::trace!(lock = %path.display(), "acquired");
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if let Err(e) = self.file.unlock() {
            tracing::warn!(lock = %self.path.display(), "failed to release lock: {e}");
        }
    }
}

/// Sidecar lock path for `path`: the same name with `.lock` appended.
pub fn lock_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".lock");
    path.with_file_name(name)
}

/// Replace `path` with `contents` via a temporary sibling and a rename,
/// so readers never observe a half-written file.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".tmp-{}", std::process::id()));
    let tmp = path.with_file_name(name);

    let write = || -> std::io::Result<()> {
        let mut file = File::create(&tmp)?;
        file.write_all(contents)?;
        file.sync_all()?;
        fs::rename(&tmp, path)
    };
    write().map_err(|e| {
        let _ = fs::remove_file(&tmp);
        Error::io(path, e)
    })
}

/// Write a Gradle signing `key.properties` file.
pub fn write_properties(path: &Path, props: &HashMap<String, String>) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }
    let file = File::create(path).map_err(|e| Error::io(path, e))?;
    java_properties::write(std::io::BufWriter::new(file), props).map_err(|e| {
        Error::io(
            path,
            std::io::Error::other(format!("failed to write properties: {e}")),
        )
    })
}

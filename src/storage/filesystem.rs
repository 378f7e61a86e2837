//! File system helpers shared by every pass
//!
//! All writes go through [`write_atomic`]: the new contents land in a temp file
//! next to the target and are renamed over it only once fully written, so an
//! interrupted run never leaves a half-written definition file behind.

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::{TmdlError, TmdlResult};

/// Directory names never descended into while discovering definition files
pub const IGNORED_DIR_NAMES: &[&str] = &[".git", ".pbi", "target", "node_modules"];

/// Read a UTF-8 text file
pub fn read_text(path: &Path) -> TmdlResult<String> {
    std::fs::read_to_string(path).map_err(|e| TmdlError::from_io(path, e))
}

/// Replace `path` with `contents` via a temp file in the same directory
pub fn write_atomic(path: &Path, contents: &str) -> TmdlResult<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let mut tmp = NamedTempFile::new_in(&dir).map_err(|e| TmdlError::from_io(&dir, e))?;
    tmp.write_all(contents.as_bytes())
        .and_then(|_| tmp.flush())
        .map_err(|e| TmdlError::from_io(tmp.path(), e))?;
    // temp files are created owner-only; keep the mode of the file being replaced
    if let Some(permissions) = target_permissions(path) {
        tmp.as_file()
            .set_permissions(permissions)
            .map_err(|e| TmdlError::from_io(tmp.path(), e))?;
    }
    tmp.persist(path)
        .map_err(|e| TmdlError::from_io(path, e.error))?;

    debug!(path = %path.display(), bytes = contents.len(), "Wrote file");
    Ok(())
}

/// Permissions the written file should end up with: those of the file it
/// replaces, or `rw-r--r--` for a new file on unix
fn target_permissions(path: &Path) -> Option<std::fs::Permissions> {
    if let Ok(existing) = std::fs::metadata(path) {
        return Some(existing.permissions());
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        Some(std::fs::Permissions::from_mode(0o644))
    }
    #[cfg(not(unix))]
    {
        None
    }
}

/// Create a directory and all of its parents
pub fn ensure_dir(path: &Path) -> TmdlResult<()> {
    std::fs::create_dir_all(path).map_err(|e| TmdlError::from_io(path, e))
}

/// Heuristic used to skip JSON payloads that happen to carry a `.tmdl` name
pub fn is_json_like(text: &str) -> bool {
    let trimmed = text.trim_start();
    trimmed.starts_with('{') || trimmed.starts_with('[')
}

/// Find files under `root` whose names match `file_pattern` (e.g. `*.tmdl`)
///
/// Results are sorted so passes visit files in a stable order. Paths inside
/// [`IGNORED_DIR_NAMES`] are dropped.
pub fn discover_files(root: &Path, file_pattern: &str, recursive: bool) -> TmdlResult<Vec<PathBuf>> {
    if !root.exists() {
        return Err(TmdlError::FileNotFound(root.to_path_buf()));
    }
    if !root.is_dir() {
        return Err(TmdlError::Io {
            path: root.to_path_buf(),
            source: std::io::Error::other("expected a directory"),
        });
    }

    let escaped_root = glob::Pattern::escape(&root.to_string_lossy());
    let pattern = if recursive {
        format!("{escaped_root}/**/{file_pattern}")
    } else {
        format!("{escaped_root}/{file_pattern}")
    };

    let paths = glob::glob(&pattern).map_err(|e| TmdlError::Io {
        path: root.to_path_buf(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string()),
    })?;

    let mut files = Vec::new();
    for entry in paths {
        match entry {
            Ok(path) => {
                if !path.is_file() || is_ignored(root, &path) {
                    continue;
                }
                files.push(path);
            }
            Err(e) => {
                warn!(path = %e.path().display(), error = %e.error(), "Skipping unreadable path");
            }
        }
    }

    files.sort();
    Ok(files)
}

fn is_ignored(root: &Path, path: &Path) -> bool {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative.components().any(|component| {
        let name = component.as_os_str().to_string_lossy();
        IGNORED_DIR_NAMES.iter().any(|ignored| *ignored == name)
    })
}

/// Copy one file, creating the destination's parent directory
pub fn copy_file(src: &Path, dst: &Path) -> TmdlResult<()> {
    if let Some(parent) = dst.parent() {
        ensure_dir(parent)?;
    }
    std::fs::copy(src, dst).map_err(|e| TmdlError::from_io(src, e))?;
    Ok(())
}

/// Remove a directory tree; a missing directory is not an error
pub fn remove_dir_all(path: &Path) -> TmdlResult<()> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(TmdlError::from_io(path, e)),
    }
}

/// Recursively copy `src` into `dst`, overwriting files that already exist
pub fn copy_dir_all(src: &Path, dst: &Path) -> TmdlResult<usize> {
    ensure_dir(dst)?;
    let mut copied = 0;
    let entries = std::fs::read_dir(src).map_err(|e| TmdlError::from_io(src, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| TmdlError::from_io(src, e))?;
        let from = entry.path();
        let to = dst.join(entry.file_name());
        let file_type = entry.file_type().map_err(|e| TmdlError::from_io(&from, e))?;
        if file_type.is_dir() {
            copied += copy_dir_all(&from, &to)?;
        } else {
            std::fs::copy(&from, &to).map_err(|e| TmdlError::from_io(&from, e))?;
            copied += 1;
        }
    }
    Ok(copied)
}

//! Working-directory resolution and `cd` handling.
//!
//! A subprocess's own directory changes die with the subprocess, so `cd` is
//! never executed as an opaque command: [`change_dir`] interprets the target
//! here and the new directory is reported back to the client in the terminal
//! frame. Chained `cd`-then-command sequences then behave like a persistent
//! shell session even though every request spawns a fresh process.

use crate::WebtermError;
use std::path::{Path, PathBuf};

/// Normalize a client-supplied working directory.
///
/// Absent, empty, or non-directory candidates fall back to the server's own
/// current directory. Never errors, never touches the filesystem beyond the
/// existence check, and is idempotent: resolving a resolved path returns it
/// unchanged.
pub fn resolve(candidate: Option<&Path>) -> PathBuf {
    match candidate {
        Some(path) if !path.as_os_str().is_empty() && path.is_dir() => path.to_path_buf(),
        _ => std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/")),
    }
}

/// Interpret a `cd` target the way a shell would.
///
/// Empty and `~` go home, `~/rest` is home-relative, `..` is the parent of
/// `current`, absolute paths stand alone, everything else is relative to
/// `current`. The result is canonicalized (symlinks, `.`, `..`) and must be
/// an existing directory; otherwise the error names the offending target and
/// the caller keeps its previous working directory.
pub fn change_dir(current: &Path, target: &str) -> crate::Result<PathBuf> {
    let target = target.trim();

    let requested: PathBuf = if target.is_empty() || target == "~" {
        dirs::home_dir().ok_or(WebtermError::NoHomeDirectory)?
    } else if let Some(rest) = target.strip_prefix("~/") {
        dirs::home_dir()
            .ok_or(WebtermError::NoHomeDirectory)?
            .join(rest)
    } else if target == ".." {
        current.parent().unwrap_or(current).to_path_buf()
    } else {
        let path = Path::new(target);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            current.join(path)
        }
    };

    let canonical = requested
        .canonicalize()
        .map_err(|_| WebtermError::InvalidDirectory(target.to_string()))?;
    if canonical.is_dir() {
        Ok(canonical)
    } else {
        Err(WebtermError::InvalidDirectory(target.to_string()))
    }
}

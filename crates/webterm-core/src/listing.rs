//! Directory-listing rendering with ANSI colors.
//!
//! Listing requests are rendered here rather than by the host's `ls`, which
//! does not colorize consistently across platforms. The output is plain
//! bytes as far as the rest of the system is concerned: it rides the same
//! framing as subprocess output.

use crate::WebtermError;
use chrono::{DateTime, Local};
use std::fs;
use std::path::{Path, PathBuf};

const RESET: &str = "\x1b[0m";
const BOLD_BLUE: &str = "\x1b[1;34m";
const BOLD_GREEN: &str = "\x1b[1;32m";
const BOLD_RED: &str = "\x1b[1;31m";
const BOLD_MAGENTA: &str = "\x1b[1;35m";
const BOLD_CYAN: &str = "\x1b[1;36m";
const WHITE: &str = "\x1b[0;37m";

const EXEC_EXTS: &[&str] = &["exe", "bat", "com", "cmd", "sh", "py", "pl", "rb", "php", "js"];
const ARCHIVE_EXTS: &[&str] = &["zip", "tar", "gz", "bz2", "xz", "7z", "rar", "deb", "rpm"];
const IMAGE_EXTS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "svg", "webp"];
const MEDIA_EXTS: &[&str] = &["mp3", "wav", "flac", "ogg", "mp4", "avi", "mkv", "mov"];
const TEXT_EXTS: &[&str] = &["txt", "md", "readme", "log"];

/// Options parsed off a listing command line.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListRequest {
    pub show_hidden: bool,
    pub long_format: bool,
    pub target: Option<PathBuf>,
}

impl ListRequest {
    /// Parse `ls` arguments: `-a`/`-all`, `-l`, combined `-la`/`-al`, and at
    /// most one non-flag token naming the target directory.
    pub fn parse(command: &str) -> Self {
        let mut req = ListRequest::default();
        for arg in command.split_whitespace().skip(1) {
            match arg {
                "-a" | "-all" => req.show_hidden = true,
                "-l" => req.long_format = true,
                "-la" | "-al" => {
                    req.show_hidden = true;
                    req.long_format = true;
                }
                other if !other.starts_with('-') => req.target = Some(PathBuf::from(other)),
                _ => {}
            }
        }
        req
    }
}

/// Render a listing request against `working_dir`.
pub fn render(command: &str, working_dir: &Path) -> crate::Result<String> {
    let req = ListRequest::parse(command);
    let dir = match &req.target {
        Some(target) if target.is_absolute() => target.clone(),
        Some(target) => working_dir.join(target),
        None => working_dir.to_path_buf(),
    };

    let entries = fs::read_dir(&dir)
        .map_err(|_| WebtermError::InvalidDirectory(dir.display().to_string()))?;

    let mut names: Vec<String> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|name| req.show_hidden || !name.starts_with('.'))
        .collect();
    names.sort_by_key(|name| name.to_lowercase());

    let mut out = String::new();
    for name in names {
        let path = dir.join(&name);
        if req.long_format {
            out.push_str(&long_line(&name, &path));
        } else {
            out.push_str(&colorize(&name, &path));
        }
        out.push('\n');
    }
    Ok(out)
}

fn long_line(name: &str, path: &Path) -> String {
    let (size, mtime) = match path.symlink_metadata() {
        Ok(meta) => {
            let mtime = meta
                .modified()
                .map(|t| DateTime::<Local>::from(t).format("%b %d %H:%M").to_string())
                .unwrap_or_else(|_| "            ".to_string());
            (human_size(meta.len()), mtime)
        }
        Err(_) => ("?".to_string(), "            ".to_string()),
    };
    format!(
        "{:<10} {:>8} {} {}",
        perm_string(path),
        size,
        mtime,
        colorize(name, path)
    )
}

fn perm_string(path: &Path) -> String {
    let kind = if path.symlink_metadata().map(|m| m.is_symlink()).unwrap_or(false) {
        'l'
    } else if path.is_dir() {
        'd'
    } else {
        '-'
    };

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = path
            .symlink_metadata()
            .map(|m| m.permissions().mode())
            .unwrap_or(0);
        let mut s = String::with_capacity(10);
        s.push(kind);
        for shift in [6u32, 3, 0] {
            let bits = (mode >> shift) & 0o7;
            s.push(if bits & 0o4 != 0 { 'r' } else { '-' });
            s.push(if bits & 0o2 != 0 { 'w' } else { '-' });
            s.push(if bits & 0o1 != 0 { 'x' } else { '-' });
        }
        s
    }

    #[cfg(not(unix))]
    {
        let writable = path
            .symlink_metadata()
            .map(|m| !m.permissions().readonly())
            .unwrap_or(false);
        let rw = if writable { "rw-" } else { "r--" };
        format!("{}{}{}{}", kind, rw, rw, rw)
    }
}

/// Human-readable size, one decimal above a kilobyte.
pub fn human_size(size: u64) -> String {
    const K: f64 = 1024.0;
    let size_f = size as f64;
    if size < 1024 {
        format!("{}B", size)
    } else if size_f < K * K {
        format!("{:.1}K", size_f / K)
    } else if size_f < K * K * K {
        format!("{:.1}M", size_f / (K * K))
    } else {
        format!("{:.1}G", size_f / (K * K * K))
    }
}

fn extension_of(name: &str) -> String {
    Path::new(name)
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(_path: &Path) -> bool {
    false
}

/// Color a file name by its type, Ubuntu-style.
pub fn colorize(name: &str, path: &Path) -> String {
    let ext = extension_of(name);
    let color = if path.is_dir() {
        BOLD_BLUE
    } else if is_executable(path) || EXEC_EXTS.contains(&ext.as_str()) {
        BOLD_GREEN
    } else if ARCHIVE_EXTS.contains(&ext.as_str()) {
        BOLD_RED
    } else if IMAGE_EXTS.contains(&ext.as_str()) {
        BOLD_MAGENTA
    } else if MEDIA_EXTS.contains(&ext.as_str()) {
        BOLD_CYAN
    } else if TEXT_EXTS.contains(&ext.as_str()) {
        WHITE
    } else {
        return name.to_string();
    };
    format!("{}{}{}", color, name, RESET)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_options() {
        assert_eq!(ListRequest::parse("ls"), ListRequest::default());
        let req = ListRequest::parse("ls -la sub");
        assert!(req.show_hidden);
        assert!(req.long_format);
        assert_eq!(req.target, Some(PathBuf::from("sub")));
        let req = ListRequest::parse("ls -a -l");
        assert!(req.show_hidden && req.long_format);
    }

    #[test]
    fn test_render_sorts_case_insensitively_and_colors_dirs() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("apple"), "").unwrap();
        std::fs::write(tmp.path().join("Banana"), "").unwrap();
        std::fs::create_dir(tmp.path().join("cherry")).unwrap();

        let out = render("ls", tmp.path()).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert!(lines[0].contains("apple"));
        assert!(lines[1].contains("Banana"));
        assert!(lines[2].contains("cherry"));
        assert!(lines[2].starts_with(BOLD_BLUE));
    }

    #[test]
    fn test_hidden_entries_need_dash_a() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join(".hidden"), "").unwrap();
        std::fs::write(tmp.path().join("shown"), "").unwrap();

        let plain = render("ls", tmp.path()).unwrap();
        assert!(!plain.contains(".hidden"));
        let all = render("ls -a", tmp.path()).unwrap();
        assert!(all.contains(".hidden"));
    }

    #[test]
    fn test_long_format_has_perms_size_and_time() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("file.txt"), "hello").unwrap();

        let out = render("ls -l", tmp.path()).unwrap();
        let line = out.lines().next().unwrap();
        assert!(line.starts_with('-'));
        assert!(line.contains("5B"));
    }

    #[test]
    fn test_target_directory_listing() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir(tmp.path().join("sub")).unwrap();
        std::fs::write(tmp.path().join("sub/inner.txt"), "").unwrap();

        let out = render("ls sub", tmp.path()).unwrap();
        assert!(out.contains("inner.txt"));
    }

    #[test]
    fn test_missing_target_is_invalid_directory() {
        let tmp = TempDir::new().unwrap();
        let err = render("ls nowhere", tmp.path()).unwrap_err();
        assert!(matches!(err, WebtermError::InvalidDirectory(_)));
    }

    #[test]
    fn test_human_size_units() {
        assert_eq!(human_size(512), "512B");
        assert_eq!(human_size(2048), "2.0K");
        assert_eq!(human_size(3 * 1024 * 1024), "3.0M");
        assert_eq!(human_size(5 * 1024 * 1024 * 1024), "5.0G");
    }

    #[test]
    fn test_archive_color() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("bundle.tar");
        std::fs::write(&path, "").unwrap();
        assert!(colorize("bundle.tar", &path).starts_with(BOLD_RED));
    }
}

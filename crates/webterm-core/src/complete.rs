//! Path completion: the directory-lookup side of tab completion.

use std::fs;
use std::path::Path;

/// Default cap on returned candidates.
pub const MAX_SUGGESTIONS: usize = 50;

/// Complete `prefix` against the contents of `working_dir`.
///
/// A prefix containing a separator is split into a directory part and a name
/// part; the directory part is kept on every candidate so the suggestion can
/// replace the typed token verbatim. The name part matches case-insensitively;
/// empty or `*` lists everything. Directories get a trailing `/`. Candidates
/// come back in case-insensitive lexicographic order, capped at `cap`.
pub fn complete(prefix: &str, working_dir: &Path, cap: usize) -> Vec<String> {
    let (dir_part, name_part) = match prefix.rfind(['/', '\\']) {
        Some(i) => (&prefix[..i + 1], &prefix[i + 1..]),
        None => ("", prefix),
    };

    let search_dir = if dir_part.is_empty() {
        working_dir.to_path_buf()
    } else {
        let dir_path = Path::new(dir_part);
        if dir_path.is_absolute() {
            dir_path.to_path_buf()
        } else {
            working_dir.join(dir_part)
        }
    };

    let Ok(entries) = fs::read_dir(&search_dir) else {
        return Vec::new();
    };

    let wildcard = name_part.is_empty() || name_part == "*";
    let name_lower = name_part.to_lowercase();

    let mut suggestions: Vec<String> = entries
        .filter_map(|e| e.ok())
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !wildcard && !name.to_lowercase().starts_with(&name_lower) {
                return None;
            }
            let mut suggestion = format!("{}{}", dir_part, name);
            if entry.path().is_dir() {
                suggestion.push('/');
            }
            Some(suggestion)
        })
        .collect();

    suggestions.sort_by_key(|s| s.to_lowercase());
    suggestions.truncate(cap);
    suggestions
}

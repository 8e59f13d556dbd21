//! Tab-completion sources and the cycling buffer.

use std::path::Path;

/// Command names offered when completing the sole token of the input line.
pub const COMMON_COMMANDS: &[&str] = &[
    "ls", "dir", "cd", "pwd", "mkdir", "rmdir", "rm", "cp", "mv", "cat", "echo", "grep", "find",
    "chmod", "chown", "ps", "kill", "top", "htop", "df", "du", "tar", "zip", "unzip", "wget",
    "curl", "git", "npm", "node", "php", "python", "python3", "java", "javac", "gcc", "make",
    "cmake", "vim", "nano", "emacs", "clear", "exit", "history", "which", "whereis", "man",
    "help", "sudo", "su",
];

/// Display cap when completing an empty command prefix.
const EMPTY_PREFIX_LIMIT: usize = 10;

/// Directory Lookup Service interface: given the partial last token and the
/// session's working directory, return candidate completions (directories
/// marker-suffixed with `/`). The HTTP transport implements this against the
/// server's complete endpoint; tests implement it in memory.
pub trait PathLookup {
    fn lookup(&self, prefix: &str, working_dir: &Path) -> Vec<String>;
}

/// Candidates for a sole-token (command name) completion.
pub fn command_candidates(prefix: &str) -> Vec<String> {
    if prefix.is_empty() {
        return COMMON_COMMANDS
            .iter()
            .take(EMPTY_PREFIX_LIMIT)
            .map(|s| s.to_string())
            .collect();
    }
    let prefix = prefix.to_lowercase();
    COMMON_COMMANDS
        .iter()
        .filter(|cmd| cmd.starts_with(&prefix))
        .map(|s| s.to_string())
        .collect()
}

/// In-progress cycling state. Created on the first completion request that
/// yields multiple candidates, advanced by each repeated request, discarded
/// by any other keystroke or by submission.
#[derive(Debug)]
pub(crate) struct CompletionCycle {
    pub candidates: Vec<String>,
    pub index: usize,
    /// True when the whole input is the token being completed.
    pub sole_token: bool,
}

impl CompletionCycle {
    pub fn advance(&mut self) -> &str {
        self.index = (self.index + 1) % self.candidates.len();
        &self.candidates[self.index]
    }
}

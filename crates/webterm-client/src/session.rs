//! The session state machine: one command in flight, incremental rendering,
//! history recall, completion cycling, interrupt semantics.

use crate::completion::{command_candidates, CompletionCycle, PathLookup};
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, warn};
use webterm_types::{ExecMode, ExecuteRequest, Frame, FrameReader};

/// Spinner frames for the loading indicator, advanced by [`Session::tick`].
pub const SPINNER_FRAMES: &[char] = &['|', '/', '─', '\\'];

/// Lifecycle of a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Prompt shown, input editable.
    #[default]
    Idle,
    /// Request dispatched, waiting for the first frame.
    Submitting,
    /// Frames arriving, transcript growing.
    Streaming,
    /// Terminal frame consumed; waiting for [`Session::redraw`].
    Completed,
}

/// One prompt/command/output block of the visible transcript.
#[derive(Debug, Clone, Default)]
pub struct TranscriptEntry {
    pub prompt: String,
    pub command: String,
    pub output: String,
    pub failed: bool,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubmitError {
    /// A command is already in flight; interleaving two output streams into
    /// one transcript would corrupt its ordering, so the submission is
    /// rejected rather than queued.
    #[error("a command is already in flight")]
    Busy,
    /// Empty input: an empty prompt line was echoed to the transcript, but
    /// nothing is sent.
    #[error("empty command")]
    Empty,
}

/// What an interrupt request did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptOutcome {
    /// Nothing was running; input and completion state were cleared.
    ClearedInput,
    /// A command is in flight and this transport cannot signal the remote
    /// subprocess. The user must be told, not silently ignored.
    NotSupported,
}

/// Command history with recall cursor. An immediately-repeated identical
/// command is not appended twice.
#[derive(Debug, Default)]
struct History {
    entries: Vec<String>,
    cursor: Option<usize>,
}

impl History {
    fn push(&mut self, command: &str) {
        if self.entries.last().map(String::as_str) != Some(command) {
            self.entries.push(command.to_string());
        }
        self.cursor = None;
    }

    /// Move toward older entries, clamping at the oldest.
    fn backward(&mut self) -> Option<&str> {
        if self.entries.is_empty() {
            return None;
        }
        let next = match self.cursor {
            None => self.entries.len() - 1,
            Some(0) => 0,
            Some(i) => i - 1,
        };
        self.cursor = Some(next);
        Some(&self.entries[next])
    }

    /// Move toward newer entries. Past the newest, the cursor resets and the
    /// input clears (returned as `Some("")`). `None` means nothing to do.
    fn forward(&mut self) -> Option<String> {
        match self.cursor {
            Some(i) if i + 1 < self.entries.len() => {
                self.cursor = Some(i + 1);
                Some(self.entries[i + 1].clone())
            }
            Some(_) => {
                self.cursor = None;
                Some(String::new())
            }
            None => None,
        }
    }
}

/// Client session: owns the working directory, the input line, the
/// transcript, and the reassembly state for the current response stream.
#[derive(Debug)]
pub struct Session {
    user_host: String,
    home: Option<PathBuf>,
    cwd: PathBuf,
    state: SessionState,
    input: String,
    history: History,
    completion: Option<CompletionCycle>,
    transcript: Vec<TranscriptEntry>,
    reader: FrameReader,
    spinner_frame: usize,
}

impl Session {
    pub fn new(cwd: PathBuf, home: Option<PathBuf>) -> Self {
        Self {
            user_host: "user@host".to_string(),
            home,
            cwd,
            state: SessionState::Idle,
            input: String::new(),
            history: History::default(),
            completion: None,
            transcript: Vec::new(),
            reader: FrameReader::new(),
            spinner_frame: 0,
        }
    }

    pub fn with_identity(mut self, user_host: impl Into<String>) -> Self {
        self.user_host = user_host.into();
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn cwd(&self) -> &PathBuf {
        &self.cwd
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn transcript(&self) -> &[TranscriptEntry] {
        &self.transcript
    }

    /// True while a command is in flight and the spinner should show.
    pub fn is_loading(&self) -> bool {
        matches!(self.state, SessionState::Submitting | SessionState::Streaming)
    }

    /// The prompt string, home directory abbreviated to `~`.
    pub fn prompt(&self) -> String {
        let cwd = self.cwd.display().to_string();
        let display = match &self.home {
            Some(home) => {
                let home = home.display().to_string();
                match cwd.strip_prefix(&home) {
                    Some(rest) => format!("~{}", rest),
                    None => cwd,
                }
            }
            None => cwd,
        };
        format!("{}:{}$ ", self.user_host, display)
    }

    /// Advance and return the spinner frame.
    pub fn tick(&mut self) -> char {
        self.spinner_frame = (self.spinner_frame + 1) % SPINNER_FRAMES.len();
        SPINNER_FRAMES[self.spinner_frame]
    }

    /// Replace the input line (history recall, programmatic edits).
    pub fn set_input(&mut self, input: impl Into<String>) {
        self.completion = None;
        self.input = input.into();
    }

    /// A single typed character. Discards any in-progress completion cycle.
    pub fn push_char(&mut self, c: char) {
        self.completion = None;
        self.input.push(c);
    }

    /// Submit the current input line.
    ///
    /// Returns the request the transport should send, or rejects the
    /// submission when one is already in flight. The transcript entry is
    /// created up front so streamed output has somewhere to land.
    pub fn submit(&mut self) -> Result<ExecuteRequest, SubmitError> {
        if self.state != SessionState::Idle {
            return Err(SubmitError::Busy);
        }
        self.completion = None;

        let command = self.input.trim().to_string();
        if command.is_empty() {
            self.transcript.push(TranscriptEntry {
                prompt: self.prompt(),
                ..Default::default()
            });
            self.input.clear();
            return Err(SubmitError::Empty);
        }

        self.history.push(&command);
        self.transcript.push(TranscriptEntry {
            prompt: self.prompt(),
            command: command.clone(),
            ..Default::default()
        });
        self.input.clear();
        self.reader = FrameReader::new();
        self.state = SessionState::Submitting;

        Ok(ExecuteRequest {
            command,
            cwd: Some(self.cwd.clone()),
            mode: ExecMode::Streamed,
        })
    }

    /// Feed raw response bytes from the transport. Frames are applied as
    /// they complete; malformed records become visible warnings and the
    /// stream keeps going.
    pub fn feed(&mut self, bytes: &[u8]) {
        for result in self.reader.push(bytes) {
            match result {
                Ok(frame) => self.apply(frame),
                Err(err) => {
                    warn!("malformed frame: {}", err);
                    self.append_output(&format!("[webterm: malformed frame: {}]\n", err));
                }
            }
        }
    }

    fn apply(&mut self, frame: Frame) {
        debug!("frame: {}", frame.kind());
        match frame {
            Frame::Chunk { data } | Frame::Output { data } => {
                if self.is_loading() {
                    self.state = SessionState::Streaming;
                }
                if data == webterm_types::CLEAR_SCREEN {
                    self.transcript.clear();
                } else {
                    self.append_output(&data);
                }
            }
            Frame::Error { message } => {
                self.append_output(&format!("{}\n", message));
                if let Some(entry) = self.transcript.last_mut() {
                    entry.failed = true;
                }
                self.state = SessionState::Completed;
            }
            Frame::Complete {
                cwd,
                exit_status: _,
                failed,
            } => {
                // An absent or empty directory means the server could not
                // vouch for one; keep the previous value.
                if !cwd.as_os_str().is_empty() {
                    self.cwd = cwd;
                }
                if let Some(entry) = self.transcript.last_mut() {
                    entry.failed = failed;
                }
                self.state = SessionState::Completed;
            }
        }
    }

    /// Acknowledge a completed stream and redraw the prompt.
    pub fn redraw(&mut self) {
        if self.state == SessionState::Completed {
            self.state = SessionState::Idle;
        }
    }

    /// A transport-level failure: distinct from a command that ran and
    /// failed. Clears the loading indicator so the session is usable again.
    pub fn transport_failed(&mut self, message: &str) {
        self.append_output(&format!("Error: {}\n", message));
        if let Some(entry) = self.transcript.last_mut() {
            entry.failed = true;
        }
        self.state = SessionState::Idle;
    }

    /// Recall the previous (older) history entry.
    pub fn history_backward(&mut self) {
        self.completion = None;
        if let Some(entry) = self.history.backward() {
            self.input = entry.to_string();
        }
    }

    /// Recall the next (newer) history entry; past the newest, clears input.
    pub fn history_forward(&mut self) {
        self.completion = None;
        if let Some(input) = self.history.forward() {
            self.input = input;
        }
    }

    /// Handle a completion request (Tab).
    ///
    /// First request: sole token completes against the built-in command
    /// list, otherwise the last token goes to the Directory Lookup Service.
    /// One match applies immediately; several start a cycle that each
    /// repeated request advances, wrapping past the end. No matches leave
    /// the input untouched.
    pub fn complete(&mut self, lookup: &dyn PathLookup) {
        if let Some(cycle) = &mut self.completion {
            let candidate = cycle.advance().to_string();
            let sole = cycle.sole_token;
            self.apply_candidate(&candidate, sole);
            return;
        }

        let parts: Vec<&str> = self.input.split(' ').collect();
        let sole_token = parts.len() == 1;
        let candidates = if sole_token {
            command_candidates(parts[0])
        } else {
            let last = parts.last().copied().unwrap_or("");
            lookup.lookup(last, &self.cwd)
        };

        match candidates.len() {
            0 => {}
            1 => self.apply_candidate(&candidates[0], sole_token),
            _ => {
                self.apply_candidate(&candidates[0], sole_token);
                self.completion = Some(CompletionCycle {
                    candidates,
                    index: 0,
                    sole_token,
                });
            }
        }
    }

    /// Ctrl+C. If idle, clears the line; if a command is in flight, reports
    /// that this transport cannot interrupt it (the subprocess keeps
    /// running server-side either way).
    pub fn interrupt(&mut self) -> InterruptOutcome {
        if self.is_loading() {
            InterruptOutcome::NotSupported
        } else {
            self.input.clear();
            self.completion = None;
            InterruptOutcome::ClearedInput
        }
    }

    fn apply_candidate(&mut self, candidate: &str, sole_token: bool) {
        if sole_token {
            self.input = candidate.to_string();
        } else {
            let mut parts: Vec<&str> = self.input.split(' ').collect();
            if let Some(last) = parts.last_mut() {
                *last = candidate;
            }
            self.input = parts.join(" ");
        }
    }

    fn append_output(&mut self, text: &str) {
        if let Some(entry) = self.transcript.last_mut() {
            entry.output.push_str(text);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    struct FixedLookup(Vec<String>);

    impl PathLookup for FixedLookup {
        fn lookup(&self, _prefix: &str, _working_dir: &Path) -> Vec<String> {
            self.0.clone()
        }
    }

    fn session() -> Session {
        Session::new(PathBuf::from("/work"), None)
    }

    fn complete_frame(cwd: &str) -> Vec<u8> {
        Frame::Complete {
            cwd: PathBuf::from(cwd),
            exit_status: 0,
            failed: false,
        }
        .encode()
        .into_bytes()
    }

    fn finish(session: &mut Session, cwd: &str) {
        session.feed(&complete_frame(cwd));
        session.redraw();
    }

    fn submit(session: &mut Session, command: &str) {
        session.set_input(command);
        session.submit().unwrap();
    }

    #[test]
    fn test_lifecycle_idle_submitting_streaming_completed() {
        let mut s = session();
        assert_eq!(s.state(), SessionState::Idle);

        submit(&mut s, "echo hi");
        assert_eq!(s.state(), SessionState::Submitting);
        assert!(s.is_loading());

        s.feed(
            Frame::Chunk {
                data: "hi\n".into(),
            }
            .encode()
            .as_bytes(),
        );
        assert_eq!(s.state(), SessionState::Streaming);
        assert_eq!(s.transcript().last().unwrap().output, "hi\n");

        s.feed(&complete_frame("/work"));
        assert_eq!(s.state(), SessionState::Completed);
        s.redraw();
        assert_eq!(s.state(), SessionState::Idle);
    }

    #[test]
    fn test_second_submission_rejected_while_in_flight() {
        let mut s = session();
        submit(&mut s, "sleep 5");

        s.set_input("echo no");
        assert_eq!(s.submit(), Err(SubmitError::Busy));

        // The in-flight transcript entry is untouched.
        assert_eq!(s.transcript().len(), 1);
        assert_eq!(s.transcript()[0].command, "sleep 5");
    }

    #[test]
    fn test_completion_frame_updates_cwd() {
        let mut s = session();
        submit(&mut s, "cd sub");
        finish(&mut s, "/work/sub");
        assert_eq!(s.cwd(), &PathBuf::from("/work/sub"));
    }

    #[test]
    fn test_empty_reported_cwd_keeps_previous() {
        let mut s = session();
        submit(&mut s, "pwd");
        finish(&mut s, "");
        assert_eq!(s.cwd(), &PathBuf::from("/work"));
    }

    #[test]
    fn test_cwd_trusted_only_after_terminal_frame() {
        let mut s = session();
        submit(&mut s, "pwd");
        s.feed(
            Frame::Chunk {
                data: "/somewhere\n".into(),
            }
            .encode()
            .as_bytes(),
        );
        assert_eq!(s.cwd(), &PathBuf::from("/work"));
        finish(&mut s, "/elsewhere");
        assert_eq!(s.cwd(), &PathBuf::from("/elsewhere"));
    }

    #[test]
    fn test_error_frame_marks_entry_failed_and_terminates() {
        let mut s = session();
        submit(&mut s, "doomed");
        s.feed(
            Frame::Error {
                message: "Failed to spawn /bin/sh: not found".into(),
            }
            .encode()
            .as_bytes(),
        );
        assert_eq!(s.state(), SessionState::Completed);
        let entry = s.transcript().last().unwrap();
        assert!(entry.failed);
        assert!(entry.output.contains("Failed to spawn"));
        // Spawn failure leaves the working directory unchanged.
        assert_eq!(s.cwd(), &PathBuf::from("/work"));
    }

    #[test]
    fn test_malformed_frame_becomes_warning_and_stream_continues() {
        let mut s = session();
        submit(&mut s, "echo hi");
        s.feed(b"event: chunk\ndata: not json\n\n");
        assert!(s.transcript().last().unwrap().output.contains("malformed frame"));
        finish(&mut s, "/work");
        assert_eq!(s.state(), SessionState::Idle);
    }

    #[test]
    fn test_transport_failure_clears_loading_distinct_from_command_failure() {
        let mut s = session();
        submit(&mut s, "echo hi");
        s.transport_failed("connection reset");
        assert!(!s.is_loading());
        let entry = s.transcript().last().unwrap();
        assert!(entry.failed);
        assert!(entry.output.contains("connection reset"));
    }

    #[test]
    fn test_history_recall_and_duplicate_suppression() {
        let mut s = session();
        for cmd in ["ls", "pwd", "ls"] {
            submit(&mut s, cmd);
            finish(&mut s, "/work");
        }
        // "ls" two-back is kept; only immediate repeats are suppressed.
        s.history_backward();
        assert_eq!(s.input(), "ls");
        s.history_backward();
        assert_eq!(s.input(), "pwd");
        s.history_backward();
        assert_eq!(s.input(), "ls");
        // Clamped at the oldest entry.
        s.history_backward();
        assert_eq!(s.input(), "ls");
    }

    #[test]
    fn test_immediate_repeat_not_duplicated() {
        let mut s = session();
        for cmd in ["pwd", "pwd"] {
            submit(&mut s, cmd);
            finish(&mut s, "/work");
        }
        s.history_backward();
        assert_eq!(s.input(), "pwd");
        s.history_backward();
        assert_eq!(s.input(), "pwd");
        s.history_forward();
        // Past the newest: input clears, cursor resets.
        assert_eq!(s.input(), "");
    }

    #[test]
    fn test_sole_token_completion_single_match_applies() {
        let mut s = session();
        s.set_input("whe");
        s.complete(&FixedLookup(vec![]));
        assert_eq!(s.input(), "whereis");
    }

    #[test]
    fn test_path_completion_cycles_and_wraps() {
        let mut s = session();
        let lookup = FixedLookup(vec!["apple".into(), "Banana".into(), "cherry/".into()]);
        s.set_input("cat a");
        s.complete(&lookup);
        assert_eq!(s.input(), "cat apple");
        s.complete(&lookup);
        assert_eq!(s.input(), "cat Banana");
        s.complete(&lookup);
        assert_eq!(s.input(), "cat cherry/");
        // Wraps to the first after the last.
        s.complete(&lookup);
        assert_eq!(s.input(), "cat apple");
    }

    #[test]
    fn test_typing_discards_completion_cycle() {
        let mut s = session();
        let lookup = FixedLookup(vec!["aa".into(), "ab".into()]);
        s.set_input("cat a");
        s.complete(&lookup);
        assert_eq!(s.input(), "cat aa");
        s.push_char('x');
        // A fresh completion starts over instead of cycling.
        s.complete(&FixedLookup(vec!["fresh".into()]));
        assert_eq!(s.input(), "cat fresh");
    }

    #[test]
    fn test_no_matches_leaves_input_unchanged() {
        let mut s = session();
        s.set_input("cat zzz");
        s.complete(&FixedLookup(vec![]));
        assert_eq!(s.input(), "cat zzz");
    }

    #[test]
    fn test_interrupt_idle_clears_input() {
        let mut s = session();
        s.set_input("half-typed");
        assert_eq!(s.interrupt(), InterruptOutcome::ClearedInput);
        assert_eq!(s.input(), "");
    }

    #[test]
    fn test_interrupt_in_flight_is_not_supported() {
        let mut s = session();
        submit(&mut s, "sleep 5");
        assert_eq!(s.interrupt(), InterruptOutcome::NotSupported);
        assert!(s.is_loading());
    }

    #[test]
    fn test_empty_submission_echoes_prompt_line_only() {
        let mut s = session();
        s.set_input("   ");
        assert_eq!(s.submit(), Err(SubmitError::Empty));
        assert_eq!(s.state(), SessionState::Idle);
        assert_eq!(s.transcript().len(), 1);
        assert!(s.transcript()[0].command.is_empty());
    }

    #[test]
    fn test_prompt_abbreviates_home() {
        let mut s = Session::new(PathBuf::from("/home/me/code"), Some(PathBuf::from("/home/me")))
            .with_identity("me@box");
        assert_eq!(s.prompt(), "me@box:~/code$ ");
        s.cwd = PathBuf::from("/etc");
        assert_eq!(s.prompt(), "me@box:/etc$ ");
    }

    #[test]
    fn test_clear_screen_chunk_resets_transcript() {
        let mut s = session();
        submit(&mut s, "echo hi");
        s.feed(
            Frame::Chunk {
                data: "hi\n".into(),
            }
            .encode()
            .as_bytes(),
        );
        finish(&mut s, "/work");

        submit(&mut s, "clear");
        s.feed(
            Frame::Chunk {
                data: webterm_types::CLEAR_SCREEN.into(),
            }
            .encode()
            .as_bytes(),
        );
        assert!(s.transcript().is_empty());
    }

    #[test]
    fn test_spinner_cycles_frames() {
        assert_eq!(SPINNER_FRAMES, &['|', '/', '─', '\\']);
        let mut s = session();
        let first = s.tick();
        let mut seen = vec![first];
        for _ in 0..SPINNER_FRAMES.len() - 1 {
            seen.push(s.tick());
        }
        seen.sort_unstable();
        let mut expected = SPINNER_FRAMES.to_vec();
        expected.sort_unstable();
        assert_eq!(seen, expected);
    }
}

//! Subprocess execution and output draining.

use crate::{cwd, listing, WebtermError};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Default read size for each drain of the subprocess pipes.
pub const DEFAULT_READ_BUF_SIZE: usize = 8192;

/// Capacity of the per-run event channel.
const EVENT_CHANNEL_SIZE: usize = 64;

/// Events emitted by a single command run.
///
/// A run is any number of `Output` events followed by exactly one terminal
/// event: `Completed` when the request finished (successfully or not), or
/// `Failed` when no subprocess could be started at all.
#[derive(Debug, Clone)]
pub enum ExecEvent {
    /// Combined stdout/stderr bytes, in the order the subprocess produced them.
    Output(Vec<u8>),
    /// The request finished. `cwd` is the authoritative working directory for
    /// the client's next request.
    Completed {
        cwd: PathBuf,
        exit_status: i32,
        failed: bool,
    },
    /// The subprocess could not be started.
    Failed { message: String },
}

/// Cooperative cancellation handle for a run.
///
/// No current transport calls [`cancel`](CancelToken::cancel): over plain
/// HTTP an interrupt can only abandon reading, and the subprocess runs to
/// completion. The token sits at the runner interface so a future persistent
/// transport can add real interruption without changing the framing.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

#[derive(Debug, Default)]
struct CancelInner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once [`cancel`](CancelToken::cancel) has been called.
    pub async fn cancelled(&self) {
        loop {
            if self.is_cancelled() {
                return;
            }
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// Runs command lines through the configured shell and streams their output.
///
/// Each run owns exactly one subprocess and its two output pipes, merged
/// into one logical stream. The command string is opaque to the runner apart
/// from three dispatch rules: a leading `ls` word delegates to the listing
/// module, a bare `clear` is answered with a fixed control sequence, and a
/// leading `cd` word is intercepted so the directory change survives the
/// request (see [`cwd::change_dir`]).
#[derive(Debug, Clone)]
pub struct CommandRunner {
    shell_path: PathBuf,
    read_buf_size: usize,
}

impl CommandRunner {
    pub fn new(shell_path: PathBuf) -> Self {
        Self {
            shell_path,
            read_buf_size: DEFAULT_READ_BUF_SIZE,
        }
    }

    /// Override the per-read drain size. Mostly a tuning knob; output is
    /// correct at any size.
    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buf_size = size.max(1);
        self
    }

    /// Execute `command` with `working_dir` as the initial directory.
    ///
    /// Returns immediately with the receiving end of the event stream; the
    /// run proceeds on a background task. Dropping the receiver abandons the
    /// run and kills the subprocess.
    pub fn run(
        &self,
        command: &str,
        working_dir: &Path,
        cancel: CancelToken,
    ) -> mpsc::Receiver<ExecEvent> {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_SIZE);
        let runner = self.clone();
        let command = command.to_string();
        let working_dir = working_dir.to_path_buf();
        tokio::spawn(async move {
            let exec_id = Uuid::new_v4();
            runner.run_inner(exec_id, &command, &working_dir, cancel, tx).await;
        });
        rx
    }

    async fn run_inner(
        &self,
        exec_id: Uuid,
        command: &str,
        working_dir: &Path,
        cancel: CancelToken,
        tx: mpsc::Sender<ExecEvent>,
    ) {
        let trimmed = command.trim();
        let head = trimmed.split_whitespace().next().unwrap_or("");

        debug!(target: "webterm::exec", "[{}] run {:?} in {}", exec_id, trimmed, working_dir.display());

        if trimmed.is_empty() {
            send(&tx, ok_completion(working_dir)).await;
            return;
        }

        if trimmed == "clear" {
            send(&tx, ExecEvent::Output(webterm_types::CLEAR_SCREEN.into())).await;
            send(&tx, ok_completion(working_dir)).await;
            return;
        }

        if head == "cd" {
            self.run_cd(trimmed, working_dir, &tx).await;
            return;
        }

        if head == "ls" {
            self.run_listing(exec_id, trimmed, working_dir, &tx).await;
            return;
        }

        self.run_subprocess(exec_id, trimmed, working_dir, cancel, tx)
            .await;
    }

    /// `cd` is interpreted here, never spawned: the working directory of a
    /// subprocess is not visible to its parent after exit.
    async fn run_cd(&self, command: &str, working_dir: &Path, tx: &mpsc::Sender<ExecEvent>) {
        let target = command.strip_prefix("cd").unwrap_or("").trim();
        match cwd::change_dir(working_dir, target) {
            Ok(new_dir) => {
                debug!(target: "webterm::exec", "cd {:?} -> {}", target, new_dir.display());
                send(
                    tx,
                    ExecEvent::Completed {
                        cwd: new_dir,
                        exit_status: 0,
                        failed: false,
                    },
                )
                .await;
            }
            Err(err) => {
                send(
                    tx,
                    ExecEvent::Output(
                        format!("cd: no such file or directory: {}\n", target).into_bytes(),
                    ),
                )
                .await;
                send(
                    tx,
                    ExecEvent::Completed {
                        cwd: working_dir.to_path_buf(),
                        exit_status: 1,
                        failed: true,
                    },
                )
                .await;
                debug!(target: "webterm::exec", "cd failed: {}", err);
            }
        }
    }

    /// The host `ls` does not colorize consistently across platforms, so
    /// listing requests are rendered by the listing module instead.
    async fn run_listing(
        &self,
        exec_id: Uuid,
        command: &str,
        working_dir: &Path,
        tx: &mpsc::Sender<ExecEvent>,
    ) {
        match listing::render(command, working_dir) {
            Ok(text) => {
                send(tx, ExecEvent::Output(text.into_bytes())).await;
                send(tx, ok_completion(working_dir)).await;
            }
            Err(WebtermError::InvalidDirectory(dir)) => {
                let message = format!("ls: cannot access '{}': No such file or directory\n", dir);
                send(tx, ExecEvent::Output(message.into_bytes())).await;
                send(
                    tx,
                    ExecEvent::Completed {
                        cwd: working_dir.to_path_buf(),
                        exit_status: 1,
                        failed: true,
                    },
                )
                .await;
            }
            Err(err) => {
                warn!(target: "webterm::listing", "[{}] listing failed: {}", exec_id, err);
                send(tx, ExecEvent::Output(format!("ls: {}\n", err).into_bytes())).await;
                send(
                    tx,
                    ExecEvent::Completed {
                        cwd: working_dir.to_path_buf(),
                        exit_status: 1,
                        failed: true,
                    },
                )
                .await;
            }
        }
    }

    async fn run_subprocess(
        &self,
        exec_id: Uuid,
        command: &str,
        working_dir: &Path,
        cancel: CancelToken,
        tx: mpsc::Sender<ExecEvent>,
    ) {
        let mut cmd = Command::new(&self.shell_path);
        cmd.arg("-c")
            .arg(command)
            .current_dir(working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(err) => {
                error!(
                    target: "webterm::exec",
                    "[{}] failed to spawn {}: {}", exec_id, self.shell_path.display(), err
                );
                send(
                    &tx,
                    ExecEvent::Failed {
                        message: format!(
                            "Failed to spawn {}: {}",
                            self.shell_path.display(),
                            err
                        ),
                    },
                )
                .await;
                return;
            }
        };

        // Stdio::piped always yields handles on a fresh child.
        let Some(mut stdout) = child.stdout.take() else {
            send(&tx, spawn_failed("no stdout pipe")).await;
            return;
        };
        let Some(mut stderr) = child.stderr.take() else {
            send(&tx, spawn_failed("no stderr pipe")).await;
            return;
        };

        // Drain both pipes in arrival order. Each read resolves as soon as
        // any bytes are available, so output reaches the client promptly
        // even while the subprocess keeps running. The loop only ends once
        // both pipes hit EOF, which cannot happen before the subprocess has
        // closed them, so trailing output is never dropped.
        let mut out_buf = vec![0u8; self.read_buf_size];
        let mut err_buf = vec![0u8; self.read_buf_size];
        let mut out_open = true;
        let mut err_open = true;
        let mut total_bytes = 0usize;

        while out_open || err_open {
            tokio::select! {
                read = stdout.read(&mut out_buf), if out_open => match read {
                    Ok(0) | Err(_) => out_open = false,
                    Ok(n) => {
                        total_bytes += n;
                        if !send(&tx, ExecEvent::Output(out_buf[..n].to_vec())).await {
                            debug!(target: "webterm::exec", "[{}] receiver gone, killing subprocess", exec_id);
                            let _ = child.start_kill();
                            return;
                        }
                    }
                },
                read = stderr.read(&mut err_buf), if err_open => match read {
                    Ok(0) | Err(_) => err_open = false,
                    Ok(n) => {
                        total_bytes += n;
                        if !send(&tx, ExecEvent::Output(err_buf[..n].to_vec())).await {
                            debug!(target: "webterm::exec", "[{}] receiver gone, killing subprocess", exec_id);
                            let _ = child.start_kill();
                            return;
                        }
                    }
                },
                _ = cancel.cancelled() => {
                    info!(target: "webterm::exec", "[{}] cancelled, killing subprocess", exec_id);
                    let _ = child.start_kill();
                    send(&tx, ExecEvent::Failed { message: "command cancelled".to_string() }).await;
                    return;
                }
            }
        }

        match child.wait().await {
            Ok(status) => {
                let exit_status = status.code().unwrap_or(-1);
                info!(
                    target: "webterm::exec",
                    "[{}] exited with {} after {} output bytes", exec_id, exit_status, total_bytes
                );
                send(
                    &tx,
                    ExecEvent::Completed {
                        cwd: working_dir.to_path_buf(),
                        exit_status,
                        failed: !status.success(),
                    },
                )
                .await;
            }
            Err(err) => {
                error!(target: "webterm::exec", "[{}] wait failed: {}", exec_id, err);
                send(
                    &tx,
                    ExecEvent::Failed {
                        message: format!("Failed to reap subprocess: {}", err),
                    },
                )
                .await;
            }
        }
    }
}

fn ok_completion(working_dir: &Path) -> ExecEvent {
    ExecEvent::Completed {
        cwd: working_dir.to_path_buf(),
        exit_status: 0,
        failed: false,
    }
}

fn spawn_failed(message: &str) -> ExecEvent {
    ExecEvent::Failed {
        message: message.to_string(),
    }
}

async fn send(tx: &mpsc::Sender<ExecEvent>, event: ExecEvent) -> bool {
    tx.send(event).await.is_ok()
}

//! Request and response bodies for the HTTP interface.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// How execution output is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecMode {
    /// Output arrives incrementally as `chunk` frames.
    #[default]
    Streamed,
    /// Output is collected and delivered as a single `output` frame
    /// immediately before the terminal frame.
    Buffered,
}

/// One command submission. The working directory travels with every request;
/// the server holds no session state between calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecuteRequest {
    pub command: String,
    #[serde(default)]
    pub cwd: Option<PathBuf>,
    #[serde(default)]
    pub mode: ExecMode,
}

/// Path-completion lookup request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteRequest {
    pub prefix: String,
    #[serde(default)]
    pub cwd: Option<PathBuf>,
}

/// Ordered completion candidates. Directories carry a trailing `/` so the
/// client can tell them apart without a second round trip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteResponse {
    pub suggestions: Vec<String>,
}

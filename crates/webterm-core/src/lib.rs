//! Server-side execution engine for webterm: working-directory resolution,
//! subprocess running and draining, directory listing, and path completion.

pub mod complete;
pub mod cwd;
mod error;
pub mod listing;
mod runner;

pub use error::WebtermError;
pub use runner::{CancelToken, CommandRunner, ExecEvent, DEFAULT_READ_BUF_SIZE};

/// Result type for webterm-core operations.
pub type Result<T> = std::result::Result<T, WebtermError>;

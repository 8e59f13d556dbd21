//! Error types for webterm-core.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum WebtermError {
    #[error("Not a directory: {0}")]
    InvalidDirectory(String),

    #[error("No home directory")]
    NoHomeDirectory,
}

//! Shared wire protocol types for the webterm execution stream.

mod frame;
mod request;

pub use frame::{Frame, FrameError, FrameReader};
pub use request::{CompleteRequest, CompleteResponse, ExecMode, ExecuteRequest};

/// ANSI sequence answering a `clear` request: erase display, cursor home.
pub const CLEAR_SCREEN: &str = "\x1b[2J\x1b[H";

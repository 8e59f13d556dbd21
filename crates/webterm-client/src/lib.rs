//! Client-side session state machine for the webterm execution stream.
//!
//! Transport-agnostic: the embedding application performs the HTTP calls and
//! feeds raw response bytes into [`Session::feed`]. Everything else — stream
//! reassembly, transcript, history recall, tab-completion cycling, the
//! loading indicator — lives here so it can be driven and tested without a
//! server.

mod completion;
mod session;

pub use completion::{command_candidates, PathLookup, COMMON_COMMANDS};
pub use session::{
    InterruptOutcome, Session, SessionState, SubmitError, TranscriptEntry, SPINNER_FRAMES,
};

//! Command execution route: the streaming side of the protocol.

use crate::state::AppState;
use axum::{
    body::{Body, Bytes},
    extract::{Json, State},
    http::header,
    response::{IntoResponse, Response},
};
use futures::StreamExt;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::info;
use webterm_core::{cwd, CancelToken, ExecEvent};
use webterm_types::{ExecMode, ExecuteRequest, Frame};

/// Capacity of the encoded-record channel feeding the response body.
const RESPONSE_CHANNEL_SIZE: usize = 64;

/// POST /api/execute - run a command, stream typed frames back.
///
/// The response body is a `text/event-stream` of framed records, flushed as
/// they are produced. HTTP status is always OK once the stream starts;
/// command success rides in the terminal frame.
pub async fn execute(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ExecuteRequest>,
) -> Response {
    let working_dir = cwd::resolve(req.cwd.as_deref());
    info!(
        target: "webterm::api",
        "execute {:?} in {} ({:?})", req.command, working_dir.display(), req.mode
    );

    let events = state
        .runner
        .run(&req.command, &working_dir, CancelToken::new());

    let (tx, rx) = mpsc::channel::<String>(RESPONSE_CHANNEL_SIZE);
    tokio::spawn(pump_frames(events, req.mode, tx));

    let body = Body::from_stream(
        ReceiverStream::new(rx).map(|record| Ok::<_, Infallible>(Bytes::from(record))),
    );
    (
        [
            (header::CONTENT_TYPE, "text/event-stream; charset=utf-8"),
            (header::CACHE_CONTROL, "no-cache"),
            (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
        ],
        body,
    )
        .into_response()
}

/// Incremental UTF-8 decoder for subprocess output.
///
/// Pipe reads cut the byte stream at arbitrary points, so a multi-byte
/// character can straddle two `ExecEvent::Output` chunks. An incomplete
/// trailing sequence is held back and decoded with the next chunk; only
/// bytes that can never become valid UTF-8 turn into replacement
/// characters.
#[derive(Debug, Default)]
struct Utf8Assembler {
    carry: Vec<u8>,
}

impl Utf8Assembler {
    /// Decode everything decodable out of `carry + bytes`.
    fn push(&mut self, bytes: &[u8]) -> String {
        let mut buf = std::mem::take(&mut self.carry);
        buf.extend_from_slice(bytes);

        let mut out = String::new();
        let mut rest = buf.as_slice();
        loop {
            match std::str::from_utf8(rest) {
                Ok(text) => {
                    out.push_str(text);
                    rest = &[];
                    break;
                }
                Err(err) => {
                    let (valid, after) = rest.split_at(err.valid_up_to());
                    // The split point is valid by construction.
                    out.push_str(std::str::from_utf8(valid).unwrap_or_default());
                    match err.error_len() {
                        Some(n) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[n..];
                        }
                        None => {
                            // Incomplete trailing sequence: wait for more.
                            rest = after;
                            break;
                        }
                    }
                }
            }
        }
        self.carry = rest.to_vec();
        out
    }

    /// End of stream: whatever is still held back can no longer complete.
    fn finish(&mut self) -> String {
        let tail = String::from_utf8_lossy(&self.carry).into_owned();
        self.carry.clear();
        tail
    }
}

/// Translate runner events into wire records.
///
/// Streamed mode forwards each output chunk as its own `chunk` record.
/// Buffered mode accumulates output and delivers it as one `output` record
/// just before the terminal record. Either way the terminal record is last,
/// and a send failure means the client went away, which ends the pump (and,
/// through the dropped receiver, the run itself).
async fn pump_frames(
    mut events: mpsc::Receiver<ExecEvent>,
    mode: ExecMode,
    tx: mpsc::Sender<String>,
) {
    let mut decoder = Utf8Assembler::default();
    let mut buffered = String::new();

    while let Some(event) = events.recv().await {
        let mut frames: Vec<Frame> = Vec::with_capacity(2);
        match event {
            ExecEvent::Output(bytes) => {
                let text = decoder.push(&bytes);
                if !text.is_empty() {
                    match mode {
                        ExecMode::Buffered => buffered.push_str(&text),
                        ExecMode::Streamed => frames.push(Frame::Chunk { data: text }),
                    }
                }
            }
            ExecEvent::Completed {
                cwd,
                exit_status,
                failed,
            } => {
                let tail = decoder.finish();
                match mode {
                    ExecMode::Buffered => {
                        buffered.push_str(&tail);
                        frames.push(Frame::Output {
                            data: std::mem::take(&mut buffered),
                        });
                    }
                    ExecMode::Streamed if !tail.is_empty() => {
                        frames.push(Frame::Chunk { data: tail });
                    }
                    ExecMode::Streamed => {}
                }
                frames.push(Frame::Complete {
                    cwd,
                    exit_status,
                    failed,
                });
            }
            ExecEvent::Failed { message } => {
                let tail = decoder.finish();
                if mode == ExecMode::Buffered {
                    buffered.push_str(&tail);
                    if !buffered.is_empty() {
                        frames.push(Frame::Output {
                            data: std::mem::take(&mut buffered),
                        });
                    }
                } else if !tail.is_empty() {
                    frames.push(Frame::Chunk { data: tail });
                }
                frames.push(Frame::Error { message });
            }
        }
        for frame in frames {
            if tx.send(frame.encode()).await.is_err() {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multibyte_character_split_across_chunks() {
        let mut decoder = Utf8Assembler::default();
        let bytes = "héllo".as_bytes();
        // Cut inside the two-byte 'é'.
        let first = decoder.push(&bytes[..2]);
        let second = decoder.push(&bytes[2..]);
        assert_eq!(first, "h");
        assert_eq!(format!("{}{}", first, second), "héllo");
        assert!(decoder.finish().is_empty());
    }

    #[test]
    fn test_invalid_byte_becomes_replacement_and_stream_continues() {
        let mut decoder = Utf8Assembler::default();
        let out = decoder.push(b"a\xffb");
        assert_eq!(out, "a\u{FFFD}b");
    }

    #[test]
    fn test_truncated_sequence_flushed_at_end_of_stream() {
        let mut decoder = Utf8Assembler::default();
        // First byte of a two-byte sequence, then the stream ends.
        assert_eq!(decoder.push(&[0xc3]), "");
        assert_eq!(decoder.finish(), "\u{FFFD}");
    }
}

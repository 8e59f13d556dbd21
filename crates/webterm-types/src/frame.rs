//! Typed-event framing for the execution stream.
//!
//! Each frame is one text record in the event-stream convention:
//!
//! ```text
//! event: chunk
//! data: {"data":"hello\n"}
//!
//! ```
//!
//! Records are blank-line delimited, so output bytes can never be mistaken
//! for protocol syntax: output only ever travels inside the JSON payload of
//! a `chunk` or `output` record. A stream carries any number of `chunk`
//! records followed by exactly one terminal record (`complete` or `error`).

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// One self-delimited unit of the wire protocol.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Partial subprocess output, order-preserving. Streamed mode only.
    Chunk { data: String },
    /// The entire combined output in one record. Buffered mode only.
    Output { data: String },
    /// Terminal frame: the subprocess could not be run at all.
    Error { message: String },
    /// Terminal frame: the request finished. Carries the authoritative new
    /// working directory the client must adopt for its next submission.
    Complete {
        cwd: PathBuf,
        exit_status: i32,
        failed: bool,
    },
}

/// A record that could not be decoded. The reader keeps going; the client
/// renders these as visible warnings rather than aborting the stream.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("record has no data field")]
    MissingData,
    #[error("record has no event field")]
    MissingKind,
    #[error("unknown event kind: {0}")]
    UnknownKind(String),
    #[error("bad payload for '{kind}' record: {source}")]
    BadPayload {
        kind: String,
        source: serde_json::Error,
    },
}

#[derive(Serialize, Deserialize)]
struct DataPayload {
    data: String,
}

#[derive(Serialize, Deserialize)]
struct ErrorPayload {
    message: String,
}

#[derive(Serialize, Deserialize)]
struct CompletePayload {
    cwd: PathBuf,
    exit_status: i32,
    failed: bool,
}

impl Frame {
    /// The event kind name used on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Chunk { .. } => "chunk",
            Frame::Output { .. } => "output",
            Frame::Error { .. } => "error",
            Frame::Complete { .. } => "complete",
        }
    }

    /// True for the frames that end a stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Frame::Error { .. } | Frame::Complete { .. })
    }

    /// Serialize into one wire record, trailing blank line included.
    pub fn encode(&self) -> String {
        let payload = match self {
            Frame::Chunk { data } | Frame::Output { data } => {
                serde_json::to_value(DataPayload { data: data.clone() })
            }
            Frame::Error { message } => serde_json::to_value(ErrorPayload {
                message: message.clone(),
            }),
            Frame::Complete {
                cwd,
                exit_status,
                failed,
            } => serde_json::to_value(CompletePayload {
                cwd: cwd.clone(),
                exit_status: *exit_status,
                failed: *failed,
            }),
        };
        // Serializing these payloads cannot fail: plain strings and numbers.
        let payload = payload.unwrap_or_default();
        format!("event: {}\ndata: {}\n\n", self.kind(), payload)
    }

    fn decode_record(kind: &str, data: &str) -> Result<Frame, FrameError> {
        let bad = |source| FrameError::BadPayload {
            kind: kind.to_string(),
            source,
        };
        match kind {
            "chunk" => {
                let p: DataPayload = serde_json::from_str(data).map_err(bad)?;
                Ok(Frame::Chunk { data: p.data })
            }
            "output" => {
                let p: DataPayload = serde_json::from_str(data).map_err(bad)?;
                Ok(Frame::Output { data: p.data })
            }
            "error" => {
                let p: ErrorPayload = serde_json::from_str(data).map_err(bad)?;
                Ok(Frame::Error { message: p.message })
            }
            "complete" => {
                let p: CompletePayload = serde_json::from_str(data).map_err(bad)?;
                Ok(Frame::Complete {
                    cwd: p.cwd,
                    exit_status: p.exit_status,
                    failed: p.failed,
                })
            }
            other => Err(FrameError::UnknownKind(other.to_string())),
        }
    }
}

/// Incremental decoder for the framed stream.
///
/// Bytes arrive in arbitrary slices; a record (or even a multi-byte UTF-8
/// character) may be split across any number of `push` calls. The reader
/// buffers until a full blank-line-delimited record is present, then decodes
/// it. Decode failures are reported per-record so the caller can warn and
/// keep consuming.
#[derive(Debug, Default)]
pub struct FrameReader {
    buf: Vec<u8>,
}

impl FrameReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes and decode every complete record now available.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Result<Frame, FrameError>> {
        self.buf.extend_from_slice(bytes);
        let mut frames = Vec::new();
        while let Some(end) = find_record_end(&self.buf) {
            let record: Vec<u8> = self.buf.drain(..end + 2).collect();
            let text = String::from_utf8_lossy(&record);
            if text.trim().is_empty() {
                continue;
            }
            frames.push(parse_record(&text));
        }
        frames
    }

    /// Bytes buffered but not yet forming a complete record.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}

fn find_record_end(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\n\n")
}

fn parse_record(text: &str) -> Result<Frame, FrameError> {
    let mut kind: Option<&str> = None;
    let mut data_lines: Vec<&str> = Vec::new();

    for line in text.lines() {
        // Comment lines are permitted by the event-stream convention.
        if line.starts_with(':') || line.is_empty() {
            continue;
        }
        let Some((field, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.strip_prefix(' ').unwrap_or(value);
        match field {
            "event" => kind = Some(value),
            "data" => data_lines.push(value),
            _ => {}
        }
    }

    let kind = kind.ok_or(FrameError::MissingKind)?;
    if data_lines.is_empty() {
        return Err(FrameError::MissingData);
    }
    Frame::decode_record(kind, &data_lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_complete_round_trip() {
        let frame = Frame::Complete {
            cwd: PathBuf::from("/x"),
            exit_status: 0,
            failed: false,
        };
        let mut reader = FrameReader::new();
        let decoded = reader.push(frame.encode().as_bytes());
        assert_eq!(decoded.len(), 1);
        assert_eq!(*decoded[0].as_ref().unwrap(), frame);
    }

    #[test]
    fn test_chunk_round_trip_preserves_newlines() {
        let frame = Frame::Chunk {
            data: "line one\nline two\n".to_string(),
        };
        let mut reader = FrameReader::new();
        let decoded = reader.push(frame.encode().as_bytes());
        assert_eq!(*decoded[0].as_ref().unwrap(), frame);
    }

    #[test]
    fn test_record_split_across_pushes() {
        let frame = Frame::Chunk {
            data: "hello".to_string(),
        };
        let encoded = frame.encode();
        let (a, b) = encoded.as_bytes().split_at(encoded.len() / 2);

        let mut reader = FrameReader::new();
        assert!(reader.push(a).is_empty());
        assert!(reader.pending() > 0);
        let decoded = reader.push(b);
        assert_eq!(*decoded[0].as_ref().unwrap(), frame);
        assert_eq!(reader.pending(), 0);
    }

    #[test]
    fn test_multibyte_character_split_across_pushes() {
        let frame = Frame::Chunk {
            data: "héllo".to_string(),
        };
        let encoded = frame.encode();
        // Split inside the two-byte 'é'.
        let split = encoded.find('é').unwrap() + 1;
        let mut reader = FrameReader::new();
        assert!(reader.push(&encoded.as_bytes()[..split]).is_empty());
        let decoded = reader.push(&encoded.as_bytes()[split..]);
        assert_eq!(*decoded[0].as_ref().unwrap(), frame);
    }

    #[test]
    fn test_multiple_records_in_one_push() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(
            Frame::Chunk {
                data: "a".to_string(),
            }
            .encode()
            .as_bytes(),
        );
        bytes.extend_from_slice(
            Frame::Complete {
                cwd: PathBuf::from("/tmp"),
                exit_status: 0,
                failed: false,
            }
            .encode()
            .as_bytes(),
        );

        let mut reader = FrameReader::new();
        let decoded = reader.push(&bytes);
        assert_eq!(decoded.len(), 2);
        assert!(decoded[1].as_ref().unwrap().is_terminal());
    }

    #[test]
    fn test_output_resembling_protocol_syntax_stays_payload() {
        // A chunk whose content looks like a record must survive intact.
        let frame = Frame::Chunk {
            data: "event: complete\ndata: {}\n\n".to_string(),
        };
        let mut reader = FrameReader::new();
        let decoded = reader.push(frame.encode().as_bytes());
        assert_eq!(decoded.len(), 1);
        assert_eq!(*decoded[0].as_ref().unwrap(), frame);
    }

    #[test]
    fn test_malformed_payload_reported_not_fatal() {
        let mut reader = FrameReader::new();
        let mut bytes = b"event: chunk\ndata: not json\n\n".to_vec();
        bytes.extend_from_slice(
            Frame::Complete {
                cwd: PathBuf::from("/"),
                exit_status: 0,
                failed: false,
            }
            .encode()
            .as_bytes(),
        );
        let decoded = reader.push(&bytes);
        assert_eq!(decoded.len(), 2);
        assert!(matches!(
            decoded[0],
            Err(FrameError::BadPayload { .. })
        ));
        assert!(decoded[1].is_ok());
    }

    #[test]
    fn test_unknown_kind_reported() {
        let mut reader = FrameReader::new();
        let decoded = reader.push(b"event: bogus\ndata: {}\n\n");
        assert!(matches!(decoded[0], Err(FrameError::UnknownKind(_))));
    }

    #[test]
    fn test_comment_lines_skipped() {
        let mut reader = FrameReader::new();
        let decoded = reader.push(b": keepalive\nevent: chunk\ndata: {\"data\":\"x\"}\n\n");
        assert_eq!(
            *decoded[0].as_ref().unwrap(),
            Frame::Chunk {
                data: "x".to_string()
            }
        );
    }
}

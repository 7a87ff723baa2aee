//! Wire protocol for worker processes.
//!
//! Length-prefixed JSON frames over the worker's stdin/stdout:
//! a 4-byte length (u32 LE) followed by the serde_json-encoded message.
//! End-of-work is signaled by closing the request channel, not by a frame.

use std::io::{self, Read, Write};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, ErrorEnvelope, Result};

/// Frames larger than this are rejected as corrupt.
const MAX_FRAME_LEN: usize = 100 * 1024 * 1024;

/// Request sent from a coordinator to its worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WorkerRequest {
    /// Spawn-time liveness handshake, answered with [`WorkerReply::Pong`].
    Ping,
    /// Apply the operation to one claimed item.
    ///
    /// The payload travels with the request; a worker never assumes the
    /// collection is already present in its memory.
    Job { index: u64, item: Value },
}

/// Reply sent from a worker to its coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WorkerReply {
    /// Handshake answer.
    Pong,
    /// Operation result for the echoed index.
    Output { index: u64, value: Value },
    /// The operation failed; what crossed the boundary is the envelope.
    Failed { index: u64, envelope: ErrorEnvelope },
}

/// Write one length-prefixed frame and flush it.
pub fn write_frame<W: Write>(writer: &mut W, message: &impl Serialize) -> Result<()> {
    let bytes = serde_json::to_vec(message)
        .map_err(|e| Error::Serialization(format!("failed to encode frame: {e}")))?;
    let len = u32::try_from(bytes.len())
        .map_err(|_| Error::Serialization(format!("frame too large: {} bytes", bytes.len())))?;

    writer.write_all(&len.to_le_bytes()).map_err(channel_error)?;
    writer.write_all(&bytes).map_err(channel_error)?;
    writer.flush().map_err(channel_error)?;
    Ok(())
}

/// Read one frame; end-of-stream at any point means the peer is gone.
pub fn read_frame<R: Read, T: DeserializeOwned>(reader: &mut R) -> Result<T> {
    read_frame_opt(reader)?.ok_or(Error::DeadWorker)
}

/// Read one frame, or `None` on a clean end-of-stream at a frame boundary.
///
/// Workers read with this: the coordinator closing the request channel is
/// the end-of-work signal, while EOF in the middle of a frame is still an
/// error.
pub fn read_frame_opt<R: Read, T: DeserializeOwned>(reader: &mut R) -> Result<Option<T>> {
    let mut len_bytes = [0u8; 4];
    let mut filled = 0;
    while filled < len_bytes.len() {
        match reader.read(&mut len_bytes[filled..]) {
            Ok(0) if filled == 0 => return Ok(None),
            Ok(0) => return Err(Error::DeadWorker),
            Ok(n) => filled += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(channel_error(err)),
        }
    }

    let len = u32::from_le_bytes(len_bytes) as usize;
    if len > MAX_FRAME_LEN {
        return Err(Error::Ipc(format!("frame too large: {len} bytes")));
    }

    let mut bytes = vec![0u8; len];
    reader.read_exact(&mut bytes).map_err(channel_error)?;

    let message = serde_json::from_slice(&bytes)
        .map_err(|e| Error::Serialization(format!("failed to decode frame: {e}")))?;
    Ok(Some(message))
}

/// A closed peer is a dead worker; anything else is a plain IPC failure.
fn channel_error(err: io::Error) -> Error {
    match err.kind() {
        io::ErrorKind::BrokenPipe
        | io::ErrorKind::UnexpectedEof
        | io::ErrorKind::ConnectionReset => Error::DeadWorker,
        _ => Error::Ipc(format!("channel I/O failed: {err}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_request_roundtrip() {
        let request = WorkerRequest::Job {
            index: 3,
            item: serde_json::json!({"name": "x", "weight": 2}),
        };

        let mut buf = Vec::new();
        write_frame(&mut buf, &request).unwrap();

        let mut cursor = Cursor::new(buf);
        let decoded: WorkerRequest = read_frame(&mut cursor).unwrap();
        match decoded {
            WorkerRequest::Job { index, item } => {
                assert_eq!(index, 3);
                assert_eq!(item["weight"], 2);
            }
            other => panic!("wrong request: {other:?}"),
        }
    }

    #[test]
    fn test_reply_roundtrip() {
        let reply = WorkerReply::Failed {
            index: 9,
            envelope: ErrorEnvelope::undumpable("weird"),
        };

        let mut buf = Vec::new();
        write_frame(&mut buf, &reply).unwrap();

        let mut cursor = Cursor::new(buf);
        match read_frame::<_, WorkerReply>(&mut cursor).unwrap() {
            WorkerReply::Failed { index, envelope } => {
                assert_eq!(index, 9);
                assert_eq!(envelope, ErrorEnvelope::undumpable("weird"));
            }
            other => panic!("wrong reply: {other:?}"),
        }
    }

    #[test]
    fn test_multiple_frames_in_sequence() {
        let mut buf = Vec::new();
        write_frame(&mut buf, &WorkerRequest::Ping).unwrap();
        write_frame(&mut buf, &WorkerRequest::Job { index: 0, item: serde_json::json!(1) }).unwrap();

        let mut cursor = Cursor::new(buf);
        assert!(matches!(
            read_frame::<_, WorkerRequest>(&mut cursor).unwrap(),
            WorkerRequest::Ping
        ));
        assert!(matches!(
            read_frame::<_, WorkerRequest>(&mut cursor).unwrap(),
            WorkerRequest::Job { index: 0, .. }
        ));
        // Channel closed at a frame boundary.
        assert!(read_frame_opt::<_, WorkerRequest>(&mut cursor).unwrap().is_none());
    }

    #[test]
    fn test_eof_at_boundary_vs_mid_frame() {
        let mut empty = Cursor::new(Vec::new());
        assert!(read_frame_opt::<_, WorkerRequest>(&mut empty).unwrap().is_none());
        assert!(matches!(
            read_frame::<_, WorkerRequest>(&mut Cursor::new(Vec::new())),
            Err(Error::DeadWorker)
        ));

        // Truncated length prefix.
        let mut truncated = Cursor::new(vec![5u8, 0]);
        assert!(matches!(
            read_frame_opt::<_, WorkerRequest>(&mut truncated),
            Err(Error::DeadWorker)
        ));

        // Full prefix but missing body.
        let mut headless = Cursor::new(8u32.to_le_bytes().to_vec());
        assert!(matches!(
            read_frame_opt::<_, WorkerRequest>(&mut headless),
            Err(Error::DeadWorker)
        ));
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let mut bogus = Cursor::new((u32::MAX).to_le_bytes().to_vec());
        assert!(matches!(
            read_frame_opt::<_, WorkerRequest>(&mut bogus),
            Err(Error::Ipc(_))
        ));
    }

    #[test]
    fn test_garbage_body_is_a_decode_error() {
        let body = b"not json at all";
        let mut buf = (body.len() as u32).to_le_bytes().to_vec();
        buf.extend_from_slice(body);
        let mut cursor = Cursor::new(buf);
        assert!(matches!(
            read_frame_opt::<_, WorkerRequest>(&mut cursor),
            Err(Error::Serialization(_))
        ));
    }
}

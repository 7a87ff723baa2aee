//! Error types for the fanout engine.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for fanout operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can end a run.
///
/// A run surfaces at most one of these: the first failure captured wins and
/// every other worker winds down before the error is returned.
#[derive(Debug, Error)]
pub enum Error {
    /// The user-supplied operation failed in the caller's address space
    /// (direct or thread mode). The original error object is carried
    /// verbatim.
    #[error(transparent)]
    Operation(anyhow::Error),

    /// The operation failed inside a worker process. Only what survived the
    /// trip through the [`ErrorEnvelope`] is available.
    #[error("{0}")]
    Remote(ErrorEnvelope),

    /// A worker process died outside of the normal protocol: its response
    /// channel closed mid-run or a request hit a broken pipe.
    #[error("worker process died unexpectedly")]
    DeadWorker,

    /// Failed to spawn or talk to a worker process.
    #[error("IPC error: {0}")]
    Ipc(String),

    /// A value could not be encoded for, or decoded from, the process
    /// boundary.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Failure returned by a user operation.
#[derive(Debug, Error)]
pub enum Fault {
    /// End the run early. This is a sentinel, not an error: the run resolves
    /// with no results and no failure.
    #[error("break")]
    Break,

    /// Ordinary operation failure; becomes the run's single error.
    #[error(transparent)]
    Failure(#[from] anyhow::Error),
}

impl Fault {
    /// Wrap any error as an operation failure.
    pub fn failure(err: impl Into<anyhow::Error>) -> Self {
        Fault::Failure(err.into())
    }

    /// Operation failure with a structured payload that should cross the
    /// process boundary intact.
    ///
    /// The payload is serialized eagerly; if that fails the fault degrades
    /// to a textual substitute right here, so the failure signal is never
    /// lost (it will marshal as [`EnvelopeKind::Undumpable`]).
    pub fn with_detail(message: impl Into<String>, detail: &impl Serialize) -> Self {
        let message = message.into();
        match serde_json::to_value(detail) {
            Ok(detail) => Fault::Failure(anyhow::Error::new(DetailedFault { message, detail })),
            Err(err) => Fault::Failure(anyhow::Error::new(UndumpableFault {
                description: format!("{message} (detail not serializable: {err})"),
            })),
        }
    }
}

/// An operation failure carrying a structured, serializable payload.
#[derive(Debug)]
pub(crate) struct DetailedFault {
    pub(crate) message: String,
    pub(crate) detail: serde_json::Value,
}

impl fmt::Display for DetailedFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for DetailedFault {}

/// Substitute for a failure whose payload could not be serialized.
#[derive(Debug)]
pub(crate) struct UndumpableFault {
    pub(crate) description: String,
}

impl fmt::Display for UndumpableFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description)
    }
}

impl std::error::Error for UndumpableFault {}

/// Best-effort text for a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Classification tag on an [`ErrorEnvelope`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnvelopeKind {
    /// The early-stop sentinel.
    Break,
    /// An operation failure representable in the envelope schema.
    Operation,
    /// Substitute for a failure (or an operation output) that could not be
    /// serialized; only a textual description survives.
    Undumpable,
}

/// Serializable wrapper around a worker-raised failure, used only when
/// crossing a process boundary.
///
/// Construction never fails: anything that cannot be represented degrades to
/// an [`EnvelopeKind::Undumpable`] substitute with a human-readable
/// description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    /// What kind of failure this is.
    pub kind: EnvelopeKind,
    /// Human-readable description.
    pub message: String,
    /// Structured payload, when the original failure provided one.
    pub detail: Option<serde_json::Value>,
}

impl ErrorEnvelope {
    /// Marshal a fault for transmission.
    pub fn capture(fault: &Fault) -> Self {
        match fault {
            Fault::Break => Self {
                kind: EnvelopeKind::Break,
                message: "break".to_string(),
                detail: None,
            },
            Fault::Failure(err) => {
                if let Some(detailed) = err.downcast_ref::<DetailedFault>() {
                    Self {
                        kind: EnvelopeKind::Operation,
                        message: detailed.message.clone(),
                        detail: Some(detailed.detail.clone()),
                    }
                } else if let Some(undumpable) = err.downcast_ref::<UndumpableFault>() {
                    Self {
                        kind: EnvelopeKind::Undumpable,
                        message: undumpable.description.clone(),
                        detail: None,
                    }
                } else {
                    // {:#} includes the whole source chain on one line.
                    Self {
                        kind: EnvelopeKind::Operation,
                        message: format!("{err:#}"),
                        detail: None,
                    }
                }
            }
        }
    }

    /// Substitute envelope for a value that could not be serialized at all.
    pub fn undumpable(description: impl Into<String>) -> Self {
        Self {
            kind: EnvelopeKind::Undumpable,
            message: description.into(),
            detail: None,
        }
    }

    /// Whether this envelope carries the early-stop sentinel.
    pub fn is_break(&self) -> bool {
        self.kind == EnvelopeKind::Break
    }
}

impl fmt::Display for ErrorEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            EnvelopeKind::Break => f.write_str("break"),
            EnvelopeKind::Operation => f.write_str(&self.message),
            EnvelopeKind::Undumpable => write!(f, "undumpable operation failure: {}", self.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_capture_break() {
        let env = ErrorEnvelope::capture(&Fault::Break);
        assert!(env.is_break());
        assert!(env.detail.is_none());
    }

    #[test]
    fn test_capture_plain_failure_keeps_chain() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk on fire");
        let fault = Fault::failure(anyhow::Error::new(io).context("reading input"));
        let env = ErrorEnvelope::capture(&fault);
        assert_eq!(env.kind, EnvelopeKind::Operation);
        assert!(env.message.contains("reading input"));
        assert!(env.message.contains("disk on fire"));
        assert!(env.detail.is_none());
    }

    #[test]
    fn test_capture_detailed_failure() {
        let fault = Fault::with_detail("bad record", &serde_json::json!({"line": 7}));
        let env = ErrorEnvelope::capture(&fault);
        assert_eq!(env.kind, EnvelopeKind::Operation);
        assert_eq!(env.message, "bad record");
        assert_eq!(env.detail, Some(serde_json::json!({"line": 7})));
    }

    #[test]
    fn test_unserializable_detail_degrades_to_undumpable() {
        // JSON maps require string keys, so this payload cannot be dumped.
        let mut detail = HashMap::new();
        detail.insert(vec![1u8, 2], "boom");

        let fault = Fault::with_detail("bad record", &detail);
        let env = ErrorEnvelope::capture(&fault);
        assert_eq!(env.kind, EnvelopeKind::Undumpable);
        assert!(env.message.contains("bad record"));
        assert!(env.detail.is_none());
    }

    #[test]
    fn test_envelope_roundtrip() {
        let env = ErrorEnvelope {
            kind: EnvelopeKind::Operation,
            message: "nope".to_string(),
            detail: Some(serde_json::json!([1, 2, 3])),
        };
        let bytes = serde_json::to_vec(&env).unwrap();
        let back: ErrorEnvelope = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(back, env);
    }

    #[test]
    fn test_display() {
        let env = ErrorEnvelope::undumpable("weird value");
        assert_eq!(env.to_string(), "undumpable operation failure: weird value");
        assert_eq!(
            Error::DeadWorker.to_string(),
            "worker process died unexpectedly"
        );
    }
}

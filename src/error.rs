// THEORY:
// Every fallible boundary of the engine (camera, landmark model, store, bus,
// configuration) reports through a single error type. Most of these errors are
// never shown to the learner: the callers degrade locally (stub model, disabled
// monitoring, re-queued events) and only log. Keeping one enum makes those
// degrade decisions a simple `match` at the call site.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FocusError {
    #[error("camera access was denied by the user")]
    CameraDenied,
    #[error("no camera device is available")]
    CameraUnavailable,
    #[error("landmark model unavailable: {0}")]
    ModelUnavailable(String),
    #[error("malformed landmark output: expected at least {expected} points, got {actual}")]
    MalformedLandmarks { expected: usize, actual: usize },
    #[error("store operation failed: {0}")]
    Store(String),
    #[error("session not found: {0}")]
    SessionNotFound(String),
    #[error("message bus error: {0}")]
    Bus(String),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, FocusError>;

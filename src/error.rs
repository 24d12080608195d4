//! Host-facing error taxonomy.
//!
//! Backend and driver failures are always translated into one of these kinds
//! before they reach the recording session; the host only ever sees a kind
//! plus a human-readable message.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use clipcam_camera::DriverError;

/// Classification of a capture failure, stable across backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    /// No usable camera at all. Fatal, ends the flow.
    HardwareUnsupported,
    /// The preferred device API is not usable on this hardware. The
    /// selection layer falls back to the legacy backend instead.
    BackendUnavailable,
    /// Exclusive device access could not be acquired within the bound.
    DeviceBusyTimeout,
    /// The recorder could not be prepared with the chosen parameters, even
    /// after the one-time quality downgrade.
    ConfigurationFailed,
    /// Required camera permission was refused.
    PermissionDenied,
    /// The device reported an asynchronous error or disconnect mid-session.
    MidSessionDisconnect,
    /// The auto-submit path triggered with nothing recorded.
    TimeLimitReachedWithNoClip,
    /// Clip file could not be created, promoted, or deleted.
    Storage,
    /// An operation was issued against a session state that rejects it.
    InvalidState,
}

/// Main error type for capture operations.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no usable camera on this device")]
    HardwareUnsupported,

    #[error("preferred device api unavailable: {0}")]
    BackendUnavailable(String),

    #[error("timed out waiting for exclusive camera access")]
    DeviceBusyTimeout,

    #[error("failed to prepare the recorder: {0}")]
    ConfigurationFailed(String),

    #[error("camera permission refused")]
    PermissionDenied,

    #[error("camera failed mid-session: {0}")]
    MidSessionDisconnect(String),

    #[error("time limit reached before a clip was recorded")]
    TimeLimitReachedWithNoClip,

    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("invalid session state: {0}")]
    InvalidState(String),
}

impl CaptureError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CaptureError::HardwareUnsupported => ErrorKind::HardwareUnsupported,
            CaptureError::BackendUnavailable(_) => ErrorKind::BackendUnavailable,
            CaptureError::DeviceBusyTimeout => ErrorKind::DeviceBusyTimeout,
            CaptureError::ConfigurationFailed(_) => ErrorKind::ConfigurationFailed,
            CaptureError::PermissionDenied => ErrorKind::PermissionDenied,
            CaptureError::MidSessionDisconnect(_) => ErrorKind::MidSessionDisconnect,
            CaptureError::TimeLimitReachedWithNoClip => ErrorKind::TimeLimitReachedWithNoClip,
            CaptureError::Storage(_) => ErrorKind::Storage,
            CaptureError::InvalidState(_) => ErrorKind::InvalidState,
        }
    }
}

/// Translation of device-level errors into the taxonomy. Backend-specific
/// detail survives only inside the message.
impl From<DriverError> for CaptureError {
    fn from(err: DriverError) -> Self {
        match err {
            DriverError::Busy(_) => CaptureError::DeviceBusyTimeout,
            DriverError::Unsupported(msg) => CaptureError::BackendUnavailable(msg),
            DriverError::NoSuchCamera(_) => CaptureError::HardwareUnsupported,
            DriverError::Disconnected => {
                CaptureError::MidSessionDisconnect("device disconnected".into())
            }
            DriverError::SinkRejected(msg) => CaptureError::ConfigurationFailed(msg),
            DriverError::Io(msg) => CaptureError::MidSessionDisconnect(msg),
        }
    }
}

/// Kind + message pair carried by terminal `Failed` outcomes. Cloneable and
/// serializable so the host can route it through its own result channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureReason {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&CaptureError> for FailureReason {
    fn from(err: &CaptureError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Type alias for results using [`CaptureError`].
pub type CaptureResult<T> = Result<T, CaptureError>;

//! Session states, the recording window, and interruption persistence.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use clipcam_camera::{CameraFacing, DiscoveredCameras};

use crate::error::FailureReason;

/// Sentinel for "no timestamp recorded".
pub const UNSET: i64 = -1;

/// Where one capture attempt stands.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    /// No camera acquired yet (also the post-interruption resting state).
    Idle,
    /// Camera open, preview live, not recording.
    CameraReady,
    /// Recorder running.
    Recording,
    /// Recorder stopped; transient while the outcome branch is decided.
    Stopped { reached_limit: bool },
    /// A clip is waiting for the user's keep/retry decision.
    PreviewPending,
    /// Terminal. No further start/stop calls are accepted.
    Completed(SessionOutcome),
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Completed(_))
    }
}

/// How a capture flow ended.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionOutcome {
    /// A clip was produced and accepted.
    Recorded(PathBuf),
    /// A produced clip was thrown away on purpose.
    Discarded,
    /// The flow ended with no accepted clip.
    Cancelled,
    /// The flow ended on an error.
    Failed(FailureReason),
}

/// Recording timestamps and the configured limit, in epoch milliseconds.
///
/// `end` is always derived from `start + limit`, never set independently;
/// without a limit there is never an end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingWindow {
    start_ms: i64,
    end_ms: i64,
    limit_ms: i64,
}

impl RecordingWindow {
    pub fn new(limit_ms: i64) -> Self {
        Self {
            start_ms: UNSET,
            end_ms: UNSET,
            limit_ms: if limit_ms > 0 { limit_ms } else { UNSET },
        }
    }

    /// Record the start of the window; the end follows from the limit.
    pub fn set_start(&mut self, start_ms: i64) {
        self.start_ms = start_ms;
        self.end_ms = if start_ms > UNSET && self.has_limit() {
            start_ms + self.limit_ms
        } else {
            UNSET
        };
    }

    /// Rearm the window from zero for the next manual attempt.
    pub fn clear_start(&mut self) {
        self.set_start(UNSET);
    }

    pub fn start_ms(&self) -> i64 {
        self.start_ms
    }

    pub fn end_ms(&self) -> i64 {
        self.end_ms
    }

    pub fn limit_ms(&self) -> i64 {
        self.limit_ms
    }

    pub fn has_limit(&self) -> bool {
        self.limit_ms > UNSET
    }

    pub fn started(&self) -> bool {
        self.start_ms > UNSET
    }

    /// Milliseconds until the window closes, when an end exists.
    pub fn remaining_at(&self, now_ms: i64) -> Option<i64> {
        (self.end_ms > UNSET).then_some(self.end_ms - now_ms)
    }

    /// Milliseconds since the window opened, when started.
    pub fn elapsed_at(&self, now_ms: i64) -> Option<i64> {
        self.started().then_some(now_ms - self.start_ms)
    }
}

/// Everything that must survive a configuration-change interruption:
/// facing, the discovered identifier cache, the recording window, the
/// outstanding-permission flag, whether a clip was produced, and the
/// in-progress output file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub facing: CameraFacing,
    pub cameras: DiscoveredCameras,
    pub window: RecordingWindow,
    pub requesting_permission: bool,
    pub did_record: bool,
    pub output: Option<PathBuf>,
}

impl SessionSnapshot {
    /// Serialize into the host's opaque saved-state blob.
    pub fn to_blob(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_blob(blob: &str) -> serde_json::Result<Self> {
        serde_json::from_str(blob)
    }
}

//! clipcam — guided video-clip capture core.
//!
//! A host application embeds this crate to run a time-boxed clip capture
//! flow: pick a camera, record, optionally preview/retry, and get back a
//! file reference. The host owns the widgets; this crate owns the recording
//! session state machine, the two camera backend implementations, the
//! countdown/auto-submit policy, and the orientation math.
//!
//! Typical wiring:
//!
//! ```ignore
//! let backend = clipcam::camera::select_backend(session_driver, legacy_driver);
//! let (mut session, events) = clipcam::RecordingSession::new(config, backend);
//! session.open_camera(&env)?;
//! // pump `events` and `session.tick()` from the UI loop; call
//! // start/stop/retry/use_video from user actions.
//! ```

pub mod camera;
pub mod clip;
pub mod config;
pub mod error;
pub mod orientation;
pub mod session;

pub use camera::{
    select_backend, BackendEvent, BackendKind, CameraBackend, CaptureEnv, LegacyBackend,
    OpenedCamera, PermissionState, RecorderRequest, SessionBackend,
};
pub use clip::{default_save_dir, CLIP_MIME};
pub use config::{SessionConfig, UNLIMITED};
pub use error::{CaptureError, CaptureResult, ErrorKind, FailureReason};
pub use orientation::{
    activity_orientation_for, display_orientation, preview_transform, OrientationState, Rotation,
    ScreenOrientation, Transform,
};
pub use session::{
    PauseCause, PlaybackErrorKind, PlaybackObserver, RecordingSession, RecordingWindow,
    SessionEvent, SessionOutcome, SessionSnapshot, SessionState,
};

pub use clipcam_camera::{
    CameraFacing, CameraId, DiscoveredCameras, LegacyDriver, QualityProfile, RecorderSink,
    SessionDriver, SinkConfig, Size, SurfaceTarget,
};

//! Camera backend abstraction.
//!
//! Unifies the two incompatible device APIs behind one contract: the legacy
//! synchronous driver and the newer session-based asynchronous driver.
//! Callers hold a single `dyn CameraBackend` and never inspect which variant
//! is active except to read selection diagnostics.

mod legacy;
mod session;

#[cfg(test)]
pub(crate) mod fakes;

pub use legacy::{LegacyBackend, STOP_SETTLE_DELAY};
pub use session::SessionBackend;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clipcam_camera::{
    CameraId, DeviceGate, DiscoveredCameras, GateGuard, GateTimeout, LegacyDriver, RecorderSink,
    SessionDriver, SinkConfig, Size, SurfaceTarget, DEVICE_OPEN_TIMEOUT,
};

use crate::error::{CaptureError, CaptureResult};
use crate::orientation::{OrientationState, Rotation};

// ============================================================================
// Backend Contract
// ============================================================================

/// Which backend variant is active. Diagnostics only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Legacy,
    Session,
}

impl BackendKind {
    pub fn name(self) -> &'static str {
        match self {
            BackendKind::Legacy => "legacy",
            BackendKind::Session => "session",
        }
    }
}

/// Host-side facts a backend needs to open and lay out a camera.
#[derive(Debug, Clone, Copy)]
pub struct CaptureEnv {
    /// Current physical device rotation.
    pub device_rotation: Rotation,
    /// Dimensions of the preview view the surface will fill.
    pub view_size: Size,
    /// Host-provided preview surface.
    pub preview_surface: SurfaceTarget,
    /// Granted runtime permissions.
    pub permissions: PermissionState,
}

/// Host-reported permission grants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PermissionState {
    pub camera: bool,
    pub microphone: bool,
}

impl PermissionState {
    pub const fn new(camera: bool, microphone: bool) -> Self {
        Self { camera, microphone }
    }

    pub const fn granted() -> Self {
        Self::new(true, true)
    }
}

/// What a successful open reports back: the sizes chosen for encoder and
/// surface, and the derived orientation facts.
#[derive(Debug, Clone, Copy)]
pub struct OpenedCamera {
    pub video_size: Size,
    pub preview_size: Size,
    pub orientation: OrientationState,
}

/// Parameters for one recording attempt. Sizes and orientation hint come
/// from the backend's own open-time state.
#[derive(Debug, Clone)]
pub struct RecorderRequest {
    pub output: PathBuf,
    pub audio_enabled: bool,
}

/// Asynchronous backend notifications, already marshalled onto the control
/// thread. Drained via [`CameraBackend::poll_event`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendEvent {
    /// The device went away mid-session.
    Disconnected,
    /// The device reported an unrecoverable error.
    Fault(String),
}

/// Common contract over the two camera device APIs.
///
/// Call order within one camera use: `open` → `begin_preview` →
/// `configure_recorder` → `start_recording` → `stop_recording` → `close`.
/// `stop_recording` and `close` are idempotent; `close` is safe to call with
/// an operation still in flight (late results are discarded).
pub trait CameraBackend: Send {
    fn kind(&self) -> BackendKind;

    /// Enumerate front/back cameras. Stops early once both are found.
    fn discover_cameras(&mut self) -> CaptureResult<DiscoveredCameras>;

    /// Acquire exclusive ownership of one camera. Any prior handle held by
    /// this backend is fully closed first. Blocks at most the device-open
    /// bound; a busy gate is retried once before surfacing
    /// [`CaptureError::DeviceBusyTimeout`].
    fn open(&mut self, id: &CameraId, env: &CaptureEnv) -> CaptureResult<OpenedCamera>;

    fn begin_preview(&mut self, surface: &SurfaceTarget) -> CaptureResult<()>;

    /// Prepare the recorder sink for one attempt. A rejected size/profile
    /// combination is retried once at the next lower fixed profile before
    /// surfacing [`CaptureError::ConfigurationFailed`].
    fn configure_recorder(&mut self, request: &RecorderRequest) -> CaptureResult<()>;

    fn start_recording(&mut self) -> CaptureResult<()>;

    /// Stop and release the recorder sink. Double-stop is tolerated.
    fn stop_recording(&mut self) -> CaptureResult<()>;

    /// Next pending asynchronous event, if any.
    fn poll_event(&mut self) -> Option<BackendEvent>;

    /// Release every device handle. Idempotent.
    fn close(&mut self);

    /// How long the host notification should settle after an auto-submit
    /// stop on this backend.
    fn stop_settle_delay(&self) -> Duration {
        Duration::ZERO
    }
}

// ============================================================================
// Backend Selection
// ============================================================================

/// Pick the backend for this hardware: the session API when it probes as
/// supported, the legacy API otherwise. Fallback happens here, never inside
/// the session backend itself.
pub fn select_backend(
    session_driver: Box<dyn SessionDriver>,
    legacy_driver: Box<dyn LegacyDriver>,
) -> Box<dyn CameraBackend> {
    if session_driver.is_supported() {
        match SessionBackend::spawn(session_driver) {
            Ok(backend) => {
                log::debug!("[CAMERA] selected session backend");
                return Box::new(backend);
            }
            Err(e) => {
                log::warn!("[CAMERA] session backend unavailable ({}), falling back", e);
            }
        }
    } else {
        log::warn!("[CAMERA] session device api unsupported, falling back to legacy backend");
    }
    Box::new(LegacyBackend::new(legacy_driver))
}

// ============================================================================
// Shared Backend Helpers
// ============================================================================

/// Acquire the device gate within the bound, retrying a busy gate once.
/// This is the only place the busy retry happens.
pub(crate) fn acquire_gate(gate: &Arc<DeviceGate>) -> CaptureResult<GateGuard> {
    match gate.acquire(DEVICE_OPEN_TIMEOUT) {
        Ok(guard) => Ok(guard),
        Err(GateTimeout) => {
            log::debug!("[CAMERA] device gate busy, retrying once");
            gate.acquire(DEVICE_OPEN_TIMEOUT)
                .map_err(|_| CaptureError::DeviceBusyTimeout)
        }
    }
}

/// Configure and prepare a sink, downgrading the quality profile once if the
/// primary profile is rejected.
pub(crate) fn prepare_sink(
    sink: &mut dyn RecorderSink,
    mut config: SinkConfig,
) -> CaptureResult<()> {
    let first = sink
        .configure(&config)
        .and_then(|_| sink.prepare())
        .map_err(CaptureError::from);

    match first {
        Ok(()) => Ok(()),
        Err(CaptureError::ConfigurationFailed(msg)) => {
            let Some(lower) = config.profile.downgrade() else {
                return Err(CaptureError::ConfigurationFailed(msg));
            };
            log::warn!(
                "[CAMERA] recorder rejected {:?} ({}), retrying at {:?}",
                config.profile,
                msg,
                lower
            );
            config = config.with_profile(lower);
            sink.configure(&config)
                .and_then(|_| sink.prepare())
                .map_err(CaptureError::from)
        }
        Err(other) => Err(other),
    }
}

/// Shorthand used by both backends for call-order violations.
pub(crate) fn invalid_state(what: &str) -> CaptureError {
    CaptureError::InvalidState(what.to_string())
}

#[cfg(test)]
mod tests {
    use super::fakes::{FakeLegacyDriver, FakeSessionDriver};
    use super::*;
    use clipcam_camera::QualityProfile;

    #[test]
    fn selection_prefers_session_backend() {
        let backend = select_backend(
            Box::new(FakeSessionDriver::with_cameras()),
            Box::new(FakeLegacyDriver::with_cameras()),
        );
        assert_eq!(backend.kind(), BackendKind::Session);
    }

    #[test]
    fn selection_falls_back_to_legacy_when_unsupported() {
        let backend = select_backend(
            Box::new(FakeSessionDriver::unsupported()),
            Box::new(FakeLegacyDriver::with_cameras()),
        );
        assert_eq!(backend.kind(), BackendKind::Legacy);
    }

    #[test]
    fn sink_preparation_downgrades_once() {
        let driver = FakeLegacyDriver::with_cameras().failing_profiles(&[QualityProfile::Q480]);
        let sink_log = driver.sink_log();
        let mut sink = {
            let mut driver: Box<dyn LegacyDriver> = Box::new(driver);
            driver.create_sink()
        };

        let config = SinkConfig::new(
            PathBuf::from("/tmp/clip.mp4"),
            Size::new(640, 480),
            90,
            true,
        );
        prepare_sink(sink.as_mut(), config).unwrap();

        let log = sink_log.lock();
        let profiles: Vec<QualityProfile> = log.configs.iter().map(|c| c.profile).collect();
        assert_eq!(profiles, vec![QualityProfile::Q480, QualityProfile::Q360]);
    }

    #[test]
    fn sink_preparation_fails_after_exhausting_profiles() {
        let driver = FakeLegacyDriver::with_cameras()
            .failing_profiles(&[QualityProfile::Q480, QualityProfile::Q360]);
        let mut sink = {
            let mut driver: Box<dyn LegacyDriver> = Box::new(driver);
            driver.create_sink()
        };

        let config = SinkConfig::new(
            PathBuf::from("/tmp/clip.mp4"),
            Size::new(640, 480),
            0,
            false,
        );
        let err = prepare_sink(sink.as_mut(), config).unwrap_err();
        assert!(matches!(err, CaptureError::ConfigurationFailed(_)));
    }
}

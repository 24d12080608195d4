//! Camera device model and driver seams for clipcam.
//!
//! Defines the types shared by both camera backends: facing/identifier model,
//! size selection policies, the recorder sink contract, the two driver APIs
//! (legacy synchronous and session-based asynchronous), and the single-slot
//! device-open gate.

use std::fmt::{self, Display};
use std::path::PathBuf;
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use tracing::debug;

// ============================================================================
// Facing and Identifiers
// ============================================================================

/// Which physical camera is selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CameraFacing {
    /// Not yet known; only valid transiently before discovery completes.
    #[default]
    Unknown,
    Front,
    Back,
}

impl CameraFacing {
    /// The facing a toggle would switch to. `Unknown` has no opposite.
    pub fn opposite(self) -> CameraFacing {
        match self {
            CameraFacing::Front => CameraFacing::Back,
            CameraFacing::Back => CameraFacing::Front,
            CameraFacing::Unknown => CameraFacing::Unknown,
        }
    }
}

/// Opaque identifier of a physical camera.
///
/// The legacy driver addresses cameras by integer index, the session driver
/// by string identifier; a session only ever hands an id back to the backend
/// that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CameraId {
    Index(i32),
    Name(String),
}

impl Display for CameraId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CameraId::Index(i) => write!(f, "#{}", i),
            CameraId::Name(n) => write!(f, "{}", n),
        }
    }
}

/// Result of a one-time camera enumeration.
///
/// A device with a single physical camera yields one populated field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredCameras {
    pub front: Option<CameraId>,
    pub back: Option<CameraId>,
}

impl DiscoveredCameras {
    pub fn is_empty(&self) -> bool {
        self.front.is_none() && self.back.is_none()
    }

    /// Both facings found; enumeration may stop early once this holds.
    pub fn is_complete(&self) -> bool {
        self.front.is_some() && self.back.is_some()
    }

    pub fn for_facing(&self, facing: CameraFacing) -> Option<&CameraId> {
        match facing {
            CameraFacing::Front => self.front.as_ref(),
            CameraFacing::Back => self.back.as_ref(),
            CameraFacing::Unknown => None,
        }
    }
}

// ============================================================================
// Sizes and Selection Policies
// ============================================================================

/// A pixel dimension pair. Used both for encoder (video) sizes and for
/// preview surface sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Exact aspect-ratio equality against another size, by cross
    /// multiplication so no rounding is involved.
    pub fn matches_aspect_of(&self, other: Size) -> bool {
        self.width as u64 * other.height as u64 == self.height as u64 * other.width as u64
    }
}

impl Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Encoder sizes are capped at this height to bound encode cost.
pub const PREFERRED_PIXEL_HEIGHT: u32 = 480;

/// Preferred encoder aspect ratio, width:height.
pub const PREFERRED_ASPECT: (u32, u32) = (4, 3);

/// Pick the recording size: the largest candidate with height at most
/// [`PREFERRED_PIXEL_HEIGHT`] whose aspect ratio is exactly 4:3. Falls back
/// to the last sub-480 candidate seen, then to the last candidate overall.
///
/// Returns `None` only for an empty candidate list.
pub fn choose_video_size(choices: &[Size]) -> Option<Size> {
    let mut four_three: Option<Size> = None;
    let mut backup: Option<Size> = None;
    for &size in choices {
        if size.height <= PREFERRED_PIXEL_HEIGHT {
            if size.width * PREFERRED_ASPECT.1 == size.height * PREFERRED_ASPECT.0 {
                if four_three.map_or(true, |best| size.area() > best.area()) {
                    four_three = Some(size);
                }
            } else {
                backup = Some(size);
            }
        }
    }
    if four_three.is_none() && backup.is_none() {
        debug!("no suitable video size among {} candidates", choices.len());
    }
    four_three.or(backup).or_else(|| choices.last().copied())
}

/// Pick the preview size: the smallest candidate (by area) whose aspect ratio
/// matches `aspect_of` and whose dimensions both dominate `target`. Falls
/// back to the first candidate when nothing matches.
pub fn choose_optimal_preview_size(choices: &[Size], target: Size, aspect_of: Size) -> Option<Size> {
    let best = choices
        .iter()
        .copied()
        .filter(|s| {
            s.matches_aspect_of(aspect_of) && s.width >= target.width && s.height >= target.height
        })
        .min_by_key(Size::area);
    if best.is_none() {
        debug!("no suitable preview size among {} candidates", choices.len());
    }
    best.or_else(|| choices.first().copied())
}

// ============================================================================
// Surfaces
// ============================================================================

/// Opaque token for a host-provided render or record surface. The core never
/// dereferences it; drivers resolve it against their own surface registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceTarget {
    pub id: u64,
}

impl SurfaceTarget {
    pub const fn new(id: u64) -> Self {
        Self { id }
    }
}

// ============================================================================
// Recorder Sink
// ============================================================================

/// Fixed encoder quality profiles. `Q480` is the primary profile; a failed
/// prepare is retried once at the next lower profile before surfacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityProfile {
    Q480,
    Q360,
}

impl QualityProfile {
    /// The next lower fixed profile, if any.
    pub fn downgrade(self) -> Option<QualityProfile> {
        match self {
            QualityProfile::Q480 => Some(QualityProfile::Q360),
            QualityProfile::Q360 => None,
        }
    }

    pub fn video_bit_rate(self) -> u32 {
        match self {
            QualityProfile::Q480 => VIDEO_BIT_RATE,
            QualityProfile::Q360 => VIDEO_BIT_RATE / 2,
        }
    }
}

/// Fixed encoder bit rate at the primary profile.
pub const VIDEO_BIT_RATE: u32 = 10_000_000;

/// Fixed encoder frame rate.
pub const VIDEO_FRAME_RATE: u32 = 15;

/// Everything a recorder sink needs before `prepare()`.
#[derive(Debug, Clone)]
pub struct SinkConfig {
    pub output: PathBuf,
    pub video_size: Size,
    /// Rotation hint baked into the container, degrees clockwise.
    pub orientation_hint: u16,
    /// When false the sink must record video without an audio track.
    pub audio_enabled: bool,
    pub profile: QualityProfile,
    pub video_bit_rate: u32,
    pub frame_rate: u32,
}

impl SinkConfig {
    pub fn new(output: PathBuf, video_size: Size, orientation_hint: u16, audio_enabled: bool) -> Self {
        Self {
            output,
            video_size,
            orientation_hint,
            audio_enabled,
            profile: QualityProfile::Q480,
            video_bit_rate: QualityProfile::Q480.video_bit_rate(),
            frame_rate: VIDEO_FRAME_RATE,
        }
    }

    pub fn with_profile(mut self, profile: QualityProfile) -> Self {
        self.profile = profile;
        self.video_bit_rate = profile.video_bit_rate();
        self
    }
}

/// One media sink per recording attempt. Dropping the sink releases any
/// encoder resources it still holds.
pub trait RecorderSink: Send {
    fn configure(&mut self, config: &SinkConfig) -> Result<(), DriverError>;

    /// May reject a size/profile combination the hardware encoder cannot do.
    fn prepare(&mut self) -> Result<(), DriverError>;

    fn start(&mut self) -> Result<(), DriverError>;

    /// Stopping a sink that never started is a driver error; callers that
    /// need idempotent semantics swallow it.
    fn stop(&mut self) -> Result<(), DriverError>;

    /// Session-style sinks expose a surface the capture session must target;
    /// legacy sinks attach through the preview display instead.
    fn surface(&self) -> Option<SurfaceTarget> {
        None
    }
}

// ============================================================================
// Legacy Driver (older synchronous device API)
// ============================================================================

/// Per-camera metadata reported by the legacy driver.
#[derive(Debug, Clone, Copy)]
pub struct LegacyCameraInfo {
    pub facing: CameraFacing,
    /// Mounting orientation of the sensor, degrees clockwise.
    pub sensor_orientation: u16,
}

/// The older, fully synchronous device API. All calls block the caller.
pub trait LegacyDriver: Send {
    fn camera_count(&self) -> i32;

    fn camera_info(&self, index: i32) -> Result<LegacyCameraInfo, DriverError>;

    /// Acquires exclusive ownership of the camera at `index`.
    fn open(&mut self, index: i32) -> Result<Box<dyn LegacyDevice>, DriverError>;

    fn create_sink(&mut self) -> Box<dyn RecorderSink>;
}

/// An open legacy device. Dropping it releases the hardware.
pub trait LegacyDevice: Send {
    fn supported_preview_sizes(&self) -> Vec<Size>;

    fn set_preview_size(&mut self, size: Size) -> Result<(), DriverError>;

    fn set_display_orientation(&mut self, degrees: u16) -> Result<(), DriverError>;

    fn set_preview_target(&mut self, target: &SurfaceTarget) -> Result<(), DriverError>;

    /// Hand the device to a recorder sink. Must be balanced by `lock` before
    /// the device is released.
    fn unlock(&mut self);

    fn lock(&mut self);
}

// ============================================================================
// Session Driver (newer asynchronous device API)
// ============================================================================

/// Per-camera metadata reported by the session driver.
#[derive(Debug, Clone)]
pub struct SessionCharacteristics {
    pub facing: CameraFacing,
    /// Mounting orientation of the sensor, degrees clockwise.
    pub sensor_orientation: u16,
    /// Sizes the hardware encoder path supports.
    pub video_sizes: Vec<Size>,
    /// Sizes the preview surface path supports.
    pub preview_sizes: Vec<Size>,
}

/// Asynchronous notifications from an open session device. Delivered on a
/// driver-owned thread; consumers marshal them back to their control thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    /// The device went away (unplugged, claimed by another process).
    Disconnected,
    /// The device reported an unrecoverable error.
    Fault(String),
}

/// The newer, session-based device API. `open` returns once the device is
/// usable; later state changes arrive through the event channel.
pub trait SessionDriver: Send {
    /// Whether this hardware supports the session API at all. A `false`
    /// probe makes the selection layer fall back to the legacy driver.
    fn is_supported(&self) -> bool;

    fn camera_ids(&self) -> Result<Vec<String>, DriverError>;

    fn characteristics(&self, id: &str) -> Result<SessionCharacteristics, DriverError>;

    fn open(
        &mut self,
        id: &str,
        events: Sender<DeviceEvent>,
    ) -> Result<Box<dyn SessionDevice>, DriverError>;

    fn create_sink(&mut self) -> Box<dyn RecorderSink>;
}

/// An open session device.
pub trait SessionDevice: Send {
    /// Builds the capture session against the given surfaces (preview, and
    /// the recorder surface when the sink exposes one).
    fn create_capture_session(&mut self, targets: &[SurfaceTarget]) -> Result<(), DriverError>;

    /// Safe to call with an operation still in flight.
    fn close(&mut self);
}

// ============================================================================
// Device-Open Gate
// ============================================================================

/// Bound on waiting for exclusive device access.
pub const DEVICE_OPEN_TIMEOUT: Duration = Duration::from_millis(2500);

/// Single-slot mutual-exclusion gate guarding device opens.
///
/// The guard is held for the life of the open device handle, so a second
/// `acquire` on the same gate waits until the first handle closes or times
/// out. Every exit path releases through the guard's `Drop`.
pub struct DeviceGate {
    held: Mutex<bool>,
    released: Condvar,
}

impl DeviceGate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            held: Mutex::new(false),
            released: Condvar::new(),
        })
    }

    /// Acquire the slot, waiting at most `timeout`.
    pub fn acquire(self: &Arc<Self>, timeout: Duration) -> Result<GateGuard, GateTimeout> {
        let deadline = Instant::now() + timeout;
        let mut held = self.held.lock();
        while *held {
            if self.released.wait_until(&mut held, deadline).timed_out() && *held {
                debug!("timed out acquiring device gate after {:?}", timeout);
                return Err(GateTimeout);
            }
        }
        *held = true;
        Ok(GateGuard {
            gate: Arc::clone(self),
        })
    }

    fn release(&self) {
        let mut held = self.held.lock();
        *held = false;
        self.released.notify_one();
    }
}

/// RAII ownership of the device-open slot.
pub struct GateGuard {
    gate: Arc<DeviceGate>,
}

impl Drop for GateGuard {
    fn drop(&mut self) {
        self.gate.release();
    }
}

/// The gate could not be acquired within the bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("timed out waiting for exclusive device access")]
pub struct GateTimeout;

// ============================================================================
// Errors
// ============================================================================

/// Device-level failures. Backends translate these into the host-facing
/// taxonomy; `DriverError` itself never crosses the session boundary.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DriverError {
    #[error("camera busy: {0}")]
    Busy(String),

    #[error("device api unsupported on this hardware: {0}")]
    Unsupported(String),

    #[error("no such camera: {0}")]
    NoSuchCamera(String),

    #[error("device disconnected")]
    Disconnected,

    #[error("recorder rejected configuration: {0}")]
    SinkRejected(String),

    #[error("device i/o failure: {0}")]
    Io(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn facing_opposite() {
        assert_eq!(CameraFacing::Front.opposite(), CameraFacing::Back);
        assert_eq!(CameraFacing::Back.opposite(), CameraFacing::Front);
        assert_eq!(CameraFacing::Unknown.opposite(), CameraFacing::Unknown);
    }

    #[test]
    fn discovery_completeness() {
        let mut found = DiscoveredCameras::default();
        assert!(found.is_empty());
        found.back = Some(CameraId::Index(0));
        assert!(!found.is_empty());
        assert!(!found.is_complete());
        found.front = Some(CameraId::Index(1));
        assert!(found.is_complete());
        assert_eq!(found.for_facing(CameraFacing::Back), Some(&CameraId::Index(0)));
        assert_eq!(found.for_facing(CameraFacing::Unknown), None);
    }

    #[test]
    fn video_size_prefers_largest_four_three_under_cap() {
        let choices = [
            Size::new(320, 240),
            Size::new(1920, 1080),
            Size::new(640, 480),
            Size::new(1280, 720),
        ];
        assert_eq!(choose_video_size(&choices), Some(Size::new(640, 480)));
    }

    #[test]
    fn video_size_falls_back_to_last_sub_cap_candidate() {
        // No 4:3 candidates at all; last sub-480 entry wins.
        let choices = [
            Size::new(640, 360),
            Size::new(848, 480),
            Size::new(1280, 720),
        ];
        assert_eq!(choose_video_size(&choices), Some(Size::new(848, 480)));
    }

    #[test]
    fn video_size_falls_back_to_last_candidate() {
        let choices = [Size::new(1920, 1080), Size::new(1280, 720)];
        assert_eq!(choose_video_size(&choices), Some(Size::new(1280, 720)));
        assert_eq!(choose_video_size(&[]), None);
    }

    #[test]
    fn preview_size_picks_smallest_dominating_match() {
        let aspect = Size::new(640, 480);
        let choices = [
            Size::new(320, 240),  // matches aspect but too small
            Size::new(1600, 1200), // matches, dominates, but large
            Size::new(800, 600),  // matches, dominates, smallest area
            Size::new(1280, 720), // dominates but wrong aspect
        ];
        assert_eq!(
            choose_optimal_preview_size(&choices, Size::new(700, 500), aspect),
            Some(Size::new(800, 600))
        );
    }

    #[test]
    fn preview_size_falls_back_to_first_candidate() {
        let aspect = Size::new(640, 480);
        let choices = [Size::new(1280, 720), Size::new(1920, 1080)];
        assert_eq!(
            choose_optimal_preview_size(&choices, Size::new(100, 100), aspect),
            Some(Size::new(1280, 720))
        );
    }

    #[test]
    fn aspect_match_is_exact() {
        assert!(Size::new(800, 600).matches_aspect_of(Size::new(640, 480)));
        assert!(!Size::new(848, 480).matches_aspect_of(Size::new(640, 480)));
    }

    #[test]
    fn profile_downgrade_chain_is_finite() {
        assert_eq!(QualityProfile::Q480.downgrade(), Some(QualityProfile::Q360));
        assert_eq!(QualityProfile::Q360.downgrade(), None);
        assert!(QualityProfile::Q360.video_bit_rate() < QualityProfile::Q480.video_bit_rate());
    }

    #[test]
    fn gate_second_acquire_times_out_while_held() {
        let gate = DeviceGate::new();
        let _first = gate.acquire(Duration::from_millis(10)).unwrap();
        let second = gate.acquire(Duration::from_millis(50));
        assert!(second.is_err());
    }

    #[test]
    fn gate_release_on_drop_unblocks_waiter() {
        let gate = DeviceGate::new();
        let first = gate.acquire(Duration::from_millis(10)).unwrap();

        let waiter = {
            let gate = Arc::clone(&gate);
            thread::spawn(move || gate.acquire(Duration::from_millis(500)).is_ok())
        };

        thread::sleep(Duration::from_millis(50));
        drop(first);
        assert!(waiter.join().unwrap());
    }

    #[test]
    fn gate_never_grants_two_slots() {
        let gate = DeviceGate::new();
        let counter = Arc::new(Mutex::new(0u32));
        let mut handles = Vec::new();

        for _ in 0..4 {
            let gate = Arc::clone(&gate);
            let counter = Arc::clone(&counter);
            handles.push(thread::spawn(move || {
                let _guard = gate.acquire(Duration::from_secs(2)).unwrap();
                {
                    let mut live = counter.lock();
                    *live += 1;
                    assert_eq!(*live, 1, "two live holders observed");
                }
                thread::sleep(Duration::from_millis(20));
                let mut live = counter.lock();
                *live -= 1;
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }
    }
}

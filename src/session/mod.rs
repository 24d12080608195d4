//! Recording session coordinator.
//!
//! The state machine that drives one capture flow: camera acquisition and
//! release, the countdown and auto-submit policy, recording start/stop with
//! retry/discard semantics, and lifecycle interruptions. All transitions run
//! on the host's control thread; the backend marshals its own worker results
//! back before they are applied here.

mod countdown;
mod playback;
mod state;

pub use countdown::{
    format_duration, Countdown, CountdownUpdate, PREVIEW_TICK, RECORDING_TICK,
    WARNING_THRESHOLD_MS,
};
pub use playback::{PlaybackErrorKind, PlaybackObserver};
pub use state::{RecordingWindow, SessionOutcome, SessionSnapshot, SessionState, UNSET};

use std::path::{Path, PathBuf};
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};

use clipcam_camera::{CameraFacing, DiscoveredCameras};

use crate::camera::{BackendKind, CameraBackend, CaptureEnv, RecorderRequest};
use crate::clip;
use crate::config::SessionConfig;
use crate::error::{CaptureError, CaptureResult, FailureReason};
use crate::orientation::{activity_orientation_for, Rotation, ScreenOrientation};

/// Events the session emits to its host.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    StateChanged(SessionState),
    /// Periodic countdown display update.
    CountdownTick { display: String, warning: bool },
    /// Lock the UI to this orientation for the duration of the take.
    LockOrientation(ScreenOrientation),
    UnlockOrientation,
    /// A clip is ready for the user's keep/retry decision.
    ShowPreview { clip: PathBuf },
    /// Microphone permission is missing; recording continues without audio.
    AudioDisabled,
}

/// Why the host is pausing the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseCause {
    /// A configuration change such as rotation; state is kept for restore.
    ConfigChange,
    /// A permission prompt is covering the host; state is kept for restore.
    PermissionPrompt,
    /// The host is going away. A recording must never silently continue
    /// after the UI disappears.
    Background,
}

/// One complete capture attempt, from camera acquisition to terminal outcome.
pub struct RecordingSession {
    config: SessionConfig,
    backend: Box<dyn CameraBackend>,
    events: Sender<SessionEvent>,
    state: SessionState,
    window: RecordingWindow,
    facing: CameraFacing,
    cameras: Option<DiscoveredCameras>,
    requesting_permission: bool,
    did_record: bool,
    output: Option<PathBuf>,
    audio_enabled: bool,
    countdown: Countdown,
}

impl RecordingSession {
    /// Create a session for one capture flow. Returns the event stream the
    /// host should drain alongside its own loop.
    pub fn new(
        mut config: SessionConfig,
        backend: Box<dyn CameraBackend>,
    ) -> (Self, Receiver<SessionEvent>) {
        config.validate();
        let (events, events_rx) = unbounded();
        let window = RecordingWindow::new(config.length_limit_ms);
        log::debug!(
            "[SESSION] new flow: limit={}ms retry={} auto_submit={} backend={}",
            config.length_limit_ms,
            config.allow_retry,
            config.auto_submit,
            backend.kind().name()
        );
        (
            Self {
                config,
                backend,
                events,
                state: SessionState::Idle,
                window,
                facing: CameraFacing::Unknown,
                cameras: None,
                requesting_permission: false,
                did_record: false,
                output: None,
                audio_enabled: true,
                countdown: Countdown::new(),
            },
            events_rx,
        )
    }

    /// Reconstruct a session after a configuration-change interruption.
    pub fn restore(
        config: SessionConfig,
        backend: Box<dyn CameraBackend>,
        snapshot: SessionSnapshot,
    ) -> (Self, Receiver<SessionEvent>) {
        let (mut session, events_rx) = Self::new(config, backend);
        session.facing = snapshot.facing;
        session.cameras = (!snapshot.cameras.is_empty()).then_some(snapshot.cameras);
        session.window = snapshot.window;
        session.requesting_permission = snapshot.requesting_permission;
        session.did_record = snapshot.did_record;
        session.output = snapshot.output;
        log::debug!("[SESSION] restored mid-flow: window={:?}", session.window);
        (session, events_rx)
    }

    /// Capture everything that must survive an interruption.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            facing: self.facing,
            cameras: self.cameras.clone().unwrap_or_default(),
            window: self.window,
            requesting_permission: self.requesting_permission,
            did_record: self.did_record,
            output: self.output.clone(),
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn outcome(&self) -> Option<&SessionOutcome> {
        match &self.state {
            SessionState::Completed(outcome) => Some(outcome),
            _ => None,
        }
    }

    pub fn facing(&self) -> CameraFacing {
        self.facing
    }

    pub fn window(&self) -> &RecordingWindow {
        &self.window
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    pub fn output(&self) -> Option<&Path> {
        self.output.as_deref()
    }

    pub fn is_requesting_permission(&self) -> bool {
        self.requesting_permission
    }

    /// Whether the host should show its portrait warning before starting.
    pub fn should_warn_portrait(&self, rotation: Rotation) -> bool {
        self.config.show_portrait_warning && rotation.is_portrait()
    }

    // ========================================================================
    // Camera Acquisition
    // ========================================================================

    /// Acquire the camera and bring up the preview: `Idle → CameraReady`.
    ///
    /// Discovery runs once per flow and is cached. The facing default picks
    /// front when configured and available, then back, then whichever single
    /// camera exists. Camera permission must already be granted; a missing
    /// microphone grant degrades to video-without-audio.
    pub fn open_camera(&mut self, env: &CaptureEnv) -> CaptureResult<()> {
        self.ensure_active("open_camera")?;

        if !env.permissions.camera {
            let err = CaptureError::PermissionDenied;
            self.fail(&err);
            return Err(err);
        }
        self.requesting_permission = false;

        if self.audio_enabled && !env.permissions.microphone {
            self.audio_enabled = false;
            self.emit(SessionEvent::AudioDisabled);
            log::warn!("[SESSION] microphone not granted, recording without audio");
        }

        match self.open_camera_inner(env) {
            Ok(()) => Ok(()),
            Err(e) => {
                self.fail(&e);
                Err(e)
            }
        }
    }

    fn open_camera_inner(&mut self, env: &CaptureEnv) -> CaptureResult<()> {
        if self.cameras.is_none() {
            self.cameras = Some(self.backend.discover_cameras()?);
        }
        let cameras = self.cameras.clone().unwrap_or_default();
        if cameras.is_empty() {
            return Err(CaptureError::HardwareUnsupported);
        }

        if self.facing == CameraFacing::Unknown {
            self.facing = default_facing(&cameras, self.config.default_to_front_facing);
        }
        let id = cameras
            .for_facing(self.facing)
            .cloned()
            .ok_or(CaptureError::HardwareUnsupported)?;

        self.backend.open(&id, env)?;
        self.backend.begin_preview(&env.preview_surface)?;

        // A flow restored mid-take keeps counting against its original end.
        if self.window.has_limit() && self.window.started() {
            self.countdown.arm(RECORDING_TICK);
        }

        self.set_state(SessionState::CameraReady);
        Ok(())
    }

    /// Swap to the other facing, if that camera exists; otherwise a no-op.
    /// Close-then-reopen, never two devices at once.
    pub fn toggle_facing(&mut self, env: &CaptureEnv) -> CaptureResult<()> {
        self.ensure_active("toggle_facing")?;
        if !matches!(self.state, SessionState::CameraReady) {
            return Err(CaptureError::InvalidState(
                "facing can only change while the camera is idle".into(),
            ));
        }

        let cameras = self.cameras.clone().unwrap_or_default();
        let other = self.facing.opposite();
        if cameras.for_facing(other).is_none() {
            return Ok(());
        }

        self.facing = other;
        self.backend.close();
        match self.open_camera_inner(env) {
            Ok(()) => Ok(()),
            Err(e) => {
                self.fail(&e);
                Err(e)
            }
        }
    }

    // ========================================================================
    // Recording
    // ========================================================================

    /// Begin recording: `CameraReady → Recording`.
    pub fn start(&mut self, env: &CaptureEnv) -> CaptureResult<()> {
        self.start_at(env, now_ms())
    }

    /// [`start`] with an explicit wall clock, for deterministic callers.
    pub fn start_at(&mut self, env: &CaptureEnv, now_ms: i64) -> CaptureResult<()> {
        self.ensure_active("start")?;
        if !matches!(self.state, SessionState::CameraReady) {
            return Err(CaptureError::InvalidState(
                "start requires an open camera".into(),
            ));
        }

        self.emit(SessionEvent::LockOrientation(activity_orientation_for(
            env.device_rotation,
        )));

        // A leftover clip from an interrupted attempt must not be orphaned.
        if let Some(stale) = self.output.take() {
            let _ = clip::delete_clip(&stale);
        }

        let output = clip::new_clip_path(self.config.save_dir.as_deref())?;
        let request = RecorderRequest {
            output: output.clone(),
            audio_enabled: self.audio_enabled && env.permissions.microphone,
        };

        let result = self.backend.configure_recorder(&request).and_then(|_| {
            // The countdown only restarts if one isn't already running
            // (a restored flow keeps its original window).
            if !self.countdown.is_armed() {
                self.window.set_start(now_ms);
                self.countdown.arm(RECORDING_TICK);
            } else if !self.window.started() {
                self.window.set_start(now_ms);
            }
            self.backend.start_recording()
        });

        match result {
            Ok(()) => {
                self.did_record = true;
                self.output = Some(output);
                self.set_state(SessionState::Recording);
                log::debug!(
                    "[SESSION] recording into {:?}, window={:?}",
                    self.output,
                    self.window
                );
                Ok(())
            }
            Err(e) => {
                let _ = clip::delete_clip(&output);
                self.window.clear_start();
                self.emit(SessionEvent::UnlockOrientation);
                self.fail(&e);
                Err(e)
            }
        }
    }

    /// Stop recording: `Recording → Stopped`, then branch to auto-submit or
    /// preview. Stopping an already-stopped session is tolerated.
    pub fn stop(&mut self, reached_limit: bool) -> CaptureResult<()> {
        self.ensure_active("stop")?;
        match self.state {
            SessionState::Recording => {}
            SessionState::Stopped { .. } | SessionState::PreviewPending => return Ok(()),
            _ => {
                return Err(CaptureError::InvalidState(
                    "stop requires an active recording".into(),
                ))
            }
        }

        self.set_state(SessionState::Stopped { reached_limit });
        let _ = self.backend.stop_recording();
        self.emit(SessionEvent::UnlockOrientation);
        self.finish_stopped(reached_limit);
        Ok(())
    }

    fn finish_stopped(&mut self, reached_limit: bool) {
        let has_limit = self.window.has_limit();
        let auto_submit = self.config.auto_submit;

        if !self.did_record {
            self.output = None;
        }

        // Auto-submit branch: the produced file is accepted unconditionally.
        if has_limit && auto_submit && (reached_limit || !self.config.allow_retry) {
            self.countdown.cancel();
            self.backend.close();
            match self.output.clone() {
                Some(clip) => {
                    let settle = self.backend.stop_settle_delay();
                    if settle > Duration::ZERO {
                        std::thread::sleep(settle);
                    }
                    self.complete(SessionOutcome::Recorded(clip));
                }
                None => self.fail(&CaptureError::TimeLimitReachedWithNoClip),
            }
            return;
        }

        // Manual branch: hand the clip to the user for a decision.
        self.backend.close();
        match self.output.clone() {
            None => self.fail(&CaptureError::TimeLimitReachedWithNoClip),
            Some(clip) => {
                if !has_limit {
                    // Timer rearms from zero on the next manual start.
                    self.window.clear_start();
                }
                if has_limit && auto_submit {
                    // The remaining window keeps counting over the preview.
                    self.countdown.arm(PREVIEW_TICK);
                } else {
                    self.countdown.cancel();
                }
                self.set_state(SessionState::PreviewPending);
                self.emit(SessionEvent::ShowPreview { clip });
            }
        }
    }

    // ========================================================================
    // Preview Decisions
    // ========================================================================

    /// Discard the previewed clip and rebuild the capture context:
    /// `PreviewPending → CameraReady`.
    pub fn retry(&mut self, env: &CaptureEnv) -> CaptureResult<()> {
        self.ensure_active("retry")?;
        if !matches!(self.state, SessionState::PreviewPending) {
            return Err(CaptureError::InvalidState(
                "retry requires a pending preview".into(),
            ));
        }
        if !self.config.allow_retry {
            return Err(CaptureError::InvalidState("retry is disallowed".into()));
        }

        if let Some(previous) = self.output.take() {
            clip::delete_clip(&previous)?;
        }
        self.did_record = false;
        if !self.config.auto_submit {
            self.window.clear_start();
        }
        self.countdown.cancel();
        self.backend.close();

        self.set_state(SessionState::Idle);
        self.open_camera(env)
    }

    /// Accept the previewed clip: terminal `Completed(Recorded)`.
    pub fn use_video(&mut self) -> CaptureResult<()> {
        self.ensure_active("use_video")?;
        if !matches!(self.state, SessionState::PreviewPending) {
            return Err(CaptureError::InvalidState(
                "use_video requires a pending preview".into(),
            ));
        }
        let clip = self
            .output
            .clone()
            .ok_or_else(|| CaptureError::InvalidState("no clip to submit".into()))?;
        self.countdown.cancel();
        self.complete(SessionOutcome::Recorded(clip));
        Ok(())
    }

    /// End the flow without an accepted clip. A produced clip is deleted and
    /// reported as `Discarded`; otherwise the outcome is `Cancelled`.
    pub fn cancel(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        let produced = self.did_record && self.output.is_some();
        self.teardown();
        self.complete(if produced {
            SessionOutcome::Discarded
        } else {
            SessionOutcome::Cancelled
        });
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// React to the host pausing. Backgrounding force-finishes the flow as
    /// `Cancelled`; rotation and permission prompts release the device but
    /// keep state for [`RecordingSession::snapshot`]/`restore`.
    pub fn on_host_paused(&mut self, cause: PauseCause) {
        if self.state.is_terminal() {
            return;
        }
        match cause {
            PauseCause::Background => {
                log::debug!("[SESSION] host backgrounded, force-cancelling");
                self.teardown();
                self.complete(SessionOutcome::Cancelled);
            }
            PauseCause::PermissionPrompt => {
                self.requesting_permission = true;
                self.suspend();
            }
            PauseCause::ConfigChange => self.suspend(),
        }
    }

    fn suspend(&mut self) {
        let _ = self.backend.stop_recording();
        self.backend.close();
        self.countdown.cancel();
        self.set_state(SessionState::Idle);
    }

    // ========================================================================
    // Cooperative Pump
    // ========================================================================

    /// One cooperative tick: drains backend events, advances the countdown,
    /// enforces the limit, and runs the preview auto-submit. Returns the
    /// delay until the next tick, or `None` when ticking should stop.
    pub fn tick(&mut self) -> Option<Duration> {
        self.tick_at(now_ms())
    }

    /// [`tick`] with an explicit wall clock, for deterministic callers.
    pub fn tick_at(&mut self, now_ms: i64) -> Option<Duration> {
        while let Some(event) = self.backend.poll_event() {
            log::error!("[SESSION] backend event: {:?}", event);
            let message = match event {
                crate::camera::BackendEvent::Disconnected => "device disconnected".to_string(),
                crate::camera::BackendEvent::Fault(m) => m,
            };
            self.fail(&CaptureError::MidSessionDisconnect(message));
            return None;
        }
        if self.state.is_terminal() {
            return None;
        }

        if let Some(update) = self.countdown.tick(&self.window, now_ms) {
            self.emit(SessionEvent::CountdownTick {
                display: update.display,
                warning: update.warning,
            });
            if update.reached_zero {
                match self.state {
                    SessionState::Recording => {
                        let _ = self.stop(true);
                    }
                    SessionState::PreviewPending => {
                        let _ = self.use_video();
                    }
                    // The window can close before recording ever started.
                    _ => self.fail(&CaptureError::TimeLimitReachedWithNoClip),
                }
            }
        }

        self.next_tick_delay()
    }

    /// The countdown re-arms only while recording, or while a preview is
    /// counting down to auto-submit.
    fn next_tick_delay(&self) -> Option<Duration> {
        if !self.countdown.is_armed() {
            return None;
        }
        match self.state {
            SessionState::Recording | SessionState::CameraReady => Some(RECORDING_TICK),
            SessionState::PreviewPending
                if self.config.auto_submit && self.window.has_limit() =>
            {
                Some(PREVIEW_TICK)
            }
            _ => None,
        }
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn ensure_active(&self, op: &str) -> CaptureResult<()> {
        if self.state.is_terminal() {
            return Err(CaptureError::InvalidState(format!(
                "{} on a completed session",
                op
            )));
        }
        Ok(())
    }

    /// Release every handle and remove any unaccepted clip.
    fn teardown(&mut self) {
        self.countdown.cancel();
        let _ = self.backend.stop_recording();
        self.backend.close();
        if let Some(clip) = self.output.take() {
            let _ = clip::delete_clip(&clip);
        }
    }

    fn fail(&mut self, err: &CaptureError) {
        log::error!("[SESSION] flow failed: {}", err);
        self.teardown();
        self.complete(SessionOutcome::Failed(FailureReason::from(err)));
    }

    fn complete(&mut self, outcome: SessionOutcome) {
        if self.state.is_terminal() {
            return;
        }
        log::debug!("[SESSION] completed: {:?}", outcome);
        self.set_state(SessionState::Completed(outcome));
    }

    fn set_state(&mut self, state: SessionState) {
        self.state = state;
        self.emit(SessionEvent::StateChanged(self.state.clone()));
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }
}

fn default_facing(cameras: &DiscoveredCameras, prefer_front: bool) -> CameraFacing {
    let (first, second, first_facing, second_facing) = if prefer_front {
        (
            &cameras.front,
            &cameras.back,
            CameraFacing::Front,
            CameraFacing::Back,
        )
    } else {
        (
            &cameras.back,
            &cameras.front,
            CameraFacing::Back,
            CameraFacing::Front,
        )
    };
    if first.is_some() {
        first_facing
    } else if second.is_some() {
        second_facing
    } else {
        CameraFacing::Unknown
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

//! Legacy camera backend.
//!
//! Drives the older synchronous device API directly on the control thread.
//! Every call completes before returning; the only asynchronous surface is
//! the (empty) event queue required by the backend contract.

use std::sync::Arc;
use std::time::Duration;

use clipcam_camera::{
    choose_optimal_preview_size, choose_video_size, CameraFacing, CameraId, DeviceGate,
    DiscoveredCameras, GateGuard, LegacyDevice, LegacyDriver, RecorderSink, SinkConfig, Size,
    SurfaceTarget,
};

use crate::camera::{
    acquire_gate, invalid_state, prepare_sink, BackendEvent, BackendKind, CameraBackend,
    CaptureEnv, OpenedCamera, RecorderRequest,
};
use crate::error::{CaptureError, CaptureResult};
use crate::orientation::{mirror, OrientationState};

/// Settle wait between an auto-submit stop and the host notification.
/// The old device API needs a beat for the hardware to flush before the
/// produced file is safe to hand over.
pub const STOP_SETTLE_DELAY: Duration = Duration::from_millis(100);

/// Backend over the older synchronous device API.
pub struct LegacyBackend {
    driver: Box<dyn LegacyDriver>,
    gate: Arc<DeviceGate>,
    slot: Option<OpenSlot>,
    sink: Option<Box<dyn RecorderSink>>,
    recording: bool,
    settle_delay: Duration,
}

/// One open device and everything derived at open time. Field order keeps
/// the device released before the gate slot frees.
struct OpenSlot {
    device: Box<dyn LegacyDevice>,
    _guard: GateGuard,
    video_size: Size,
    orientation: OrientationState,
}

impl LegacyBackend {
    pub fn new(driver: Box<dyn LegacyDriver>) -> Self {
        Self {
            driver,
            gate: DeviceGate::new(),
            slot: None,
            sink: None,
            recording: false,
            settle_delay: STOP_SETTLE_DELAY,
        }
    }

    /// Override the auto-submit settle wait.
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    #[cfg(test)]
    pub(crate) fn gate(&self) -> Arc<DeviceGate> {
        Arc::clone(&self.gate)
    }

    fn release_sink(&mut self) {
        if let Some(mut sink) = self.sink.take() {
            if self.recording {
                if let Err(e) = sink.stop() {
                    log::debug!("[CAMERA] legacy sink stop swallowed: {}", e);
                }
            }
            if let Some(slot) = self.slot.as_mut() {
                slot.device.lock();
            }
        }
        self.recording = false;
    }
}

impl CameraBackend for LegacyBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Legacy
    }

    fn discover_cameras(&mut self) -> CaptureResult<DiscoveredCameras> {
        let mut found = DiscoveredCameras::default();
        for index in 0..self.driver.camera_count() {
            if found.is_complete() {
                break;
            }
            let info = self.driver.camera_info(index)?;
            match info.facing {
                CameraFacing::Front if found.front.is_none() => {
                    found.front = Some(CameraId::Index(index));
                }
                CameraFacing::Back if found.back.is_none() => {
                    found.back = Some(CameraId::Index(index));
                }
                _ => {}
            }
        }
        log::debug!(
            "[CAMERA] legacy discovery: front={:?} back={:?}",
            found.front,
            found.back
        );
        Ok(found)
    }

    fn open(&mut self, id: &CameraId, env: &CaptureEnv) -> CaptureResult<OpenedCamera> {
        let CameraId::Index(index) = *id else {
            return Err(invalid_state("legacy backend expects an integer camera id"));
        };

        // Fully close any prior handle before taking a new one.
        self.close();

        let guard = acquire_gate(&self.gate)?;
        let info = self.driver.camera_info(index)?;
        let mut device = self.driver.open(index)?;

        let sizes = device.supported_preview_sizes();
        let video_size = choose_video_size(&sizes)
            .ok_or_else(|| CaptureError::ConfigurationFailed("device reports no sizes".into()))?;
        let preview_size = choose_optimal_preview_size(&sizes, env.view_size, video_size)
            .ok_or_else(|| CaptureError::ConfigurationFailed("device reports no sizes".into()))?;
        device.set_preview_size(preview_size)?;

        let orientation = OrientationState::derive(
            info.sensor_orientation,
            env.device_rotation,
            info.facing == CameraFacing::Front,
        );
        // The old API pre-mirrors the preview when the device is held
        // portrait; the recording hint stays unmirrored.
        let preview_degrees = if env.device_rotation.is_portrait() {
            mirror(orientation.display_degrees)
        } else {
            orientation.display_degrees
        };
        device.set_display_orientation(preview_degrees)?;

        log::debug!(
            "[CAMERA] legacy open #{}: video={} preview={} display={}°",
            index,
            video_size,
            preview_size,
            orientation.display_degrees
        );

        self.slot = Some(OpenSlot {
            device,
            _guard: guard,
            video_size,
            orientation,
        });

        Ok(OpenedCamera {
            video_size,
            preview_size,
            orientation,
        })
    }

    fn begin_preview(&mut self, surface: &SurfaceTarget) -> CaptureResult<()> {
        let slot = self
            .slot
            .as_mut()
            .ok_or_else(|| invalid_state("preview requested with no open camera"))?;
        slot.device.set_preview_target(surface)?;
        Ok(())
    }

    fn configure_recorder(&mut self, request: &RecorderRequest) -> CaptureResult<()> {
        let slot = self
            .slot
            .as_mut()
            .ok_or_else(|| invalid_state("recorder requested with no open camera"))?;

        let mut sink = self.driver.create_sink();
        slot.device.unlock();
        let config = SinkConfig::new(
            request.output.clone(),
            slot.video_size,
            slot.orientation.display_degrees,
            request.audio_enabled,
        );
        match prepare_sink(sink.as_mut(), config) {
            Ok(()) => {
                self.sink = Some(sink);
                Ok(())
            }
            Err(e) => {
                slot.device.lock();
                Err(e)
            }
        }
    }

    fn start_recording(&mut self) -> CaptureResult<()> {
        let sink = self
            .sink
            .as_mut()
            .ok_or_else(|| invalid_state("recording started with no prepared recorder"))?;
        sink.start()?;
        self.recording = true;
        Ok(())
    }

    fn stop_recording(&mut self) -> CaptureResult<()> {
        self.release_sink();
        Ok(())
    }

    fn poll_event(&mut self) -> Option<BackendEvent> {
        // The synchronous API reports every failure inline.
        None
    }

    fn close(&mut self) {
        self.release_sink();
        if self.slot.take().is_some() {
            log::debug!("[CAMERA] legacy device released");
        }
    }

    fn stop_settle_delay(&self) -> Duration {
        self.settle_delay
    }
}

impl Drop for LegacyBackend {
    fn drop(&mut self) {
        self.close();
    }
}

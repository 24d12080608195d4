//! Session camera backend.
//!
//! Drives the newer session-based device API from a dedicated worker thread
//! so device I/O never blocks the control thread beyond the fixed open bound.
//! Every result is marshalled back over channels and consumed on the control
//! thread; device events carry a generation stamp so anything arriving after
//! `close()` is discarded, not applied.

use std::sync::mpsc as std_mpsc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};

use clipcam_camera::{
    choose_optimal_preview_size, choose_video_size, CameraFacing, CameraId, DeviceEvent,
    DeviceGate, DiscoveredCameras, GateGuard, RecorderSink, SessionDevice, SessionDriver,
    SinkConfig, Size, SurfaceTarget, DEVICE_OPEN_TIMEOUT,
};

use crate::camera::{
    acquire_gate, invalid_state, prepare_sink, BackendEvent, BackendKind, CameraBackend,
    CaptureEnv, OpenedCamera, RecorderRequest,
};
use crate::error::{CaptureError, CaptureResult};
use crate::orientation::{OrientationState, Rotation};

/// How often the idle worker pumps device events.
const WORKER_IDLE_POLL: Duration = Duration::from_millis(25);

enum Cmd {
    Discover {
        reply: Sender<CaptureResult<DiscoveredCameras>>,
    },
    Open {
        id: String,
        rotation: Rotation,
        view_size: Size,
        reply: Sender<CaptureResult<OpenedCamera>>,
    },
    BeginPreview {
        surface: SurfaceTarget,
        reply: Sender<CaptureResult<()>>,
    },
    Configure {
        request: RecorderRequest,
        reply: Sender<CaptureResult<()>>,
    },
    Start {
        reply: Sender<CaptureResult<()>>,
    },
    Stop {
        reply: Sender<CaptureResult<()>>,
    },
    Close {
        reply: Sender<()>,
    },
    Shutdown,
}

/// Backend over the newer asynchronous device API.
pub struct SessionBackend {
    cmd_tx: Sender<Cmd>,
    event_rx: Receiver<(u64, BackendEvent)>,
    generation: u64,
    worker: Option<JoinHandle<()>>,
}

impl SessionBackend {
    /// Spawn the device worker thread. Fails only if the OS refuses the
    /// thread, in which case the selection layer falls back to legacy.
    pub fn spawn(driver: Box<dyn SessionDriver>) -> std::io::Result<Self> {
        let (cmd_tx, cmd_rx) = unbounded();
        let (event_tx, event_rx) = unbounded();
        let worker = thread::Builder::new()
            .name("camera-session".to_string())
            .spawn(move || Worker::new(driver, event_tx).run(cmd_rx))?;
        Ok(Self {
            cmd_tx,
            event_rx,
            generation: 0,
            worker: Some(worker),
        })
    }

    fn request<T>(&self, make: impl FnOnce(Sender<CaptureResult<T>>) -> Cmd) -> CaptureResult<T> {
        let (reply_tx, reply_rx) = bounded(1);
        self.cmd_tx
            .send(make(reply_tx))
            .map_err(|_| worker_gone())?;
        match reply_rx.recv_timeout(DEVICE_OPEN_TIMEOUT) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(CaptureError::MidSessionDisconnect(
                "camera worker unresponsive".into(),
            )),
            Err(RecvTimeoutError::Disconnected) => Err(worker_gone()),
        }
    }
}

fn worker_gone() -> CaptureError {
    CaptureError::MidSessionDisconnect("camera worker stopped".into())
}

impl CameraBackend for SessionBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Session
    }

    fn discover_cameras(&mut self) -> CaptureResult<DiscoveredCameras> {
        self.request(|reply| Cmd::Discover { reply })
    }

    fn open(&mut self, id: &CameraId, env: &CaptureEnv) -> CaptureResult<OpenedCamera> {
        let CameraId::Name(name) = id else {
            return Err(invalid_state("session backend expects a string camera id"));
        };
        let id = name.clone();
        let rotation = env.device_rotation;
        let view_size = env.view_size;
        self.request(move |reply| Cmd::Open {
            id,
            rotation,
            view_size,
            reply,
        })
    }

    fn begin_preview(&mut self, surface: &SurfaceTarget) -> CaptureResult<()> {
        let surface = *surface;
        self.request(move |reply| Cmd::BeginPreview { surface, reply })
    }

    fn configure_recorder(&mut self, request: &RecorderRequest) -> CaptureResult<()> {
        let request = request.clone();
        self.request(move |reply| Cmd::Configure { request, reply })
    }

    fn start_recording(&mut self) -> CaptureResult<()> {
        self.request(|reply| Cmd::Start { reply })
    }

    fn stop_recording(&mut self) -> CaptureResult<()> {
        self.request(|reply| Cmd::Stop { reply })
    }

    fn poll_event(&mut self) -> Option<BackendEvent> {
        loop {
            match self.event_rx.try_recv() {
                Ok((generation, event)) if generation == self.generation => return Some(event),
                Ok((generation, event)) => {
                    log::debug!(
                        "[CAMERA] discarded stale device event {:?} (gen {} < {})",
                        event,
                        generation,
                        self.generation
                    );
                }
                Err(_) => return None,
            }
        }
    }

    fn close(&mut self) {
        // Anything already in flight belongs to the old generation and will
        // be discarded by poll_event.
        self.generation += 1;
        let (reply_tx, reply_rx) = bounded(1);
        if self.cmd_tx.send(Cmd::Close { reply: reply_tx }).is_ok() {
            let _ = reply_rx.recv_timeout(DEVICE_OPEN_TIMEOUT);
        }
    }
}

impl Drop for SessionBackend {
    fn drop(&mut self) {
        self.close();
        let _ = self.cmd_tx.send(Cmd::Shutdown);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

// ============================================================================
// Worker
// ============================================================================

struct Worker {
    driver: Box<dyn SessionDriver>,
    gate: std::sync::Arc<DeviceGate>,
    event_tx: Sender<(u64, BackendEvent)>,
    generation: u64,
    slot: Option<WorkerSlot>,
    sink: Option<Box<dyn RecorderSink>>,
    recording: bool,
    preview_surface: Option<SurfaceTarget>,
}

/// One open device and its open-time facts. The device closes before the
/// gate slot frees (field order).
struct WorkerSlot {
    device: Box<dyn SessionDevice>,
    _guard: GateGuard,
    device_events: std_mpsc::Receiver<DeviceEvent>,
    video_size: Size,
    orientation: OrientationState,
}

impl Worker {
    fn new(driver: Box<dyn SessionDriver>, event_tx: Sender<(u64, BackendEvent)>) -> Self {
        Self {
            driver,
            gate: DeviceGate::new(),
            event_tx,
            generation: 0,
            slot: None,
            sink: None,
            recording: false,
            preview_surface: None,
        }
    }

    fn run(mut self, cmd_rx: Receiver<Cmd>) {
        loop {
            match cmd_rx.recv_timeout(WORKER_IDLE_POLL) {
                Ok(Cmd::Shutdown) | Err(RecvTimeoutError::Disconnected) => {
                    self.release_all();
                    break;
                }
                Ok(cmd) => {
                    self.handle(cmd);
                    self.pump_device_events();
                }
                Err(RecvTimeoutError::Timeout) => self.pump_device_events(),
            }
        }
        log::debug!("[CAMERA] session worker stopped");
    }

    fn handle(&mut self, cmd: Cmd) {
        match cmd {
            Cmd::Discover { reply } => {
                let _ = reply.send(self.discover());
            }
            Cmd::Open {
                id,
                rotation,
                view_size,
                reply,
            } => {
                let _ = reply.send(self.open(&id, rotation, view_size));
            }
            Cmd::BeginPreview { surface, reply } => {
                let _ = reply.send(self.begin_preview(surface));
            }
            Cmd::Configure { request, reply } => {
                let _ = reply.send(self.configure(&request));
            }
            Cmd::Start { reply } => {
                let _ = reply.send(self.start());
            }
            Cmd::Stop { reply } => {
                self.release_sink();
                let _ = reply.send(Ok(()));
            }
            Cmd::Close { reply } => {
                self.release_all();
                self.generation += 1;
                let _ = reply.send(());
            }
            Cmd::Shutdown => unreachable!("handled by the run loop"),
        }
    }

    fn discover(&mut self) -> CaptureResult<DiscoveredCameras> {
        let mut found = DiscoveredCameras::default();
        for id in self.driver.camera_ids()? {
            if found.is_complete() {
                break;
            }
            let characteristics = self.driver.characteristics(&id)?;
            match characteristics.facing {
                CameraFacing::Front if found.front.is_none() => {
                    found.front = Some(CameraId::Name(id));
                }
                CameraFacing::Back if found.back.is_none() => {
                    found.back = Some(CameraId::Name(id));
                }
                _ => {}
            }
        }
        log::debug!(
            "[CAMERA] session discovery: front={:?} back={:?}",
            found.front,
            found.back
        );
        Ok(found)
    }

    fn open(&mut self, id: &str, rotation: Rotation, view_size: Size) -> CaptureResult<OpenedCamera> {
        // Fully close any prior handle before taking a new one.
        self.release_all();

        let guard = acquire_gate(&self.gate)?;
        let characteristics = self.driver.characteristics(id)?;

        let video_size = choose_video_size(&characteristics.video_sizes)
            .ok_or_else(|| CaptureError::ConfigurationFailed("device reports no sizes".into()))?;
        let preview_size =
            choose_optimal_preview_size(&characteristics.preview_sizes, view_size, video_size)
                .ok_or_else(|| {
                    CaptureError::ConfigurationFailed("device reports no sizes".into())
                })?;

        let (device_tx, device_rx) = std_mpsc::channel();
        let device = self.driver.open(id, device_tx)?;

        let orientation = OrientationState::derive(
            characteristics.sensor_orientation,
            rotation,
            characteristics.facing == CameraFacing::Front,
        );

        log::debug!(
            "[CAMERA] session open {}: video={} preview={} display={}°",
            id,
            video_size,
            preview_size,
            orientation.display_degrees
        );

        self.slot = Some(WorkerSlot {
            device,
            _guard: guard,
            device_events: device_rx,
            video_size,
            orientation,
        });

        Ok(OpenedCamera {
            video_size,
            preview_size,
            orientation,
        })
    }

    fn begin_preview(&mut self, surface: SurfaceTarget) -> CaptureResult<()> {
        let slot = self
            .slot
            .as_mut()
            .ok_or_else(|| invalid_state("preview requested with no open camera"))?;
        slot.device.create_capture_session(&[surface])?;
        self.preview_surface = Some(surface);
        Ok(())
    }

    fn configure(&mut self, request: &RecorderRequest) -> CaptureResult<()> {
        let preview = self
            .preview_surface
            .ok_or_else(|| invalid_state("recorder requested before preview"))?;
        let slot = self
            .slot
            .as_mut()
            .ok_or_else(|| invalid_state("recorder requested with no open camera"))?;

        let mut sink = self.driver.create_sink();
        let config = SinkConfig::new(
            request.output.clone(),
            slot.video_size,
            slot.orientation.display_degrees,
            request.audio_enabled,
        );
        prepare_sink(sink.as_mut(), config)?;

        // Rebuild the capture session to also target the recorder surface.
        let mut targets = vec![preview];
        if let Some(surface) = sink.surface() {
            targets.push(surface);
        }
        slot.device.create_capture_session(&targets)?;

        self.sink = Some(sink);
        Ok(())
    }

    fn start(&mut self) -> CaptureResult<()> {
        let sink = self
            .sink
            .as_mut()
            .ok_or_else(|| invalid_state("recording started with no prepared recorder"))?;
        sink.start()?;
        self.recording = true;
        Ok(())
    }

    fn release_sink(&mut self) {
        if let Some(mut sink) = self.sink.take() {
            if self.recording {
                if let Err(e) = sink.stop() {
                    log::debug!("[CAMERA] session sink stop swallowed: {}", e);
                }
            }
        }
        self.recording = false;
    }

    fn release_all(&mut self) {
        self.release_sink();
        if let Some(mut slot) = self.slot.take() {
            slot.device.close();
            log::debug!("[CAMERA] session device released");
        }
        self.preview_surface = None;
    }

    /// Forward pending device events to the control thread. Either event is
    /// fatal: all handles are released so recording can never stay "on"
    /// after the device reports a failure.
    fn pump_device_events(&mut self) {
        let mut pending = Vec::new();
        if let Some(slot) = self.slot.as_ref() {
            while let Ok(event) = slot.device_events.try_recv() {
                pending.push(event);
            }
        }
        if pending.is_empty() {
            return;
        }
        for event in pending {
            let translated = match event {
                DeviceEvent::Disconnected => BackendEvent::Disconnected,
                DeviceEvent::Fault(message) => BackendEvent::Fault(message),
            };
            let _ = self.event_tx.send((self.generation, translated));
        }
        self.release_all();
    }
}

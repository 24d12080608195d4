//! Scriptable fake drivers for backend and session tests.

use std::sync::mpsc as std_mpsc;
use std::sync::Arc;

use parking_lot::Mutex;

use clipcam_camera::{
    CameraFacing, DeviceEvent, DriverError, LegacyCameraInfo, LegacyDevice, LegacyDriver,
    QualityProfile, RecorderSink, SessionCharacteristics, SessionDevice, SessionDriver,
    SinkConfig, Size, SurfaceTarget,
};

fn stock_sizes() -> Vec<Size> {
    vec![
        Size::new(320, 240),
        Size::new(1920, 1080),
        Size::new(640, 480),
        Size::new(800, 600),
        Size::new(1600, 1200),
        Size::new(1280, 720),
    ]
}

// ============================================================================
// Recorder Sink
// ============================================================================

#[derive(Debug, Default)]
pub(crate) struct SinkLog {
    pub configs: Vec<SinkConfig>,
    pub starts: u32,
    pub stops: u32,
}

pub(crate) struct FakeSink {
    log: Arc<Mutex<SinkLog>>,
    fail_profiles: Vec<QualityProfile>,
    current: Option<SinkConfig>,
    started: bool,
}

impl RecorderSink for FakeSink {
    fn configure(&mut self, config: &SinkConfig) -> Result<(), DriverError> {
        self.log.lock().configs.push(config.clone());
        self.current = Some(config.clone());
        Ok(())
    }

    fn prepare(&mut self) -> Result<(), DriverError> {
        let config = self
            .current
            .as_ref()
            .ok_or_else(|| DriverError::SinkRejected("prepare before configure".into()))?;
        if self.fail_profiles.contains(&config.profile) {
            return Err(DriverError::SinkRejected(format!(
                "profile {:?} rejected",
                config.profile
            )));
        }
        Ok(())
    }

    fn start(&mut self) -> Result<(), DriverError> {
        self.log.lock().starts += 1;
        self.started = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), DriverError> {
        if !self.started {
            return Err(DriverError::Io("stop before start".into()));
        }
        self.started = false;
        self.log.lock().stops += 1;
        Ok(())
    }

    fn surface(&self) -> Option<SurfaceTarget> {
        Some(SurfaceTarget::new(0xFEED))
    }
}

// ============================================================================
// Legacy Driver
// ============================================================================

#[derive(Debug, Default)]
pub(crate) struct LegacyDeviceLog {
    pub preview_sizes: Vec<Size>,
    pub display_orientations: Vec<u16>,
    pub preview_targets: Vec<SurfaceTarget>,
    pub unlocks: u32,
    pub locks: u32,
}

pub(crate) struct FakeLegacyDriver {
    cameras: Vec<LegacyCameraInfo>,
    sizes: Vec<Size>,
    fail_profiles: Vec<QualityProfile>,
    sink_log: Arc<Mutex<SinkLog>>,
    device_log: Arc<Mutex<LegacyDeviceLog>>,
}

impl FakeLegacyDriver {
    pub fn with_cameras() -> Self {
        Self::new(vec![
            LegacyCameraInfo {
                facing: CameraFacing::Back,
                sensor_orientation: 90,
            },
            LegacyCameraInfo {
                facing: CameraFacing::Front,
                sensor_orientation: 270,
            },
        ])
    }

    pub fn back_only() -> Self {
        Self::new(vec![LegacyCameraInfo {
            facing: CameraFacing::Back,
            sensor_orientation: 90,
        }])
    }

    pub fn front_only() -> Self {
        Self::new(vec![LegacyCameraInfo {
            facing: CameraFacing::Front,
            sensor_orientation: 270,
        }])
    }

    pub fn none() -> Self {
        Self::new(Vec::new())
    }

    fn new(cameras: Vec<LegacyCameraInfo>) -> Self {
        Self {
            cameras,
            sizes: stock_sizes(),
            fail_profiles: Vec::new(),
            sink_log: Arc::new(Mutex::new(SinkLog::default())),
            device_log: Arc::new(Mutex::new(LegacyDeviceLog::default())),
        }
    }

    pub fn failing_profiles(mut self, profiles: &[QualityProfile]) -> Self {
        self.fail_profiles = profiles.to_vec();
        self
    }

    pub fn sink_log(&self) -> Arc<Mutex<SinkLog>> {
        Arc::clone(&self.sink_log)
    }

    #[allow(dead_code)]
    pub fn device_log(&self) -> Arc<Mutex<LegacyDeviceLog>> {
        Arc::clone(&self.device_log)
    }
}

impl LegacyDriver for FakeLegacyDriver {
    fn camera_count(&self) -> i32 {
        self.cameras.len() as i32
    }

    fn camera_info(&self, index: i32) -> Result<LegacyCameraInfo, DriverError> {
        self.cameras
            .get(index as usize)
            .copied()
            .ok_or_else(|| DriverError::NoSuchCamera(format!("#{}", index)))
    }

    fn open(&mut self, index: i32) -> Result<Box<dyn LegacyDevice>, DriverError> {
        self.camera_info(index)?;
        Ok(Box::new(FakeLegacyDevice {
            sizes: self.sizes.clone(),
            log: Arc::clone(&self.device_log),
        }))
    }

    fn create_sink(&mut self) -> Box<dyn RecorderSink> {
        Box::new(FakeSink {
            log: Arc::clone(&self.sink_log),
            fail_profiles: self.fail_profiles.clone(),
            current: None,
            started: false,
        })
    }
}

struct FakeLegacyDevice {
    sizes: Vec<Size>,
    log: Arc<Mutex<LegacyDeviceLog>>,
}

impl LegacyDevice for FakeLegacyDevice {
    fn supported_preview_sizes(&self) -> Vec<Size> {
        self.sizes.clone()
    }

    fn set_preview_size(&mut self, size: Size) -> Result<(), DriverError> {
        self.log.lock().preview_sizes.push(size);
        Ok(())
    }

    fn set_display_orientation(&mut self, degrees: u16) -> Result<(), DriverError> {
        self.log.lock().display_orientations.push(degrees);
        Ok(())
    }

    fn set_preview_target(&mut self, target: &SurfaceTarget) -> Result<(), DriverError> {
        self.log.lock().preview_targets.push(*target);
        Ok(())
    }

    fn unlock(&mut self) {
        self.log.lock().unlocks += 1;
    }

    fn lock(&mut self) {
        self.log.lock().locks += 1;
    }
}

// ============================================================================
// Session Driver
// ============================================================================

pub(crate) struct FakeSessionDriver {
    supported: bool,
    cameras: Vec<(String, SessionCharacteristics)>,
    fail_profiles: Vec<QualityProfile>,
    sink_log: Arc<Mutex<SinkLog>>,
    session_log: Arc<Mutex<Vec<Vec<SurfaceTarget>>>>,
    event_taps: Arc<Mutex<Vec<std_mpsc::Sender<DeviceEvent>>>>,
}

impl FakeSessionDriver {
    pub fn with_cameras() -> Self {
        Self::new(
            true,
            vec![
                (
                    "0".to_string(),
                    SessionCharacteristics {
                        facing: CameraFacing::Back,
                        sensor_orientation: 90,
                        video_sizes: stock_sizes(),
                        preview_sizes: stock_sizes(),
                    },
                ),
                (
                    "1".to_string(),
                    SessionCharacteristics {
                        facing: CameraFacing::Front,
                        sensor_orientation: 270,
                        video_sizes: stock_sizes(),
                        preview_sizes: stock_sizes(),
                    },
                ),
            ],
        )
    }

    pub fn unsupported() -> Self {
        Self::new(false, Vec::new())
    }

    fn new(supported: bool, cameras: Vec<(String, SessionCharacteristics)>) -> Self {
        Self {
            supported,
            cameras,
            fail_profiles: Vec::new(),
            sink_log: Arc::new(Mutex::new(SinkLog::default())),
            session_log: Arc::new(Mutex::new(Vec::new())),
            event_taps: Arc::new(Mutex::new(Vec::new())),
        }
    }

    #[allow(dead_code)]
    pub fn failing_profiles(mut self, profiles: &[QualityProfile]) -> Self {
        self.fail_profiles = profiles.to_vec();
        self
    }

    pub fn sink_log(&self) -> Arc<Mutex<SinkLog>> {
        Arc::clone(&self.sink_log)
    }

    pub fn session_log(&self) -> Arc<Mutex<Vec<Vec<SurfaceTarget>>>> {
        Arc::clone(&self.session_log)
    }

    /// Senders handed to opened devices, so tests can inject device events.
    pub fn event_taps(&self) -> Arc<Mutex<Vec<std_mpsc::Sender<DeviceEvent>>>> {
        Arc::clone(&self.event_taps)
    }
}

impl SessionDriver for FakeSessionDriver {
    fn is_supported(&self) -> bool {
        self.supported
    }

    fn camera_ids(&self) -> Result<Vec<String>, DriverError> {
        Ok(self.cameras.iter().map(|(id, _)| id.clone()).collect())
    }

    fn characteristics(&self, id: &str) -> Result<SessionCharacteristics, DriverError> {
        self.cameras
            .iter()
            .find(|(candidate, _)| candidate == id)
            .map(|(_, characteristics)| characteristics.clone())
            .ok_or_else(|| DriverError::NoSuchCamera(id.to_string()))
    }

    fn open(
        &mut self,
        id: &str,
        events: std_mpsc::Sender<DeviceEvent>,
    ) -> Result<Box<dyn SessionDevice>, DriverError> {
        self.characteristics(id)?;
        self.event_taps.lock().push(events);
        Ok(Box::new(FakeSessionDevice {
            log: Arc::clone(&self.session_log),
        }))
    }

    fn create_sink(&mut self) -> Box<dyn RecorderSink> {
        Box::new(FakeSink {
            log: Arc::clone(&self.sink_log),
            fail_profiles: self.fail_profiles.clone(),
            current: None,
            started: false,
        })
    }
}

struct FakeSessionDevice {
    log: Arc<Mutex<Vec<Vec<SurfaceTarget>>>>,
}

impl SessionDevice for FakeSessionDevice {
    fn create_capture_session(&mut self, targets: &[SurfaceTarget]) -> Result<(), DriverError> {
        self.log.lock().push(targets.to_vec());
        Ok(())
    }

    fn close(&mut self) {}
}

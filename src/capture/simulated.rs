//! Simulated camera device
//!
//! A file-writing stand-in for a real camera. It honours the device contract,
//! reports a realistic settings snapshot and can be told to fail or to stall,
//! which makes it the workhorse for the CLI demo and for controller tests.

use crate::recorder::channel::{CameraDevice, ConfigMap, DeviceError, DeviceResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Injected behaviour for a simulated camera
#[derive(Debug, Clone, Default)]
pub struct SimulatedBehavior {
    /// Error message returned by `start_recording`
    pub fail_start: Option<String>,

    /// Error message returned by `stop_recording`
    pub fail_stop: Option<String>,

    /// Delay before `start_recording` returns
    pub start_latency: Duration,

    /// Delay before `stop_recording` returns
    pub stop_latency: Duration,

    /// Skip writing the media file
    pub dry_run: bool,
}

/// Calls observed by a simulated camera
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    pub start_calls: usize,
    pub stop_calls: usize,
    pub snapshot_calls: usize,
    pub started_paths: Vec<PathBuf>,
    pub start_entered_at: Vec<Instant>,
}

/// Shared view of a camera's call log, usable after the camera was moved
#[derive(Debug, Clone, Default)]
pub struct CameraStats(Arc<Mutex<CallLog>>);

impl CameraStats {
    pub fn snapshot(&self) -> CallLog {
        self.0.lock().clone()
    }

    pub fn start_calls(&self) -> usize {
        self.0.lock().start_calls
    }

    pub fn stop_calls(&self) -> usize {
        self.0.lock().stop_calls
    }
}

/// Camera that writes a placeholder media file
pub struct SimulatedCamera {
    id: String,
    name: String,
    settings: ConfigMap,
    behavior: SimulatedBehavior,
    recording: Option<(PathBuf, Instant)>,
    stats: CameraStats,
}

impl SimulatedCamera {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            settings: default_settings(),
            behavior: SimulatedBehavior::default(),
            recording: None,
            stats: CameraStats::default(),
        }
    }

    pub fn with_behavior(mut self, behavior: SimulatedBehavior) -> Self {
        self.behavior = behavior;
        self
    }

    /// Handle on the call log
    pub fn stats(&self) -> CameraStats {
        self.stats.clone()
    }

    /// Change a control value, as a live adjustment would
    #[cfg(test)]
    pub fn set_control(&mut self, key: &str, value: serde_json::Value) {
        self.settings.insert(key.to_string(), value);
    }

    #[cfg(test)]
    pub fn is_recording(&self) -> bool {
        self.recording.is_some()
    }
}

/// Controls reported by a freshly configured sensor
fn default_settings() -> ConfigMap {
    let mut settings = ConfigMap::new();
    settings.insert("FrameDurationLimits".into(), json!([33333, 33333]));
    settings.insert("ExposureTime".into(), json!(10000));
    settings.insert("AnalogueGain".into(), json!(1.0));
    settings.insert("LensPosition".into(), json!(1.0));
    settings.insert("Brightness".into(), json!(0.0));
    settings.insert("Saturation".into(), json!(1.0));
    settings.insert("Contrast".into(), json!(1.0));
    settings.insert("Sharpness".into(), json!(1.0));
    settings.insert("Resolution".into(), json!([1920, 1080]));
    settings.insert("Format".into(), json!("YUV420"));
    settings
}

#[async_trait]
impl CameraDevice for SimulatedCamera {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn start_recording(&mut self, output_path: &Path) -> DeviceResult<()> {
        {
            let mut log = self.stats.0.lock();
            log.start_calls += 1;
            log.started_paths.push(output_path.to_path_buf());
            log.start_entered_at.push(Instant::now());
        }

        if !self.behavior.start_latency.is_zero() {
            tokio::time::sleep(self.behavior.start_latency).await;
        }
        if let Some(message) = &self.behavior.fail_start {
            return Err(DeviceError::CaptureError(message.clone()));
        }
        if self.recording.is_some() {
            return Err(DeviceError::AlreadyRecording);
        }

        if !self.behavior.dry_run {
            let mut file = std::fs::File::create(output_path)?;
            writeln!(file, "simulated recording from {} ({})", self.name, self.id)?;
        }

        tracing::debug!("Simulated camera {} recording to {:?}", self.id, output_path);
        self.recording = Some((output_path.to_path_buf(), Instant::now()));
        Ok(())
    }

    async fn stop_recording(&mut self) -> DeviceResult<()> {
        self.stats.0.lock().stop_calls += 1;

        if !self.behavior.stop_latency.is_zero() {
            tokio::time::sleep(self.behavior.stop_latency).await;
        }
        if let Some(message) = &self.behavior.fail_stop {
            return Err(DeviceError::CaptureError(message.clone()));
        }

        let (path, started) = self.recording.take().ok_or(DeviceError::NotRecording)?;
        if !self.behavior.dry_run {
            let mut file = std::fs::OpenOptions::new().append(true).open(&path)?;
            writeln!(file, "recorded for {} ms", started.elapsed().as_millis())?;
        }

        tracing::debug!("Simulated camera {} stopped", self.id);
        Ok(())
    }

    fn snapshot_config(&self) -> ConfigMap {
        self.stats.0.lock().snapshot_calls += 1;
        self.settings.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_start_stop_writes_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("run_camera_1.h264");
        let mut camera = SimulatedCamera::new("cam0", "LightRoom");
        let stats = camera.stats();

        camera.start_recording(&path).await.unwrap();
        assert!(camera.is_recording());
        camera.stop_recording().await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("simulated recording from LightRoom"));
        assert_eq!(stats.start_calls(), 1);
        assert_eq!(stats.stop_calls(), 1);
    }

    #[tokio::test]
    async fn test_injected_start_failure() {
        let dir = tempdir().unwrap();
        let mut camera = SimulatedCamera::new("cam1", "DarkRoom").with_behavior(SimulatedBehavior {
            fail_start: Some("sensor not responding".to_string()),
            ..Default::default()
        });

        let err = camera
            .start_recording(&dir.path().join("x.h264"))
            .await
            .unwrap_err();
        assert_eq!(err, DeviceError::CaptureError("sensor not responding".to_string()));
        assert!(!camera.is_recording());
        assert!(!dir.path().join("x.h264").exists());
    }

    #[tokio::test]
    async fn test_stop_without_start() {
        let mut camera = SimulatedCamera::new("cam0", "LightRoom");
        assert_eq!(camera.stop_recording().await, Err(DeviceError::NotRecording));
    }

    #[test]
    fn test_snapshot_reflects_live_changes() {
        let mut camera = SimulatedCamera::new("cam0", "LightRoom");
        assert_eq!(camera.snapshot_config()["ExposureTime"], json!(10000));
        camera.set_control("ExposureTime", json!(20000));
        assert_eq!(camera.snapshot_config()["ExposureTime"], json!(20000));
        assert_eq!(camera.stats().snapshot().snapshot_calls, 2);
    }
}

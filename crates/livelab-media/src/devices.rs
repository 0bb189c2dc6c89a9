//! Capture device acquisition
//!
//! Opening a device is the one operation that may wait on the user or the OS
//! (permission prompts), so it is async. Platform backends implement
//! [`MediaDevices`]; [`TestPatternDevices`] generates synthetic input.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{MissedTickBehavior, interval};

use crate::audio::{AudioPacket, FRAME_DURATION, MicrophoneSource, OPUS_SILENCE};
use crate::error::{MediaError, Result};
use crate::frame::{Rect, Rgba, VideoFrame};
use crate::source::{SourceHandle, SourceKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    Camera,
    Screen,
    Microphone,
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceKind::Camera => write!(f, "camera"),
            DeviceKind::Screen => write!(f, "screen capture"),
            DeviceKind::Microphone => write!(f, "microphone"),
        }
    }
}

impl From<SourceKind> for DeviceKind {
    fn from(kind: SourceKind) -> Self {
        match kind {
            SourceKind::Camera => DeviceKind::Camera,
            SourceKind::Screen => DeviceKind::Screen,
        }
    }
}

#[async_trait]
pub trait MediaDevices: Send + Sync {
    async fn open_camera(&self) -> Result<SourceHandle>;
    async fn open_screen(&self) -> Result<SourceHandle>;
    async fn open_microphone(&self) -> Result<MicrophoneSource>;
}

/// Synthetic devices: moving colour bars for video, silence for audio
#[derive(Debug, Clone)]
pub struct TestPatternDevices {
    camera_size: (u32, u32),
    screen_size: (u32, u32),
    fps: u32,
    denied: HashSet<DeviceKind>,
}

impl Default for TestPatternDevices {
    fn default() -> Self {
        Self {
            camera_size: (640, 480),
            screen_size: (1920, 1080),
            fps: 30,
            denied: HashSet::new(),
        }
    }
}

impl TestPatternDevices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sizes(mut self, camera: (u32, u32), screen: (u32, u32)) -> Self {
        self.camera_size = camera;
        self.screen_size = screen;
        self
    }

    /// Make opening `device` fail as if the user refused the prompt
    pub fn deny(mut self, device: DeviceKind) -> Self {
        self.denied.insert(device);
        self
    }

    fn check(&self, device: DeviceKind) -> Result<()> {
        if self.denied.contains(&device) {
            Err(MediaError::PermissionDenied { device })
        } else {
            Ok(())
        }
    }

    fn spawn_video(&self, kind: SourceKind, (width, height): (u32, u32), base: Rgba) -> SourceHandle {
        let handle = SourceHandle::new(kind);
        // first frame is available immediately
        handle.push_frame(pattern(width, height, base, 0));

        let producer = handle.clone();
        let period = Duration::from_secs_f64(1.0 / self.fps.max(1) as f64);
        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut step = 0u32;
            while !producer.is_ended() {
                ticker.tick().await;
                step = step.wrapping_add(1);
                producer.push_frame(pattern(width, height, base, step));
            }
            tracing::debug!("Test pattern {} stopped", kind);
        });
        handle
    }
}

#[async_trait]
impl MediaDevices for TestPatternDevices {
    async fn open_camera(&self) -> Result<SourceHandle> {
        self.check(DeviceKind::Camera)?;
        Ok(self.spawn_video(SourceKind::Camera, self.camera_size, Rgba::new(200, 60, 60)))
    }

    async fn open_screen(&self) -> Result<SourceHandle> {
        self.check(DeviceKind::Screen)?;
        Ok(self.spawn_video(SourceKind::Screen, self.screen_size, Rgba::new(40, 80, 200)))
    }

    async fn open_microphone(&self) -> Result<MicrophoneSource> {
        self.check(DeviceKind::Microphone)?;
        let (tx, rx) = mpsc::channel(64);
        let (source, stopped) = MicrophoneSource::new(rx);

        tokio::spawn(async move {
            let mut ticker = interval(FRAME_DURATION);
            while !stopped.load(Ordering::Acquire) {
                ticker.tick().await;
                let packet = AudioPacket {
                    data: Bytes::from_static(&OPUS_SILENCE),
                    duration: FRAME_DURATION,
                };
                if tx.send(packet).await.is_err() {
                    break;
                }
            }
        });
        Ok(source)
    }
}

/// Solid frame with a white bar sweeping across it
fn pattern(width: u32, height: u32, base: Rgba, step: u32) -> VideoFrame {
    let mut frame = VideoFrame::filled(width, height, base);
    let bar = (width / 16).max(1);
    let x = (step.wrapping_mul(bar)) % width.max(1);
    frame.fill_rect(Rect::new(x, 0, bar, height), Rgba::WHITE);
    frame
}

//! Fixed-rate compositor
//!
//! Merges the camera and screen-share sources into one canvas of constant
//! size. The loop reads sources and the PIP position afresh on every tick, so
//! toggling a source or dragging the overlay never restarts it.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};

use crate::frame::{Rect, Rgba, VideoFrame};
use crate::layout::{Layout, compute_layout, pip_size, pointer_to_percent};
use crate::pip::PipPosition;
use crate::source::{SourceHandle, SourceKind, SourceSlots};

#[derive(Debug, Clone, PartialEq)]
pub struct CompositorConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// PIP width as a fraction of the canvas width
    pub pip_scale: f32,
    pub padding: u32,
    pub border: u32,
    pub border_color: Rgba,
    pub background: Rgba,
}

impl Default for CompositorConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            fps: 30,
            pip_scale: 0.25,
            padding: 20,
            border: 4,
            border_color: Rgba::WHITE,
            background: Rgba::BLACK,
        }
    }
}

impl CompositorConfig {
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.fps.max(1) as f64)
    }
}

/// One rendered canvas
#[derive(Debug, Clone)]
pub struct OutputFrame {
    pub sequence: u64,
    pub frame: Arc<VideoFrame>,
}

struct Running {
    stop: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

struct Shared {
    config: CompositorConfig,
    sources: SourceSlots,
    pip: PipPosition,
    sequence: AtomicU64,
    output: watch::Sender<OutputFrame>,
}

impl Shared {
    fn tick(&self) {
        let frame = render_frame(&self.config, &self.sources, &self.pip);
        let sequence = self.sequence.fetch_add(1, Ordering::AcqRel) + 1;
        self.output.send_replace(OutputFrame {
            sequence,
            frame: Arc::new(frame),
        });
    }
}

pub struct Compositor {
    shared: Arc<Shared>,
    running: Mutex<Option<Running>>,
}

impl Compositor {
    pub fn new(config: CompositorConfig) -> Self {
        let blank = VideoFrame::filled(config.width, config.height, config.background);
        let (output, _) = watch::channel(OutputFrame {
            sequence: 0,
            frame: Arc::new(blank),
        });

        Self {
            shared: Arc::new(Shared {
                config,
                sources: SourceSlots::new(),
                pip: PipPosition::new(),
                sequence: AtomicU64::new(0),
                output,
            }),
            running: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &CompositorConfig {
        &self.shared.config
    }

    /// Shared PIP cell; writes are seen by the next tick
    pub fn pip(&self) -> PipPosition {
        self.shared.pip.clone()
    }

    pub fn set_source(&self, kind: SourceKind, source: Option<SourceHandle>) -> Option<SourceHandle> {
        tracing::debug!("Compositor {} source {}", kind, if source.is_some() { "attached" } else { "detached" });
        self.shared.sources.set(kind, source)
    }

    pub fn source(&self, kind: SourceKind) -> Option<SourceHandle> {
        self.shared.sources.get(kind)
    }

    /// Move the PIP so its centre follows a pointer in canvas pixels
    pub fn drag_pip(&self, pointer_x: f32, pointer_y: f32) {
        let config = &self.shared.config;
        let camera = self
            .shared
            .sources
            .active_frame(SourceKind::Camera)
            .map(|f| (f.width, f.height))
            .unwrap_or((config.width, config.height));
        let (w, h) = pip_size(config, camera.0, camera.1);
        let (x, y) = pointer_to_percent(config, w, h, pointer_x, pointer_y);
        self.shared.pip.set(x, y);
    }

    pub fn subscribe(&self) -> watch::Receiver<OutputFrame> {
        self.shared.output.subscribe()
    }

    /// Render one frame now without publishing it
    pub fn render_now(&self) -> VideoFrame {
        render_frame(&self.shared.config, &self.shared.sources, &self.shared.pip)
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|r| !r.task.is_finished())
            .unwrap_or(false)
    }

    /// Start the render loop; no-op if it is already running
    pub fn start(&self) -> bool {
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(r) = running.as_ref() {
            if !r.task.is_finished() {
                return false;
            }
        }

        let stop = Arc::new(AtomicBool::new(false));
        let shared = self.shared.clone();
        let stop_flag = stop.clone();
        let period = shared.config.frame_interval();

        let task = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if stop_flag.load(Ordering::Acquire) {
                    break;
                }
                shared.tick();
            }
            tracing::debug!("Compositor loop exited");
        });

        tracing::info!(
            "Compositor started at {}x{} {} fps",
            self.shared.config.width,
            self.shared.config.height,
            self.shared.config.fps
        );
        *running = Some(Running { stop, task });
        true
    }

    pub fn stop(&self) {
        if let Some(r) = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            r.stop.store(true, Ordering::Release);
            r.task.abort();
            tracing::info!("Compositor stopped");
        }
    }
}

impl Drop for Compositor {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Draw one canvas from whatever sources are active right now
pub fn render_frame(config: &CompositorConfig, sources: &SourceSlots, pip: &PipPosition) -> VideoFrame {
    let mut canvas = VideoFrame::filled(config.width, config.height, config.background);
    let full = Rect::new(0, 0, config.width, config.height);

    let screen = sources.active_frame(SourceKind::Screen);
    let camera = sources.active_frame(SourceKind::Camera);
    let layout = compute_layout(
        config,
        screen.is_some(),
        camera.as_ref().map(|f| (f.width, f.height)),
        pip.get(),
    );

    match (layout, screen, camera) {
        (Layout::ScreenWithPip { pip }, Some(screen), Some(camera)) => {
            canvas.blit_scaled(&screen, full);
            canvas.blit_scaled(&camera, pip);
            canvas.stroke_rect(pip, config.border, config.border_color);
        }
        (Layout::ScreenOnly, Some(screen), _) => canvas.blit_scaled(&screen, full),
        (Layout::CameraOnly, _, Some(camera)) => canvas.blit_scaled(&camera, full),
        _ => {}
    }
    canvas
}

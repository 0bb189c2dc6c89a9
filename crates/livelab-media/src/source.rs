//! Live video sources (camera, screen share)
//!
//! A `SourceHandle` is written by the capture side and read by the compositor.
//! Only the newest frame is kept.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::frame::VideoFrame;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    Camera,
    Screen,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Camera => write!(f, "camera"),
            SourceKind::Screen => write!(f, "screen"),
        }
    }
}

struct SourceInner {
    kind: SourceKind,
    latest: Mutex<Option<Arc<VideoFrame>>>,
    paused: AtomicBool,
    ended: AtomicBool,
}

#[derive(Clone)]
pub struct SourceHandle {
    inner: Arc<SourceInner>,
}

impl SourceHandle {
    pub fn new(kind: SourceKind) -> Self {
        Self {
            inner: Arc::new(SourceInner {
                kind,
                latest: Mutex::new(None),
                paused: AtomicBool::new(false),
                ended: AtomicBool::new(false),
            }),
        }
    }

    pub fn kind(&self) -> SourceKind {
        self.inner.kind
    }

    /// Publish a captured frame; invalid frames are dropped
    pub fn push_frame(&self, frame: VideoFrame) -> bool {
        if !frame.is_valid() {
            tracing::warn!(
                "Discarding invalid {} frame {}x{} ({} bytes)",
                self.inner.kind,
                frame.width,
                frame.height,
                frame.data.len()
            );
            return false;
        }
        if self.is_ended() {
            return false;
        }
        *self
            .inner
            .latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(frame));
        true
    }

    pub fn latest_frame(&self) -> Option<Arc<VideoFrame>> {
        self.inner
            .latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_paused(&self, paused: bool) {
        self.inner.paused.store(paused, Ordering::Release);
    }

    pub fn is_paused(&self) -> bool {
        self.inner.paused.load(Ordering::Acquire)
    }

    /// Mark the source finished, as when the user stops sharing
    pub fn end(&self) {
        self.inner.ended.store(true, Ordering::Release);
    }

    pub fn is_ended(&self) -> bool {
        self.inner.ended.load(Ordering::Acquire)
    }

    /// Present, not paused, not ended and has produced a frame
    pub fn active_frame(&self) -> Option<Arc<VideoFrame>> {
        if self.is_paused() || self.is_ended() {
            return None;
        }
        self.latest_frame()
    }

    pub fn is_active(&self) -> bool {
        self.active_frame().is_some()
    }
}

impl fmt::Debug for SourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceHandle")
            .field("kind", &self.inner.kind)
            .field("paused", &self.is_paused())
            .field("ended", &self.is_ended())
            .finish()
    }
}

/// The compositor's two optional inputs, swappable while it runs
#[derive(Debug, Default)]
pub struct SourceSlots {
    camera: Mutex<Option<SourceHandle>>,
    screen: Mutex<Option<SourceHandle>>,
}

impl SourceSlots {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, kind: SourceKind) -> &Mutex<Option<SourceHandle>> {
        match kind {
            SourceKind::Camera => &self.camera,
            SourceKind::Screen => &self.screen,
        }
    }

    /// Install or clear a source; returns the previous one
    pub fn set(&self, kind: SourceKind, source: Option<SourceHandle>) -> Option<SourceHandle> {
        std::mem::replace(
            &mut *self
                .slot(kind)
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
            source,
        )
    }

    pub fn get(&self, kind: SourceKind) -> Option<SourceHandle> {
        self.slot(kind)
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn active_frame(&self, kind: SourceKind) -> Option<Arc<VideoFrame>> {
        self.get(kind).and_then(|s| s.active_frame())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Rgba;

    #[test]
    fn test_inactive_until_first_frame() {
        let camera = SourceHandle::new(SourceKind::Camera);
        assert!(!camera.is_active());

        assert!(!camera.push_frame(VideoFrame {
            width: 2,
            height: 2,
            data: vec![0; 3],
        }));
        assert!(!camera.is_active());

        assert!(camera.push_frame(VideoFrame::filled(2, 2, Rgba::WHITE)));
        assert!(camera.is_active());
    }

    #[test]
    fn test_paused_and_ended_are_inactive() {
        let screen = SourceHandle::new(SourceKind::Screen);
        screen.push_frame(VideoFrame::filled(2, 2, Rgba::WHITE));

        screen.set_paused(true);
        assert!(!screen.is_active());
        screen.set_paused(false);
        assert!(screen.is_active());

        screen.end();
        assert!(!screen.is_active());
        assert!(!screen.push_frame(VideoFrame::filled(2, 2, Rgba::WHITE)));
    }

    #[test]
    fn test_slots_swap() {
        let slots = SourceSlots::new();
        let camera = SourceHandle::new(SourceKind::Camera);
        camera.push_frame(VideoFrame::filled(1, 1, Rgba::WHITE));

        assert!(slots.set(SourceKind::Camera, Some(camera)).is_none());
        assert!(slots.active_frame(SourceKind::Camera).is_some());
        assert!(slots.active_frame(SourceKind::Screen).is_none());

        let previous = slots.set(SourceKind::Camera, None);
        assert!(previous.is_some());
        assert!(slots.active_frame(SourceKind::Camera).is_none());
    }
}

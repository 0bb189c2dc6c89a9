//! Video codec seam
//!
//! Each peer transport owns one encoder so a slow viewer never stalls the
//! others. Concrete encoders (libvpx, openh264, hardware) plug in through
//! [`EncoderFactory`].

use bytes::Bytes;
use std::time::Duration;
use webrtc::api::media_engine::{MIME_TYPE_H264, MIME_TYPE_VP8, MIME_TYPE_VP9};

use crate::error::Result;
use crate::frame::VideoFrame;

/// RTP clock rate shared by all video codecs
pub const VIDEO_CLOCK_RATE: u32 = 90000;

/// Video codec type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoCodec {
    VP8,
    VP9,
    H264,
}

impl VideoCodec {
    pub fn mime_type(self) -> &'static str {
        match self {
            VideoCodec::VP8 => MIME_TYPE_VP8,
            VideoCodec::VP9 => MIME_TYPE_VP9,
            VideoCodec::H264 => MIME_TYPE_H264,
        }
    }
}

/// One encoded access unit
#[derive(Debug, Clone)]
pub struct EncodedFrame {
    pub data: Bytes,
    pub duration: Duration,
    pub keyframe: bool,
}

/// Video encoder trait
pub trait VideoEncoder: Send {
    fn encode(&mut self, frame: &VideoFrame, duration: Duration) -> Result<EncodedFrame>;
    fn codec(&self) -> VideoCodec;
    /// Make the next encoded frame a keyframe, e.g. after a viewer joins
    fn request_keyframe(&mut self) {}
}

/// Creates per-transport encoders
pub trait EncoderFactory: Send + Sync {
    fn codec(&self) -> VideoCodec;
    fn create(&self, width: u32, height: u32, fps: u32) -> Result<Box<dyn VideoEncoder>>;
}

//! Broadcaster-side media for Livelab
//!
//! This crate provides:
//! - Camera and screen-share sources holding their newest frame
//! - The fixed-rate compositor that merges them into one canvas
//! - Codec and capture-device seams

pub mod audio;
pub mod codec;
pub mod compositor;
pub mod devices;
pub mod error;
pub mod frame;
pub mod layout;
pub mod pip;
pub mod source;

pub use audio::{AudioPacket, MicrophoneSource};
pub use codec::{EncodedFrame, EncoderFactory, VideoCodec, VideoEncoder};
pub use compositor::{Compositor, CompositorConfig, OutputFrame};
pub use devices::{DeviceKind, MediaDevices, TestPatternDevices};
pub use error::MediaError;
pub use frame::{Rect, Rgba, VideoFrame};
pub use pip::PipPosition;
pub use source::{SourceHandle, SourceKind};

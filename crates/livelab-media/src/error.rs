use crate::devices::DeviceKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MediaError {
    /// The user or OS refused access; the caller may retry
    #[error("permission denied for {device}")]
    PermissionDenied { device: DeviceKind },

    #[error("{device} unavailable: {reason}")]
    DeviceUnavailable { device: DeviceKind, reason: String },

    #[error("invalid frame: {width}x{height} with {len} bytes")]
    InvalidFrame { width: u32, height: u32, len: usize },

    #[error("encoder error: {0}")]
    Encoder(String),
}

pub type Result<T> = std::result::Result<T, MediaError>;

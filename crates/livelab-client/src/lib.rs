//! Livelab client library
//!
//! This crate provides the signaling client, the role-selected live session
//! and the WebRTC transports that carry the broadcast to each viewer.

pub mod config;
pub mod error;
pub mod network;
pub mod session;
pub mod transport;

pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use network::{SignalingClient, SignalingSender};
pub use session::{
    BroadcasterMedia, BroadcasterSession, Identity, LiveSession, ViewerPhase, ViewerSession,
};
pub use transport::{Fanout, RemoteStream, RtcApi, TrackKind, ViewerTransport};

//! Livelab signaling protocol
//!
//! Messages exchanged between clients and the signaling hub over the
//! WebSocket, plus the data types they carry. Every frame is a JSON object
//! tagged with a kebab-case `type` field.

pub mod messages;
pub mod types;

pub use messages::*;
pub use types::*;

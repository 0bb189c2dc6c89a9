mod signaling;

pub use signaling::{SignalingClient, SignalingSender};

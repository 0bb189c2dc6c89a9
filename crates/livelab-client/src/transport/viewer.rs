use livelab_protocol::ClientMessage;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use uuid::Uuid;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::track::track_remote::TrackRemote;

use super::{RtcApi, add_remote_candidate, relay_ice_candidates};
use crate::error::Result;
use crate::network::SignalingSender;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Audio,
    Video,
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackKind::Audio => write!(f, "audio"),
            TrackKind::Video => write!(f, "video"),
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    tracks: AtomicUsize,
    audio_packets: AtomicU64,
    video_packets: AtomicU64,
    audio_bytes: AtomicU64,
    video_bytes: AtomicU64,
}

/// Receive-side statistics for the incoming broadcast
#[derive(Debug, Clone, Default)]
pub struct RemoteStream {
    counters: Arc<Counters>,
}

impl RemoteStream {
    pub fn track_count(&self) -> usize {
        self.counters.tracks.load(Ordering::Relaxed)
    }

    pub fn packets(&self, kind: TrackKind) -> u64 {
        match kind {
            TrackKind::Audio => self.counters.audio_packets.load(Ordering::Relaxed),
            TrackKind::Video => self.counters.video_packets.load(Ordering::Relaxed),
        }
    }

    pub fn bytes(&self, kind: TrackKind) -> u64 {
        match kind {
            TrackKind::Audio => self.counters.audio_bytes.load(Ordering::Relaxed),
            TrackKind::Video => self.counters.video_bytes.load(Ordering::Relaxed),
        }
    }

    fn track_added(&self) {
        self.counters.tracks.fetch_add(1, Ordering::Relaxed);
    }

    fn record(&self, kind: TrackKind, len: usize) {
        let (packets, bytes) = match kind {
            TrackKind::Audio => (&self.counters.audio_packets, &self.counters.audio_bytes),
            TrackKind::Video => (&self.counters.video_packets, &self.counters.video_bytes),
        };
        packets.fetch_add(1, Ordering::Relaxed);
        bytes.fetch_add(len as u64, Ordering::Relaxed);
    }
}

/// The viewer's end of a broadcaster transport. Offers are answered
/// automatically.
pub struct ViewerTransport {
    broadcaster: Uuid,
    pc: Arc<RTCPeerConnection>,
    stream: RemoteStream,
    failed: Arc<AtomicBool>,
}

impl ViewerTransport {
    /// Apply the broadcaster's offer and return the transport plus answer SDP
    pub async fn answer(
        rtc: &RtcApi,
        broadcaster: Uuid,
        offer_sdp: String,
        signaling: SignalingSender,
    ) -> Result<(Self, String)> {
        let pc = rtc.new_peer_connection().await?;
        let transport = Self {
            broadcaster,
            pc,
            stream: RemoteStream::default(),
            failed: Arc::new(AtomicBool::new(false)),
        };

        match transport.negotiate(offer_sdp, signaling).await {
            Ok(answer) => Ok((transport, answer)),
            Err(e) => {
                transport.close().await;
                Err(e)
            }
        }
    }

    async fn negotiate(&self, offer_sdp: String, signaling: SignalingSender) -> Result<String> {
        let stream = self.stream.clone();
        self.pc.on_track(Box::new(move |track, _receiver, _transceiver| {
            let stream = stream.clone();
            Box::pin(async move {
                tokio::spawn(drain_track(track, stream));
            })
        }));

        relay_ice_candidates(&self.pc, self.broadcaster, signaling.clone());

        let failed = self.failed.clone();
        let broadcaster = self.broadcaster;
        self.pc
            .on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
                let failed = failed.clone();
                let signaling = signaling.clone();
                Box::pin(async move {
                    tracing::debug!("Viewer transport is {}", state);
                    if state != RTCPeerConnectionState::Failed || failed.swap(true, Ordering::AcqRel) {
                        return;
                    }
                    tracing::error!("Transport from broadcaster {} failed", broadcaster);
                    let message = ClientMessage::TransportError {
                        target: broadcaster,
                        message: "peer connection failed".to_string(),
                    };
                    if signaling.send(message).await.is_err() {
                        tracing::debug!("Could not report transport failure, signaling closed");
                    }
                })
            }));

        self.pc
            .set_remote_description(RTCSessionDescription::offer(offer_sdp)?)
            .await?;
        let answer = self.pc.create_answer(None).await?;
        self.pc.set_local_description(answer.clone()).await?;

        tracing::info!("Answered offer from broadcaster {}", self.broadcaster);
        Ok(answer.sdp)
    }

    pub async fn add_ice_candidate(
        &self,
        candidate: String,
        sdp_mid: Option<String>,
        sdp_mline_index: Option<u16>,
    ) -> Result<()> {
        add_remote_candidate(&self.pc, candidate, sdp_mid, sdp_mline_index).await
    }

    pub fn broadcaster(&self) -> Uuid {
        self.broadcaster
    }

    pub fn stream(&self) -> RemoteStream {
        self.stream.clone()
    }

    pub fn is_failed(&self) -> bool {
        self.failed.load(Ordering::Acquire)
    }

    pub async fn close(&self) {
        if let Err(e) = self.pc.close().await {
            tracing::warn!("Error closing viewer transport: {}", e);
        }
    }
}

async fn drain_track(track: Arc<TrackRemote>, stream: RemoteStream) {
    let kind = match track.kind() {
        RTPCodecType::Audio => TrackKind::Audio,
        RTPCodecType::Video => TrackKind::Video,
        other => {
            tracing::warn!("Ignoring remote track of kind {:?}", other);
            return;
        }
    };

    stream.track_added();
    tracing::info!("Receiving remote {} track {}", kind, track.id());

    loop {
        match track.read_rtp().await {
            Ok((packet, _attributes)) => stream.record(kind, packet.payload.len()),
            Err(e) => {
                tracing::debug!("Remote {} track ended: {}", kind, e);
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::tests::offline_api;
    use tokio::sync::mpsc;

    #[test]
    fn test_counters_are_per_kind() {
        let stream = RemoteStream::default();
        let shared = stream.clone();
        shared.track_added();
        shared.record(TrackKind::Video, 1200);
        shared.record(TrackKind::Video, 800);
        shared.record(TrackKind::Audio, 3);

        assert_eq!(stream.track_count(), 1);
        assert_eq!(stream.packets(TrackKind::Video), 2);
        assert_eq!(stream.bytes(TrackKind::Video), 2000);
        assert_eq!(stream.packets(TrackKind::Audio), 1);
    }

    #[tokio::test]
    async fn test_garbage_offer_is_a_transport_error() {
        let (tx, _rx) = mpsc::channel(8);
        let result = ViewerTransport::answer(
            &offline_api(),
            Uuid::new_v4(),
            "definitely not sdp".to_string(),
            SignalingSender::new(tx),
        )
        .await;
        assert!(matches!(result, Err(crate::error::ClientError::Transport(_))));
    }
}

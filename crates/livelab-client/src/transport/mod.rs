//! WebRTC plumbing for the star topology
//!
//! The broadcaster opens one peer connection per admitted viewer through
//! [`Fanout`]; each viewer answers with a [`ViewerTransport`].

mod fanout;
mod viewer;

pub use fanout::Fanout;
pub use viewer::{RemoteStream, TrackKind, ViewerTransport};

use livelab_media::VideoCodec;
use livelab_media::codec::VIDEO_CLOCK_RATE;
use livelab_protocol::{ClientMessage, IceServer};
use std::sync::Arc;
use uuid::Uuid;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MIME_TYPE_OPUS, MediaEngine};
use webrtc::api::{API, APIBuilder};
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::rtp_transceiver::rtp_codec::{
    RTCRtpCodecCapability, RTCRtpCodecParameters, RTPCodecType,
};

use crate::error::Result;
use crate::network::SignalingSender;

const OPUS_CLOCK_RATE: u32 = 48000;

/// Stream id shared by the outbound audio and video tracks
pub const STREAM_ID: &str = "livelab";

pub fn video_capability(codec: VideoCodec) -> RTCRtpCodecCapability {
    RTCRtpCodecCapability {
        mime_type: codec.mime_type().to_string(),
        clock_rate: VIDEO_CLOCK_RATE,
        channels: 0,
        sdp_fmtp_line: String::new(),
        rtcp_feedback: vec![],
    }
}

pub fn opus_capability() -> RTCRtpCodecCapability {
    RTCRtpCodecCapability {
        mime_type: MIME_TYPE_OPUS.to_string(),
        clock_rate: OPUS_CLOCK_RATE,
        channels: 2,
        sdp_fmtp_line: "minptime=10;useinbandfec=1".to_string(),
        rtcp_feedback: vec![],
    }
}

/// The process-wide WebRTC API plus ICE configuration
pub struct RtcApi {
    api: API,
    ice_servers: Vec<RTCIceServer>,
}

impl RtcApi {
    /// VP8 and Opus with the default interceptors
    pub fn new(ice_servers: &[IceServer]) -> Result<Arc<Self>> {
        let mut media_engine = MediaEngine::default();

        media_engine.register_codec(
            RTCRtpCodecParameters {
                capability: video_capability(VideoCodec::VP8),
                payload_type: 96,
                ..Default::default()
            },
            RTPCodecType::Video,
        )?;

        media_engine.register_codec(
            RTCRtpCodecParameters {
                capability: opus_capability(),
                payload_type: 111,
                ..Default::default()
            },
            RTPCodecType::Audio,
        )?;

        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine)?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        Ok(Arc::new(Self {
            api,
            ice_servers: rtc_ice_servers(ice_servers),
        }))
    }

    pub async fn new_peer_connection(&self) -> Result<Arc<RTCPeerConnection>> {
        let config = RTCConfiguration {
            ice_servers: self.ice_servers.clone(),
            ..Default::default()
        };
        Ok(Arc::new(self.api.new_peer_connection(config).await?))
    }
}

fn rtc_ice_servers(servers: &[IceServer]) -> Vec<RTCIceServer> {
    servers
        .iter()
        .map(|server| RTCIceServer {
            urls: server.urls.clone(),
            username: server.username.clone().unwrap_or_default(),
            credential: server.credential.clone().unwrap_or_default(),
            ..Default::default()
        })
        .collect()
}

/// Forward locally gathered candidates to `target` through the hub
pub(crate) fn relay_ice_candidates(pc: &RTCPeerConnection, target: Uuid, signaling: SignalingSender) {
    pc.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
        let signaling = signaling.clone();
        Box::pin(async move {
            let Some(candidate) = candidate else {
                return;
            };
            match candidate.to_json() {
                Ok(init) => {
                    let message = ClientMessage::RtcIceCandidate {
                        target,
                        candidate: init.candidate,
                        sdp_mid: init.sdp_mid,
                        sdp_mline_index: init.sdp_mline_index,
                    };
                    if signaling.send(message).await.is_err() {
                        tracing::debug!("Dropping ICE candidate for {}, signaling closed", target);
                    }
                }
                Err(e) => tracing::warn!("Failed to serialize ICE candidate: {}", e),
            }
        })
    }));
}

pub(crate) async fn add_remote_candidate(
    pc: &RTCPeerConnection,
    candidate: String,
    sdp_mid: Option<String>,
    sdp_mline_index: Option<u16>,
) -> Result<()> {
    let init = RTCIceCandidateInit {
        candidate,
        sdp_mid,
        sdp_mline_index,
        ..Default::default()
    };
    pc.add_ice_candidate(init).await?;
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use bytes::Bytes;
    use livelab_media::{EncodedFrame, EncoderFactory, VideoEncoder, VideoFrame};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Emits a fixed payload per frame
    pub struct FakeEncoder;

    impl VideoEncoder for FakeEncoder {
        fn encode(
            &mut self,
            _frame: &VideoFrame,
            duration: Duration,
        ) -> livelab_media::error::Result<EncodedFrame> {
            Ok(EncodedFrame {
                data: Bytes::from_static(&[0x10, 0x02, 0x00, 0x9d, 0x01, 0x2a]),
                duration,
                keyframe: true,
            })
        }

        fn codec(&self) -> VideoCodec {
            VideoCodec::VP8
        }
    }

    #[derive(Default)]
    pub struct FakeEncoderFactory {
        pub created: AtomicUsize,
    }

    impl EncoderFactory for FakeEncoderFactory {
        fn codec(&self) -> VideoCodec {
            VideoCodec::VP8
        }

        fn create(
            &self,
            _width: u32,
            _height: u32,
            _fps: u32,
        ) -> livelab_media::error::Result<Box<dyn VideoEncoder>> {
            self.created.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FakeEncoder))
        }
    }

    /// Host candidates only, no network lookups
    pub fn offline_api() -> Arc<RtcApi> {
        RtcApi::new(&[]).unwrap()
    }

    #[test]
    fn test_ice_servers_map_credentials() {
        let servers = rtc_ice_servers(&[
            IceServer {
                urls: vec!["stun:a".to_string()],
                username: None,
                credential: None,
            },
            IceServer {
                urls: vec!["turn:b".to_string()],
                username: Some("u".to_string()),
                credential: Some("p".to_string()),
            },
        ]);
        assert_eq!(servers.len(), 2);
        assert_eq!(servers[0].username, "");
        assert_eq!(servers[1].urls, vec!["turn:b"]);
        assert_eq!(servers[1].credential, "p");
    }

    #[test]
    fn test_capabilities() {
        assert_eq!(video_capability(VideoCodec::VP8).mime_type, "video/VP8");
        assert_eq!(opus_capability().clock_rate, 48000);
    }
}

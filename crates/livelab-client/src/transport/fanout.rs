//! Broadcaster-side fanout: one peer connection per admitted viewer
//!
//! Every transport carries its own video track fed by its own encoder, so a
//! slow viewer never holds back the rest. The microphone track is shared.

use livelab_media::{Compositor, EncoderFactory, MicrophoneSource, OutputFrame, VideoEncoder};
use livelab_protocol::ClientMessage;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;
use webrtc::media::Sample;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

use super::{RtcApi, STREAM_ID, add_remote_candidate, opus_capability, relay_ice_candidates, video_capability};
use crate::error::{ClientError, Result};
use crate::network::SignalingSender;

struct PeerTransport {
    transport_id: String,
    generation: u64,
    pc: Arc<RTCPeerConnection>,
    pump: JoinHandle<()>,
}

impl PeerTransport {
    async fn shutdown(self, viewer: Uuid) {
        self.pump.abort();
        if let Err(e) = self.pc.close().await {
            tracing::warn!("Error closing transport for viewer {}: {}", viewer, e);
        }
    }
}

type TransportMap = Mutex<HashMap<Uuid, PeerTransport>>;

pub struct Fanout {
    rtc: Arc<RtcApi>,
    signaling: SignalingSender,
    encoders: Arc<dyn EncoderFactory>,
    frames: watch::Receiver<OutputFrame>,
    size: (u32, u32),
    fps: u32,
    frame_interval: Duration,
    audio_track: Arc<TrackLocalStaticSample>,
    transports: Arc<TransportMap>,
    microphone: std::sync::Mutex<Option<JoinHandle<()>>>,
    next_generation: AtomicU64,
}

impl Fanout {
    pub fn new(
        rtc: Arc<RtcApi>,
        signaling: SignalingSender,
        compositor: &Compositor,
        encoders: Arc<dyn EncoderFactory>,
    ) -> Self {
        let config = compositor.config();
        let audio_track = Arc::new(TrackLocalStaticSample::new(
            opus_capability(),
            "audio".to_string(),
            STREAM_ID.to_string(),
        ));

        Self {
            rtc,
            signaling,
            encoders,
            frames: compositor.subscribe(),
            size: (config.width, config.height),
            fps: config.fps,
            frame_interval: config.frame_interval(),
            audio_track,
            transports: Arc::new(Mutex::new(HashMap::new())),
            microphone: std::sync::Mutex::new(None),
            next_generation: AtomicU64::new(1),
        }
    }

    /// Open a transport to `viewer` and return the offer SDP to relay.
    /// An existing transport for the same viewer is closed first.
    pub async fn open(&self, viewer: Uuid, transport_id: &str) -> Result<String> {
        self.close(viewer).await;

        let pc = self.rtc.new_peer_connection().await?;
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);

        match self.negotiate(&pc, viewer, generation).await {
            Ok((sdp, pump)) => {
                let mut transports = self.transports.lock().await;
                if let Some(previous) = transports.insert(
                    viewer,
                    PeerTransport {
                        transport_id: transport_id.to_string(),
                        generation,
                        pc,
                        pump,
                    },
                ) {
                    tokio::spawn(previous.shutdown(viewer));
                }
                tracing::info!(
                    "Opened transport {} for viewer {} ({} active)",
                    transport_id,
                    viewer,
                    transports.len()
                );
                Ok(sdp)
            }
            Err(e) => {
                if let Err(close_err) = pc.close().await {
                    tracing::debug!("Error closing failed transport: {}", close_err);
                }
                Err(e)
            }
        }
    }

    async fn negotiate(
        &self,
        pc: &Arc<RTCPeerConnection>,
        viewer: Uuid,
        generation: u64,
    ) -> Result<(String, JoinHandle<()>)> {
        let video_track = Arc::new(TrackLocalStaticSample::new(
            video_capability(self.encoders.codec()),
            "video".to_string(),
            STREAM_ID.to_string(),
        ));
        pc.add_track(video_track.clone()).await?;
        pc.add_track(self.audio_track.clone()).await?;

        relay_ice_candidates(pc, viewer, self.signaling.clone());
        self.monitor(pc, viewer, generation);

        let encoder = self.encoders.create(self.size.0, self.size.1, self.fps)?;

        let offer = pc.create_offer(None).await?;
        pc.set_local_description(offer.clone()).await?;

        let pump = tokio::spawn(pump_video(
            viewer,
            self.frames.clone(),
            encoder,
            video_track,
            self.frame_interval,
        ));
        Ok((offer.sdp, pump))
    }

    /// A failed or closed transport is dropped; only a failure is reported
    /// to its viewer
    fn monitor(&self, pc: &RTCPeerConnection, viewer: Uuid, generation: u64) {
        let transports = Arc::downgrade(&self.transports);
        let signaling = self.signaling.clone();

        pc.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
            let transports = transports.clone();
            let signaling = signaling.clone();
            Box::pin(async move {
                tracing::debug!("Transport for viewer {} is {}", viewer, state);
                if !matches!(
                    state,
                    RTCPeerConnectionState::Failed | RTCPeerConnectionState::Closed
                ) {
                    return;
                }

                let Some(transport) = take_generation(&transports, viewer, generation).await else {
                    return;
                };
                if state == RTCPeerConnectionState::Closed {
                    tracing::info!("Transport for viewer {} closed", viewer);
                    transport.pump.abort();
                    return;
                }
                tracing::error!("Transport for viewer {} failed", viewer);
                tokio::spawn(transport.shutdown(viewer));

                let message = ClientMessage::TransportError {
                    target: viewer,
                    message: "peer connection failed".to_string(),
                };
                if signaling.send(message).await.is_err() {
                    tracing::debug!("Could not report transport failure, signaling closed");
                }
            })
        }));
    }

    pub async fn apply_answer(&self, viewer: Uuid, sdp: String) -> Result<()> {
        let pc = self.peer_connection(viewer).await.ok_or_else(|| {
            ClientError::InvalidState(format!("no transport for viewer {}", viewer))
        })?;
        pc.set_remote_description(RTCSessionDescription::answer(sdp)?)
            .await?;
        tracing::debug!("Applied answer from viewer {}", viewer);
        Ok(())
    }

    /// Candidates for an unknown viewer are dropped; they can trail a close
    pub async fn add_ice_candidate(
        &self,
        viewer: Uuid,
        candidate: String,
        sdp_mid: Option<String>,
        sdp_mline_index: Option<u16>,
    ) -> Result<()> {
        match self.peer_connection(viewer).await {
            Some(pc) => add_remote_candidate(&pc, candidate, sdp_mid, sdp_mline_index).await,
            None => {
                tracing::debug!("Ignoring ICE candidate for unknown viewer {}", viewer);
                Ok(())
            }
        }
    }

    async fn peer_connection(&self, viewer: Uuid) -> Option<Arc<RTCPeerConnection>> {
        self.transports
            .lock()
            .await
            .get(&viewer)
            .map(|t| t.pc.clone())
    }

    /// Returns whether a transport existed
    pub async fn close(&self, viewer: Uuid) -> bool {
        let removed = self.transports.lock().await.remove(&viewer);
        match removed {
            Some(transport) => {
                tracing::info!("Closing transport {} for viewer {}", transport.transport_id, viewer);
                transport.shutdown(viewer).await;
                true
            }
            None => false,
        }
    }

    pub async fn close_all(&self) {
        let drained: Vec<_> = self.transports.lock().await.drain().collect();
        if !drained.is_empty() {
            tracing::info!("Closing {} transports", drained.len());
        }
        for (viewer, transport) in drained {
            transport.shutdown(viewer).await;
        }
    }

    pub async fn contains(&self, viewer: Uuid) -> bool {
        self.transports.lock().await.contains_key(&viewer)
    }

    pub async fn transport_id(&self, viewer: Uuid) -> Option<String> {
        self.transports
            .lock()
            .await
            .get(&viewer)
            .map(|t| t.transport_id.clone())
    }

    pub async fn len(&self) -> usize {
        self.transports.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Feed the shared audio track; replaces a previous microphone
    pub fn attach_microphone(&self, mut microphone: MicrophoneSource) {
        let track = self.audio_track.clone();
        let task = tokio::spawn(async move {
            while let Some(packet) = microphone.next_packet().await {
                let sample = Sample {
                    data: packet.data,
                    duration: packet.duration,
                    ..Default::default()
                };
                if let Err(e) = track.write_sample(&sample).await {
                    tracing::debug!("Dropped audio sample: {}", e);
                }
            }
            tracing::debug!("Microphone pump finished");
        });

        let mut slot = self.microphone.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = slot.replace(task) {
            previous.abort();
        }
    }

    /// Stops the microphone pump, which releases the capture device
    pub fn detach_microphone(&self) -> bool {
        match self
            .microphone
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            Some(task) => {
                task.abort();
                true
            }
            None => false,
        }
    }

    pub fn has_microphone(&self) -> bool {
        self.microphone
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|task| !task.is_finished())
            .unwrap_or(false)
    }
}

impl Drop for Fanout {
    fn drop(&mut self) {
        self.detach_microphone();
    }
}

async fn take_generation(
    transports: &Weak<TransportMap>,
    viewer: Uuid,
    generation: u64,
) -> Option<PeerTransport> {
    let transports = transports.upgrade()?;
    let mut transports = transports.lock().await;
    if transports.get(&viewer)?.generation != generation {
        return None;
    }
    transports.remove(&viewer)
}

/// Encode every new compositor frame for one viewer
async fn pump_video(
    viewer: Uuid,
    mut frames: watch::Receiver<OutputFrame>,
    mut encoder: Box<dyn VideoEncoder>,
    track: Arc<TrackLocalStaticSample>,
    frame_interval: Duration,
) {
    encoder.request_keyframe();
    let mut last_sequence = 0;

    loop {
        let output = frames.borrow_and_update().clone();
        if output.sequence > last_sequence {
            last_sequence = output.sequence;
            match encoder.encode(&output.frame, frame_interval) {
                Ok(encoded) if encoded.data.is_empty() => {}
                Ok(encoded) => {
                    let sample = Sample {
                        data: encoded.data,
                        duration: encoded.duration,
                        ..Default::default()
                    };
                    if let Err(e) = track.write_sample(&sample).await {
                        tracing::debug!("Dropped video sample for viewer {}: {}", viewer, e);
                    }
                }
                Err(e) => tracing::error!("Encoding for viewer {} failed: {}", viewer, e),
            }
        }

        if frames.changed().await.is_err() {
            break;
        }
    }
    tracing::debug!("Video pump for viewer {} finished", viewer);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::tests::{FakeEncoderFactory, offline_api};
    use crate::session::tests::nothing_sent;
    use crate::transport::ViewerTransport;
    use livelab_media::CompositorConfig;
    use tokio::sync::mpsc;
    use tokio::time::timeout;
    use tokio_test::assert_ok;

    fn setup() -> (Fanout, Arc<FakeEncoderFactory>, mpsc::Receiver<ClientMessage>, Compositor) {
        let compositor = Compositor::new(CompositorConfig {
            width: 64,
            height: 36,
            ..CompositorConfig::default()
        });
        let (tx, rx) = mpsc::channel(256);
        let factory = Arc::new(FakeEncoderFactory::default());
        let fanout = Fanout::new(
            offline_api(),
            SignalingSender::new(tx),
            &compositor,
            factory.clone(),
        );
        (fanout, factory, rx, compositor)
    }

    #[tokio::test]
    async fn test_open_returns_offer_with_audio_and_video() {
        let (fanout, factory, _rx, _compositor) = setup();
        let viewer = Uuid::new_v4();

        let sdp = fanout.open(viewer, "t-1").await.unwrap();
        assert!(sdp.contains("m=video"));
        assert!(sdp.contains("m=audio"));
        assert!(sdp.contains("VP8"));
        assert_eq!(fanout.transport_id(viewer).await.as_deref(), Some("t-1"));
        assert_eq!(factory.created.load(Ordering::SeqCst), 1);

        fanout.close_all().await;
    }

    #[tokio::test]
    async fn test_reopen_replaces_transport() {
        let (fanout, factory, _rx, _compositor) = setup();
        let viewer = Uuid::new_v4();

        fanout.open(viewer, "t-1").await.unwrap();
        fanout.open(viewer, "t-2").await.unwrap();
        assert_eq!(fanout.len().await, 1);
        assert_eq!(fanout.transport_id(viewer).await.as_deref(), Some("t-2"));
        assert_eq!(factory.created.load(Ordering::SeqCst), 2);

        fanout.close_all().await;
    }

    #[tokio::test]
    async fn test_close_one_leaves_others() {
        let (fanout, _factory, _rx, _compositor) = setup();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        fanout.open(a, "a").await.unwrap();
        fanout.open(b, "b").await.unwrap();

        assert!(fanout.close(a).await);
        assert!(!fanout.close(a).await);
        assert!(!fanout.contains(a).await);
        assert!(fanout.contains(b).await);

        fanout.close_all().await;
        assert!(fanout.is_empty().await);
    }

    #[tokio::test]
    async fn test_closed_connection_leaves_fanout() {
        let (fanout, _factory, mut rx, _compositor) = setup();
        let viewer = Uuid::new_v4();
        let other = Uuid::new_v4();
        fanout.open(viewer, "t-1").await.unwrap();
        fanout.open(other, "t-2").await.unwrap();

        let pc = fanout.peer_connection(viewer).await.unwrap();
        pc.close().await.unwrap();

        timeout(Duration::from_secs(5), async {
            while fanout.contains(viewer).await {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("closed transport was not dropped");
        assert!(fanout.contains(other).await);
        // a close is not a failure, so nothing is reported
        assert!(nothing_sent(&mut rx));

        fanout.close_all().await;
    }

    #[tokio::test]
    async fn test_answer_for_unknown_viewer_is_invalid_state() {
        let (fanout, _factory, _rx, _compositor) = setup();
        let err = fanout
            .apply_answer(Uuid::new_v4(), "v=0".to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::InvalidState(_)));

        // trailing candidates are harmless
        assert_ok!(
            fanout
                .add_ice_candidate(Uuid::new_v4(), "candidate:1".to_string(), None, None)
                .await
        );
    }

    #[tokio::test]
    async fn test_offer_answer_exchange_with_viewer() {
        let (fanout, _factory, _rx, _compositor) = setup();
        let viewer = Uuid::new_v4();
        let broadcaster = Uuid::new_v4();
        let offer = fanout.open(viewer, "t-1").await.unwrap();

        let (viewer_tx, _viewer_rx) = mpsc::channel(256);
        let (transport, answer) = ViewerTransport::answer(
            &offline_api(),
            broadcaster,
            offer,
            SignalingSender::new(viewer_tx),
        )
        .await
        .unwrap();
        assert!(answer.contains("m=video"));

        fanout.apply_answer(viewer, answer).await.unwrap();

        transport.close().await;
        fanout.close_all().await;
    }

    #[tokio::test]
    async fn test_microphone_attach_detach() {
        let (fanout, _factory, _rx, _compositor) = setup();
        let (_packets, rx) = mpsc::channel(4);
        let (mic, stopped) = MicrophoneSource::new(rx);

        fanout.attach_microphone(mic);
        assert!(fanout.has_microphone());
        assert!(fanout.detach_microphone());
        assert!(!fanout.has_microphone());
        assert!(!fanout.detach_microphone());

        // the aborted pump drops the source, which flags the capture task
        for _ in 0..50 {
            if stopped.load(Ordering::Acquire) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(stopped.load(Ordering::Acquire));
    }
}

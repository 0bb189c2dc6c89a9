use bytes::Bytes;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;

/// Audio sample rate used throughout the application (48kHz)
pub const SAMPLE_RATE: u32 = 48000;

/// Audio channels (stereo)
pub const CHANNELS: usize = 2;

/// Frame size in samples (20ms at 48kHz = 960 samples)
pub const FRAME_SIZE: usize = 960;

pub const FRAME_DURATION: Duration = Duration::from_millis(20);

/// A 20 ms Opus frame of silence
pub const OPUS_SILENCE: [u8; 3] = [0xf8, 0xff, 0xfe];

/// One encoded Opus packet
#[derive(Debug, Clone)]
pub struct AudioPacket {
    pub data: Bytes,
    pub duration: Duration,
}

/// Microphone capture delivering Opus packets
pub struct MicrophoneSource {
    packets: mpsc::Receiver<AudioPacket>,
    stopped: Arc<AtomicBool>,
}

impl MicrophoneSource {
    /// Returns the source and the flag a capture task checks to know when to quit
    pub fn new(packets: mpsc::Receiver<AudioPacket>) -> (Self, Arc<AtomicBool>) {
        let stopped = Arc::new(AtomicBool::new(false));
        (
            Self {
                packets,
                stopped: stopped.clone(),
            },
            stopped,
        )
    }

    pub async fn next_packet(&mut self) -> Option<AudioPacket> {
        if self.is_stopped() {
            return None;
        }
        self.packets.recv().await
    }

    pub fn stop(&mut self) {
        self.stopped.store(true, Ordering::Release);
        self.packets.close();
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }
}

impl Drop for MicrophoneSource {
    fn drop(&mut self) {
        self.stopped.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_err;

    #[tokio::test]
    async fn test_stop_ends_stream() {
        let (tx, rx) = mpsc::channel(4);
        let (mut mic, capture_stopped) = MicrophoneSource::new(rx);

        tx.send(AudioPacket {
            data: Bytes::from_static(&OPUS_SILENCE),
            duration: FRAME_DURATION,
        })
        .await
        .unwrap();
        assert!(mic.next_packet().await.is_some());

        mic.stop();
        assert!(capture_stopped.load(Ordering::Acquire));
        assert!(mic.next_packet().await.is_none());
        assert_err!(
            tx.send(AudioPacket {
                data: Bytes::new(),
                duration: FRAME_DURATION,
            })
            .await
        );
    }
}

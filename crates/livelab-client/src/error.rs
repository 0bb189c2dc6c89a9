use livelab_media::MediaError;
use livelab_protocol::messages::ProtocolError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("signaling error: {0}")]
    Signaling(String),

    #[error("transport error: {0}")]
    Transport(#[from] webrtc::Error),

    #[error(transparent)]
    Media(#[from] MediaError),

    #[error("you are muted")]
    Muted,

    #[error("not connected to the signaling server")]
    NotConnected,

    #[error("invalid state: {0}")]
    InvalidState(String),
}

impl From<tokio_tungstenite::tungstenite::Error> for ClientError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        ClientError::Signaling(err.to_string())
    }
}

impl From<ProtocolError> for ClientError {
    fn from(err: ProtocolError) -> Self {
        ClientError::Signaling(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::types::{
    AdmissionMode, ChatMessageData, Decision, ErrorCode, ParticipantData, Role,
};

/// Failure to decode or encode a signaling frame
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid message: {0}")]
    Json(#[from] serde_json::Error),
}

/// Messages sent from client to hub via WebSocket
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// Register or refresh presence
    Identify {
        id: String,
        name: String,
        role: Role,
        /// Signed identity token, required when the server has an identity secret
        #[serde(default, skip_serializing_if = "Option::is_none")]
        token: Option<String>,
    },

    /// Broadcaster declares room state
    SetRoomMode { live: bool, mode: AdmissionMode },

    /// Request to receive media
    JoinRoom {
        room_id: String,
        transport_id: String,
        name: String,
        role: Role,
    },

    /// Stop receiving media without closing the socket
    LeaveRoom,

    /// Broadcaster verdict on a pending request
    AdmissionDecision {
        connection_id: Uuid,
        decision: Decision,
    },

    /// Force a viewer out of the room
    Kick { connection_id: Uuid },

    /// Toggle a viewer's chat mute
    Mute { connection_id: Uuid },

    /// Post a chat line to the room
    ChatSend { text: String },

    /// Keepalive
    Ping,

    /// WebRTC offer for one transport
    RtcOffer { target: Uuid, sdp: String },

    /// WebRTC answer for one transport
    RtcAnswer { target: Uuid, sdp: String },

    /// WebRTC ICE candidate for one transport
    RtcIceCandidate {
        target: Uuid,
        candidate: String,
        #[serde(default)]
        sdp_mid: Option<String>,
        #[serde(default)]
        sdp_mline_index: Option<u16>,
    },

    /// Transport negotiation failed on the sender's side
    TransportError { target: Uuid, message: String },
}

/// Messages sent from hub to client via WebSocket
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// Identify accepted
    Identified { connection_id: Uuid, role: Role },

    /// Error local to this connection
    Error { code: ErrorCode, message: String },

    /// Pong response to ping
    Pong,

    /// A viewer asks to join (approval mode only)
    JoinRequest { connection_id: Uuid, name: String },

    /// Join is queued for broadcaster approval
    WaitingForApproval,

    /// Join accepted
    EntryAccepted,

    /// Join refused; the connection is about to close
    EntryRefused,

    /// An admitted viewer is ready for a transport
    ViewerJoined {
        connection_id: Uuid,
        transport_id: String,
        name: String,
    },

    /// A viewer left the room
    ViewerLeft { connection_id: Uuid },

    /// The broadcaster kicked this connection
    ForceDisconnect { reason: String },

    /// This connection's chat mute state
    MuteState { muted: bool },

    /// Chat line rejected because the sender is muted
    ChatRejected { reason: String },

    /// Chat fanout
    ChatReceive(ChatMessageData),

    /// Global live indicator
    RoomStatus { live: bool, mode: AdmissionMode },

    /// Online roster
    PresenceUpdate { participants: Vec<ParticipantData> },

    /// WebRTC offer relayed from another connection
    RtcOffer { from: Uuid, sdp: String },

    /// WebRTC answer relayed from another connection
    RtcAnswer { from: Uuid, sdp: String },

    /// WebRTC ICE candidate relayed from another connection
    RtcIceCandidate {
        from: Uuid,
        candidate: String,
        sdp_mid: Option<String>,
        sdp_mline_index: Option<u16>,
    },

    /// Transport negotiation failure reported by the other side
    TransportError { from: Uuid, message: String },
}

impl ClientMessage {
    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}

impl ServerMessage {
    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        ServerMessage::Error {
            code,
            message: message.into(),
        }
    }
}

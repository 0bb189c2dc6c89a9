use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role of an identity inside the live room
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// The single identity producing the composited stream
    #[serde(alias = "TEACHER")]
    Broadcaster,
    /// Receives the stream, may chat
    #[serde(alias = "STUDENT")]
    Viewer,
}

impl Role {
    pub fn is_broadcaster(self) -> bool {
        self == Role::Broadcaster
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Broadcaster => write!(f, "broadcaster"),
            Role::Viewer => write!(f, "viewer"),
        }
    }
}

/// How join attempts are admitted
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdmissionMode {
    /// Anyone may join immediately
    #[default]
    Open,
    /// The broadcaster must accept each join
    Approval,
}

/// Broadcaster verdict on a pending join request
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Accept,
    Refuse,
}

/// Roster entry as published in `presence-update`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantData {
    pub connection_id: Uuid,
    /// Identity id supplied by the auth service
    pub identity_id: String,
    /// Transport id of the viewer's media endpoint, once it has joined
    pub peer_id: Option<String>,
    pub display_name: String,
    pub role: Role,
    pub muted: bool,
    /// Whether the participant currently receives (or produces) the stream
    pub in_room: bool,
}

/// A chat line fanned out to the room
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessageData {
    pub id: Uuid,
    pub author: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub is_broadcaster: bool,
}

/// A join request waiting for the broadcaster
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PendingRequestData {
    pub connection_id: Uuid,
    pub name: String,
}

/// Error codes carried by `error` messages
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCode {
    NotIdentified,
    UnknownRoom,
    NoLiveRoom,
    RoomFull,
    LockConflict,
    Unauthorized,
    ChatTooLong,
    InvalidMessage,
    TransportFailed,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let code = match self {
            ErrorCode::NotIdentified => "not-identified",
            ErrorCode::UnknownRoom => "unknown-room",
            ErrorCode::NoLiveRoom => "no-live-room",
            ErrorCode::RoomFull => "room-full",
            ErrorCode::LockConflict => "lock-conflict",
            ErrorCode::Unauthorized => "unauthorized",
            ErrorCode::ChatTooLong => "chat-too-long",
            ErrorCode::InvalidMessage => "invalid-message",
            ErrorCode::TransportFailed => "transport-failed",
        };
        f.write_str(code)
    }
}

/// ICE server configuration for WebRTC
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IceServer {
    pub urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legacy_role_names_accepted() {
        let role: Role = serde_json::from_str("\"TEACHER\"").unwrap();
        assert_eq!(role, Role::Broadcaster);
        let role: Role = serde_json::from_str("\"STUDENT\"").unwrap();
        assert_eq!(role, Role::Viewer);

        assert_eq!(serde_json::to_string(&Role::Viewer).unwrap(), "\"VIEWER\"");
    }

    #[test]
    fn test_participant_uses_camel_case() {
        let participant = ParticipantData {
            connection_id: Uuid::nil(),
            identity_id: "42".to_string(),
            peer_id: None,
            display_name: "Ada".to_string(),
            role: Role::Viewer,
            muted: true,
            in_room: false,
        };
        let json = serde_json::to_value(&participant).unwrap();
        assert_eq!(json["displayName"], "Ada");
        assert_eq!(json["inRoom"], false);
        assert_eq!(json["role"], "VIEWER");
    }

    #[test]
    fn test_error_code_display_matches_wire() {
        let wire = serde_json::to_string(&ErrorCode::LockConflict).unwrap();
        assert_eq!(wire, format!("\"{}\"", ErrorCode::LockConflict));
    }
}

use livelab_protocol::{AdmissionMode, ServerMessage};

/// The single live room of this deployment
#[derive(Debug, Clone)]
pub struct Room {
    id: String,
    live: bool,
    mode: AdmissionMode,
}

impl Room {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            live: false,
            mode: AdmissionMode::default(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_live(&self) -> bool {
        self.live
    }

    pub fn mode(&self) -> AdmissionMode {
        self.mode
    }

    /// Mark the room live. Returns false if it already was.
    pub fn go_live(&mut self, mode: AdmissionMode) -> bool {
        self.mode = mode;
        !std::mem::replace(&mut self.live, true)
    }

    /// Change the admission mode; only joins after this call see it.
    pub fn set_mode(&mut self, mode: AdmissionMode) -> bool {
        std::mem::replace(&mut self.mode, mode) != mode
    }

    /// Mark the room offline. Returns false if it already was.
    pub fn stop(&mut self) -> bool {
        std::mem::replace(&mut self.live, false)
    }

    pub fn status(&self) -> ServerMessage {
        ServerMessage::RoomStatus {
            live: self.live,
            mode: self.mode,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_lifecycle() {
        let mut room = Room::new("live-room");
        assert!(!room.is_live());

        assert!(room.go_live(AdmissionMode::Approval));
        assert!(!room.go_live(AdmissionMode::Approval));
        assert_eq!(room.mode(), AdmissionMode::Approval);

        assert!(room.set_mode(AdmissionMode::Open));
        assert!(!room.set_mode(AdmissionMode::Open));

        assert!(room.stop());
        assert!(!room.stop());
        assert_eq!(
            room.status(),
            ServerMessage::RoomStatus {
                live: false,
                mode: AdmissionMode::Open
            }
        );
    }
}

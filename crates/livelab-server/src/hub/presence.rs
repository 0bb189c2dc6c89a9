use livelab_protocol::{ParticipantData, Role};
use std::collections::HashMap;
use uuid::Uuid;

/// A connected, identified participant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub connection_id: Uuid,
    pub identity_id: String,
    pub peer_id: Option<String>,
    pub display_name: String,
    pub role: Role,
    pub muted: bool,
    pub in_room: bool,
}

impl Participant {
    pub fn to_data(&self) -> ParticipantData {
        ParticipantData {
            connection_id: self.connection_id,
            identity_id: self.identity_id.clone(),
            peer_id: self.peer_id.clone(),
            display_name: self.display_name.clone(),
            role: self.role,
            muted: self.muted,
            in_room: self.in_room,
        }
    }
}

/// Table of identified connections, keyed by connection ID
#[derive(Debug, Default)]
pub struct PresenceRegistry {
    participants: HashMap<Uuid, Participant>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection, or refresh its identity if already present.
    ///
    /// A refresh keeps mute and room state unless the role changed.
    pub fn register(
        &mut self,
        connection_id: Uuid,
        identity_id: String,
        display_name: String,
        role: Role,
    ) -> &Participant {
        let participant = self
            .participants
            .entry(connection_id)
            .or_insert_with(|| Participant {
                connection_id,
                identity_id: identity_id.clone(),
                peer_id: None,
                display_name: display_name.clone(),
                role,
                muted: false,
                in_room: false,
            });

        if participant.role != role {
            participant.muted = false;
            participant.in_room = false;
            participant.peer_id = None;
        }
        participant.identity_id = identity_id;
        participant.display_name = display_name;
        participant.role = role;
        participant
    }

    pub fn get(&self, connection_id: Uuid) -> Option<&Participant> {
        self.participants.get(&connection_id)
    }

    pub fn contains(&self, connection_id: Uuid) -> bool {
        self.participants.contains_key(&connection_id)
    }

    pub fn remove(&mut self, connection_id: Uuid) -> Option<Participant> {
        self.participants.remove(&connection_id)
    }

    pub fn set_in_room(&mut self, connection_id: Uuid, in_room: bool, peer_id: Option<String>) {
        if let Some(p) = self.participants.get_mut(&connection_id) {
            p.in_room = in_room;
            p.peer_id = peer_id;
        }
    }

    pub fn set_peer_id(&mut self, connection_id: Uuid, peer_id: String) {
        if let Some(p) = self.participants.get_mut(&connection_id) {
            p.peer_id = Some(peer_id);
        }
    }

    /// Flip the mute flag; returns the new state
    pub fn toggle_muted(&mut self, connection_id: Uuid) -> Option<bool> {
        let p = self.participants.get_mut(&connection_id)?;
        p.muted = !p.muted;
        Some(p.muted)
    }

    pub fn is_muted(&self, connection_id: Uuid) -> bool {
        self.participants
            .get(&connection_id)
            .map(|p| p.muted)
            .unwrap_or(false)
    }

    /// Clear every mute; returns the connections that were muted
    pub fn unmute_all(&mut self) -> Vec<Uuid> {
        self.participants
            .values_mut()
            .filter(|p| p.muted)
            .map(|p| {
                p.muted = false;
                p.connection_id
            })
            .collect()
    }

    /// Roster ordered broadcaster first, then by display name
    pub fn roster(&self) -> Vec<ParticipantData> {
        let mut roster: Vec<&Participant> = self.participants.values().collect();
        roster.sort_by(|a, b| {
            b.role
                .is_broadcaster()
                .cmp(&a.role.is_broadcaster())
                .then_with(|| a.display_name.cmp(&b.display_name))
                .then_with(|| a.connection_id.cmp(&b.connection_id))
        });
        roster.into_iter().map(Participant::to_data).collect()
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }
}

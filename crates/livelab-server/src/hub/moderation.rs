//! Moderation channel: mute, kick and chat
//!
//! Moderation commands from anyone but the lock holder, or aimed at anyone but
//! a viewer, are ignored without a reply.

use chrono::Utc;
use livelab_protocol::{ChatMessageData, Role, ServerMessage};
use uuid::Uuid;

use super::state::{HubState, Outbox};
use crate::error::HubError;

const KICK_REASON: &str = "You were removed from the live session by the broadcaster";
const MUTED_REASON: &str = "You are muted by the broadcaster";

impl HubState {
    fn moderation_target(&self, caller: Uuid, target: Uuid, action: &str) -> bool {
        if !self.lock.is_holder(caller) {
            tracing::warn!(connection_id = %caller, target = %target, "Unauthorized {} ignored", action);
            return false;
        }
        match self.presence.get(target) {
            Some(p) if p.role == Role::Viewer => true,
            _ => {
                tracing::warn!(target = %target, "{} target is not a viewer", action);
                false
            }
        }
    }

    pub(super) fn toggle_mute(&mut self, caller: Uuid, target: Uuid, out: &mut Outbox) {
        if !self.moderation_target(caller, target, "mute") {
            return;
        }
        if let Some(muted) = self.presence.toggle_muted(target) {
            tracing::info!(connection_id = %target, muted, "Mute toggled");
            out.send(target, ServerMessage::MuteState { muted });
            out.presence_changed();
        }
    }

    pub(super) fn kick(&mut self, caller: Uuid, target: Uuid, out: &mut Outbox) {
        if !self.moderation_target(caller, target, "kick") {
            return;
        }
        tracing::info!(connection_id = %target, "Viewer kicked");

        out.send(
            target,
            ServerMessage::ForceDisconnect {
                reason: KICK_REASON.to_string(),
            },
        );
        self.presence.remove(target);
        self.admission.remove(target);
        self.connected.remove(&target);
        out.broadcast(
            self.all(),
            ServerMessage::ViewerLeft {
                connection_id: target,
            },
        );
        out.presence_changed();
        out.close(target);
    }

    pub(super) fn chat(&mut self, sender: Uuid, text: &str, out: &mut Outbox) -> Result<(), HubError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(());
        }
        let max = self.settings.max_chat_length;
        if text.chars().count() > max {
            return Err(HubError::ChatTooLong { max });
        }

        let is_broadcaster = self.lock.is_holder(sender);
        if !is_broadcaster && !self.admission.is_admitted(sender) {
            return Err(HubError::Unauthorized(
                "join the room before chatting".to_string(),
            ));
        }

        if self.presence.is_muted(sender) {
            tracing::debug!(connection_id = %sender, "Chat from muted viewer rejected");
            out.send(
                sender,
                ServerMessage::ChatRejected {
                    reason: MUTED_REASON.to_string(),
                },
            );
            return Ok(());
        }

        let author = self
            .presence
            .get(sender)
            .map(|p| p.display_name.clone())
            .unwrap_or_default();
        let recipients: Vec<Uuid> = self
            .lock
            .holder_connection()
            .into_iter()
            .chain(self.admission.admitted())
            .filter(|id| *id != sender)
            .collect();

        out.broadcast(
            recipients,
            ServerMessage::ChatReceive(ChatMessageData {
                id: Uuid::new_v4(),
                author,
                text: text.to_string(),
                timestamp: Utc::now(),
                is_broadcaster,
            }),
        );
        Ok(())
    }
}

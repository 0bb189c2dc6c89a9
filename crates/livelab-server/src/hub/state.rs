use livelab_protocol::{ClientMessage, Decision, PendingRequestData, Role, ServerMessage};
use serde::Serialize;
use std::collections::BTreeSet;
use uuid::Uuid;

use super::admission::{AdmissionController, DecisionOutcome, JoinOutcome};
use super::lock::{BroadcasterLock, LockAcquire, Liveness};
use super::presence::PresenceRegistry;
use super::room::Room;
use crate::error::HubError;

/// Output of the hub for the connection manager to deliver
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Send { to: Uuid, message: ServerMessage },
    Broadcast { to: Vec<Uuid>, message: ServerMessage },
    Close { connection_id: Uuid },
}

#[derive(Debug, Clone)]
pub struct HubSettings {
    pub room_id: String,
    pub max_viewers: usize,
    pub max_chat_length: usize,
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            room_id: "live-room".to_string(),
            max_viewers: 50,
            max_chat_length: 500,
        }
    }
}

/// Point-in-time view of the room for the status route
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HubSnapshot {
    pub live: bool,
    pub mode: livelab_protocol::AdmissionMode,
    pub viewers: usize,
    pub pending: Vec<PendingRequestData>,
    pub online: usize,
}

/// Collects effects for one event; presence is published once at the end
#[derive(Default)]
pub(super) struct Outbox {
    effects: Vec<Effect>,
    closes: Vec<Uuid>,
    presence_dirty: bool,
}

impl Outbox {
    pub(super) fn send(&mut self, to: Uuid, message: ServerMessage) {
        self.effects.push(Effect::Send { to, message });
    }

    pub(super) fn broadcast(&mut self, to: Vec<Uuid>, message: ServerMessage) {
        if !to.is_empty() {
            self.effects.push(Effect::Broadcast { to, message });
        }
    }

    pub(super) fn close(&mut self, connection_id: Uuid) {
        self.closes.push(connection_id);
    }

    pub(super) fn presence_changed(&mut self) {
        self.presence_dirty = true;
    }
}

/// All session state owned by the signaling hub.
///
/// Every method runs to completion inside the hub task, so nothing here is
/// shared or locked.
pub struct HubState {
    pub(super) settings: HubSettings,
    pub(super) room: Room,
    pub(super) lock: BroadcasterLock,
    pub(super) presence: PresenceRegistry,
    pub(super) admission: AdmissionController,
    pub(super) connected: BTreeSet<Uuid>,
}

impl HubState {
    pub fn new(settings: HubSettings) -> Self {
        Self {
            room: Room::new(settings.room_id.clone()),
            admission: AdmissionController::new(settings.max_viewers),
            lock: BroadcasterLock::new(),
            presence: PresenceRegistry::new(),
            connected: BTreeSet::new(),
            settings,
        }
    }

    pub fn connect(&mut self, connection_id: Uuid) {
        self.connected.insert(connection_id);
    }

    pub fn disconnect(&mut self, connection_id: Uuid) -> Vec<Effect> {
        let mut out = Outbox::default();
        if !self.connected.remove(&connection_id) {
            // already removed by kick, refusal or eviction
            return Vec::new();
        }
        self.drop_connection(connection_id, &mut out);
        self.flush(out)
    }

    pub fn handle_client(
        &mut self,
        connection_id: Uuid,
        message: ClientMessage,
        liveness: &dyn Liveness,
    ) -> Vec<Effect> {
        let mut out = Outbox::default();
        if let Err(e) = self.route(connection_id, message, liveness, &mut out) {
            tracing::debug!(connection_id = %connection_id, "Rejected event: {}", e);
            out.send(connection_id, e.to_message());
        }
        self.flush(out)
    }

    pub fn snapshot(&self) -> HubSnapshot {
        HubSnapshot {
            live: self.room.is_live(),
            mode: self.room.mode(),
            viewers: self.admission.admitted_count(),
            pending: self.admission.pending(),
            online: self.presence.len(),
        }
    }

    pub fn room_id(&self) -> &str {
        self.room.id()
    }

    pub fn is_connected(&self, connection_id: Uuid) -> bool {
        self.connected.contains(&connection_id)
    }

    fn route(
        &mut self,
        conn: Uuid,
        message: ClientMessage,
        liveness: &dyn Liveness,
        out: &mut Outbox,
    ) -> Result<(), HubError> {
        match message {
            ClientMessage::Ping => {
                out.send(conn, ServerMessage::Pong);
                Ok(())
            }
            ClientMessage::Identify { id, name, role, .. } => {
                self.identify(conn, id, name, role, liveness, out)
            }
            other => {
                if !self.presence.contains(conn) {
                    return Err(HubError::NotIdentified);
                }
                self.route_identified(conn, other, out)
            }
        }
    }

    fn route_identified(
        &mut self,
        conn: Uuid,
        message: ClientMessage,
        out: &mut Outbox,
    ) -> Result<(), HubError> {
        match message {
            ClientMessage::SetRoomMode { live, mode } => self.set_room_mode(conn, live, mode, out),
            ClientMessage::JoinRoom {
                room_id,
                transport_id,
                name,
                ..
            } => self.join_room(conn, &room_id, &transport_id, &name, out),
            ClientMessage::LeaveRoom => {
                self.leave_room(conn, out);
                Ok(())
            }
            ClientMessage::AdmissionDecision {
                connection_id,
                decision,
            } => self.decide(conn, connection_id, decision, out),
            ClientMessage::Kick { connection_id } => {
                self.kick(conn, connection_id, out);
                Ok(())
            }
            ClientMessage::Mute { connection_id } => {
                self.toggle_mute(conn, connection_id, out);
                Ok(())
            }
            ClientMessage::ChatSend { text } => self.chat(conn, &text, out),
            ClientMessage::RtcOffer { target, sdp } => {
                self.ensure_may_address(conn, target)?;
                out.send(target, ServerMessage::RtcOffer { from: conn, sdp });
                Ok(())
            }
            ClientMessage::RtcAnswer { target, sdp } => {
                self.ensure_may_address(conn, target)?;
                out.send(target, ServerMessage::RtcAnswer { from: conn, sdp });
                Ok(())
            }
            ClientMessage::RtcIceCandidate {
                target,
                candidate,
                sdp_mid,
                sdp_mline_index,
            } => {
                self.ensure_may_address(conn, target)?;
                out.send(
                    target,
                    ServerMessage::RtcIceCandidate {
                        from: conn,
                        candidate,
                        sdp_mid,
                        sdp_mline_index,
                    },
                );
                Ok(())
            }
            ClientMessage::TransportError { target, message } => {
                self.ensure_may_address(conn, target)?;
                tracing::warn!(connection_id = %conn, target = %target, "Transport error: {}", message);
                out.send(target, ServerMessage::TransportError { from: conn, message });
                Ok(())
            }
            ClientMessage::Ping | ClientMessage::Identify { .. } => Ok(()),
        }
    }

    fn identify(
        &mut self,
        conn: Uuid,
        identity_id: String,
        name: String,
        role: Role,
        liveness: &dyn Liveness,
        out: &mut Outbox,
    ) -> Result<(), HubError> {
        if identity_id.trim().is_empty() {
            return Err(HubError::InvalidMessage("identity id is empty".to_string()));
        }
        let name = match name.trim() {
            "" => identity_id.clone(),
            trimmed => trimmed.to_string(),
        };

        match role {
            Role::Broadcaster => {
                match self.lock.acquire(&identity_id, conn, liveness)? {
                    LockAcquire::Acquired => {
                        tracing::info!(connection_id = %conn, identity = %identity_id, "Broadcaster lock acquired");
                    }
                    LockAcquire::Refreshed => {
                        tracing::debug!(connection_id = %conn, "Broadcaster re-identified");
                    }
                    LockAcquire::TookOverStale { previous } => {
                        tracing::warn!(
                            connection_id = %conn,
                            stale = %previous.connection_id,
                            "Evicting stale broadcaster"
                        );
                        self.evict(previous.connection_id, out);
                    }
                }

                // a viewer promoted to broadcaster leaves the audience
                if self.admission.remove(conn).is_some() {
                    out.broadcast(
                        self.all(),
                        ServerMessage::ViewerLeft { connection_id: conn },
                    );
                }
                self.presence.register(conn, identity_id, name, Role::Broadcaster);
                self.presence
                    .set_in_room(conn, self.room.is_live(), None);
            }
            Role::Viewer => {
                if self.lock.release(conn) {
                    tracing::info!(connection_id = %conn, "Broadcaster lock released by role change");
                    self.stop_session(out);
                }
                self.presence.register(conn, identity_id, name, Role::Viewer);
            }
        }

        out.send(
            conn,
            ServerMessage::Identified {
                connection_id: conn,
                role,
            },
        );
        out.send(conn, self.room.status());
        if role.is_broadcaster() {
            for pending in self.admission.pending() {
                out.send(
                    conn,
                    ServerMessage::JoinRequest {
                        connection_id: pending.connection_id,
                        name: pending.name,
                    },
                );
            }
        }
        out.presence_changed();
        Ok(())
    }

    fn set_room_mode(
        &mut self,
        conn: Uuid,
        live: bool,
        mode: livelab_protocol::AdmissionMode,
        out: &mut Outbox,
    ) -> Result<(), HubError> {
        if !self.lock.is_holder(conn) {
            return Err(HubError::Unauthorized(
                "only the broadcaster can change the room".to_string(),
            ));
        }

        match (live, self.room.is_live()) {
            (true, false) => {
                self.room.go_live(mode);
                tracing::info!(connection_id = %conn, ?mode, "Session started");
                self.presence.set_in_room(conn, true, None);
                out.broadcast(self.all(), self.room.status());
                out.presence_changed();
            }
            (false, true) => {
                self.room.set_mode(mode);
                self.stop_session(out);
            }
            _ => {
                if self.room.set_mode(mode) {
                    tracing::info!(?mode, "Admission mode changed");
                    out.broadcast(self.all(), self.room.status());
                }
            }
        }
        Ok(())
    }

    fn join_room(
        &mut self,
        conn: Uuid,
        room_id: &str,
        transport_id: &str,
        name: &str,
        out: &mut Outbox,
    ) -> Result<(), HubError> {
        if self.lock.is_holder(conn) {
            return Err(HubError::InvalidMessage(
                "the broadcaster cannot join as a viewer".to_string(),
            ));
        }
        if room_id != self.room.id() {
            return Err(HubError::UnknownRoom(room_id.to_string()));
        }

        let name = match name.trim() {
            "" => self
                .presence
                .get(conn)
                .map(|p| p.display_name.clone())
                .unwrap_or_default(),
            trimmed => trimmed.to_string(),
        };

        let outcome = self.admission.request_join(
            conn,
            &name,
            transport_id,
            self.room.is_live(),
            self.room.mode(),
        )?;
        let holder = self.lock.holder_connection();

        match outcome {
            JoinOutcome::Admitted { transport_id } => {
                tracing::info!(connection_id = %conn, transport_id = %transport_id, "Viewer admitted");
                self.presence
                    .set_in_room(conn, true, Some(transport_id.clone()));
                out.send(conn, ServerMessage::EntryAccepted);
                if let Some(holder) = holder {
                    out.send(
                        holder,
                        ServerMessage::ViewerJoined {
                            connection_id: conn,
                            transport_id,
                            name,
                        },
                    );
                }
                out.presence_changed();
            }
            JoinOutcome::Waiting { newly_queued } => {
                tracing::info!(connection_id = %conn, newly_queued, "Viewer waiting for approval");
                self.presence.set_peer_id(conn, transport_id.to_string());
                out.send(conn, ServerMessage::WaitingForApproval);
                if let (true, Some(holder)) = (newly_queued, holder) {
                    out.send(
                        holder,
                        ServerMessage::JoinRequest {
                            connection_id: conn,
                            name,
                        },
                    );
                }
            }
        }
        Ok(())
    }

    fn leave_room(&mut self, conn: Uuid, out: &mut Outbox) {
        if self.admission.remove(conn).is_some() {
            tracing::info!(connection_id = %conn, "Viewer left the room");
            self.presence.set_in_room(conn, false, None);
            out.broadcast(self.all(), ServerMessage::ViewerLeft { connection_id: conn });
            out.presence_changed();
        }
    }

    fn decide(
        &mut self,
        conn: Uuid,
        target: Uuid,
        decision: Decision,
        out: &mut Outbox,
    ) -> Result<(), HubError> {
        if !self.lock.is_holder(conn) {
            return Err(HubError::Unauthorized(
                "only the broadcaster can admit viewers".to_string(),
            ));
        }

        match self.admission.decide(target, decision) {
            DecisionOutcome::Approved => {
                tracing::info!(connection_id = %target, "Join request accepted");
                out.send(target, ServerMessage::EntryAccepted);
            }
            DecisionOutcome::Refused => {
                tracing::info!(connection_id = %target, "Join request refused");
                out.send(target, ServerMessage::EntryRefused);
                self.presence.remove(target);
                self.connected.remove(&target);
                out.close(target);
                out.presence_changed();
            }
            DecisionOutcome::Ignored => {
                tracing::debug!(connection_id = %target, ?decision, "Decision for no pending request ignored");
            }
        }
        Ok(())
    }

    fn ensure_may_address(&self, from: Uuid, to: Uuid) -> Result<(), HubError> {
        let allowed = if self.lock.is_holder(from) {
            self.admission.is_admitted(to)
        } else {
            self.lock.is_holder(to) && self.admission.is_admitted(from)
        };
        if allowed {
            Ok(())
        } else {
            tracing::warn!(connection_id = %from, target = %to, "Relay to unauthorized target dropped");
            Err(HubError::Unauthorized(format!("cannot signal {}", to)))
        }
    }

    /// End the live session: room offline, audience dropped, mutes cleared
    pub(super) fn stop_session(&mut self, out: &mut Outbox) {
        if self.room.stop() {
            tracing::info!("Session stopped");
        }
        for viewer in self.admission.reset() {
            self.presence.set_in_room(viewer, false, None);
        }
        for unmuted in self.presence.unmute_all() {
            out.send(unmuted, ServerMessage::MuteState { muted: false });
        }
        if let Some(holder) = self.lock.holder_connection() {
            self.presence.set_in_room(holder, false, None);
        }
        out.broadcast(self.all(), self.room.status());
        out.presence_changed();
    }

    /// Remove every trace of a connection that is going away
    pub(super) fn drop_connection(&mut self, conn: Uuid, out: &mut Outbox) {
        if self.lock.release(conn) {
            tracing::info!(connection_id = %conn, "Broadcaster disconnected, lock released");
            self.stop_session(out);
        }
        if self.admission.remove(conn).is_some() {
            out.broadcast(self.all(), ServerMessage::ViewerLeft { connection_id: conn });
        }
        if self.presence.remove(conn).is_some() {
            out.presence_changed();
        }
    }

    /// Tear down a stale lock holder whose lock was already taken over
    fn evict(&mut self, stale: Uuid, out: &mut Outbox) {
        self.stop_session(out);
        self.connected.remove(&stale);
        self.admission.remove(stale);
        self.presence.remove(stale);
        out.close(stale);
        out.presence_changed();
    }

    pub(super) fn all(&self) -> Vec<Uuid> {
        self.connected.iter().copied().collect()
    }

    fn flush(&self, out: Outbox) -> Vec<Effect> {
        let Outbox {
            mut effects,
            closes,
            presence_dirty,
        } = out;

        if presence_dirty {
            let to = self.all();
            if !to.is_empty() {
                effects.push(Effect::Broadcast {
                    to,
                    message: ServerMessage::PresenceUpdate {
                        participants: self.presence.roster(),
                    },
                });
            }
        }
        effects.extend(
            closes
                .into_iter()
                .map(|connection_id| Effect::Close { connection_id }),
        );
        effects
    }
}

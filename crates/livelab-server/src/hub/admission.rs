//! Admission controller
//!
//! Tracks every viewer that asked to receive the stream during the current
//! session. In approval mode requests wait in a FIFO queue until the
//! broadcaster decides.

use livelab_protocol::{AdmissionMode, Decision, ErrorCode, PendingRequestData};
use std::collections::{HashMap, VecDeque};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerPhase {
    /// Queued for a broadcaster decision
    Waiting,
    /// Accepted, the viewer still has to re-join with a current transport id
    Approved,
    /// Receiving media
    Admitted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinOutcome {
    Admitted { transport_id: String },
    Waiting { newly_queued: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionOutcome {
    Approved,
    Refused,
    /// Unknown connection or already decided
    Ignored,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AdmissionError {
    #[error("the room is not live")]
    NoLiveRoom,
    #[error("the room is full ({max} viewers)")]
    RoomFull { max: usize },
}

impl AdmissionError {
    pub fn code(&self) -> ErrorCode {
        match self {
            AdmissionError::NoLiveRoom => ErrorCode::NoLiveRoom,
            AdmissionError::RoomFull { .. } => ErrorCode::RoomFull,
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    name: String,
    transport_id: String,
    phase: ViewerPhase,
}

#[derive(Debug)]
pub struct AdmissionController {
    entries: HashMap<Uuid, Entry>,
    queue: VecDeque<Uuid>,
    max_viewers: usize,
}

impl AdmissionController {
    pub fn new(max_viewers: usize) -> Self {
        Self {
            entries: HashMap::new(),
            queue: VecDeque::new(),
            max_viewers,
        }
    }

    pub fn request_join(
        &mut self,
        connection_id: Uuid,
        name: &str,
        transport_id: &str,
        live: bool,
        mode: AdmissionMode,
    ) -> Result<JoinOutcome, AdmissionError> {
        if !live {
            return Err(AdmissionError::NoLiveRoom);
        }

        if let Some(entry) = self.entries.get_mut(&connection_id) {
            entry.name = name.to_string();
            entry.transport_id = transport_id.to_string();
            return Ok(match entry.phase {
                ViewerPhase::Waiting => JoinOutcome::Waiting {
                    newly_queued: false,
                },
                ViewerPhase::Approved | ViewerPhase::Admitted => {
                    entry.phase = ViewerPhase::Admitted;
                    JoinOutcome::Admitted {
                        transport_id: entry.transport_id.clone(),
                    }
                }
            });
        }

        if self.entries.len() >= self.max_viewers {
            return Err(AdmissionError::RoomFull {
                max: self.max_viewers,
            });
        }

        let phase = match mode {
            AdmissionMode::Open => ViewerPhase::Admitted,
            AdmissionMode::Approval => ViewerPhase::Waiting,
        };
        self.entries.insert(
            connection_id,
            Entry {
                name: name.to_string(),
                transport_id: transport_id.to_string(),
                phase,
            },
        );

        Ok(match phase {
            ViewerPhase::Waiting => {
                self.queue.push_back(connection_id);
                JoinOutcome::Waiting { newly_queued: true }
            }
            _ => JoinOutcome::Admitted {
                transport_id: transport_id.to_string(),
            },
        })
    }

    /// Apply a broadcaster decision to one waiting request
    pub fn decide(&mut self, connection_id: Uuid, decision: Decision) -> DecisionOutcome {
        let waiting = matches!(
            self.entries.get(&connection_id),
            Some(Entry {
                phase: ViewerPhase::Waiting,
                ..
            })
        );
        if !waiting {
            return DecisionOutcome::Ignored;
        }

        self.queue.retain(|id| *id != connection_id);
        match decision {
            Decision::Accept => {
                if let Some(entry) = self.entries.get_mut(&connection_id) {
                    entry.phase = ViewerPhase::Approved;
                }
                DecisionOutcome::Approved
            }
            Decision::Refuse => {
                self.entries.remove(&connection_id);
                DecisionOutcome::Refused
            }
        }
    }

    /// Drop a viewer; returns the phase it was in
    pub fn remove(&mut self, connection_id: Uuid) -> Option<ViewerPhase> {
        let entry = self.entries.remove(&connection_id)?;
        if entry.phase == ViewerPhase::Waiting {
            self.queue.retain(|id| *id != connection_id);
        }
        Some(entry.phase)
    }

    /// Forget every entry, as when the session stops
    pub fn reset(&mut self) -> Vec<Uuid> {
        self.queue.clear();
        self.entries.drain().map(|(id, _)| id).collect()
    }

    pub fn phase(&self, connection_id: Uuid) -> Option<ViewerPhase> {
        self.entries.get(&connection_id).map(|e| e.phase)
    }

    pub fn is_admitted(&self, connection_id: Uuid) -> bool {
        self.phase(connection_id) == Some(ViewerPhase::Admitted)
    }

    pub fn transport_id(&self, connection_id: Uuid) -> Option<&str> {
        self.entries
            .get(&connection_id)
            .map(|e| e.transport_id.as_str())
    }

    /// Pending requests, oldest first
    pub fn pending(&self) -> Vec<PendingRequestData> {
        self.queue
            .iter()
            .filter_map(|id| {
                self.entries.get(id).map(|e| PendingRequestData {
                    connection_id: *id,
                    name: e.name.clone(),
                })
            })
            .collect()
    }

    pub fn admitted(&self) -> Vec<Uuid> {
        let mut ids: Vec<Uuid> = self
            .entries
            .iter()
            .filter(|(_, e)| e.phase == ViewerPhase::Admitted)
            .map(|(id, _)| *id)
            .collect();
        ids.sort();
        ids
    }

    pub fn admitted_count(&self) -> usize {
        self.entries
            .values()
            .filter(|e| e.phase == ViewerPhase::Admitted)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_mode_admits_immediately() {
        let mut admission = AdmissionController::new(10);
        let viewer = Uuid::new_v4();

        let outcome = admission
            .request_join(viewer, "Ada", "v1", true, AdmissionMode::Open)
            .unwrap();
        assert_eq!(
            outcome,
            JoinOutcome::Admitted {
                transport_id: "v1".into()
            }
        );
        assert!(admission.is_admitted(viewer));
        assert!(admission.pending().is_empty());
    }

    #[test]
    fn test_join_without_live_room_is_rejected() {
        let mut admission = AdmissionController::new(10);
        let err = admission
            .request_join(Uuid::new_v4(), "Ada", "v1", false, AdmissionMode::Open)
            .unwrap_err();
        assert_eq!(err, AdmissionError::NoLiveRoom);
        assert_eq!(err.code(), ErrorCode::NoLiveRoom);
    }

    #[test]
    fn test_approval_mode_queues_in_order() {
        let mut admission = AdmissionController::new(10);
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        admission
            .request_join(first, "First", "a", true, AdmissionMode::Approval)
            .unwrap();
        admission
            .request_join(second, "Second", "b", true, AdmissionMode::Approval)
            .unwrap();

        let names: Vec<_> = admission.pending().into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["First", "Second"]);
        assert!(!admission.is_admitted(first));
    }

    #[test]
    fn test_rejoin_while_waiting_does_not_duplicate() {
        let mut admission = AdmissionController::new(10);
        let viewer = Uuid::new_v4();
        admission
            .request_join(viewer, "Ada", "a", true, AdmissionMode::Approval)
            .unwrap();
        let outcome = admission
            .request_join(viewer, "Ada", "b", true, AdmissionMode::Approval)
            .unwrap();

        assert_eq!(outcome, JoinOutcome::Waiting { newly_queued: false });
        assert_eq!(admission.pending().len(), 1);
        assert_eq!(admission.transport_id(viewer), Some("b"));
    }

    #[test]
    fn test_accept_then_rejoin_admits_with_fresh_transport() {
        let mut admission = AdmissionController::new(10);
        let viewer = Uuid::new_v4();
        admission
            .request_join(viewer, "Ada", "old", true, AdmissionMode::Approval)
            .unwrap();

        assert_eq!(
            admission.decide(viewer, Decision::Accept),
            DecisionOutcome::Approved
        );
        assert_eq!(admission.phase(viewer), Some(ViewerPhase::Approved));
        assert!(!admission.is_admitted(viewer));

        let outcome = admission
            .request_join(viewer, "Ada", "new", true, AdmissionMode::Approval)
            .unwrap();
        assert_eq!(
            outcome,
            JoinOutcome::Admitted {
                transport_id: "new".into()
            }
        );
    }

    #[test]
    fn test_double_accept_is_ignored() {
        let mut admission = AdmissionController::new(10);
        let viewer = Uuid::new_v4();
        admission
            .request_join(viewer, "Ada", "a", true, AdmissionMode::Approval)
            .unwrap();

        assert_eq!(
            admission.decide(viewer, Decision::Accept),
            DecisionOutcome::Approved
        );
        assert_eq!(
            admission.decide(viewer, Decision::Accept),
            DecisionOutcome::Ignored
        );
        assert_eq!(
            admission.decide(viewer, Decision::Refuse),
            DecisionOutcome::Ignored
        );
        assert_eq!(admission.phase(viewer), Some(ViewerPhase::Approved));
    }

    #[test]
    fn test_refuse_drops_request() {
        let mut admission = AdmissionController::new(10);
        let viewer = Uuid::new_v4();
        admission
            .request_join(viewer, "Ada", "a", true, AdmissionMode::Approval)
            .unwrap();

        assert_eq!(
            admission.decide(viewer, Decision::Refuse),
            DecisionOutcome::Refused
        );
        assert!(admission.phase(viewer).is_none());
        assert!(admission.pending().is_empty());
    }

    #[test]
    fn test_capacity_limit() {
        let mut admission = AdmissionController::new(1);
        let first = Uuid::new_v4();
        admission
            .request_join(first, "A", "a", true, AdmissionMode::Open)
            .unwrap();

        let err = admission
            .request_join(Uuid::new_v4(), "B", "b", true, AdmissionMode::Open)
            .unwrap_err();
        assert_eq!(err, AdmissionError::RoomFull { max: 1 });

        // a viewer that already holds a slot may rejoin
        assert!(
            admission
                .request_join(first, "A", "a2", true, AdmissionMode::Open)
                .is_ok()
        );
    }

    #[test]
    fn test_mode_switch_keeps_existing_phases() {
        let mut admission = AdmissionController::new(10);
        let early = Uuid::new_v4();
        admission
            .request_join(early, "Early", "a", true, AdmissionMode::Open)
            .unwrap();

        let late = Uuid::new_v4();
        admission
            .request_join(late, "Late", "b", true, AdmissionMode::Approval)
            .unwrap();

        assert!(admission.is_admitted(early));
        assert_eq!(admission.phase(late), Some(ViewerPhase::Waiting));
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut admission = AdmissionController::new(10);
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        admission
            .request_join(a, "A", "a", true, AdmissionMode::Open)
            .unwrap();
        admission
            .request_join(b, "B", "b", true, AdmissionMode::Approval)
            .unwrap();

        let mut dropped = admission.reset();
        dropped.sort();
        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(dropped, expected);
        assert!(admission.pending().is_empty());
        assert_eq!(admission.admitted_count(), 0);
    }
}

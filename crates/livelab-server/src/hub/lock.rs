//! Single-broadcaster lock
//!
//! At most one connection may act as broadcaster at a time. The lock is taken
//! when a broadcaster identifies and released when that connection goes away.
//! A second identify is refused while the holder's socket is verified live;
//! a holder whose socket is already dead is evicted.

use std::collections::HashSet;
use thiserror::Error;
use uuid::Uuid;

/// Answers whether a connection's socket is still up
pub trait Liveness {
    fn is_live(&self, connection_id: Uuid) -> bool;
}

impl Liveness for HashSet<Uuid> {
    fn is_live(&self, connection_id: Uuid) -> bool {
        self.contains(&connection_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockHolder {
    pub identity_id: String,
    pub connection_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockAcquire {
    /// Lock was free
    Acquired,
    /// Caller already held it
    Refreshed,
    /// Previous holder's connection was dead and has been replaced
    TookOverStale { previous: LockHolder },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LockError {
    #[error("another broadcaster session is active (connection {holder})")]
    Conflict { holder: Uuid },
}

#[derive(Debug, Default)]
pub struct BroadcasterLock {
    holder: Option<LockHolder>,
}

impl BroadcasterLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn holder(&self) -> Option<&LockHolder> {
        self.holder.as_ref()
    }

    pub fn holder_connection(&self) -> Option<Uuid> {
        self.holder.as_ref().map(|h| h.connection_id)
    }

    pub fn is_holder(&self, connection_id: Uuid) -> bool {
        self.holder_connection() == Some(connection_id)
    }

    pub fn acquire(
        &mut self,
        identity_id: &str,
        connection_id: Uuid,
        liveness: &dyn Liveness,
    ) -> Result<LockAcquire, LockError> {
        let next = LockHolder {
            identity_id: identity_id.to_string(),
            connection_id,
        };

        match self.holder.take() {
            None => {
                self.holder = Some(next);
                Ok(LockAcquire::Acquired)
            }
            Some(current) if current.connection_id == connection_id => {
                self.holder = Some(next);
                Ok(LockAcquire::Refreshed)
            }
            Some(current) if liveness.is_live(current.connection_id) => {
                let holder = current.connection_id;
                self.holder = Some(current);
                Err(LockError::Conflict { holder })
            }
            Some(stale) => {
                self.holder = Some(next);
                Ok(LockAcquire::TookOverStale { previous: stale })
            }
        }
    }

    /// Release the lock if `connection_id` holds it
    pub fn release(&mut self, connection_id: Uuid) -> bool {
        if self.is_holder(connection_id) {
            self.holder = None;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn live(ids: &[Uuid]) -> HashSet<Uuid> {
        ids.iter().copied().collect()
    }

    #[test]
    fn test_second_live_broadcaster_is_rejected() {
        let mut lock = BroadcasterLock::new();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        assert_eq!(
            lock.acquire("admin", first, &live(&[first])),
            Ok(LockAcquire::Acquired)
        );
        assert_eq!(
            lock.acquire("admin", second, &live(&[first, second])),
            Err(LockError::Conflict { holder: first })
        );
        assert!(lock.is_holder(first));
        assert!(!lock.is_holder(second));
    }

    #[test]
    fn test_reacquire_by_holder_refreshes() {
        let mut lock = BroadcasterLock::new();
        let conn = Uuid::new_v4();
        lock.acquire("admin", conn, &live(&[conn])).unwrap();
        assert_eq!(
            lock.acquire("admin", conn, &live(&[conn])),
            Ok(LockAcquire::Refreshed)
        );
    }

    #[test]
    fn test_stale_holder_is_replaced() {
        let mut lock = BroadcasterLock::new();
        let dead = Uuid::new_v4();
        let fresh = Uuid::new_v4();
        lock.acquire("admin", dead, &live(&[dead])).unwrap();

        let outcome = lock.acquire("admin", fresh, &live(&[fresh])).unwrap();
        match outcome {
            LockAcquire::TookOverStale { previous } => assert_eq!(previous.connection_id, dead),
            other => panic!("unexpected {:?}", other),
        }
        assert!(lock.is_holder(fresh));
    }

    #[test]
    fn test_release_only_by_holder() {
        let mut lock = BroadcasterLock::new();
        let conn = Uuid::new_v4();
        lock.acquire("admin", conn, &live(&[conn])).unwrap();

        assert!(!lock.release(Uuid::new_v4()));
        assert!(lock.release(conn));
        assert!(lock.holder().is_none());

        let next = Uuid::new_v4();
        assert_eq!(
            lock.acquire("admin", next, &live(&[next])),
            Ok(LockAcquire::Acquired)
        );
    }
}
